/*
[INPUT]:  Ed25519 secret key (generated or loaded from a key file)
[OUTPUT]: WalletCapability that signs login challenges locally
[POS]:    Wallet layer - SDK-style adapter over a local keypair
[UPDATE]: When key storage format or message signing format changes
*/

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey, Signature};
use rand::rngs::OsRng;
use tracing::info;

use crate::auth::full_message;
use crate::http::{Result, SessionError};
use crate::tx::EntryFunctionPayload;
use crate::wallet::capability::{
    RawSignature, SignMessageRequest, SubmitConvention, SubmittedTransaction, WalletAccount,
    WalletCapability, WalletError,
};

/// Wallet backed by a local Ed25519 key.
///
/// Signs `message + "\nnonce: " + nonce`, the same full message the login
/// endpoint receives. It has no node connection and cannot submit transactions.
pub struct KeypairWallet {
    signing_key: SigningKey,
    address: String,
    connected: AtomicBool,
}

impl KeypairWallet {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_secret_key(&SigningKey::generate(&mut OsRng).to_bytes(), None)
    }

    /// Create from existing secret key bytes; address defaults to the hex public key
    pub fn from_secret_key(bytes: &[u8; 32], address: Option<String>) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let address = address
            .unwrap_or_else(|| format!("0x{}", hex::encode(signing_key.verifying_key().as_bytes())));
        Self {
            signing_key,
            address,
            connected: AtomicBool::new(false),
        }
    }

    /// Load the key from a base64 key file, creating one (mode 0600) if missing
    pub fn from_key_file(path: impl AsRef<Path>, address: Option<String>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let bytes = STANDARD
                .decode(content.trim())
                .map_err(|e| SessionError::Config(format!("Invalid key file {}: {e}", path.display())))?;
            let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                SessionError::Config(format!(
                    "Invalid key length in {}: expected 32 bytes, got {}",
                    path.display(),
                    bytes.len()
                ))
            })?;
            return Ok(Self::from_secret_key(&key_bytes, address));
        }

        let wallet = Self::from_secret_key(&SigningKey::generate(&mut OsRng).to_bytes(), address);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, STANDARD.encode(wallet.signing_key.to_bytes()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        info!(path = %path.display(), "generated new wallet key");
        Ok(wallet)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Hex-encoded public key with `0x` prefix
    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.verifying_key().as_bytes()))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Verify a signature over the login full message
    pub fn verify(&self, message: &str, nonce: &str, signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.signing_key
            .verifying_key()
            .verify(full_message(message, nonce).as_bytes(), &signature)
            .is_ok()
    }

    fn account_value(&self) -> WalletAccount {
        WalletAccount::new(self.address.clone(), self.public_key_hex())
    }
}

impl std::fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl WalletCapability for KeypairWallet {
    fn name(&self) -> &str {
        "keypair"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> std::result::Result<WalletAccount, WalletError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.account_value())
    }

    async fn account(&self) -> std::result::Result<Option<WalletAccount>, WalletError> {
        Ok(self.is_connected().then(|| self.account_value()))
    }

    async fn sign_message(
        &self,
        request: &SignMessageRequest,
    ) -> std::result::Result<RawSignature, WalletError> {
        if !self.is_connected() {
            return Err(WalletError::new("wallet not connected"));
        }
        let message = full_message(&request.message, &request.nonce);
        let signature = self.signing_key.sign(message.as_bytes());
        Ok(RawSignature::Hex(format!("0x{}", hex::encode(signature.to_bytes()))))
    }

    async fn sign_and_submit(
        &self,
        _payload: &EntryFunctionPayload,
        _convention: SubmitConvention,
    ) -> std::result::Result<SubmittedTransaction, WalletError> {
        Err(WalletError::new(
            "keypair wallet has no node connection and cannot submit transactions",
        ))
    }

    async fn disconnect(&self) -> std::result::Result<(), WalletError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
