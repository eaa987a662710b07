/*
[INPUT]:  Wallet handles (raw provider, local keypair) and the session
[OUTPUT]: Uniform wallet capability plus the connection coordinator
[POS]:    Wallet layer - everything that talks to a wallet
[UPDATE]: When adding wallet implementations or connection rules
*/

pub mod capability;
pub mod coordinator;
pub mod keypair;
pub mod mock;
pub mod provider;

pub use capability::{
    RawSignature, SignMessageRequest, SubmitConvention, SubmittedTransaction, WalletAccount,
    WalletCapability, WalletError,
};
pub use coordinator::{AccountSource, ActiveAccount, WalletCoordinator};
pub use keypair::KeypairWallet;
pub use mock::{MockWallet, WalletCall};
pub use provider::{InjectedProvider, ProviderWallet};
