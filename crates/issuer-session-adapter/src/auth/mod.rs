/*
[INPUT]:  Wallet capability and backend auth endpoints
[OUTPUT]: Nonce challenges, normalized signatures, authenticated sessions
[POS]:    Auth layer - handles wallet challenge-response authentication
[UPDATE]: When auth flow or signature formats change
*/

pub mod challenge;
pub mod signature;

pub use challenge::{AuthPhase, ChallengeAuthenticator, LoginOutcome, NonceChallenge, full_message};
pub use signature::{NormalizedSignature, normalize_signature};
