/*
[INPUT]:  Untyped transaction payloads from the UI, connected wallets
[OUTPUT]: Submitted transaction hashes or classified failures
[POS]:    Transaction layer - validation, error classification, dispatch
[UPDATE]: When payload rules or dispatch strategies change
*/

pub mod classify;
pub mod gateway;
pub mod payload;

pub use classify::{FailureKind, classify_wallet_error};
pub use gateway::{GatewayConfig, TransactionGateway};
pub use payload::{ENTRY_FUNCTION_PAYLOAD, EntryFunctionPayload, FunctionId, PayloadError};
