/*
[INPUT]:  Error text thrown by a wallet
[OUTPUT]: Tagged failure kind driving retry and fallback
[POS]:    Transaction layer - the single place wallet error heuristics live
[UPDATE]: When wallets change their error messages
*/

use crate::http::SessionError;

/// User declined in the wallet UI
const REJECTION_PATTERNS: &[&str] = &[
    "user rejected",
    "rejected the request",
    "user denied",
    "denied by user",
    "user declined",
    "cancelled by user",
    "canceled by user",
    "user cancelled",
    "user canceled",
];

const INSUFFICIENT_FUNDS_PATTERNS: &[&str] = &[
    "insufficient",
    "not enough balance",
    "einsufficient_balance",
];

/// Signatures of known wallet-adapter bugs that go away on retry
const ADAPTER_INTERNAL_PATTERNS: &[&str] = &["in operator", "function", "undefined", "not ready"];

/// Classification of a wallet failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UserRejected,
    InsufficientFunds,
    AdapterInternal,
    Other,
}

impl FailureKind {
    /// Only adapter-internal failures are retried
    pub fn is_retryable(self) -> bool {
        self == FailureKind::AdapterInternal
    }

    pub fn into_error(self, message: impl Into<String>) -> SessionError {
        let message = message.into();
        match self {
            FailureKind::UserRejected => SessionError::Signing(message),
            FailureKind::InsufficientFunds => SessionError::InsufficientFunds(message),
            FailureKind::AdapterInternal => SessionError::AdapterInternal(message),
            FailureKind::Other => SessionError::Transaction(message),
        }
    }
}

/// Classify a wallet error message; rejection wins over every other pattern
pub fn classify_wallet_error(message: &str) -> FailureKind {
    let lowered = message.to_ascii_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|pattern| lowered.contains(pattern));

    if matches(REJECTION_PATTERNS) {
        FailureKind::UserRejected
    } else if matches(INSUFFICIENT_FUNDS_PATTERNS) {
        FailureKind::InsufficientFunds
    } else if matches(ADAPTER_INTERNAL_PATTERNS) {
        FailureKind::AdapterInternal
    } else {
        FailureKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("User rejected the request.", FailureKind::UserRejected)]
    #[case("The user denied transaction signature", FailureKind::UserRejected)]
    #[case("Move abort: EINSUFFICIENT_BALANCE", FailureKind::InsufficientFunds)]
    #[case("Insufficient balance for gas", FailureKind::InsufficientFunds)]
    #[case("Cannot use 'in' operator to search for 'function' in undefined", FailureKind::AdapterInternal)]
    #[case("t.signAndSubmitTransaction is not a function", FailureKind::AdapterInternal)]
    #[case("Wallet not ready", FailureKind::AdapterInternal)]
    #[case("Sequence number too old", FailureKind::Other)]
    fn test_classify(#[case] message: &str, #[case] expected: FailureKind) {
        assert_eq!(classify_wallet_error(message), expected);
    }

    #[test]
    fn test_only_adapter_internal_retries() {
        assert!(FailureKind::AdapterInternal.is_retryable());
        assert!(!FailureKind::UserRejected.is_retryable());
        assert!(!FailureKind::Other.is_retryable());
    }

    #[test]
    fn test_into_error_variants() {
        assert!(matches!(
            FailureKind::UserRejected.into_error("no"),
            SessionError::Signing(_)
        ));
        assert!(matches!(
            FailureKind::Other.into_error("abort"),
            SessionError::Transaction(_)
        ));
    }
}
