//! Error taxonomy: provider errors in, closed session errors out.
//!
//! Classification happens where the provider is called. Structured codes are
//! consulted first; message heuristics only apply when a provider omits the
//! code (Phantom and some mobile wallets do).

use crate::core::constants::codes;
use crate::provider::WalletKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Raw error as reported by an injected provider or JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("provider error {code:?}: {message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Coarse class of a provider error, before mapping to a caller-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    UserRejected,
    Pending,
    UnrecognizedChain,
    Disconnected,
    Other,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code: Some(code), message: message.into(), data: None }
    }

    /// Error without a structured code; classified by message only.
    pub fn message(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into(), data: None }
    }

    pub fn user_rejected() -> Self {
        Self::new(codes::USER_REJECTED, "User rejected the request.")
    }

    pub fn pending() -> Self {
        Self::new(codes::REQUEST_PENDING, "Request of this type already pending.")
    }

    pub fn unrecognized_chain(chain_id_hex: &str) -> Self {
        Self::new(
            codes::UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID \"{chain_id_hex}\". Try adding the chain using wallet_addEthereumChain first."),
        )
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("The method \"{method}\" does not exist / is not available"))
    }

    /// Parse a `{code, message, data}` error object.
    pub fn from_value(value: &Value) -> Self {
        let code = value.get("code").and_then(Value::as_i64);
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| value.to_string());
        let data = value.get("data").filter(|d| !d.is_null()).cloned();
        Self { code, message, data }
    }

    /// Code reported by the provider. MetaMask mobile wraps switch failures in
    /// -32603 and puts the real code under `data.originalError.code`.
    pub fn effective_code(&self) -> Option<i64> {
        self.data
            .as_ref()
            .and_then(|d| d.pointer("/originalError/code"))
            .and_then(Value::as_i64)
            .or(self.code)
    }

    pub fn class(&self) -> ErrorClass {
        match self.effective_code() {
            Some(codes::USER_REJECTED) => ErrorClass::UserRejected,
            Some(codes::REQUEST_PENDING) => ErrorClass::Pending,
            Some(codes::UNRECOGNIZED_CHAIN) => ErrorClass::UnrecognizedChain,
            Some(codes::UNAUTHORIZED | codes::DISCONNECTED | codes::CHAIN_DISCONNECTED) => {
                ErrorClass::Disconnected
            }
            Some(_) => ErrorClass::Other,
            None => classify_message(&self.message),
        }
    }

    pub fn is_user_rejected(&self) -> bool {
        self.class() == ErrorClass::UserRejected
    }

    pub fn is_pending(&self) -> bool {
        self.class() == ErrorClass::Pending
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.class() == ErrorClass::UnrecognizedChain
    }

    /// MetaMask refuses `wallet_addEthereumChain` for a chain it already
    /// knows under a different currency symbol.
    pub fn is_currency_symbol_mismatch(&self) -> bool {
        self.message.contains("nativeCurrency.symbol does not match")
    }
}

struct Heuristics {
    rejected: Regex,
    pending: Regex,
    unrecognized: Regex,
    disconnected: Regex,
}

fn heuristics() -> &'static Heuristics {
    static HEURISTICS: OnceLock<Heuristics> = OnceLock::new();
    HEURISTICS.get_or_init(|| Heuristics {
        rejected: Regex::new(r"(?i)user (rejected|denied|cancel+ed)|rejected by (the )?user|request (was )?(rejected|cancel+ed)")
            .expect("static regex"),
        pending: Regex::new(r"(?i)already pending|already processing").expect("static regex"),
        unrecognized: Regex::new(r"(?i)unrecognized chain|chain .*(has not been|not) added|try adding the chain")
            .expect("static regex"),
        disconnected: Regex::new(r"(?i)provider not (initialized|ready)|disconnected|not connected")
            .expect("static regex"),
    })
}

fn classify_message(message: &str) -> ErrorClass {
    let h = heuristics();
    if h.rejected.is_match(message) {
        ErrorClass::UserRejected
    } else if h.pending.is_match(message) {
        ErrorClass::Pending
    } else if h.unrecognized.is_match(message) {
        ErrorClass::UnrecognizedChain
    } else if h.disconnected.is_match(message) {
        ErrorClass::Disconnected
    } else {
        ErrorClass::Other
    }
}

/// Closed set of errors surfaced to session callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum SessionError {
    #[error("Connection rejected by user. Please try again.")]
    UserRejected,
    #[error("Connection request already pending. Please check your wallet.")]
    AlreadyPending,
    #[error("{0} is not installed. Please install {0} to use this app.")]
    NotInstalled(WalletKind),
    #[error("Network switch was rejected by user. Please switch to the required network manually.")]
    NetworkSwitchRejected,
    #[error("Failed to switch network. Please switch to the required network manually.")]
    NetworkUnavailable,
    #[error("Wallet provider not ready. Please try again.")]
    ProviderUnavailable,
    #[error("Something went wrong with your wallet. Please try again.")]
    Unknown(String),
}

impl SessionError {
    /// Map a provider error into the closed taxonomy. Unclassified errors are
    /// logged with their raw detail; only the fixed phrasing reaches users.
    pub fn from_provider(err: &ProviderError) -> Self {
        match err.class() {
            ErrorClass::UserRejected => SessionError::UserRejected,
            ErrorClass::Pending => SessionError::AlreadyPending,
            ErrorClass::Disconnected => SessionError::ProviderUnavailable,
            ErrorClass::UnrecognizedChain => SessionError::NetworkUnavailable,
            ErrorClass::Other => {
                tracing::warn!(code = ?err.code, message = %err.message, data = ?err.data, "unclassified provider error");
                SessionError::Unknown(err.message.clone())
            }
        }
    }

    /// Recoverable conditions: the caller may simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::UserRejected | SessionError::AlreadyPending | SessionError::ProviderUnavailable
        )
    }

    /// Diagnostic detail for `Unknown`; never shown to users.
    pub fn detail(&self) -> Option<&str> {
        match self {
            SessionError::Unknown(detail) => Some(detail),
            _ => None,
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        SessionError::from_provider(&err)
    }
}

/// Failure of the switch-or-add network negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("network switch rejected by user")]
    SwitchRejected,
    #[error("network addition rejected by user")]
    AddRejected,
    #[error("a network request is already pending in the wallet")]
    Pending,
    #[error("required network unavailable: {0}")]
    Unavailable(String),
}

impl From<NetworkError> for SessionError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::SwitchRejected | NetworkError::AddRejected => SessionError::NetworkSwitchRejected,
            NetworkError::Pending => SessionError::AlreadyPending,
            NetworkError::Unavailable(detail) => {
                tracing::warn!(%detail, "network enforcement failed");
                SessionError::NetworkUnavailable
            }
        }
    }
}

/// Failure of a contract operation (balance, approve, swap).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("unknown token: {0}")]
    UnknownToken(String),
    #[error("invalid token pair for swap: {from} -> {to}")]
    InvalidPair { from: String, to: String },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("transaction {0} reverted")]
    Reverted(String),
}

impl From<ProviderError> for OperationError {
    fn from(err: ProviderError) -> Self {
        OperationError::Session(SessionError::from_provider(&err))
    }
}

/// Failure reading or writing the stored wallet preference.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("preference storage unavailable: {0}")]
    Unavailable(String),
    #[error("preference io: {0}")]
    Io(#[from] std::io::Error),
    #[error("preference json: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codes_take_precedence_over_messages() {
        let err = ProviderError::new(codes::REQUEST_PENDING, "User rejected the request.");
        assert_eq!(SessionError::from_provider(&err), SessionError::AlreadyPending);
    }

    #[test]
    fn message_heuristics_apply_without_code() {
        assert_eq!(ProviderError::message("User denied account authorization").class(), ErrorClass::UserRejected);
        assert_eq!(ProviderError::message("Request already pending").class(), ErrorClass::Pending);
        assert_eq!(
            ProviderError::message("Unrecognized chain ID 0xaa36a7").class(),
            ErrorClass::UnrecognizedChain
        );
        assert_eq!(ProviderError::message("boom").class(), ErrorClass::Other);
    }

    #[test]
    fn nested_original_error_code_is_used() {
        let err = ProviderError::from_value(&json!({
            "code": -32603,
            "message": "Internal JSON-RPC error.",
            "data": {"originalError": {"code": 4902}}
        }));
        assert!(err.is_unrecognized_chain());
    }

    #[test]
    fn unknown_hides_detail_from_display() {
        let err = SessionError::from_provider(&ProviderError::new(-32000, "execution reverted: 0xdeadbeef"));
        assert_eq!(err.detail(), Some("execution reverted: 0xdeadbeef"));
        assert!(!err.to_string().contains("deadbeef"));
    }

    #[test]
    fn network_errors_collapse_into_session_taxonomy() {
        assert_eq!(SessionError::from(NetworkError::AddRejected), SessionError::NetworkSwitchRejected);
        assert_eq!(SessionError::from(NetworkError::Pending), SessionError::AlreadyPending);
        assert_eq!(
            SessionError::from(NetworkError::Unavailable("rpc down".into())),
            SessionError::NetworkUnavailable
        );
    }
}
