//! Injected providers - one trait over every wallet family and host
//!
//! ```text
//!                ProviderRegistry (list_available / provider)
//!                         │
//!                 HostEnvironment trait
//!        ┌────────────────┼──────────────────┐
//!        ▼                ▼                  ▼
//!   BrowserHost       MemoryHost          RpcHost
//!  (window.ethereum,  (scripted, tests)   (JSON-RPC node,
//!   window.phantom)                        native CLI)
//!        │                │                  │
//!        └────────► InjectedProvider ◄───────┘
//!                  request / on / remove_listener
//! ```
//!
//! A provider is selected once at connect time; nothing downstream branches
//! on the wallet family again.

pub mod memory;
#[cfg(feature = "native")]
pub mod rpc;
pub mod subscription;

pub use memory::{MemoryHost, MemoryProvider};
#[cfg(feature = "native")]
pub use rpc::{RpcHost, RpcProvider};
pub use subscription::ProviderSubscription;

use crate::core::constants::methods;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// The two supported injected-provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    MetaMask,
    Phantom,
}

impl WalletKind {
    pub const ALL: [WalletKind; 2] = [WalletKind::MetaMask, WalletKind::Phantom];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::MetaMask => "metamask",
            WalletKind::Phantom => "phantom",
        }
    }

    /// Only MetaMask honours `wallet_watchAsset` for arbitrary ERC-20s.
    pub fn supports_watch_asset(&self) -> bool {
        matches!(self, WalletKind::MetaMask)
    }
}

/// A wallet name that matches neither family.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported wallet: {0}")]
pub struct UnknownWallet(pub String);

impl FromStr for WalletKind {
    type Err = UnknownWallet;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "metamask" | "a" => Ok(WalletKind::MetaMask),
            "phantom" | "b" => Ok(WalletKind::Phantom),
            _ => Err(UnknownWallet(value.to_string())),
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletKind::MetaMask => write!(f, "MetaMask"),
            WalletKind::Phantom => write!(f, "Phantom"),
        }
    }
}

/// Identity of a provider instance. Listener bookkeeping and stale-event
/// detection compare these, never the wallet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(pub u64);

impl ProviderId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ProviderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle returned by `on`, passed back to `remove_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Event handler registered on a provider. Payload is the raw event argument.
pub type Listener = Rc<dyn Fn(Value)>;

/// Shared handle to a provider.
pub type ProviderHandle = Rc<dyn InjectedProvider>;

/// EIP-1193 surface the core needs from a wallet.
#[async_trait(?Send)]
pub trait InjectedProvider {
    fn kind(&self) -> WalletKind;
    fn id(&self) -> ProviderId;

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    fn on(&self, event: &str, listener: Listener) -> Result<ListenerId, ProviderError>;
    fn remove_listener(&self, event: &str, id: ListenerId) -> Result<(), ProviderError>;

    /// Prompting account request.
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderError> {
        let value = self.request(methods::REQUEST_ACCOUNTS, json!([])).await?;
        Ok(parse_accounts(&value))
    }

    /// Silent account read; empty when the site is not authorized.
    async fn accounts(&self) -> Result<Vec<String>, ProviderError> {
        let value = self.request(methods::ACCOUNTS, json!([])).await?;
        Ok(parse_accounts(&value))
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let value = self.request(methods::CHAIN_ID, json!([])).await?;
        parse_quantity(&value).ok_or_else(|| ProviderError::message(format!("invalid chain id: {value}")))
    }
}

/// Accounts array as returned by `eth_accounts` / `accountsChanged`.
pub fn parse_accounts(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Hex (`0x..`) or decimal quantity, string or number.
pub fn parse_quantity(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let raw = value.as_str()?.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => Some(0),
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

pub fn to_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Host environment that may expose injected providers.
pub trait HostEnvironment {
    /// Provider for a family if the host currently injects one. Must return
    /// the same handle for the same underlying provider object.
    fn provider(&self, kind: WalletKind) -> Option<ProviderHandle>;
}

/// Enumerates available wallet families. Holds no state of its own.
#[derive(Clone)]
pub struct ProviderRegistry {
    host: Rc<dyn HostEnvironment>,
}

impl ProviderRegistry {
    pub fn new(host: Rc<dyn HostEnvironment>) -> Self {
        Self { host }
    }

    /// Families injected right now. Empty is a normal, user-visible outcome.
    pub fn list_available(&self) -> BTreeSet<WalletKind> {
        WalletKind::ALL
            .into_iter()
            .filter(|kind| self.host.provider(*kind).is_some())
            .collect()
    }

    pub fn provider(&self, kind: WalletKind) -> Option<ProviderHandle> {
        self.host.provider(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_parse_in_every_shape() {
        assert_eq!(parse_quantity(&json!("0xaa36a7")), Some(11_155_111));
        assert_eq!(parse_quantity(&json!("11155111")), Some(11_155_111));
        assert_eq!(parse_quantity(&json!(1)), Some(1));
        assert_eq!(parse_quantity(&json!("0x")), Some(0));
        assert_eq!(parse_quantity(&json!("0xzz")), None);
        assert_eq!(to_quantity(11_155_111), "0xaa36a7");
    }

    #[test]
    fn wallet_kind_round_trips_storage_strings() {
        for kind in WalletKind::ALL {
            assert_eq!(kind.as_str().parse::<WalletKind>(), Ok(kind));
        }
        assert_eq!(" MetaMask ".parse::<WalletKind>(), Ok(WalletKind::MetaMask));
        let err = "coinbase".parse::<WalletKind>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported wallet: coinbase");
    }

    #[test]
    fn registry_reports_only_injected_families() {
        let host = MemoryHost::new();
        let registry = ProviderRegistry::new(Rc::new(host.clone()));
        assert!(registry.list_available().is_empty());

        host.install(MemoryProvider::new(WalletKind::Phantom));
        let available = registry.list_available();
        assert_eq!(available.into_iter().collect::<Vec<_>>(), vec![WalletKind::Phantom]);
    }
}
