//! Swapverse: wallet/network session layer for the SwapVerse DEX.
//!
//! # Architecture
//!
//! ```text
//! ProviderRegistry (which wallets are injected?)
//!   │
//!   ▼
//! WalletSession (connect / restore / disconnect, one session at a time)
//!   │
//!   ├── NetworkGuard (required chain, switch-or-add, change events)
//!   ├── ContractBindings (balance / approve / swap through the wallet)
//!   ├── PreferenceStore (last-used wallet marker)
//!   └── EventBus ──► SessionEvent stream (notification sink)
//!
//! TransactionHistoryReader (Swap logs ─► SwapRecord list + live feed)
//! ```
//!
//! All provider access goes through the `InjectedProvider` trait, implemented
//! for browser wallets (`wasm`), a JSON-RPC node (`native`) and a scripted
//! in-memory provider used by tests.
//!
//! # Features
//!
//! - `native` - JSON-RPC provider, file preferences, CLI, stderr logging
//! - `wasm` - browser providers, localStorage, `SwapSession` JS class, console logging
//!
//! # Usage
//!
//! ```ignore
//! use swapverse::{MemoryPreferences, ProviderRegistry, SessionConfig, WalletKind, WalletSession};
//!
//! let session = WalletSession::new(registry, MemoryPreferences::new(), SessionConfig::default());
//! let address = session.connect(WalletKind::MetaMask).await?;
//! let records = session.history_reader().unwrap().history(&address, None).await;
//! ```

// =============================================================================
// Shared modules (compile everywhere)
// =============================================================================
pub mod contracts;
pub mod core;
pub mod error;
pub mod events;
pub mod history;
pub mod logging;
pub mod network;
pub mod provider;
pub mod session;
pub mod storage;

// =============================================================================
// WASM-only modules (browser, localStorage, wasm-bindgen)
// =============================================================================
#[cfg(feature = "wasm")]
pub mod wasm;

// =============================================================================
// Re-exports: Shared
// =============================================================================
pub use contracts::{ContractBindings, SwapDirection, TxOutcome};
pub use error::{NetworkError, OperationError, ProviderError, SessionError, StorageError};
pub use events::{EventBus, SessionEvent};
pub use history::{HistorySubscription, SwapRecord, SwapStatus, TransactionDetails, TransactionHistoryReader};
pub use network::{ChainChange, ListenerHandle, NetworkGuard, NetworkStatus};
pub use provider::{
    HostEnvironment, InjectedProvider, MemoryHost, MemoryProvider, ProviderHandle, ProviderId, ProviderRegistry,
    UnknownWallet, WalletKind,
};
pub use session::{ChainDescriptor, ContractAddresses, SessionConfig, SessionState, TokenConfig, WalletSession};
pub use storage::{MemoryPreferences, PreferenceStore};

// =============================================================================
// Re-exports: Native
// =============================================================================
#[cfg(feature = "native")]
pub use provider::{RpcHost, RpcProvider};
#[cfg(feature = "native")]
pub use storage::FilePreferences;

// =============================================================================
// Re-exports: WASM
// =============================================================================
#[cfg(feature = "wasm")]
pub use wasm::{BrowserHost, BrowserProvider, LocalStoragePreferences, SwapSession};
