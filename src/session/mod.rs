//! WalletSession - the single wallet connection and its lifecycle
//!
//! ```text
//!  Idle ─connect─► Connecting ─accounts─► NetworkChecking ─compliant─► Binding ─► Connected
//!   ▲                  │                        │  (enforce on mismatch)              │
//!   │                  └──────── failure ───────┴──────────────► Idle                 │
//!   │                                                                                  │
//!   └──────── disconnect (from any state) ◄── Disconnecting ◄──────────────────────────┘
//!                             Connected ◄──► NetworkChecking   (chainChanged)
//! ```
//!
//! Every connect/restore/disconnect bumps an attempt generation. An attempt
//! that wakes up after an await and finds a newer generation gives up
//! without touching state. Provider events carry the provider id and
//! generation they were registered under and are dropped when stale.

mod config;

pub use config::{ChainDescriptor, ContractAddresses, SessionConfig, TokenConfig};

use crate::contracts::{ContractBindings, ReceiptStatus, SwapDirection, TxOutcome};
use crate::core::constants::methods;
use crate::core::units::{format_units, parse_units};
use crate::error::{OperationError, SessionError};
use crate::events::{EventBus, SessionEvent};
use crate::history::TransactionHistoryReader;
use crate::network::{ChainChange, ListenerHandle, NetworkGuard, NetworkStatus};
use crate::provider::{ProviderHandle, ProviderId, ProviderRegistry, WalletKind};
use crate::storage::PreferenceStore;
use alloy_primitives::Address;
use futures::channel::mpsc;
use serde::Serialize;
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Connecting,
    NetworkChecking,
    Binding,
    Connected,
    Disconnecting,
}

/// The active connection. Exists only after the network was compliant.
struct Session {
    kind: WalletKind,
    address: Address,
    provider: ProviderHandle,
    bindings: ContractBindings,
    listener: Option<ListenerHandle>,
    watched_assets: BTreeSet<Address>,
    mint_checked: BTreeSet<Address>,
}

struct Inner {
    state: SessionState,
    session: Option<Session>,
    generation: u64,
}

struct Shared {
    inner: RefCell<Inner>,
    guard: NetworkGuard,
    registry: ProviderRegistry,
    prefs: Box<dyn PreferenceStore>,
    events: EventBus,
    config: SessionConfig,
}

/// Owner of the single wallet session. Clones share the same session.
#[derive(Clone)]
pub struct WalletSession {
    shared: Rc<Shared>,
}

impl WalletSession {
    pub fn new(registry: ProviderRegistry, prefs: impl PreferenceStore + 'static, config: SessionConfig) -> Self {
        let guard = NetworkGuard::new(config.chain.clone());
        Self {
            shared: Rc::new(Shared {
                inner: RefCell::new(Inner { state: SessionState::Idle, session: None, generation: 0 }),
                guard,
                registry,
                prefs: Box::new(prefs),
                events: EventBus::new(),
                config,
            }),
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.shared.inner.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Checksummed address of the active session.
    pub fn address(&self) -> Option<String> {
        self.shared.inner.borrow().session.as_ref().map(|s| s.address.to_checksum(None))
    }

    pub fn kind(&self) -> Option<WalletKind> {
        self.shared.inner.borrow().session.as_ref().map(|s| s.kind)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.shared.registry
    }

    pub fn guard(&self) -> &NetworkGuard {
        &self.shared.guard
    }

    pub fn available_wallets(&self) -> BTreeSet<WalletKind> {
        self.shared.registry.list_available()
    }

    /// Push stream of session events.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.shared.events.watch()
    }

    /// History reader over the active session's provider.
    pub fn history_reader(&self) -> Option<TransactionHistoryReader> {
        let provider = self.shared.inner.borrow().session.as_ref().map(|s| s.provider.clone())?;
        Some(TransactionHistoryReader::new(provider, &self.shared.config))
    }

    /// Live network status of the active session's provider.
    pub async fn network_status(&self) -> Option<NetworkStatus> {
        let provider = self.shared.inner.borrow().session.as_ref().map(|s| s.provider.clone())?;
        Some(self.shared.guard.current_network(&*provider).await)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to `kind`, enforcing the required network. Returns the
    /// checksummed account address.
    pub async fn connect(&self, kind: WalletKind) -> Result<String, SessionError> {
        let generation = self.begin_attempt();
        tracing::info!(wallet = %kind, "connecting wallet");

        let Some(provider) = self.shared.registry.provider(kind) else {
            return Err(self.fail(generation, SessionError::NotInstalled(kind)));
        };

        let accounts = provider.request_accounts().await;
        self.ensure_current(generation)?;
        let accounts = accounts.map_err(|err| self.fail(generation, err.into()))?;
        let Some(account) = accounts.first() else {
            return Err(self.fail(generation, SessionError::ProviderUnavailable));
        };
        let address: Address = account
            .parse()
            .map_err(|_| self.fail(generation, SessionError::Unknown(format!("invalid account {account}"))))?;

        self.set_state(generation, SessionState::NetworkChecking);
        let compliant = self.shared.guard.is_compliant(&*provider).await;
        self.ensure_current(generation)?;
        if !compliant {
            let enforced = self.shared.guard.enforce_compliance(&*provider).await;
            self.ensure_current(generation)?;
            enforced.map_err(|err| self.fail(generation, err.into()))?;
        }

        Ok(self.bind(generation, kind, provider, address))
    }

    /// Tear down the session, its listeners and the stored preference.
    /// Safe to call from any state, any number of times.
    pub fn disconnect(&self) {
        let session = {
            let mut inner = self.shared.inner.borrow_mut();
            inner.generation += 1;
            inner.state = SessionState::Disconnecting;
            inner.session.take()
        };
        let had_session = session.is_some();
        if let Some(session) = session {
            self.release(session);
        }
        self.clear_preference();
        self.shared.inner.borrow_mut().state = SessionState::Idle;
        if had_session {
            tracing::info!("wallet disconnected");
            self.shared.events.emit(SessionEvent::Disconnected);
        }
    }

    /// Silently resume the last wallet if it is still authorized and on the
    /// required chain. Never prompts.
    pub async fn restore_if_approved(&self) -> Option<String> {
        let kind = match self.shared.prefs.load() {
            Ok(Some(kind)) => kind,
            Ok(None) => {
                self.disconnect();
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "stored wallet preference unreadable");
                self.disconnect();
                return None;
            }
        };

        if let Some(address) = self.connected_as(kind) {
            return Some(address);
        }

        let generation = self.begin_attempt();
        let Some(provider) = self.shared.registry.provider(kind) else {
            tracing::info!(wallet = %kind, "stored wallet no longer injected");
            self.disconnect();
            return None;
        };

        let accounts = provider.accounts().await;
        if !self.is_generation(generation) {
            return None;
        }
        let address = match accounts.as_deref().map(|a| a.first().and_then(|a| a.parse::<Address>().ok())) {
            Ok(Some(address)) => address,
            Ok(None) => {
                tracing::info!(wallet = %kind, "wallet no longer authorized");
                self.disconnect();
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, wallet = %kind, "account read failed during restore");
                self.disconnect();
                return None;
            }
        };

        self.set_state(generation, SessionState::NetworkChecking);
        let compliant = self.shared.guard.is_compliant(&*provider).await;
        if !self.is_generation(generation) {
            return None;
        }
        if !compliant {
            tracing::info!(wallet = %kind, "wallet on foreign chain, not restoring");
            self.disconnect();
            return None;
        }

        Some(self.bind(generation, kind, provider, address))
    }

    /// Re-run network enforcement for a live session (user-initiated switch).
    pub async fn switch_network(&self) -> Result<(), SessionError> {
        let (provider, kind, generation) = self.live_session()?;
        let enforced = self.shared.guard.enforce_compliance(&*provider).await;
        if !self.is_live(provider.id(), generation) {
            return Err(SessionError::ProviderUnavailable);
        }
        enforced.map_err(|err| {
            let err = SessionError::from(err);
            self.shared.events.emit(SessionEvent::Error { message: err.to_string() });
            err
        })?;
        self.mark_compliant(kind);
        Ok(())
    }

    // =========================================================================
    // Chain operations
    // =========================================================================

    /// Balance of a configured token, formatted with its on-chain decimals.
    pub async fn token_balance(&self, token: &str) -> Result<String, OperationError> {
        let token = self.token(token)?;
        let bindings = self.ready().await?;
        let balance = bindings.balance_of(&token).await?;
        let decimals = bindings.decimals(&token).await.unwrap_or(token.decimals);
        Ok(format_units(balance, decimals))
    }

    /// Approve the swap contract to spend `amount` of `token`.
    pub async fn approve(&self, token: &str, amount: &str) -> Result<TxOutcome, OperationError> {
        let token = self.token(token)?;
        let bindings = self.ready().await?;
        let decimals = bindings.decimals(&token).await.unwrap_or(token.decimals);
        let value = parse_units(amount, decimals).map_err(OperationError::InvalidAmount)?;

        let hash = bindings.approve(&token, value).await?;
        tracing::info!(token = %token.symbol, %hash, "approval submitted");
        match bindings.wait_for_receipt(&hash, self.shared.config.receipt_blocks).await? {
            ReceiptStatus::Success { block } => Ok(TxOutcome::Confirmed { hash, block }),
            ReceiptStatus::Pending => Ok(TxOutcome::Pending { hash }),
            ReceiptStatus::Reverted => Err(OperationError::Reverted(hash)),
        }
    }

    /// Swap `amount` of `from` into `to`. The pair must be the configured
    /// A/B pair in either direction.
    pub async fn swap(&self, from: &str, to: &str, amount: &str) -> Result<TxOutcome, OperationError> {
        let from_token = self.token(from)?;
        let to_token = self.token(to)?;
        let direction = SwapDirection::for_pair(&self.shared.config.contracts, from_token.address, to_token.address)
            .ok_or_else(|| OperationError::InvalidPair { from: from_token.symbol.clone(), to: to_token.symbol.clone() })?;
        let value = parse_units(amount, from_token.decimals).map_err(OperationError::InvalidAmount)?;

        let bindings = self.ready().await?;
        let hash = match bindings.swap(direction, value).await {
            Ok(hash) => hash,
            Err(err) => {
                let err = SessionError::from(err);
                self.shared
                    .events
                    .emit(SessionEvent::SwapFailed { hash: None, reason: err.to_string() });
                return Err(err.into());
            }
        };
        tracing::info!(?direction, %hash, "swap submitted");
        self.shared.events.emit(SessionEvent::SwapPending { hash: hash.clone() });

        let status = match bindings.wait_for_receipt(&hash, self.shared.config.receipt_blocks).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(error = %err, %hash, "receipt unavailable");
                ReceiptStatus::Pending
            }
        };
        match status {
            ReceiptStatus::Success { block } => {
                self.shared.events.emit(SessionEvent::SwapSucceeded { hash: hash.clone() });
                Ok(TxOutcome::Confirmed { hash, block })
            }
            ReceiptStatus::Pending => Ok(TxOutcome::Pending { hash }),
            ReceiptStatus::Reverted => {
                self.shared.events.emit(SessionEvent::SwapFailed {
                    hash: Some(hash.clone()),
                    reason: "Transaction reverted".into(),
                });
                Err(OperationError::Reverted(hash))
            }
        }
    }

    /// Ask a wallet that supports it to track the pair's tokens. Each token
    /// is offered at most once per session; failures are logged only.
    pub async fn watch_session_assets(&self) {
        let Some((provider, kind, generation)) = self.live_session().ok() else { return };
        if !kind.supports_watch_asset() {
            return;
        }
        let tokens: Vec<TokenConfig> = {
            let inner = self.shared.inner.borrow();
            let watched = inner.session.as_ref().map(|s| s.watched_assets.clone()).unwrap_or_default();
            self.shared
                .config
                .contracts
                .tokens()
                .into_iter()
                .filter(|t| !watched.contains(&t.address))
                .cloned()
                .collect()
        };

        for token in tokens {
            let mut options = json!({
                "address": token.address.to_checksum(None),
                "symbol": token.symbol,
                "decimals": token.decimals,
            });
            if let Some(image) = &token.image {
                options["image"] = json!(image);
            }
            let result = provider
                .request(methods::WATCH_ASSET, json!({"type": "ERC20", "options": options}))
                .await;
            if !self.is_live(provider.id(), generation) {
                return;
            }
            match result {
                Ok(_) => {
                    if let Some(session) = self.shared.inner.borrow_mut().session.as_mut() {
                        session.watched_assets.insert(token.address);
                    }
                }
                Err(err) => tracing::warn!(error = %err, token = %token.symbol, "wallet_watchAsset failed"),
            }
        }
    }

    /// Testnet onboarding: mint the configured amount of each token the
    /// account holds none of. Runs only when enabled in the config, checks
    /// each token once per session and only logs failures. Returns the mints
    /// that were submitted.
    pub async fn mint_if_empty(&self) -> Vec<TxOutcome> {
        let mut outcomes = Vec::new();
        let Some(whole) = self.shared.config.onboarding_mint else { return outcomes };
        let Ok((provider, _, generation)) = self.live_session() else { return outcomes };
        let bindings = match self.ready().await {
            Ok(bindings) => bindings,
            Err(err) => {
                tracing::debug!(error = %err, "skipping onboarding mint");
                return outcomes;
            }
        };
        let tokens: Vec<TokenConfig> = {
            let inner = self.shared.inner.borrow();
            let checked = inner.session.as_ref().map(|s| s.mint_checked.clone()).unwrap_or_default();
            self.shared
                .config
                .contracts
                .tokens()
                .into_iter()
                .filter(|t| !checked.contains(&t.address))
                .cloned()
                .collect()
        };

        for token in tokens {
            let balance = bindings.balance_of(&token).await;
            if !self.is_live(provider.id(), generation) {
                return outcomes;
            }
            match balance {
                Ok(balance) if !balance.is_zero() => {
                    tracing::debug!(token = %token.symbol, %balance, "balance present, skipping mint");
                    self.mark_mint_checked(token.address);
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, token = %token.symbol, "balance unavailable, skipping mint");
                    continue;
                }
            }

            let decimals = bindings.decimals(&token).await.unwrap_or(token.decimals);
            let amount = match parse_units(&whole.to_string(), decimals) {
                Ok(amount) => amount,
                Err(err) => {
                    tracing::warn!(error = %err, "invalid onboarding mint amount");
                    return outcomes;
                }
            };
            let hash = match bindings.mint(&token, amount).await {
                Ok(hash) => hash,
                Err(err) => {
                    tracing::warn!(error = %err, token = %token.symbol, "mint failed");
                    continue;
                }
            };
            self.mark_mint_checked(token.address);
            tracing::info!(token = %token.symbol, amount = whole, %hash, "onboarding mint submitted");

            match bindings.wait_for_receipt(&hash, self.shared.config.receipt_blocks).await {
                Ok(ReceiptStatus::Success { block }) => outcomes.push(TxOutcome::Confirmed { hash, block }),
                Ok(ReceiptStatus::Reverted) => tracing::warn!(token = %token.symbol, %hash, "mint reverted"),
                Ok(ReceiptStatus::Pending) => outcomes.push(TxOutcome::Pending { hash }),
                Err(err) => {
                    tracing::warn!(error = %err, %hash, "mint receipt unavailable");
                    outcomes.push(TxOutcome::Pending { hash });
                }
            }
        }
        outcomes
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn mark_mint_checked(&self, token: Address) {
        if let Some(session) = self.shared.inner.borrow_mut().session.as_mut() {
            session.mint_checked.insert(token);
        }
    }

    /// Start a connect/restore attempt: supersede older attempts and drop any
    /// existing session (the stored preference is kept).
    fn begin_attempt(&self) -> u64 {
        let (generation, previous) = {
            let mut inner = self.shared.inner.borrow_mut();
            inner.generation += 1;
            inner.state = SessionState::Connecting;
            (inner.generation, inner.session.take())
        };
        if let Some(session) = previous {
            self.release(session);
            self.shared.events.emit(SessionEvent::Disconnected);
        }
        generation
    }

    fn release(&self, session: Session) {
        match session.listener {
            Some(handle) => self.shared.guard.unsubscribe(handle),
            None => self.shared.guard.unsubscribe_provider(session.provider.id()),
        }
    }

    fn is_generation(&self, generation: u64) -> bool {
        self.shared.inner.borrow().generation == generation
    }

    fn ensure_current(&self, generation: u64) -> Result<(), SessionError> {
        if self.is_generation(generation) {
            Ok(())
        } else {
            tracing::debug!(generation, "connection attempt superseded");
            Err(SessionError::Unknown("connection attempt superseded".into()))
        }
    }

    fn set_state(&self, generation: u64, state: SessionState) {
        let mut inner = self.shared.inner.borrow_mut();
        if inner.generation == generation {
            inner.state = state;
        }
    }

    /// Roll a failed attempt back to Idle and surface the error.
    fn fail(&self, generation: u64, err: SessionError) -> SessionError {
        if self.is_generation(generation) {
            {
                let mut inner = self.shared.inner.borrow_mut();
                inner.state = SessionState::Idle;
                inner.session = None;
            }
            tracing::info!(error = %err, "wallet connection failed");
            self.shared.events.emit(SessionEvent::Error { message: err.to_string() });
        }
        err
    }

    fn bind(&self, generation: u64, kind: WalletKind, provider: ProviderHandle, address: Address) -> String {
        self.set_state(generation, SessionState::Binding);
        let bindings = ContractBindings::bind(provider.clone(), address, self.shared.config.contracts.clone());
        if let Err(err) = self.shared.prefs.store(kind) {
            tracing::warn!(error = %err, "could not persist wallet preference");
        }
        let listener = self.subscribe(&provider, generation);

        {
            let mut inner = self.shared.inner.borrow_mut();
            inner.session = Some(Session {
                kind,
                address,
                provider,
                bindings,
                listener,
                watched_assets: BTreeSet::new(),
                mint_checked: BTreeSet::new(),
            });
            inner.state = SessionState::Connected;
        }

        let address = address.to_checksum(None);
        tracing::info!(wallet = %kind, %address, "wallet connected");
        self.shared.events.emit(SessionEvent::Connected { kind, address: address.clone() });
        address
    }

    fn subscribe(&self, provider: &ProviderHandle, generation: u64) -> Option<ListenerHandle> {
        let provider_id = provider.id();
        let on_chain = {
            let weak = Rc::downgrade(&self.shared);
            move |change: ChainChange| {
                if let Some(session) = upgrade(&weak) {
                    session.on_chain_changed(provider_id, generation, change);
                }
            }
        };
        let on_accounts = {
            let weak = Rc::downgrade(&self.shared);
            move |accounts: Vec<String>| {
                if let Some(session) = upgrade(&weak) {
                    session.on_accounts_changed(provider_id, generation, accounts);
                }
            }
        };
        match self.shared.guard.subscribe(provider, on_chain, on_accounts) {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "could not attach wallet listeners");
                None
            }
        }
    }

    fn is_live(&self, provider: ProviderId, generation: u64) -> bool {
        let inner = self.shared.inner.borrow();
        inner.generation == generation
            && inner.session.as_ref().map(|s| s.provider.id() == provider).unwrap_or(false)
    }

    fn on_chain_changed(&self, provider: ProviderId, generation: u64, change: ChainChange) {
        if !self.is_live(provider, generation) {
            tracing::debug!(chain = change.chain_id, "dropping stale chainChanged");
            return;
        }
        let network = NetworkStatus::for_chain(change.chain_id, self.shared.config.required_chain_id());
        self.shared
            .events
            .emit(SessionEvent::NetworkChanged { is_required: change.is_required, network });

        if change.is_required {
            if self.state() == SessionState::NetworkChecking {
                if let Some(kind) = self.kind() {
                    self.mark_compliant(kind);
                }
            }
        } else {
            tracing::info!(chain = change.chain_id, "wallet moved off the required chain");
            self.clear_preference();
            self.shared.inner.borrow_mut().state = SessionState::NetworkChecking;
        }
    }

    fn on_accounts_changed(&self, provider: ProviderId, generation: u64, accounts: Vec<String>) {
        if !self.is_live(provider, generation) {
            tracing::debug!("dropping stale accountsChanged");
            return;
        }
        let Some(first) = accounts.first() else {
            self.shared
                .events
                .emit(SessionEvent::AccountChanged { accounts: Vec::new(), is_connected: false });
            self.disconnect();
            return;
        };
        let Ok(address) = first.parse::<Address>() else {
            tracing::debug!(account = %first, "ignoring malformed account");
            return;
        };

        {
            let mut inner = self.shared.inner.borrow_mut();
            if let Some(session) = inner.session.as_mut() {
                if session.address != address {
                    session.address = address;
                    session.bindings =
                        ContractBindings::bind(session.provider.clone(), address, self.shared.config.contracts.clone());
                    session.watched_assets.clear();
                    session.mint_checked.clear();
                }
            }
        }
        tracing::info!(address = %address.to_checksum(None), "wallet account changed");
        self.shared.events.emit(SessionEvent::AccountChanged { accounts, is_connected: true });
    }

    fn live_session(&self) -> Result<(ProviderHandle, WalletKind, u64), SessionError> {
        let inner = self.shared.inner.borrow();
        let session = inner.session.as_ref().ok_or(SessionError::ProviderUnavailable)?;
        Ok((session.provider.clone(), session.kind, inner.generation))
    }

    /// Bindings for a chain operation after a live compliance check.
    async fn ready(&self) -> Result<ContractBindings, SessionError> {
        let (provider, kind, generation) = self.live_session()?;
        let network = self.shared.guard.current_network(&*provider).await;
        if !self.is_live(provider.id(), generation) {
            return Err(SessionError::ProviderUnavailable);
        }

        if !network.is_required {
            let was_connected = self.state() == SessionState::Connected;
            self.clear_preference();
            self.shared.inner.borrow_mut().state = SessionState::NetworkChecking;
            if was_connected {
                self.shared.events.emit(SessionEvent::NetworkChanged { is_required: false, network });
            }
            return Err(SessionError::NetworkUnavailable);
        }

        if self.state() == SessionState::NetworkChecking {
            self.mark_compliant(kind);
        }
        let inner = self.shared.inner.borrow();
        inner
            .session
            .as_ref()
            .map(|s| s.bindings.clone())
            .ok_or(SessionError::ProviderUnavailable)
    }

    fn mark_compliant(&self, kind: WalletKind) {
        self.shared.inner.borrow_mut().state = SessionState::Connected;
        if let Err(err) = self.shared.prefs.store(kind) {
            tracing::warn!(error = %err, "could not persist wallet preference");
        }
    }

    fn connected_as(&self, kind: WalletKind) -> Option<String> {
        let inner = self.shared.inner.borrow();
        match (&inner.session, inner.state) {
            (Some(session), SessionState::Connected) if session.kind == kind => Some(session.address.to_checksum(None)),
            _ => None,
        }
    }

    fn token(&self, key: &str) -> Result<TokenConfig, OperationError> {
        self.shared
            .config
            .contracts
            .token(key)
            .cloned()
            .ok_or_else(|| OperationError::UnknownToken(key.to_string()))
    }

    fn clear_preference(&self) {
        if let Err(err) = self.shared.prefs.clear() {
            tracing::warn!(error = %err, "could not clear wallet preference");
        }
    }
}

fn upgrade(weak: &Weak<Shared>) -> Option<WalletSession> {
    weak.upgrade().map(|shared| WalletSession { shared })
}
