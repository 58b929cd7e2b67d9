//! Network guard - required-chain checks, switch-or-add negotiation and
//! provider change-event plumbing
//!
//! Compliance is always read live from the provider. The guard never touches
//! session state; it reports, negotiates and forwards events.

use crate::core::constants::{events, methods};
use crate::error::{NetworkError, ProviderError};
use crate::provider::{parse_accounts, parse_quantity, to_quantity, InjectedProvider, ListenerId, ProviderHandle, ProviderId};
use crate::session::ChainDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Display name for well-known chains.
pub fn network_name(chain_id: u64) -> String {
    match chain_id {
        1 => "Ethereum Mainnet".into(),
        11_155_111 => "Sepolia Testnet".into(),
        137 => "Polygon".into(),
        56 => "BSC".into(),
        42_161 => "Arbitrum One".into(),
        other => format!("Chain ID {other}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub chain_id: u64,
    pub chain_id_hex: String,
    pub name: String,
    pub is_required: bool,
}

impl NetworkStatus {
    pub fn for_chain(chain_id: u64, required_chain_id: u64) -> Self {
        Self {
            chain_id,
            chain_id_hex: to_quantity(chain_id),
            name: network_name(chain_id),
            is_required: chain_id == required_chain_id,
        }
    }

    /// Sentinel for an unreadable provider.
    pub fn unknown() -> Self {
        Self { chain_id: 0, chain_id_hex: "0x0".into(), name: "Unknown network".into(), is_required: false }
    }

    pub fn is_unknown(&self) -> bool {
        self.chain_id == 0
    }
}

/// Normalized `chainChanged` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainChange {
    pub chain_id: u64,
    pub chain_id_hex: String,
    pub is_required: bool,
}

/// Returned by [`NetworkGuard::subscribe`]; identifies the listener pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle {
    provider: ProviderId,
}

impl ListenerHandle {
    pub fn provider(&self) -> ProviderId {
        self.provider
    }
}

struct ListenerPair {
    provider: ProviderHandle,
    chain: ListenerId,
    accounts: ListenerId,
}

impl ListenerPair {
    fn remove(self) {
        if let Err(err) = self.provider.remove_listener(events::CHAIN_CHANGED, self.chain) {
            tracing::debug!(error = %err, "chainChanged listener removal failed");
        }
        if let Err(err) = self.provider.remove_listener(events::ACCOUNTS_CHANGED, self.accounts) {
            tracing::debug!(error = %err, "accountsChanged listener removal failed");
        }
    }
}

pub struct NetworkGuard {
    chain: ChainDescriptor,
    listeners: RefCell<HashMap<ProviderId, ListenerPair>>,
}

impl NetworkGuard {
    pub fn new(chain: ChainDescriptor) -> Self {
        Self { chain, listeners: RefCell::new(HashMap::new()) }
    }

    pub fn required_chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// True only when the provider reports the required chain. Read failures
    /// count as non-compliant.
    pub async fn is_compliant(&self, provider: &dyn InjectedProvider) -> bool {
        match provider.chain_id().await {
            Ok(chain_id) => chain_id == self.chain.chain_id,
            Err(err) => {
                tracing::debug!(error = %err, "chain id read failed");
                false
            }
        }
    }

    pub async fn current_network(&self, provider: &dyn InjectedProvider) -> NetworkStatus {
        match provider.chain_id().await {
            Ok(chain_id) => NetworkStatus::for_chain(chain_id, self.chain.chain_id),
            Err(err) => {
                tracing::debug!(error = %err, "network status unavailable");
                NetworkStatus::unknown()
            }
        }
    }

    /// Switch to the required chain, adding it first if the wallet does not
    /// know it, then confirm once.
    pub async fn enforce_compliance(&self, provider: &dyn InjectedProvider) -> Result<(), NetworkError> {
        tracing::info!(chain = self.chain.chain_id, wallet = %provider.kind(), "requesting network switch");
        match self.switch(provider).await {
            Ok(()) => {}
            Err(err) if err.is_unrecognized_chain() => self.add_chain(provider).await?,
            Err(err) if err.is_user_rejected() => return Err(NetworkError::SwitchRejected),
            Err(err) if err.is_pending() => return Err(NetworkError::Pending),
            Err(err) => return Err(NetworkError::Unavailable(err.message)),
        }

        if self.is_compliant(provider).await {
            Ok(())
        } else {
            Err(NetworkError::Unavailable(format!(
                "wallet did not move to chain {}",
                self.chain.chain_id_hex()
            )))
        }
    }

    async fn switch(&self, provider: &dyn InjectedProvider) -> Result<(), ProviderError> {
        provider
            .request(methods::SWITCH_CHAIN, json!([{"chainId": self.chain.chain_id_hex()}]))
            .await?;
        Ok(())
    }

    async fn add_chain(&self, provider: &dyn InjectedProvider) -> Result<(), NetworkError> {
        tracing::info!(chain = %self.chain.name, "chain unknown to wallet, adding");
        match provider.request(methods::ADD_CHAIN, json!([self.chain.add_chain_params()])).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_currency_symbol_mismatch() => {
                tracing::debug!("wallet knows chain under another currency symbol, switching instead");
                self.switch(provider).await.map_err(|err| {
                    if err.is_user_rejected() {
                        NetworkError::SwitchRejected
                    } else if err.is_pending() {
                        NetworkError::Pending
                    } else {
                        NetworkError::Unavailable(err.message)
                    }
                })
            }
            Err(err) if err.is_user_rejected() => Err(NetworkError::AddRejected),
            Err(err) if err.is_pending() => Err(NetworkError::Pending),
            Err(err) => Err(NetworkError::Unavailable(err.message)),
        }
    }

    /// Attach the chain/account listener pair, replacing any pair already
    /// attached to this provider.
    pub fn subscribe(
        &self,
        provider: &ProviderHandle,
        on_chain_change: impl Fn(ChainChange) + 'static,
        on_account_change: impl Fn(Vec<String>) + 'static,
    ) -> Result<ListenerHandle, ProviderError> {
        let id = provider.id();
        self.unsubscribe_provider(id);

        let required = self.chain.chain_id;
        let chain = provider.on(
            events::CHAIN_CHANGED,
            Rc::new(move |payload: Value| match parse_quantity(&payload) {
                Some(chain_id) => on_chain_change(ChainChange {
                    chain_id,
                    chain_id_hex: to_quantity(chain_id),
                    is_required: chain_id == required,
                }),
                None => tracing::debug!(%payload, "ignoring malformed chainChanged payload"),
            }),
        )?;
        let accounts = match provider.on(
            events::ACCOUNTS_CHANGED,
            Rc::new(move |payload: Value| on_account_change(parse_accounts(&payload))),
        ) {
            Ok(listener) => listener,
            Err(err) => {
                let _ = provider.remove_listener(events::CHAIN_CHANGED, chain);
                return Err(err);
            }
        };

        self.listeners
            .borrow_mut()
            .insert(id, ListenerPair { provider: provider.clone(), chain, accounts });
        Ok(ListenerHandle { provider: id })
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) {
        self.unsubscribe_provider(handle.provider);
    }

    pub fn unsubscribe_provider(&self, provider: ProviderId) {
        let pair = self.listeners.borrow_mut().remove(&provider);
        if let Some(pair) = pair {
            pair.remove();
        }
    }

    pub fn unsubscribe_all(&self) {
        let pairs: Vec<ListenerPair> = self.listeners.borrow_mut().drain().map(|(_, pair)| pair).collect();
        for pair in pairs {
            pair.remove();
        }
    }

    pub fn is_subscribed(&self, provider: ProviderId) -> bool {
        self.listeners.borrow().contains_key(&provider)
    }
}

impl Drop for NetworkGuard {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_known_chains() {
        assert_eq!(network_name(1), "Ethereum Mainnet");
        assert_eq!(network_name(42_161), "Arbitrum One");
        assert_eq!(network_name(10), "Chain ID 10");
    }

    #[test]
    fn status_flags_required_chain() {
        let status = NetworkStatus::for_chain(11_155_111, 11_155_111);
        assert!(status.is_required);
        assert_eq!(status.chain_id_hex, "0xaa36a7");
        assert!(!NetworkStatus::unknown().is_required);
        assert!(NetworkStatus::unknown().is_unknown());
    }
}
