//! JSON-RPC node as a provider (native)
//!
//! Speaks plain HTTP JSON-RPC to a node such as a local anvil/hardhat
//! instance. Accounts are the node's unlocked accounts; there is no prompt,
//! so `eth_requestAccounts` is served by `eth_accounts`. Listeners are
//! accepted but never fire and `eth_subscribe` is reported unsupported.

use super::{HostEnvironment, InjectedProvider, Listener, ListenerId, ProviderHandle, ProviderId, WalletKind};
use crate::core::constants::{codes, methods};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::cell::Cell;
use std::rc::Rc;

/// Default local node endpoint.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

pub struct RpcProvider {
    id: ProviderId,
    kind: WalletKind,
    url: String,
    client: reqwest::Client,
    next_request: Cell<u64>,
    next_listener: Cell<u64>,
}

impl RpcProvider {
    pub fn new(kind: WalletKind, url: impl Into<String>) -> Self {
        Self {
            id: ProviderId::next(),
            kind,
            url: url.into(),
            client: reqwest::Client::new(),
            next_request: Cell::new(1),
            next_listener: Cell::new(1),
        }
    }

    /// Endpoint from `SWAPVERSE_RPC_URL`, else the local node.
    pub fn from_env(kind: WalletKind) -> Self {
        let url = std::env::var("SWAPVERSE_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        Self::new(kind, url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_request.get();
        self.next_request.set(id + 1);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(codes::DISCONNECTED, format!("rpc transport: {e}")))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::message(format!("rpc decode: {e}")))?;

        if let Some(error) = payload.get("error") {
            return Err(ProviderError::from_value(error));
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait(?Send)]
impl InjectedProvider for RpcProvider {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn id(&self) -> ProviderId {
        self.id
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        tracing::trace!(%method, url = %self.url, "rpc request");
        match method {
            methods::REQUEST_ACCOUNTS => self.call(methods::ACCOUNTS, params).await,
            methods::SUBSCRIBE | methods::UNSUBSCRIBE | methods::WATCH_ASSET => {
                Err(ProviderError::unsupported_method(method))
            }
            _ => self.call(method, params).await,
        }
    }

    fn on(&self, _event: &str, _listener: Listener) -> Result<ListenerId, ProviderError> {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        Ok(id)
    }

    fn remove_listener(&self, _event: &str, _id: ListenerId) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Host exposing a single JSON-RPC endpoint under one wallet family.
pub struct RpcHost {
    provider: Rc<RpcProvider>,
}

impl RpcHost {
    pub fn new(provider: RpcProvider) -> Self {
        Self { provider: Rc::new(provider) }
    }
}

impl HostEnvironment for RpcHost {
    fn provider(&self, kind: WalletKind) -> Option<ProviderHandle> {
        (self.provider.kind == kind).then(|| self.provider.clone() as ProviderHandle)
    }
}
