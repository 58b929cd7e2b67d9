//! SwapSession: the JS-facing wallet session
//!
//! Thin wasm-bindgen layer over `WalletSession`; errors surface as JS
//! `Error`s carrying a `kind` property from the session error taxonomy.

use super::host::BrowserHost;
use super::log;
use super::storage::LocalStoragePreferences;
use crate::core::constants::DEFAULT_ONBOARDING_MINT;
use crate::error::{OperationError, SessionError};
use crate::provider::{ProviderRegistry, WalletKind};
use crate::session::{SessionConfig, WalletSession};
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

/// Optional overrides accepted by the constructor.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionOptions {
    app: Option<String>,
    history_window: Option<u64>,
    storage_key: Option<String>,
    receipt_blocks: Option<u32>,
    watch_assets: Option<bool>,
    /// `true` for the default amount, or a number of whole tokens.
    mint_tokens: Option<serde_json::Value>,
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
    value.serialize(&serializer).unwrap_or(JsValue::NULL)
}

fn js_error(kind: &str, message: &str) -> JsValue {
    let error = js_sys::Error::new(message);
    let _ = js_sys::Reflect::set(&error, &JsValue::from_str("kind"), &JsValue::from_str(kind));
    error.into()
}

fn session_error(err: SessionError) -> JsValue {
    let kind = serde_json::to_value(&err)
        .ok()
        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(String::from))
        .unwrap_or_else(|| "Unknown".into());
    js_error(&kind, &err.to_string())
}

fn operation_error(err: OperationError) -> JsValue {
    match err {
        OperationError::Session(err) => session_error(err),
        OperationError::Reverted(_) => js_error("Reverted", &err.to_string()),
        other => js_error("InvalidInput", &other.to_string()),
    }
}

/// Handle returned by `subscribeHistory`.
#[wasm_bindgen]
pub struct HistoryListener {
    stop: Option<oneshot::Sender<()>>,
}

#[wasm_bindgen]
impl HistoryListener {
    /// Stop delivering records and release the log subscription.
    pub fn unsubscribe(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[wasm_bindgen]
pub struct SwapSession {
    session: WalletSession,
    watchers: Rc<RefCell<u32>>,
}

#[wasm_bindgen]
impl SwapSession {
    /// Create a session over the browser's injected wallets.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<SwapSession, JsValue> {
        let options: SessionOptions = if options.is_undefined() || options.is_null() {
            SessionOptions::default()
        } else {
            serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))?
        };

        let mut config = options.app.map(SessionConfig::new).unwrap_or_default();
        if let Some(blocks) = options.history_window {
            config = config.with_history_window(blocks);
        }
        if let Some(key) = options.storage_key {
            config = config.with_storage_key(key);
        }
        if let Some(blocks) = options.receipt_blocks {
            config = config.with_receipt_blocks(blocks);
        }
        if options.watch_assets == Some(false) {
            config = config.without_asset_watch();
        }
        match options.mint_tokens {
            Some(serde_json::Value::Bool(true)) => config = config.with_onboarding_mint(DEFAULT_ONBOARDING_MINT),
            Some(serde_json::Value::Number(n)) => {
                if let Some(whole) = n.as_u64().filter(|w| *w > 0) {
                    config = config.with_onboarding_mint(whole);
                }
            }
            _ => {}
        }

        let registry = ProviderRegistry::new(Rc::new(BrowserHost::new()));
        let prefs = LocalStoragePreferences::new(config.storage_key.clone());
        Ok(SwapSession { session: WalletSession::new(registry, prefs, config), watchers: Rc::new(RefCell::new(0)) })
    }

    /// Injected wallet families, e.g. `["metamask", "phantom"]`.
    #[wasm_bindgen(js_name = "availableWallets")]
    pub fn available_wallets(&self) -> JsValue {
        let kinds: Vec<&str> = self.session.available_wallets().iter().map(|k| k.as_str()).collect();
        to_js(&kinds)
    }

    #[wasm_bindgen(getter)]
    pub fn address(&self) -> Option<String> {
        self.session.address()
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> JsValue {
        to_js(&self.session.state())
    }

    pub async fn connect(&self, wallet: String) -> Result<String, JsValue> {
        let kind = wallet
            .parse::<WalletKind>()
            .map_err(|err| js_error("InvalidInput", &err.to_string()))?;
        let session = self.session.clone();
        let address = session.connect(kind).await.map_err(session_error)?;
        if session.config().watch_assets && kind.supports_watch_asset() {
            let session = session.clone();
            wasm_bindgen_futures::spawn_local(async move { session.watch_session_assets().await });
        }
        if session.config().onboarding_mint.is_some() {
            let session = session.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let minted = session.mint_if_empty().await;
                if !minted.is_empty() {
                    log!("minted {} test token(s)", minted.len());
                }
            });
        }
        Ok(address)
    }

    /// Resume the last wallet without prompting; `null` when not possible.
    pub async fn restore(&self) -> JsValue {
        let session = self.session.clone();
        match session.restore_if_approved().await {
            Some(address) => JsValue::from_str(&address),
            None => JsValue::NULL,
        }
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    #[wasm_bindgen(js_name = "networkStatus")]
    pub async fn network_status(&self) -> JsValue {
        let session = self.session.clone();
        match session.network_status().await {
            Some(status) => to_js(&status),
            None => JsValue::NULL,
        }
    }

    #[wasm_bindgen(js_name = "switchNetwork")]
    pub async fn switch_network(&self) -> Result<(), JsValue> {
        let session = self.session.clone();
        session.switch_network().await.map_err(session_error)
    }

    /// Swap records for `address`, newest first.
    pub async fn history(&self, address: String, from_block: Option<f64>) -> Result<JsValue, JsValue> {
        let reader = self
            .session
            .history_reader()
            .ok_or_else(|| session_error(SessionError::ProviderUnavailable))?;
        let records = reader.history(&address, from_block.map(|b| b as u64)).await;
        Ok(to_js(&records))
    }

    /// Call `callback(record)` for each new swap sent by `address`.
    #[wasm_bindgen(js_name = "subscribeHistory")]
    pub async fn subscribe_history(&self, address: String, callback: js_sys::Function) -> Result<HistoryListener, JsValue> {
        let reader = self
            .session
            .history_reader()
            .ok_or_else(|| session_error(SessionError::ProviderUnavailable))?;
        let subscription = reader
            .subscribe(&address)
            .await
            .map_err(|err| session_error(SessionError::from(err)))?;

        let (stop, stopped) = oneshot::channel::<()>();
        wasm_bindgen_futures::spawn_local(async move {
            let stopped = async move {
                let _ = stopped.await;
            };
            subscription
                .run_until(stopped, |record| {
                    let _ = callback.call1(&JsValue::NULL, &to_js(&record));
                })
                .await;
        });
        Ok(HistoryListener { stop: Some(stop) })
    }

    /// Forward session events to `callback`; returns a watcher number.
    pub fn watch(&self, callback: js_sys::Function) -> u32 {
        let rx = self.session.watch();
        wasm_bindgen_futures::spawn_local(async move {
            use futures::StreamExt;
            let mut rx = rx;
            while let Some(event) = rx.next().await {
                let _ = callback.call1(&JsValue::NULL, &to_js(&event));
            }
        });
        let mut count = self.watchers.borrow_mut();
        *count += 1;
        *count
    }

    pub async fn balance(&self, token: String) -> Result<String, JsValue> {
        let session = self.session.clone();
        session.token_balance(&token).await.map_err(operation_error)
    }

    pub async fn approve(&self, token: String, amount: String) -> Result<JsValue, JsValue> {
        let session = self.session.clone();
        let outcome = session.approve(&token, &amount).await.map_err(operation_error)?;
        Ok(to_js(&outcome))
    }

    pub async fn swap(&self, from: String, to: String, amount: String) -> Result<JsValue, JsValue> {
        let session = self.session.clone();
        log!("swap {} {} -> {}", amount, from, to);
        let outcome = session.swap(&from, &to, &amount).await.map_err(operation_error)?;
        Ok(to_js(&outcome))
    }

    pub async fn transaction(&self, hash: String) -> Result<JsValue, JsValue> {
        let reader = self
            .session
            .history_reader()
            .ok_or_else(|| session_error(SessionError::ProviderUnavailable))?;
        Ok(reader.transaction(&hash).await.map(|d| to_js(&d)).unwrap_or(JsValue::NULL))
    }
}
