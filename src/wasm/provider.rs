//! EIP-1193 provider backed by an injected browser object

use super::get_prop;
use crate::core::constants::codes;
use crate::error::ProviderError;
use crate::provider::{InjectedProvider, Listener, ListenerId, ProviderId, WalletKind};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

type JsListener = Closure<dyn FnMut(JsValue)>;

pub struct BrowserProvider {
    id: ProviderId,
    kind: WalletKind,
    inner: JsValue,
    listeners: RefCell<HashMap<u64, (String, JsListener)>>,
    // Closures removed from the provider may still be on the JS stack (a
    // handler that disconnects); they are kept until the provider is dropped.
    retired: RefCell<Vec<JsListener>>,
    next_listener: Cell<u64>,
}

impl BrowserProvider {
    pub fn new(kind: WalletKind, inner: JsValue) -> Self {
        Self {
            id: ProviderId::next(),
            kind,
            inner,
            listeners: RefCell::new(HashMap::new()),
            retired: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
        }
    }

    /// The injected JS object this wraps.
    pub fn js(&self) -> &JsValue {
        &self.inner
    }

    fn method(&self, name: &str) -> Option<js_sys::Function> {
        get_prop(&self.inner, name).and_then(|v| v.dyn_into::<js_sys::Function>().ok())
    }
}

/// Provider rejection (`{code, message, data}`) as a `ProviderError`.
fn js_error(value: JsValue) -> ProviderError {
    let code = get_prop(&value, "code").and_then(|c| c.as_f64()).map(|c| c as i64);
    let message = get_prop(&value, "message")
        .and_then(|m| m.as_string())
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{value:?}"));
    let data = get_prop(&value, "data").and_then(|d| serde_wasm_bindgen::from_value::<Value>(d).ok());
    ProviderError { code, message, data }
}

#[async_trait(?Send)]
impl InjectedProvider for BrowserProvider {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn id(&self) -> ProviderId {
        self.id
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let request_fn = self
            .method("request")
            .ok_or_else(|| ProviderError::new(codes::DISCONNECTED, "provider.request is unavailable"))?;

        let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
        let args = json!({"method": method, "params": params})
            .serialize(&serializer)
            .map_err(|e| ProviderError::message(format!("encode {method}: {e}")))?;

        let promise = request_fn.call1(&self.inner, &args).map_err(js_error)?;
        let promise = promise
            .dyn_into::<js_sys::Promise>()
            .map_err(|_| ProviderError::message(format!("{method} did not return a Promise")))?;
        let result = JsFuture::from(promise).await.map_err(js_error)?;
        if result.is_undefined() || result.is_null() {
            return Ok(Value::Null);
        }
        serde_wasm_bindgen::from_value(result).map_err(|e| ProviderError::message(format!("decode {method}: {e}")))
    }

    fn on(&self, event: &str, listener: Listener) -> Result<ListenerId, ProviderError> {
        let on_fn = self
            .method("on")
            .or_else(|| self.method("addListener"))
            .ok_or_else(|| ProviderError::unsupported_method("on"))?;

        let closure = JsListener::new(move |value: JsValue| {
            let payload = serde_wasm_bindgen::from_value::<Value>(value).unwrap_or(Value::Null);
            listener(payload);
        });
        on_fn
            .call2(&self.inner, &JsValue::from_str(event), closure.as_ref().unchecked_ref())
            .map_err(js_error)?;

        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().insert(id, (event.to_string(), closure));
        Ok(ListenerId(id))
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> Result<(), ProviderError> {
        let Some((registered, closure)) = self.listeners.borrow_mut().remove(&id.0) else {
            return Ok(());
        };
        let result = match self.method("removeListener").or_else(|| self.method("off")) {
            Some(remove_fn) => remove_fn
                .call2(&self.inner, &JsValue::from_str(&registered), closure.as_ref().unchecked_ref())
                .map(|_| ())
                .map_err(js_error),
            None => Err(ProviderError::unsupported_method("removeListener")),
        };
        if registered != event {
            tracing::debug!(%event, %registered, "listener removed under its registered event");
        }
        self.retired.borrow_mut().push(closure);
        result
    }
}
