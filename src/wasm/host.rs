//! Browser host: locates injected providers on `window`
//!
//! Family A is `window.ethereum` (or the `isMetaMask` entry of
//! `window.ethereum.providers` when several extensions inject). A provider
//! that only claims `isPhantom` is never taken for family A. Family B is
//! `window.phantom.ethereum`.

use super::provider::BrowserProvider;
use super::{get_prop, is_flagged};
use crate::provider::{HostEnvironment, ProviderHandle, WalletKind};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use wasm_bindgen::JsValue;

/// Hands out one wrapper per injected object so listener bookkeeping keyed by
/// provider id stays valid across lookups.
#[derive(Default)]
pub struct BrowserHost {
    cache: RefCell<BTreeMap<WalletKind, Rc<BrowserProvider>>>,
}

impl BrowserHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn locate(kind: WalletKind) -> Option<JsValue> {
        let window: JsValue = web_sys::window()?.into();
        match kind {
            WalletKind::MetaMask => {
                let ethereum = get_prop(&window, "ethereum")?;
                if let Some(providers) = get_prop(&ethereum, "providers").filter(js_sys::Array::is_array) {
                    let found = js_sys::Array::from(&providers)
                        .iter()
                        .find(|p| is_flagged(p, "isMetaMask") && !is_flagged(p, "isPhantom"));
                    if found.is_some() {
                        return found;
                    }
                }
                let phantom_only = is_flagged(&ethereum, "isPhantom") && !is_flagged(&ethereum, "isMetaMask");
                (!phantom_only).then_some(ethereum)
            }
            WalletKind::Phantom => get_prop(&window, "phantom").and_then(|p| get_prop(&p, "ethereum")),
        }
    }
}

impl HostEnvironment for BrowserHost {
    fn provider(&self, kind: WalletKind) -> Option<ProviderHandle> {
        let Some(js) = Self::locate(kind) else {
            self.cache.borrow_mut().remove(&kind);
            return None;
        };
        let mut cache = self.cache.borrow_mut();
        if let Some(cached) = cache.get(&kind) {
            if js_sys::Object::is(cached.js(), &js) {
                return Some(cached.clone() as ProviderHandle);
            }
        }
        let wrapper = Rc::new(BrowserProvider::new(kind, js));
        cache.insert(kind, wrapper.clone());
        Some(wrapper as ProviderHandle)
    }
}
