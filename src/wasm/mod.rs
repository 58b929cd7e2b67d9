//! WASM module: SwapVerse session in the browser
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          SwapSession (JS API)           │
//! │  connect, restore, disconnect, watch    │
//! │  history, subscribeHistory, swap        │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │       WalletSession (shared core)       │
//! └───────┬─────────────────────┬───────────┘
//!         │                     │
//! ┌───────▼─────────┐   ┌───────▼───────────┐
//! │   BrowserHost   │   │ LocalStorage      │
//! │ window.ethereum │   │ Preferences       │
//! │ window.phantom  │   │ swapverse_wallet  │
//! └───────┬─────────┘   └───────────────────┘
//!         │
//! ┌───────▼─────────┐
//! │ BrowserProvider │  request() ─► Promise ─► JsFuture
//! │ (EIP-1193)      │  on()/removeListener() with Closures
//! └─────────────────┘
//! ```

mod host;
mod provider;
mod session;
mod storage;

pub use host::BrowserHost;
pub use provider::BrowserProvider;
pub use session::{HistoryListener, SwapSession};
pub use storage::LocalStoragePreferences;

use wasm_bindgen::prelude::*;

/// Initialize WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    crate::logging::init_line_logging(console_line);
}

/// Log to browser console
pub fn console_log(s: &str) {
    web_sys::console::log_1(&JsValue::from_str(s));
}

fn console_line(level: tracing::Level, line: &str) {
    let line = JsValue::from_str(line);
    match level {
        tracing::Level::ERROR => web_sys::console::error_1(&line),
        tracing::Level::WARN => web_sys::console::warn_1(&line),
        tracing::Level::INFO => web_sys::console::info_1(&line),
        _ => web_sys::console::debug_1(&line),
    }
}

macro_rules! log {
    ($($t:tt)*) => {
        crate::wasm::console_log(&format!($($t)*))
    }
}

pub(crate) use log;

/// Read a property, treating `undefined`/`null` and access errors as absent.
pub(crate) fn get_prop(target: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

pub(crate) fn is_flagged(target: &JsValue, flag: &str) -> bool {
    get_prop(target, flag).and_then(|v| v.as_bool()).unwrap_or(false)
}
