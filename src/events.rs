//! Session events pushed to the notification sink
//!
//! Consumers `watch()` the bus and render toasts, refresh balances or re-run
//! history. Closed receivers are pruned on the next emit.

use crate::network::NetworkStatus;
use crate::provider::WalletKind;
use futures::channel::mpsc;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    NetworkChanged { is_required: bool, network: NetworkStatus },
    #[serde(rename_all = "camelCase")]
    AccountChanged { accounts: Vec<String>, is_connected: bool },
    Connected { kind: WalletKind, address: String },
    Disconnected,
    Error { message: String },
    SwapPending { hash: String },
    SwapSucceeded { hash: String },
    SwapFailed { hash: Option<String>, reason: String },
}

#[derive(Clone, Default)]
pub struct EventBus {
    watchers: Rc<RefCell<Vec<mpsc::UnboundedSender<SessionEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.watchers.borrow_mut().push(tx);
        rx
    }

    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!(?event, "session event");
        self.watchers
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SessionEvent::AccountChanged { accounts: vec![], is_connected: false };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "accountChanged", "accounts": [], "isConnected": false})
        );
    }

    #[test]
    fn dropped_watchers_are_pruned() {
        let bus = EventBus::new();
        let mut kept = bus.watch();
        drop(bus.watch());
        bus.emit(SessionEvent::Disconnected);
        assert_eq!(bus.watcher_count(), 1);
        assert_eq!(kept.try_next().unwrap(), Some(SessionEvent::Disconnected));
    }
}
