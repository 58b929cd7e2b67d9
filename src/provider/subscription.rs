//! `eth_subscribe` over the provider `message` event
//!
//! The listener is registered before the subscribe request so notifications
//! racing the response are buffered, then filtered by subscription id.

use super::{ListenerId, ProviderHandle};
use crate::core::constants::{events, methods};
use crate::error::ProviderError;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::{json, Value};
use std::rc::Rc;

/// A live push subscription. Dropping it detaches the listener; call
/// [`ProviderSubscription::unsubscribe`] to also release it provider-side.
pub struct ProviderSubscription {
    provider: ProviderHandle,
    id: String,
    listener: Option<ListenerId>,
    rx: mpsc::UnboundedReceiver<(String, Value)>,
}

impl ProviderSubscription {
    /// Issue `eth_subscribe` with `params` (e.g. `["newHeads"]`).
    pub async fn open(provider: ProviderHandle, params: Value) -> Result<Self, ProviderError> {
        let (tx, rx) = mpsc::unbounded();
        let listener = provider.on(
            events::MESSAGE,
            Rc::new(move |message: Value| {
                if let Some(notification) = parse_notification(&message) {
                    let _ = tx.unbounded_send(notification);
                }
            }),
        )?;

        let id = match provider.request(methods::SUBSCRIBE, params).await {
            Ok(value) => value.as_str().map(String::from),
            Err(err) => {
                let _ = provider.remove_listener(events::MESSAGE, listener);
                return Err(err);
            }
        };
        let Some(id) = id else {
            let _ = provider.remove_listener(events::MESSAGE, listener);
            return Err(ProviderError::message("eth_subscribe returned no subscription id"));
        };

        tracing::debug!(subscription = %id, "provider subscription opened");
        Ok(Self { provider, id, listener: Some(listener), rx })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next notification payload. `None` once detached.
    pub async fn next(&mut self) -> Option<Value> {
        while let Some((subscription, result)) = self.rx.next().await {
            if subscription == self.id {
                return Some(result);
            }
        }
        None
    }

    /// Detach the listener and cancel provider-side.
    pub async fn unsubscribe(mut self) -> Result<(), ProviderError> {
        self.detach();
        self.provider.request(methods::UNSUBSCRIBE, json!([self.id])).await?;
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            let _ = self.provider.remove_listener(events::MESSAGE, listener);
        }
        self.rx.close();
    }
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

fn parse_notification(message: &Value) -> Option<(String, Value)> {
    if message.get("type").and_then(Value::as_str) != Some(events::SUBSCRIPTION_MESSAGE) {
        return None;
    }
    let data = message.get("data")?;
    let subscription = data.get("subscription")?.as_str()?.to_string();
    Some((subscription, data.get("result").cloned().unwrap_or(Value::Null)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InjectedProvider, MemoryProvider, WalletKind};

    #[test]
    fn notifications_are_filtered_by_subscription_id() {
        let provider = MemoryProvider::new(WalletKind::MetaMask);
        let handle: ProviderHandle = provider.clone();
        futures::executor::block_on(async {
            let mut heads = ProviderSubscription::open(handle.clone(), json!(["newHeads"])).await.unwrap();
            provider.push_subscription("0xdead", json!("ignored"));
            provider.mine_block(1_700_000_000);
            let header = heads.next().await.unwrap();
            assert_eq!(header["number"], json!("0x1"));

            assert_eq!(provider.listener_count(events::MESSAGE), 1);
            heads.unsubscribe().await.unwrap();
            assert_eq!(provider.listener_count(events::MESSAGE), 0);
            assert_eq!(provider.subscription_count(), 0);
        });
        assert_eq!(handle.kind(), WalletKind::MetaMask);
    }
}
