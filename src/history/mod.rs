//! Swap history reconstructed from `Swap` event logs
//!
//! There is no backing database: a scan asks the node for the swap
//! contract's logs over a recent block window, keeps the ones whose
//! transaction the user sent, and stamps them with block timestamps.
//!
//! ```text
//! eth_blockNumber ─► eth_getLogs(Swap, [from, latest])
//!                         │ dedupe by tx hash
//!                         ▼
//!        join_all(eth_getTransactionByHash)  ── keep tx.from == user
//!                         ▼
//!        join_all(eth_getBlockByNumber)      ── timestamps
//!                         ▼
//!                  Vec<SwapRecord> newest first
//! ```
//!
//! Per-entry read failures drop the entry; a failed scan yields an empty
//! list. Live mode rides `eth_subscribe("logs")` and does not backfill.

use crate::contracts::abi::{decode_swap, swap_topic, SwapLog};
use crate::contracts::receipt_succeeded;
use crate::core::constants::{methods, LIVE_FEED_DEDUPE};
use crate::core::units::format_units;
use crate::error::ProviderError;
use crate::provider::{parse_quantity, to_quantity, ProviderHandle, ProviderSubscription};
use crate::session::{ContractAddresses, SessionConfig};
use alloy_primitives::{hex, Address, B256, U256};
use futures::future::join_all;
use futures::{Future, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStatus {
    Completed,
    /// Seen in a pending log without a block yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub transaction_hash: String,
    pub from_asset: String,
    pub to_asset: String,
    pub amount: String,
    pub block_number: Option<u64>,
    pub block_timestamp: u64,
    pub status: SwapStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    /// Native value in ether.
    pub value: String,
    pub gas_used: Option<String>,
    /// Gas price in gwei.
    pub gas_price: Option<String>,
    pub block_number: Option<u64>,
    pub timestamp: Option<u64>,
    pub status: TransactionStatus,
}

/// A `Swap` log as the node reported it.
#[derive(Debug, Clone)]
struct SwapEvent {
    hash: String,
    block: Option<u64>,
    log_index: u64,
    swap: SwapLog,
}

fn parse_swap_event(log: &Value) -> Option<SwapEvent> {
    if log.get("removed").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let topics: Vec<B256> = log
        .get("topics")?
        .as_array()?
        .iter()
        .filter_map(|t| t.as_str()?.parse().ok())
        .collect();
    let data = hex::decode(log.get("data")?.as_str()?).ok()?;
    let swap = decode_swap(&topics, &data)?;
    Some(SwapEvent {
        hash: log.get("transactionHash")?.as_str()?.to_string(),
        block: log.get("blockNumber").and_then(parse_quantity),
        log_index: log.get("logIndex").and_then(parse_quantity).unwrap_or(0),
        swap,
    })
}

fn parse_address(value: Option<&Value>) -> Option<Address> {
    value?.as_str()?.parse().ok()
}

fn parse_u256(value: Option<&Value>) -> Option<U256> {
    value?.as_str()?.parse().ok()
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

#[derive(Clone)]
pub struct TransactionHistoryReader {
    provider: ProviderHandle,
    contracts: ContractAddresses,
    window: u64,
}

impl TransactionHistoryReader {
    pub fn new(provider: ProviderHandle, config: &SessionConfig) -> Self {
        Self { provider, contracts: config.contracts.clone(), window: config.history_window }
    }

    pub fn with_window(mut self, blocks: u64) -> Self {
        self.window = blocks;
        self
    }

    fn log_filter(&self) -> Value {
        json!({
            "address": self.contracts.token_swap.to_checksum(None),
            "topics": [hex::encode_prefixed(swap_topic())],
        })
    }

    /// Swaps sent by `address`, newest first. Never fails: an unreadable
    /// chain yields an empty list.
    pub async fn history(&self, address: &str, from_block: Option<u64>) -> Vec<SwapRecord> {
        let Ok(owner) = address.trim().parse::<Address>() else {
            tracing::warn!(%address, "history requested for invalid address");
            return Vec::new();
        };
        match self.scan(owner, from_block).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, %address, "swap history scan failed");
                Vec::new()
            }
        }
    }

    async fn scan(&self, owner: Address, from_block: Option<u64>) -> Result<Vec<SwapRecord>, ProviderError> {
        let latest = self.provider.request(methods::BLOCK_NUMBER, json!([])).await?;
        let latest = parse_quantity(&latest)
            .ok_or_else(|| ProviderError::message(format!("invalid block number: {latest}")))?;
        let from = from_block.unwrap_or_else(|| latest.saturating_sub(self.window));

        let mut filter = self.log_filter();
        filter["fromBlock"] = json!(to_quantity(from));
        filter["toBlock"] = json!(to_quantity(latest));
        let logs = self.provider.request(methods::GET_LOGS, json!([filter])).await?;

        let mut seen = HashSet::new();
        let events: Vec<SwapEvent> = logs
            .as_array()
            .map(|logs| logs.iter().filter_map(parse_swap_event).collect())
            .unwrap_or_default();
        let events: Vec<SwapEvent> = events.into_iter().filter(|e| seen.insert(e.hash.clone())).collect();
        tracing::debug!(from, latest, logs = events.len(), "swap logs fetched");

        let senders = join_all(events.iter().map(|e| self.sender_of(&e.hash))).await;
        let mine: Vec<SwapEvent> = events
            .into_iter()
            .zip(senders)
            .filter_map(|(event, sender)| (sender == Some(owner)).then_some(event))
            .collect();

        let blocks: HashSet<u64> = mine.iter().filter_map(|e| e.block).collect();
        let blocks: Vec<u64> = blocks.into_iter().collect();
        let stamps = join_all(blocks.iter().map(|b| self.block_timestamp(*b))).await;
        let stamps: HashMap<u64, u64> = blocks
            .into_iter()
            .zip(stamps)
            .filter_map(|(block, stamp)| stamp.map(|s| (block, s)))
            .collect();

        let mut resolved: Vec<(SwapRecord, u64)> = mine
            .into_iter()
            .filter_map(|event| {
                let timestamp = match event.block {
                    Some(block) => *stamps.get(&block)?,
                    None => now_secs(),
                };
                let index = event.log_index;
                Some((self.record(event, timestamp), index))
            })
            .collect();

        resolved.sort_by(|(a, ai), (b, bi)| {
            b.block_timestamp
                .cmp(&a.block_timestamp)
                .then(b.block_number.cmp(&a.block_number))
                .then(bi.cmp(ai))
        });
        Ok(resolved.into_iter().map(|(record, _)| record).collect())
    }

    async fn sender_of(&self, hash: &str) -> Option<Address> {
        match self.provider.request(methods::GET_TRANSACTION, json!([hash])).await {
            Ok(tx) => parse_address(tx.get("from")),
            Err(err) => {
                tracing::debug!(error = %err, %hash, "skipping swap with unreadable transaction");
                None
            }
        }
    }

    async fn block_timestamp(&self, block: u64) -> Option<u64> {
        match self.provider.request(methods::GET_BLOCK, json!([to_quantity(block), false])).await {
            Ok(header) => header.get("timestamp").and_then(parse_quantity),
            Err(err) => {
                tracing::debug!(error = %err, block, "skipping swaps in unreadable block");
                None
            }
        }
    }

    fn record(&self, event: SwapEvent, timestamp: u64) -> SwapRecord {
        let decimals = self.contracts.decimals_for(event.swap.from_token);
        SwapRecord {
            transaction_hash: event.hash,
            from_asset: self.contracts.symbol_for(event.swap.from_token),
            to_asset: self.contracts.symbol_for(event.swap.to_token),
            amount: format_units(event.swap.amount, decimals),
            block_number: event.block,
            block_timestamp: timestamp,
            status: if event.block.is_some() { SwapStatus::Completed } else { SwapStatus::Pending },
        }
    }

    /// Resolve one pushed log into a record for `owner`.
    async fn resolve_live(&self, log: &Value, owner: Address) -> Option<SwapRecord> {
        let event = parse_swap_event(log)?;
        if self.sender_of(&event.hash).await? != owner {
            return None;
        }
        let timestamp = match event.block {
            Some(block) => self.block_timestamp(block).await?,
            None => now_secs(),
        };
        Some(self.record(event, timestamp))
    }

    /// Follow new swaps sent by `address`.
    pub async fn subscribe(&self, address: &str) -> Result<HistorySubscription, ProviderError> {
        let owner: Address = address
            .trim()
            .parse()
            .map_err(|e| ProviderError::message(format!("invalid address {address}: {e}")))?;
        let inner = ProviderSubscription::open(self.provider.clone(), json!(["logs", self.log_filter()])).await?;
        tracing::debug!(%owner, subscription = inner.id(), "following swap logs");
        Ok(HistorySubscription { inner, reader: self.clone(), owner, seen: RecentHashes::new(LIVE_FEED_DEDUPE) })
    }

    /// Sender, recipient, fees and outcome of a transaction; `None` when the
    /// node does not know it.
    pub async fn transaction(&self, hash: &str) -> Option<TransactionDetails> {
        let tx = match self.provider.request(methods::GET_TRANSACTION, json!([hash])).await {
            Ok(tx) if !tx.is_null() => tx,
            Ok(_) => return None,
            Err(err) => {
                tracing::warn!(error = %err, %hash, "transaction lookup failed");
                return None;
            }
        };
        let receipt = self
            .provider
            .request(methods::GET_RECEIPT, json!([hash]))
            .await
            .unwrap_or(Value::Null);
        let block_number = tx.get("blockNumber").and_then(parse_quantity);
        let timestamp = match block_number {
            Some(block) => self.block_timestamp(block).await,
            None => None,
        };
        let status = match receipt_succeeded(&receipt) {
            Some(true) => TransactionStatus::Success,
            Some(false) => TransactionStatus::Failed,
            None => TransactionStatus::Pending,
        };

        Some(TransactionDetails {
            hash: hash.to_string(),
            from: parse_address(tx.get("from")).map(|a| a.to_checksum(None)).unwrap_or_default(),
            to: parse_address(tx.get("to")).map(|a| a.to_checksum(None)),
            value: format_units(parse_u256(tx.get("value")).unwrap_or(U256::ZERO), 18),
            gas_used: parse_u256(receipt.get("gasUsed")).map(|g| g.to_string()),
            gas_price: parse_u256(tx.get("gasPrice")).map(|p| format_units(p, 9)),
            block_number,
            timestamp,
            status,
        })
    }
}

/// Live feed of the user's new swaps.
pub struct HistorySubscription {
    inner: ProviderSubscription,
    reader: TransactionHistoryReader,
    owner: Address,
    seen: RecentHashes,
}

/// Bounded set of recently delivered transaction hashes; the oldest entry
/// is evicted once `capacity` is reached.
struct RecentHashes {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl RecentHashes {
    fn new(capacity: usize) -> Self {
        Self { order: VecDeque::new(), set: HashSet::new(), capacity: capacity.max(1) }
    }

    /// `true` if `hash` was not among the recent ones.
    fn insert(&mut self, hash: String) -> bool {
        if self.set.contains(&hash) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.set.insert(hash.clone());
        self.order.push_back(hash);
        true
    }
}

impl HistorySubscription {
    /// Next swap sent by the subscribed address. `None` once detached.
    pub async fn next(&mut self) -> Option<SwapRecord> {
        loop {
            let log = self.inner.next().await?;
            if let Some(record) = self.reader.resolve_live(&log, self.owner).await {
                if self.seen.insert(record.transaction_hash.clone()) {
                    return Some(record);
                }
            }
        }
    }

    /// Deliver records to `on_record` until the feed ends.
    pub async fn run(self, on_record: impl FnMut(SwapRecord)) {
        self.run_until(futures::future::pending::<()>(), on_record).await
    }

    /// Deliver records until `stop` resolves, then unsubscribe.
    pub async fn run_until(mut self, stop: impl Future<Output = ()>, mut on_record: impl FnMut(SwapRecord)) {
        let stop = stop.fuse();
        futures::pin_mut!(stop);
        loop {
            let next = self.next().fuse();
            futures::pin_mut!(next);
            futures::select! {
                record = next => match record {
                    Some(record) => on_record(record),
                    None => break,
                },
                _ = stop => break,
            }
        }
        if let Err(err) = self.unsubscribe().await {
            tracing::debug!(error = %err, "swap log unsubscribe failed");
        }
    }

    pub async fn unsubscribe(self) -> Result<(), ProviderError> {
        self.inner.unsubscribe().await
    }
}
