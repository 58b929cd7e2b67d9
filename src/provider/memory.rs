//! In-memory injected provider and host
//!
//! A scripted stand-in for a wallet extension plus the chain behind it:
//! accounts, chain switching, listeners, blocks, transactions, `Swap` logs,
//! receipts and `eth_subscribe` push. Used by tests and native demos the way
//! a memory namespace backs a node without IndexedDB.

use super::{parse_quantity, to_quantity, HostEnvironment, InjectedProvider, Listener, ListenerId, ProviderHandle, ProviderId, WalletKind};
use crate::contracts::abi::{encode_swap, SwapLog, IERC20};
use crate::core::constants::{events, methods, sepolia};
use crate::error::ProviderError;
use alloy_primitives::{hex, Address, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

const GAS_PRICE: &str = "0x3b9aca00";
const GAS_USED: &str = "0xc350";

struct MemoryState {
    wallet_accounts: Vec<String>,
    authorized: bool,
    chain_id: u64,
    known_chains: BTreeSet<u64>,
    failures: HashMap<String, VecDeque<ProviderError>>,
    holds: HashMap<String, VecDeque<oneshot::Receiver<()>>>,
    requests: Vec<(String, Value)>,
    head: u64,
    blocks: BTreeMap<u64, u64>,
    transactions: HashMap<String, Value>,
    logs: Vec<Value>,
    receipts: HashMap<String, Value>,
    balances: HashMap<(Address, Address), U256>,
    decimals: u8,
    revert_sends: bool,
    subscriptions: BTreeMap<String, Value>,
    next_hash: u64,
    next_subscription: u64,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            wallet_accounts: Vec::new(),
            authorized: false,
            chain_id: sepolia::CHAIN_ID,
            known_chains: BTreeSet::from([1, sepolia::CHAIN_ID]),
            failures: HashMap::new(),
            holds: HashMap::new(),
            requests: Vec::new(),
            head: 0,
            blocks: BTreeMap::new(),
            transactions: HashMap::new(),
            logs: Vec::new(),
            receipts: HashMap::new(),
            balances: HashMap::new(),
            decimals: 18,
            revert_sends: false,
            subscriptions: BTreeMap::new(),
            next_hash: 1,
            next_subscription: 1,
        }
    }
}

/// Scripted injected provider.
pub struct MemoryProvider {
    id: ProviderId,
    kind: WalletKind,
    state: RefCell<MemoryState>,
    listeners: RefCell<Vec<(ListenerId, String, Listener)>>,
    next_listener: Cell<u64>,
}

impl MemoryProvider {
    /// Provider on the required chain with no accounts.
    pub fn new(kind: WalletKind) -> Rc<Self> {
        Rc::new(Self {
            id: ProviderId::next(),
            kind,
            state: RefCell::new(MemoryState::default()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
        })
    }

    /// Provider holding `accounts`, currently on `chain_id`.
    pub fn with_accounts(kind: WalletKind, accounts: &[&str], chain_id: u64) -> Rc<Self> {
        let provider = Self::new(kind);
        {
            let mut state = provider.state.borrow_mut();
            state.wallet_accounts = accounts.iter().map(|a| a.to_string()).collect();
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        provider
    }

    // =========================================================================
    // Wallet scripting
    // =========================================================================

    /// Mark the site as already authorized (a previous session approved it).
    pub fn authorize(&self) {
        self.state.borrow_mut().authorized = true;
    }

    pub fn set_chain(&self, chain_id: u64) {
        let mut state = self.state.borrow_mut();
        state.chain_id = chain_id;
        state.known_chains.insert(chain_id);
    }

    /// Remove a chain from the wallet so switching to it reports 4902.
    pub fn forget_chain(&self, chain_id: u64) {
        self.state.borrow_mut().known_chains.remove(&chain_id);
    }

    pub fn current_chain(&self) -> u64 {
        self.state.borrow().chain_id
    }

    /// Next call to `method` fails with `err`. Queues in order.
    pub fn fail_next(&self, method: &str, err: ProviderError) {
        self.state
            .borrow_mut()
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back(err);
    }

    /// Next call to `method` suspends until the returned sender fires
    /// (or is dropped), like a wallet dialog left open.
    pub fn hold_next(&self, method: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .borrow_mut()
            .holds
            .entry(method.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    /// Methods requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.borrow().requests.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.state.borrow().requests.iter().filter(|(m, _)| m == method).count()
    }

    /// Params of every request to `method`.
    pub fn request_params(&self, method: &str) -> Vec<Value> {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.borrow().iter().filter(|(_, e, _)| e == event).count()
    }

    /// Fire `event` to every listener registered for it.
    pub fn emit(&self, event: &str, payload: Value) {
        let targets: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, e, _)| e == event)
            .map(|(_, _, l)| l.clone())
            .collect();
        for listener in targets {
            listener(payload.clone());
        }
    }

    /// User switched chains inside the wallet.
    pub fn emit_chain_changed(&self, chain_id: u64) {
        self.set_chain(chain_id);
        self.emit(events::CHAIN_CHANGED, json!(to_quantity(chain_id)));
    }

    /// User switched or revoked accounts inside the wallet.
    pub fn emit_accounts_changed(&self, accounts: &[&str]) {
        {
            let mut state = self.state.borrow_mut();
            state.wallet_accounts = accounts.iter().map(|a| a.to_string()).collect();
            state.authorized = !accounts.is_empty();
        }
        self.emit(events::ACCOUNTS_CHANGED, json!(accounts));
    }

    // =========================================================================
    // Chain scripting
    // =========================================================================

    /// Append a block with `timestamp`; notifies `newHeads` subscribers.
    pub fn mine_block(&self, timestamp: u64) -> u64 {
        let (number, heads) = {
            let mut state = self.state.borrow_mut();
            state.head += 1;
            let number = state.head;
            state.blocks.insert(number, timestamp);
            let heads: Vec<String> = state
                .subscriptions
                .iter()
                .filter(|(_, params)| params.get(0).and_then(Value::as_str) == Some("newHeads"))
                .map(|(id, _)| id.clone())
                .collect();
            (number, heads)
        };
        let header = json!({"number": to_quantity(number), "timestamp": to_quantity(timestamp)});
        for id in heads {
            self.push_subscription(&id, header.clone());
        }
        number
    }

    /// Advance the head without recording the block (reads of it fail).
    pub fn skip_block(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.head += 1;
        state.head
    }

    pub fn head(&self) -> u64 {
        self.state.borrow().head
    }

    /// Record a `Swap` log emitted by `contract` in `block`, inside a
    /// transaction sent by `sender`. Returns the transaction hash. Live log
    /// subscriptions are notified.
    pub fn add_swap(&self, contract: Address, sender: &str, block: u64, swap: SwapLog) -> String {
        let hash = {
            let mut state = self.state.borrow_mut();
            let hash = next_hash(&mut state);
            state.transactions.insert(
                hash.clone(),
                json!({
                    "hash": hash,
                    "from": sender,
                    "to": contract.to_checksum(None),
                    "value": "0x0",
                    "gasPrice": GAS_PRICE,
                    "blockNumber": to_quantity(block),
                }),
            );
            state.receipts.insert(
                hash.clone(),
                json!({"transactionHash": hash, "status": "0x1", "gasUsed": GAS_USED, "blockNumber": to_quantity(block)}),
            );
            hash
        };
        self.push_swap_log(contract, &hash, block, swap);
        hash
    }

    /// Append another `Swap` log to a transaction made by [`add_swap`](Self::add_swap),
    /// as a contract emitting several events in one call would.
    pub fn add_swap_log(&self, hash: &str, swap: SwapLog) {
        let target = {
            let state = self.state.borrow();
            state.transactions.get(hash).and_then(|tx| {
                let contract = tx.get("to").and_then(Value::as_str)?.parse::<Address>().ok()?;
                let block = tx.get("blockNumber").and_then(parse_quantity)?;
                Some((contract, block))
            })
        };
        if let Some((contract, block)) = target {
            self.push_swap_log(contract, hash, block, swap);
        }
    }

    fn push_swap_log(&self, contract: Address, hash: &str, block: u64, swap: SwapLog) {
        let (log, subscribers) = {
            let mut state = self.state.borrow_mut();
            let (topics, data) = encode_swap(&swap);
            let log = json!({
                "address": contract.to_checksum(None),
                "topics": topics.iter().map(hex::encode_prefixed).collect::<Vec<_>>(),
                "data": hex::encode_prefixed(data),
                "blockNumber": to_quantity(block),
                "transactionHash": hash,
                "logIndex": to_quantity(state.logs.len() as u64),
                "removed": false,
            });
            state.logs.push(log.clone());
            let subscribers: Vec<String> = state
                .subscriptions
                .iter()
                .filter(|(_, params)| params.get(0).and_then(Value::as_str) == Some("logs") && log_matches(&log, params.get(1)))
                .map(|(id, _)| id.clone())
                .collect();
            (log, subscribers)
        };
        for id in subscribers {
            self.push_subscription(&id, log.clone());
        }
    }

    /// Deliver an arbitrary payload to a subscription id.
    pub fn push_subscription(&self, subscription: &str, result: Value) {
        self.emit(
            events::MESSAGE,
            json!({"type": events::SUBSCRIPTION_MESSAGE, "data": {"subscription": subscription, "result": result}}),
        );
    }

    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: U256) {
        self.state.borrow_mut().balances.insert((token, owner), amount);
    }

    pub fn set_decimals(&self, decimals: u8) {
        self.state.borrow_mut().decimals = decimals;
    }

    /// Subsequent `eth_sendTransaction`s produce reverted receipts.
    pub fn revert_sends(&self, revert: bool) {
        self.state.borrow_mut().revert_sends = revert;
    }

    /// Transactions submitted through `eth_sendTransaction`.
    pub fn sent_transactions(&self) -> Vec<Value> {
        self.request_params(methods::SEND_TRANSACTION)
            .into_iter()
            .filter_map(|p| p.get(0).cloned())
            .collect()
    }

    // =========================================================================
    // Request handling
    // =========================================================================

    fn dispatch(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        match method {
            methods::REQUEST_ACCOUNTS => {
                let mut state = self.state.borrow_mut();
                state.authorized = true;
                Ok(json!(state.wallet_accounts))
            }
            methods::ACCOUNTS => {
                let state = self.state.borrow();
                let accounts = if state.authorized { state.wallet_accounts.clone() } else { Vec::new() };
                Ok(json!(accounts))
            }
            methods::CHAIN_ID => Ok(json!(to_quantity(self.state.borrow().chain_id))),
            methods::SWITCH_CHAIN => {
                let target = chain_param(params)?;
                if !self.state.borrow().known_chains.contains(&target) {
                    return Err(ProviderError::unrecognized_chain(&to_quantity(target)));
                }
                self.switch_to(target);
                Ok(Value::Null)
            }
            methods::ADD_CHAIN => {
                let target = chain_param(params)?;
                self.state.borrow_mut().known_chains.insert(target);
                self.switch_to(target);
                Ok(Value::Null)
            }
            methods::WATCH_ASSET => Ok(json!(true)),
            methods::BLOCK_NUMBER => Ok(json!(to_quantity(self.state.borrow().head))),
            methods::GET_LOGS => {
                let filter = params.get(0);
                let state = self.state.borrow();
                let from = filter.and_then(|f| f.get("fromBlock")).and_then(parse_quantity).unwrap_or(0);
                let to = filter.and_then(|f| f.get("toBlock")).and_then(parse_quantity).unwrap_or(state.head);
                let logs: Vec<Value> = state
                    .logs
                    .iter()
                    .filter(|log| {
                        let block = log.get("blockNumber").and_then(parse_quantity).unwrap_or(0);
                        block >= from && block <= to && log_matches(log, filter)
                    })
                    .cloned()
                    .collect();
                Ok(json!(logs))
            }
            methods::GET_TRANSACTION => {
                let hash = params.get(0).and_then(Value::as_str).unwrap_or_default();
                Ok(self.state.borrow().transactions.get(hash).cloned().unwrap_or(Value::Null))
            }
            methods::GET_BLOCK => {
                let number = params.get(0).and_then(parse_quantity).unwrap_or(0);
                let state = self.state.borrow();
                Ok(state
                    .blocks
                    .get(&number)
                    .map(|ts| json!({"number": to_quantity(number), "timestamp": to_quantity(*ts)}))
                    .unwrap_or(Value::Null))
            }
            methods::GET_RECEIPT => {
                let hash = params.get(0).and_then(Value::as_str).unwrap_or_default();
                Ok(self.state.borrow().receipts.get(hash).cloned().unwrap_or(Value::Null))
            }
            methods::CALL => self.call(params),
            methods::SEND_TRANSACTION => {
                let mut state = self.state.borrow_mut();
                let hash = next_hash(&mut state);
                let status = if state.revert_sends { "0x0" } else { "0x1" };
                let block = to_quantity(state.head);
                let from = params.pointer("/0/from").cloned().unwrap_or(Value::Null);
                let to = params.pointer("/0/to").cloned().unwrap_or(Value::Null);
                if !state.revert_sends {
                    credit_mint(&mut state, &to, params.pointer("/0/data"));
                }
                state.transactions.insert(
                    hash.clone(),
                    json!({"hash": hash, "from": from, "to": to, "value": "0x0", "gasPrice": GAS_PRICE, "blockNumber": block}),
                );
                state.receipts.insert(
                    hash.clone(),
                    json!({"transactionHash": hash, "status": status, "gasUsed": GAS_USED, "blockNumber": block}),
                );
                Ok(json!(hash))
            }
            methods::SUBSCRIBE => {
                let mut state = self.state.borrow_mut();
                let id = format!("0x{:x}", state.next_subscription);
                state.next_subscription += 1;
                state.subscriptions.insert(id.clone(), params.clone());
                Ok(json!(id))
            }
            methods::UNSUBSCRIBE => {
                let id = params.get(0).and_then(Value::as_str).unwrap_or_default();
                Ok(json!(self.state.borrow_mut().subscriptions.remove(id).is_some()))
            }
            other => Err(ProviderError::unsupported_method(other)),
        }
    }

    fn switch_to(&self, chain_id: u64) {
        let changed = {
            let mut state = self.state.borrow_mut();
            let changed = state.chain_id != chain_id;
            state.chain_id = chain_id;
            changed
        };
        if changed {
            self.emit(events::CHAIN_CHANGED, json!(to_quantity(chain_id)));
        }
    }

    fn call(&self, params: &Value) -> Result<Value, ProviderError> {
        let call = params.get(0).ok_or_else(|| ProviderError::new(-32602, "missing call object"))?;
        let to: Address = call
            .get("to")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProviderError::new(-32602, "invalid call target"))?;
        let input = call
            .get("data")
            .or_else(|| call.get("input"))
            .and_then(Value::as_str)
            .and_then(|s| hex::decode(s).ok())
            .unwrap_or_default();
        let state = self.state.borrow();
        let output = if input.starts_with(&IERC20::balanceOfCall::SELECTOR) {
            let decoded = IERC20::balanceOfCall::abi_decode(&input, true)
                .map_err(|e| ProviderError::new(-32602, format!("balanceOf: {e}")))?;
            let balance = state.balances.get(&(to, decoded.owner)).copied().unwrap_or(U256::ZERO);
            balance.to_be_bytes::<32>().to_vec()
        } else if input.starts_with(&IERC20::decimalsCall::SELECTOR) {
            U256::from(state.decimals).to_be_bytes::<32>().to_vec()
        } else {
            return Err(ProviderError::new(-32000, "execution reverted"));
        };
        Ok(json!(hex::encode_prefixed(output)))
    }
}

fn credit_mint(state: &mut MemoryState, to: &Value, data: Option<&Value>) {
    let token = to.as_str().and_then(|s| s.parse::<Address>().ok());
    let input = data.and_then(Value::as_str).and_then(|s| hex::decode(s).ok());
    let (Some(token), Some(input)) = (token, input) else { return };
    if let Ok(call) = IERC20::mintCall::abi_decode(&input, true) {
        let balance = state.balances.entry((token, call.to)).or_insert(U256::ZERO);
        *balance += call.amount;
    }
}

fn next_hash(state: &mut MemoryState) -> String {
    let hash = format!("0x{:064x}", state.next_hash);
    state.next_hash += 1;
    hash
}

fn chain_param(params: &Value) -> Result<u64, ProviderError> {
    params
        .pointer("/0/chainId")
        .and_then(parse_quantity)
        .ok_or_else(|| ProviderError::new(-32602, "missing chainId"))
}

fn log_matches(log: &Value, filter: Option<&Value>) -> bool {
    let Some(filter) = filter else { return true };
    let address = log.get("address").and_then(Value::as_str).unwrap_or_default();
    let address_ok = match filter.get("address") {
        Some(Value::String(a)) => a.eq_ignore_ascii_case(address),
        Some(Value::Array(list)) => list.iter().filter_map(Value::as_str).any(|a| a.eq_ignore_ascii_case(address)),
        _ => true,
    };
    let topic0 = log.pointer("/topics/0").and_then(Value::as_str).unwrap_or_default();
    let topic_ok = match filter.pointer("/topics/0") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case(topic0),
        _ => true,
    };
    address_ok && topic_ok
}

#[async_trait(?Send)]
impl InjectedProvider for MemoryProvider {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn id(&self) -> ProviderId {
        self.id
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let (hold, failure) = {
            let mut state = self.state.borrow_mut();
            state.requests.push((method.to_string(), params.clone()));
            let hold = state.holds.get_mut(method).and_then(VecDeque::pop_front);
            let failure = state.failures.get_mut(method).and_then(VecDeque::pop_front);
            (hold, failure)
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        self.dispatch(method, &params)
    }

    fn on(&self, event: &str, listener: Listener) -> Result<ListenerId, ProviderError> {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, event.to_string(), listener));
        Ok(id)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> Result<(), ProviderError> {
        self.listeners.borrow_mut().retain(|(lid, e, _)| !(*lid == id && e == event));
        Ok(())
    }
}

/// Host whose injected providers are installed by hand.
#[derive(Clone, Default)]
pub struct MemoryHost {
    providers: Rc<RefCell<BTreeMap<WalletKind, Rc<MemoryProvider>>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, provider: Rc<MemoryProvider>) {
        self.providers.borrow_mut().insert(provider.kind, provider);
    }

    pub fn uninstall(&self, kind: WalletKind) {
        self.providers.borrow_mut().remove(&kind);
    }
}

impl HostEnvironment for MemoryHost {
    fn provider(&self, kind: WalletKind) -> Option<ProviderHandle> {
        self.providers.borrow().get(&kind).map(|p| p.clone() as ProviderHandle)
    }
}
