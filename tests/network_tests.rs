//! Network Guard Tests
//!
//! Compliance checks, switch-or-add negotiation and listener bookkeeping
//! against the in-memory provider.

use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use swapverse::core::constants::{events, methods, sepolia};
use swapverse::{
    ChainChange, ChainDescriptor, InjectedProvider, MemoryProvider, NetworkError, NetworkGuard, ProviderError, ProviderHandle,
    WalletKind,
};

const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

fn guard() -> NetworkGuard {
    NetworkGuard::new(ChainDescriptor::sepolia())
}

fn wallet(chain_id: u64) -> Rc<MemoryProvider> {
    MemoryProvider::with_accounts(WalletKind::MetaMask, &[ALICE], chain_id)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime")
}

#[test]
fn foreign_chain_is_not_compliant() {
    let guard = guard();
    let provider = wallet(1);
    let rt = runtime();

    assert!(!rt.block_on(guard.is_compliant(&*provider)));
    let status = rt.block_on(guard.current_network(&*provider));
    assert_eq!(status.chain_id, 1);
    assert_eq!(status.chain_id_hex, "0x1");
    assert_eq!(status.name, "Ethereum Mainnet");
    assert!(!status.is_required);

    provider.set_chain(sepolia::CHAIN_ID);
    assert!(rt.block_on(guard.is_compliant(&*provider)));
    assert_eq!(rt.block_on(guard.current_network(&*provider)).name, "Sepolia Testnet");
}

#[test]
fn unreadable_chain_fails_closed() {
    let guard = guard();
    let provider = wallet(sepolia::CHAIN_ID);
    provider.fail_next(methods::CHAIN_ID, ProviderError::new(4900, "Disconnected"));
    provider.fail_next(methods::CHAIN_ID, ProviderError::new(4900, "Disconnected"));
    let rt = runtime();

    assert!(!rt.block_on(guard.is_compliant(&*provider)));
    let status = rt.block_on(guard.current_network(&*provider));
    assert!(status.is_unknown());
    assert_eq!(status.name, "Unknown network");
    assert!(!status.is_required);
}

#[test]
fn enforce_switches_known_chain() {
    let guard = guard();
    let provider = wallet(1);

    runtime().block_on(guard.enforce_compliance(&*provider)).expect("enforce");

    assert_eq!(provider.current_chain(), sepolia::CHAIN_ID);
    let params = provider.request_params(methods::SWITCH_CHAIN);
    assert_eq!(params, vec![json!([{"chainId": "0xaa36a7"}])]);
    assert_eq!(provider.request_count(methods::ADD_CHAIN), 0);
}

#[test]
fn enforce_adds_unknown_chain() {
    let guard = guard();
    let provider = wallet(1);
    provider.forget_chain(sepolia::CHAIN_ID);

    runtime().block_on(guard.enforce_compliance(&*provider)).expect("enforce");

    assert_eq!(provider.request_count(methods::ADD_CHAIN), 1);
    assert_eq!(provider.current_chain(), sepolia::CHAIN_ID);
}

#[test]
fn wrapped_unrecognized_chain_code_triggers_add() {
    let guard = guard();
    let provider = wallet(1);
    provider.fail_next(
        methods::SWITCH_CHAIN,
        ProviderError::from_value(&json!({
            "code": -32603,
            "message": "Internal JSON-RPC error.",
            "data": {"originalError": {"code": 4902}}
        })),
    );

    runtime().block_on(guard.enforce_compliance(&*provider)).expect("enforce");
    assert_eq!(provider.request_count(methods::ADD_CHAIN), 1);
}

#[test]
fn enforce_reports_rejections() {
    let guard = guard();
    let rt = runtime();

    let provider = wallet(1);
    provider.fail_next(methods::SWITCH_CHAIN, ProviderError::user_rejected());
    assert_eq!(rt.block_on(guard.enforce_compliance(&*provider)), Err(NetworkError::SwitchRejected));
    assert_eq!(provider.current_chain(), 1);

    let provider = wallet(1);
    provider.forget_chain(sepolia::CHAIN_ID);
    provider.fail_next(methods::ADD_CHAIN, ProviderError::user_rejected());
    assert_eq!(rt.block_on(guard.enforce_compliance(&*provider)), Err(NetworkError::AddRejected));
}

#[test]
fn enforce_reports_pending_requests() {
    let guard = guard();
    let rt = runtime();

    let provider = wallet(1);
    provider.fail_next(methods::SWITCH_CHAIN, ProviderError::pending());
    assert_eq!(rt.block_on(guard.enforce_compliance(&*provider)), Err(NetworkError::Pending));

    let provider = wallet(1);
    provider.forget_chain(sepolia::CHAIN_ID);
    provider.fail_next(methods::ADD_CHAIN, ProviderError::pending());
    assert_eq!(rt.block_on(guard.enforce_compliance(&*provider)), Err(NetworkError::Pending));
    assert_eq!(provider.current_chain(), 1);
}

#[test]
fn enforce_confirms_after_switch() {
    let guard = guard();
    let provider = wallet(1);
    provider.fail_next(methods::CHAIN_ID, ProviderError::new(4900, "Disconnected"));

    let result = runtime().block_on(guard.enforce_compliance(&*provider));

    assert!(matches!(result, Err(NetworkError::Unavailable(_))));
    assert_eq!(provider.request_count(methods::CHAIN_ID), 1);
}

#[test]
fn subscribe_keeps_one_pair_per_provider() {
    let guard = guard();
    let provider = wallet(sepolia::CHAIN_ID);
    let handle: ProviderHandle = provider.clone();

    guard.subscribe(&handle, |_| {}, |_| {}).expect("first");
    let listener = guard.subscribe(&handle, |_| {}, |_| {}).expect("second");

    assert_eq!(provider.listener_count(events::CHAIN_CHANGED), 1);
    assert_eq!(provider.listener_count(events::ACCOUNTS_CHANGED), 1);
    assert!(guard.is_subscribed(handle.id()));
    assert_eq!(listener.provider(), handle.id());

    guard.unsubscribe(listener);
    assert_eq!(provider.listener_count(events::CHAIN_CHANGED), 0);
    assert_eq!(provider.listener_count(events::ACCOUNTS_CHANGED), 0);
    assert!(!guard.is_subscribed(handle.id()));
}

#[test]
fn listeners_receive_normalized_changes() {
    let guard = guard();
    let provider = wallet(sepolia::CHAIN_ID);
    let handle: ProviderHandle = provider.clone();
    let chains: Rc<RefCell<Vec<ChainChange>>> = Rc::default();
    let accounts: Rc<RefCell<Vec<Vec<String>>>> = Rc::default();

    let (c, a) = (chains.clone(), accounts.clone());
    guard
        .subscribe(&handle, move |change| c.borrow_mut().push(change), move |list| a.borrow_mut().push(list))
        .expect("subscribe");

    provider.emit_chain_changed(1);
    provider.emit(events::CHAIN_CHANGED, json!("not a chain"));
    provider.emit(events::CHAIN_CHANGED, json!(sepolia::CHAIN_ID));
    provider.emit_accounts_changed(&[]);

    assert_eq!(
        *chains.borrow(),
        vec![
            ChainChange { chain_id: 1, chain_id_hex: "0x1".into(), is_required: false },
            ChainChange { chain_id: sepolia::CHAIN_ID, chain_id_hex: "0xaa36a7".into(), is_required: true },
        ]
    );
    assert_eq!(*accounts.borrow(), vec![Vec::<String>::new()]);
}

#[test]
fn dropping_guard_detaches_listeners() {
    let provider = wallet(sepolia::CHAIN_ID);
    let other = MemoryProvider::with_accounts(WalletKind::Phantom, &[ALICE], sepolia::CHAIN_ID);
    {
        let guard = guard();
        let first: ProviderHandle = provider.clone();
        let second: ProviderHandle = other.clone();
        guard.subscribe(&first, |_| {}, |_| {}).expect("first");
        guard.subscribe(&second, |_| {}, |_| {}).expect("second");
        assert_eq!(other.listener_count(events::ACCOUNTS_CHANGED), 1);
    }
    assert_eq!(provider.listener_count(events::CHAIN_CHANGED), 0);
    assert_eq!(other.listener_count(events::ACCOUNTS_CHANGED), 0);
}
