//! History Tests: swap records from `Swap` logs
//!
//! These tests verify:
//! 1. Records are the user's own swaps, newest first, one per transaction
//! 2. Block window and explicit start block
//! 3. Degradation: unreadable blocks drop entries, a failed scan is empty
//! 4. Live feed and transaction details

use alloy_primitives::{Address, U256};
use futures::channel::oneshot;
use std::rc::Rc;
use swapverse::contracts::abi::SwapLog;
use swapverse::core::constants::{deployment, methods, sepolia};
use swapverse::history::TransactionStatus;
use swapverse::{
    MemoryProvider, ProviderError, SessionConfig, SwapRecord, SwapStatus, TransactionHistoryReader, WalletKind,
};

const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
const BOB: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime")
}

fn chain() -> (Rc<MemoryProvider>, TransactionHistoryReader) {
    let provider = MemoryProvider::with_accounts(WalletKind::MetaMask, &[ALICE], sepolia::CHAIN_ID);
    let reader = TransactionHistoryReader::new(provider.clone(), &SessionConfig::default());
    (provider, reader)
}

fn a_to_b(whole: u64) -> SwapLog {
    SwapLog {
        from_token: deployment::TOKEN_A,
        to_token: deployment::TOKEN_B,
        amount: U256::from(u128::from(whole) * 10u128.pow(18)),
    }
}

fn b_to_a(milli: u64) -> SwapLog {
    SwapLog {
        from_token: deployment::TOKEN_B,
        to_token: deployment::TOKEN_A,
        amount: U256::from(u128::from(milli) * 10u128.pow(15)),
    }
}

fn hashes(records: &[SwapRecord]) -> Vec<&str> {
    records.iter().map(|r| r.transaction_hash.as_str()).collect()
}

/// Three blocks at t=100/200/300 with swaps from Alice and Bob.
fn seed(provider: &MemoryProvider) -> [String; 4] {
    let b1 = provider.mine_block(100);
    let b2 = provider.mine_block(200);
    let b3 = provider.mine_block(300);
    let first = provider.add_swap(deployment::TOKEN_SWAP, ALICE, b1, a_to_b(1));
    let bobs = provider.add_swap(deployment::TOKEN_SWAP, BOB, b2, a_to_b(7));
    let second = provider.add_swap(deployment::TOKEN_SWAP, ALICE, b3, b_to_a(2_500));
    let third = provider.add_swap(deployment::TOKEN_SWAP, ALICE, b3, a_to_b(3));
    [first, bobs, second, third]
}

#[test]
fn history_is_own_swaps_newest_first() {
    let (provider, reader) = chain();
    let [first, bobs, second, third] = seed(&provider);

    let records = runtime().block_on(reader.history(ALICE, None));

    assert_eq!(hashes(&records), vec![third.as_str(), second.as_str(), first.as_str()]);
    assert!(!hashes(&records).contains(&bobs.as_str()));

    let second = &records[1];
    assert_eq!(second.from_asset, "TKB7");
    assert_eq!(second.to_asset, "TKA7");
    assert_eq!(second.amount, "2.5");
    assert_eq!(second.block_number, Some(3));
    assert_eq!(second.block_timestamp, 300);
    assert_eq!(second.status, SwapStatus::Completed);
    assert_eq!(records[2].amount, "1.0");
    assert_eq!(records[2].block_timestamp, 100);
}

#[test]
fn multi_log_transaction_is_one_record() {
    let (provider, reader) = chain();
    let [first, _, second, third] = seed(&provider);
    provider.add_swap_log(&first, b_to_a(9_000));
    provider.add_swap_log(&second, a_to_b(4));

    let records = runtime().block_on(reader.history(ALICE, None));

    assert_eq!(hashes(&records), vec![third.as_str(), second.as_str(), first.as_str()]);
    assert!(records.windows(2).all(|w| w[0].block_timestamp >= w[1].block_timestamp));
    assert_eq!(records[1].amount, "2.5");
    assert_eq!(records[2].amount, "1.0");
}

#[test]
fn history_accepts_lowercase_address() {
    let (provider, reader) = chain();
    seed(&provider);

    let records = runtime().block_on(reader.history(&ALICE.to_lowercase(), None));
    assert_eq!(records.len(), 3);
}

#[test]
fn history_scans_logs_of_the_swap_contract_only() {
    let (provider, reader) = chain();
    let block = provider.mine_block(100);
    provider.add_swap(Address::repeat_byte(0x42), ALICE, block, a_to_b(1));

    assert!(runtime().block_on(reader.history(ALICE, None)).is_empty());
    let filter = &provider.request_params(methods::GET_LOGS)[0][0];
    assert_eq!(filter["address"], deployment::TOKEN_SWAP.to_checksum(None));
    assert_eq!(filter["fromBlock"], "0x0");
    assert_eq!(filter["toBlock"], "0x1");
}

#[test]
fn window_and_start_block_bound_the_scan() {
    let (provider, reader) = chain();
    let [first, _, second, third] = seed(&provider);
    let rt = runtime();

    let recent = rt.block_on(reader.clone().with_window(1).history(ALICE, None));
    assert_eq!(hashes(&recent), vec![third.as_str(), second.as_str()]);

    let all = rt.block_on(reader.clone().with_window(1).history(ALICE, Some(1)));
    assert_eq!(hashes(&all), vec![third.as_str(), second.as_str(), first.as_str()]);
}

#[test]
fn unreadable_block_drops_its_swaps() {
    let (provider, reader) = chain();
    let [first, _, second, third] = seed(&provider);
    let missing = provider.skip_block();
    provider.add_swap(deployment::TOKEN_SWAP, ALICE, missing, a_to_b(9));

    let records = runtime().block_on(reader.history(ALICE, None));
    assert_eq!(hashes(&records), vec![third.as_str(), second.as_str(), first.as_str()]);
}

#[test]
fn unreadable_transaction_drops_its_swap() {
    let (provider, reader) = chain();
    let [first, _, second, third] = seed(&provider);
    provider.fail_next(methods::GET_TRANSACTION, ProviderError::new(-32000, "header not found"));

    let records = runtime().block_on(reader.history(ALICE, None));

    assert_eq!(records.len(), 2);
    assert!(hashes(&records).iter().all(|h| [first.as_str(), second.as_str(), third.as_str()].contains(h)));
}

#[test]
fn failed_scan_is_empty() {
    let (provider, reader) = chain();
    seed(&provider);
    let rt = runtime();

    provider.fail_next(methods::BLOCK_NUMBER, ProviderError::new(4900, "Disconnected"));
    assert!(rt.block_on(reader.history(ALICE, None)).is_empty());

    provider.fail_next(methods::GET_LOGS, ProviderError::new(-32005, "query returned more than 10000 results"));
    assert!(rt.block_on(reader.history(ALICE, None)).is_empty());

    let before = provider.requests().len();
    assert!(rt.block_on(reader.history("not-an-address", None)).is_empty());
    assert_eq!(provider.requests().len(), before);
}

#[test]
fn live_feed_delivers_own_swaps() {
    let (provider, reader) = chain();
    let block = provider.mine_block(500);
    let rt = runtime();

    let mut feed = rt.block_on(reader.subscribe(ALICE)).expect("subscribe");
    assert_eq!(provider.subscription_count(), 1);

    provider.add_swap(deployment::TOKEN_SWAP, BOB, block, a_to_b(4));
    let mine = provider.add_swap(deployment::TOKEN_SWAP, ALICE, block, b_to_a(500));

    let record = rt.block_on(feed.next()).expect("record");
    assert_eq!(record.transaction_hash, mine);
    assert_eq!(record.amount, "0.5");
    assert_eq!(record.block_timestamp, 500);
    assert_eq!(record.status, SwapStatus::Completed);

    rt.block_on(feed.unsubscribe()).expect("unsubscribe");
    assert_eq!(provider.subscription_count(), 0);
}

#[test]
fn live_feed_stops_on_signal() {
    let (provider, reader) = chain();
    let block = provider.mine_block(50);
    let rt = runtime();

    let feed = rt.block_on(reader.subscribe(ALICE)).expect("subscribe");
    let hash = provider.add_swap(deployment::TOKEN_SWAP, ALICE, block, a_to_b(2));

    let (stop, stopped) = oneshot::channel::<()>();
    let mut stop = Some(stop);
    let mut seen = Vec::new();
    rt.block_on(feed.run_until(
        async move {
            let _ = stopped.await;
        },
        |record| {
            seen.push(record.transaction_hash);
            if let Some(stop) = stop.take() {
                let _ = stop.send(());
            }
        },
    ));

    assert_eq!(seen, vec![hash]);
    assert_eq!(provider.subscription_count(), 0);
}

#[test]
fn transaction_details_are_formatted() {
    let (provider, reader) = chain();
    let block = provider.mine_block(1_700_000_000);
    let hash = provider.add_swap(deployment::TOKEN_SWAP, ALICE, block, a_to_b(1));
    let rt = runtime();

    let details = rt.block_on(reader.transaction(&hash)).expect("details");

    assert_eq!(details.hash, hash);
    assert_eq!(details.from, ALICE);
    assert_eq!(details.to, Some(deployment::TOKEN_SWAP.to_checksum(None)));
    assert_eq!(details.value, "0.0");
    assert_eq!(details.gas_used.as_deref(), Some("50000"));
    assert_eq!(details.gas_price.as_deref(), Some("1.0"));
    assert_eq!(details.block_number, Some(block));
    assert_eq!(details.timestamp, Some(1_700_000_000));
    assert_eq!(details.status, TransactionStatus::Success);

    let unknown = format!("0x{}", "ab".repeat(32));
    assert_eq!(rt.block_on(reader.transaction(&unknown)), None);
}
