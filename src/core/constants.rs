//! Method, event and code constants for the session layer
//!
//! Centralized registry for every provider method name, event name and
//! provider error code the core speaks. Deployment addresses live here too,
//! so `SessionConfig::default()` has a single source.

/// EIP-1193 / JSON-RPC request methods
pub mod methods {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
    pub const ADD_CHAIN: &str = "wallet_addEthereumChain";
    pub const WATCH_ASSET: &str = "wallet_watchAsset";

    pub const CALL: &str = "eth_call";
    pub const SEND_TRANSACTION: &str = "eth_sendTransaction";
    pub const GET_RECEIPT: &str = "eth_getTransactionReceipt";
    pub const BLOCK_NUMBER: &str = "eth_blockNumber";
    pub const GET_LOGS: &str = "eth_getLogs";
    pub const GET_TRANSACTION: &str = "eth_getTransactionByHash";
    pub const GET_BLOCK: &str = "eth_getBlockByNumber";
    pub const SUBSCRIBE: &str = "eth_subscribe";
    pub const UNSUBSCRIBE: &str = "eth_unsubscribe";
}

/// Provider event names (`provider.on(name, handler)`)
pub mod events {
    pub const CHAIN_CHANGED: &str = "chainChanged";
    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
    pub const MESSAGE: &str = "message";

    /// `message` payload type carrying `eth_subscribe` notifications
    pub const SUBSCRIPTION_MESSAGE: &str = "eth_subscription";
}

/// Provider error codes (EIP-1193 / EIP-3085 / EIP-3326)
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const REQUEST_PENDING: i64 = -32002;
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

/// Persisted preference key (browser localStorage / preference file)
pub const PREFERENCE_KEY: &str = "swapverse_wallet";

/// Default number of recent blocks scanned by `history`
pub const DEFAULT_HISTORY_WINDOW: u64 = 1000;

/// Default number of new heads to wait for a receipt before giving up
pub const DEFAULT_RECEIPT_BLOCKS: u32 = 50;

/// Recent transaction hashes a live history feed remembers for dedupe
pub const LIVE_FEED_DEDUPE: usize = 256;

/// Whole tokens minted to an empty account when onboarding mint is enabled
pub const DEFAULT_ONBOARDING_MINT: u64 = 1000;

/// Required chain (Sepolia)
pub mod sepolia {
    pub const CHAIN_ID: u64 = 11_155_111;
    pub const CHAIN_ID_HEX: &str = "0xaa36a7";
    pub const NAME: &str = "Sepolia Testnet";
    pub const CURRENCY_NAME: &str = "Sepolia Ether";
    pub const CURRENCY_SYMBOL: &str = "ETH";
    pub const CURRENCY_DECIMALS: u8 = 18;
    pub const RPC_URLS: &[&str] = &["https://rpc.sepolia.org"];
    pub const EXPLORER_URLS: &[&str] = &["https://sepolia.etherscan.io"];
}

/// SwapVerse deployment on Sepolia
pub mod deployment {
    use alloy_primitives::{address, Address};

    pub const TOKEN_A: Address = address!("18bCdC0AB71FbE0682ea5803e1C4586878A3339c");
    pub const TOKEN_B: Address = address!("889cc282Cb3553CE7744b732542f22e1fAb32DA4");
    pub const TOKEN_SWAP: Address = address!("bD5E43894a6992bc68B812D25C0DCce5b06A9637");

    pub const TOKEN_A_SYMBOL: &str = "TKA7";
    pub const TOKEN_B_SYMBOL: &str = "TKB7";
    pub const TOKEN_DECIMALS: u8 = 18;
}
