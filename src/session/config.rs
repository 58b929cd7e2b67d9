//! Session Configuration - passed from higher layers

use crate::core::constants::{deployment, sepolia, DEFAULT_HISTORY_WINDOW, DEFAULT_RECEIPT_BLOCKS, PREFERENCE_KEY};
use crate::provider::to_quantity;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The single network a session must be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub currency_name: String,
    pub currency_symbol: String,
    pub currency_decimals: u8,
    pub rpc_urls: Vec<String>,
    pub explorer_urls: Vec<String>,
}

impl Default for ChainDescriptor {
    fn default() -> Self { Self::sepolia() }
}

impl ChainDescriptor {
    pub fn sepolia() -> Self {
        Self {
            chain_id: sepolia::CHAIN_ID,
            name: sepolia::NAME.into(),
            currency_name: sepolia::CURRENCY_NAME.into(),
            currency_symbol: sepolia::CURRENCY_SYMBOL.into(),
            currency_decimals: sepolia::CURRENCY_DECIMALS,
            rpc_urls: sepolia::RPC_URLS.iter().map(|u| u.to_string()).collect(),
            explorer_urls: sepolia::EXPLORER_URLS.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn chain_id_hex(&self) -> String {
        to_quantity(self.chain_id)
    }

    /// `wallet_addEthereumChain` parameter object.
    pub fn add_chain_params(&self) -> Value {
        json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.name,
            "nativeCurrency": {
                "name": self.currency_name,
                "symbol": self.currency_symbol,
                "decimals": self.currency_decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.explorer_urls,
        })
    }
}

/// One ERC-20 of the swap pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl TokenConfig {
    pub fn new(symbol: impl Into<String>, address: Address, decimals: u8) -> Self {
        Self { symbol: symbol.into(), address, decimals, image: None }
    }
    pub fn with_image(mut self, url: impl Into<String>) -> Self { self.image = Some(url.into()); self }
}

/// Swap contract and the two tokens it trades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub token_a: TokenConfig,
    pub token_b: TokenConfig,
    pub token_swap: Address,
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            token_a: TokenConfig::new(deployment::TOKEN_A_SYMBOL, deployment::TOKEN_A, deployment::TOKEN_DECIMALS),
            token_b: TokenConfig::new(deployment::TOKEN_B_SYMBOL, deployment::TOKEN_B, deployment::TOKEN_DECIMALS),
            token_swap: deployment::TOKEN_SWAP,
        }
    }
}

impl ContractAddresses {
    pub fn tokens(&self) -> [&TokenConfig; 2] {
        [&self.token_a, &self.token_b]
    }

    /// Token by symbol (case-insensitive) or by address string.
    pub fn token(&self, key: &str) -> Option<&TokenConfig> {
        let key = key.trim();
        self.tokens().into_iter().find(|t| {
            t.symbol.eq_ignore_ascii_case(key) || key.parse::<Address>().map(|a| a == t.address).unwrap_or(false)
        })
    }

    /// Display symbol for a token address; unknown tokens show checksummed.
    pub fn symbol_for(&self, address: Address) -> String {
        self.tokens()
            .into_iter()
            .find(|t| t.address == address)
            .map(|t| t.symbol.clone())
            .unwrap_or_else(|| address.to_checksum(None))
    }

    pub fn decimals_for(&self, address: Address) -> u8 {
        self.tokens()
            .into_iter()
            .find(|t| t.address == address)
            .map(|t| t.decimals)
            .unwrap_or(deployment::TOKEN_DECIMALS)
    }
}

/// Session configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub app: String,
    pub chain: ChainDescriptor,
    pub contracts: ContractAddresses,
    pub history_window: u64,
    pub storage_key: String,
    pub receipt_blocks: u32,
    pub watch_assets: bool,
    /// Whole tokens to mint to an account holding none; `None` disables it.
    pub onboarding_mint: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app: "swapverse".into(),
            chain: ChainDescriptor::default(),
            contracts: ContractAddresses::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
            storage_key: PREFERENCE_KEY.into(),
            receipt_blocks: DEFAULT_RECEIPT_BLOCKS,
            watch_assets: true,
            onboarding_mint: None,
        }
    }
}

impl SessionConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_chain(mut self, chain: ChainDescriptor) -> Self { self.chain = chain; self }
    pub fn with_contracts(mut self, contracts: ContractAddresses) -> Self { self.contracts = contracts; self }
    pub fn with_history_window(mut self, blocks: u64) -> Self { self.history_window = blocks; self }
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self { self.storage_key = key.into(); self }
    pub fn with_receipt_blocks(mut self, blocks: u32) -> Self { self.receipt_blocks = blocks; self }
    pub fn without_asset_watch(mut self) -> Self { self.watch_assets = false; self }
    pub fn with_onboarding_mint(mut self, whole_tokens: u64) -> Self { self.onboarding_mint = Some(whole_tokens); self }

    pub fn required_chain_id(&self) -> u64 {
        self.chain.chain_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_sepolia_deployment() {
        let config = SessionConfig::default();
        assert_eq!(config.chain.chain_id_hex(), "0xaa36a7");
        assert_eq!(config.storage_key, "swapverse_wallet");
        assert_eq!(config.history_window, 1000);
        assert_eq!(
            config.contracts.token_swap.to_checksum(None),
            "0xbD5E43894a6992bc68B812D25C0DCce5b06A9637"
        );
        let params = config.chain.add_chain_params();
        assert_eq!(params["nativeCurrency"]["symbol"], "ETH");
        assert_eq!(params["rpcUrls"][0], "https://rpc.sepolia.org");
    }

    #[test]
    fn tokens_resolve_by_symbol_or_address() {
        let contracts = ContractAddresses::default();
        assert_eq!(contracts.token("tka7").map(|t| t.address), Some(deployment::TOKEN_A));
        assert_eq!(
            contracts.token("0x889cc282cb3553ce7744b732542f22e1fab32da4").map(|t| t.symbol.as_str()),
            Some("TKB7")
        );
        assert!(contracts.token("WETH").is_none());
        let stranger = Address::repeat_byte(0xab);
        assert_eq!(contracts.symbol_for(stranger), stranger.to_checksum(None));
    }
}
