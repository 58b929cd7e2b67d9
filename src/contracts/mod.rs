//! Contract bindings - ERC-20 reads/approvals and swap calls through the
//! session's provider
//!
//! Bindings are plain data (signer address + provider handle) and are rebuilt
//! whenever the active account changes. Calls are encoded with `sol!` types
//! and sent as raw `eth_call` / `eth_sendTransaction` requests so the wallet
//! does the signing.

pub mod abi;

use crate::core::constants::methods;
use crate::error::ProviderError;
use crate::provider::{parse_quantity, ProviderHandle, ProviderSubscription};
use crate::session::{ContractAddresses, TokenConfig};
use abi::{ITokenSwap, IERC20};
use alloy_primitives::{hex, Address, U256};
use alloy_sol_types::SolCall;
use serde::Serialize;
use serde_json::{json, Value};

/// Which leg of the pair a swap sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapDirection {
    AtoB,
    BtoA,
}

impl SwapDirection {
    /// Direction for a `from -> to` token pair, if it is the configured pair.
    pub fn for_pair(contracts: &ContractAddresses, from: Address, to: Address) -> Option<Self> {
        if from == contracts.token_a.address && to == contracts.token_b.address {
            Some(SwapDirection::AtoB)
        } else if from == contracts.token_b.address && to == contracts.token_a.address {
            Some(SwapDirection::BtoA)
        } else {
            None
        }
    }
}

/// Receipt status after waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success { block: Option<u64> },
    Reverted,
    Pending,
}

/// Result of a submitted transaction as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TxOutcome {
    Confirmed { hash: String, block: Option<u64> },
    /// Submitted but not observed mined within the wait bound.
    Pending { hash: String },
}

impl TxOutcome {
    pub fn hash(&self) -> &str {
        match self {
            TxOutcome::Confirmed { hash, .. } | TxOutcome::Pending { hash } => hash,
        }
    }
}

#[derive(Clone)]
pub struct ContractBindings {
    signer: Address,
    provider: ProviderHandle,
    contracts: ContractAddresses,
}

impl ContractBindings {
    pub fn bind(provider: ProviderHandle, signer: Address, contracts: ContractAddresses) -> Self {
        Self { signer, provider, contracts }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn contracts(&self) -> &ContractAddresses {
        &self.contracts
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
        let result = self
            .provider
            .request(
                methods::CALL,
                json!([{"to": to.to_checksum(None), "data": hex::encode_prefixed(data)}, "latest"]),
            )
            .await?;
        let raw = result.as_str().unwrap_or_default();
        hex::decode(raw).map_err(|e| ProviderError::message(format!("eth_call returned invalid hex: {e}")))
    }

    async fn send(&self, to: Address, data: Vec<u8>) -> Result<String, ProviderError> {
        let result = self
            .provider
            .request(
                methods::SEND_TRANSACTION,
                json!([{
                    "from": self.signer.to_checksum(None),
                    "to": to.to_checksum(None),
                    "data": hex::encode_prefixed(data),
                }]),
            )
            .await?;
        result
            .as_str()
            .map(String::from)
            .ok_or_else(|| ProviderError::message(format!("eth_sendTransaction returned {result}")))
    }

    pub async fn balance_of(&self, token: &TokenConfig) -> Result<U256, ProviderError> {
        let data = IERC20::balanceOfCall { owner: self.signer }.abi_encode();
        let output = self.call(token.address, data).await?;
        let decoded = IERC20::balanceOfCall::abi_decode_returns(&output, true)
            .map_err(|e| ProviderError::message(format!("balanceOf decode: {e}")))?;
        Ok(decoded._0)
    }

    pub async fn decimals(&self, token: &TokenConfig) -> Result<u8, ProviderError> {
        let output = self.call(token.address, IERC20::decimalsCall {}.abi_encode()).await?;
        let decoded = IERC20::decimalsCall::abi_decode_returns(&output, true)
            .map_err(|e| ProviderError::message(format!("decimals decode: {e}")))?;
        Ok(decoded._0)
    }

    /// Allow the swap contract to pull `amount` of `token`.
    pub async fn approve(&self, token: &TokenConfig, amount: U256) -> Result<String, ProviderError> {
        let data = IERC20::approveCall { spender: self.contracts.token_swap, value: amount }.abi_encode();
        self.send(token.address, data).await
    }

    /// Mint `amount` of a test token to the signer.
    pub async fn mint(&self, token: &TokenConfig, amount: U256) -> Result<String, ProviderError> {
        let data = IERC20::mintCall { to: self.signer, amount }.abi_encode();
        self.send(token.address, data).await
    }

    pub async fn swap(&self, direction: SwapDirection, amount: U256) -> Result<String, ProviderError> {
        let data = match direction {
            SwapDirection::AtoB => ITokenSwap::swapAtoBCall { amount }.abi_encode(),
            SwapDirection::BtoA => ITokenSwap::swapBtoACall { amount }.abi_encode(),
        };
        self.send(self.contracts.token_swap, data).await
    }

    pub async fn receipt(&self, hash: &str) -> Result<Option<ReceiptStatus>, ProviderError> {
        let receipt = self.provider.request(methods::GET_RECEIPT, json!([hash])).await?;
        if receipt.is_null() {
            return Ok(None);
        }
        let status = receipt.get("status").and_then(parse_quantity);
        let block = receipt.get("blockNumber").and_then(parse_quantity);
        Ok(Some(match status {
            Some(0) => ReceiptStatus::Reverted,
            _ => ReceiptStatus::Success { block },
        }))
    }

    /// Wait for `hash` to be mined, re-reading the receipt on each new head,
    /// for at most `max_blocks` heads. Providers without push subscriptions
    /// get a single read.
    pub async fn wait_for_receipt(&self, hash: &str, max_blocks: u32) -> Result<ReceiptStatus, ProviderError> {
        if let Some(status) = self.receipt(hash).await? {
            return Ok(status);
        }

        let mut heads = match ProviderSubscription::open(self.provider.clone(), json!(["newHeads"])).await {
            Ok(heads) => heads,
            Err(err) => {
                tracing::debug!(error = %err, %hash, "no head subscription, leaving transaction pending");
                return Ok(ReceiptStatus::Pending);
            }
        };

        let mut outcome = self.receipt(hash).await?;
        let mut seen = 0;
        while outcome.is_none() && seen < max_blocks {
            if heads.next().await.is_none() {
                break;
            }
            seen += 1;
            outcome = self.receipt(hash).await?;
        }

        if let Err(err) = heads.unsubscribe().await {
            tracing::debug!(error = %err, "newHeads unsubscribe failed");
        }
        Ok(outcome.unwrap_or(ReceiptStatus::Pending))
    }
}

/// Parse a receipt-like object into a status; used by detail lookups.
pub(crate) fn receipt_succeeded(receipt: &Value) -> Option<bool> {
    receipt.get("status").and_then(parse_quantity).map(|s| s == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemoryProvider, WalletKind};

    fn bindings(provider: &std::rc::Rc<MemoryProvider>) -> ContractBindings {
        ContractBindings::bind(provider.clone(), Address::repeat_byte(0x42), ContractAddresses::default())
    }

    #[test]
    fn balance_reads_through_eth_call() {
        let provider = MemoryProvider::new(WalletKind::MetaMask);
        let contracts = ContractAddresses::default();
        provider.set_balance(contracts.token_a.address, Address::repeat_byte(0x42), U256::from(7u64));
        let bindings = bindings(&provider);
        let balance = futures::executor::block_on(bindings.balance_of(&contracts.token_a)).unwrap();
        assert_eq!(balance, U256::from(7u64));
        assert_eq!(futures::executor::block_on(bindings.decimals(&contracts.token_a)).unwrap(), 18);
    }

    #[test]
    fn approve_targets_token_with_swap_spender() {
        let provider = MemoryProvider::new(WalletKind::MetaMask);
        let contracts = ContractAddresses::default();
        futures::executor::block_on(bindings(&provider).approve(&contracts.token_b, U256::from(5u64))).unwrap();

        let sent = provider.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["to"], contracts.token_b.address.to_checksum(None));
        let input = hex::decode(sent[0]["data"].as_str().unwrap()).unwrap();
        let call = IERC20::approveCall::abi_decode(&input, true).unwrap();
        assert_eq!(call.spender, contracts.token_swap);
        assert_eq!(call.value, U256::from(5u64));
    }

    #[test]
    fn pair_direction_requires_configured_pair() {
        let contracts = ContractAddresses::default();
        let a = contracts.token_a.address;
        let b = contracts.token_b.address;
        assert_eq!(SwapDirection::for_pair(&contracts, a, b), Some(SwapDirection::AtoB));
        assert_eq!(SwapDirection::for_pair(&contracts, b, a), Some(SwapDirection::BtoA));
        assert_eq!(SwapDirection::for_pair(&contracts, a, a), None);
    }

    #[test]
    fn reverted_receipt_is_reported() {
        let provider = MemoryProvider::new(WalletKind::MetaMask);
        provider.revert_sends(true);
        let bindings = bindings(&provider);
        let status = futures::executor::block_on(async {
            let hash = bindings.swap(SwapDirection::AtoB, U256::from(1u64)).await.unwrap();
            bindings.wait_for_receipt(&hash, 3).await.unwrap()
        });
        assert_eq!(status, ReceiptStatus::Reverted);
    }
}
