//! Solidity interfaces of the SwapVerse deployment.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolEvent};

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function approve(address spender, uint256 value) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function mint(address to, uint256 amount) external;
    }

    interface ITokenSwap {
        event Swap(address indexed fromToken, address indexed toToken, uint256 amount);

        function swapAtoB(uint256 amount) external;
        function swapBtoA(uint256 amount) external;
    }
}

/// Decoded `Swap` log payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapLog {
    pub from_token: Address,
    pub to_token: Address,
    pub amount: U256,
}

/// Topic0 of the `Swap` event.
pub fn swap_topic() -> B256 {
    ITokenSwap::Swap::SIGNATURE_HASH
}

pub fn decode_swap(topics: &[B256], data: &[u8]) -> Option<SwapLog> {
    let event = ITokenSwap::Swap::decode_raw_log(topics.iter().copied(), data, true).ok()?;
    Some(SwapLog { from_token: event.fromToken, to_token: event.toToken, amount: event.amount })
}

/// Topics and data of a `Swap` log, as a node would report them.
pub fn encode_swap(log: &SwapLog) -> (Vec<B256>, Vec<u8>) {
    let topics = vec![swap_topic(), log.from_token.into_word(), log.to_token.into_word()];
    (topics, log.amount.to_be_bytes::<32>().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_log_decodes_what_it_encodes() {
        let log = SwapLog {
            from_token: Address::repeat_byte(0x11),
            to_token: Address::repeat_byte(0x22),
            amount: U256::from(5_000u64),
        };
        let (topics, data) = encode_swap(&log);
        assert_eq!(topics[0], swap_topic());
        assert_eq!(decode_swap(&topics, &data), Some(log));
        assert_eq!(decode_swap(&topics[..1], &data), None);
    }
}
