//! Contract bindings for the lending pool and the two price feed networks.

use alloy::primitives::B256;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    /// Aave V2 LendingPool (subset used for monitoring)
    #[sol(rpc)]
    interface ILendingPool {
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralETH,
            uint256 totalDebtETH,
            uint256 availableBorrowsETH,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );

        event LiquidationCall(
            address indexed collateralAsset,
            address indexed debtAsset,
            address indexed user,
            uint256 debtToCover,
            uint256 liquidatedCollateralAmount,
            address liquidator,
            bool receiveAToken
        );
    }
}

sol! {
    /// Chainlink-compatible aggregator
    #[sol(rpc)]
    interface IAggregator {
        function latestAnswer() external view returns (int256);

        event AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt);
    }
}

sol! {
    /// Chainlink proxy. Reads are forwarded, but `AnswerUpdated` is emitted by
    /// the aggregator behind it.
    #[sol(rpc)]
    interface IAggregatorProxy {
        function aggregator() external view returns (address);
    }
}

sol! {
    /// Uniswap Anchored View price feed (6-decimal USD prices)
    #[sol(rpc)]
    interface IUniswapAnchoredView {
        function price(string calldata symbol) external view returns (uint256);

        event PriceUpdated(bytes32 indexed symbolHash, uint256 price);
    }
}

/// Event signature constants for log filtering.
pub mod event_signatures {
    use super::*;

    /// keccak256("AnswerUpdated(int256,uint256,uint256)")
    pub const ANSWER_UPDATED: B256 = IAggregator::AnswerUpdated::SIGNATURE_HASH;

    /// keccak256("PriceUpdated(bytes32,uint256)")
    pub const PRICE_UPDATED: B256 = IUniswapAnchoredView::PriceUpdated::SIGNATURE_HASH;

    /// keccak256("LiquidationCall(address,address,address,uint256,uint256,address,bool)")
    pub const LIQUIDATION_CALL: B256 = ILendingPool::LiquidationCall::SIGNATURE_HASH;
}
