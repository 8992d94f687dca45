//! explorer-stats crate
//!
//! Aggregations over block-number windows: throughput, block time,
//! transaction volume, address activity and gas usage. Every function is
//! read-only apart from warming the shared caches, and returns zeroed values
//! instead of errors when data is unavailable.

pub mod gas;
pub mod network;

pub use gas::{
    extract_selector, get_gas_statistics, get_gas_trends, get_top_gas_consumers, FunctionGasStats,
    GasConsumer, GasStatistics, GasTrendPoint, FALLBACK_SELECTOR,
};
pub use network::{
    calculate_average_block_time, calculate_tps, get_active_addresses, get_network_stats,
    get_transaction_volume, ActiveAddresses, NetworkStats, TransactionVolume,
};

use alloy::primitives::U256;

/// `part / total` as a percentage with two decimals, computed in integers first.
pub fn ratio_percent(part: U256, total: U256) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    let basis_points = part.saturating_mul(U256::from(10_000u64)) / total;
    basis_points.saturating_to::<u64>() as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_percent_guards_zero_total() {
        assert_eq!(ratio_percent(U256::from(5u64), U256::ZERO), 0.0);
        assert_eq!(ratio_percent(U256::from(1u64), U256::from(4u64)), 25.0);
        assert_eq!(ratio_percent(U256::from(2u64), U256::from(3u64)), 66.66);
    }
}
