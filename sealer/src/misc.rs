// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::parameters::block::{
    BASE_FEE_CHANGE_DENOMINATOR, ELASTICITY_MULTIPLIER,
    GAS_LIMIT_BOUND_DIVISOR, MIN_GAS_LIMIT,
};
use primitives::BlockHeader;
use std::cmp;
use trident_types::U256;

/// Base fee for the child of `parent`: unchanged at the usage target,
/// raised when the parent ran above it, lowered when below. The change per
/// block is bounded by the `BASE_FEE_CHANGE_DENOMINATOR` fraction.
pub fn calc_base_fee(parent: &BlockHeader) -> U256 {
    let gas_target = parent.gas_limit() / ELASTICITY_MULTIPLIER;
    let parent_base_fee = *parent.base_fee();
    if gas_target == 0 || parent.gas_used() == gas_target {
        return parent_base_fee;
    }

    if parent.gas_used() > gas_target {
        let delta = parent.gas_used() - gas_target;
        let change = parent_base_fee * delta
            / gas_target
            / BASE_FEE_CHANGE_DENOMINATOR;
        parent_base_fee + cmp::max(change, U256::one())
    } else {
        let delta = gas_target - parent.gas_used();
        let change = parent_base_fee * delta
            / gas_target
            / BASE_FEE_CHANGE_DENOMINATOR;
        parent_base_fee.saturating_sub(change)
    }
}

/// Gas limit for a child block: drift from `parent_gas_limit` toward twice
/// `gas_used_target`, at most a `GAS_LIMIT_BOUND_DIVISOR` fraction per
/// block and never below `MIN_GAS_LIMIT`.
pub fn calc_gas_limit(parent_gas_limit: u64, gas_used_target: u64) -> u64 {
    let desired = gas_used_target.saturating_mul(ELASTICITY_MULTIPLIER);
    let delta =
        (parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR).saturating_sub(1);

    let limit = if parent_gas_limit < desired {
        cmp::min(parent_gas_limit + delta, desired)
    } else {
        cmp::max(parent_gas_limit - delta, desired)
    };
    cmp::max(limit, MIN_GAS_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::{calc_base_fee, calc_gas_limit};
    use crate::parameters::block::{
        GAS_LIMIT_BOUND_DIVISOR, MIN_GAS_LIMIT,
    };
    use primitives::{BlockHeader, BlockHeaderBuilder};
    use trident_types::U256;

    fn parent(gas_limit: u64, gas_used: u64, base_fee: u64) -> BlockHeader {
        BlockHeaderBuilder::new()
            .with_gas_limit(gas_limit)
            .with_gas_used(gas_used)
            .with_base_fee(base_fee.into())
            .build()
    }

    #[test]
    fn test_base_fee_stable_at_target() {
        let fee = calc_base_fee(&parent(20_000_000, 10_000_000, 1_000_000));
        assert_eq!(fee, U256::from(1_000_000));
    }

    #[test]
    fn test_base_fee_moves_with_usage() {
        let above = calc_base_fee(&parent(20_000_000, 20_000_000, 1_000_000));
        let below = calc_base_fee(&parent(20_000_000, 0, 1_000_000));
        assert!(above > U256::from(1_000_000));
        assert!(below < U256::from(1_000_000));
        // full blocks move the fee by exactly 1/8
        assert_eq!(above, U256::from(1_125_000));
    }

    #[test]
    fn test_gas_limit_drift_is_bounded() {
        let parent_limit = 20_000_000u64;
        let max_step = parent_limit / GAS_LIMIT_BOUND_DIVISOR - 1;

        // target far above: move up by exactly one step
        assert_eq!(
            calc_gas_limit(parent_limit, parent_limit),
            parent_limit + max_step
        );
        // target far below: move down by exactly one step
        assert_eq!(
            calc_gas_limit(parent_limit, 0),
            parent_limit - max_step
        );
        // already at the doubled target: stay
        assert_eq!(
            calc_gas_limit(parent_limit, parent_limit / 2),
            parent_limit
        );
    }

    #[test]
    fn test_gas_limit_floor() {
        assert_eq!(calc_gas_limit(MIN_GAS_LIMIT, 0), MIN_GAS_LIMIT);
    }
}
