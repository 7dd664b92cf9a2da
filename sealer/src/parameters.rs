// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

pub mod worker {
    use std::time::Duration;

    /// The size of the queue listening to sealing results.
    pub const RESULT_QUEUE_SIZE: usize = 10;
    /// The size of the channel listening to new-transaction events,
    /// referenced from the size of the transaction pool.
    pub const TX_CHAN_SIZE: usize = 4096;
    /// The size of the resubmit interval adjustment channel.
    pub const RESUBMIT_ADJUST_CHAN_SIZE: usize = 10;
    /// The number of confirmations within which sealing progress is logged
    /// at info level.
    pub const SEALING_LOG_AT_DEPTH: u64 = 7;
    /// The minimal interval at which sealing work may be recreated with
    /// newly arrived transactions.
    pub const MIN_RECOMMIT_INTERVAL: Duration = Duration::from_secs(1);
    /// The maximum depth of an acceptable stale side block.
    pub const STALE_THRESHOLD: u64 = 7;
    /// Maximum number of pending block bodies kept in cache.
    pub const PENDING_BLOCK_BODY_LIMIT: usize = 1024;
    /// Maximum number of uncles referenced by one block.
    pub const MAX_UNCLES: usize = 2;
    /// How many ancestors are walked when building the uncle admission sets.
    pub const ANCESTOR_WINDOW: u64 = 7;
    /// How many blocks may be re-executed to recover a pruned parent state.
    pub const STATE_RECOVERY_DEPTH: u64 = 1024;
    /// Lower clamp on the resubmit interval adjustment ratio.
    pub const RESUBMIT_RATIO_FLOOR: f64 = 0.1;

    /// Cadence of the stale-uncle sweep in the main loop.
    pub const UNCLE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
    /// Sleep between polls when the main loop has nothing to service.
    pub const MAIN_LOOP_SLEEP: Duration = Duration::from_millis(30);
}

pub mod tx {
    /// Gas cost of a plain transaction, the floor below which no further
    /// transaction can be packed.
    pub const TX_GAS: u64 = 21000;
}

pub mod block {
    /// Bound divisor of the per-block gas limit drift.
    pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;
    /// Minimum gas limit a block may ever carry.
    pub const MIN_GAS_LIMIT: u64 = 5000;
    /// Bound divisor of the per-block base fee change.
    pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
    /// A block targets half of its gas limit.
    pub const ELASTICITY_MULTIPLIER: u64 = 2;
    /// The smallest unit count of one whole coin: 10 ** 18.
    pub const WEI_PER_COIN: u64 = 1_000_000_000_000_000_000;
}
