// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    environment::GasPool,
    error::{ChainError, ExecutionError, StateError},
};
use primitives::{
    Block, BlockHeader, BlockManifest, Receipt, SignedTransaction,
};
use std::sync::Arc;
use trident_types::{Address, H256, U256};

/// Virtual machine knobs handed through to transaction execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmConfig {
    /// Skip base-fee checks when replaying transactions for tracing.
    pub no_base_fee: bool,
}

/// A mutable snapshot of the world state rooted at some block, owned by a
/// single sealing environment. Journalled: `snapshot`/`revert_to_snapshot`
/// bracket each transaction attempt.
pub trait SpeculativeState: Send + Sync {
    /// Root of the state in its current shape.
    fn root(&self) -> H256;

    fn balance(&self, address: &Address) -> U256;

    fn nonce(&self, address: &Address) -> U256;

    fn set_balance(&mut self, address: &Address, balance: U256);

    fn set_nonce(&mut self, address: &Address, nonce: U256);

    /// Record a journal mark that `revert_to_snapshot` can roll back to.
    fn snapshot(&mut self) -> usize;

    fn revert_to_snapshot(&mut self, id: usize);

    /// Set the transaction hash and index the journal attributes produced
    /// logs to.
    fn prepare(&mut self, tx_hash: H256, index: usize);

    /// An independent copy of the state; the copy starts without a running
    /// prefetcher.
    fn boxed_copy(&self) -> Box<dyn SpeculativeState>;

    fn start_prefetcher(&mut self, tag: &str);

    fn stop_prefetcher(&mut self);
}

/// The header chain and its processor, as consumed by the worker.
pub trait ChainReader: Send + Sync {
    fn genesis_hash(&self) -> H256;

    fn current_block(&self) -> Arc<Block>;

    fn current_header(&self) -> Arc<BlockHeader>;

    fn get_block(&self, hash: &H256, number: u64) -> Option<Arc<Block>>;

    /// Walk back from `hash`, returning up to `count` blocks starting with
    /// the one identified by `hash` itself.
    fn get_blocks_from_hash(&self, hash: &H256, count: u64) -> Vec<Arc<Block>>;

    /// The ordered sub-context manifest accumulated up to `header`,
    /// exclusive of `header` itself.
    fn collect_block_manifest(
        &self, header: &BlockHeader,
    ) -> Result<BlockManifest, ChainError>;

    /// The cross-context transactions accumulated between the previous
    /// dominant coincidence and `block`, exclusive of `block` itself.
    fn collect_etx_rollup(
        &self, block: &Block,
    ) -> Result<Vec<Arc<SignedTransaction>>, ChainError>;

    /// State at an exact root.
    fn state_at(&self, root: &H256)
        -> Result<Box<dyn SpeculativeState>, StateError>;

    /// State at a block, recovered by re-executing up to `max_reexec`
    /// ancestors when the exact root has been pruned.
    fn state_at_block(
        &self, block: &Block, max_reexec: u64,
    ) -> Result<Box<dyn SpeculativeState>, StateError>;

    fn get_vm_config(&self) -> VmConfig;

    /// Execute one transaction against `state`, drawing gas from
    /// `gas_pool` and accumulating into `gas_used`.
    #[allow(clippy::too_many_arguments)]
    fn apply_transaction(
        &self, coinbase: &Address, gas_pool: &mut GasPool,
        state: &mut dyn SpeculativeState, header: &BlockHeader,
        tx: &SignedTransaction, gas_used: &mut u64, vm_config: &VmConfig,
    ) -> Result<Receipt, ExecutionError>;
}
