// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    chain::{ChainReader, SpeculativeState},
    error::EngineError,
};
use primitives::{
    Block, BlockHeader, BlockManifest, Receipt, SignedTransaction,
};
use std::sync::Arc;

/// The consensus engine operations the worker drives. Everything else the
/// engine does (difficulty adjustment, seal verification) stays behind this
/// seam.
pub trait ConsensusEngine: Send + Sync {
    /// Initialize the consensus fields of a draft header according to the
    /// rules of the engine.
    fn prepare(
        &self, chain: &dyn ChainReader, header: &mut BlockHeader,
        parent: &BlockHeader,
    ) -> Result<(), EngineError>;

    /// Run post-transaction state modifications and assemble the candidate
    /// block. `state` is absent outside the zone context, where headers
    /// aggregate without execution.
    #[allow(clippy::too_many_arguments)]
    fn finalize_and_assemble(
        &self, chain: &dyn ChainReader, header: BlockHeader,
        state: Option<&mut dyn SpeculativeState>,
        txs: Vec<Arc<SignedTransaction>>, uncles: Vec<BlockHeader>,
        etxs: Vec<Arc<SignedTransaction>>, sub_manifest: BlockManifest,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError>;

    /// Whether `header` also satisfies the dominant context's difficulty
    /// threshold, making it a join point across contexts.
    fn is_dom_coincident(&self, header: &BlockHeader) -> bool;
}
