// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    chain::SpeculativeState,
    error::{ExecutionError, UncleError},
    parameters::worker::MAX_UNCLES,
};
use parking_lot::RwLock;
use primitives::{
    Block, BlockHeader, BlockManifest, Context, Receipt, SignedTransaction,
    Signer,
};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};
use trident_types::{Address, H256};

/// Gas available to the transactions of one block, drawn down as they
/// execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPool(u64);

impl GasPool {
    pub fn new(gas: u64) -> Self { GasPool(gas) }

    pub fn gas(&self) -> u64 { self.0 }

    /// Draw `amount` from the pool, failing with `GasLimitReached` when the
    /// remainder cannot cover it.
    pub fn sub_gas(&mut self, amount: u64) -> Result<(), ExecutionError> {
        if self.0 < amount {
            return Err(ExecutionError::GasLimitReached);
        }
        self.0 -= amount;
        Ok(())
    }

    pub fn add_gas(&mut self, amount: u64) { self.0 += amount; }
}

impl fmt::Display for GasPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The worker's mutable workspace for one sealing cycle: the parent-state
/// snapshot, the draft header and everything accumulated while filling the
/// block. Dropping an environment stops its state prefetcher, so replacing
/// the current cycle or unwinding any exit path releases the background
/// task.
pub struct Environment {
    /// Derives transaction senders for the header's epoch.
    pub signer: Signer,
    /// State to apply changes to. Absent outside the zone context.
    pub state: Option<Box<dyn SpeculativeState>>,
    /// Hashes of the recent ancestors, used for checking uncle parent
    /// validity.
    pub ancestors: HashSet<H256>,
    /// Hashes of the recent ancestors and their uncles, used for rejecting
    /// already-referenced uncles.
    pub family: HashSet<H256>,
    /// Count of transactions committed in this cycle.
    pub tcount: usize,
    /// Gas available to pack transactions; populated from the header gas
    /// limit on first use.
    pub gas_pool: Option<GasPool>,
    /// Fee recipient for this cycle. May differ from the header coinbase.
    pub coinbase: Address,
    /// The draft header.
    pub header: BlockHeader,
    pub txs: Vec<Arc<SignedTransaction>>,
    pub etxs: Vec<Arc<SignedTransaction>>,
    pub sub_manifest: BlockManifest,
    pub receipts: Vec<Receipt>,
    /// Admitted uncles by hash. The inclusion loop and the uncle commit
    /// path may race, hence the lock.
    pub uncles: RwLock<HashMap<H256, BlockHeader>>,
    /// Gas consumed across this context's incoming sub-block chain.
    /// Populated by the sub-chain aggregator before the gas limit is
    /// adjusted.
    pub external_gas_used: u64,
    /// Length of the incoming sub-block chain; same precondition as
    /// `external_gas_used`.
    pub external_block_length: usize,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Environment")
            .field("signer", &self.signer)
            .field("state", &self.state.as_ref().map(|_| "<SpeculativeState>"))
            .field("ancestors", &self.ancestors)
            .field("family", &self.family)
            .field("tcount", &self.tcount)
            .field("gas_pool", &self.gas_pool)
            .field("coinbase", &self.coinbase)
            .field("header", &self.header)
            .field("txs", &self.txs)
            .field("etxs", &self.etxs)
            .field("sub_manifest", &self.sub_manifest)
            .field("receipts", &self.receipts)
            .field("uncles", &self.uncles)
            .field("external_gas_used", &self.external_gas_used)
            .field("external_block_length", &self.external_block_length)
            .finish()
    }
}

impl Environment {
    /// A header-only environment, used outside the zone context where no
    /// state is touched.
    pub fn new_header_only(header: BlockHeader) -> Self {
        let signer = Signer::new(header.number());
        Environment {
            signer,
            state: None,
            ancestors: HashSet::new(),
            family: HashSet::new(),
            tcount: 0,
            gas_pool: None,
            coinbase: Address::default(),
            header,
            txs: Vec::new(),
            etxs: Vec::new(),
            sub_manifest: Vec::new(),
            receipts: Vec::new(),
            uncles: RwLock::new(HashMap::new()),
            external_gas_used: 0,
            external_block_length: 0,
        }
    }

    /// Deep copy. The copy's state starts without a running prefetcher;
    /// transactions are shared since they are immutable.
    pub fn copy(&self, node_ctx: Context) -> Environment {
        if node_ctx.is_zone() {
            Environment {
                signer: self.signer,
                state: self.state.as_ref().map(|s| s.boxed_copy()),
                ancestors: self.ancestors.clone(),
                family: self.family.clone(),
                tcount: self.tcount,
                gas_pool: self.gas_pool,
                coinbase: self.coinbase,
                header: self.header.clone(),
                txs: self.txs.clone(),
                etxs: self.etxs.clone(),
                sub_manifest: self.sub_manifest.clone(),
                receipts: self.receipts.clone(),
                uncles: RwLock::new(self.uncles.read().clone()),
                external_gas_used: self.external_gas_used,
                external_block_length: self.external_block_length,
            }
        } else {
            Environment::new_header_only(self.header.clone())
        }
    }

    /// The admitted uncles in list form.
    pub fn unclelist(&self) -> Vec<BlockHeader> {
        self.uncles.read().values().cloned().collect()
    }

    /// Admit `uncle` into the environment. This is the only admission path:
    /// every invariant on the uncle set is enforced here, under the uncle
    /// write lock.
    pub fn commit_uncle(&self, uncle: BlockHeader) -> Result<(), UncleError> {
        let mut uncles = self.uncles.write();
        let hash = uncle.hash();
        if uncles.len() >= MAX_UNCLES {
            return Err(UncleError::TooManyUncles);
        }
        if uncles.contains_key(&hash) {
            return Err(UncleError::NotUnique);
        }
        if self.header.parent_hash() == uncle.parent_hash() {
            return Err(UncleError::IsSibling);
        }
        if !self.ancestors.contains(uncle.parent_hash()) {
            return Err(UncleError::ParentUnknown);
        }
        if self.family.contains(&hash) {
            return Err(UncleError::AlreadyIncluded);
        }
        uncles.insert(hash, uncle);
        Ok(())
    }

    /// Walk `ancestor_blocks` (nearest first) into the ancestor and family
    /// sets.
    pub fn record_ancestry<'a, I>(&mut self, ancestor_blocks: I)
    where I: IntoIterator<Item = &'a Arc<Block>> {
        for ancestor in ancestor_blocks {
            for uncle in &ancestor.uncles {
                self.family.insert(uncle.hash());
            }
            self.family.insert(ancestor.hash());
            self.ancestors.insert(ancestor.hash());
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.stop_prefetcher();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Environment, GasPool};
    use crate::error::{ExecutionError, UncleError};
    use primitives::{BlockHeader, BlockHeaderBuilder};
    use trident_types::H256;

    fn header_with_parent(parent: H256) -> BlockHeader {
        BlockHeaderBuilder::new()
            .with_parent_hash(parent)
            .with_number(10)
            .build()
    }

    fn uncle_with_parent(parent: H256, nonce: u64) -> BlockHeader {
        BlockHeaderBuilder::new()
            .with_parent_hash(parent)
            .with_number(9)
            .with_nonce(nonce)
            .build()
    }

    #[test]
    fn test_gas_pool_accounting() {
        let mut pool = GasPool::new(42000);
        pool.sub_gas(21000).unwrap();
        assert_eq!(pool.gas(), 21000);
        assert_eq!(
            pool.sub_gas(21001),
            Err(ExecutionError::GasLimitReached)
        );
        pool.add_gas(1);
        pool.sub_gas(21001).unwrap();
        assert_eq!(pool.gas(), 0);
    }

    #[test]
    fn test_commit_uncle_admission_rules() {
        let parent = H256::repeat_byte(1);
        let ancestor = H256::repeat_byte(2);
        let mut env =
            Environment::new_header_only(header_with_parent(parent));
        env.ancestors.insert(ancestor);
        env.ancestors.insert(parent);

        // sibling of the sealing block
        assert_eq!(
            env.commit_uncle(uncle_with_parent(parent, 0)),
            Err(UncleError::IsSibling)
        );

        // forks off an unknown block
        assert_eq!(
            env.commit_uncle(uncle_with_parent(H256::repeat_byte(9), 0)),
            Err(UncleError::ParentUnknown)
        );

        // valid candidate
        let good = uncle_with_parent(ancestor, 0);
        env.commit_uncle(good.clone()).unwrap();
        assert_eq!(
            env.commit_uncle(good),
            Err(UncleError::NotUnique)
        );

        // already referenced by an ancestor
        let referenced = uncle_with_parent(ancestor, 1);
        env.family.insert(referenced.hash());
        assert_eq!(
            env.commit_uncle(referenced),
            Err(UncleError::AlreadyIncluded)
        );

        // the set is capped
        env.commit_uncle(uncle_with_parent(ancestor, 2)).unwrap();
        assert_eq!(
            env.commit_uncle(uncle_with_parent(ancestor, 3)),
            Err(UncleError::TooManyUncles)
        );
        assert_eq!(env.uncles.read().len(), 2);
    }
}
