// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! In-memory collaborators used by the worker's unit tests: a journalled
//! account state, a transfer-only executor, a header-chain store and a
//! scripted transaction pool.

use crate::{
    chain::{ChainReader, SpeculativeState, VmConfig},
    engine::ConsensusEngine,
    environment::GasPool,
    error::{
        ChainError, EngineError, ExecutionError, PoolError, StateError,
    },
    parameters::{tx::TX_GAS, worker::TX_CHAN_SIZE},
    pool::{
        NewTxsEvent, SenderGroups, TransactionPool, TxPoolSubscription,
    },
};
use keccak_hash::keccak;
use parking_lot::{Mutex, RwLock};
use primitives::{
    Action, Block, BlockHeader, BlockManifest, Context, EtxSet, LogEntry,
    Receipt, SignedTransaction, Transaction, TxType,
    TRANSACTION_OUTCOME_SUCCESS,
};
use rlp::RlpStream;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering},
        mpsc, Arc,
    },
};
use trident_types::{Address, H256, U256};

/// A journalled in-memory account state. Prefetcher starts and stops are
/// mirrored into a shared gauge so tests can assert on leaks.
pub struct MemState {
    accounts: BTreeMap<Address, (U256, U256)>,
    journal: Vec<BTreeMap<Address, (U256, U256)>>,
    prepared: Option<(H256, usize)>,
    prefetching: bool,
    prefetcher_gauge: Arc<AtomicIsize>,
}

impl MemState {
    pub fn new(prefetcher_gauge: Arc<AtomicIsize>) -> Self {
        MemState {
            accounts: BTreeMap::new(),
            journal: Vec::new(),
            prepared: None,
            prefetching: false,
            prefetcher_gauge,
        }
    }

    /// Seed an account with a balance and a starting nonce.
    pub fn fund(&mut self, address: Address, balance: u64, nonce: u64) {
        self.accounts
            .insert(address, (balance.into(), nonce.into()));
    }

    pub fn prepared(&self) -> Option<(H256, usize)> { self.prepared }
}

impl SpeculativeState for MemState {
    fn root(&self) -> H256 {
        let mut stream = RlpStream::new_list(self.accounts.len());
        for (address, (balance, nonce)) in &self.accounts {
            stream.begin_list(3);
            stream.append(address).append(balance).append(nonce);
        }
        keccak(stream.out())
    }

    fn balance(&self, address: &Address) -> U256 {
        self.accounts
            .get(address)
            .map(|(balance, _)| *balance)
            .unwrap_or_default()
    }

    fn nonce(&self, address: &Address) -> U256 {
        self.accounts
            .get(address)
            .map(|(_, nonce)| *nonce)
            .unwrap_or_default()
    }

    fn set_balance(&mut self, address: &Address, balance: U256) {
        self.accounts.entry(*address).or_default().0 = balance;
    }

    fn set_nonce(&mut self, address: &Address, nonce: U256) {
        self.accounts.entry(*address).or_default().1 = nonce;
    }

    fn snapshot(&mut self) -> usize {
        self.journal.push(self.accounts.clone());
        self.journal.len() - 1
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        if id < self.journal.len() {
            self.accounts = self.journal[id].clone();
            self.journal.truncate(id);
        }
    }

    fn prepare(&mut self, tx_hash: H256, index: usize) {
        self.prepared = Some((tx_hash, index));
    }

    fn boxed_copy(&self) -> Box<dyn SpeculativeState> {
        Box::new(MemState {
            accounts: self.accounts.clone(),
            journal: Vec::new(),
            prepared: self.prepared,
            prefetching: false,
            prefetcher_gauge: self.prefetcher_gauge.clone(),
        })
    }

    fn start_prefetcher(&mut self, _tag: &str) {
        if !self.prefetching {
            self.prefetching = true;
            self.prefetcher_gauge.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stop_prefetcher(&mut self) {
        if self.prefetching {
            self.prefetching = false;
            self.prefetcher_gauge.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Engine double: copies the parent difficulty into the draft and commits
/// the state root when assembling. Coincidence follows the header order.
pub struct MockEngine {
    node_ctx: Context,
    fail_prepare: AtomicBool,
}

impl MockEngine {
    pub fn new(node_ctx: Context) -> Self {
        MockEngine {
            node_ctx,
            fail_prepare: AtomicBool::new(false),
        }
    }

    pub fn fail_next_prepare(&self) {
        self.fail_prepare.store(true, Ordering::SeqCst);
    }
}

impl ConsensusEngine for MockEngine {
    fn prepare(
        &self, _chain: &dyn ChainReader, header: &mut BlockHeader,
        parent: &BlockHeader,
    ) -> Result<(), EngineError> {
        if self.fail_prepare.swap(false, Ordering::SeqCst) {
            return Err(EngineError::InvalidHeader(
                "scripted prepare failure".into(),
            ));
        }
        header.set_difficulty(*parent.difficulty());
        Ok(())
    }

    fn finalize_and_assemble(
        &self, _chain: &dyn ChainReader, mut header: BlockHeader,
        state: Option<&mut dyn SpeculativeState>,
        txs: Vec<Arc<SignedTransaction>>, uncles: Vec<BlockHeader>,
        etxs: Vec<Arc<SignedTransaction>>, sub_manifest: BlockManifest,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError> {
        if let Some(state) = state {
            header.set_state_root(state.root());
        }
        Ok(Block::new(
            header,
            txs,
            uncles,
            etxs,
            sub_manifest,
            receipts,
        ))
    }

    fn is_dom_coincident(&self, header: &BlockHeader) -> bool {
        header
            .calc_order()
            .map_or(false, |order| order < self.node_ctx)
    }
}

/// Scripted transaction pool with broadcastable admission events.
#[derive(Default)]
pub struct MockTxPool {
    pending: Mutex<SenderGroups>,
    locals: Mutex<Vec<Address>>,
    subscribers: Mutex<Vec<mpsc::SyncSender<NewTxsEvent>>>,
    error_senders: Mutex<Vec<mpsc::Sender<PoolError>>>,
}

impl MockTxPool {
    pub fn new() -> Self { Self::default() }

    pub fn set_pending(&self, pending: SenderGroups) {
        *self.pending.lock() = pending;
    }

    pub fn set_locals(&self, locals: Vec<Address>) {
        *self.locals.lock() = locals;
    }

    /// Deliver an admission event to every subscriber.
    pub fn announce(&self, txs: Vec<Arc<SignedTransaction>>) {
        for subscriber in self.subscribers.lock().iter() {
            let _ = subscriber.try_send(NewTxsEvent { txs: txs.clone() });
        }
    }

    /// Break every subscription from the pool side.
    pub fn fail_subscriptions(&self) {
        for sender in self.error_senders.lock().iter() {
            let _ = sender
                .send(PoolError::Unavailable("pool shutting down".into()));
        }
    }
}

impl TransactionPool for MockTxPool {
    fn subscribe_new_txs(&self) -> TxPoolSubscription {
        let (txs_tx, txs_rx) = mpsc::sync_channel(TX_CHAN_SIZE);
        let (err_tx, err_rx) = mpsc::channel();
        self.subscribers.lock().push(txs_tx);
        self.error_senders.lock().push(err_tx);
        TxPoolSubscription {
            txs: txs_rx,
            errors: err_rx,
        }
    }

    fn ready_transactions(
        &self, _enforce_tips: bool, _etx_set: &EtxSet,
    ) -> Result<SenderGroups, PoolError> {
        Ok(self.pending.lock().clone())
    }

    fn locals(&self) -> Vec<Address> { self.locals.lock().clone() }
}

/// Header-chain store plus a transfer-only transaction executor.
pub struct MockChain {
    genesis: H256,
    blocks: RwLock<HashMap<H256, Arc<Block>>>,
    current: RwLock<Arc<Block>>,
    states: RwLock<HashMap<H256, MemState>>,
    pruned: RwLock<HashSet<H256>>,
    recovery_enabled: AtomicBool,
    etx_emitters: RwLock<HashSet<Address>>,
    failing_receivers: RwLock<HashSet<Address>>,
    manifests: RwLock<HashMap<H256, BlockManifest>>,
    rollups: RwLock<HashMap<H256, Vec<Arc<SignedTransaction>>>>,
    apply_hook: Mutex<Option<Box<dyn Fn(usize) + Send>>>,
    apply_count: AtomicUsize,
}

impl MockChain {
    pub fn new(genesis_block: Arc<Block>) -> Self {
        let genesis = genesis_block.hash();
        let mut blocks = HashMap::new();
        blocks.insert(genesis, genesis_block.clone());
        MockChain {
            genesis,
            blocks: RwLock::new(blocks),
            current: RwLock::new(genesis_block),
            states: RwLock::new(HashMap::new()),
            pruned: RwLock::new(HashSet::new()),
            recovery_enabled: AtomicBool::new(true),
            etx_emitters: RwLock::new(HashSet::new()),
            failing_receivers: RwLock::new(HashSet::new()),
            manifests: RwLock::new(HashMap::new()),
            rollups: RwLock::new(HashMap::new()),
            apply_hook: Mutex::new(None),
            apply_count: AtomicUsize::new(0),
        }
    }

    pub fn insert_block(&self, block: Arc<Block>, make_current: bool) {
        self.blocks.write().insert(block.hash(), block.clone());
        if make_current {
            *self.current.write() = block;
        }
    }

    pub fn register_state(&self, state: MemState) {
        self.states.write().insert(state.root(), state);
    }

    /// Make `state_at` fail for `root`, as if the trie had been pruned.
    pub fn prune_state(&self, root: H256) {
        self.pruned.write().insert(root);
    }

    pub fn disable_recovery(&self) {
        self.recovery_enabled.store(false, Ordering::SeqCst);
    }

    /// Calls to these addresses emit one cross-context transaction.
    pub fn add_etx_emitter(&self, address: Address) {
        self.etx_emitters.write().insert(address);
    }

    /// Calls to these addresses fail with a generic execution error.
    pub fn add_failing_receiver(&self, address: Address) {
        self.failing_receivers.write().insert(address);
    }

    pub fn set_manifest(&self, header_hash: H256, manifest: BlockManifest) {
        self.manifests.write().insert(header_hash, manifest);
    }

    pub fn set_rollup(
        &self, block_hash: H256, rollup: Vec<Arc<SignedTransaction>>,
    ) {
        self.rollups.write().insert(block_hash, rollup);
    }

    /// Invoke `hook` with the running apply count after each successful
    /// transaction.
    pub fn set_apply_hook(&self, hook: Box<dyn Fn(usize) + Send>) {
        *self.apply_hook.lock() = Some(hook);
    }
}

impl ChainReader for MockChain {
    fn genesis_hash(&self) -> H256 { self.genesis }

    fn current_block(&self) -> Arc<Block> { self.current.read().clone() }

    fn current_header(&self) -> Arc<BlockHeader> {
        Arc::new(self.current.read().header().clone())
    }

    fn get_block(&self, hash: &H256, number: u64) -> Option<Arc<Block>> {
        self.blocks
            .read()
            .get(hash)
            .filter(|block| block.number() == number)
            .cloned()
    }

    fn get_blocks_from_hash(
        &self, hash: &H256, count: u64,
    ) -> Vec<Arc<Block>> {
        let blocks = self.blocks.read();
        let mut chain = Vec::new();
        let mut cursor = *hash;
        for _ in 0..count {
            match blocks.get(&cursor) {
                Some(block) => {
                    cursor = *block.parent_hash();
                    chain.push(block.clone());
                }
                None => break,
            }
        }
        chain
    }

    fn collect_block_manifest(
        &self, header: &BlockHeader,
    ) -> Result<BlockManifest, ChainError> {
        Ok(self
            .manifests
            .read()
            .get(&header.hash())
            .cloned()
            .unwrap_or_default())
    }

    fn collect_etx_rollup(
        &self, block: &Block,
    ) -> Result<Vec<Arc<SignedTransaction>>, ChainError> {
        Ok(self
            .rollups
            .read()
            .get(&block.hash())
            .cloned()
            .unwrap_or_default())
    }

    fn state_at(
        &self, root: &H256,
    ) -> Result<Box<dyn SpeculativeState>, StateError> {
        if self.pruned.read().contains(root) {
            return Err(StateError::Unavailable(*root));
        }
        self.states
            .read()
            .get(root)
            .map(|state| state.boxed_copy())
            .ok_or(StateError::Unavailable(*root))
    }

    fn state_at_block(
        &self, block: &Block, _max_reexec: u64,
    ) -> Result<Box<dyn SpeculativeState>, StateError> {
        if !self.recovery_enabled.load(Ordering::SeqCst) {
            return Err(StateError::Unavailable(*block.state_root()));
        }
        self.states
            .read()
            .get(block.state_root())
            .map(|state| state.boxed_copy())
            .ok_or(StateError::Unavailable(*block.state_root()))
    }

    fn get_vm_config(&self) -> VmConfig { VmConfig::default() }

    fn apply_transaction(
        &self, coinbase: &Address, gas_pool: &mut GasPool,
        state: &mut dyn SpeculativeState, _header: &BlockHeader,
        tx: &SignedTransaction, gas_used: &mut u64, _vm_config: &VmConfig,
    ) -> Result<Receipt, ExecutionError> {
        if tx.unsigned.tx_type == TxType::External {
            return Err(ExecutionError::TxTypeNotSupported);
        }
        let sender = tx.sender();
        let expected = state.nonce(&sender);
        if tx.nonce() < expected {
            return Err(ExecutionError::NonceTooLow {
                address: sender,
                expected,
                got: tx.nonce(),
            });
        }
        if tx.nonce() > expected {
            return Err(ExecutionError::NonceTooHigh {
                address: sender,
                expected,
                got: tx.nonce(),
            });
        }
        gas_pool.sub_gas(tx.gas())?;

        let gas_cost = U256::from(TX_GAS) * *tx.gas_price();
        let total = gas_cost + tx.unsigned.value;
        let balance = state.balance(&sender);
        if balance < total {
            gas_pool.add_gas(tx.gas());
            return Err(ExecutionError::InsufficientBalance {
                need: total,
                have: balance,
            });
        }
        if let Action::Call(to) = tx.unsigned.action {
            if self.failing_receivers.read().contains(&to) {
                gas_pool.add_gas(tx.gas());
                return Err(ExecutionError::Other(
                    "execution reverted".into(),
                ));
            }
        }

        state.set_balance(&sender, balance - total);
        state.set_nonce(&sender, expected + U256::one());
        if let Action::Call(to) = tx.unsigned.action {
            let recipient_balance = state.balance(&to);
            state.set_balance(&to, recipient_balance + tx.unsigned.value);
        }
        let coinbase_balance = state.balance(coinbase);
        state.set_balance(coinbase, coinbase_balance + gas_cost);
        gas_pool.add_gas(tx.gas().saturating_sub(TX_GAS));
        *gas_used += TX_GAS;

        let logs = vec![LogEntry {
            address: sender,
            topics: vec![tx.hash()],
            data: vec![],
        }];
        let mut etxs = Vec::new();
        if let Action::Call(to) = tx.unsigned.action {
            if self.etx_emitters.read().contains(&to) {
                etxs.push(
                    Transaction {
                        nonce: U256::zero(),
                        gas_price: *tx.gas_price(),
                        gas: TX_GAS,
                        action: Action::Call(to),
                        value: tx.unsigned.value,
                        data: vec![],
                        tx_type: TxType::External,
                    }
                    .with_sender(sender),
                );
            }
        }

        let receipt = Receipt::new(
            TRANSACTION_OUTCOME_SUCCESS,
            *gas_used,
            TX_GAS,
            logs,
            etxs,
        );
        let count = self.apply_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.apply_hook.lock().as_ref() {
            hook(count);
        }
        Ok(receipt)
    }
}

/// A plain funded transfer to `to`.
pub fn transfer_tx(
    sender: Address, to: Address, nonce: u64, gas_price: u64,
) -> Arc<SignedTransaction> {
    Arc::new(
        Transaction {
            nonce: nonce.into(),
            gas_price: gas_price.into(),
            gas: TX_GAS,
            action: Action::Call(to),
            value: U256::one(),
            data: vec![],
            tx_type: TxType::Internal,
        }
        .with_sender(sender),
    )
}
