// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    body_cache::PendingBodyCache,
    chain::{ChainReader, SpeculativeState},
    engine::ConsensusEngine,
    environment::{Environment, GasPool},
    error::{ExecutionError, PoolError, StateError, WorkerError},
    feed::{Feed, FeedReceiver, TryRecvError},
    misc::{calc_base_fee, calc_gas_limit},
    parameters::{
        tx::TX_GAS,
        worker::{
            ANCESTOR_WINDOW, MAIN_LOOP_SLEEP, MAX_UNCLES,
            MIN_RECOMMIT_INTERVAL, PENDING_BLOCK_BODY_LIMIT,
            RESUBMIT_ADJUST_CHAN_SIZE, RESUBMIT_RATIO_FLOOR,
            SEALING_LOG_AT_DEPTH, STALE_THRESHOLD, STATE_RECOVERY_DEPTH,
            UNCLE_SWEEP_INTERVAL,
        },
    },
    pool::{NewTxsEvent, SenderGroups, TransactionPool},
    rawdb,
    tx_order::PriceOrderedTransactions,
};
use kvdb::KeyValueDB;
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use primitives::{
    compute_manifest_hash, compute_transaction_root, Block, BlockHeader,
    BlockManifest, Body, Bytes, Context, LogEntry, Receipt,
    SignedTransaction,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
        mpsc,
        mpsc::{Receiver, SyncSender},
        Arc,
    },
    thread,
    thread::JoinHandle,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use trident_types::{Address, H256, U256, ZERO_ADDRESS};

/// Signal shared with the inclusion loop through a 32-bit atomic word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommitInterrupt {
    /// Keep going.
    None,
    /// Discard the semi-finished work; a new chain head arrived.
    NewHead,
    /// Submit what is built so far and widen the resubmit interval.
    Resubmit,
}

impl CommitInterrupt {
    pub const fn raw(self) -> i32 {
        match self {
            CommitInterrupt::None => 0,
            CommitInterrupt::NewHead => 1,
            CommitInterrupt::Resubmit => 2,
        }
    }

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => CommitInterrupt::NewHead,
            2 => CommitInterrupt::Resubmit,
            _ => CommitInterrupt::None,
        }
    }
}

/// A resubmit interval adjustment published by the inclusion loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalAdjust {
    pub ratio: f64,
    pub inc: bool,
}

/// Sealing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealerConfig {
    /// Public address for block sealing rewards.
    pub etherbase: Address,
    /// HTTP URLs to be notified of new work packages.
    pub notify: Vec<String>,
    /// Notify with pending block headers instead of work packages.
    pub notify_full: bool,
    /// Block extra data set by the sealer.
    pub extra_data: Bytes,
    /// Target gas floor for sealed blocks.
    pub gas_floor: u64,
    /// Target gas ceiling for sealed blocks; zero means unbounded.
    pub gas_ceil: u64,
    /// Minimum gas price for including a transaction.
    pub gas_price: U256,
    /// The interval for the sealer to re-create sealing work.
    pub recommit: Duration,
    /// Disable remote sealing solution verification.
    pub no_verify: bool,
}

impl Default for SealerConfig {
    fn default() -> Self {
        SealerConfig {
            etherbase: ZERO_ADDRESS,
            notify: Vec::new(),
            notify_full: false,
            extra_data: Bytes::new(),
            gas_floor: 0,
            gas_ceil: 0,
            gas_price: U256::one(),
            recommit: Duration::from_secs(3),
            no_verify: false,
        }
    }
}

/// Settings mutable while the worker runs, behind one lock.
struct Settings {
    coinbase: Address,
    extra: Bytes,
    gas_ceil: u64,
    recommit: Duration,
}

/// The read-mostly triple exposed to external readers.
#[derive(Default)]
struct Snapshot {
    block: Option<Arc<Block>>,
    receipts: Vec<Receipt>,
    state: Option<Box<dyn SpeculativeState>>,
}

/// Candidate side blocks, split by origin.
#[derive(Default)]
struct UnclePools {
    local: HashMap<H256, Arc<Block>>,
    remote: HashMap<H256, Arc<Block>>,
}

/// Parameters of one sealing attempt.
struct GenerateParams {
    /// The timestamp for the sealing task.
    timestamp: u64,
    /// Whether the given timestamp is immutable.
    force_time: bool,
    /// The fee recipient for included transactions.
    coinbase: Address,
}

/// The block-sealing worker: builds candidate successor blocks for a given
/// parent, keeps the pending-block snapshot current and maintains the uncle
/// and pending-body bookkeeping.
pub struct Worker {
    chain: Arc<dyn ChainReader>,
    engine: Arc<dyn ConsensusEngine>,
    tx_pool: Arc<dyn TransactionPool>,
    db: Arc<dyn KeyValueDB>,
    node_ctx: Context,

    settings: RwLock<Settings>,

    /// The environment of the current running cycle.
    current: Mutex<Option<Environment>>,
    uncle_pools: RwLock<UnclePools>,
    pending_body_cache: PendingBodyCache,

    snapshot: RwLock<Snapshot>,
    pending_logs_feed: Feed<Vec<LogEntry>>,

    running: AtomicBool,
    new_txs: AtomicU32,
    noempty: AtomicBool,
    exit: Arc<AtomicBool>,

    resubmit_adjust_tx: SyncSender<IntervalAdjust>,
    resubmit_adjust_rx: Mutex<Option<Receiver<IntervalAdjust>>>,

    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(
        config: &SealerConfig, node_ctx: Context, db: Arc<dyn KeyValueDB>,
        engine: Arc<dyn ConsensusEngine>, chain: Arc<dyn ChainReader>,
        tx_pool: Arc<dyn TransactionPool>,
    ) -> Arc<Worker> {
        let recommit = sanitize_recommit(config.recommit);
        let (resubmit_adjust_tx, resubmit_adjust_rx) =
            mpsc::sync_channel(RESUBMIT_ADJUST_CHAN_SIZE);

        let worker = Arc::new(Worker {
            chain,
            engine,
            tx_pool,
            db,
            node_ctx,
            settings: RwLock::new(Settings {
                coinbase: config.etherbase,
                extra: config.extra_data.clone(),
                gas_ceil: config.gas_ceil,
                recommit,
            }),
            current: Mutex::new(None),
            uncle_pools: RwLock::new(UnclePools::default()),
            pending_body_cache: PendingBodyCache::new(
                PENDING_BLOCK_BODY_LIMIT,
            ),
            snapshot: RwLock::new(Snapshot::default()),
            pending_logs_feed: Feed::new("pending-logs"),
            running: AtomicBool::new(false),
            new_txs: AtomicU32::new(0),
            noempty: AtomicBool::new(false),
            exit: Arc::new(AtomicBool::new(false)),
            resubmit_adjust_tx,
            resubmit_adjust_rx: Mutex::new(Some(resubmit_adjust_rx)),
            handles: Mutex::new(Vec::new()),
        });

        let txs_rx = if node_ctx.is_zone() {
            let subscription = worker.tx_pool.subscribe_new_txs();
            let exit_worker = worker.clone();
            let exit_handle = thread::Builder::new()
                .name("sealer-events".into())
                .spawn(move || {
                    event_exit_loop(exit_worker, subscription.errors)
                })
                .expect("sealer event loop spawns once");
            worker.handles.lock().push(exit_handle);
            Some(subscription.txs)
        } else {
            None
        };

        let main_worker = worker.clone();
        let main_handle = thread::Builder::new()
            .name("sealer".into())
            .spawn(move || main_loop(main_worker, txs_rx))
            .expect("sealer main loop spawns once");
        worker.handles.lock().push(main_handle);

        worker
    }

    // ---- lifecycle ----------------------------------------------------

    /// Mark the worker as sealing.
    pub fn start(&self) { self.running.store(true, Ordering::SeqCst); }

    /// Mark the worker as not sealing.
    pub fn stop(&self) { self.running.store(false, Ordering::SeqCst); }

    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    /// Terminate all background threads. The worker does not support being
    /// closed more than once.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.exit.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    // ---- settings -----------------------------------------------------

    /// Set the address block sealing rewards are credited to.
    pub fn set_etherbase(&self, coinbase: Address) {
        self.settings.write().coinbase = coinbase;
    }

    pub fn set_gas_ceil(&self, gas_ceil: u64) {
        self.settings.write().gas_ceil = gas_ceil;
    }

    /// Set the content of the sealed blocks' extra-data field.
    pub fn set_extra(&self, extra: Bytes) {
        self.settings.write().extra = extra;
    }

    /// Update the interval for sealing work recommitting.
    pub fn set_recommit_interval(&self, interval: Duration) {
        self.settings.write().recommit = sanitize_recommit(interval);
    }

    pub fn recommit_interval(&self) -> Duration {
        self.settings.read().recommit
    }

    /// Disable the pre-seal empty block feature.
    pub fn disable_preseal(&self) {
        self.noempty.store(true, Ordering::SeqCst);
    }

    /// Enable the pre-seal empty block feature.
    pub fn enable_preseal(&self) {
        self.noempty.store(false, Ordering::SeqCst);
    }

    pub fn preseal_disabled(&self) -> bool {
        self.noempty.load(Ordering::SeqCst)
    }

    /// Count of transactions that arrived since the last sealing round.
    pub fn new_txs_since_last_seal(&self) -> u32 {
        self.new_txs.load(Ordering::Relaxed)
    }

    /// Subscribe to logs produced while filling the pending block.
    pub fn subscribe_pending_logs(&self) -> FeedReceiver<Vec<LogEntry>> {
        self.pending_logs_feed.subscribe()
    }

    /// Hand the resubmit-adjust receiver to the sealer loop. The inclusion
    /// loop publishes interval widening hints into it.
    pub fn take_resubmit_adjust_rx(
        &self,
    ) -> Option<Receiver<IntervalAdjust>> {
        self.resubmit_adjust_rx.lock().take()
    }

    // ---- snapshot readers ---------------------------------------------

    /// The pending block and a copy of the state it was built on.
    pub fn pending(
        &self,
    ) -> Option<(Arc<Block>, Box<dyn SpeculativeState>)> {
        let snapshot = self.snapshot.read();
        let state = snapshot.state.as_ref()?.boxed_copy();
        Some((snapshot.block.clone()?, state))
    }

    /// The pending block.
    pub fn pending_block(&self) -> Option<Arc<Block>> {
        self.snapshot.read().block.clone()
    }

    /// The pending block and its receipts.
    pub fn pending_block_and_receipts(
        &self,
    ) -> Option<(Arc<Block>, Vec<Receipt>)> {
        let snapshot = self.snapshot.read();
        Some((snapshot.block.clone()?, snapshot.receipts.clone()))
    }

    // ---- pending block bodies ------------------------------------------

    pub fn load_pending_block_body(&self) {
        self.pending_body_cache.load_from_disk(&*self.db);
    }

    pub fn store_pending_block_body(&self) {
        self.pending_body_cache.store_to_disk(&*self.db);
    }

    pub fn add_pending_block_body(&self, header: &BlockHeader, body: &Body) {
        self.pending_body_cache.add(header, body);
    }

    pub fn get_pending_block_body(
        &self, header: &BlockHeader,
    ) -> Option<Body> {
        let body = self.pending_body_cache.get(header);
        if body.is_none() {
            warn!(
                "Pending block body not found for header {:?}",
                header.hash()
            );
        }
        body
    }

    // ---- uncle maintenance ---------------------------------------------

    /// Offer a side block as a possible uncle for future sealing work.
    pub fn register_uncle(&self, block: Arc<Block>, local: bool) {
        let mut pools = self.uncle_pools.write();
        let pool = if local { &mut pools.local } else { &mut pools.remote };
        pool.insert(block.hash(), block);
    }

    pub(crate) fn sweep_stale_uncles(&self) {
        let head_number = self.chain.current_block().number();
        let mut pools = self.uncle_pools.write();
        pools
            .local
            .retain(|_, uncle| uncle.number() + STALE_THRESHOLD > head_number);
        pools
            .remote
            .retain(|_, uncle| uncle.number() + STALE_THRESHOLD > head_number);
    }

    // ---- sealing cycle --------------------------------------------------

    /// Build the environment for sealing on top of `parent`: parent state
    /// (recovered from ancestors when pruned), a fresh prefetcher, and the
    /// ancestry sets used for uncle admission.
    fn make_env(
        &self, parent: &Block, header: BlockHeader, coinbase: Address,
    ) -> Result<Environment, StateError> {
        let mut state = match self.chain.state_at(parent.state_root()) {
            Ok(state) => state,
            Err(e) => {
                // The parent state may already be pruned under us; recover
                // by re-executing a bounded number of ancestors.
                let recovered = self
                    .chain
                    .state_at_block(parent, STATE_RECOVERY_DEPTH);
                warn!(
                    "Recovered sealing state: root={:?} err={}",
                    parent.state_root(),
                    e
                );
                recovered?
            }
        };
        state.start_prefetcher("miner");

        let mut env = Environment::new_header_only(header);
        env.state = Some(state);
        env.coinbase = coinbase;
        let ancestors = self
            .chain
            .get_blocks_from_hash(&parent.hash(), ANCESTOR_WINDOW);
        env.record_ancestry(ancestors.iter());
        Ok(env)
    }

    /// Construct the sealing task for `parent` according to `params`. The
    /// pending transactions are not filled yet.
    fn prepare_work(
        &self, params: &GenerateParams, parent: &Block,
    ) -> Result<Environment, WorkerError> {
        let settings = self.settings.read();

        // Recap the timestamp to parent+1 if mutation is allowed.
        let mut timestamp = params.timestamp;
        if parent.timestamp() >= timestamp {
            if params.force_time {
                return Err(WorkerError::InvalidTimestamp {
                    parent: parent.timestamp(),
                    given: timestamp,
                });
            }
            timestamp = parent.timestamp() + 1;
        }

        let mut header = BlockHeader::empty();
        header.set_parent_hash(parent.hash());
        header.set_number(parent.number() + 1);
        header.set_timestamp(timestamp);

        // Entropy fields are undefined on top of genesis.
        if parent.hash() != self.chain.genesis_hash() {
            let order = parent.header().calc_order()?;
            if self.node_ctx != Context::Prime {
                if order < self.node_ctx {
                    header.set_parent_delta_s(U256::zero());
                } else {
                    header
                        .set_parent_delta_s(parent.header().calc_delta_s());
                }
            }
            header.set_parent_entropy(parent.header().calc_s());
        }

        // Only the zone context computes state.
        if self.node_ctx.is_zone() {
            header.set_extra(settings.extra.clone());
            header.set_base_fee(calc_base_fee(parent.header()));
            if self.is_running() {
                if settings.coinbase == ZERO_ADDRESS {
                    error!("Refusing to seal without etherbase");
                    return Err(WorkerError::MissingCoinbase);
                }
                header.set_coinbase(settings.coinbase);
            }

            if let Err(e) =
                self.engine.prepare(&*self.chain, &mut header, parent.header())
            {
                error!("Failed to prepare header for sealing: {}", e);
                return Err(e.into());
            }
            let env =
                match self.make_env(parent, header, params.coinbase) {
                    Ok(env) => env,
                    Err(e) => {
                        error!("Failed to create sealing context: {}", e);
                        return Err(e.into());
                    }
                };

            // Accumulate the uncles, preferring locally generated ones.
            let pools = self.uncle_pools.read();
            self.commit_pool_uncles(&env, &pools.local);
            self.commit_pool_uncles(&env, &pools.remote);
            Ok(env)
        } else {
            Ok(Environment::new_header_only(header))
        }
    }

    fn commit_pool_uncles(
        &self, env: &Environment, pool: &HashMap<H256, Arc<Block>>,
    ) {
        for (hash, candidate) in pool {
            if env.uncles.read().len() >= MAX_UNCLES {
                break;
            }
            match env.commit_uncle(candidate.header().clone()) {
                Ok(()) => debug!("Committing new uncle to block: {:?}", hash),
                Err(e) => trace!(
                    "Possible uncle rejected: hash={:?} reason={}",
                    hash, e
                ),
            }
        }
    }

    /// Execute one transaction against the environment, reverting the state
    /// journal on failure. Returns the logs the transaction produced.
    fn commit_transaction(
        &self, env: &mut Environment, tx: &Arc<SignedTransaction>,
    ) -> Result<Vec<LogEntry>, ExecutionError> {
        let vm_config = self.chain.get_vm_config();
        let Environment {
            ref mut state,
            ref mut gas_pool,
            ref mut header,
            ref coinbase,
            ref mut txs,
            ref mut receipts,
            ref mut etxs,
            ..
        } = *env;
        let state = state
            .as_mut()
            .expect("zone environments carry state; qed");
        let gas_pool = gas_pool
            .as_mut()
            .expect("gas pool is set before committing; qed");

        let snap = state.snapshot();
        let mut gas_used = header.gas_used();
        let receipt = match self.chain.apply_transaction(
            coinbase,
            gas_pool,
            state.as_mut(),
            header,
            tx,
            &mut gas_used,
            &vm_config,
        ) {
            Ok(receipt) => receipt,
            Err(e) => {
                debug!(
                    "Error playing transaction in worker: err={} tx={:?} block={} gas_used={}",
                    e,
                    tx.hash(),
                    header.number(),
                    gas_used
                );
                state.revert_to_snapshot(snap);
                return Err(e);
            }
        };
        header.set_gas_used(gas_used);

        txs.push(tx.clone());
        let logs = receipt.logs.clone();
        if receipt.is_successful() {
            etxs.extend(receipt.etxs.iter().cloned().map(Arc::new));
        }
        receipts.push(receipt);
        Ok(logs)
    }

    /// The interrupt-driven inclusion loop. Walks `txs` in price-and-nonce
    /// order, dispatching on per-transaction errors. Returns `true` iff a
    /// new-head interrupt fired, meaning the caller should discard the
    /// environment.
    pub(crate) fn commit_transactions(
        &self, env: &mut Environment, txs: &mut PriceOrderedTransactions,
        interrupt: Option<&AtomicI32>,
    ) -> bool {
        let gas_limit = env.header.gas_limit();
        if env.gas_pool.is_none() {
            env.gas_pool = Some(GasPool::new(gas_limit));
        }

        let mut coalesced_logs: Vec<LogEntry> = Vec::new();

        loop {
            // Interrupts: a new head discards the semi-finished work, a
            // resubmit submits what is built so far and asks the sealer to
            // widen its interval.
            if let Some(word) = interrupt {
                let signal =
                    CommitInterrupt::from_raw(word.load(Ordering::SeqCst));
                if signal != CommitInterrupt::None {
                    if signal == CommitInterrupt::Resubmit {
                        let pool_gas = env
                            .gas_pool
                            .map(|pool| pool.gas())
                            .unwrap_or(gas_limit);
                        let mut ratio = if gas_limit == 0 {
                            1.0
                        } else {
                            (gas_limit - pool_gas) as f64 / gas_limit as f64
                        };
                        if ratio < RESUBMIT_RATIO_FLOOR {
                            ratio = RESUBMIT_RATIO_FLOOR;
                        }
                        if let Err(e) = self
                            .resubmit_adjust_tx
                            .try_send(IntervalAdjust { ratio, inc: true })
                        {
                            trace!(
                                "Resubmit adjust channel saturated: {}",
                                e
                            );
                        }
                    }
                    return signal == CommitInterrupt::NewHead;
                }
            }
            // If we don't have enough gas for any further transactions
            // then we're done.
            let pool_gas =
                env.gas_pool.as_ref().map(|p| p.gas()).unwrap_or(0);
            if pool_gas < TX_GAS {
                trace!(
                    "Not enough gas for further transactions: have={} want={}",
                    pool_gas, TX_GAS
                );
                break;
            }
            // Retrieve the next transaction and abort if all done.
            let tx = match txs.peek() {
                Some(tx) => tx.clone(),
                None => break,
            };
            let from = env.signer.sender(&tx);

            env.state
                .as_mut()
                .expect("zone environments carry state; qed")
                .prepare(tx.hash(), env.tcount);

            match self.commit_transaction(env, &tx) {
                Err(ExecutionError::GasLimitReached) => {
                    // Pop the current out-of-gas transaction without
                    // shifting in the next from the account.
                    trace!(
                        "Gas limit exceeded for current block: sender={:?}",
                        from
                    );
                    txs.pop();
                }
                Err(ExecutionError::NonceTooLow { .. }) => {
                    // New head notification data race between the
                    // transaction pool and worker, shift.
                    trace!(
                        "Skipping transaction with low nonce: sender={:?} nonce={}",
                        from,
                        tx.nonce()
                    );
                    txs.shift(from);
                }
                Err(ExecutionError::NonceTooHigh { .. }) => {
                    // Reorg notification data race between the transaction
                    // pool and worker, skip the account.
                    debug!(
                        "Skipping account with high nonce: sender={:?} nonce={}",
                        from,
                        tx.nonce()
                    );
                    txs.pop();
                }
                Ok(logs) => {
                    // Everything ok, collect the logs and shift in the next
                    // transaction from the same account.
                    coalesced_logs.extend(logs);
                    env.tcount += 1;
                    txs.shift(from);
                }
                Err(ExecutionError::TxTypeNotSupported) => {
                    // Pop the unsupported transaction without shifting in
                    // the next from the account.
                    error!(
                        "Skipping unsupported transaction type: sender={:?}",
                        from
                    );
                    txs.pop();
                }
                Err(e) => {
                    // Strange error, discard the transaction and get the
                    // next in line (note, the nonce-too-high clause will
                    // prevent us from executing in vain).
                    debug!(
                        "Transaction failed, account skipped: hash={:?} err={}",
                        tx.hash(),
                        e
                    );
                    txs.shift(from);
                }
            }
        }

        if !self.is_running() && !coalesced_logs.is_empty() {
            // While sealing, the pending log push is suppressed: the logs
            // get "upgraded" to mined logs when the block is sealed, and a
            // copy avoids racing that upgrade.
            let logs = coalesced_logs.to_vec();
            self.pending_logs_feed.send(logs);
        }
        false
    }

    /// Select pending transactions for the environment: locals first, then
    /// remotes, each partition in price-and-nonce order.
    pub(crate) fn fill_transactions(
        &self, interrupt: Option<&AtomicI32>, env: &mut Environment,
        parent: &Block,
    ) {
        let etx_set = match rawdb::read_etx_set(
            &*self.db,
            &parent.hash(),
            parent.number(),
        ) {
            Some(set) => set,
            None => return,
        };
        let pending =
            match self.tx_pool.ready_transactions(true, &etx_set) {
                Ok(pending) => pending,
                Err(e) => {
                    debug!("Failed to fetch pending transactions: {}", e);
                    return;
                }
            };

        let mut remote_txs = pending;
        let mut local_txs = SenderGroups::new();
        for account in self.tx_pool.locals() {
            if let Some(txs) = remote_txs.remove(&account) {
                local_txs.insert(account, txs);
            }
        }

        let base_fee = *env.header.base_fee();
        if !local_txs.is_empty() {
            let mut txs = PriceOrderedTransactions::new(
                env.signer, local_txs, base_fee,
            );
            if self.commit_transactions(env, &mut txs, interrupt) {
                return;
            }
        }
        if !remote_txs.is_empty() {
            let mut txs = PriceOrderedTransactions::new(
                env.signer, remote_txs, base_fee,
            );
            if self.commit_transactions(env, &mut txs, interrupt) {
                return;
            }
        }
    }

    /// Bias the new gas limit toward the aggregate usage of this context's
    /// incoming sub-block chain.
    pub(crate) fn adjust_gas_limit(
        &self, env: &mut Environment, parent: &Block,
    ) {
        let gas_used_target = (parent.gas_used() + env.external_gas_used)
            / (env.external_block_length as u64 + 1);
        let mut gas_limit =
            calc_gas_limit(parent.gas_limit(), gas_used_target);

        let gas_ceil = self.settings.read().gas_ceil;
        if gas_ceil != 0 && gas_limit > gas_ceil {
            gas_limit = gas_ceil;
        }
        env.header.set_gas_limit(gas_limit);
    }

    /// Finalize through the consensus engine, attach the manifest and (in
    /// zone) the etx rollup commitments, and register the body in the
    /// pending-body cache.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn finalize_assemble_and_register(
        &self, header: BlockHeader, parent: &Block,
        state: Option<&mut dyn SpeculativeState>,
        txs: Vec<Arc<SignedTransaction>>, uncles: Vec<BlockHeader>,
        etxs: Vec<Arc<SignedTransaction>>, sub_manifest: BlockManifest,
        receipts: &[Receipt],
    ) -> Result<Block, WorkerError> {
        let mut block = self.engine.finalize_and_assemble(
            &*self.chain,
            header,
            state,
            txs,
            uncles,
            etxs,
            sub_manifest,
            receipts,
        )?;

        // Compute and set the manifest root.
        let manifest = if self.node_ctx.is_prime() {
            // Nothing to aggregate above the prime chain.
            BlockManifest::new()
        } else if self.engine.is_dom_coincident(parent.header()) {
            vec![parent.hash()]
        } else {
            let mut manifest = self
                .chain
                .collect_block_manifest(parent.header())
                .map_err(WorkerError::ManifestCollection)?;
            manifest.push(*block.header().parent_hash());
            manifest
        };
        block
            .block_header
            .set_manifest_hash(compute_manifest_hash(&manifest));

        if self.node_ctx.is_zone() {
            // Compute and set the etx rollup root.
            let rollup = if self.engine.is_dom_coincident(parent.header()) {
                parent.ext_transactions.clone()
            } else {
                let mut rollup = self
                    .chain
                    .collect_etx_rollup(parent)
                    .map_err(WorkerError::EtxRollupCollection)?;
                rollup.extend(parent.ext_transactions.iter().cloned());
                rollup
            };
            block
                .block_header
                .set_etx_rollup_hash(compute_transaction_root(&rollup));
        }
        block.block_header.compute_hash();

        self.add_pending_block_body(block.header(), &block.body());

        Ok(block)
    }

    /// Build a candidate successor of `parent` and expose it through the
    /// snapshot. When `fill` is set the pending pool is drained into it.
    pub fn generate_pending_header(
        &self, parent: &Arc<Block>, fill: bool,
    ) -> Result<BlockHeader, WorkerError> {
        // Every invocation works against a fresh interrupt word; a new
        // cycle preempts this one by storing into it.
        let interrupt = AtomicI32::new(CommitInterrupt::None.raw());
        self.new_txs.store(0, Ordering::Relaxed);
        let start = Instant::now();

        let coinbase = self.settings.read().coinbase;
        if coinbase == ZERO_ADDRESS {
            error!("Refusing to seal without etherbase");
            return Err(WorkerError::MissingCoinbase);
        }

        let mut work = self.prepare_work(
            &GenerateParams {
                timestamp: unix_now(),
                force_time: false,
                coinbase,
            },
            parent,
        )?;

        if self.node_ctx.is_zone() {
            self.adjust_gas_limit(&mut work, parent);
            if fill {
                self.fill_transactions(Some(&interrupt), &mut work, parent);
            }
        }

        // Work on a deep copy: the snapshot exposes the finalized
        // environment to readers, while `current` keeps accepting
        // transactions.
        let mut env = work.copy(self.node_ctx);

        // Swap out the old cycle; dropping its environment terminates the
        // leftover prefetcher.
        *self.current.lock() = Some(work);

        let header = env.header.clone();
        let txs = env.txs.clone();
        let uncles = env.unclelist();
        let etxs = env.etxs.clone();
        let sub_manifest = env.sub_manifest.clone();
        let receipts = env.receipts.clone();
        let state_ref: Option<&mut dyn SpeculativeState> = match env.state.as_mut() {
            Some(s) => Some(s.as_mut()),
            None => None,
        };
        let block = self.finalize_assemble_and_register(
            header,
            parent,
            state_ref,
            txs,
            uncles,
            etxs,
            sub_manifest,
            &receipts,
        )?;
        env.header = block.header().clone();

        {
            let uncles = env.uncles.read().len();
            let fees = total_fees(&block, &env.receipts);
            if self.current_info(block.header()) {
                info!(
                    "Commit new sealing work: number={} hash={:?} uncles={} txs={} etxs={} gas={} fees_wei={} elapsed={:?}",
                    block.number(), block.hash(), uncles, env.tcount,
                    block.ext_transactions.len(), block.gas_used(), fees,
                    start.elapsed()
                );
            } else {
                debug!(
                    "Commit new sealing work: number={} hash={:?} uncles={} txs={} etxs={} gas={} fees_wei={} elapsed={:?}",
                    block.number(), block.hash(), uncles, env.tcount,
                    block.ext_transactions.len(), block.gas_used(), fees,
                    start.elapsed()
                );
            }
        }

        self.update_snapshot(&env);

        let snapshot = self.snapshot.read();
        Ok(snapshot
            .block
            .as_ref()
            .expect("snapshot was updated this cycle; qed")
            .header()
            .clone())
    }

    /// Atomically refresh the pending snapshot from `env`.
    pub(crate) fn update_snapshot(&self, env: &Environment) {
        let mut snapshot = self.snapshot.write();
        snapshot.block = Some(Arc::new(Block::new(
            env.header.clone(),
            env.txs.clone(),
            env.unclelist(),
            env.etxs.clone(),
            env.sub_manifest.clone(),
            &env.receipts,
        )));
        if self.node_ctx.is_zone() {
            snapshot.receipts = env.receipts.clone();
            snapshot.state = env.state.as_ref().map(|s| s.boxed_copy());
        }
    }

    /// Whether `header` is close enough to the chain tip for its sealing
    /// progress to be interesting at info level.
    fn current_info(&self, header: &BlockHeader) -> bool {
        header.number() + SEALING_LOG_AT_DEPTH
            > self.chain.current_header().number()
    }

    /// Apply freshly announced transactions to the pending block while the
    /// worker is not sealing.
    fn on_new_txs(&self, event: NewTxsEvent) {
        if !self.is_running() {
            let mut current = self.current.lock();
            if let Some(env) = current.as_mut() {
                // If the block is already full, abort.
                let full = matches!(
                    env.gas_pool,
                    Some(pool) if pool.gas() < TX_GAS
                );
                if !full {
                    let mut groups = SenderGroups::new();
                    for tx in &event.txs {
                        let sender = env.signer.sender(tx);
                        groups.entry(sender).or_default().push(tx.clone());
                    }
                    let base_fee = *env.header.base_fee();
                    let mut txs = PriceOrderedTransactions::new(
                        env.signer, groups, base_fee,
                    );
                    let tcount = env.tcount;
                    self.commit_transactions(env, &mut txs, None);

                    // Only refresh the snapshot when the pending block
                    // actually gained transactions.
                    if tcount != env.tcount {
                        self.update_snapshot(env);
                    }
                }
            }
        }
        self.new_txs
            .fetch_add(event.txs.len() as u32, Ordering::Relaxed);
    }
}

fn sanitize_recommit(interval: Duration) -> Duration {
    if interval < MIN_RECOMMIT_INTERVAL {
        warn!(
            "Sanitizing sealer recommit interval: provided={:?} updated={:?}",
            interval, MIN_RECOMMIT_INTERVAL
        );
        MIN_RECOMMIT_INTERVAL
    } else {
        interval
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set after the unix epoch")
        .as_secs()
}

/// Total fees the included transactions pay the coinbase, in wei. Block
/// transactions and receipts must be in the same order.
fn total_fees(block: &Block, receipts: &[Receipt]) -> U256 {
    let mut fees = U256::zero();
    for (tx, receipt) in block.transactions.iter().zip(receipts) {
        let tip =
            tx.effective_gas_tip(block.base_fee()).unwrap_or_default();
        fees += tip * receipt.gas_used;
    }
    fees
}

/// Long-lived service loop: sweeps stale uncles on a timer, applies newly
/// announced transactions to the pending block when idle, and unwinds on
/// the exit signal. Runs until close.
fn main_loop(
    worker: Arc<Worker>, txs_rx: Option<mpsc::Receiver<NewTxsEvent>>,
) {
    let mut next_sweep = Instant::now() + UNCLE_SWEEP_INTERVAL;
    loop {
        if worker.exit.load(Ordering::Relaxed) {
            break;
        }
        if Instant::now() >= next_sweep {
            worker.sweep_stale_uncles();
            next_sweep = Instant::now() + UNCLE_SWEEP_INTERVAL;
        }
        match &txs_rx {
            Some(rx) => match rx.try_recv() {
                Ok(event) => worker.on_new_txs(event),
                Err(TryRecvError::Empty) => thread::sleep(MAIN_LOOP_SLEEP),
                Err(TryRecvError::Disconnected) => break,
            },
            None => thread::sleep(MAIN_LOOP_SLEEP),
        }
    }
    // Dropping the in-progress environment releases its prefetcher.
    worker.current.lock().take();
}

/// Companion loop watching the pool subscription's error channel and the
/// exit signal, so either termination unwinds the worker cleanly.
fn event_exit_loop(worker: Arc<Worker>, errors: mpsc::Receiver<PoolError>) {
    loop {
        if worker.exit.load(Ordering::Relaxed) {
            return;
        }
        match errors.try_recv() {
            Ok(e) => {
                warn!("Transaction pool subscription failed: {}", e);
                worker.exit.store(true, Ordering::Relaxed);
                return;
            }
            Err(TryRecvError::Empty) => thread::sleep(MAIN_LOOP_SLEEP),
            Err(TryRecvError::Disconnected) => return,
        }
    }
}
