// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! The block-sealing worker of a trident node. For a committed parent block
//! it snapshots parent state, drives the interrupt-aware transaction
//! inclusion loop, attaches uncles, computes the manifest and cross-context
//! rollup commitments, and exposes the resulting pending block to the
//! sealer and to external readers.

pub mod body_cache;
pub mod chain;
pub mod engine;
pub mod environment;
pub mod error;
pub mod feed;
pub mod misc;
pub mod parameters;
pub mod pool;
pub mod rawdb;
pub mod test_helpers;
pub mod tx_order;
pub mod worker;

pub use crate::{
    body_cache::{body_fingerprint, PendingBodyCache},
    chain::{ChainReader, SpeculativeState, VmConfig},
    engine::ConsensusEngine,
    environment::{Environment, GasPool},
    error::{
        ChainError, EngineError, ExecutionError, PoolError, StateError,
        UncleError, WorkerError,
    },
    feed::{Feed, FeedReceiver},
    pool::{
        NewTxsEvent, SenderGroups, TransactionPool, TxPoolSubscription,
    },
    tx_order::PriceOrderedTransactions,
    worker::{CommitInterrupt, IntervalAdjust, SealerConfig, Worker},
};
