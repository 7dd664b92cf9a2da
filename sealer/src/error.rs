// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use primitives::HeaderOrderError;
use thiserror::Error;
use trident_types::{Address, H256, U256};

/// Errors raised while executing a single transaction against the sealing
/// state. These never fail a cycle; the inclusion loop maps each kind onto
/// an iterator action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("gas limit reached for the current block")]
    GasLimitReached,

    #[error("nonce too low: address {address:?} expected {expected} got {got}")]
    NonceTooLow {
        address: Address,
        expected: U256,
        got: U256,
    },

    #[error("nonce too high: address {address:?} expected {expected} got {got}")]
    NonceTooHigh {
        address: Address,
        expected: U256,
        got: U256,
    },

    #[error("transaction type not supported by this chain configuration")]
    TxTypeNotSupported,

    #[error("insufficient balance: need {need} have {have}")]
    InsufficientBalance { need: U256, have: U256 },

    /// All other execution failures.
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the state database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state unavailable for root {0:?}")]
    Unavailable(H256),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the header chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("missing ancestor {0:?}")]
    MissingAncestor(H256),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("transaction pool unavailable: {0}")]
    Unavailable(String),
}

/// Errors that abort one sealing cycle. The worker stays healthy for the
/// next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("etherbase not found")]
    MissingCoinbase,

    #[error("invalid timestamp, parent {parent} given {given}")]
    InvalidTimestamp { parent: u64, given: u64 },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Order(#[from] HeaderOrderError),

    #[error("manifest collection failed: {0}")]
    ManifestCollection(ChainError),

    #[error("etx rollup collection failed: {0}")]
    EtxRollupCollection(ChainError),
}

/// Why a candidate side block was refused admission as an uncle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UncleError {
    #[error("uncle not unique")]
    NotUnique,

    #[error("uncle is sibling")]
    IsSibling,

    #[error("uncle's parent unknown")]
    ParentUnknown,

    #[error("uncle already included")]
    AlreadyIncluded,

    #[error("too many uncles")]
    TooManyUncles,
}
