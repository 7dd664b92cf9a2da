// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

pub mod block;
pub mod block_header;
pub mod context;
pub mod log_entry;
pub mod receipt;
pub mod transaction;

pub use crate::{
    block::{
        compute_manifest_hash, compute_receipts_root,
        compute_transaction_root, compute_uncle_hash, Block, BlockManifest,
        BlockNumber, Body,
    },
    block_header::{BlockHeader, BlockHeaderBuilder, HeaderOrderError},
    context::Context,
    log_entry::LogEntry,
    receipt::{
        Receipt, TRANSACTION_OUTCOME_FAILURE, TRANSACTION_OUTCOME_SUCCESS,
    },
    transaction::{
        Action, EtxSet, SignedTransaction, Signer, Transaction, TxType,
    },
};

/// Raw byte payloads carried by transactions and headers.
pub type Bytes = Vec<u8>;
