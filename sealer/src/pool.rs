// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::error::PoolError;
use primitives::{EtxSet, SignedTransaction};
use std::{collections::HashMap, sync::mpsc, sync::Arc};
use trident_types::Address;

/// Pending transactions grouped by sender, each group in ascending nonce
/// order.
pub type SenderGroups = HashMap<Address, Vec<Arc<SignedTransaction>>>;

/// Batch of transactions newly admitted to the pool.
#[derive(Debug, Clone)]
pub struct NewTxsEvent {
    pub txs: Vec<Arc<SignedTransaction>>,
}

/// A live subscription to pool events. `txs` delivers admission batches;
/// `errors` delivers a single message when the subscription breaks on the
/// pool side, after which both channels disconnect.
pub struct TxPoolSubscription {
    pub txs: mpsc::Receiver<NewTxsEvent>,
    pub errors: mpsc::Receiver<PoolError>,
}

/// The transaction pool surface the worker consumes.
pub trait TransactionPool: Send + Sync {
    fn subscribe_new_txs(&self) -> TxPoolSubscription;

    /// The pending set, parameterized by the inbound cross-context
    /// transactions available to the parent.
    fn ready_transactions(
        &self, enforce_tips: bool, etx_set: &EtxSet,
    ) -> Result<SenderGroups, PoolError>;

    /// Accounts treated as locally submitted and given inclusion priority.
    fn locals(&self) -> Vec<Address>;
}
