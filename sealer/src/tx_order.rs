// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::pool::SenderGroups;
use log::trace;
use primitives::{SignedTransaction, Signer};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BinaryHeap, VecDeque},
    sync::Arc,
};
use trident_types::{Address, H256, U256};

/// One sender's head transaction, keyed for the priority heap by the tip it
/// pays on top of the block's base fee. Ties break toward the smaller
/// transaction hash so iteration order is reproducible.
struct PricedTransaction {
    tx: Arc<SignedTransaction>,
    sender: Address,
    effective_tip: U256,
    hash: H256,
}

impl PartialEq for PricedTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.effective_tip == other.effective_tip && self.hash == other.hash
    }
}

impl Eq for PricedTransaction {}

impl PartialOrd for PricedTransaction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PricedTransaction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.effective_tip
            .cmp(&other.effective_tip)
            .then_with(|| other.hash.cmp(&self.hash))
    }
}

/// Pending transactions ordered for inclusion: a priority heap over each
/// sender's head transaction, backed by per-sender nonce-ordered queues.
/// `shift` keeps per-sender nonce order across the heap; `pop` abandons a
/// sender for the rest of the block.
pub struct PriceOrderedTransactions {
    /// Remaining transactions per sender, heads excluded.
    queues: BTreeMap<Address, VecDeque<Arc<SignedTransaction>>>,
    /// Current head transaction of every sender still in play.
    heads: BinaryHeap<PricedTransaction>,
    signer: Signer,
    base_fee: U256,
}

impl PriceOrderedTransactions {
    /// Build the ordering from the pool's sender groups. Senders whose head
    /// transaction cannot cover `base_fee` are dropped wholesale, since
    /// their later nonces cannot execute without the head.
    pub fn new(
        signer: Signer, groups: SenderGroups, base_fee: U256,
    ) -> Self {
        let mut this = PriceOrderedTransactions {
            queues: BTreeMap::new(),
            heads: BinaryHeap::with_capacity(groups.len()),
            signer,
            base_fee,
        };
        // BTreeMap order makes construction independent of the map the
        // groups arrived in.
        let sorted: BTreeMap<Address, Vec<Arc<SignedTransaction>>> =
            groups.into_iter().collect();
        for (sender, txs) in sorted {
            let mut queue: VecDeque<Arc<SignedTransaction>> = txs.into();
            if let Some(head) = queue.pop_front() {
                if this.push_head(sender, head) {
                    this.queues.insert(sender, queue);
                }
            }
        }
        this
    }

    /// The best transaction across all senders, if any.
    pub fn peek(&self) -> Option<&Arc<SignedTransaction>> {
        self.heads.peek().map(|priced| &priced.tx)
    }

    /// Advance past the current head of `sender`, promoting the sender's
    /// next nonce into the heap. Must be called for the sender of the last
    /// peeked transaction.
    pub fn shift(&mut self, sender: Address) {
        let head_matches = self
            .heads
            .peek()
            .map_or(false, |top| top.sender == sender);
        if !head_matches {
            return;
        }
        self.heads.pop();
        let next = self
            .queues
            .get_mut(&sender)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(tx) => {
                if !self.push_head(sender, tx) {
                    self.queues.remove(&sender);
                }
            }
            None => {
                self.queues.remove(&sender);
            }
        }
    }

    /// Abandon the current head's sender for the rest of the block.
    pub fn pop(&mut self) {
        if let Some(top) = self.heads.pop() {
            self.queues.remove(&top.sender);
        }
    }

    pub fn is_empty(&self) -> bool { self.heads.is_empty() }

    fn push_head(
        &mut self, sender: Address, tx: Arc<SignedTransaction>,
    ) -> bool {
        debug_assert_eq!(self.signer.sender(&tx), sender);
        match tx.effective_gas_tip(&self.base_fee) {
            Some(effective_tip) => {
                let hash = tx.hash();
                self.heads.push(PricedTransaction {
                    tx,
                    sender,
                    effective_tip,
                    hash,
                });
                true
            }
            None => {
                trace!(
                    "Dropping underpriced sender from inclusion: {:?}",
                    sender
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PriceOrderedTransactions;
    use crate::pool::SenderGroups;
    use primitives::{Action, Signer, Transaction, TxType};
    use std::sync::Arc;
    use trident_types::{Address, U256};

    fn tx(
        sender: Address, nonce: u64, gas_price: u64,
    ) -> Arc<primitives::SignedTransaction> {
        Arc::new(
            Transaction {
                nonce: nonce.into(),
                gas_price: gas_price.into(),
                gas: 21000,
                action: Action::Call(Address::repeat_byte(0xEE)),
                value: 1.into(),
                data: vec![],
                tx_type: TxType::Internal,
            }
            .with_sender(sender),
        )
    }

    fn ordered(
        groups: SenderGroups, base_fee: u64,
    ) -> PriceOrderedTransactions {
        PriceOrderedTransactions::new(
            Signer::new(1),
            groups,
            U256::from(base_fee),
        )
    }

    fn drain(mut txs: PriceOrderedTransactions) -> Vec<(Address, u64)> {
        let mut seen = vec![];
        while let Some(tx) = txs.peek().cloned() {
            seen.push((tx.sender(), tx.nonce().as_u64()));
            txs.shift(tx.sender());
        }
        seen
    }

    #[test]
    fn test_price_priority_across_senders() {
        let a = Address::repeat_byte(0xAA);
        let b = Address::repeat_byte(0xBB);
        let mut groups = SenderGroups::new();
        groups.insert(a, vec![tx(a, 5, 100)]);
        groups.insert(b, vec![tx(b, 0, 200)]);

        assert_eq!(drain(ordered(groups, 1)), vec![(b, 0), (a, 5)]);
    }

    #[test]
    fn test_shift_preserves_sender_nonce_order() {
        let a = Address::repeat_byte(0xAA);
        let b = Address::repeat_byte(0xBB);
        let mut groups = SenderGroups::new();
        // A's later nonce pays more than B but must not jump the queue.
        groups.insert(a, vec![tx(a, 0, 100), tx(a, 1, 500)]);
        groups.insert(b, vec![tx(b, 0, 200)]);

        assert_eq!(
            drain(ordered(groups, 1)),
            vec![(b, 0), (a, 0), (a, 1)]
        );
    }

    #[test]
    fn test_pop_discards_whole_sender() {
        let a = Address::repeat_byte(0xAA);
        let b = Address::repeat_byte(0xBB);
        let mut groups = SenderGroups::new();
        groups.insert(a, vec![tx(a, 0, 300), tx(a, 1, 300)]);
        groups.insert(b, vec![tx(b, 0, 100)]);

        let mut txs = ordered(groups, 1);
        assert_eq!(txs.peek().unwrap().sender(), a);
        txs.pop();
        assert_eq!(txs.peek().unwrap().sender(), b);
        txs.shift(b);
        assert!(txs.is_empty());
    }

    #[test]
    fn test_underpriced_head_drops_sender() {
        let a = Address::repeat_byte(0xAA);
        let mut groups = SenderGroups::new();
        groups.insert(a, vec![tx(a, 0, 50), tx(a, 1, 500)]);

        let txs = ordered(groups, 100);
        assert!(txs.is_empty());
    }

    #[test]
    fn test_deterministic_for_equal_prices() {
        let build = || {
            let mut groups = SenderGroups::new();
            for byte in [0x11u8, 0x22, 0x33, 0x44] {
                let sender = Address::repeat_byte(byte);
                groups
                    .insert(sender, vec![tx(sender, 0, 100), tx(sender, 1, 100)]);
            }
            ordered(groups, 1)
        };
        let first = drain(build());
        let second = drain(build());
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
    }

    #[test]
    fn test_tie_break_is_by_hash() {
        let a = Address::repeat_byte(0xAA);
        let b = Address::repeat_byte(0xBB);
        let ta = tx(a, 0, 100);
        let tb = tx(b, 0, 100);
        let expect_first = if ta.hash() < tb.hash() { a } else { b };

        let mut groups = SenderGroups::new();
        groups.insert(a, vec![ta]);
        groups.insert(b, vec![tb]);
        let txs = ordered(groups, 1);
        assert_eq!(txs.peek().unwrap().sender(), expect_first);
    }
}
