// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    block_header::BlockHeader, receipt::Receipt,
    transaction::SignedTransaction,
};
use keccak_hash::keccak;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::sync::Arc;
use trident_types::{H256, U256};

pub type BlockNumber = u64;

/// The ordered hashes of sub-context blocks aggregated by a block.
pub type BlockManifest = Vec<H256>;

/// Commit to an ordered list of RLP-encodable items: the keccak digest of
/// the RLP list encoding. The empty list commits to the well-known
/// empty-list hash.
fn derive_list_root<'a, T, I>(items: I) -> H256
where
    T: Encodable + 'a,
    I: ExactSizeIterator<Item = &'a T>,
{
    let mut stream = RlpStream::new_list(items.len());
    for item in items {
        stream.append(item);
    }
    keccak(stream.out())
}

pub fn compute_transaction_root(
    transactions: &[Arc<SignedTransaction>],
) -> H256 {
    derive_list_root(transactions.iter().map(|tx| tx.as_ref()))
}

pub fn compute_uncle_hash(uncles: &[BlockHeader]) -> H256 {
    derive_list_root(uncles.iter())
}

pub fn compute_receipts_root(receipts: &[Receipt]) -> H256 {
    derive_list_root(receipts.iter())
}

pub fn compute_manifest_hash(manifest: &BlockManifest) -> H256 {
    derive_list_root(manifest.iter())
}

/// A block body: everything below the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub transactions: Vec<Arc<SignedTransaction>>,
    pub uncles: Vec<BlockHeader>,
    pub ext_transactions: Vec<Arc<SignedTransaction>>,
    pub sub_manifest: BlockManifest,
}

impl Body {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
            && self.uncles.is_empty()
            && self.ext_transactions.is_empty()
            && self.sub_manifest.is_empty()
    }
}

impl Encodable for Body {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.begin_list(self.transactions.len());
        for tx in &self.transactions {
            s.append(tx.as_ref());
        }
        s.append_list(&self.uncles);
        s.begin_list(self.ext_transactions.len());
        for etx in &self.ext_transactions {
            s.append(etx.as_ref());
        }
        s.append_list(&self.sub_manifest);
    }
}

impl Decodable for Body {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        if r.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Body {
            transactions: r
                .list_at::<SignedTransaction>(0)?
                .into_iter()
                .map(Arc::new)
                .collect(),
            uncles: r.list_at(1)?,
            ext_transactions: r
                .list_at::<SignedTransaction>(2)?
                .into_iter()
                .map(Arc::new)
                .collect(),
            sub_manifest: r.list_at(3)?,
        })
    }
}

/// A block, encoded as it is on the block chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// The header of this block.
    pub block_header: BlockHeader,
    /// The transactions in this block.
    pub transactions: Vec<Arc<SignedTransaction>>,
    /// The uncle headers referenced by this block.
    pub uncles: Vec<BlockHeader>,
    /// Cross-context transactions emitted while executing this block.
    pub ext_transactions: Vec<Arc<SignedTransaction>>,
    /// Sub-context block hashes aggregated by this block.
    pub sub_manifest: BlockManifest,
}

impl Block {
    /// Assemble a block, recomputing the body commitments (transactions,
    /// uncles, emitted etxs, receipts) into the header.
    pub fn new(
        mut block_header: BlockHeader,
        transactions: Vec<Arc<SignedTransaction>>, uncles: Vec<BlockHeader>,
        ext_transactions: Vec<Arc<SignedTransaction>>,
        sub_manifest: BlockManifest, receipts: &[Receipt],
    ) -> Self {
        block_header.set_tx_root(compute_transaction_root(&transactions));
        block_header.set_uncle_hash(compute_uncle_hash(&uncles));
        block_header
            .set_etx_root(compute_transaction_root(&ext_transactions));
        block_header.set_receipts_root(compute_receipts_root(receipts));
        block_header.compute_hash();
        Block {
            block_header,
            transactions,
            uncles,
            ext_transactions,
            sub_manifest,
        }
    }

    /// A block wrapping an existing header without touching its roots.
    pub fn from_header(block_header: BlockHeader) -> Self {
        Block {
            block_header,
            transactions: Vec::new(),
            uncles: Vec::new(),
            ext_transactions: Vec::new(),
            sub_manifest: Vec::new(),
        }
    }

    pub fn hash(&self) -> H256 { self.block_header.hash() }

    pub fn number(&self) -> u64 { self.block_header.number() }

    pub fn parent_hash(&self) -> &H256 { self.block_header.parent_hash() }

    pub fn timestamp(&self) -> u64 { self.block_header.timestamp() }

    pub fn gas_limit(&self) -> u64 { self.block_header.gas_limit() }

    pub fn gas_used(&self) -> u64 { self.block_header.gas_used() }

    pub fn base_fee(&self) -> &U256 { self.block_header.base_fee() }

    pub fn state_root(&self) -> &H256 { self.block_header.state_root() }

    pub fn header(&self) -> &BlockHeader { &self.block_header }

    pub fn body(&self) -> Body {
        Body {
            transactions: self.transactions.clone(),
            uncles: self.uncles.clone(),
            ext_transactions: self.ext_transactions.clone(),
            sub_manifest: self.sub_manifest.clone(),
        }
    }

    pub fn transaction_hashes(&self) -> Vec<H256> {
        self.transactions.iter().map(|tx| tx.hash()).collect()
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.block_header);
        s.append(&self.body());
    }
}

impl Decodable for Block {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        if r.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let block_header = r.val_at(0)?;
        let body: Body = r.val_at(1)?;
        Ok(Block {
            block_header,
            transactions: body.transactions,
            uncles: body.uncles,
            ext_transactions: body.ext_transactions,
            sub_manifest: body.sub_manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        compute_manifest_hash, compute_transaction_root, Block, Body,
    };
    use crate::{
        block_header::BlockHeaderBuilder,
        transaction::{Action, Transaction, TxType},
    };
    use keccak_hash::KECCAK_EMPTY_LIST_RLP;
    use rlp::Rlp;
    use std::sync::Arc;
    use trident_types::{Address, H256};

    fn tx(nonce: u64) -> Arc<crate::SignedTransaction> {
        Arc::new(
            Transaction {
                nonce: nonce.into(),
                gas_price: 100.into(),
                gas: 21000,
                action: Action::Call(Address::repeat_byte(8)),
                value: 1.into(),
                data: vec![],
                tx_type: TxType::Internal,
            }
            .with_sender(Address::repeat_byte(1)),
        )
    }

    #[test]
    fn test_empty_list_roots() {
        assert_eq!(compute_transaction_root(&[]), KECCAK_EMPTY_LIST_RLP);
        assert_eq!(compute_manifest_hash(&vec![]), KECCAK_EMPTY_LIST_RLP);
    }

    #[test]
    fn test_new_block_commits_body_roots() {
        let header = BlockHeaderBuilder::new().with_number(3).build();
        let txs = vec![tx(0), tx(1)];
        let block =
            Block::new(header, txs.clone(), vec![], vec![], vec![], &[]);
        assert_eq!(
            *block.block_header.tx_root(),
            compute_transaction_root(&txs)
        );
        assert_eq!(
            *block.block_header.uncle_hash(),
            KECCAK_EMPTY_LIST_RLP
        );
    }

    #[test]
    fn test_block_rlp_round_trip() {
        let header = BlockHeaderBuilder::new()
            .with_number(5)
            .with_parent_hash(H256::repeat_byte(4))
            .build();
        let block = Block::new(
            header,
            vec![tx(0)],
            vec![],
            vec![tx(7)],
            vec![H256::repeat_byte(0xAB)],
            &[],
        );
        let encoded = rlp::encode(&block);
        let decoded: Block = Rlp::new(&encoded).as_val().unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_body_round_trip_preserves_emptiness() {
        let body = Body::default();
        assert!(body.is_empty());
        let decoded: Body =
            Rlp::new(&rlp::encode(&body)[..]).as_val().unwrap();
        assert!(decoded.is_empty());
    }
}
