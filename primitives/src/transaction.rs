// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::Bytes;
use keccak_hash::keccak;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::{collections::HashMap, ops::Deref, sync::Arc};
use trident_types::{Address, H256, U256};

/// The wire discriminant of a transaction. `Internal` transactions originate
/// inside this context; `External` ones are emitted by receipts in another
/// context and settle here through the etx rollup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TxType {
    Internal,
    External,
}

impl Encodable for TxType {
    fn rlp_append(&self, stream: &mut RlpStream) {
        let raw: u8 = match self {
            TxType::Internal => 0,
            TxType::External => 1,
        };
        stream.append_internal(&raw);
    }
}

impl Decodable for TxType {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        match rlp.as_val::<u8>()? {
            0 => Ok(TxType::Internal),
            1 => Ok(TxType::External),
            _ => Err(DecoderError::Custom("unknown transaction type")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create creates new contract.
    Create,
    /// Calls contract at given address.
    /// In the case of a transfer, this is the receiver's address.
    Call(Address),
}

impl Default for Action {
    fn default() -> Action { Action::Create }
}

impl Decodable for Action {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.is_empty() {
            Ok(Action::Create)
        } else {
            Ok(Action::Call(rlp.as_val()?))
        }
    }
}

impl Encodable for Action {
    fn rlp_append(&self, stream: &mut RlpStream) {
        match *self {
            Action::Create => stream.append_internal(&""),
            Action::Call(ref address) => stream.append_internal(address),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Nonce.
    pub nonce: U256,
    /// Gas price.
    pub gas_price: U256,
    /// Gas paid up front for transaction execution.
    pub gas: u64,
    /// Action, can be either call or contract create.
    pub action: Action,
    /// Transferred value.
    pub value: U256,
    /// Transaction data.
    pub data: Bytes,
    /// Wire discriminant.
    pub tx_type: TxType,
}

impl Transaction {
    pub fn hash(&self) -> H256 {
        let mut s = RlpStream::new();
        s.append(self);
        keccak(s.as_raw())
    }

    /// Attach an already-recovered sender. Signature recovery happens at
    /// pool admission; the worker only ever sees recovered transactions.
    pub fn with_sender(self, sender: Address) -> SignedTransaction {
        SignedTransaction::new(self, sender)
    }
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas);
        s.append(&self.action);
        s.append(&self.value);
        s.append(&self.data);
        s.append(&self.tx_type);
    }
}

impl Decodable for Transaction {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        Ok(Transaction {
            nonce: r.val_at(0)?,
            gas_price: r.val_at(1)?,
            gas: r.val_at(2)?,
            action: r.val_at(3)?,
            value: r.val_at(4)?,
            data: r.val_at(5)?,
            tx_type: r.val_at(6)?,
        })
    }
}

/// A transaction whose sender has been recovered and verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Plain transaction.
    pub unsigned: Transaction,
    /// Recovered sender.
    pub sender: Address,
    /// Hash of the signed representation.
    hash: H256,
}

impl Deref for SignedTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target { &self.unsigned }
}

impl SignedTransaction {
    pub fn new(unsigned: Transaction, sender: Address) -> Self {
        let mut tx = SignedTransaction {
            unsigned,
            sender,
            hash: H256::zero(),
        };
        tx.hash = keccak(rlp::encode(&tx));
        tx
    }

    pub fn hash(&self) -> H256 { self.hash }

    pub fn sender(&self) -> Address { self.sender }

    pub fn nonce(&self) -> U256 { self.unsigned.nonce }

    pub fn gas(&self) -> u64 { self.unsigned.gas }

    pub fn gas_price(&self) -> &U256 { &self.unsigned.gas_price }

    /// The tip this transaction pays the coinbase on top of `base_fee`, or
    /// `None` if it cannot cover the base fee at all.
    pub fn effective_gas_tip(&self, base_fee: &U256) -> Option<U256> {
        self.unsigned.gas_price.checked_sub(*base_fee)
    }
}

impl Encodable for SignedTransaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(8);
        s.append(&self.unsigned.nonce);
        s.append(&self.unsigned.gas_price);
        s.append(&self.unsigned.gas);
        s.append(&self.unsigned.action);
        s.append(&self.unsigned.value);
        s.append(&self.unsigned.data);
        s.append(&self.unsigned.tx_type);
        s.append(&self.sender);
    }
}

impl Decodable for SignedTransaction {
    fn decode(d: &Rlp) -> Result<Self, DecoderError> {
        if d.item_count()? != 8 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let hash = keccak(d.as_raw());
        Ok(SignedTransaction {
            unsigned: Transaction {
                nonce: d.val_at(0)?,
                gas_price: d.val_at(1)?,
                gas: d.val_at(2)?,
                action: d.val_at(3)?,
                value: d.val_at(4)?,
                data: d.val_at(5)?,
                tx_type: d.val_at(6)?,
            },
            sender: d.val_at(7)?,
            hash,
        })
    }
}

/// Derives transaction senders under the signing rules active at a given
/// block height. Recovery itself is performed once, at pool admission; the
/// signer hands back the cached sender and pins the epoch the rules were
/// checked against.
#[derive(Copy, Clone, Debug)]
pub struct Signer {
    epoch: u64,
}

impl Signer {
    pub fn new(number: u64) -> Self { Signer { epoch: number } }

    pub fn epoch(&self) -> u64 { self.epoch }

    pub fn sender(&self, tx: &SignedTransaction) -> Address { tx.sender() }
}

/// The inbound cross-context transactions available to a block, keyed by
/// hash. Persisted per block and consulted when selecting pending work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EtxSet {
    pub entries: HashMap<H256, Arc<SignedTransaction>>,
}

impl EtxSet {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, tx: Arc<SignedTransaction>) {
        self.entries.insert(tx.hash(), tx);
    }

    pub fn contains(&self, hash: &H256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl Encodable for EtxSet {
    fn rlp_append(&self, s: &mut RlpStream) {
        // Sort by hash so the encoding is canonical.
        let mut txs: Vec<&Arc<SignedTransaction>> =
            self.entries.values().collect();
        txs.sort_by_key(|tx| tx.hash());
        s.begin_list(txs.len());
        for tx in txs {
            s.append(tx.as_ref());
        }
    }
}

impl Decodable for EtxSet {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        let mut set = EtxSet::new();
        for tx in r.iter() {
            set.insert(Arc::new(tx.as_val()?));
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, EtxSet, Signer, Transaction, TxType};
    use rlp::Rlp;
    use std::sync::Arc;
    use trident_types::{Address, U256};

    fn transfer(nonce: u64, gas_price: u64) -> Transaction {
        Transaction {
            nonce: nonce.into(),
            gas_price: gas_price.into(),
            gas: 21000,
            action: Action::Call(Address::repeat_byte(9)),
            value: U256::from(1),
            data: vec![],
            tx_type: TxType::Internal,
        }
    }

    #[test]
    fn test_signed_round_trip() {
        let tx = transfer(3, 100).with_sender(Address::repeat_byte(2));
        let encoded = rlp::encode(&tx);
        let decoded: super::SignedTransaction =
            Rlp::new(&encoded).as_val().unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn test_effective_gas_tip() {
        let tx = transfer(0, 100).with_sender(Address::repeat_byte(2));
        assert_eq!(tx.effective_gas_tip(&30.into()), Some(70.into()));
        assert_eq!(tx.effective_gas_tip(&101.into()), None);
    }

    #[test]
    fn test_signer_returns_recovered_sender() {
        let sender = Address::repeat_byte(7);
        let tx = transfer(0, 10).with_sender(sender);
        assert_eq!(Signer::new(42).sender(&tx), sender);
    }

    #[test]
    fn test_etx_set_canonical_encoding() {
        let mut a = EtxSet::new();
        let mut b = EtxSet::new();
        let tx1 = Arc::new(transfer(0, 10).with_sender(Address::repeat_byte(1)));
        let tx2 = Arc::new(transfer(1, 20).with_sender(Address::repeat_byte(1)));
        a.insert(tx1.clone());
        a.insert(tx2.clone());
        b.insert(tx2);
        b.insert(tx1);
        assert_eq!(rlp::encode(&a), rlp::encode(&b));

        let decoded: EtxSet = Rlp::new(&rlp::encode(&a)[..]).as_val().unwrap();
        assert_eq!(decoded, a);
    }
}
