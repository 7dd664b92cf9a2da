// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    context::{Context, PRIME_POW_RATIO, REGION_POW_RATIO},
    Bytes,
};
use keccak_hash::{keccak, KECCAK_EMPTY_LIST_RLP, KECCAK_NULL_RLP};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::ops::{Deref, DerefMut};
use trident_types::{Address, H256, U256};

/// Raised when a header's sealed quality does not reach even its own
/// context's difficulty target, so no order can be assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("header quality below its difficulty target")]
pub struct HeaderOrderError;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHeaderRlpPart {
    /// Parent hash.
    parent_hash: H256,
    /// Block number, one above the parent.
    number: u64,
    /// Block timestamp in seconds.
    timestamp: u64,
    /// Fee recipient.
    coinbase: Address,
    /// Block difficulty in this context.
    difficulty: U256,
    /// Gas limit.
    gas_limit: u64,
    /// Gas consumed by the block's transactions.
    gas_used: u64,
    /// Base fee per gas for this block.
    base_fee: U256,
    /// Arbitrary sealer-supplied payload.
    extra: Bytes,
    /// Transactions root.
    tx_root: H256,
    /// Uncle list root.
    uncle_hash: H256,
    /// Emitted cross-context transactions root.
    etx_root: H256,
    /// Receipts root.
    receipts_root: H256,
    /// State root after execution.
    state_root: H256,
    /// Root of the sub-context block manifest.
    manifest_hash: H256,
    /// Root of the accumulated cross-context transaction rollup.
    etx_rollup_hash: H256,
    /// Total entropy of the chain up to the parent.
    parent_entropy: U256,
    /// Entropy accumulated since the last dominant coincidence.
    parent_delta_s: U256,
    /// Seal nonce.
    nonce: u64,
}

/// A block header.
#[derive(Clone, Debug, Eq)]
pub struct BlockHeader {
    rlp_part: BlockHeaderRlpPart,
    /// Hash of the header, cached after the first computation. Invalidated
    /// by every setter.
    hash: Option<H256>,
    /// Quality of the seal, recorded by PoW verification. Not part of the
    /// RLP representation.
    pub pow_quality: U256,
}

impl Deref for BlockHeader {
    type Target = BlockHeaderRlpPart;

    fn deref(&self) -> &Self::Target { &self.rlp_part }
}

impl DerefMut for BlockHeader {
    fn deref_mut(&mut self) -> &mut BlockHeaderRlpPart { &mut self.rlp_part }
}

impl PartialEq for BlockHeader {
    fn eq(&self, o: &BlockHeader) -> bool { self.rlp_part == o.rlp_part }
}

macro_rules! header_setter {
    ($setter:ident, $field:ident, $t:ty) => {
        pub fn $setter(&mut self, $field: $t) {
            self.rlp_part.$field = $field;
            self.hash = None;
        }
    };
}

impl BlockHeader {
    /// An all-default header with empty-list roots, the starting point of
    /// every sealing cycle.
    pub fn empty() -> Self { BlockHeaderBuilder::new().build() }

    /// Get the parent_hash field of the header.
    pub fn parent_hash(&self) -> &H256 { &self.parent_hash }

    /// Get the block number.
    pub fn number(&self) -> u64 { self.number }

    /// Get the timestamp field of the header.
    pub fn timestamp(&self) -> u64 { self.timestamp }

    /// Get the coinbase field of the header.
    pub fn coinbase(&self) -> &Address { &self.coinbase }

    /// Get the difficulty field of the header.
    pub fn difficulty(&self) -> &U256 { &self.difficulty }

    /// Get the gas limit field of the header.
    pub fn gas_limit(&self) -> u64 { self.gas_limit }

    /// Get the gas used field of the header.
    pub fn gas_used(&self) -> u64 { self.gas_used }

    /// Get the base fee field of the header.
    pub fn base_fee(&self) -> &U256 { &self.base_fee }

    /// Get the extra data field of the header.
    pub fn extra(&self) -> &Bytes { &self.extra }

    /// Get the transactions root field of the header.
    pub fn tx_root(&self) -> &H256 { &self.tx_root }

    /// Get the uncle list root field of the header.
    pub fn uncle_hash(&self) -> &H256 { &self.uncle_hash }

    /// Get the emitted cross-context transactions root of the header.
    pub fn etx_root(&self) -> &H256 { &self.etx_root }

    /// Get the receipts root field of the header.
    pub fn receipts_root(&self) -> &H256 { &self.receipts_root }

    /// Get the state root field of the header.
    pub fn state_root(&self) -> &H256 { &self.state_root }

    /// Get the manifest root field of the header.
    pub fn manifest_hash(&self) -> &H256 { &self.manifest_hash }

    /// Get the cross-context rollup root field of the header.
    pub fn etx_rollup_hash(&self) -> &H256 { &self.etx_rollup_hash }

    /// Get the parent total entropy field of the header.
    pub fn parent_entropy(&self) -> &U256 { &self.parent_entropy }

    /// Get the parent delta-S field of the header.
    pub fn parent_delta_s(&self) -> &U256 { &self.parent_delta_s }

    /// Get the nonce field of the header.
    pub fn nonce(&self) -> u64 { self.nonce }

    header_setter!(set_parent_hash, parent_hash, H256);

    header_setter!(set_number, number, u64);

    header_setter!(set_timestamp, timestamp, u64);

    header_setter!(set_coinbase, coinbase, Address);

    header_setter!(set_difficulty, difficulty, U256);

    header_setter!(set_gas_limit, gas_limit, u64);

    header_setter!(set_gas_used, gas_used, u64);

    header_setter!(set_base_fee, base_fee, U256);

    header_setter!(set_extra, extra, Bytes);

    header_setter!(set_tx_root, tx_root, H256);

    header_setter!(set_uncle_hash, uncle_hash, H256);

    header_setter!(set_etx_root, etx_root, H256);

    header_setter!(set_receipts_root, receipts_root, H256);

    header_setter!(set_state_root, state_root, H256);

    header_setter!(set_manifest_hash, manifest_hash, H256);

    header_setter!(set_etx_rollup_hash, etx_rollup_hash, H256);

    header_setter!(set_parent_entropy, parent_entropy, U256);

    header_setter!(set_parent_delta_s, parent_delta_s, U256);

    header_setter!(set_nonce, nonce, u64);

    /// Compute the hash of the header and cache it.
    pub fn compute_hash(&mut self) -> H256 {
        let hash = self.hash();
        self.hash = Some(hash);
        hash
    }

    /// Get the hash of the header.
    pub fn hash(&self) -> H256 {
        self.hash.unwrap_or_else(|| keccak(self.rlp()))
    }

    /// Total entropy of the chain including this header.
    pub fn calc_s(&self) -> U256 { self.parent_entropy + self.difficulty }

    /// Entropy accumulated since the last dominant coincidence, including
    /// this header.
    pub fn calc_delta_s(&self) -> U256 { self.parent_delta_s + self.difficulty }

    /// The most dominant context whose difficulty target this header's seal
    /// satisfies. Fails for a header that does not even reach its own
    /// context's target (e.g. an unsealed draft).
    pub fn calc_order(&self) -> Result<Context, HeaderOrderError> {
        if self.difficulty.is_zero() || self.pow_quality < self.difficulty {
            return Err(HeaderOrderError);
        }
        if self.pow_quality >= self.difficulty * PRIME_POW_RATIO {
            Ok(Context::Prime)
        } else if self.pow_quality >= self.difficulty * REGION_POW_RATIO {
            Ok(Context::Region)
        } else {
            Ok(Context::Zone)
        }
    }

    /// Get the RLP representation of this header.
    pub fn rlp(&self) -> Bytes {
        let mut stream = RlpStream::new();
        self.stream_rlp(&mut stream);
        stream.out().to_vec()
    }

    /// Place this header into an RLP stream `stream`.
    fn stream_rlp(&self, stream: &mut RlpStream) {
        stream
            .begin_list(19)
            .append(&self.parent_hash)
            .append(&self.number)
            .append(&self.timestamp)
            .append(&self.coinbase)
            .append(&self.difficulty)
            .append(&self.gas_limit)
            .append(&self.gas_used)
            .append(&self.base_fee)
            .append(&self.extra)
            .append(&self.tx_root)
            .append(&self.uncle_hash)
            .append(&self.etx_root)
            .append(&self.receipts_root)
            .append(&self.state_root)
            .append(&self.manifest_hash)
            .append(&self.etx_rollup_hash)
            .append(&self.parent_entropy)
            .append(&self.parent_delta_s)
            .append(&self.nonce);
    }
}

pub struct BlockHeaderBuilder {
    parent_hash: H256,
    number: u64,
    timestamp: u64,
    coinbase: Address,
    difficulty: U256,
    gas_limit: u64,
    gas_used: u64,
    base_fee: U256,
    extra: Bytes,
    state_root: H256,
    parent_entropy: U256,
    parent_delta_s: U256,
    pow_quality: U256,
    nonce: u64,
}

impl BlockHeaderBuilder {
    pub fn new() -> Self {
        Self {
            parent_hash: H256::default(),
            number: 0,
            timestamp: 0,
            coinbase: Address::default(),
            difficulty: U256::default(),
            gas_limit: 0,
            gas_used: 0,
            base_fee: U256::zero(),
            extra: Bytes::new(),
            state_root: KECCAK_NULL_RLP,
            parent_entropy: U256::zero(),
            parent_delta_s: U256::zero(),
            pow_quality: U256::zero(),
            nonce: 0,
        }
    }

    pub fn with_parent_hash(&mut self, parent_hash: H256) -> &mut Self {
        self.parent_hash = parent_hash;
        self
    }

    pub fn with_number(&mut self, number: u64) -> &mut Self {
        self.number = number;
        self
    }

    pub fn with_timestamp(&mut self, timestamp: u64) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_coinbase(&mut self, coinbase: Address) -> &mut Self {
        self.coinbase = coinbase;
        self
    }

    pub fn with_difficulty(&mut self, difficulty: U256) -> &mut Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_gas_limit(&mut self, gas_limit: u64) -> &mut Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_gas_used(&mut self, gas_used: u64) -> &mut Self {
        self.gas_used = gas_used;
        self
    }

    pub fn with_base_fee(&mut self, base_fee: U256) -> &mut Self {
        self.base_fee = base_fee;
        self
    }

    pub fn with_extra(&mut self, extra: Bytes) -> &mut Self {
        self.extra = extra;
        self
    }

    pub fn with_state_root(&mut self, state_root: H256) -> &mut Self {
        self.state_root = state_root;
        self
    }

    pub fn with_parent_entropy(&mut self, parent_entropy: U256) -> &mut Self {
        self.parent_entropy = parent_entropy;
        self
    }

    pub fn with_parent_delta_s(&mut self, parent_delta_s: U256) -> &mut Self {
        self.parent_delta_s = parent_delta_s;
        self
    }

    pub fn with_pow_quality(&mut self, pow_quality: U256) -> &mut Self {
        self.pow_quality = pow_quality;
        self
    }

    pub fn with_nonce(&mut self, nonce: u64) -> &mut Self {
        self.nonce = nonce;
        self
    }

    pub fn build(&self) -> BlockHeader {
        BlockHeader {
            rlp_part: BlockHeaderRlpPart {
                parent_hash: self.parent_hash,
                number: self.number,
                timestamp: self.timestamp,
                coinbase: self.coinbase,
                difficulty: self.difficulty,
                gas_limit: self.gas_limit,
                gas_used: self.gas_used,
                base_fee: self.base_fee,
                extra: self.extra.clone(),
                tx_root: KECCAK_EMPTY_LIST_RLP,
                uncle_hash: KECCAK_EMPTY_LIST_RLP,
                etx_root: KECCAK_EMPTY_LIST_RLP,
                receipts_root: KECCAK_EMPTY_LIST_RLP,
                state_root: self.state_root,
                manifest_hash: KECCAK_EMPTY_LIST_RLP,
                etx_rollup_hash: KECCAK_EMPTY_LIST_RLP,
                parent_entropy: self.parent_entropy,
                parent_delta_s: self.parent_delta_s,
                nonce: self.nonce,
            },
            hash: None,
            pow_quality: self.pow_quality,
        }
    }
}

impl Encodable for BlockHeader {
    fn rlp_append(&self, stream: &mut RlpStream) { self.stream_rlp(stream); }
}

impl Decodable for BlockHeader {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        if r.item_count()? != 19 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let mut header = BlockHeader {
            rlp_part: BlockHeaderRlpPart {
                parent_hash: r.val_at(0)?,
                number: r.val_at(1)?,
                timestamp: r.val_at(2)?,
                coinbase: r.val_at(3)?,
                difficulty: r.val_at(4)?,
                gas_limit: r.val_at(5)?,
                gas_used: r.val_at(6)?,
                base_fee: r.val_at(7)?,
                extra: r.val_at(8)?,
                tx_root: r.val_at(9)?,
                uncle_hash: r.val_at(10)?,
                etx_root: r.val_at(11)?,
                receipts_root: r.val_at(12)?,
                state_root: r.val_at(13)?,
                manifest_hash: r.val_at(14)?,
                etx_rollup_hash: r.val_at(15)?,
                parent_entropy: r.val_at(16)?,
                parent_delta_s: r.val_at(17)?,
                nonce: r.val_at(18)?,
            },
            hash: None,
            pow_quality: U256::zero(),
        };
        header.compute_hash();

        Ok(header)
    }
}
