// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::rawdb;
use keccak_hash::{keccak, KECCAK_EMPTY_LIST_RLP};
use kvdb::KeyValueDB;
use lazy_static::lazy_static;
use lru_time_cache::LruCache;
use parking_lot::Mutex;
use primitives::{BlockHeader, Body};
use rlp::RlpStream;
use trident_types::H256;

lazy_static! {
    /// Fingerprint of the all-empty body. Persisted in the key index only;
    /// the body itself is reconstructed on load.
    pub static ref EMPTY_BODY_FINGERPRINT: H256 = fingerprint_roots(
        &KECCAK_EMPTY_LIST_RLP,
        &KECCAK_EMPTY_LIST_RLP,
        &KECCAK_EMPTY_LIST_RLP,
    );
}

fn fingerprint_roots(
    uncle_hash: &H256, tx_root: &H256, etx_root: &H256,
) -> H256 {
    let mut stream = RlpStream::new_list(3);
    stream.append(uncle_hash).append(tx_root).append(etx_root);
    keccak(stream.out())
}

/// The cache key identifying a block body independently of header
/// metadata: a hash over all three body roots.
pub fn body_fingerprint(header: &BlockHeader) -> H256 {
    fingerprint_roots(
        header.uncle_hash(),
        header.tx_root(),
        header.etx_root(),
    )
}

/// Bounded cache from body fingerprint to block body, persisted across
/// restarts through the worker's key-value store.
pub struct PendingBodyCache {
    cache: Mutex<LruCache<H256, Body>>,
}

impl PendingBodyCache {
    pub fn new(capacity: usize) -> Self {
        PendingBodyCache {
            cache: Mutex::new(LruCache::with_capacity(capacity)),
        }
    }

    /// Store `body` under the header's fingerprint unless an entry already
    /// exists.
    pub fn add(&self, header: &BlockHeader, body: &Body) {
        let key = body_fingerprint(header);
        let mut cache = self.cache.lock();
        if cache.peek(&key).is_none() {
            cache.insert(key, body.clone());
        }
    }

    /// The body recorded for this header's fingerprint, refreshing its
    /// recency.
    pub fn get(&self, header: &BlockHeader) -> Option<Body> {
        self.cache.lock().get(&body_fingerprint(header)).cloned()
    }

    pub fn len(&self) -> usize { self.cache.lock().len() }

    pub fn is_empty(&self) -> bool { self.cache.lock().is_empty() }

    /// Rehydrate the cache from disk, deleting the persisted records so
    /// repeated restarts do not accumulate them.
    pub fn load_from_disk(&self, db: &dyn KeyValueDB) {
        let keys = rawdb::read_pb_body_keys(db);
        let mut cache = self.cache.lock();
        for key in keys {
            if key == *EMPTY_BODY_FINGERPRINT {
                if cache.peek(&key).is_none() {
                    cache.insert(key, Body::default());
                }
            } else if let Some(body) = rawdb::read_pb_cache_body(db, &key) {
                if cache.peek(&key).is_none() {
                    cache.insert(key, body);
                }
            }
            rawdb::delete_pb_cache_body(db, &key);
        }
        rawdb::delete_pb_body_keys(db);
    }

    /// Persist the cache: one blob per non-empty body plus the key index,
    /// enumerated in least-recently-used-first order.
    pub fn store_to_disk(&self, db: &dyn KeyValueDB) {
        let cache = self.cache.lock();
        let mut keys = Vec::with_capacity(cache.len());
        for (key, body) in cache.peek_iter() {
            keys.push(*key);
            if *key != *EMPTY_BODY_FINGERPRINT {
                rawdb::write_pb_cache_body(db, key, body);
            }
        }
        rawdb::write_pb_body_keys(db, &keys);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        body_fingerprint, PendingBodyCache, EMPTY_BODY_FINGERPRINT,
    };
    use crate::rawdb;
    use primitives::{
        Action, Block, BlockHeaderBuilder, Body, Transaction, TxType,
    };
    use std::sync::Arc;
    use trident_types::Address;

    fn body_with_tx(nonce: u64) -> (primitives::BlockHeader, Body) {
        let tx = Arc::new(
            Transaction {
                nonce: nonce.into(),
                gas_price: 100.into(),
                gas: 21000,
                action: Action::Call(Address::repeat_byte(1)),
                value: 0.into(),
                data: vec![],
                tx_type: TxType::Internal,
            }
            .with_sender(Address::repeat_byte(2)),
        );
        let block = Block::new(
            BlockHeaderBuilder::new().with_number(nonce).build(),
            vec![tx],
            vec![],
            vec![],
            vec![],
            &[],
        );
        (block.block_header.clone(), block.body())
    }

    #[test]
    fn test_empty_header_matches_empty_fingerprint() {
        let header = BlockHeaderBuilder::new().build();
        assert_eq!(body_fingerprint(&header), *EMPTY_BODY_FINGERPRINT);
    }

    #[test]
    fn test_add_and_get() {
        let cache = PendingBodyCache::new(16);
        let (header, body) = body_with_tx(0);
        assert!(cache.get(&header).is_none());
        cache.add(&header, &body);
        assert_eq!(cache.get(&header), Some(body.clone()));

        // adding again under the same fingerprint is a no-op
        cache.add(&header, &Body::default());
        assert_eq!(cache.get(&header), Some(body));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = PendingBodyCache::new(2);
        let (h0, b0) = body_with_tx(0);
        let (h1, b1) = body_with_tx(1);
        let (h2, b2) = body_with_tx(2);
        cache.add(&h0, &b0);
        cache.add(&h1, &b1);
        // refresh h0, then overflow: h1 is the eviction victim
        assert!(cache.get(&h0).is_some());
        cache.add(&h2, &b2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&h0).is_some());
        assert!(cache.get(&h1).is_none());
        assert!(cache.get(&h2).is_some());
    }

    #[test]
    fn test_disk_round_trip_empties_table() {
        let db = kvdb_memorydb::create(rawdb::NUM_COLUMNS);
        let cache = PendingBodyCache::new(16);
        let (h0, b0) = body_with_tx(0);
        let (h1, b1) = body_with_tx(1);
        let empty_header = BlockHeaderBuilder::new().build();
        cache.add(&h0, &b0);
        cache.add(&h1, &b1);
        cache.add(&empty_header, &Body::default());

        cache.store_to_disk(&db);
        assert_eq!(rawdb::read_pb_body_keys(&db).len(), 3);
        // the empty body is index-only
        assert!(
            rawdb::read_pb_cache_body(&db, &*EMPTY_BODY_FINGERPRINT).is_none()
        );

        let reloaded = PendingBodyCache::new(16);
        reloaded.load_from_disk(&db);
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get(&h0), Some(b0));
        assert_eq!(reloaded.get(&h1), Some(b1));
        assert_eq!(reloaded.get(&empty_header), Some(Body::default()));

        // successive restarts must not accumulate: the table is now empty
        assert!(rawdb::read_pb_body_keys(&db).is_empty());
        assert!(rawdb::read_pb_cache_body(&db, &body_fingerprint(&h0)).is_none());
    }
}
