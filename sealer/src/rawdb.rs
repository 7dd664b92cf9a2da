// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! Schema helpers for the worker's slice of the key-value store: the
//! pending-body table (keys index plus per-fingerprint blobs) and the
//! per-block inbound etx sets.

use kvdb::KeyValueDB;
use log::warn;
use primitives::{Body, EtxSet};
use rlp::{Rlp, RlpStream};
use trident_types::H256;

/// Column carrying all worker records.
pub const COL_WORKER: u32 = 0;
/// Number of columns the worker database is opened with.
pub const NUM_COLUMNS: u32 = 1;

const PB_BODY_KEYS_KEY: &[u8] = b"PbBodyKeys";
const PB_BODY_PREFIX: u8 = b'b';
const ETX_SET_PREFIX: u8 = b'e';

fn pb_body_key(fingerprint: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(PB_BODY_PREFIX);
    key.extend_from_slice(fingerprint.as_bytes());
    key
}

fn etx_set_key(hash: &H256, number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(41);
    key.push(ETX_SET_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key.extend_from_slice(&number.to_be_bytes());
    key
}

fn read_raw(db: &dyn KeyValueDB, key: &[u8]) -> Option<Vec<u8>> {
    match db.get(COL_WORKER, key) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed reading worker db key {:?}: {}", key, e);
            None
        }
    }
}

fn write_raw(db: &dyn KeyValueDB, key: &[u8], value: &[u8]) {
    let mut tx = db.transaction();
    tx.put(COL_WORKER, key, value);
    if let Err(e) = db.write(tx) {
        warn!("Failed writing worker db key {:?}: {}", key, e);
    }
}

fn delete_raw(db: &dyn KeyValueDB, key: &[u8]) {
    let mut tx = db.transaction();
    tx.delete(COL_WORKER, key);
    if let Err(e) = db.write(tx) {
        warn!("Failed deleting worker db key {:?}: {}", key, e);
    }
}

/// The persisted index of pending-body fingerprints, empty when absent or
/// corrupt.
pub fn read_pb_body_keys(db: &dyn KeyValueDB) -> Vec<H256> {
    let raw = match read_raw(db, PB_BODY_KEYS_KEY) {
        Some(raw) => raw,
        None => return Vec::new(),
    };
    match Rlp::new(&raw).as_list() {
        Ok(keys) => keys,
        Err(e) => {
            warn!("Corrupt pending body key index: {}", e);
            Vec::new()
        }
    }
}

pub fn write_pb_body_keys(db: &dyn KeyValueDB, keys: &[H256]) {
    let mut stream = RlpStream::new_list(keys.len());
    for key in keys {
        stream.append(key);
    }
    write_raw(db, PB_BODY_KEYS_KEY, &stream.out());
}

pub fn delete_pb_body_keys(db: &dyn KeyValueDB) {
    delete_raw(db, PB_BODY_KEYS_KEY);
}

pub fn read_pb_cache_body(
    db: &dyn KeyValueDB, fingerprint: &H256,
) -> Option<Body> {
    let raw = read_raw(db, &pb_body_key(fingerprint))?;
    match Rlp::new(&raw).as_val() {
        Ok(body) => Some(body),
        Err(e) => {
            warn!(
                "Corrupt pending body for fingerprint {:?}: {}",
                fingerprint, e
            );
            None
        }
    }
}

pub fn write_pb_cache_body(
    db: &dyn KeyValueDB, fingerprint: &H256, body: &Body,
) {
    write_raw(db, &pb_body_key(fingerprint), &rlp::encode(body));
}

pub fn delete_pb_cache_body(db: &dyn KeyValueDB, fingerprint: &H256) {
    delete_raw(db, &pb_body_key(fingerprint));
}

/// The inbound cross-context transaction set recorded for a block, or
/// `None` when it has not been stored yet.
pub fn read_etx_set(
    db: &dyn KeyValueDB, hash: &H256, number: u64,
) -> Option<EtxSet> {
    let raw = read_raw(db, &etx_set_key(hash, number))?;
    match Rlp::new(&raw).as_val() {
        Ok(set) => Some(set),
        Err(e) => {
            warn!("Corrupt etx set for block {:?}: {}", hash, e);
            None
        }
    }
}

pub fn write_etx_set(
    db: &dyn KeyValueDB, hash: &H256, number: u64, etx_set: &EtxSet,
) {
    write_raw(db, &etx_set_key(hash, number), &rlp::encode(etx_set));
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::{Action, Body, EtxSet, Transaction, TxType};
    use std::sync::Arc;
    use trident_types::Address;

    fn memory_db() -> Box<dyn KeyValueDB> {
        Box::new(kvdb_memorydb::create(NUM_COLUMNS))
    }

    #[test]
    fn test_body_keys_round_trip() {
        let db = memory_db();
        assert!(read_pb_body_keys(&*db).is_empty());

        let keys = vec![H256::repeat_byte(1), H256::repeat_byte(2)];
        write_pb_body_keys(&*db, &keys);
        assert_eq!(read_pb_body_keys(&*db), keys);

        delete_pb_body_keys(&*db);
        assert!(read_pb_body_keys(&*db).is_empty());
    }

    #[test]
    fn test_body_round_trip() {
        let db = memory_db();
        let fingerprint = H256::repeat_byte(7);
        assert!(read_pb_cache_body(&*db, &fingerprint).is_none());

        let body = Body {
            transactions: vec![Arc::new(
                Transaction {
                    nonce: 0.into(),
                    gas_price: 10.into(),
                    gas: 21000,
                    action: Action::Call(Address::repeat_byte(3)),
                    value: 5.into(),
                    data: vec![],
                    tx_type: TxType::Internal,
                }
                .with_sender(Address::repeat_byte(4)),
            )],
            ..Default::default()
        };
        write_pb_cache_body(&*db, &fingerprint, &body);
        assert_eq!(read_pb_cache_body(&*db, &fingerprint), Some(body));

        delete_pb_cache_body(&*db, &fingerprint);
        assert!(read_pb_cache_body(&*db, &fingerprint).is_none());
    }

    #[test]
    fn test_etx_set_round_trip() {
        let db = memory_db();
        let hash = H256::repeat_byte(9);
        assert!(read_etx_set(&*db, &hash, 12).is_none());

        write_etx_set(&*db, &hash, 12, &EtxSet::new());
        assert_eq!(read_etx_set(&*db, &hash, 12), Some(EtxSet::new()));
        // a different number misses
        assert!(read_etx_set(&*db, &hash, 13).is_none());
    }
}
