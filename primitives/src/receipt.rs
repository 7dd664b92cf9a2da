// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{log_entry::LogEntry, transaction::SignedTransaction};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use trident_types::Bloom;

pub const TRANSACTION_OUTCOME_SUCCESS: u8 = 1;
pub const TRANSACTION_OUTCOME_FAILURE: u8 = 0;

/// Information describing execution of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction outcome.
    pub outcome_status: u8,
    /// The total gas used in the block following execution of the
    /// transaction.
    pub cumulative_gas_used: u64,
    /// The gas used by this transaction alone.
    pub gas_used: u64,
    /// The OR-wide combination of all logs' blooms for this transaction.
    pub log_bloom: Bloom,
    /// The logs stemming from this transaction.
    pub logs: Vec<LogEntry>,
    /// Cross-context transactions emitted by this transaction. Only
    /// successful receipts carry any.
    pub etxs: Vec<SignedTransaction>,
}

impl Receipt {
    pub fn new(
        outcome: u8, cumulative_gas_used: u64, gas_used: u64,
        logs: Vec<LogEntry>, etxs: Vec<SignedTransaction>,
    ) -> Self {
        Self {
            outcome_status: outcome,
            cumulative_gas_used,
            gas_used,
            log_bloom: logs.iter().fold(Bloom::default(), |mut b, l| {
                b.accrue_bloom(&l.bloom());
                b
            }),
            logs,
            etxs,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.outcome_status == TRANSACTION_OUTCOME_SUCCESS
    }
}

impl Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.outcome_status);
        s.append(&self.cumulative_gas_used);
        s.append(&self.gas_used);
        s.append(&self.log_bloom);
        s.append_list(&self.logs);
        s.append_list(&self.etxs);
    }
}

impl Decodable for Receipt {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }

        Ok(Receipt {
            outcome_status: rlp.val_at(0)?,
            cumulative_gas_used: rlp.val_at(1)?,
            gas_used: rlp.val_at(2)?,
            log_bloom: rlp.val_at(3)?,
            logs: rlp.list_at(4)?,
            etxs: rlp.list_at(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Receipt, TRANSACTION_OUTCOME_SUCCESS};
    use crate::log_entry::LogEntry;
    use rlp::Rlp;
    use trident_types::Address;

    #[test]
    fn test_bloom_derived_from_logs() {
        let log = LogEntry {
            address: Address::repeat_byte(5),
            topics: vec![],
            data: vec![],
        };
        let receipt = Receipt::new(
            TRANSACTION_OUTCOME_SUCCESS,
            21000,
            21000,
            vec![log.clone()],
            vec![],
        );
        assert_eq!(receipt.log_bloom, log.bloom());
        assert!(receipt.is_successful());
    }

    #[test]
    fn test_rlp_round_trip() {
        let receipt =
            Receipt::new(TRANSACTION_OUTCOME_SUCCESS, 42000, 21000, vec![], vec![]);
        let encoded = rlp::encode(&receipt);
        let decoded: Receipt = Rlp::new(&encoded).as_val().unwrap();
        assert_eq!(decoded, receipt);
    }
}
