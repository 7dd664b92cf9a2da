// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

pub use ethereum_types::{
    Address, BigEndianHash, Bloom, BloomInput, H128, H160, H256, H512, H64,
    U128, U256, U512, U64,
};

/// The all-zero address. A worker refuses to seal while its coinbase still
/// holds this value.
pub const ZERO_ADDRESS: Address = H160([0x00; 20]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address_is_default() {
        assert_eq!(ZERO_ADDRESS, Address::default());
    }
}
