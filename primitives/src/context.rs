// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use serde::{Deserialize, Serialize};
use std::fmt;

/// The hierarchy level a node operates in. Contexts are totally ordered from
/// the most dominant (`Prime`) to the least (`Zone`); only `Zone` executes
/// transactions and holds state.
#[repr(u8)]
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub enum Context {
    Prime = 0,
    Region = 1,
    Zone = 2,
}

/// A block whose sealed quality exceeds `REGION_POW_RATIO` times its own
/// difficulty also satisfies the region target; `PRIME_POW_RATIO` likewise
/// for prime. These ratios define coincidence between contexts.
pub const REGION_POW_RATIO: u64 = 16;
pub const PRIME_POW_RATIO: u64 = 256;

impl Context {
    pub fn is_zone(self) -> bool { self == Context::Zone }

    pub fn is_prime(self) -> bool { self == Context::Prime }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Context::Prime => write!(f, "prime"),
            Context::Region => write!(f, "region"),
            Context::Zone => write!(f, "zone"),
        }
    }
}
