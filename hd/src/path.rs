// Wallet-level libraries for bitcoin protocol by LNP/BP Association
//
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// This software is distributed without any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::convert::TryFrom;

use bitcoin::util::bip32::{ChildNumber, DerivationPath};

use crate::{DeriveError, UnhardenedIndex};

/// Errors parsing chain and derivation path representations
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PathParseError {
    /// derivation path `{0}` must have form of `m/<chain>/<index>`
    InvalidFormat(String),

    /// invalid chain `{0}`; it must be either `0` (receiving) or `1` (change)
    InvalidChain(String),

    /// invalid address index `{0}`
    InvalidIndex(String),

    /// {0}
    #[from]
    OutOfRange(DeriveError),
}

/// Branch of the account key used for addresses: external (receiving) or
/// internal (change) chain
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", try_from = "u8", into = "u8")
)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum Chain {
    /// External chain, `0`
    #[display("receiving")]
    Receiving = 0,

    /// Internal chain, `1`
    #[display("change")]
    Change = 1,
}

impl Chain {
    /// Numeric index of the chain used in the derivation path
    #[inline]
    pub fn index(self) -> u8 { self as u8 }

    /// BIP-32 child number used for derivation of the chain key
    #[inline]
    pub fn child_number(self) -> ChildNumber {
        ChildNumber::Normal {
            index: self.index() as u32,
        }
    }
}

impl TryFrom<u8> for Chain {
    type Error = PathParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Chain::Receiving),
            1 => Ok(Chain::Change),
            other => Err(PathParseError::InvalidChain(other.to_string())),
        }
    }
}

impl From<Chain> for u8 {
    #[inline]
    fn from(chain: Chain) -> Self { chain.index() }
}

impl FromStr for Chain {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "receiving" | "external" => Ok(Chain::Receiving),
            "1" | "change" | "internal" => Ok(Chain::Change),
            _ => Err(PathParseError::InvalidChain(s.to_owned())),
        }
    }
}

/// Derivation path of an address relative to the account-level extended
/// public key, `m/<chain>/<index>`
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct AddressPath {
    /// Receiving or change chain
    pub chain: Chain,

    /// Index of the address within the chain
    pub index: UnhardenedIndex,
}

impl AddressPath {
    /// Constructs path from its components
    #[inline]
    pub fn new(chain: Chain, index: UnhardenedIndex) -> AddressPath { AddressPath { chain, index } }

    /// Converts into the BIP-32 derivation path
    pub fn to_derivation_path(&self) -> DerivationPath {
        DerivationPath::from(vec![self.chain.child_number(), self.index.child_number()])
    }
}

impl Display for AddressPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "m/{}/{}", self.chain.index(), self.index)
    }
}

impl FromStr for AddressPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split('/');
        match (split.next(), split.next(), split.next(), split.next()) {
            (Some("m"), Some(chain), Some(index), None) => {
                let chain = match chain {
                    "0" => Chain::Receiving,
                    "1" => Chain::Change,
                    _ => return Err(PathParseError::InvalidChain(chain.to_owned())),
                };
                Ok(AddressPath::new(chain, UnhardenedIndex::from_str(index)?))
            }
            _ => Err(PathParseError::InvalidFormat(s.to_owned())),
        }
    }
}

impl From<AddressPath> for DerivationPath {
    fn from(path: AddressPath) -> Self { path.to_derivation_path() }
}
