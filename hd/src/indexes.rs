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

use std::cmp::Ordering;
use std::convert::TryFrom;
use std::str::FromStr;

use bitcoin::util::bip32::ChildNumber;

use crate::{DeriveError, PathParseError, HARDENED_INDEX_BOUNDARY};

/// Index for unhardened children derivation; ensures that the inner value
/// is always < 2^31
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", try_from = "u32", into = "u32")
)]
#[derive(
    Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Default, Display, From
)]
#[display(inner)]
pub struct UnhardenedIndex(
    #[from(u8)]
    #[from(u16)]
    u32,
);

impl PartialEq<u32> for UnhardenedIndex {
    fn eq(&self, other: &u32) -> bool { self.0 == *other }
}

impl PartialOrd<u32> for UnhardenedIndex {
    fn partial_cmp(&self, other: &u32) -> Option<Ordering> { self.0.partial_cmp(other) }
}

impl UnhardenedIndex {
    /// Constructs index equal to zero
    #[inline]
    pub fn zero() -> Self { UnhardenedIndex(0) }

    /// Constructs index equal to the maximum unhardened value, `2^31 - 1`
    #[inline]
    pub fn largest() -> Self { UnhardenedIndex(HARDENED_INDEX_BOUNDARY - 1) }

    /// Constructs index from a `u32` value, failing with
    /// [`DeriveError::DerivationOutOfRange`] if the value is not below
    /// [`HARDENED_INDEX_BOUNDARY`]
    pub fn from_index(index: u32) -> Result<Self, DeriveError> {
        if index >= HARDENED_INDEX_BOUNDARY {
            return Err(DeriveError::DerivationOutOfRange(index as u64));
        }
        Ok(UnhardenedIndex(index))
    }

    /// Returns numeric value of the index
    #[inline]
    pub fn index(self) -> u32 { self.0 }

    /// Adds `offset` to the index, returning `None` if the result does not fit
    /// unhardened range
    pub fn checked_add(self, offset: u32) -> Option<Self> {
        self.0
            .checked_add(offset)
            .filter(|index| *index < HARDENED_INDEX_BOUNDARY)
            .map(UnhardenedIndex)
    }

    /// Returns the next index, failing with
    /// [`DeriveError::DerivationOutOfRange`] if the current one is the largest
    pub fn next(self) -> Result<Self, DeriveError> {
        self.checked_add(1)
            .ok_or(DeriveError::DerivationOutOfRange(self.0 as u64 + 1))
    }

    /// BIP-32 child number used for derivation at this index
    #[inline]
    pub fn child_number(self) -> ChildNumber { ChildNumber::Normal { index: self.0 } }
}

impl TryFrom<u32> for UnhardenedIndex {
    type Error = DeriveError;

    #[inline]
    fn try_from(index: u32) -> Result<Self, Self::Error> { UnhardenedIndex::from_index(index) }
}

impl TryFrom<u64> for UnhardenedIndex {
    type Error = DeriveError;

    fn try_from(index: u64) -> Result<Self, Self::Error> {
        u32::try_from(index)
            .map_err(|_| DeriveError::DerivationOutOfRange(index))
            .and_then(UnhardenedIndex::from_index)
    }
}

impl From<UnhardenedIndex> for u32 {
    #[inline]
    fn from(index: UnhardenedIndex) -> Self { index.0 }
}

impl From<UnhardenedIndex> for ChildNumber {
    #[inline]
    fn from(index: UnhardenedIndex) -> Self { index.child_number() }
}

impl FromStr for UnhardenedIndex {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = u64::from_str(s).map_err(|_| PathParseError::InvalidIndex(s.to_owned()))?;
        Ok(UnhardenedIndex::try_from(index)?)
    }
}
