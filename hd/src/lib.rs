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

//! Library deriving receiving and change addresses from extended public
//! keys using non-hardened BIP-32 derivation.
//!
//! Only public derivation is supported: the library never sees private keys.

// Coding conventions
#![recursion_limit = "256"]
#![warn(missing_docs)]

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod derive;
mod indexes;
mod network;
mod path;
pub mod standards;

pub use derive::{DeriveAddress, DeriveError, DerivedAddressView};
pub use indexes::UnhardenedIndex;
pub use network::{PublicNetwork, UnknownNetworkError};
pub use path::{AddressPath, Chain, PathParseError};
pub use standards::{AddressType, UnknownAddressTypeError};

/// Constant determining BIP32 boundary for u32 values after which index
/// is treated as hardened
pub const HARDENED_INDEX_BOUNDARY: u32 = 1 << 31;
