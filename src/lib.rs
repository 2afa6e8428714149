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

//! Watch-only address ledger: derives receiving and change addresses from a
//! single extended public key, caches them in a pluggable [`AddressStore`]
//! and discovers the next unused address within the gap limit.

// Coding conventions
#![recursion_limit = "256"]
#![warn(missing_docs)]

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;
#[macro_use]
extern crate tracing;

pub extern crate bitcoin_hd as hd;
pub extern crate slip132;

pub mod address;
mod cache;
mod ledger;
mod prederive;
mod scanner;
pub mod store;
mod usage;

pub use address::{canonical_address, detect_kind, validate_address, AddressError, AddressInfo, InputKind};
pub use cache::ResolvedAddress;
pub use hd::{
    AddressPath, AddressType, Chain, DeriveAddress, DeriveError, DerivedAddressView,
    PublicNetwork, UnhardenedIndex,
};
pub use ledger::{AddressLedger, Error, LedgerConfig};
pub use slip132::{validate_extended_key, ExtendedKeyInfo, KeyPrefix};
#[cfg(feature = "file-store")]
pub use store::FileStore;
pub use store::{
    AddressFilter, AddressStore, DerivedAddress, IndexOrder, MemoryStore, StoreError,
    UpsertOutcome, WalletId,
};
