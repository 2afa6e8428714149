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

//! Validation of bitcoin addresses and detection of the kind of user-provided
//! strings.

use core::str::FromStr;

use bitcoin::util::address;
use bitcoin::{Address, Network};
use hd::{AddressType, PublicNetwork};
use slip132::KeyPrefix;

/// Kind of the string provided by a user, detected from its leading
/// characters only
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum InputKind {
    /// SLIP-132 extended public key
    #[display("extended key")]
    ExtendedKey,

    /// Bitcoin address
    #[display("address")]
    Address,
}

/// Guesses whether `input` is an extended key or an address. The check looks
/// at prefixes only and does not guarantee that the input is valid; use
/// [`slip132::validate_extended_key`] or [`validate_address`] for that.
pub fn detect_kind(input: &str) -> Option<InputKind> {
    let input = input.trim();
    if KeyPrefix::detect(input).is_some() {
        return Some(InputKind::ExtendedKey);
    }
    let lowercase = input.to_lowercase();
    if ["bc1", "tb1", "bcrt1"]
        .iter()
        .any(|hrp| lowercase.starts_with(hrp))
    {
        return Some(InputKind::Address);
    }
    match input.chars().next() {
        Some('1' | '3' | 'm' | 'n' | '2') => Some(InputKind::Address),
        _ => None,
    }
}

/// Returns the form under which the ledger stores `address`: trimmed, with an
/// all-uppercase bech32 address converted to lowercase. Base58 addresses and
/// mixed-case bech32 strings are returned trimmed only.
pub fn canonical_address(address: &str) -> String {
    let address = address.trim();
    let lowercase = address.to_lowercase();
    let bech32 = ["bc1", "tb1", "bcrt1"]
        .iter()
        .any(|hrp| lowercase.starts_with(hrp));
    if bech32 && address == address.to_uppercase() {
        lowercase
    } else {
        address.to_owned()
    }
}

/// Address validation errors
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum AddressError {
    /// invalid address encoding: {0}
    #[from]
    Encoding(address::Error),

    /// address belongs to {actual} network while {expected} address was
    /// expected
    WrongNetwork {
        /// network the address was validated against
        expected: PublicNetwork,
        /// network encoded in the address
        actual: Network,
    },

    /// address `{0}` has a type which is not supported by the ledger
    UnsupportedType(String),
}

/// Information about a validated address
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AddressInfo {
    /// Parsed address; its string form is the canonical encoding
    pub address: Address,

    /// Network the address belongs to
    pub network: PublicNetwork,

    /// Standard of the address
    pub address_type: AddressType,
}

/// Validates address string against the given network.
///
/// Base58 addresses must pass their checksum; bech32 addresses must use the
/// checksum variant matching their witness version (bech32 for v0, bech32m
/// for v1+). P2SH addresses are reported as [`AddressType::SegwitWrapped`],
/// since this is the only kind of P2SH the ledger produces. P2WSH and
/// non-standard witness programs are rejected.
pub fn validate_address(address: &str, network: PublicNetwork) -> Result<AddressInfo, AddressError> {
    let parsed = Address::from_str(address.trim())?;
    if parsed.network != Network::from(network) {
        return Err(AddressError::WrongNetwork {
            expected: network,
            actual: parsed.network,
        });
    }
    let address_type = parsed
        .address_type()
        .and_then(AddressType::from_bitcoin_type)
        .ok_or_else(|| AddressError::UnsupportedType(address.trim().to_owned()))?;
    Ok(AddressInfo {
        address: parsed,
        network,
        address_type,
    })
}
