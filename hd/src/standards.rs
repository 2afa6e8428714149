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

//! Address standards produced by the derivation and their relation to
//! SLIP-132 key applications.

use core::str::FromStr;

use slip132::KeyApplication;

/// Type of address (scriptPubkey standard) a derived public key is encoded
/// into
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "snake_case")
)]
pub enum AddressType {
    /// P2PKH, BIP-44
    #[display("legacy")]
    Legacy,

    /// P2WPKH-in-P2SH, BIP-49
    #[display("segwit_wrapped")]
    SegwitWrapped,

    /// P2WPKH, BIP-84
    #[display("segwit_native")]
    SegwitNative,

    /// Key-path-only P2TR, BIP-86
    #[display("taproot")]
    Taproot,
}

impl AddressType {
    /// Detects address type from the bitcoin library address type. P2SH is
    /// always treated as wrapped segwit; P2WSH and other script-based types
    /// have no counterpart and return `None`.
    pub fn from_bitcoin_type(ty: bitcoin::AddressType) -> Option<AddressType> {
        match ty {
            bitcoin::AddressType::P2pkh => Some(AddressType::Legacy),
            bitcoin::AddressType::P2sh => Some(AddressType::SegwitWrapped),
            bitcoin::AddressType::P2wpkh => Some(AddressType::SegwitNative),
            bitcoin::AddressType::P2tr => Some(AddressType::Taproot),
            _ => None,
        }
    }
}

impl From<KeyApplication> for AddressType {
    fn from(application: KeyApplication) -> Self {
        match application {
            KeyApplication::Hashed => AddressType::Legacy,
            KeyApplication::Nested => AddressType::SegwitWrapped,
            KeyApplication::SegWit => AddressType::SegwitNative,
        }
    }
}

/// Unknown string representation of [`AddressType`] enum
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display("unknown address type `{0}`")]
pub struct UnknownAddressTypeError(pub String);

impl FromStr for AddressType {
    type Err = UnknownAddressTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "legacy" | "p2pkh" => AddressType::Legacy,
            "segwit_wrapped" | "p2sh-p2wpkh" => AddressType::SegwitWrapped,
            "segwit_native" | "p2wpkh" => AddressType::SegwitNative,
            "taproot" | "p2tr" => AddressType::Taproot,
            _ => return Err(UnknownAddressTypeError(s.to_owned())),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_applications() {
        assert_eq!(AddressType::from(KeyApplication::Hashed), AddressType::Legacy);
        assert_eq!(AddressType::from(KeyApplication::Nested), AddressType::SegwitWrapped);
        assert_eq!(AddressType::from(KeyApplication::SegWit), AddressType::SegwitNative);
    }

    #[test]
    fn names() {
        let types = [
            (AddressType::Legacy, bitcoin::AddressType::P2pkh),
            (AddressType::SegwitWrapped, bitcoin::AddressType::P2sh),
            (AddressType::SegwitNative, bitcoin::AddressType::P2wpkh),
            (AddressType::Taproot, bitcoin::AddressType::P2tr),
        ];
        for (ty, bitcoin_type) in types {
            assert_eq!(ty.to_string().parse::<AddressType>().unwrap(), ty);
            assert_eq!(AddressType::from_bitcoin_type(bitcoin_type), Some(ty));
        }
        assert_eq!(AddressType::from_bitcoin_type(bitcoin::AddressType::P2wsh), None);
        assert!("p2wsh".parse::<AddressType>().is_err());
    }
}
