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

//! SLIP-132 extended public key validation.
//!
//! Recognizes single-signature extended public keys in the `xpub`, `ypub`,
//! `zpub` formats and their testnet counterparts `tpub`, `upub`, `vpub`.
//! Private keys and multi-signature (`Ypub`/`Zpub`) versions are rejected.

// Coding conventions
#![recursion_limit = "256"]
#![warn(missing_docs)]

#[macro_use]
extern crate amplify;

use bitcoin::util::base58;
use bitcoin::util::bip32::{self, ChildNumber, ExtendedPubKey, Fingerprint};
use bitcoin::Network;

/// Magical version bytes for xpub: bitcoin mainnet public key for P2PKH
pub const VERSION_MAGIC_XPUB: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
/// Magical version bytes for ypub: bitcoin mainnet public key for P2WPKH in
/// P2SH
pub const VERSION_MAGIC_YPUB: [u8; 4] = [0x04, 0x9D, 0x7C, 0xB2];
/// Magical version bytes for zpub: bitcoin mainnet public key for P2WPKH
pub const VERSION_MAGIC_ZPUB: [u8; 4] = [0x04, 0xB2, 0x47, 0x46];
/// Magical version bytes for tpub: bitcoin testnet public key for P2PKH
pub const VERSION_MAGIC_TPUB: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];
/// Magical version bytes for upub: bitcoin testnet public key for P2WPKH in
/// P2SH
pub const VERSION_MAGIC_UPUB: [u8; 4] = [0x04, 0x4A, 0x52, 0x62];
/// Magical version bytes for vpub: bitcoin testnet public key for P2WPKH
pub const VERSION_MAGIC_VPUB: [u8; 4] = [0x04, 0x5F, 0x1C, 0xF6];

/// Length of the binary extended key payload (before base58check encoding)
pub const EXTENDED_KEY_LEN: usize = 78;

/// Extended public key validation errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// invalid base58check encoding of the extended key: {0}
    #[from]
    Base58(base58::Error),

    /// unrecognized or unsupported extended key prefix; only xpub, ypub, zpub,
    /// tpub, upub and vpub keys are accepted
    UnknownSlip132Prefix,

    /// encoded extended key data has wrong length {0} (must be 78 bytes)
    WrongExtendedKeyLength(usize),

    /// extended key version bytes do not match its textual prefix
    VersionMismatch([u8; 4]),

    /// extended key does not contain a valid secp256k1 public key
    InvalidPublicKey,

    /// extended key payload is malformed
    MalformedPayload,
}

impl From<bip32::Error> for Error {
    fn from(err: bip32::Error) -> Self {
        match err {
            bip32::Error::Base58(err) => Error::Base58(err),
            bip32::Error::WrongExtendedKeyLength(len) => Error::WrongExtendedKeyLength(len),
            bip32::Error::UnknownVersion(ver) => Error::VersionMismatch(ver),
            bip32::Error::Secp256k1(_) => Error::InvalidPublicKey,
            _ => Error::MalformedPayload,
        }
    }
}

/// Structure holding 4 version bytes with magical numbers representing
/// different versions of extended public keys according to BIP-32 and
/// SLIP-132. The bytes are stored without any interpretation; use
/// [`KeyPrefix::from_version`] to resolve them.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct KeyVersion([u8; 4]);

impl KeyVersion {
    /// Tries to construct [`KeyVersion`] object from a byte slice. If byte
    /// slice length is not equal to 4, returns `None`
    pub fn from_slice(version_slice: &[u8]) -> Option<KeyVersion> {
        if version_slice.len() != 4 {
            return None;
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(version_slice);
        Some(KeyVersion(bytes))
    }

    /// Returns slice representing internal version bytes
    pub fn as_slice(&self) -> &[u8] { &self.0 }

    /// Returns internal representation of version bytes
    pub fn as_bytes(&self) -> &[u8; 4] { &self.0 }

    /// Converts into 4-byte array containing version byte values
    pub fn into_bytes(self) -> [u8; 4] { self.0 }
}

/// SLIP 132-defined key applications defining types of scriptPubkey
/// descriptors in which the key is used
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum KeyApplication {
    /// xpub/tpub: keys used for P2PKH scriptPubkey descriptors
    #[display("BIP44")]
    Hashed,

    /// ypub/upub: keys used for P2WPKH-in-P2SH scriptPubkey descriptors
    #[display("BIP49")]
    Nested,

    /// zpub/vpub: keys used for P2WPKH scriptPubkey descriptors
    #[display("BIP84")]
    SegWit,
}

/// Textual prefix of a base58check-encoded extended public key.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum KeyPrefix {
    /// Mainnet key for legacy P2PKH addresses
    #[display("xpub")]
    Xpub,

    /// Mainnet key for P2WPKH-in-P2SH addresses
    #[display("ypub")]
    Ypub,

    /// Mainnet key for native P2WPKH addresses
    #[display("zpub")]
    Zpub,

    /// Testnet key for legacy P2PKH addresses
    #[display("tpub")]
    Tpub,

    /// Testnet key for P2WPKH-in-P2SH addresses
    #[display("upub")]
    Upub,

    /// Testnet key for native P2WPKH addresses
    #[display("vpub")]
    Vpub,
}

impl KeyPrefix {
    /// All prefixes recognized by the library
    pub const ALL: [KeyPrefix; 6] = [
        KeyPrefix::Xpub,
        KeyPrefix::Ypub,
        KeyPrefix::Zpub,
        KeyPrefix::Tpub,
        KeyPrefix::Upub,
        KeyPrefix::Vpub,
    ];

    /// Detects the prefix from the first four characters of a string. Does not
    /// check the rest of the string.
    pub fn detect(key: &str) -> Option<KeyPrefix> {
        let head = key.get(..4)?;
        KeyPrefix::ALL
            .into_iter()
            .find(|prefix| prefix.as_str() == head)
    }

    /// Resolves version bytes into a prefix; returns `None` for private,
    /// multi-signature or unknown versions
    pub fn from_version(version: &KeyVersion) -> Option<KeyPrefix> {
        Some(match *version.as_bytes() {
            VERSION_MAGIC_XPUB => KeyPrefix::Xpub,
            VERSION_MAGIC_YPUB => KeyPrefix::Ypub,
            VERSION_MAGIC_ZPUB => KeyPrefix::Zpub,
            VERSION_MAGIC_TPUB => KeyPrefix::Tpub,
            VERSION_MAGIC_UPUB => KeyPrefix::Upub,
            VERSION_MAGIC_VPUB => KeyPrefix::Vpub,
            _ => return None,
        })
    }

    /// Four-character textual representation of the prefix
    pub fn as_str(self) -> &'static str {
        match self {
            KeyPrefix::Xpub => "xpub",
            KeyPrefix::Ypub => "ypub",
            KeyPrefix::Zpub => "zpub",
            KeyPrefix::Tpub => "tpub",
            KeyPrefix::Upub => "upub",
            KeyPrefix::Vpub => "vpub",
        }
    }

    /// Version bytes used by this prefix
    pub fn version(self) -> KeyVersion {
        KeyVersion(match self {
            KeyPrefix::Xpub => VERSION_MAGIC_XPUB,
            KeyPrefix::Ypub => VERSION_MAGIC_YPUB,
            KeyPrefix::Zpub => VERSION_MAGIC_ZPUB,
            KeyPrefix::Tpub => VERSION_MAGIC_TPUB,
            KeyPrefix::Upub => VERSION_MAGIC_UPUB,
            KeyPrefix::Vpub => VERSION_MAGIC_VPUB,
        })
    }

    /// Version bytes understood by BIP-32 decoders for the same network
    /// (`xpub` or `tpub`)
    pub fn bip32_version(self) -> KeyVersion {
        match self.is_testnet() {
            false => KeyPrefix::Xpub.version(),
            true => KeyPrefix::Tpub.version(),
        }
    }

    /// Scope of scriptPubkeys the key is meant for
    pub fn application(self) -> KeyApplication {
        match self {
            KeyPrefix::Xpub | KeyPrefix::Tpub => KeyApplication::Hashed,
            KeyPrefix::Ypub | KeyPrefix::Upub => KeyApplication::Nested,
            KeyPrefix::Zpub | KeyPrefix::Vpub => KeyApplication::SegWit,
        }
    }

    /// Detects whether the prefix belongs to a testnet key
    pub fn is_testnet(self) -> bool {
        matches!(self, KeyPrefix::Tpub | KeyPrefix::Upub | KeyPrefix::Vpub)
    }

    /// Network the key is intended for. All testnet prefixes are reported as
    /// [`Network::Testnet`].
    pub fn network(self) -> Network {
        if self.is_testnet() {
            Network::Testnet
        } else {
            Network::Bitcoin
        }
    }
}

/// Information about a validated extended public key
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ExtendedKeyInfo {
    /// SLIP-132 prefix of the key
    pub prefix: KeyPrefix,

    /// Decoded key, normalized to BIP-32 `xpub`/`tpub` version
    pub xpub: ExtendedPubKey,
}

impl ExtendedKeyInfo {
    /// Network the key is intended for
    #[inline]
    pub fn network(&self) -> Network { self.prefix.network() }

    /// Scope of scriptPubkeys the key is meant for
    #[inline]
    pub fn application(&self) -> KeyApplication { self.prefix.application() }

    /// Depth of the key in its derivation tree
    #[inline]
    pub fn depth(&self) -> u8 { self.xpub.depth }

    /// Fingerprint of the parent key
    #[inline]
    pub fn parent_fingerprint(&self) -> Fingerprint { self.xpub.parent_fingerprint }

    /// Child number this key has been derived with
    #[inline]
    pub fn child_number(&self) -> ChildNumber { self.xpub.child_number }

    /// Fingerprint of the key itself
    #[inline]
    pub fn fingerprint(&self) -> Fingerprint { self.xpub.fingerprint() }
}

/// Validates extended public key string: the prefix must be one of the
/// [`KeyPrefix`] values, the string must decode as base58check into exactly
/// 78 bytes with version bytes matching the prefix, and the payload must
/// contain a valid public key.
pub fn validate_extended_key(key: &str) -> Result<ExtendedKeyInfo, Error> {
    let prefix = KeyPrefix::detect(key).ok_or(Error::UnknownSlip132Prefix)?;
    let xpub = ExtendedPubKey::from_slip132_str(key)?;
    Ok(ExtendedKeyInfo { prefix, xpub })
}

/// Parsing of extended keys in SLIP-132 formats
pub trait FromSlip132 {
    /// Parses key from the string in one of SLIP-132 formats
    fn from_slip132_str(s: &str) -> Result<Self, Error>
    where
        Self: Sized;
}

impl FromSlip132 for ExtendedPubKey {
    fn from_slip132_str(s: &str) -> Result<Self, Error> {
        let mut data = base58::from_check(s)?;
        if data.len() != EXTENDED_KEY_LEN {
            return Err(Error::WrongExtendedKeyLength(data.len()));
        }

        let version = KeyVersion::from_slice(&data[0..4]).ok_or(Error::MalformedPayload)?;
        let prefix = KeyPrefix::from_version(&version)
            .ok_or_else(|| Error::VersionMismatch(version.into_bytes()))?;
        match KeyPrefix::detect(s) {
            Some(detected) if detected == prefix => {}
            _ => return Err(Error::VersionMismatch(version.into_bytes())),
        }
        data[0..4].copy_from_slice(prefix.bip32_version().as_slice());

        Ok(ExtendedPubKey::decode(&data)?)
    }
}

/// Encoding of extended keys into SLIP-132 formats
pub trait ToSlip132 {
    /// Encodes key using version bytes of the provided prefix
    fn to_slip132_string(&self, prefix: KeyPrefix) -> String;
}

impl ToSlip132 for ExtendedPubKey {
    fn to_slip132_string(&self, prefix: KeyPrefix) -> String {
        let mut xpub = self.encode();
        xpub[0..4].copy_from_slice(prefix.version().as_slice());
        base58::check_encode_slice(&xpub)
    }
}
