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

use bitcoin::util::bip32::ExtendedPubKey;
use bitcoin::{Address, Network};
use secp256k1::{Secp256k1, Verification};
use slip132::ExtendedKeyInfo;

use crate::{
    AddressPath, AddressType, Chain, PublicNetwork, UnhardenedIndex, HARDENED_INDEX_BOUNDARY,
};

/// Errors during address derivation
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum DeriveError {
    /// address index {0} is outside of the unhardened derivation range (it
    /// must be below 2^31)
    DerivationOutOfRange(u64),

    /// extended key is intended for {key} while the address was requested for
    /// {requested}
    NetworkMismatch {
        /// network of the extended key
        key: PublicNetwork,
        /// network requested by the caller
        requested: PublicNetwork,
    },

    /// extended key depth does not allow two more derivation levels
    DepthExceeded,

    /// derived child key is invalid for this index
    InvalidChildKey,

    /// derived public key is uncompressed and can't be used in segwit
    /// addresses
    UncompressedKey,
}

/// Address derived from an extended public key together with its derivation
/// information
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DerivedAddressView {
    /// Address in its canonical string encoding
    pub address: String,

    /// Chain the address belongs to
    pub chain: Chain,

    /// Index of the address within the chain
    pub index: UnhardenedIndex,

    /// Address standard used for encoding the derived key
    pub address_type: AddressType,
}

impl DerivedAddressView {
    /// Derivation path of the address, relative to the account key
    #[inline]
    pub fn derivation_path(&self) -> AddressPath { AddressPath::new(self.chain, self.index) }
}

impl Display for DerivedAddressView {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.derivation_path(), self.address, self.address_type)
    }
}

/// Methods for deriving addresses from an extended public key
pub trait DeriveAddress {
    /// Address type implied by the extended key format
    fn default_address_type(&self) -> AddressType;

    /// Network the extended key format belongs to
    fn key_network(&self) -> PublicNetwork;

    /// Fails with [`DeriveError::NetworkMismatch`] unless the key belongs to
    /// the `requested` network
    fn check_network(&self, requested: PublicNetwork) -> Result<(), DeriveError> {
        let key = self.key_network();
        if key != requested {
            return Err(DeriveError::NetworkMismatch { key, requested });
        }
        Ok(())
    }

    /// Derives address at `m/<chain>/<index>` using the address type implied
    /// by the key format
    fn derive_address<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        chain: Chain,
        index: UnhardenedIndex,
        network: PublicNetwork,
    ) -> Result<DerivedAddressView, DeriveError> {
        self.derive_address_as(secp, chain, index, network, self.default_address_type())
    }

    /// Derives address at `m/<chain>/<index>` encoding it with the provided
    /// address type
    fn derive_address_as<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        chain: Chain,
        index: UnhardenedIndex,
        network: PublicNetwork,
        address_type: AddressType,
    ) -> Result<DerivedAddressView, DeriveError>;

    /// Derives `count` consecutive addresses starting from `start`. Fails
    /// without producing any address if the range crosses the hardened index
    /// boundary.
    fn derive_batch<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        chain: Chain,
        start: UnhardenedIndex,
        count: u32,
        network: PublicNetwork,
    ) -> Result<Vec<DerivedAddressView>, DeriveError>;
}

impl DeriveAddress for ExtendedKeyInfo {
    #[inline]
    fn default_address_type(&self) -> AddressType { AddressType::from(self.application()) }

    fn key_network(&self) -> PublicNetwork {
        if self.prefix.is_testnet() {
            PublicNetwork::Testnet
        } else {
            PublicNetwork::Mainnet
        }
    }

    fn derive_address_as<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        chain: Chain,
        index: UnhardenedIndex,
        network: PublicNetwork,
        address_type: AddressType,
    ) -> Result<DerivedAddressView, DeriveError> {
        let branch = branch_key(self, secp, chain, network)?;
        encode_child(secp, &branch, chain, index, network, address_type)
    }

    fn derive_batch<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        chain: Chain,
        start: UnhardenedIndex,
        count: u32,
        network: PublicNetwork,
    ) -> Result<Vec<DerivedAddressView>, DeriveError> {
        let end = start.index() as u64 + count as u64;
        if end > HARDENED_INDEX_BOUNDARY as u64 {
            return Err(DeriveError::DerivationOutOfRange(end - 1));
        }
        if count == 0 {
            return Ok(vec![]);
        }

        let address_type = self.default_address_type();
        let branch = branch_key(self, secp, chain, network)?;
        (0..count)
            .map(|offset| {
                let index = start
                    .checked_add(offset)
                    .ok_or(DeriveError::DerivationOutOfRange(start.index() as u64 + offset as u64))?;
                encode_child(secp, &branch, chain, index, network, address_type)
            })
            .collect()
    }
}

fn branch_key<C: Verification>(
    key: &ExtendedKeyInfo,
    secp: &Secp256k1<C>,
    chain: Chain,
    network: PublicNetwork,
) -> Result<ExtendedPubKey, DeriveError> {
    key.check_network(network)?;
    if key.depth() > u8::MAX - 2 {
        return Err(DeriveError::DepthExceeded);
    }
    key.xpub
        .ckd_pub(secp, chain.child_number())
        .map_err(|_| DeriveError::InvalidChildKey)
}

fn encode_child<C: Verification>(
    secp: &Secp256k1<C>,
    branch: &ExtendedPubKey,
    chain: Chain,
    index: UnhardenedIndex,
    network: PublicNetwork,
    address_type: AddressType,
) -> Result<DerivedAddressView, DeriveError> {
    let child = branch
        .ckd_pub(secp, index.child_number())
        .map_err(|_| DeriveError::InvalidChildKey)?;
    let pubkey = bitcoin::PublicKey::new(child.public_key);
    let network = Network::from(network);

    let address = match address_type {
        AddressType::Legacy => Address::p2pkh(&pubkey, network),
        AddressType::SegwitWrapped => {
            Address::p2shwpkh(&pubkey, network).map_err(|_| DeriveError::UncompressedKey)?
        }
        AddressType::SegwitNative => {
            Address::p2wpkh(&pubkey, network).map_err(|_| DeriveError::UncompressedKey)?
        }
        AddressType::Taproot => {
            let (internal_key, _) = child.public_key.x_only_public_key();
            Address::p2tr(secp, internal_key, None, network)
        }
    };

    Ok(DerivedAddressView {
        address: address.to_string(),
        chain,
        index,
        address_type,
    })
}
