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

use hd::{
    AddressPath, AddressType, Chain, DeriveAddress, DeriveError, DerivedAddressView,
    PublicNetwork, UnhardenedIndex,
};
use secp256k1::{Secp256k1, VerifyOnly};
use slip132::ExtendedKeyInfo;

use crate::address::AddressError;
use crate::store::{AddressStore, StoreError, WalletId};

/// Ledger configuration
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", default)
)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LedgerConfig {
    /// Number of addresses pre-derived when no gap limit is given
    pub default_gap_limit: u16,

    /// Largest gap limit accepted by batch pre-derivation
    pub max_gap_limit: u16,

    /// Whether the next unused address lookup may reuse stored addresses
    /// instead of re-deriving them
    pub use_cache: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            default_gap_limit: 20,
            max_gap_limit: 100,
            use_cache: true,
        }
    }
}

/// Ledger errors
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// invalid extended public key: {0}
    #[from]
    InvalidKey(slip132::Error),

    /// invalid address: {0}
    #[from]
    InvalidAddress(AddressError),

    /// {0}
    #[from]
    Derivation(DeriveError),

    /// {0}
    #[from]
    StoreUnavailable(StoreError),

    /// wallet `{wallet}` has no address {address}
    NotFound {
        /// wallet which was searched for the address
        wallet: WalletId,
        /// address which was not found
        address: String,
    },

    /// gap limit {requested} exceeds maximum of {max} addresses
    GapLimitExceeded {
        /// gap limit provided by the caller
        requested: u16,
        /// maximum allowed by the ledger configuration
        max: u16,
    },

    /// address {stored} stored for {path} differs from the derived address
    /// {derived}
    CacheInconsistency {
        /// derivation path of the conflicting record
        path: AddressPath,
        /// address kept by the store
        stored: String,
        /// address derived from the extended key
        derived: String,
    },
}

impl Error {
    /// Detects whether the operation may succeed if repeated later
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StoreUnavailable(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Address ledger of watch-only wallets, deriving addresses from extended
/// public keys and keeping them in an address store
#[derive(Debug)]
pub struct AddressLedger<S: AddressStore> {
    pub(crate) store: S,
    pub(crate) config: LedgerConfig,
    pub(crate) secp: Secp256k1<VerifyOnly>,
}

impl<S: AddressStore> AddressLedger<S> {
    /// Constructs ledger with the default configuration
    #[inline]
    pub fn new(store: S) -> Self { AddressLedger::with_config(store, LedgerConfig::default()) }

    /// Constructs ledger with a custom configuration
    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        AddressLedger {
            store,
            config,
            secp: Secp256k1::verification_only(),
        }
    }

    /// Returns the underlying address store
    #[inline]
    pub fn store(&self) -> &S { &self.store }

    /// Returns ledger configuration
    #[inline]
    pub fn config(&self) -> &LedgerConfig { &self.config }

    /// Releases the underlying address store
    #[inline]
    pub fn into_store(self) -> S { self.store }

    /// Validates extended public key
    pub fn validate_key(&self, key: &str) -> Result<ExtendedKeyInfo, Error> {
        slip132::validate_extended_key(key).map_err(|err| {
            debug!(prefix = key_prefix(key), %err, "extended key rejected");
            Error::from(err)
        })
    }

    /// Derives address without touching the store
    pub fn derive(
        &self,
        key: &str,
        chain: Chain,
        index: UnhardenedIndex,
        network: PublicNetwork,
    ) -> Result<DerivedAddressView, Error> {
        let key = self.validate_key(key)?;
        Ok(key.derive_address(&self.secp, chain, index, network)?)
    }

    /// Derives address of the given type without touching the store
    pub fn derive_as(
        &self,
        key: &str,
        chain: Chain,
        index: UnhardenedIndex,
        network: PublicNetwork,
        address_type: AddressType,
    ) -> Result<DerivedAddressView, Error> {
        let key = self.validate_key(key)?;
        Ok(key.derive_address_as(&self.secp, chain, index, network, address_type)?)
    }
}

/// Part of the extended key which is safe to put into logs
pub(crate) fn key_prefix(key: &str) -> &str { key.get(..4).unwrap_or("") }

#[cfg(test)]
pub(crate) mod test {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::store::{AddressFilter, DerivedAddress, MemoryStore, UpsertOutcome};

    // BIP-84 test vector: account 0 of the "abandon ... about" mnemonic
    pub const ZPUB: &str = "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs";
    // BIP-32 test vector 1, master key
    pub const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

    pub const ADDR_0_0: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
    pub const ADDR_0_1: &str = "bc1qnjg0jd8228aq7egyzacy8cys3knf9xvrerkf9g";
    pub const ADDR_1_0: &str = "bc1q8c6fshw2dlwun7ekn9qwf37cu2rn755upcp6el";

    pub fn index(index: u32) -> UnhardenedIndex { UnhardenedIndex::from_index(index).unwrap() }

    /// Store wrapper failing reads and writes on request
    #[derive(Debug, Default)]
    pub struct FlakyStore {
        pub inner: MemoryStore,
        pub fail_reads: AtomicBool,
        pub fail_writes: AtomicBool,
    }

    impl FlakyStore {
        pub fn failing_reads() -> Self {
            let store = FlakyStore::default();
            store.fail_reads.store(true, Ordering::SeqCst);
            store
        }

        pub fn failing_writes() -> Self {
            let store = FlakyStore::default();
            store.fail_writes.store(true, Ordering::SeqCst);
            store
        }

        fn check(&self, flag: &AtomicBool) -> Result<(), StoreError> {
            if flag.load(Ordering::SeqCst) {
                Err(StoreError::Timeout)
            } else {
                Ok(())
            }
        }
    }

    impl AddressStore for FlakyStore {
        fn get(
            &self,
            wallet: &WalletId,
            chain: Chain,
            index: UnhardenedIndex,
        ) -> Result<Option<DerivedAddress>, StoreError> {
            self.check(&self.fail_reads)?;
            self.inner.get(wallet, chain, index)
        }

        fn query(
            &self,
            wallet: &WalletId,
            chain: Chain,
            filter: &AddressFilter,
        ) -> Result<Vec<DerivedAddress>, StoreError> {
            self.check(&self.fail_reads)?;
            self.inner.query(wallet, chain, filter)
        }

        fn upsert(&self, record: DerivedAddress) -> Result<UpsertOutcome, StoreError> {
            self.check(&self.fail_writes)?;
            self.inner.upsert(record)
        }

        fn mark_used(&self, wallet: &WalletId, address: &str) -> Result<bool, StoreError> {
            self.check(&self.fail_writes)?;
            self.inner.mark_used(wallet, address)
        }
    }

    #[test]
    fn pure_derivation() {
        let ledger = AddressLedger::new(MemoryStore::new());
        let view = ledger
            .derive(ZPUB, Chain::Receiving, index(0), PublicNetwork::Mainnet)
            .unwrap();
        assert_eq!(view.address, ADDR_0_0);
        assert_eq!(
            ledger
                .derive(ZPUB, Chain::Change, index(0), PublicNetwork::Mainnet)
                .unwrap()
                .address,
            ADDR_1_0
        );
        assert!(ledger.store().is_empty().unwrap());
    }

    #[test]
    fn legacy_master_key() {
        let ledger = AddressLedger::new(MemoryStore::new());
        let view = ledger
            .derive(XPUB, Chain::Receiving, index(0), PublicNetwork::Mainnet)
            .unwrap();
        assert_eq!(view.address_type, AddressType::Legacy);
        assert!(view.address.starts_with('1'));
        let taproot = ledger
            .derive_as(XPUB, Chain::Receiving, index(0), PublicNetwork::Mainnet, AddressType::Taproot)
            .unwrap();
        assert!(taproot.address.starts_with("bc1p"));
    }

    #[test]
    fn invalid_key() {
        let ledger = AddressLedger::new(MemoryStore::new());
        let mut corrupted = ZPUB.to_owned();
        corrupted.pop();
        corrupted.push('t');
        for key in ["", "xprv9s21ZrQH143K", &corrupted] {
            assert!(matches!(
                ledger.derive(key, Chain::Receiving, index(0), PublicNetwork::Mainnet),
                Err(Error::InvalidKey(_))
            ));
        }
        assert!(matches!(
            ledger.derive(ZPUB, Chain::Receiving, index(0), PublicNetwork::Testnet),
            Err(Error::Derivation(DeriveError::NetworkMismatch { .. }))
        ));
    }

    #[test]
    fn retryable_errors() {
        assert!(Error::StoreUnavailable(StoreError::Timeout).is_retryable());
        assert!(!Error::GapLimitExceeded { requested: 101, max: 100 }.is_retryable());
        assert!(!Error::InvalidKey(slip132::Error::UnknownSlip132Prefix).is_retryable());
    }

    #[test]
    fn safe_prefix() {
        assert_eq!(key_prefix(ZPUB), "zpub");
        assert_eq!(key_prefix("zp"), "");
    }
}
