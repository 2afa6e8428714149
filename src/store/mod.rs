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

//! Storage of derived addresses. Stores are accessed through the
//! [`AddressStore`] trait; the library provides in-memory [`MemoryStore`] and
//! YAML-file-based [`FileStore`] backends.

#[cfg(feature = "file-store")]
mod file;
mod memory;

use std::fmt::{self, Display, Formatter};
use std::io;
use std::sync::Arc;

use amplify::IoError;
use chrono::{DateTime, Utc};
#[cfg(feature = "file-store")]
pub use file::FileStore;
use hd::{AddressType, Chain, DerivedAddressView, UnhardenedIndex};
pub use memory::MemoryStore;

/// Opaque identifier of a wallet owning derived addresses
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct WalletId(String);

impl WalletId {
    /// Returns string representation of the identifier
    #[inline]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<String> for WalletId {
    fn from(id: String) -> Self { WalletId(id) }
}

impl From<&str> for WalletId {
    fn from(id: &str) -> Self { WalletId(id.to_owned()) }
}

impl Display for WalletId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Derived address persisted by the ledger.
///
/// Record is identified by `(wallet_id, chain, address_index)`. Address,
/// derivation path and address type never change once the record is
/// created; `is_used` may only go from `false` to `true`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DerivedAddress {
    /// Wallet the address belongs to
    pub wallet_id: WalletId,

    /// Canonical address string
    pub address: String,

    /// Derivation path relative to the account key, `m/<chain>/<index>`
    pub derivation_path: String,

    /// Chain of the address
    pub chain: Chain,

    /// Index of the address within the chain
    pub address_index: UnhardenedIndex,

    /// Standard of the address
    pub address_type: AddressType,

    /// Whether the address has been seen in use
    pub is_used: bool,

    /// Time of record creation
    pub created_at: DateTime<Utc>,

    /// Time of the last record modification
    pub updated_at: DateTime<Utc>,
}

impl DerivedAddress {
    /// Constructs a fresh unused record for the derived address
    pub fn with(wallet_id: WalletId, view: &DerivedAddressView, now: DateTime<Utc>) -> Self {
        DerivedAddress {
            wallet_id,
            address: view.address.clone(),
            derivation_path: view.derivation_path().to_string(),
            chain: view.chain,
            address_index: view.index,
            address_type: view.address_type,
            is_used: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns derivation information of the record
    pub fn to_view(&self) -> DerivedAddressView {
        DerivedAddressView {
            address: self.address.clone(),
            chain: self.chain,
            index: self.address_index,
            address_type: self.address_type,
        }
    }
}

/// Order of records returned by [`AddressStore::query`]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "lowercase")
)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Default)]
pub enum IndexOrder {
    /// Lowest index first
    #[default]
    #[display("asc")]
    Ascending,

    /// Highest index first
    #[display("desc")]
    Descending,
}

/// Filter applied to the records of a single wallet chain
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct AddressFilter {
    /// Return only records with the given usage flag
    pub is_used: Option<bool>,

    /// Return only records with index equal or above this one
    pub min_index: Option<UnhardenedIndex>,

    /// Ordering of the records by their index
    pub order: IndexOrder,

    /// Maximal number of records to return
    pub limit: Option<usize>,
}

impl AddressFilter {
    /// Filter matching all records in ascending index order
    #[inline]
    pub fn all() -> Self { AddressFilter::default() }

    /// Restricts the filter to the records with a given usage flag
    #[inline]
    pub fn used(mut self, is_used: bool) -> Self {
        self.is_used = Some(is_used);
        self
    }

    /// Restricts the filter to the records starting from the given index
    #[inline]
    pub fn starting_from(mut self, index: UnhardenedIndex) -> Self {
        self.min_index = Some(index);
        self
    }

    /// Makes the highest index to go first
    #[inline]
    pub fn descending(mut self) -> Self {
        self.order = IndexOrder::Descending;
        self
    }

    /// Limits number of returned records
    #[inline]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks whether a record passes the usage and index criteria of the
    /// filter (ordering and limit are applied by the store)
    pub fn matches(&self, record: &DerivedAddress) -> bool {
        self.is_used.map(|used| used == record.is_used).unwrap_or(true)
            && self
                .min_index
                .map(|min| record.address_index >= min)
                .unwrap_or(true)
    }
}

/// Result of inserting a record into the store
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum UpsertOutcome {
    /// New record was created
    Inserted(DerivedAddress),

    /// A record for the same wallet, chain and index already existed; the
    /// stored version is returned
    Existing(DerivedAddress),
}

impl UpsertOutcome {
    /// Returns the record as it is kept by the store
    pub fn record(&self) -> &DerivedAddress {
        match self {
            UpsertOutcome::Inserted(record) | UpsertOutcome::Existing(record) => record,
        }
    }

    /// Detects whether the record was created by the upsert operation
    #[inline]
    pub fn is_inserted(&self) -> bool { matches!(self, UpsertOutcome::Inserted(_)) }
}

/// Errors accessing address store
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum StoreError {
    /// address store is unavailable: {0}
    Unavailable(String),

    /// address store operation has timed out
    Timeout,

    /// address store I/O error: {0}
    #[from(io::Error)]
    Io(IoError),

    /// address store data can't be encoded or decoded: {0}
    Encoding(String),
}

impl StoreError {
    /// Detects whether the operation may succeed if repeated later
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout | StoreError::Io(_))
    }
}

/// Storage of derived addresses.
///
/// Implementations must enforce uniqueness of `(wallet, chain, index)`
/// triplets: an attempt to insert a record for an already taken slot is not an
/// error and results in [`UpsertOutcome::Existing`] holding the stored record.
pub trait AddressStore {
    /// Returns record for the specific address slot, if any
    fn get(
        &self,
        wallet: &WalletId,
        chain: Chain,
        index: UnhardenedIndex,
    ) -> Result<Option<DerivedAddress>, StoreError>;

    /// Returns records of a wallet chain matching the filter
    fn query(
        &self,
        wallet: &WalletId,
        chain: Chain,
        filter: &AddressFilter,
    ) -> Result<Vec<DerivedAddress>, StoreError>;

    /// Inserts record if its slot is free. Otherwise keeps the address,
    /// derivation path and address type of the stored record, raising its
    /// `is_used` flag if the new record has it set.
    fn upsert(&self, record: DerivedAddress) -> Result<UpsertOutcome, StoreError>;

    /// Upserts multiple records at once, returning outcomes in the same
    /// order
    fn upsert_batch(&self, records: Vec<DerivedAddress>) -> Result<Vec<UpsertOutcome>, StoreError> {
        records.into_iter().map(|record| self.upsert(record)).collect()
    }

    /// Marks all records of the wallet with the given address as used.
    /// Returns `false` if the wallet has no such address.
    fn mark_used(&self, wallet: &WalletId, address: &str) -> Result<bool, StoreError>;
}

impl<T> AddressStore for &T
where
    T: AddressStore + ?Sized,
{
    fn get(
        &self,
        wallet: &WalletId,
        chain: Chain,
        index: UnhardenedIndex,
    ) -> Result<Option<DerivedAddress>, StoreError> {
        (*self).get(wallet, chain, index)
    }

    fn query(
        &self,
        wallet: &WalletId,
        chain: Chain,
        filter: &AddressFilter,
    ) -> Result<Vec<DerivedAddress>, StoreError> {
        (*self).query(wallet, chain, filter)
    }

    fn upsert(&self, record: DerivedAddress) -> Result<UpsertOutcome, StoreError> {
        (*self).upsert(record)
    }

    fn upsert_batch(&self, records: Vec<DerivedAddress>) -> Result<Vec<UpsertOutcome>, StoreError> {
        (*self).upsert_batch(records)
    }

    fn mark_used(&self, wallet: &WalletId, address: &str) -> Result<bool, StoreError> {
        (*self).mark_used(wallet, address)
    }
}

impl<T> AddressStore for Arc<T>
where
    T: AddressStore + ?Sized,
{
    fn get(
        &self,
        wallet: &WalletId,
        chain: Chain,
        index: UnhardenedIndex,
    ) -> Result<Option<DerivedAddress>, StoreError> {
        self.as_ref().get(wallet, chain, index)
    }

    fn query(
        &self,
        wallet: &WalletId,
        chain: Chain,
        filter: &AddressFilter,
    ) -> Result<Vec<DerivedAddress>, StoreError> {
        self.as_ref().query(wallet, chain, filter)
    }

    fn upsert(&self, record: DerivedAddress) -> Result<UpsertOutcome, StoreError> {
        self.as_ref().upsert(record)
    }

    fn upsert_batch(&self, records: Vec<DerivedAddress>) -> Result<Vec<UpsertOutcome>, StoreError> {
        self.as_ref().upsert_batch(records)
    }

    fn mark_used(&self, wallet: &WalletId, address: &str) -> Result<bool, StoreError> {
        self.as_ref().mark_used(wallet, address)
    }
}
