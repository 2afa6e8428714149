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

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use hd::{Chain, UnhardenedIndex};

use super::{
    AddressFilter, AddressStore, DerivedAddress, IndexOrder, StoreError, UpsertOutcome, WalletId,
};

type SlotKey = (WalletId, Chain, UnhardenedIndex);

/// In-memory address store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<SlotKey, DerivedAddress>>,
}

impl MemoryStore {
    /// Constructs empty store
    #[inline]
    pub fn new() -> Self { MemoryStore::default() }

    /// Constructs store from a set of records. If several records share the
    /// same slot, the first one is kept.
    pub fn from_records(records: impl IntoIterator<Item = DerivedAddress>) -> Self {
        let mut map = BTreeMap::new();
        for record in records {
            map.entry(slot_key(&record)).or_insert(record);
        }
        MemoryStore {
            records: RwLock::new(map),
        }
    }

    /// Returns copy of all records ordered by wallet, chain and index
    pub fn records(&self) -> Result<Vec<DerivedAddress>, StoreError> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Returns number of records in the store
    pub fn len(&self) -> Result<usize, StoreError> { Ok(self.read()?.len()) }

    /// Detects whether the store has no records
    pub fn is_empty(&self) -> Result<bool, StoreError> { Ok(self.read()?.is_empty()) }

    /// Replaces all records with the ones from `other`
    #[cfg(feature = "file-store")]
    pub(crate) fn replace(&self, other: MemoryStore) -> Result<(), StoreError> {
        let records = other
            .records
            .into_inner()
            .map_err(|_| StoreError::Unavailable(s!("memory store lock is poisoned")))?;
        *self.write()? = records;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<BTreeMap<SlotKey, DerivedAddress>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable(s!("memory store lock is poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<BTreeMap<SlotKey, DerivedAddress>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable(s!("memory store lock is poisoned")))
    }
}

fn slot_key(record: &DerivedAddress) -> SlotKey {
    (record.wallet_id.clone(), record.chain, record.address_index)
}

fn upsert_into(
    map: &mut BTreeMap<SlotKey, DerivedAddress>,
    record: DerivedAddress,
) -> UpsertOutcome {
    match map.get_mut(&slot_key(&record)) {
        Some(existing) => {
            if record.is_used && !existing.is_used {
                existing.is_used = true;
                existing.updated_at = Utc::now();
            }
            UpsertOutcome::Existing(existing.clone())
        }
        None => {
            map.insert(slot_key(&record), record.clone());
            UpsertOutcome::Inserted(record)
        }
    }
}

impl AddressStore for MemoryStore {
    fn get(
        &self,
        wallet: &WalletId,
        chain: Chain,
        index: UnhardenedIndex,
    ) -> Result<Option<DerivedAddress>, StoreError> {
        Ok(self.read()?.get(&(wallet.clone(), chain, index)).cloned())
    }

    fn query(
        &self,
        wallet: &WalletId,
        chain: Chain,
        filter: &AddressFilter,
    ) -> Result<Vec<DerivedAddress>, StoreError> {
        let records = self.read()?;
        let range = records
            .range((wallet.clone(), chain, UnhardenedIndex::zero())..=(
                wallet.clone(),
                chain,
                UnhardenedIndex::largest(),
            ))
            .map(|(_, record)| record)
            .filter(|record| filter.matches(record));
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(match filter.order {
            IndexOrder::Ascending => range.take(limit).cloned().collect(),
            IndexOrder::Descending => range.rev().take(limit).cloned().collect(),
        })
    }

    fn upsert(&self, record: DerivedAddress) -> Result<UpsertOutcome, StoreError> {
        Ok(upsert_into(&mut *self.write()?, record))
    }

    fn upsert_batch(&self, records: Vec<DerivedAddress>) -> Result<Vec<UpsertOutcome>, StoreError> {
        let mut map = self.write()?;
        Ok(records
            .into_iter()
            .map(|record| upsert_into(&mut map, record))
            .collect())
    }

    fn mark_used(&self, wallet: &WalletId, address: &str) -> Result<bool, StoreError> {
        let mut map = self.write()?;
        let mut found = false;
        let now = Utc::now();
        for record in map
            .values_mut()
            .filter(|record| &record.wallet_id == wallet && record.address == address)
        {
            found = true;
            if !record.is_used {
                record.is_used = true;
                record.updated_at = now;
            }
        }
        Ok(found)
    }
}
