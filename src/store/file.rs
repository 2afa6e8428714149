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

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use hd::{Chain, UnhardenedIndex};

use super::{
    AddressFilter, AddressStore, DerivedAddress, MemoryStore, StoreError, UpsertOutcome, WalletId,
};

/// Address store keeping all records in a single YAML file.
///
/// Records are loaded into memory on open; every modification rewrites the
/// file through a temporary sibling file which is then renamed over the
/// original one. Modifications are applied to a staged copy of the records
/// and become visible only after the file was replaced, so a failed write
/// leaves both the file and the in-memory records unchanged.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: MemoryStore,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`. Missing file is treated as an empty store
    /// and is created on the first modification.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<DerivedAddress> = match fs::read_to_string(&path) {
            Ok(yaml) if yaml.trim().is_empty() => vec![],
            Ok(yaml) => serde_yaml::from_str(&yaml).map_err(encoding_error)?,
            Err(err) if err.kind() == ErrorKind::NotFound => vec![],
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), records = records.len(), "opened address file store");
        Ok(FileStore {
            path,
            cache: MemoryStore::from_records(records),
            write_lock: Mutex::new(()),
        })
    }

    /// Path to the file backing the store
    #[inline]
    pub fn path(&self) -> &Path { &self.path }

    fn lock(&self) -> Result<MutexGuard<()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable(s!("file store lock is poisoned")))
    }

    fn stage(&self) -> Result<MemoryStore, StoreError> {
        Ok(MemoryStore::from_records(self.cache.records()?))
    }

    fn commit(&self, staged: MemoryStore) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(&staged.records()?).map_err(encoding_error)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, yaml)?;
        fs::rename(&tmp, &self.path)?;
        self.cache.replace(staged)
    }
}

fn encoding_error(err: serde_yaml::Error) -> StoreError { StoreError::Encoding(err.to_string()) }

impl AddressStore for FileStore {
    fn get(
        &self,
        wallet: &WalletId,
        chain: Chain,
        index: UnhardenedIndex,
    ) -> Result<Option<DerivedAddress>, StoreError> {
        self.cache.get(wallet, chain, index)
    }

    fn query(
        &self,
        wallet: &WalletId,
        chain: Chain,
        filter: &AddressFilter,
    ) -> Result<Vec<DerivedAddress>, StoreError> {
        self.cache.query(wallet, chain, filter)
    }

    fn upsert(&self, record: DerivedAddress) -> Result<UpsertOutcome, StoreError> {
        let _guard = self.lock()?;
        let staged = self.stage()?;
        let outcome = staged.upsert(record)?;
        self.commit(staged)?;
        Ok(outcome)
    }

    fn upsert_batch(&self, records: Vec<DerivedAddress>) -> Result<Vec<UpsertOutcome>, StoreError> {
        let _guard = self.lock()?;
        let staged = self.stage()?;
        let outcomes = staged.upsert_batch(records)?;
        self.commit(staged)?;
        Ok(outcomes)
    }

    fn mark_used(&self, wallet: &WalletId, address: &str) -> Result<bool, StoreError> {
        let _guard = self.lock()?;
        let staged = self.stage()?;
        let found = staged.mark_used(wallet, address)?;
        if found {
            self.commit(staged)?;
        }
        Ok(found)
    }
}
