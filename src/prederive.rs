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

use chrono::Utc;
use hd::{Chain, DeriveAddress, DerivedAddressView, PublicNetwork, UnhardenedIndex};

use crate::ledger::{AddressLedger, Error};
use crate::store::{AddressFilter, AddressStore, DerivedAddress, UpsertOutcome, WalletId};

impl<S: AddressStore> AddressLedger<S> {
    /// Returns the highest index of the chain present in the store
    pub fn last_allocated_index(
        &self,
        wallet: &WalletId,
        chain: Chain,
    ) -> Result<Option<UnhardenedIndex>, Error> {
        let filter = AddressFilter::all().descending().limit(1);
        Ok(self
            .store
            .query(wallet, chain, &filter)?
            .first()
            .map(|record| record.address_index))
    }

    /// Derives `gap_limit` addresses following the highest stored index of
    /// the chain and saves them with a single batch write.
    ///
    /// If `gap_limit` is not given, the configured default is used. Failure to
    /// save the batch is logged and does not affect the returned addresses.
    pub fn pre_derive_addresses(
        &self,
        key: &str,
        wallet: &WalletId,
        chain: Chain,
        gap_limit: Option<u16>,
        network: PublicNetwork,
    ) -> Result<Vec<DerivedAddressView>, Error> {
        let gap_limit = gap_limit.unwrap_or(self.config.default_gap_limit);
        if gap_limit > self.config.max_gap_limit {
            return Err(Error::GapLimitExceeded {
                requested: gap_limit,
                max: self.config.max_gap_limit,
            });
        }
        let key_info = self.validate_key(key)?;
        key_info.check_network(network)?;
        if gap_limit == 0 {
            return Ok(vec![]);
        }

        let start = match self.last_allocated_index(wallet, chain)? {
            Some(last) => last.next()?,
            None => UnhardenedIndex::zero(),
        };
        let batch = key_info.derive_batch(&self.secp, chain, start, gap_limit as u32, network)?;

        let now = Utc::now();
        let records = batch
            .iter()
            .map(|view| DerivedAddress::with(wallet.clone(), view, now))
            .collect();
        match self.store.upsert_batch(records) {
            Ok(outcomes) => {
                let inserted = outcomes.iter().filter(|outcome| outcome.is_inserted()).count();
                for (outcome, view) in outcomes.iter().zip(&batch) {
                    if let UpsertOutcome::Existing(existing) = outcome {
                        if existing.address != view.address {
                            error!(
                                %wallet,
                                path = %existing.derivation_path,
                                stored = %existing.address,
                                derived = %view.address,
                                "stored address does not match the derived one"
                            );
                        }
                    }
                }
                info!(%wallet, %chain, %start, count = batch.len(), inserted, "addresses pre-derived");
            }
            Err(err) => {
                warn!(%wallet, %chain, %start, count = batch.len(), %err, "pre-derived addresses were not saved")
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ledger::test::*;
    use crate::ledger::LedgerConfig;
    use crate::store::{MemoryStore, StoreError};
    use hd::DeriveError;

    fn wallet() -> WalletId { WalletId::from("alice") }

    fn pre_derive(
        ledger: &AddressLedger<impl AddressStore>,
        gap_limit: Option<u16>,
    ) -> Result<Vec<DerivedAddressView>, Error> {
        ledger.pre_derive_addresses(ZPUB, &wallet(), Chain::Receiving, gap_limit, PublicNetwork::Mainnet)
    }

    #[test]
    fn default_gap_limit() {
        let ledger = AddressLedger::new(MemoryStore::new());
        let batch = pre_derive(&ledger, None).unwrap();
        assert_eq!(batch.len(), 20);
        assert_eq!(batch[0].address, ADDR_0_0);
        assert_eq!(batch[1].address, ADDR_0_1);
        assert_eq!(ledger.store().len().unwrap(), 20);
        assert_eq!(ledger.last_allocated_index(&wallet(), Chain::Receiving).unwrap(), Some(index(19)));
    }

    #[test]
    fn continues_after_highest_index() {
        let ledger = AddressLedger::new(MemoryStore::new());
        pre_derive(&ledger, Some(5)).unwrap();
        let batch = pre_derive(&ledger, None).unwrap();
        let indexes: Vec<u32> = batch.iter().map(|view| view.index.index()).collect();
        assert_eq!(indexes, (5..25).collect::<Vec<_>>());
        assert_eq!(ledger.store().len().unwrap(), 25);
    }

    #[test]
    fn starts_after_sparse_record() {
        let ledger = AddressLedger::new(MemoryStore::new());
        ledger
            .get_or_derive_address(ZPUB, &wallet(), Chain::Receiving, index(5), PublicNetwork::Mainnet, true)
            .unwrap();
        let batch = pre_derive(&ledger, Some(2)).unwrap();
        assert_eq!(batch[0].index, 6);
        assert_eq!(batch[1].index, 7);
    }

    #[test]
    fn gap_limit_bounds() {
        let ledger = AddressLedger::new(MemoryStore::new());
        assert_eq!(pre_derive(&ledger, Some(101)), Err(Error::GapLimitExceeded {
            requested: 101,
            max: 100
        }));
        assert_eq!(pre_derive(&ledger, Some(100)).unwrap().len(), 100);
        assert_eq!(pre_derive(&ledger, Some(0)).unwrap(), vec![]);
        assert_eq!(ledger.store().len().unwrap(), 100);

        let config = LedgerConfig {
            default_gap_limit: 3,
            max_gap_limit: 5,
            ..LedgerConfig::default()
        };
        let ledger = AddressLedger::with_config(MemoryStore::new(), config);
        assert_eq!(pre_derive(&ledger, None).unwrap().len(), 3);
        assert!(matches!(pre_derive(&ledger, Some(6)), Err(Error::GapLimitExceeded { .. })));
    }

    #[test]
    fn write_failure_is_swallowed() {
        let ledger = AddressLedger::new(FlakyStore::failing_writes());
        let batch = pre_derive(&ledger, Some(4)).unwrap();
        assert_eq!(batch.len(), 4);
        assert!(ledger.store().inner.is_empty().unwrap());
    }

    #[test]
    fn read_failure_is_reported() {
        let ledger = AddressLedger::new(FlakyStore::failing_reads());
        assert_eq!(pre_derive(&ledger, Some(4)), Err(Error::StoreUnavailable(StoreError::Timeout)));
    }

    #[test]
    fn invalid_key() {
        let ledger = AddressLedger::new(MemoryStore::new());
        assert!(matches!(
            ledger.pre_derive_addresses("ypub", &wallet(), Chain::Change, None, PublicNetwork::Mainnet),
            Err(Error::InvalidKey(_))
        ));
        assert!(ledger.store().is_empty().unwrap());
    }

    #[test]
    fn other_network_key() {
        let ledger = AddressLedger::new(FlakyStore::failing_reads());
        assert_eq!(
            ledger.pre_derive_addresses(ZPUB, &wallet(), Chain::Receiving, None, PublicNetwork::Testnet),
            Err(Error::Derivation(DeriveError::NetworkMismatch {
                key: PublicNetwork::Mainnet,
                requested: PublicNetwork::Testnet
            }))
        );
    }
}
