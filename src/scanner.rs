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

use hd::{Chain, DeriveAddress, PublicNetwork, UnhardenedIndex};

use crate::cache::ResolvedAddress;
use crate::ledger::{AddressLedger, Error};
use crate::store::{AddressFilter, AddressStore, WalletId};

impl<S: AddressStore> AddressLedger<S> {
    /// Returns the highest index of the chain which was marked as used
    pub fn last_used_index(
        &self,
        wallet: &WalletId,
        chain: Chain,
    ) -> Result<Option<UnhardenedIndex>, Error> {
        let filter = AddressFilter::all().used(true).descending().limit(1);
        Ok(self
            .store
            .query(wallet, chain, &filter)?
            .first()
            .map(|record| record.address_index))
    }

    /// Returns the lowest-index unused address of the chain located after
    /// the last used one, deriving and storing it if the store has none.
    ///
    /// Addresses before the last used one are never returned, even if they
    /// have not been used themselves. Unlike
    /// [`AddressLedger::get_or_derive_address`], store read failures are
    /// reported as [`Error::StoreUnavailable`], and a key of the other network
    /// is rejected before the store is queried.
    pub fn get_next_unused_address(
        &self,
        key: &str,
        wallet: &WalletId,
        chain: Chain,
        network: PublicNetwork,
    ) -> Result<ResolvedAddress, Error> {
        let key_info = self.validate_key(key)?;
        key_info.check_network(network)?;

        let start = match self.last_used_index(wallet, chain)? {
            Some(last_used) => last_used.next()?,
            None => UnhardenedIndex::zero(),
        };

        if self.config.use_cache {
            let filter = AddressFilter::all().used(false).starting_from(start).limit(1);
            if let Some(record) = self.store.query(wallet, chain, &filter)?.into_iter().next() {
                debug!(%wallet, path = %record.derivation_path, "next unused address found in store");
                return Ok(ResolvedAddress {
                    view: record.to_view(),
                    cached: true,
                });
            }
        }

        let view = key_info.derive_address(&self.secp, chain, start, network)?;
        debug!(%wallet, path = %view.derivation_path(), "next unused address derived");
        self.persist(wallet, view)
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

    fn next(ledger: &AddressLedger<impl AddressStore>, chain: Chain) -> ResolvedAddress {
        ledger
            .get_next_unused_address(ZPUB, &wallet(), chain, PublicNetwork::Mainnet)
            .unwrap()
    }

    #[test]
    fn empty_wallet() {
        let ledger = AddressLedger::new(MemoryStore::new());
        let first = next(&ledger, Chain::Receiving);
        assert!(!first.cached);
        assert_eq!(first.view.address, ADDR_0_0);
        assert_eq!(first.view.index, 0);

        // not used yet, so the same address comes back from the store
        let again = next(&ledger, Chain::Receiving);
        assert!(again.cached);
        assert_eq!(again.view, first.view);
    }

    #[test]
    fn skips_used_address() {
        let ledger = AddressLedger::new(MemoryStore::new());
        next(&ledger, Chain::Receiving);
        assert!(ledger.store().mark_used(&wallet(), ADDR_0_0).unwrap());
        let second = next(&ledger, Chain::Receiving);
        assert_eq!(second.view.address, ADDR_0_1);
        assert_eq!(second.view.index, 1);
        assert_eq!(ledger.last_used_index(&wallet(), Chain::Receiving).unwrap(), Some(index(0)));
    }

    #[test]
    fn never_goes_back() {
        let ledger = AddressLedger::new(MemoryStore::new());
        let batch = ledger
            .pre_derive_addresses(ZPUB, &wallet(), Chain::Receiving, Some(10), PublicNetwork::Mainnet)
            .unwrap();
        assert!(ledger.store().mark_used(&wallet(), &batch[6].address).unwrap());

        let resolved = next(&ledger, Chain::Receiving);
        assert!(resolved.cached);
        assert_eq!(resolved.view, batch[7]);

        assert!(ledger.store().mark_used(&wallet(), &batch[9].address).unwrap());
        let resolved = next(&ledger, Chain::Receiving);
        assert!(!resolved.cached);
        assert_eq!(resolved.view.index, 10);
    }

    #[test]
    fn chains_are_independent() {
        let ledger = AddressLedger::new(MemoryStore::new());
        next(&ledger, Chain::Receiving);
        ledger.store().mark_used(&wallet(), ADDR_0_0).unwrap();
        let change = next(&ledger, Chain::Change);
        assert_eq!(change.view.address, ADDR_1_0);
    }

    #[test]
    fn without_cache_reuse() {
        let config = LedgerConfig {
            use_cache: false,
            ..LedgerConfig::default()
        };
        let ledger = AddressLedger::with_config(MemoryStore::new(), config);
        let first = next(&ledger, Chain::Receiving);
        assert!(!first.cached);
        let again = next(&ledger, Chain::Receiving);
        assert_eq!(again.view.address, ADDR_0_0);
        assert_eq!(ledger.store().len().unwrap(), 1);
    }

    #[test]
    fn read_failure_is_reported() {
        let ledger = AddressLedger::new(FlakyStore::failing_reads());
        let err = ledger
            .get_next_unused_address(ZPUB, &wallet(), Chain::Receiving, PublicNetwork::Mainnet)
            .unwrap_err();
        assert_eq!(err, Error::StoreUnavailable(StoreError::Timeout));
        assert!(err.is_retryable());
    }

    #[test]
    fn key_is_validated_first() {
        let ledger = AddressLedger::new(FlakyStore::failing_reads());
        assert!(matches!(
            ledger.get_next_unused_address("zpub", &wallet(), Chain::Receiving, PublicNetwork::Mainnet),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn stored_address_of_other_network() {
        let ledger = AddressLedger::new(MemoryStore::new());
        next(&ledger, Chain::Receiving);
        assert_eq!(
            ledger.get_next_unused_address(ZPUB, &wallet(), Chain::Receiving, PublicNetwork::Testnet),
            Err(Error::Derivation(DeriveError::NetworkMismatch {
                key: PublicNetwork::Mainnet,
                requested: PublicNetwork::Testnet
            }))
        );

        // rejected before any store access
        let ledger = AddressLedger::new(FlakyStore::failing_reads());
        assert!(matches!(
            ledger.get_next_unused_address(ZPUB, &wallet(), Chain::Change, PublicNetwork::Testnet),
            Err(Error::Derivation(DeriveError::NetworkMismatch { .. }))
        ));
    }
}
