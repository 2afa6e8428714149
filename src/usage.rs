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

use hd::Chain;

use crate::address::canonical_address;
use crate::ledger::{AddressLedger, Error};
use crate::store::{AddressFilter, AddressStore, DerivedAddress, WalletId};

impl<S: AddressStore> AddressLedger<S> {
    /// Marks wallet address as used. Repeated calls for the same address
    /// succeed and leave the record unchanged.
    ///
    /// Uppercase bech32 addresses are matched against their lowercase form;
    /// see [`canonical_address`].
    pub fn mark_address_used(&self, wallet: &WalletId, address: &str) -> Result<(), Error> {
        let address = canonical_address(address);
        if !self.store.mark_used(wallet, &address)? {
            return Err(Error::NotFound {
                wallet: wallet.clone(),
                address,
            });
        }
        debug!(%wallet, %address, "address marked as used");
        Ok(())
    }

    /// Lists stored addresses of the wallet chain
    pub fn list_addresses(
        &self,
        wallet: &WalletId,
        chain: Chain,
        filter: &AddressFilter,
    ) -> Result<Vec<DerivedAddress>, Error> {
        Ok(self.store.query(wallet, chain, filter)?)
    }
}

#[cfg(test)]
mod test {
    use hd::PublicNetwork;

    use super::*;
    use crate::ledger::test::*;
    use crate::store::MemoryStore;

    fn wallet() -> WalletId { WalletId::from("alice") }

    #[test]
    fn idempotent_marking() {
        let ledger = AddressLedger::new(MemoryStore::new());
        ledger
            .pre_derive_addresses(ZPUB, &wallet(), Chain::Receiving, Some(3), PublicNetwork::Mainnet)
            .unwrap();

        ledger.mark_address_used(&wallet(), ADDR_0_1).unwrap();
        let marked = ledger
            .store()
            .get(&wallet(), Chain::Receiving, index(1))
            .unwrap()
            .unwrap();
        assert!(marked.is_used);

        ledger.mark_address_used(&wallet(), ADDR_0_1).unwrap();
        let again = ledger
            .store()
            .get(&wallet(), Chain::Receiving, index(1))
            .unwrap()
            .unwrap();
        assert_eq!(again, marked);
    }

    #[test]
    fn uppercase_bech32() {
        let ledger = AddressLedger::new(MemoryStore::new());
        ledger
            .pre_derive_addresses(ZPUB, &wallet(), Chain::Receiving, Some(2), PublicNetwork::Mainnet)
            .unwrap();

        ledger
            .mark_address_used(&wallet(), &format!(" {} ", ADDR_0_1.to_uppercase()))
            .unwrap();
        assert!(ledger
            .store()
            .get(&wallet(), Chain::Receiving, index(1))
            .unwrap()
            .unwrap()
            .is_used);

        // mixed case is not a valid bech32 encoding
        let mixed = format!("BC1{}", &ADDR_0_0[3..]);
        assert!(matches!(
            ledger.mark_address_used(&wallet(), &mixed),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn unknown_address() {
        let ledger = AddressLedger::new(MemoryStore::new());
        assert_eq!(
            ledger.mark_address_used(&wallet(), ADDR_0_0),
            Err(Error::NotFound {
                wallet: wallet(),
                address: ADDR_0_0.to_owned()
            })
        );

        ledger
            .get_or_derive_address(ZPUB, &wallet(), Chain::Receiving, index(0), PublicNetwork::Mainnet, true)
            .unwrap();
        assert!(matches!(
            ledger.mark_address_used(&WalletId::from("bob"), ADDR_0_0),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn listing() {
        let ledger = AddressLedger::new(MemoryStore::new());
        ledger
            .pre_derive_addresses(ZPUB, &wallet(), Chain::Receiving, Some(4), PublicNetwork::Mainnet)
            .unwrap();
        ledger
            .pre_derive_addresses(ZPUB, &wallet(), Chain::Change, Some(2), PublicNetwork::Mainnet)
            .unwrap();
        ledger.mark_address_used(&wallet(), ADDR_0_0).unwrap();

        let receiving = ledger
            .list_addresses(&wallet(), Chain::Receiving, &AddressFilter::all())
            .unwrap();
        assert_eq!(receiving.len(), 4);
        assert_eq!(receiving[0].address, ADDR_0_0);
        assert_eq!(receiving[3].derivation_path, "m/0/3");

        let unused = ledger
            .list_addresses(&wallet(), Chain::Receiving, &AddressFilter::all().used(false))
            .unwrap();
        assert_eq!(unused.len(), 3);
        assert_eq!(unused[0].address, ADDR_0_1);

        let change = ledger
            .list_addresses(&wallet(), Chain::Change, &AddressFilter::all().descending())
            .unwrap();
        assert_eq!(change.len(), 2);
        assert_eq!(change[1].address, ADDR_1_0);
    }
}
