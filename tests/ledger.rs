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

use std::sync::Arc;
use std::thread;

use ledger::{
    detect_kind, validate_address, AddressFilter, AddressLedger, AddressType, Chain, InputKind,
    MemoryStore, PublicNetwork, UnhardenedIndex, WalletId,
};

const ZPUB: &str = "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs";
const A0: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
const A1: &str = "bc1qnjg0jd8228aq7egyzacy8cys3knf9xvrerkf9g";

#[test]
fn bip84_wallet_lifecycle() {
    let ledger = AddressLedger::new(MemoryStore::new());
    let wallet = WalletId::from("bip84");
    let network = PublicNetwork::Mainnet;

    assert_eq!(detect_kind(ZPUB), Some(InputKind::ExtendedKey));

    let first = ledger
        .get_next_unused_address(ZPUB, &wallet, Chain::Receiving, network)
        .unwrap();
    assert_eq!(first.view.address, A0);
    assert_eq!(first.view.derivation_path().to_string(), "m/0/0");
    assert!(!first.cached);

    let info = validate_address(&first.view.address, network).unwrap();
    assert_eq!(info.address_type, AddressType::SegwitNative);

    ledger.mark_address_used(&wallet, A0).unwrap();
    ledger.mark_address_used(&wallet, A0).unwrap();

    let second = ledger
        .get_next_unused_address(ZPUB, &wallet, Chain::Receiving, network)
        .unwrap();
    assert_eq!(second.view.address, A1);
    assert_eq!(second.view.index, 1);

    let stored = ledger
        .list_addresses(&wallet, Chain::Receiving, &AddressFilter::all())
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[0].is_used);
    assert!(!stored[1].is_used);
}

#[test]
fn gap_limit_window() {
    let ledger = AddressLedger::new(MemoryStore::new());
    let wallet = WalletId::from("window");
    let network = PublicNetwork::Mainnet;

    let first = ledger
        .pre_derive_addresses(ZPUB, &wallet, Chain::Receiving, None, network)
        .unwrap();
    assert_eq!(first.len(), 20);

    let next = ledger
        .pre_derive_addresses(ZPUB, &wallet, Chain::Receiving, None, network)
        .unwrap();
    let expected: Vec<UnhardenedIndex> = (20u32..40)
        .map(|index| UnhardenedIndex::from_index(index).unwrap())
        .collect();
    assert_eq!(next.iter().map(|view| view.index).collect::<Vec<_>>(), expected);

    // every pre-derived address matches the individually derived one
    for view in first.iter().chain(&next) {
        let resolved = ledger
            .get_or_derive_address(ZPUB, &wallet, Chain::Receiving, view.index, network, true)
            .unwrap();
        assert!(resolved.cached);
        assert_eq!(&resolved.view, view);
        assert_eq!(
            validate_address(&view.address, network).unwrap().address_type,
            AddressType::SegwitNative
        );
        assert_eq!(
            &ledger.derive(ZPUB, Chain::Receiving, view.index, network).unwrap(),
            view
        );
    }

    let mut last_returned = None;
    for used in [3u32, 11, 25] {
        let address = &first
            .iter()
            .chain(&next)
            .find(|view| view.index == used)
            .unwrap()
            .address;
        ledger.mark_address_used(&wallet, address).unwrap();
        let resolved = ledger
            .get_next_unused_address(ZPUB, &wallet, Chain::Receiving, network)
            .unwrap();
        assert!(resolved.view.index > used);
        assert!(resolved.cached);
        if let Some(last) = last_returned {
            assert!(resolved.view.index > last);
        }
        last_returned = Some(resolved.view.index);
    }
}

#[test]
fn concurrent_derivation_keeps_single_record() {
    let ledger = Arc::new(AddressLedger::new(MemoryStore::new()));
    let wallet = WalletId::from("shared");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            let wallet = wallet.clone();
            thread::spawn(move || {
                ledger
                    .get_or_derive_address(
                        ZPUB,
                        &wallet,
                        Chain::Change,
                        UnhardenedIndex::zero(),
                        PublicNetwork::Mainnet,
                        true,
                    )
                    .unwrap()
            })
        })
        .collect();

    let addresses: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().view.address)
        .collect();
    assert!(addresses.iter().all(|address| address == &addresses[0]));
    assert_eq!(ledger.store().len().unwrap(), 1);
}
