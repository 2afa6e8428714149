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

use std::fmt::{self, Display, Formatter};

use chrono::Utc;
use hd::{Chain, DeriveAddress, DerivedAddressView, PublicNetwork, UnhardenedIndex};

use crate::ledger::{key_prefix, AddressLedger, Error};
use crate::store::{AddressStore, DerivedAddress, UpsertOutcome, WalletId};

/// Address returned by the ledger
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ResolvedAddress {
    /// Address and its derivation information
    pub view: DerivedAddressView,

    /// Whether the address was taken from the store rather than freshly
    /// derived
    pub cached: bool,
}

impl Display for ResolvedAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.view, f)?;
        if self.cached {
            f.write_str(" [cached]")?;
        }
        Ok(())
    }
}

impl<S: AddressStore> AddressLedger<S> {
    /// Returns address at `m/<chain>/<index>` of the wallet.
    ///
    /// With `use_cache` set, a stored address is returned as is, without
    /// validating the key or re-deriving. Otherwise (and on a cache miss) the
    /// key is validated, the address is derived and persisted. The result is
    /// marked `cached` whenever the slot was already present in the store,
    /// including re-derivations with `use_cache` unset which matched the
    /// stored record. Failures to
    /// read from or write to the store do not prevent the derived address from
    /// being returned; they are only logged.
    pub fn get_or_derive_address(
        &self,
        key: &str,
        wallet: &WalletId,
        chain: Chain,
        index: UnhardenedIndex,
        network: PublicNetwork,
        use_cache: bool,
    ) -> Result<ResolvedAddress, Error> {
        if use_cache {
            match self.store.get(wallet, chain, index) {
                Ok(Some(record)) => {
                    debug!(%wallet, path = %record.derivation_path, "address cache hit");
                    return Ok(ResolvedAddress {
                        view: record.to_view(),
                        cached: true,
                    });
                }
                Ok(None) => debug!(%wallet, %chain, %index, "address cache miss"),
                Err(err) => {
                    warn!(%wallet, %chain, %index, %err, "address lookup failed; deriving instead")
                }
            }
        }

        let key_info = self.validate_key(key)?;
        let view = key_info.derive_address(&self.secp, chain, index, network)?;
        debug!(
            %wallet,
            prefix = key_prefix(key),
            path = %view.derivation_path(),
            address = %view.address,
            "address derived"
        );
        self.persist(wallet, view)
    }

    /// Stores freshly derived address, resolving conflicts with an already
    /// existing record for the same slot
    pub(crate) fn persist(
        &self,
        wallet: &WalletId,
        view: DerivedAddressView,
    ) -> Result<ResolvedAddress, Error> {
        let record = DerivedAddress::with(wallet.clone(), &view, Utc::now());
        match self.store.upsert(record) {
            Ok(UpsertOutcome::Inserted(_)) => Ok(ResolvedAddress {
                view,
                cached: false,
            }),
            Ok(UpsertOutcome::Existing(existing)) if existing.address == view.address => {
                Ok(ResolvedAddress {
                    view: existing.to_view(),
                    cached: true,
                })
            }
            Ok(UpsertOutcome::Existing(existing)) => {
                error!(
                    %wallet,
                    path = %existing.derivation_path,
                    stored = %existing.address,
                    derived = %view.address,
                    "stored address does not match the derived one"
                );
                Err(Error::CacheInconsistency {
                    path: view.derivation_path(),
                    stored: existing.address,
                    derived: view.address,
                })
            }
            Err(err) => {
                warn!(%wallet, path = %view.derivation_path(), %err, "derived address was not saved");
                Ok(ResolvedAddress {
                    view,
                    cached: false,
                })
            }
        }
    }
}
