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

use std::convert::TryFrom;
use std::str::FromStr;

use bitcoin::Network;

/// Public bitcoin networks addresses can be derived for
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "lowercase")
)]
pub enum PublicNetwork {
    /// Bitcoin mainnet
    #[display("mainnet")]
    Mainnet,

    /// Bitcoin testnet
    #[display("testnet")]
    Testnet,
}

impl From<PublicNetwork> for Network {
    fn from(network: PublicNetwork) -> Self { Network::from(&network) }
}

impl From<&PublicNetwork> for Network {
    fn from(network: &PublicNetwork) -> Self {
        match network {
            PublicNetwork::Mainnet => Network::Bitcoin,
            PublicNetwork::Testnet => Network::Testnet,
        }
    }
}

impl TryFrom<Network> for PublicNetwork {
    type Error = ();
    fn try_from(network: Network) -> Result<Self, Self::Error> {
        Ok(match network {
            Network::Bitcoin => PublicNetwork::Mainnet,
            Network::Testnet => PublicNetwork::Testnet,
            Network::Signet | Network::Regtest => return Err(()),
        })
    }
}

impl Default for PublicNetwork {
    fn default() -> Self { PublicNetwork::Mainnet }
}

impl PublicNetwork {
    /// Detects if the public network is a testnet
    pub fn is_testnet(self) -> bool { matches!(self, PublicNetwork::Testnet) }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
/// unknown network `{0}`; use `mainnet` or `testnet`
pub struct UnknownNetworkError(pub String);

impl FromStr for PublicNetwork {
    type Err = UnknownNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(PublicNetwork::Mainnet),
            "testnet" => Ok(PublicNetwork::Testnet),
            _ => Err(UnknownNetworkError(s.to_owned())),
        }
    }
}
