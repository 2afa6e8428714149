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

#[macro_use]
extern crate clap;
#[macro_use]
extern crate amplify;

use std::path::PathBuf;
use std::process;

use clap::Parser;
use colored::Colorize;
use ledger::{
    detect_kind, validate_address, validate_extended_key, AddressError, AddressFilter,
    AddressLedger, AddressType, Chain, FileStore, InputKind, LedgerConfig, PublicNetwork,
    StoreError, UnhardenedIndex, WalletId,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser)]
#[derive(Clone, Eq, PartialEq, Debug)]
#[clap(
    author,
    version,
    name = "xpub-ledger",
    about = "Watch-only address ledger deriving bitcoin addresses from extended public keys"
)]
pub struct Args {
    /// Command to execute
    #[clap(subcommand)]
    pub command: Command,

    /// Bitcoin network: `mainnet` or `testnet`
    #[clap(short, long, global = true, default_value = "mainnet")]
    pub network: PublicNetwork,

    /// YAML file keeping derived addresses
    #[clap(
        short,
        long,
        global = true,
        env = "XPUB_LEDGER_STORE",
        default_value = "xpub-ledger.yaml"
    )]
    pub store: PathBuf,

    /// Number of addresses to pre-derive when `prederive` has no explicit
    /// count
    #[clap(long, global = true, default_value = "20")]
    pub gap_limit: u16,

    /// Maximal number of addresses which can be pre-derived at once
    #[clap(long, global = true, default_value = "100")]
    pub max_gap_limit: u16,
}

/// Ledger command to execute
#[derive(Subcommand)]
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Command {
    /// Validate extended public key or address
    Validate {
        /// Extended public key (xpub, ypub, zpub, tpub, upub, vpub) or address
        input: String,
    },

    /// Derive an address from an extended public key.
    ///
    /// Without `--wallet` the address is only derived; with it the address is
    /// also kept in the store.
    Derive {
        /// Extended public key
        key: String,

        /// Chain: `receiving` (`0`) or `change` (`1`)
        chain: Chain,

        /// Index of the address within the chain
        index: UnhardenedIndex,

        /// Address type to use instead of the one implied by the key format
        #[clap(short = 't', long)]
        address_type: Option<AddressType>,

        /// Wallet to save the derived address for
        #[clap(short, long, conflicts_with = "address_type")]
        wallet: Option<String>,

        /// Do not reuse an address already present in the store
        #[clap(long, requires = "wallet")]
        no_cache: bool,
    },

    /// Return next unused address of the wallet
    Next {
        /// Extended public key
        key: String,

        /// Wallet identifier
        wallet: String,

        /// Chain: `receiving` (`0`) or `change` (`1`)
        #[clap(default_value = "receiving")]
        chain: Chain,
    },

    /// Derive and save a batch of addresses following the last stored one
    Prederive {
        /// Extended public key
        key: String,

        /// Wallet identifier
        wallet: String,

        /// Chain: `receiving` (`0`) or `change` (`1`)
        #[clap(default_value = "receiving")]
        chain: Chain,

        /// Number of addresses to derive; defaults to `--gap-limit`
        #[clap(short, long)]
        count: Option<u16>,
    },

    /// Mark wallet address as used
    MarkUsed {
        /// Wallet identifier
        wallet: String,

        /// Address seen in use
        address: String,
    },

    /// List stored addresses of the wallet
    List {
        /// Wallet identifier
        wallet: String,

        /// Chain: `receiving` (`0`) or `change` (`1`)
        #[clap(default_value = "receiving")]
        chain: Chain,

        /// Show only used addresses
        #[clap(long, conflicts_with = "unused")]
        used: bool,

        /// Show only unused addresses
        #[clap(long)]
        unused: bool,

        /// Maximal number of addresses to show
        #[clap(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Display, Error, From)]
#[display(inner)]
pub enum Error {
    #[from]
    Ledger(ledger::Error),

    #[from]
    Store(StoreError),

    #[from]
    Key(slip132::Error),

    #[from]
    Address(AddressError),

    /// `{0}` is neither an extended public key nor an address
    #[display(doc_comments)]
    UnknownInput(String),
}

impl Args {
    fn config(&self) -> LedgerConfig {
        LedgerConfig {
            default_gap_limit: self.gap_limit,
            max_gap_limit: self.max_gap_limit,
            ..LedgerConfig::default()
        }
    }

    fn ledger(&self) -> Result<AddressLedger<FileStore>, Error> {
        let store = FileStore::open(&self.store)?;
        Ok(AddressLedger::with_config(store, self.config()))
    }

    pub fn exec(&self) -> Result<(), Error> {
        match &self.command {
            Command::Validate { input } => self.validate(input),
            Command::Derive {
                key,
                chain,
                index,
                address_type,
                wallet,
                no_cache,
            } => self.derive(key, *chain, *index, *address_type, wallet.as_deref(), !no_cache),
            Command::Next { key, wallet, chain } => {
                let resolved = self.ledger()?.get_next_unused_address(
                    key,
                    &WalletId::from(wallet.as_str()),
                    *chain,
                    self.network,
                )?;
                println!("{}", resolved);
                Ok(())
            }
            Command::Prederive {
                key,
                wallet,
                chain,
                count,
            } => {
                let batch = self.ledger()?.pre_derive_addresses(
                    key,
                    &WalletId::from(wallet.as_str()),
                    *chain,
                    *count,
                    self.network,
                )?;
                for view in &batch {
                    println!("{}", view);
                }
                eprintln!("{} {} addresses", "Derived".bright_green(), batch.len());
                Ok(())
            }
            Command::MarkUsed { wallet, address } => {
                self.ledger()?
                    .mark_address_used(&WalletId::from(wallet.as_str()), address)?;
                eprintln!("{} {} as used", "Marked".bright_green(), address);
                Ok(())
            }
            Command::List {
                wallet,
                chain,
                used,
                unused,
                limit,
            } => {
                let mut filter = AddressFilter::all();
                if *used {
                    filter = filter.used(true);
                } else if *unused {
                    filter = filter.used(false);
                }
                if let Some(limit) = limit {
                    filter = filter.limit(*limit);
                }
                let records = self.ledger()?.list_addresses(
                    &WalletId::from(wallet.as_str()),
                    *chain,
                    &filter,
                )?;
                for record in records {
                    let mark = if record.is_used { "used".yellow() } else { "unused".green() };
                    println!(
                        "{}\t{}\t{}\t{}",
                        record.derivation_path, record.address, record.address_type, mark
                    );
                }
                Ok(())
            }
        }
    }

    fn validate(&self, input: &str) -> Result<(), Error> {
        match detect_kind(input) {
            Some(InputKind::ExtendedKey) => {
                let info = validate_extended_key(input.trim())?;
                println!("{} {}", "Valid".bright_green(), info.prefix);
                println!("  network:            {}", info.network());
                println!("  address type:       {}", AddressType::from(info.application()));
                println!("  depth:              {}", info.depth());
                println!("  fingerprint:        {}", info.fingerprint());
                println!("  parent fingerprint: {}", info.parent_fingerprint());
                println!("  child number:       {}", info.child_number());
            }
            Some(InputKind::Address) => {
                let info = validate_address(input, self.network)?;
                println!("{} address", "Valid".bright_green());
                println!("  network:            {}", info.network);
                println!("  address type:       {}", info.address_type);
            }
            None => return Err(Error::UnknownInput(input.to_owned())),
        }
        Ok(())
    }

    fn derive(
        &self,
        key: &str,
        chain: Chain,
        index: UnhardenedIndex,
        address_type: Option<AddressType>,
        wallet: Option<&str>,
        use_cache: bool,
    ) -> Result<(), Error> {
        match (wallet, address_type) {
            (Some(wallet), _) => {
                let resolved = self.ledger()?.get_or_derive_address(
                    key,
                    &WalletId::from(wallet),
                    chain,
                    index,
                    self.network,
                    use_cache,
                )?;
                println!("{}", resolved);
            }
            (None, address_type) => {
                // pure derivation never touches the store file
                let ledger = AddressLedger::with_config(ledger::MemoryStore::new(), self.config());
                let view = match address_type {
                    Some(address_type) => {
                        ledger.derive_as(key, chain, index, self.network, address_type)?
                    }
                    None => ledger.derive(key, chain, index, self.network)?,
                };
                println!("{}", view);
            }
        }
        Ok(())
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Err(err) = args.exec() {
        eprintln!("{}: {}\n", "Error".bright_red(), err);
        process::exit(1);
    }
}
