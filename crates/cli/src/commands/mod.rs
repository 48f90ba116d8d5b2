//! Subcommands and their handlers

mod chain;
mod codec;

pub(crate) use chain::{address_command, erc20_command, plan_command, script_command};
pub(crate) use codec::{protocol_key_command, tlv_command};

use clap::Subcommand;
use tapsign_wallet::Chain;

/// Define subcommands for the CLI
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Decode a TLV body or a full card response
    Tlv {
        /// Bytes to decode, as a hex string
        #[arg(required = true)]
        data: String,

        /// Treat the last two bytes as a status word
        #[arg(long)]
        response: bool,
    },

    /// Derive the key that protects session establishment
    ProtocolKey {
        /// Device identifier of the card, as a hex string
        #[arg(required = true)]
        identifier: String,

        /// PIN (defaults to the configured default PIN)
        #[arg(long)]
        pin: Option<String>,
    },

    /// Derive the address owned by a wallet public key
    Address {
        /// SEC1 public key, compressed or not, as a hex string
        #[arg(required = true)]
        public_key: String,

        /// Chain (defaults to the configured chain)
        #[arg(long)]
        chain: Option<Chain>,
    },

    /// Print the output script paying a Base58Check address
    Script {
        /// Address
        #[arg(required = true)]
        address: String,
    },

    /// Work out inputs, amount and change for a spend
    Plan {
        /// Value of a spendable output; repeat for every output
        #[arg(long = "utxo", required = true)]
        utxos: Vec<u64>,

        /// Amount to send
        #[arg(long)]
        amount: u128,

        /// Fee
        #[arg(long)]
        fee: u128,

        /// Take the fee out of the amount
        #[arg(long)]
        include_fee: bool,
    },

    /// Build ERC-20 `transfer` call data
    Erc20 {
        /// Recipient address
        #[arg(required = true)]
        to: String,

        /// Amount in token base units
        #[arg(required = true)]
        amount: u128,
    },
}
