//! Per-chain signing engines
//!
//! Every chain exposes the same [`CoinEngine`] surface. Engines build the
//! chain's digests, hand them to a [`HashSigner`] (normally the card) and
//! assemble the broadcastable transaction from the signatures.

mod account;
mod bitcoin;

pub use account::{Account, ERC20_GAS_LIMIT, EthereumEngine, TRANSFER_GAS_LIMIT, TokenEngine};
pub use bitcoin::BitcoinEngine;

use std::str::FromStr;

use k256::ecdsa::Signature;
use serde::{Deserialize, Serialize};
use tapsign_card::{CardNotifier, CardProtocol, CardRecord, apdu::CardTransport};

use crate::{Error, Result, bitcoin::Network};

/// Chain an engine signs for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    /// Bitcoin mainnet
    #[display("bitcoin")]
    Bitcoin,
    /// Bitcoin testnet
    #[display("bitcoin-testnet")]
    BitcoinTestnet,
    /// Bitcoin Cash
    #[display("bitcoin-cash")]
    BitcoinCash,
    /// Ether transfers
    #[display("ethereum")]
    Ethereum,
    /// ERC-20 token transfers
    #[display("erc20")]
    Erc20,
}

impl Chain {
    /// Chain named in a card's blockchain name record
    ///
    /// Token cards carry the host chain's name, so a card with a token
    /// contract is always [`Chain::Erc20`].
    pub fn from_card(card: &CardRecord) -> Option<Self> {
        let data = card.card_data.as_ref()?;
        if data.token_contract_address.is_some() {
            return Some(Self::Erc20);
        }
        match data.blockchain_name.as_deref()? {
            "BTC" | "BTC/main" => Some(Self::Bitcoin),
            "BTC/test" => Some(Self::BitcoinTestnet),
            "BCH" | "BCH/main" => Some(Self::BitcoinCash),
            "ETH" | "ETH/main" => Some(Self::Ethereum),
            _ => None,
        }
    }

    /// Bitcoin-family network, if the chain is one
    pub const fn network(self) -> Option<Network> {
        match self {
            Self::Bitcoin => Some(Network::Bitcoin),
            Self::BitcoinTestnet => Some(Network::BitcoinTestnet),
            Self::BitcoinCash => Some(Network::BitcoinCash),
            Self::Ethereum | Self::Erc20 => None,
        }
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        [
            Self::Bitcoin,
            Self::BitcoinTestnet,
            Self::BitcoinCash,
            Self::Ethereum,
            Self::Erc20,
        ]
        .into_iter()
        .find(|chain| chain.to_string() == name)
        .ok_or_else(|| Error::UnsupportedChain(name.to_string()))
    }
}

impl From<Network> for Chain {
    fn from(network: Network) -> Self {
        match network {
            Network::Bitcoin => Self::Bitcoin,
            Network::BitcoinTestnet => Self::BitcoinTestnet,
            Network::BitcoinCash => Self::BitcoinCash,
        }
    }
}

/// How a spend splits the wallet balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spend {
    /// Amount the recipient receives
    pub amount: u128,
    /// Fee paid
    pub fee: u128,
    /// Amount returned to the wallet
    pub change: u128,
}

/// Split `balance` into the amount sent, the fee and the change
///
/// With `include_fee` the fee is taken out of `amount`; otherwise it is paid
/// on top of it.
pub fn compute_change_and_fee(
    balance: u128,
    amount: u128,
    fee: u128,
    include_fee: bool,
) -> Result<Spend> {
    let (sent, required) = if include_fee {
        if fee > amount {
            return Err(Error::FeeExceedsAmount { amount, fee });
        }
        (amount - fee, amount)
    } else {
        let required = amount
            .checked_add(fee)
            .ok_or(Error::AmountOutOfRange(amount))?;
        (amount, required)
    };

    if required > balance {
        return Err(Error::InsufficientFunds { balance, required });
    }

    Ok(Spend {
        amount: sent,
        fee,
        change: balance - required,
    })
}

/// Something that signs 32 byte digests with the wallet key
///
/// Signatures come back in input order and low-S normalized.
pub trait HashSigner {
    /// Sign every digest in `hashes`
    fn sign_hashes(&mut self, hashes: &[[u8; 32]]) -> Result<Vec<Signature>, tapsign_card::Error>;
}

impl<T: CardTransport, N: CardNotifier> HashSigner for CardProtocol<T, N> {
    fn sign_hashes(&mut self, hashes: &[[u8; 32]]) -> Result<Vec<Signature>, tapsign_card::Error> {
        Self::sign_hashes(self, hashes)
    }
}

/// Signing surface shared by every chain
pub trait CoinEngine {
    /// Chain the engine signs for
    fn chain(&self) -> Chain;

    /// Check that `address` is a valid recipient on this chain
    fn validate_address(&self, address: &str) -> Result<()>;

    /// Address owned by `public_key` on this chain
    fn derive_address(&self, public_key: &[u8]) -> Result<String>;

    /// Spendable balance in the chain's smallest unit
    fn balance(&self) -> u128;

    /// Value available to cover `target`, failing when the balance cannot
    fn select_outputs(&self, target: u128) -> Result<u128>;

    /// Split a balance into amount, fee and change
    fn compute_change_and_fee(
        &self,
        balance: u128,
        amount: u128,
        fee: u128,
        include_fee: bool,
    ) -> Result<Spend> {
        compute_change_and_fee(balance, amount, fee, include_fee)
    }

    /// Build, sign and assemble a transfer of `amount` to `recipient`
    fn sign(
        &mut self,
        signer: &mut dyn HashSigner,
        amount: u128,
        fee: u128,
        include_fee: bool,
        recipient: &str,
    ) -> Result<Vec<u8>>;
}

/// Engine for the chain a card was issued for, keyed to its wallet
///
/// Account engines start with a zero balance and nonce; the caller fills them
/// in from the network.
pub fn engine_for_card(card: &CardRecord) -> Result<Box<dyn CoinEngine>> {
    let public_key = card
        .wallet_public_key
        .as_ref()
        .ok_or(tapsign_card::Error::WalletNotCreated)?;
    let chain = Chain::from_card(card).ok_or_else(|| {
        Error::UnsupportedChain(
            card.card_data
                .as_ref()
                .and_then(|data| data.blockchain_name.clone())
                .unwrap_or_default(),
        )
    })?;

    if let Some(network) = chain.network() {
        return Ok(Box::new(BitcoinEngine::new(network, public_key)?));
    }

    let account = Account::new(public_key)?;
    let token = card
        .card_data
        .as_ref()
        .filter(|_| chain == Chain::Erc20)
        .and_then(|data| data.token_contract_address.as_deref().map(|contract| (data, contract)));
    match token {
        Some((data, contract)) => {
            let contract = crate::ethereum::validate_address(contract)?;
            Ok(Box::new(
                TokenEngine::new(account, contract)
                    .with_symbol(data.token_symbol.clone().unwrap_or_default())
                    .with_decimals(data.token_decimals.unwrap_or(18)),
            ))
        }
        None => Ok(Box::new(EthereumEngine::new(account))),
    }
}
