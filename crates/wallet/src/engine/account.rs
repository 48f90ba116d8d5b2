//! Account-model engines: Ether and ERC-20 transfers

use alloy_primitives::{Address, Bytes, U256};
use k256::ecdsa::VerifyingKey;
use tracing::{debug, info};

use super::{Chain, CoinEngine, HashSigner, Spend};
use crate::{
    Error, Result,
    ethereum::{LegacyTransaction, derive_address, recovery_id, transfer_data, validate_address},
};

/// Gas limit of a plain value transfer
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Gas limit used for token transfers
pub const ERC20_GAS_LIMIT: u64 = 60_000;

/// Ethereum mainnet
const MAINNET_CHAIN_ID: u64 = 1;

/// State of an externally owned account
///
/// Nonce and balance come from the network; the engines only advance the
/// nonce after signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Chain id for replay protection
    pub chain_id: u64,
    /// Next nonce to use
    pub nonce: u64,
    /// Ether balance in wei
    pub balance: u128,
    public_key: VerifyingKey,
    address: Address,
}

impl Account {
    /// Mainnet account owned by `public_key`, with zero nonce and balance
    pub fn new(public_key: &[u8]) -> Result<Self> {
        let key = VerifyingKey::from_sec1_bytes(public_key).map_err(|_| Error::InvalidPublicKey)?;
        Ok(Self {
            chain_id: MAINNET_CHAIN_ID,
            nonce: 0,
            balance: 0,
            address: derive_address(public_key)?,
            public_key: key,
        })
    }

    /// Set the chain id
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Set the next nonce
    pub const fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set the ether balance
    pub const fn with_balance(mut self, balance: u128) -> Self {
        self.balance = balance;
        self
    }

    /// Account address
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Gas price that spends `fee` over `gas_limit`
    ///
    /// Rounds down; a fee that rounds to a zero price is rejected.
    fn gas_price(fee: u128, gas_limit: u64) -> Result<u128> {
        match fee / u128::from(gas_limit.max(1)) {
            0 => Err(Error::FeeTooLow { fee, gas_limit }),
            gas_price => Ok(gas_price),
        }
    }

    /// Sign `tx` with `signer` and advance the nonce
    fn sign(&mut self, signer: &mut dyn HashSigner, tx: &LegacyTransaction) -> Result<Vec<u8>> {
        let hash = tx.signature_hash();
        let signatures = signer.sign_hashes(&[hash.0])?;
        let [signature] = signatures.as_slice() else {
            return Err(Error::SignatureCount {
                expected: 1,
                found: signatures.len(),
            });
        };

        let recovery_id = recovery_id(&hash, signature, &self.public_key)?;
        let raw = tx.encode_signed(signature, recovery_id);
        self.nonce += 1;
        Ok(raw)
    }
}

/// Native Ether transfers
#[derive(Debug, Clone)]
pub struct EthereumEngine {
    account: Account,
    gas_limit: u64,
}

impl EthereumEngine {
    /// Engine for `account`
    pub const fn new(account: Account) -> Self {
        Self {
            account,
            gas_limit: TRANSFER_GAS_LIMIT,
        }
    }

    /// Set the gas limit
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Account state
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Mutable account state, for refreshing nonce and balance
    pub fn account_mut(&mut self) -> &mut Account {
        &mut self.account
    }
}

impl CoinEngine for EthereumEngine {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    fn validate_address(&self, address: &str) -> Result<()> {
        validate_address(address).map(|_| ())
    }

    fn derive_address(&self, public_key: &[u8]) -> Result<String> {
        Ok(derive_address(public_key)?.to_checksum(None))
    }

    fn balance(&self) -> u128 {
        self.account.balance
    }

    fn select_outputs(&self, target: u128) -> Result<u128> {
        select_balance(self.balance(), target)
    }

    fn sign(
        &mut self,
        signer: &mut dyn HashSigner,
        amount: u128,
        fee: u128,
        include_fee: bool,
        recipient: &str,
    ) -> Result<Vec<u8>> {
        let to = validate_address(recipient)?;
        let Spend { amount, .. } =
            self.compute_change_and_fee(self.account.balance, amount, fee, include_fee)?;

        let tx = LegacyTransaction {
            nonce: self.account.nonce,
            gas_price: Account::gas_price(fee, self.gas_limit)?,
            gas_limit: self.gas_limit,
            to,
            value: U256::from(amount),
            input: Bytes::new(),
            chain_id: self.account.chain_id,
        };
        debug!(nonce = tx.nonce, gas_price = tx.gas_price, "Signing transfer");

        let raw = self.account.sign(signer, &tx)?;
        info!(%to, amount, "Transfer signed");
        Ok(raw)
    }
}

/// ERC-20 token transfers
///
/// Amounts are in token base units. The fee is paid in Ether from the
/// account balance and never taken out of the token amount.
#[derive(Debug, Clone)]
pub struct TokenEngine {
    account: Account,
    contract: Address,
    symbol: String,
    decimals: u8,
    token_balance: u128,
    gas_limit: u64,
}

impl TokenEngine {
    /// Engine for the token at `contract`
    pub fn new(account: Account, contract: Address) -> Self {
        Self {
            account,
            contract,
            symbol: String::new(),
            decimals: 18,
            token_balance: 0,
            gas_limit: ERC20_GAS_LIMIT,
        }
    }

    /// Set the token symbol
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// Set the token decimals
    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    /// Set the token balance
    pub fn with_token_balance(mut self, balance: u128) -> Self {
        self.token_balance = balance;
        self
    }

    /// Set the gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Token contract
    pub const fn contract(&self) -> Address {
        self.contract
    }

    /// Token symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Token decimals
    pub const fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Account state
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Mutable account state, for refreshing nonce and balance
    pub fn account_mut(&mut self) -> &mut Account {
        &mut self.account
    }
}

impl CoinEngine for TokenEngine {
    fn chain(&self) -> Chain {
        Chain::Erc20
    }

    fn validate_address(&self, address: &str) -> Result<()> {
        validate_address(address).map(|_| ())
    }

    fn derive_address(&self, public_key: &[u8]) -> Result<String> {
        Ok(derive_address(public_key)?.to_checksum(None))
    }

    fn balance(&self) -> u128 {
        self.token_balance
    }

    fn select_outputs(&self, target: u128) -> Result<u128> {
        select_balance(self.token_balance, target)
    }

    fn sign(
        &mut self,
        signer: &mut dyn HashSigner,
        amount: u128,
        fee: u128,
        _include_fee: bool,
        recipient: &str,
    ) -> Result<Vec<u8>> {
        let to = validate_address(recipient)?;
        self.compute_change_and_fee(self.token_balance, amount, 0, false)?;
        if fee > self.account.balance {
            return Err(Error::InsufficientFunds {
                balance: self.account.balance,
                required: fee,
            });
        }

        let tx = LegacyTransaction {
            nonce: self.account.nonce,
            gas_price: Account::gas_price(fee, self.gas_limit)?,
            gas_limit: self.gas_limit,
            to: self.contract,
            value: U256::ZERO,
            input: transfer_data(to, U256::from(amount)),
            chain_id: self.account.chain_id,
        };
        debug!(nonce = tx.nonce, contract = %self.contract, "Signing token transfer");

        let raw = self.account.sign(signer, &tx)?;
        info!(%to, amount, symbol = %self.symbol, "Token transfer signed");
        Ok(raw)
    }
}

fn select_balance(balance: u128, target: u128) -> Result<u128> {
    if target > balance {
        return Err(Error::InsufficientFunds {
            balance,
            required: target,
        });
    }
    Ok(balance)
}
