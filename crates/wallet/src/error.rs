use crate::engine::Chain;

/// Result type for transaction construction
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type for transaction construction and signing
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Card protocol errors, passed through unchanged
    #[error(transparent)]
    Card(#[from] tapsign_card::Error),

    /// The spend needs more than the wallet holds
    #[error("Insufficient funds: need {required}, have {balance}")]
    InsufficientFunds {
        /// Spendable balance
        balance: u128,
        /// Amount plus fee that was asked for
        required: u128,
    },

    /// The fee is larger than the amount it is deducted from
    #[error("Fee {fee} exceeds amount {amount}")]
    FeeExceedsAmount {
        /// Amount to send, fee included
        amount: u128,
        /// Fee
        fee: u128,
    },

    /// The fee spread over the gas limit rounds down to a zero gas price
    #[error("Fee {fee} is below the gas limit {gas_limit}")]
    FeeTooLow {
        /// Fee asked for, in wei
        fee: u128,
        /// Gas limit it is spread over
        gas_limit: u64,
    },

    /// The address version byte does not select a known script template
    #[error("Unknown address type {version:#04x} for {address}")]
    UnknownAddressType {
        /// Address as given
        address: String,
        /// Version byte found
        version: u8,
    },

    /// Base58Check checksum mismatch
    #[error("Bad checksum in address {address}")]
    BadChecksum {
        /// Address as given
        address: String,
    },

    /// The address cannot be decoded at all
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress {
        /// Address as given
        address: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// The address is valid but belongs to another chain
    #[error("Address {address} is not a {chain} address")]
    WrongNetwork {
        /// Address as given
        address: String,
        /// Chain the engine signs for
        chain: Chain,
    },

    /// Public key bytes are not a secp256k1 point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// A raw transaction could not be parsed
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(&'static str),

    /// The signer returned a different number of signatures than hashes
    #[error("Expected {expected} signatures, got {found}")]
    SignatureCount {
        /// Hashes sent
        expected: usize,
        /// Signatures returned
        found: usize,
    },

    /// An input has no signature attached
    #[error("Input {0} is not signed")]
    MissingSignature(usize),

    /// Neither recovery id yields the wallet key
    #[error("Signature does not recover to the wallet key")]
    RecoveryFailed,

    /// No engine exists for the chain a card was issued for
    #[error("Unsupported chain {0:?}")]
    UnsupportedChain(String),

    /// An amount does not fit the chain's value type
    #[error("Amount {0} out of range")]
    AmountOutOfRange(u128),
}
