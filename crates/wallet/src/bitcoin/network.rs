use serde::{Deserialize, Serialize};

/// Sighash type for legacy signing, SIGHASH_ALL
pub const SIGHASH_ALL: u8 = 0x01;

/// Sighash type for cash-fork signing, SIGHASH_ALL | SIGHASH_FORKID
pub const SIGHASH_ALL_FORKID: u8 = 0x41;

/// A Bitcoin-family network
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    /// Bitcoin mainnet
    #[display("bitcoin")]
    Bitcoin,
    /// Bitcoin testnet
    #[display("bitcoin-testnet")]
    BitcoinTestnet,
    /// Bitcoin Cash, legacy address format
    #[display("bitcoin-cash")]
    BitcoinCash,
}

/// How the network computes signature hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashScheme {
    /// Original per-input serialization
    Legacy,
    /// BIP143 digest with the fork id bit
    Bip143ForkId,
}

impl Network {
    /// Version byte of P2PKH addresses
    pub const fn p2pkh_version(self) -> u8 {
        match self {
            Self::Bitcoin | Self::BitcoinCash => 0x00,
            Self::BitcoinTestnet => 0x6F,
        }
    }

    /// Version byte of P2SH addresses
    pub const fn p2sh_version(self) -> u8 {
        match self {
            Self::Bitcoin | Self::BitcoinCash => 0x05,
            Self::BitcoinTestnet => 0xC4,
        }
    }

    /// Signature hash algorithm
    pub const fn sighash_scheme(self) -> SighashScheme {
        match self {
            Self::BitcoinCash => SighashScheme::Bip143ForkId,
            Self::Bitcoin | Self::BitcoinTestnet => SighashScheme::Legacy,
        }
    }

    /// Sighash type byte appended to signatures
    pub const fn sighash_type(self) -> u8 {
        match self.sighash_scheme() {
            SighashScheme::Legacy => SIGHASH_ALL,
            SighashScheme::Bip143ForkId => SIGHASH_ALL_FORKID,
        }
    }
}
