use std::collections::HashSet;

use tracing::{debug, info};

use super::{Chain, CoinEngine, HashSigner};
use crate::{
    Error, Result,
    bitcoin::{
        Address, ClaimScript, Network, OutPoint, TransactionBuilder, TxOut, UnspentOutput,
        compressed_public_key, scan, select, total,
    },
};

/// Pay-to-public-key-hash wallet on a Bitcoin-family network
#[derive(Debug, Clone)]
pub struct BitcoinEngine {
    network: Network,
    public_key: [u8; 33],
    address: Address,
    unspent: Vec<UnspentOutput>,
    claim_script: ClaimScript,
}

impl BitcoinEngine {
    /// Engine for the wallet owning `public_key`
    pub fn new(network: Network, public_key: &[u8]) -> Result<Self> {
        let public_key = compressed_public_key(public_key)?;
        let address = Address::from_public_key(&public_key, network)?;
        Ok(Self {
            network,
            public_key,
            address,
            unspent: Vec::new(),
            claim_script: ClaimScript::default(),
        })
    }

    /// Choose where legacy preimages take the claim script from
    pub const fn with_claim_script(mut self, claim_script: ClaimScript) -> Self {
        self.claim_script = claim_script;
        self
    }

    /// Network
    pub const fn network(&self) -> Network {
        self.network
    }

    /// Wallet address
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Outputs the wallet can spend
    pub fn unspent(&self) -> &[UnspentOutput] {
        &self.unspent
    }

    /// Add outputs fetched elsewhere, skipping ones already known
    pub fn add_unspent(&mut self, outputs: impl IntoIterator<Item = UnspentOutput>) {
        let mut known: HashSet<OutPoint> = self.unspent.iter().map(|o| o.outpoint).collect();
        for output in outputs {
            if known.insert(output.outpoint) {
                self.unspent.push(output);
            }
        }
    }

    /// Scan raw transactions for outputs paying the wallet
    ///
    /// Returns the number of new outputs.
    pub fn add_transactions<T: AsRef<[u8]>>(&mut self, raw_transactions: &[T]) -> Result<usize> {
        let found = scan(raw_transactions, &self.address.script_pubkey())?;
        let before = self.unspent.len();
        self.add_unspent(found);
        Ok(self.unspent.len() - before)
    }

    fn value(amount: u128) -> Result<u64> {
        u64::try_from(amount).map_err(|_| Error::AmountOutOfRange(amount))
    }
}

impl CoinEngine for BitcoinEngine {
    fn chain(&self) -> Chain {
        self.network.into()
    }

    fn validate_address(&self, address: &str) -> Result<()> {
        Address::decode_for(address, self.network).map(|_| ())
    }

    fn derive_address(&self, public_key: &[u8]) -> Result<String> {
        let public_key = compressed_public_key(public_key)?;
        Ok(Address::from_public_key(&public_key, self.network)?.to_string())
    }

    fn balance(&self) -> u128 {
        total(&self.unspent)
    }

    fn select_outputs(&self, target: u128) -> Result<u128> {
        let selected = select(&self.unspent, target)?;
        Ok(selected
            .into_iter()
            .map(|index| u128::from(self.unspent[index].value))
            .sum())
    }

    fn sign(
        &mut self,
        signer: &mut dyn HashSigner,
        amount: u128,
        fee: u128,
        include_fee: bool,
        recipient: &str,
    ) -> Result<Vec<u8>> {
        let recipient = Address::decode_for(recipient, self.network)?;
        let target = if include_fee {
            amount
        } else {
            amount.saturating_add(fee)
        };

        let selected = select(&self.unspent, target)?;
        let inputs: Vec<UnspentOutput> = selected
            .iter()
            .map(|index| self.unspent[*index].clone())
            .collect();
        let spend = self.compute_change_and_fee(total(&inputs), amount, fee, include_fee)?;

        let mut outputs = vec![TxOut {
            value: Self::value(spend.amount)?,
            script_pubkey: recipient.script_pubkey(),
        }];
        if spend.change > 0 {
            outputs.push(TxOut {
                value: Self::value(spend.change)?,
                script_pubkey: self.address.script_pubkey(),
            });
        }

        let mut builder =
            TransactionBuilder::new(self.network, inputs, outputs).with_claim_script(self.claim_script);
        let hashes = builder.sighashes();
        debug!(inputs = hashes.len(), chain = %self.chain(), "Signing inputs");

        let signatures = signer.sign_hashes(&hashes)?;
        builder.attach_signatures(&signatures, &self.public_key)?;
        let raw = builder.build()?;

        let spent: HashSet<OutPoint> = builder.inputs().iter().map(|o| o.outpoint).collect();
        self.unspent.retain(|output| !spent.contains(&output.outpoint));
        info!(
            amount = spend.amount,
            fee = spend.fee,
            change = spend.change,
            size = raw.len(),
            "Transaction signed"
        );
        Ok(raw)
    }
}
