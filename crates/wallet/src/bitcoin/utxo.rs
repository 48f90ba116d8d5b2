//! Unspent outputs owned by the wallet

use std::collections::HashSet;

use tracing::debug;

use super::transaction::{OutPoint, Transaction};
use crate::{Error, Result};

/// An output the wallet can spend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    /// Where the output lives
    pub outpoint: OutPoint,
    /// Value in satoshi
    pub value: u64,
    /// Script the output pays to
    pub script_pubkey: Vec<u8>,
    /// Script embedded in the legacy preimage when this output is spent
    pub claim_script: Vec<u8>,
    /// Input script, once signed
    pub signature_script: Option<Vec<u8>>,
}

impl UnspentOutput {
    /// Unsigned output paying to `script_pubkey`
    pub fn new(outpoint: OutPoint, value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            outpoint,
            value,
            claim_script: script_pubkey.clone(),
            script_pubkey,
            signature_script: None,
        }
    }
}

/// Find outputs paying to `wallet_script` that no scanned transaction spends
pub fn scan<T: AsRef<[u8]>>(
    raw_transactions: &[T],
    wallet_script: &[u8],
) -> Result<Vec<UnspentOutput>> {
    let transactions = raw_transactions
        .iter()
        .map(|raw| Transaction::parse(raw.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let spent: HashSet<OutPoint> = transactions
        .iter()
        .flat_map(|tx| tx.inputs.iter().map(|input| input.previous_output))
        .collect();

    let mut unspent = Vec::new();
    for tx in &transactions {
        let txid = tx.txid();
        for (vout, output) in tx.outputs.iter().enumerate() {
            if output.script_pubkey != wallet_script {
                continue;
            }
            let outpoint = OutPoint {
                txid,
                vout: vout as u32,
            };
            if spent.contains(&outpoint) {
                continue;
            }
            unspent.push(UnspentOutput::new(
                outpoint,
                output.value,
                output.script_pubkey.clone(),
            ));
        }
    }

    debug!(
        transactions = transactions.len(),
        unspent = unspent.len(),
        "Scanned for wallet outputs"
    );
    Ok(unspent)
}

/// Total value of `outputs`
pub fn total(outputs: &[UnspentOutput]) -> u128 {
    outputs.iter().map(|output| u128::from(output.value)).sum()
}

/// Pick outputs, largest first, until `target` is covered
///
/// Returns the indices of the chosen outputs in `outputs`.
pub fn select(outputs: &[UnspentOutput], target: u128) -> Result<Vec<usize>> {
    let mut order: Vec<usize> = (0..outputs.len()).collect();
    order.sort_by(|a, b| outputs[*b].value.cmp(&outputs[*a].value));

    let mut selected = Vec::new();
    let mut covered = 0u128;
    for index in order {
        if covered >= target && !selected.is_empty() {
            break;
        }
        covered += u128::from(outputs[index].value);
        selected.push(index);
    }

    if covered < target || selected.is_empty() {
        return Err(Error::InsufficientFunds {
            balance: total(outputs),
            required: target,
        });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::transaction::{SEQUENCE_FINAL, TxIn, TxOut};

    fn output(value: u64) -> UnspentOutput {
        UnspentOutput::new(
            OutPoint {
                txid: [value as u8; 32],
                vout: 0,
            },
            value,
            vec![0x51],
        )
    }

    #[test]
    fn test_select_largest_first() {
        let outputs = [output(50_000), output(100_000), output(10_000)];
        assert_eq!(select(&outputs, 90_000).unwrap(), vec![1]);
        assert_eq!(select(&outputs, 121_000).unwrap(), vec![1, 0]);
        assert!(matches!(
            select(&outputs, 200_000),
            Err(Error::InsufficientFunds {
                balance: 160_000,
                required: 200_000
            })
        ));
    }

    #[test]
    fn test_scan_skips_spent_and_foreign() {
        let wallet = vec![0x76, 0xA9];
        let funding = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint {
                    txid: [0xEE; 32],
                    vout: 0,
                },
                script_sig: Vec::new(),
                sequence: SEQUENCE_FINAL,
                witness: Vec::new(),
            }],
            outputs: vec![
                TxOut {
                    value: 100_000,
                    script_pubkey: wallet.clone(),
                },
                TxOut {
                    value: 7,
                    script_pubkey: vec![0x00],
                },
                TxOut {
                    value: 50_000,
                    script_pubkey: wallet.clone(),
                },
            ],
            lock_time: 0,
        };
        let spending = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint {
                    txid: funding.txid(),
                    vout: 2,
                },
                script_sig: vec![0x00],
                sequence: SEQUENCE_FINAL,
                witness: Vec::new(),
            }],
            outputs: vec![TxOut {
                value: 49_000,
                script_pubkey: vec![0x00],
            }],
            lock_time: 0,
        };

        let unspent = scan(&[funding.serialize(), spending.serialize()], &wallet).unwrap();
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].value, 100_000);
        assert_eq!(unspent[0].outpoint.vout, 0);
        assert_eq!(unspent[0].outpoint.txid, funding.txid());
    }
}
