//! Addresses, scripts and spend planning

use alloy_primitives::U256;
use tapsign_wallet::{
    BitcoinEngine, Chain, CoinEngine, EthereumEngine,
    bitcoin::{OutPoint, UnspentOutput, derive_script, select, total},
    compute_change_and_fee,
    engine::Account,
    ethereum::{transfer_data, validate_address},
};

use crate::utils::{
    display::{key_value_box, success},
    parse_hex,
};

fn engine_for(chain: Chain, public_key: &[u8]) -> eyre::Result<Box<dyn CoinEngine>> {
    Ok(match chain.network() {
        Some(network) => Box::new(BitcoinEngine::new(network, public_key)?),
        None => Box::new(EthereumEngine::new(Account::new(public_key)?)),
    })
}

/// Print the address a public key owns on `chain`
pub(crate) fn address_command(public_key: &str, chain: Chain) -> eyre::Result<()> {
    let public_key = parse_hex(public_key)?;
    let engine = engine_for(chain, &public_key)?;
    let address = engine.derive_address(&public_key)?;
    println!(
        "{}",
        key_value_box(
            "Address",
            &[("Chain", chain.to_string()), ("Address", address)]
        )
    );
    Ok(())
}

/// Print the output script for a Base58Check address
pub(crate) fn script_command(address: &str) -> eyre::Result<()> {
    let script = derive_script(address)?;
    println!("{}", hex::encode(script));
    Ok(())
}

/// Select outputs for a spend and split them into amount, fee and change
pub(crate) fn plan_command(
    utxos: &[u64],
    amount: u128,
    fee: u128,
    include_fee: bool,
) -> eyre::Result<()> {
    let outputs: Vec<UnspentOutput> = utxos
        .iter()
        .enumerate()
        .map(|(vout, value)| {
            UnspentOutput::new(
                OutPoint {
                    txid: [0u8; 32],
                    vout: vout as u32,
                },
                *value,
                Vec::new(),
            )
        })
        .collect();

    let target = if include_fee { amount } else { amount.saturating_add(fee) };
    let selected = select(&outputs, target)?;
    let inputs: Vec<UnspentOutput> = selected.iter().map(|index| outputs[*index].clone()).collect();
    let spend = compute_change_and_fee(total(&inputs), amount, fee, include_fee)?;

    println!(
        "{}",
        key_value_box(
            "Spend",
            &[
                ("Inputs", format!("{} of {}", inputs.len(), outputs.len())),
                ("Amount", spend.amount.to_string()),
                ("Fee", spend.fee.to_string()),
                ("Change", spend.change.to_string()),
            ]
        )
    );
    println!("{}", success("Balance covers the spend"));
    Ok(())
}

/// Print ERC-20 transfer call data
pub(crate) fn erc20_command(to: &str, amount: u128) -> eyre::Result<()> {
    let to = validate_address(to)?;
    let data = transfer_data(to, U256::from(amount));
    println!("{data}");
    Ok(())
}
