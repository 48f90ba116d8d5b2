//! Wire format helpers

use colored::Colorize;
use tapsign_apdu_core::{Response, ResponseBody, TlvList};
use tapsign_card::crypto::{derive_protocol_key, pin_hash};
use tracing::debug;

use crate::utils::{
    display::{key_value_box, section_title, warning},
    parse_hex,
};

/// Decode TLV records and print them one per line
pub(crate) fn tlv_command(data: &str, response: bool) -> eyre::Result<()> {
    let bytes = parse_hex(data)?;

    if !response {
        let tlv = TlvList::decode(&bytes)?;
        print_tlv(&tlv);
        return Ok(());
    }

    let response = Response::parse(&bytes, None)?;
    println!(
        "{}",
        key_value_box(
            "Response",
            &[(
                "Status",
                format!("{} ({})", response.status(), response.status_word())
            )]
        )
    );
    match response.body() {
        ResponseBody::Empty => println!("  (empty body)"),
        ResponseBody::Tlv(tlv) => print_tlv(tlv),
        ResponseBody::Raw { data, error } => {
            println!("{}", warning(&format!("Body is not TLV: {error}")));
            println!("  {}", hex::encode(data));
        }
    }
    Ok(())
}

fn print_tlv(tlv: &TlvList) {
    println!("{}", section_title("Records"));
    for record in tlv.iter() {
        println!(
            "  {:<28} {:>4}  {}",
            record.tag().to_string().bold(),
            record.value().len(),
            hex::encode(record.value())
        );
    }
    debug!(records = tlv.len(), "Decoded TLV");
}

/// Derive the protocol key for a PIN and device identifier
pub(crate) fn protocol_key_command(identifier: &str, pin: &str) -> eyre::Result<()> {
    let identifier = parse_hex(identifier)?;
    let key = derive_protocol_key(&pin_hash(pin), &identifier);
    println!(
        "{}",
        key_value_box(
            "Protocol key",
            &[
                ("Identifier", hex::encode(&identifier)),
                ("Key", hex::encode(key)),
            ]
        )
    );
    Ok(())
}
