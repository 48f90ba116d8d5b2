//! Helpers shared by the command handlers

pub(crate) mod display;

use eyre::WrapErr;

/// Decode a hex argument, with or without a `0x` prefix
pub(crate) fn parse_hex(input: &str) -> eyre::Result<Vec<u8>> {
    let digits = input.trim().trim_start_matches("0x");
    hex::decode(digits).wrap_err_with(|| format!("invalid hex: {input}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x01ff").unwrap(), vec![0x01, 0xFF]);
        assert_eq!(parse_hex(" 01ff ").unwrap(), vec![0x01, 0xFF]);
        assert!(parse_hex("0x1").is_err());
    }
}
