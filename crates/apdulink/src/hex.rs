//! Hex helpers for command-line payloads and status codes.

use crate::exit::{CliError, CliResult, USAGE};

pub fn encode(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Decode a hex string. Whitespace and `:` separators are ignored, as is a
/// leading `0x`.
pub fn decode(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<char> = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex input has an odd number of digits: {input}"),
        ));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16);
            let lo = pair[1].to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
                _ => Err(CliError::new(
                    USAGE,
                    format!("invalid hex digit in: {input}"),
                )),
            }
        })
        .collect()
}

/// Parse a byte such as `e0`, `0xe0` or `224`.
pub fn parse_u8(input: &str) -> Result<u8, String> {
    parse_number(input, 0xff).map(|value| value as u8)
}

/// Parse a status code such as `9000`, `0x6985` or `6985`.
///
/// Status codes are hex by convention, so bare digits read as hex.
pub fn parse_status(input: &str) -> Result<u16, String> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u16::from_str_radix(body, 16).map_err(|_| format!("invalid status code: {input}"))
}

fn parse_number(input: &str, max: u32) -> Result<u32, String> {
    let trimmed = input.trim();
    let value = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse::<u32>(),
    }
    .map_err(|_| format!("invalid number: {input}"))?;

    if value > max {
        return Err(format!("{input} is out of range (max {max:#x})"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_lowercase_pairs() {
        assert_eq!(encode(&[0x00, 0xab, 0x10]), "00ab10");
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn decode_accepts_separators_and_prefix() {
        assert_eq!(decode("0xDEAD").unwrap(), vec![0xde, 0xad]);
        assert_eq!(decode("de:ad be ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(decode("abc").unwrap_err().code, USAGE);
        assert_eq!(decode("zz").unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_u8_decimal_and_hex() {
        assert_eq!(parse_u8("0xe0"), Ok(0xe0));
        assert_eq!(parse_u8("16"), Ok(16));
        assert!(parse_u8("256").is_err());
    }

    #[test]
    fn status_codes_read_as_hex() {
        assert_eq!(parse_status("9000"), Ok(0x9000));
        assert_eq!(parse_status("0x6985"), Ok(0x6985));
        assert!(parse_status("90000").is_err());
        assert!(parse_status("nope").is_err());
    }
}
