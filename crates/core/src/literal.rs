//! Parsing of integer literals as a disassembler renders them.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;

static HEX_PREFIXED: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?P<sign>[-+])?0[xX](?P<number>[0-9A-Fa-f]+)(?P<suffix>u|i64|ui64)?$").ok()
});

static SUFFIXED: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?P<sign>[-+])?(?P<number>[0-9A-Fa-f]+?)(?P<suffix>b|o|h|u|i64|ui64)?$").ok()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("failed to parse the value {0:?}")]
    Malformed(String),

    #[error("failed to parse the value {text:?} with a radix of {radix}")]
    OutOfRange { text: String, radix: u32 },
}

/// Parse a highlighted integer literal.
///
/// Accepts an optional sign, a `0x` prefix, a leading `0` for octal and the
/// suffixes `h`, `b`, `o`, `u`, `i64` and `ui64`. Negative values wrap to
/// two's complement in 64 bits.
pub fn parse_integer_literal(text: &str) -> Result<u64, LiteralError> {
    let text = text.trim();
    let malformed = || LiteralError::Malformed(text.to_string());

    let (negative, number, radix) = if let Some(caps) = HEX_PREFIXED
        .as_ref()
        .and_then(|re| re.captures(text))
    {
        let negative = caps.name("sign").map(|m| m.as_str()) == Some("-");
        let number = caps.name("number").ok_or_else(malformed)?.as_str();
        (negative, number, 16)
    } else if let Some(caps) = SUFFIXED.as_ref().and_then(|re| re.captures(text)) {
        let negative = caps.name("sign").map(|m| m.as_str()) == Some("-");
        let number = caps.name("number").ok_or_else(malformed)?.as_str();
        let radix = match caps.name("suffix").map(|m| m.as_str()) {
            Some("b") => 2,
            Some("o") => 8,
            Some("h") => 16,
            _ if number.len() > 1 && number.starts_with('0') => 8,
            _ => 10,
        };
        (negative, number, radix)
    } else {
        return Err(malformed());
    };

    let magnitude = u64::from_str_radix(number, radix).map_err(|_| LiteralError::OutOfRange {
        text: text.to_string(),
        radix,
    })?;

    Ok(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}
