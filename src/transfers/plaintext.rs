//! Parsing for plain-text `Transfer <amount> from <account> to <account>` logs.
//!
//! The canonical wrapped-native-token contract never emits a structured
//! `EVENT_JSON` envelope for `ft_transfer` — only this plain-text line — so
//! this pattern has to be recognised alongside the standards-style event
//! parser in [`super::ft`].

use once_cell::sync::Lazy;
use regex::Regex;

static TRANSFER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Transfer (\d+) from ([\w.\-]+) to ([\w.\-]+)$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaintextTransfer {
    pub amount: String,
    pub from: String,
    pub to: String,
}

/// Parse one log line. Returns `None` for anything that isn't an exact
/// match of the case-sensitive, whitespace-separated pattern.
pub fn parse(log: &str) -> Option<PlaintextTransfer> {
    let caps = TRANSFER_LINE.captures(log.trim())?;
    Some(PlaintextTransfer {
        amount: caps[1].to_string(),
        from: caps[2].to_string(),
        to: caps[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let t = parse("Transfer 1000000000000000000000000 from alice.near to bob.near").unwrap();
        assert_eq!(t.amount, "1000000000000000000000000");
        assert_eq!(t.from, "alice.near");
        assert_eq!(t.to, "bob.near");
    }

    #[test]
    fn rejects_wrong_case() {
        assert!(parse("transfer 5 from alice.near to bob.near").is_none());
    }

    #[test]
    fn rejects_unrelated_log() {
        assert!(parse("EVENT_JSON:{\"standard\":\"nep141\"}").is_none());
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let t = parse("  Transfer 5 from a.near to b.near  ").unwrap();
        assert_eq!(t.amount, "5");
    }
}
