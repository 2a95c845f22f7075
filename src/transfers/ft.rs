//! NEP-141 fungible token transfer extraction from execution-outcome logs.

use serde::Deserialize;

use crate::amount::Amount;
use crate::history::{Direction, TransferDetail, TransferType};

use super::plaintext;

const EVENT_PREFIX: &str = "EVENT_JSON:";

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    standard: String,
    event: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FtTransferData {
    old_owner_id: String,
    new_owner_id: String,
    amount: String,
    #[serde(default)]
    memo: Option<String>,
}

/// Scan one log line emitted by `token_contract` for an `ft_transfer` event
/// affecting `account`, recognising both the standards-style JSON envelope
/// and the plain-text fallback the wrapped-native-token contract uses.
pub fn extract_from_log(log: &str, token_contract: &str, account: &str) -> Vec<TransferDetail> {
    if let Some(rest) = log.strip_prefix(EVENT_PREFIX) {
        return extract_from_event_json(rest, token_contract, account);
    }
    if let Some(t) = plaintext::parse(log) {
        return build_transfers(
            token_contract,
            account,
            &t.from,
            &t.to,
            &t.amount,
            None,
        );
    }
    Vec::new()
}

fn extract_from_event_json(rest: &str, token_contract: &str, account: &str) -> Vec<TransferDetail> {
    let Ok(envelope) = serde_json::from_str::<EventEnvelope>(rest) else {
        return Vec::new();
    };
    if envelope.standard != "nep141" || envelope.event != "ft_transfer" {
        return Vec::new();
    }
    let Ok(legs) = serde_json::from_value::<Vec<FtTransferData>>(envelope.data) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for leg in legs {
        out.extend(build_transfers(
            token_contract,
            account,
            &leg.old_owner_id,
            &leg.new_owner_id,
            &leg.amount,
            leg.memo.as_deref(),
        ));
    }
    out
}

fn build_transfers(
    token_contract: &str,
    account: &str,
    from: &str,
    to: &str,
    amount: &str,
    memo: Option<&str>,
) -> Vec<TransferDetail> {
    let Ok(amount) = amount.parse::<Amount>() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    if to == account {
        out.push(TransferDetail {
            kind: TransferType::Ft,
            direction: Direction::In,
            amount: amount.clone(),
            counterparty: from.to_string(),
            token_id: Some(token_contract.to_string()),
            memo: memo.map(str::to_string),
            tx_hash: None,
            receipt_id: None,
        });
    }
    if from == account {
        out.push(TransferDetail {
            kind: TransferType::Ft,
            direction: Direction::Out,
            amount,
            counterparty: to.to_string(),
            token_id: Some(token_contract.to_string()),
            memo: memo.map(str::to_string),
            tx_hash: None,
            receipt_id: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_event_envelope() {
        let log = r#"EVENT_JSON:{"standard":"nep141","version":"1.0.0","event":"ft_transfer","data":[{"old_owner_id":"alice.near","new_owner_id":"bob.near","amount":"500"}]}"#;
        let transfers = extract_from_log(log, "usdt.tether-token.near", "bob.near");
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].direction, Direction::In);
        assert_eq!(transfers[0].amount.to_string(), "500");
        assert_eq!(transfers[0].counterparty, "alice.near");
    }

    #[test]
    fn parses_plaintext_wrap_near_log() {
        let log = "Transfer 1000 from alice.near to bob.near";
        let transfers = extract_from_log(log, "wrap.near", "alice.near");
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].direction, Direction::Out);
        assert_eq!(transfers[0].counterparty, "bob.near");
    }

    #[test]
    fn both_legs_emitted_for_self_transfer() {
        let log = r#"EVENT_JSON:{"standard":"nep141","event":"ft_transfer","data":[{"old_owner_id":"alice.near","new_owner_id":"alice.near","amount":"1"}]}"#;
        let transfers = extract_from_log(log, "wrap.near", "alice.near");
        assert_eq!(transfers.len(), 2);
    }

    #[test]
    fn ignores_unrelated_events() {
        let log = r#"EVENT_JSON:{"standard":"nep141","event":"ft_mint","data":[{"owner_id":"alice.near","amount":"1"}]}"#;
        assert!(extract_from_log(log, "wrap.near", "alice.near").is_empty());
    }
}
