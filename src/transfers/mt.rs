//! NEAR Intents (NEP-245) multi-token transfer extraction from the intents
//! contract's execution-outcome logs.

use serde::Deserialize;

use crate::amount::Amount;
use crate::history::{Direction, TransferDetail, TransferType};

const EVENT_PREFIX: &str = "EVENT_JSON:";

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    standard: String,
    event: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MtTransferLeg {
    old_owner_id: String,
    new_owner_id: String,
    token_ids: Vec<String>,
    amounts: Vec<String>,
    #[serde(default)]
    memo: Option<String>,
}

/// Recognised intents contract events: a standard transfer plus the three
/// memo-distinguished variants that move value in or out of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MtEvent {
    Transfer,
    Withdraw,
    Deposit,
    Refund,
}

fn classify_event(name: &str) -> Option<MtEvent> {
    match name {
        "mt_transfer" => Some(MtEvent::Transfer),
        "mt_withdraw" => Some(MtEvent::Withdraw),
        "mt_deposit" => Some(MtEvent::Deposit),
        "mt_refund" => Some(MtEvent::Refund),
        _ => None,
    }
}

/// Scan one log line from the intents contract for a multi-token transfer
/// event affecting `account`. Token ids are preserved in their full
/// prefixed form (`nep141:...`, `nep245:<contract>:<sub_id>`).
pub fn extract_from_log(log: &str, account: &str) -> Vec<TransferDetail> {
    let Some(rest) = log.strip_prefix(EVENT_PREFIX) else {
        return Vec::new();
    };
    let Ok(envelope) = serde_json::from_str::<EventEnvelope>(rest) else {
        return Vec::new();
    };
    if envelope.standard != "nep245" {
        return Vec::new();
    }
    let Some(kind) = classify_event(&envelope.event) else {
        return Vec::new();
    };
    let Ok(legs) = serde_json::from_value::<Vec<MtTransferLeg>>(envelope.data) else {
        return Vec::new();
    };

    let memo_tag = match kind {
        MtEvent::Transfer => None,
        MtEvent::Withdraw => Some("withdraw"),
        MtEvent::Deposit => Some("deposit"),
        MtEvent::Refund => Some("refund"),
    };

    let mut out = Vec::new();
    for leg in legs {
        let memo = memo_tag.map(str::to_string).or_else(|| leg.memo.clone());
        for (token_id, amount) in leg.token_ids.iter().zip(leg.amounts.iter()) {
            let Ok(amount) = amount.parse::<Amount>() else {
                continue;
            };
            if leg.new_owner_id == account {
                out.push(TransferDetail {
                    kind: TransferType::Mt,
                    direction: Direction::In,
                    amount: amount.clone(),
                    counterparty: leg.old_owner_id.clone(),
                    token_id: Some(token_id.clone()),
                    memo: memo.clone(),
                    tx_hash: None,
                    receipt_id: None,
                });
            }
            if leg.old_owner_id == account {
                out.push(TransferDetail {
                    kind: TransferType::Mt,
                    direction: Direction::Out,
                    amount,
                    counterparty: leg.new_owner_id.clone(),
                    token_id: Some(token_id.clone()),
                    memo: memo.clone(),
                    tx_hash: None,
                    receipt_id: None,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mt_transfer_event() {
        let log = r#"EVENT_JSON:{"standard":"nep245","version":"1.0.0","event":"mt_transfer","data":[{"old_owner_id":"alice.near","new_owner_id":"bob.near","token_ids":["nep141:eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near"],"amounts":["1000"]}]}"#;
        let transfers = extract_from_log(log, "alice.near");
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].direction, Direction::Out);
        assert_eq!(
            transfers[0].token_id.as_deref(),
            Some("nep141:eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near")
        );
    }

    #[test]
    fn withdraw_sets_memo() {
        let log = r#"EVENT_JSON:{"standard":"nep245","event":"mt_withdraw","data":[{"old_owner_id":"alice.near","new_owner_id":"alice.near","token_ids":["nep141:wrap.near"],"amounts":["1"]}]}"#;
        let transfers = extract_from_log(log, "alice.near");
        assert!(transfers.iter().any(|t| t.memo.as_deref() == Some("withdraw")));
    }

    #[test]
    fn unrelated_standard_is_ignored() {
        let log = r#"EVENT_JSON:{"standard":"nep141","event":"ft_transfer","data":[]}"#;
        assert!(extract_from_log(log, "alice.near").is_empty());
    }
}
