//! Zap receipt (NIP-57) amount extraction.
//!
//! A receipt carries the paid invoice in its `bolt11` tag and the original
//! zap request (JSON) in its `description` tag. The invoice amount is
//! authoritative; the request's `amount` tag (millisats) is the fallback.
//! Receipts that yield no amount are worth zero and produce no counter
//! delta — never an error.

use crate::event::Event;

/// Extract the zap amount in whole sats from a zap receipt event.
pub fn amount_sats(event: &Event) -> Option<u64> {
    if let Some(invoice) = event.tag_value("bolt11") {
        if let Some(sats) = bolt11_amount_sats(invoice) {
            return Some(sats);
        }
    }
    request_amount_sats(event)
}

/// Amount encoded in a bolt11 invoice's human-readable part.
///
/// The HRP is `ln` + currency prefix + digits + optional multiplier, ending
/// at the last `1` in the invoice (the bech32 separator). Sub-sat precision
/// or a missing amount yields `None`.
fn bolt11_amount_sats(invoice: &str) -> Option<u64> {
    let invoice = invoice.to_ascii_lowercase();
    if !invoice.starts_with("ln") {
        return None;
    }
    let separator = invoice.rfind('1')?;
    if separator + 1 >= invoice.len() {
        return None;
    }
    let hrp = &invoice[..separator];

    // Strip "ln" plus the currency prefix letters; what remains is the
    // amount digits and an optional multiplier suffix.
    let amount_part = hrp.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if amount_part.is_empty() {
        return None;
    }

    let (digits, multiplier) = match amount_part.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            (&amount_part[..amount_part.len() - 1], Some(c))
        }
        _ => (amount_part, None),
    };
    let value: u64 = digits.parse().ok()?;

    // Multipliers scale the base unit (1 BTC = 100_000_000 sats).
    match multiplier {
        None => value.checked_mul(100_000_000),
        Some('m') => value.checked_mul(100_000),
        Some('u') => value.checked_mul(100),
        Some('n') => (value % 10 == 0).then(|| value / 10),
        Some('p') => (value % 10_000 == 0).then(|| value / 10_000),
        Some(_) => None,
    }
}

/// Fallback: the `amount` tag (millisats) of the embedded zap request.
fn request_amount_sats(event: &Event) -> Option<u64> {
    let description = event.tag_value("description")?;
    let request: serde_json::Value = serde_json::from_str(description).ok()?;
    let tags = request.get("tags")?.as_array()?;
    let millisats: u64 = tags
        .iter()
        .filter_map(|tag| tag.as_array())
        .find(|tag| tag.first().and_then(|v| v.as_str()) == Some("amount"))?
        .get(1)?
        .as_str()?
        .parse()
        .ok()?;
    Some(millisats / 1000)
}
