//! Schema decoding for venue trade payloads.
//!
//! Every decoder returns a typed [`Trade`] or a specific [`DecodeError`];
//! nothing here panics on bad input.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::error::DecodeError;
use crate::models::{Trade, TradeSide};

/// 2100-01-01T00:00:00Z. Anything later is a unit mix-up (milliseconds)
/// or garbage, not a trade time.
pub const MAX_TIMESTAMP_SECS: i64 = 4_102_444_800;

/// Decode one message from the streaming trade channel.
///
/// Accepted shapes:
/// - `{"event": ...}` control objects: ignored, no trades
/// - `[chan, "hb"]` heartbeats: no trades
/// - `[chan, [[id, ts, price, amount], ...]]` snapshots
/// - `[chan, "te", id, ts, price, amount]` executions
/// - `[chan, id, ts, price, amount]` legacy single updates
///
/// `"tu"` messages repeat an earlier `"te"` and are ignored.
///
/// The outer error means the message itself is unusable. Each trade record
/// carries its own result, so one bad snapshot entry does not take the
/// others down with it.
pub fn decode_feed_message(text: &str) -> Result<Vec<Result<Trade, DecodeError>>, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let items = match value {
        Value::Object(_) => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(DecodeError::Malformed(format!("unexpected payload: {}", other))),
    };

    if items.len() < 2 {
        return Err(DecodeError::Malformed(format!(
            "expected at least 2 elements, got {}",
            items.len()
        )));
    }

    match &items[1] {
        Value::String(tag) if tag == "hb" || tag == "tu" => Ok(Vec::new()),
        Value::String(tag) if tag == "te" => {
            if items.len() < 6 {
                return Err(DecodeError::Malformed(format!(
                    "execution message has {} elements",
                    items.len()
                )));
            }
            Ok(vec![decode_fields(&items[2], &items[3], &items[4], &items[5])])
        }
        Value::String(tag) => Err(DecodeError::Malformed(format!("unknown message tag: {}", tag))),
        Value::Array(snapshot) => Ok(snapshot
            .iter()
            .map(|entry| match entry {
                Value::Array(fields) if fields.len() >= 4 => {
                    decode_fields(&fields[0], &fields[1], &fields[2], &fields[3])
                }
                other => Err(DecodeError::Malformed(format!("bad snapshot entry: {}", other))),
            })
            .collect()),
        _ if items.len() == 5 => Ok(vec![decode_fields(&items[1], &items[2], &items[3], &items[4])]),
        _ => Err(DecodeError::Malformed(format!(
            "unrecognised message with {} elements",
            items.len()
        ))),
    }
}

/// Decode a REST trade list: `[{"tid"|"id", "timestamp", "price", "amount", "type"?}, ...]`
pub fn decode_rest_trades(text: &str) -> Result<Vec<Result<Trade, DecodeError>>, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items.iter().map(decode_trade_object).collect()),
        other => Err(DecodeError::Malformed(format!("expected array, got {}", other))),
    }
}

/// Decode a single trade object
pub fn decode_trade_object(value: &Value) -> Result<Trade, DecodeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::Malformed(format!("expected object, got {}", value)))?;

    let id = obj
        .get("id")
        .or_else(|| obj.get("tid"))
        .ok_or(DecodeError::MissingField("id"))?;
    let timestamp = obj.get("timestamp").ok_or(DecodeError::MissingField("timestamp"))?;
    let price = obj.get("price").ok_or(DecodeError::MissingField("price"))?;
    let amount = obj.get("amount").ok_or(DecodeError::MissingField("amount"))?;

    let mut trade = decode_fields(id, timestamp, price, amount)?;
    if let Some(Value::String(kind)) = obj.get("type") {
        trade.side = match kind.to_ascii_lowercase().as_str() {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => trade.side,
        };
    }
    Ok(trade)
}

/// Decode one `timestamp,price,amount` line of a trade history file.
/// `line_no` becomes the trade id, which is unique within a file.
pub fn decode_csv_line(line: &str, line_no: usize) -> Result<Trade, DecodeError> {
    let mut cols = line.split(',').map(str::trim);
    let timestamp = cols.next().filter(|c| !c.is_empty()).ok_or(DecodeError::MissingField("timestamp"))?;
    let price = cols.next().filter(|c| !c.is_empty()).ok_or(DecodeError::MissingField("price"))?;
    let amount = cols.next().filter(|c| !c.is_empty()).ok_or(DecodeError::MissingField("amount"))?;

    let timestamp = timestamp
        .parse::<i64>()
        .ok()
        .and_then(in_range)
        .ok_or_else(|| DecodeError::InvalidTimestamp(timestamp.to_string()))?;
    let price = parse_decimal("price", price)?;
    let (amount, side) = split_signed_amount(parse_decimal("amount", amount)?);

    build_trade(format!("line-{}", line_no), timestamp, price, amount, side)
}

fn decode_fields(
    id: &Value,
    timestamp: &Value,
    price: &Value,
    amount: &Value,
) -> Result<Trade, DecodeError> {
    let id = match id {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(DecodeError::MissingField("id")),
    };
    let timestamp = decode_timestamp(timestamp)?;
    let price = decimal_from_value("price", price)?;
    let (amount, side) = split_signed_amount(decimal_from_value("amount", amount)?);

    build_trade(id, timestamp, price, amount, side)
}

fn build_trade(
    id: String,
    timestamp: i64,
    price: Decimal,
    amount: Decimal,
    side: Option<TradeSide>,
) -> Result<Trade, DecodeError> {
    if price <= Decimal::ZERO {
        return Err(DecodeError::InvalidNumber {
            field: "price",
            value: price.to_string(),
        });
    }
    if amount < Decimal::ZERO {
        return Err(DecodeError::NegativeAmount(amount.to_string()));
    }
    Ok(Trade {
        id,
        timestamp,
        price,
        amount,
        side,
    })
}

/// The venue signs the amount by aggressor side; the stored amount is its magnitude.
fn split_signed_amount(amount: Decimal) -> (Decimal, Option<TradeSide>) {
    if amount.is_sign_negative() && !amount.is_zero() {
        (amount.abs(), Some(TradeSide::Sell))
    } else if amount.is_zero() {
        (amount, None)
    } else {
        (amount, Some(TradeSide::Buy))
    }
}

fn decode_timestamp(value: &Value) -> Result<i64, DecodeError> {
    let ts = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && *f <= MAX_TIMESTAMP_SECS as f64)
                .map(|f| f.floor() as i64)
        }),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    ts.and_then(in_range)
        .ok_or_else(|| DecodeError::InvalidTimestamp(value.to_string()))
}

fn in_range(ts: i64) -> Option<i64> {
    (0..=MAX_TIMESTAMP_SECS).contains(&ts).then_some(ts)
}

fn decimal_from_value(field: &'static str, value: &Value) -> Result<Decimal, DecodeError> {
    match value {
        Value::String(s) => parse_decimal(field, s),
        Value::Number(n) => parse_decimal(field, &n.to_string()),
        Value::Null => Err(DecodeError::MissingField(field)),
        other => Err(DecodeError::InvalidNumber {
            field,
            value: other.to_string(),
        }),
    }
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, DecodeError> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| DecodeError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}
