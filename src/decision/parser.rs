/// Recommendation text parsing and strict schema validation
use super::schema::{TradeAction, TradeDecision};
use crate::errors::{Classify, ValidationError};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const REASONING_MIN_CHARS: usize = 5;
pub const REASONING_MAX_CHARS: usize = 500;
pub const REQUEST_ID_MAX_CHARS: usize = 128;

/// Confidence assigned to the substitute HOLD decision
pub const DEFAULT_HOLD_CONFIDENCE: f64 = 0.1;

const PAIR_FIELDS: [&str; 3] = ["token_pair", "pair", "symbol"];
const UNKNOWN_PAIR: &str = "UNKNOWN/UNKNOWN";

/// Find the first balanced `{...}` object in free-form text
///
/// Braces inside JSON strings are ignored. Returns `None` when no opening brace
/// ever closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..=i]);
                    }
                }
                _ => {}
            }
        }

        search_from = start + 1;
    }

    None
}

/// Parse and validate a recommendation embedded in free text
pub fn validate(raw_text: &str) -> Result<TradeDecision, ValidationError> {
    let json = extract_json_object(raw_text).ok_or_else(|| ValidationError::MalformedResponse {
        reason: "no JSON object found".to_string(),
    })?;

    let value: Value =
        serde_json::from_str(json).map_err(|e| ValidationError::MalformedResponse {
            reason: format!("invalid JSON: {}", e),
        })?;

    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::MalformedResponse {
            reason: "top-level JSON is not an object".to_string(),
        })?;

    validate_object(object, &value)
}

fn validate_object(object: &Map<String, Value>, value: &Value) -> Result<TradeDecision, ValidationError> {
    let decision = match object.get("decision") {
        Some(Value::String(s)) => TradeAction::parse(s).ok_or_else(|| ValidationError::InvalidField {
            field: "decision",
            reason: format!("'{}' is not one of BUY, SELL, HOLD", s),
        })?,
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field: "decision",
                reason: format!("expected string, got {}", type_name(other)),
            })
        }
        None => {
            return Err(ValidationError::InvalidField {
                field: "decision",
                reason: "missing".to_string(),
            })
        }
    };

    let token_pair = parse_pair(object)?;

    let amount_usd = optional_number(object, "amount_usd")?;
    if let Some(amount) = amount_usd {
        if amount <= 0.0 {
            return Err(ValidationError::InvalidField {
                field: "amount_usd",
                reason: format!("must be > 0, got {}", amount),
            });
        }
    }
    if decision.is_trade() && amount_usd.is_none() {
        return Err(ValidationError::MissingAmount { decision });
    }

    let confidence =
        optional_number(object, "confidence")?.ok_or_else(|| ValidationError::InvalidField {
            field: "confidence",
            reason: "missing".to_string(),
        })?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::InvalidField {
            field: "confidence",
            reason: format!("must be within [0, 1], got {}", confidence),
        });
    }

    let stop_loss_price = optional_positive(object, "stop_loss_price")?;
    let take_profit_price = optional_positive(object, "take_profit_price")?;

    let reasoning = match object.get("reasoning") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field: "reasoning",
                reason: format!("expected string, got {}", type_name(other)),
            })
        }
        None => {
            return Err(ValidationError::InvalidField {
                field: "reasoning",
                reason: "missing".to_string(),
            })
        }
    };
    let reasoning_len = reasoning.chars().count();
    if !(REASONING_MIN_CHARS..=REASONING_MAX_CHARS).contains(&reasoning_len) {
        return Err(ValidationError::InvalidField {
            field: "reasoning",
            reason: format!(
                "length {} outside {}..={} characters",
                reasoning_len, REASONING_MIN_CHARS, REASONING_MAX_CHARS
            ),
        });
    }

    let request_id = match object.get("request_id") {
        None | Some(Value::Null) => fingerprint(&value.to_string()),
        Some(Value::String(s))
            if !s.trim().is_empty() && s.trim().chars().count() <= REQUEST_ID_MAX_CHARS =>
        {
            s.trim().to_string()
        }
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "request_id",
                reason: format!("must be a non-empty string of at most {} characters", REQUEST_ID_MAX_CHARS),
            })
        }
    };

    Ok(TradeDecision {
        request_id,
        decision,
        token_pair,
        amount_usd,
        confidence,
        stop_loss_price,
        take_profit_price,
        reasoning,
    })
}

fn parse_pair(object: &Map<String, Value>) -> Result<String, ValidationError> {
    let raw = PAIR_FIELDS
        .iter()
        .find_map(|field| object.get(*field))
        .ok_or_else(|| ValidationError::InvalidField {
            field: "token_pair",
            reason: "missing".to_string(),
        })?;

    let text = raw.as_str().ok_or_else(|| ValidationError::InvalidField {
        field: "token_pair",
        reason: format!("expected string, got {}", type_name(raw)),
    })?;

    normalize_pair(text).ok_or_else(|| ValidationError::InvalidField {
        field: "token_pair",
        reason: format!("'{}' is not a BASE/QUOTE symbol", text),
    })
}

/// Upper-case `base/quote`; both sides alphanumeric and non-empty
pub fn normalize_pair(text: &str) -> Option<String> {
    let (base, quote) = text.trim().split_once('/')?;
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
    let (base, quote) = (base.trim(), quote.trim());
    if !valid(base) || !valid(quote) {
        return None;
    }
    Some(format!("{}/{}", base.to_uppercase(), quote.to_uppercase()))
}

/// Numbers only; null counts as absent. Strings are rejected, not coerced.
fn optional_number(object: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ValidationError::InvalidField {
                field,
                reason: "not a finite number".to_string(),
            }),
        },
        Some(other) => Err(ValidationError::InvalidField {
            field,
            reason: format!("expected number, got {}", type_name(other)),
        }),
    }
}

fn optional_positive(object: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ValidationError> {
    let value = optional_number(object, field)?;
    if let Some(v) = value {
        if v <= 0.0 {
            return Err(ValidationError::InvalidField {
                field,
                reason: format!("must be > 0, got {}", v),
            });
        }
    }
    Ok(value)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deterministic request id: base58 of the first 16 bytes of SHA-256
pub fn fingerprint(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    bs58::encode(&digest[..16]).into_string()
}

/// Substitute decision used whenever validation fails
pub fn hold_on_failure(error: &ValidationError, raw_text: &str) -> TradeDecision {
    let token_pair = extract_json_object(raw_text)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .and_then(|value| {
            PAIR_FIELDS
                .iter()
                .find_map(|f| value.get(*f).and_then(Value::as_str).and_then(normalize_pair))
        })
        .unwrap_or_else(|| UNKNOWN_PAIR.to_string());

    let request_id = extract_json_object(raw_text)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .and_then(|value| {
            value
                .get("request_id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty() && s.chars().count() <= REQUEST_ID_MAX_CHARS)
                .map(str::to_string)
        })
        .unwrap_or_else(|| fingerprint(raw_text.trim()));

    let reasoning: String = format!("{}: {}", error.kind(), error)
        .chars()
        .take(REASONING_MAX_CHARS)
        .collect();

    TradeDecision {
        request_id,
        decision: TradeAction::Hold,
        token_pair,
        amount_usd: None,
        confidence: DEFAULT_HOLD_CONFIDENCE,
        stop_loss_price: None,
        take_profit_price: None,
        reasoning,
    }
}

/// Validate, substituting the default HOLD on failure; never fails
pub fn validate_or_hold(raw_text: &str) -> (TradeDecision, Option<ValidationError>) {
    match validate(raw_text) {
        Ok(decision) => (decision, None),
        Err(err) => (hold_on_failure(&err, raw_text), Some(err)),
    }
}
