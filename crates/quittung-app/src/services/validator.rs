// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Opt-in sanity check for incoming print requests.

use serde_json::Value;

use quittung_core::error::{QuittungError, Result};

/// Check that `data` is an itemised order and normalise it in place.
///
/// Item prices given as numeric strings are rewritten as numbers, and the
/// sum of all prices is stored under `computedTotal`.  Returns that sum.
pub fn validate_print_data(data: &mut Value) -> Result<f64> {
    let object = data
        .as_object_mut()
        .ok_or_else(|| invalid("Invalid data format"))?;

    let items = match object.get_mut("items").and_then(Value::as_array_mut) {
        Some(items) if !items.is_empty() => items,
        _ => return Err(invalid("No items provided")),
    };

    let mut computed_total = 0.0;
    for (index, item) in items.iter_mut().enumerate() {
        let name = match item.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(invalid(format!(
                    "Invalid or missing item name at index {index}"
                )));
            }
        };
        let price = item
            .get("price")
            .and_then(parse_price)
            .ok_or_else(|| invalid(format!("Invalid item price for {name:?} at index {index}")))?;

        item["price"] = Value::from(price);
        computed_total += price;
    }

    object.insert("computedTotal".into(), Value::from(computed_total));
    Ok(computed_total)
}

fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}

fn invalid(message: impl Into<String>) -> QuittungError {
    QuittungError::Validation(message.into())
}
