//! Helpers over [`serde_json::Value`], the dynamic value type of scopes.
//!
//! The runtime treats "missing" and `null` as the same thing: reading a property
//! that does not exist yields [`Value::Null`], and `null` renders as an empty
//! string in the UI.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

/// Truthiness as template expressions see it.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders a value for display in text or attribute positions.
///
/// `null` renders empty, integral numbers render without a fraction, and
/// arrays and objects render as JSON.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn format_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    n.as_f64().map(format_f64).unwrap_or_else(|| n.to_string())
}

pub(crate) fn format_f64(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_owned()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// Builds a number value, storing integral results as integers.
///
/// Non-finite results have no JSON representation and become `null`.
pub fn number(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

/// Numeric conversion with the usual loose rules.
///
/// Empty strings and `null` convert to zero; unparseable strings, arrays and
/// objects convert to `NaN`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Coerces a value into a number, mapping `NaN` to zero.
pub fn coerce_number(value: &Value) -> Value {
    let f = to_number(value);
    number(if f.is_nan() { 0.0 } else { f })
}

/// Structural equality. Numbers compare by numeric value, so `5` equals `5.0`.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| deep_eq(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| deep_eq(value, other)))
        }
        _ => a == b,
    }
}

/// Loose equality (`==`): mixed primitive operands compare numerically.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            deep_eq(a, b)
        }
        _ => to_number(a) == to_number(b),
    }
}

/// Ordering used by comparisons and sort criteria.
///
/// Two strings compare lexically; anything else compares numerically, with
/// incomparable values treated as equal.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => to_number(a)
            .partial_cmp(&to_number(b))
            .unwrap_or(Ordering::Equal),
    }
}

/// Splits `a.b[0].c` into `["a", "b", "0", "c"]`.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(['.', '[', ']'])
        .map(|segment| segment.trim().trim_matches(['\'', '"']))
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Reads one property of a value. Missing properties read as `null`.
pub fn member(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        Value::Array(items) if key == "length" => Value::from(items.len()),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index))
            .cloned()
            .unwrap_or(Value::Null),
        Value::String(s) if key == "length" => Value::from(s.chars().count()),
        Value::String(s) => key
            .parse::<usize>()
            .ok()
            .and_then(|index| s.chars().nth(index))
            .map_or(Value::Null, |c| Value::String(c.to_string())),
        _ => Value::Null,
    }
}

/// Reads a nested property by path segments.
pub fn get_path(value: &Value, segments: &[String]) -> Value {
    let Some((head, rest)) = segments.split_first() else {
        return value.clone();
    };
    let next = member(value, head);
    if rest.is_empty() { next } else { get_path(&next, rest) }
}

/// Writes a nested property, creating intermediate objects where the path
/// runs through `null`.
///
/// An array index may address an existing item or append one past the end.
/// Indices further out, non-index keys on arrays and properties of scalars
/// are refused. Returns whether the value was written.
pub fn set_path(target: &mut Value, segments: &[String], new_value: Value) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *target = new_value;
        return true;
    };
    match target {
        Value::Array(items) => {
            let len = items.len();
            let Some(index) = head.parse::<usize>().ok().filter(|index| *index <= len) else {
                tracing::warn!(target: "bindery::scope", key = %head, len, "array write out of range ignored");
                return false;
            };
            if index == len {
                items.push(Value::Null);
            }
            set_path(&mut items[index], rest, new_value)
        }
        Value::Object(map) => {
            let slot = map.entry(head.clone()).or_insert(Value::Null);
            set_path(slot, rest, new_value)
        }
        Value::Null => {
            let mut created = Value::Object(Map::new());
            let written = set_path(&mut created, segments, new_value);
            if written {
                *target = created;
            }
            written
        }
        scalar => {
            tracing::warn!(target: "bindery::scope", key = %head, kind = type_name(scalar), "property write on a scalar ignored");
            false
        }
    }
}

/// Short type name used in log messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_rules() {
        assert_eq!(to_display(&Value::Null), "");
        assert_eq!(to_display(&json!(5)), "5");
        assert_eq!(to_display(&json!(5.0)), "5");
        assert_eq!(to_display(&json!(2.5)), "2.5");
        assert_eq!(to_display(&json!("hi")), "hi");
        assert_eq!(to_display(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn deep_eq_compares_numbers_by_value() {
        assert!(deep_eq(&json!(5), &json!(5.0)));
        assert!(deep_eq(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
        assert!(!deep_eq(&json!({"a": [1, 2]}), &json!({"a": [2, 1]})));
        assert!(!deep_eq(&json!({"a": 1}), &json!({"a": 1, "b": null})));
    }

    #[test]
    fn number_conversion() {
        assert_eq!(to_number(&json!("")), 0.0);
        assert_eq!(to_number(&json!(" 7 ")), 7.0);
        assert!(to_number(&json!("abc")).is_nan());
        assert_eq!(coerce_number(&json!("abc")), json!(0));
        assert_eq!(number(6.0), json!(6));
        assert_eq!(number(f64::NAN), Value::Null);
    }

    #[test]
    fn paths_read_and_write_nested_values() {
        let mut value = json!({"user": {"tags": ["a", "b"]}});
        assert_eq!(split_path("user.tags[1]"), ["user", "tags", "1"]);
        assert_eq!(get_path(&value, &split_path("user.tags[1]")), json!("b"));
        assert_eq!(get_path(&value, &split_path("user.tags.length")), json!(2));
        assert_eq!(get_path(&value, &split_path("user.missing.deep")), Value::Null);

        assert!(set_path(&mut value, &split_path("user.address.city"), json!("Oslo")));
        assert!(set_path(&mut value, &split_path("user.tags.2"), json!("c")));
        assert!(set_path(&mut value, &split_path("user.tags[0]"), json!("z")));
        assert_eq!(
            value,
            json!({"user": {"tags": ["z", "b", "c"], "address": {"city": "Oslo"}}})
        );
    }

    #[test]
    fn array_writes_stay_in_range() {
        let mut value = json!({"items": [1, 2, 3]});
        assert!(!set_path(&mut value, &split_path("items[100000000000000]"), json!(1)));
        assert!(!set_path(&mut value, &split_path("items[5]"), json!(1)));
        assert!(!set_path(&mut value, &split_path("items[-1]"), json!(9)));
        assert!(!set_path(&mut value, &split_path("items.foo"), json!(1)));
        assert!(!set_path(&mut value, &split_path("items[0].name"), json!("x")));
        assert_eq!(value, json!({"items": [1, 2, 3]}));

        assert!(set_path(&mut value, &split_path("items[3]"), json!(4)));
        assert_eq!(value, json!({"items": [1, 2, 3, 4]}));
    }

    #[test]
    fn loose_equality_mixes_numbers_and_strings() {
        assert!(loose_eq(&json!("5"), &json!(5)));
        assert!(loose_eq(&json!(true), &json!(1)));
        assert!(!loose_eq(&Value::Null, &json!(0)));
        assert_eq!(compare(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare(&json!(2), &json!("10")), Ordering::Less);
    }
}
