//! Recursive tree merge and annotation string coercion.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Merge `overlay` into `base` in place.
///
/// Nested mappings merge key by key. Any other pairing (leaf over leaf,
/// mapping over leaf, leaf over mapping) is overwritten by the overlay.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (base.get_mut(key), value) {
            deep_merge(existing, incoming);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Render a value the way annotation consumers expect to read it back.
pub fn to_annotation_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                n.as_f64().map(render_float).unwrap_or_else(|| n.to_string())
            }
        }
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f != 0.0 && (f.abs() >= 1e16 || f.abs() < 1e-4) {
        exponent_form(f)
    } else if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// `1e16` -> `1e+16`, `1.5e-5` -> `1.5e-05`.
fn exponent_form(f: f64) -> String {
    let raw = format!("{:e}", f);
    let Some((mantissa, exp)) = raw.split_once('e') else {
        return raw;
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp),
    };
    format!("{}e{}{:0>2}", mantissa, sign, digits)
}

/// Flatten a tree into string values, coercing every value.
pub fn string_map(source: &Map<String, Value>) -> BTreeMap<String, String> {
    source.iter().map(|(k, v)| (k.clone(), to_annotation_string(v))).collect()
}
