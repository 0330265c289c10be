use serde_json::{Number, Value};

/// Rounds every non-integer numeric leaf to `digits` decimal places.
///
/// Integers, non-finite values, and non-numeric leaves are left as they are.
pub fn quantize_value(v: &mut Value, digits: u32) {
    match v {
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(q) = n.as_f64().and_then(|f| quantize_f64(f, digits)) {
                    if let Some(num) = Number::from_f64(q) {
                        *n = num;
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                quantize_value(item, digits);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                quantize_value(item, digits);
            }
        }
        _ => {}
    }
}

pub fn quantize_f64(f: f64, digits: u32) -> Option<f64> {
    if !f.is_finite() {
        return None;
    }
    let prec = digits as usize;
    format!("{f:.prec$}").parse::<f64>().ok()
}
