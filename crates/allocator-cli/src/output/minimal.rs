use serde_json::Value;

/// Per-asset weight fields, most specific first.
const WEIGHT_KEYS: [&str; 3] = ["weight", "mean_variance_weight", "posterior_return"];

/// Print just the key answer from the output.
///
/// Allocation tables collapse to `name weight` lines. Otherwise the first
/// well-known result field wins, then the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = [
        "final_value",
        "mu_post",
        "mu",
        "weights",
        "portfolio_volatility",
        "hhi_concentration",
    ];

    if let Value::Object(map) = result_obj {
        let rows = map
            .get("allocations")
            .or_else(|| map.get("prior_vs_posterior"));
        if let Some(Value::Array(rows)) = rows {
            if print_allocation_lines(rows) {
                return;
            }
        }

        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn print_allocation_lines(rows: &[Value]) -> bool {
    let mut printed = false;
    for row in rows {
        let Value::Object(line) = row else { continue };
        let name = line.get("name").map(format_minimal).unwrap_or_default();
        if let Some(weight) = WEIGHT_KEYS.iter().find_map(|k| line.get(*k)) {
            println!("{} {}", name, format_minimal(weight));
            printed = true;
        }
    }
    printed
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
