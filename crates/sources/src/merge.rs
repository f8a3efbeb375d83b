use serde_json::Value;

/// Overlay `top` onto `base`: maps merge field-by-field with `top` winning,
/// lists of named entries merge by `name`, and any other collision resolves
/// to `top`.
pub fn overlay(top: Value, base: Value) -> Value {
    match (top, base) {
        (Value::Object(top), Value::Object(mut base)) => {
            for (key, tv) in top {
                let merged = match base.remove(&key) {
                    Some(bv) => overlay(tv, bv),
                    None => tv,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (Value::Array(top), Value::Array(base)) => Value::Array(merge_entries(top, base)),
        (top, _) => top,
    }
}

/// Merge module or task lists. Entries pair up by their `name` field:
/// matched pairs shallow-merge, unmatched and unnamed entries append in
/// order after the base's entries.
fn merge_entries(top: Vec<Value>, base: Vec<Value>) -> Vec<Value> {
    let mut out = base;

    for tv in top {
        let name = entry_name(&tv).map(str::to_string);
        let index = name.as_deref().and_then(|name| {
            out.iter()
                .position(|bv| entry_name(bv) == Some(name))
        });

        match index {
            Some(index) => {
                let bv = out[index].take();
                out[index] = merge_entry(tv, bv);
            }
            None => out.push(tv),
        }
    }
    out
}

/// Shallow-merge one matched entry pair: the overlaying entry's fields win
/// wholesale, except that nested lists (an input's tasks) merge by name in
/// turn.
fn merge_entry(top: Value, base: Value) -> Value {
    match (top, base) {
        (Value::Object(top), Value::Object(mut base)) => {
            for (key, tv) in top {
                let merged = match (tv, base.remove(&key)) {
                    (Value::Array(ta), Some(Value::Array(ba))) => {
                        Value::Array(merge_entries(ta, ba))
                    }
                    (tv, _) => tv,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (top, _) => top,
    }
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}
