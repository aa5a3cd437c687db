use serde_json::{Map, Value};

/// The reserved store key injected before each execution and stripped
/// before the store is re-absorbed into the host.
pub const PREV_KEY: &str = "_prev";

/// Build the guest-side initialisation script that installs `globalThis.store`
/// from `store_json` (the host's current store, serialised to JSON text) and
/// defines `_prev` as a non-writable, non-configurable, enumerable property
/// holding `prev_result_json` (the previous execution's return value, or
/// `null`).
///
/// Run once per execution, before the user's program is evaluated.
pub fn hydrate_script(store_json: &str, prev_result_json: &str) -> String {
    format!(
        "globalThis.store = {store_json};\n\
         Object.defineProperty(globalThis.store, {prev_key:?}, {{\n\
           value: {prev_result_json},\n\
           writable: false,\n\
           configurable: false,\n\
           enumerable: true,\n\
         }});\n",
        store_json = store_json,
        prev_key = PREV_KEY,
        prev_result_json = prev_result_json,
    )
}

/// Strip the reserved `_prev` slot before a guest-mutated store is
/// re-absorbed into the host. No-op if the key is absent.
pub fn strip_prev(mut store: Value) -> Value {
    if let Value::Object(map) = &mut store {
        map.remove(PREV_KEY);
    }
    store
}

/// Ensure a value intended as a store is a JSON object, defaulting to `{}`.
pub fn coerce_to_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_prev_removes_reserved_key() {
        let store = json!({"a": 1, "_prev": 99});
        let stripped = strip_prev(store);
        assert_eq!(stripped, json!({"a": 1}));
    }

    #[test]
    fn strip_prev_is_noop_without_key() {
        let store = json!({"a": 1});
        assert_eq!(strip_prev(store.clone()), store);
    }

    #[test]
    fn coerce_defaults_non_object_to_empty_map() {
        assert_eq!(coerce_to_object(json!(42)), Map::new());
        assert_eq!(coerce_to_object(Value::Null), Map::new());
    }

    #[test]
    fn hydrate_script_embeds_store_and_prev() {
        let script = hydrate_script("{\"k\":1}", "null");
        assert!(script.contains("globalThis.store = {\"k\":1};"));
        assert!(script.contains("writable: false"));
        assert!(script.contains("configurable: false"));
        assert!(script.contains("enumerable: true"));
    }
}
