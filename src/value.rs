//! Marshalling helpers between `serde_json::Value` and `rquickjs::Value`.
//!
//! These are the only place the crate crosses the host/guest boundary for
//! data (as opposed to control, which flows through promises). Every
//! conversion is total on the `serde_json::Value -> rquickjs::Value`
//! direction (it never fails for JSON-shaped input); the reverse direction
//! can fail if the guest value contains something that is not JSON-shaped
//! (a function, a symbol, a cyclic structure), in which case callers fall
//! back to a raw string representation per the bridge's documented
//! degradation path.

use rquickjs::{Array, Ctx, Object, Value as JsValue};
use serde_json::{Map, Number, Value};

/// Convert a JSON value into a guest value in `ctx`.
pub fn json_to_js<'js>(ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
    Ok(match value {
        Value::Null => JsValue::new_null(ctx.clone()),
        Value::Bool(b) => JsValue::new_bool(ctx.clone(), *b),
        Value::Number(n) => JsValue::new_float(ctx.clone(), n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Value::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, json_to_js(ctx, item)?)?;
            }
            array.into_value()
        }
        Value::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), json_to_js(ctx, item)?)?;
            }
            object.into_value()
        }
    })
}

/// Convert a guest value back into JSON. Fails if the value contains a
/// function, symbol, or anything else JSON cannot represent (including
/// cyclic object graphs, which this walk does not attempt to detect beyond
/// QuickJS's own stack-depth limits).
pub fn js_to_json(value: &JsValue<'_>) -> Result<Value, String> {
    if value.is_null() || value.is_undefined() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Some(n) = value.as_float() {
        return Ok(Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null));
    }
    if let Some(n) = value.as_int() {
        return Ok(Value::Number(Number::from(n)));
    }
    if let Some(s) = value.as_string() {
        return Ok(Value::String(
            s.to_string().map_err(|e| format!("invalid string: {e}"))?,
        ));
    }
    if let Some(array) = value.as_array() {
        let mut out = Vec::with_capacity(array.len());
        for item in array.iter::<JsValue>() {
            let item = item.map_err(|e| format!("failed to read array element: {e}"))?;
            out.push(js_to_json(&item)?);
        }
        return Ok(Value::Array(out));
    }
    if let Some(object) = value.as_object() {
        if object.as_array().is_some() {
            unreachable!("arrays handled above");
        }
        let mut out = Map::new();
        for key in object.keys::<String>() {
            let key = key.map_err(|e| format!("failed to read object key: {e}"))?;
            let item: JsValue = object
                .get(key.as_str())
                .map_err(|e| format!("failed to read object property '{key}': {e}"))?;
            out.insert(key, js_to_json(&item)?);
        }
        return Ok(Value::Object(out));
    }
    Err("value is not JSON-representable (function, symbol, or unsupported type)".to_string())
}
