//! Conversion between session values and JSON.
//!
//! JSON has no integer/float split, no byte strings and no records, so the
//! mapping is lossy in both directions:
//! - numbers that fit an `i64` become `Int`, other numbers become `Float`
//! - `Bytes` render as an array of numbers
//! - records render as `{"$record": <type>, "fields": {...}}`
//!
//! Records are never produced from JSON input. A client could otherwise
//! store a record type the codec has not registered, and the session would
//! then fail every flush.

use std::collections::BTreeMap;

use msm_session::{Key, SessionValues, Value};
use serde_json::{Map, Number, Value as Json};

/// Render a session value as JSON.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
        Value::Record(record) => {
            let fields: Map<String, Json> = record
                .fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v)))
                .collect();
            let mut object = Map::new();
            object.insert("$record".to_string(), Json::String(record.type_name.clone()));
            object.insert("fields".to_string(), Json::Object(fields));
            Json::Object(object)
        }
    }
}

/// Convert JSON into a session value.
pub fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Nil, Value::Float),
        },
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        Json::Object(object) => Value::Map(
            object
                .iter()
                .map(|(k, v)| (Key::from(k.as_str()), json_to_value(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Render a whole session map as a JSON object, keys in sorted order.
pub fn values_to_json(values: &SessionValues) -> Json {
    let sorted: BTreeMap<&Key, &Value> = values.iter().collect();
    Json::Object(
        sorted
            .into_iter()
            .map(|(k, v)| (k.to_string(), value_to_json(v)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use msm_session::Record;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(json_to_value(&json!(null)), Value::Nil);
        assert_eq!(json_to_value(&json!(true)), Value::Bool(true));
        assert_eq!(json_to_value(&json!(42)), Value::Int(42));
        assert_eq!(json_to_value(&json!(1.5)), Value::Float(1.5));
        assert_eq!(json_to_value(&json!("hi")), Value::from("hi"));

        assert_eq!(value_to_json(&Value::Float(f64::NAN)), Json::Null);
        assert_eq!(value_to_json(&Value::Bytes(vec![1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_nested() {
        let input = json!({"cart": {"items": [1, "two"], "open": true}});
        let value = json_to_value(&input);
        assert_eq!(value_to_json(&value), input);
    }

    #[test]
    fn test_record_rendering() {
        let record = Record::new("user").with_field("name", "alice");
        assert_eq!(
            value_to_json(&Value::Record(record)),
            json!({"$record": "user", "fields": {"name": "alice"}})
        );
    }

    #[test]
    fn test_object_input_never_becomes_record() {
        let value = json_to_value(&json!({"$record": "user", "fields": {}}));
        assert!(matches!(value, Value::Map(_)));
    }

    #[test]
    fn test_values_to_json_uses_display_keys() {
        let mut values = SessionValues::new();
        values.insert(Key::Int(7), Value::from("seven"));
        values.insert(Key::from("name"), Value::from("bob"));
        assert_eq!(values_to_json(&values), json!({"7": "seven", "name": "bob"}));
    }
}
