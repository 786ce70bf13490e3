//! Conversion between plain JSON and Firestore's typed `Value` encoding.
//!
//! Firestore REST payloads wrap every field in a single-key object naming
//! its type, e.g. `{"integerValue": "3"}` or `{"mapValue": {"fields": {..}}}`.
//! 64-bit integers travel as strings.

use serde_json::{Map, Value as JsonValue, json};

/// Encodes a plain JSON value as a Firestore `Value`.
pub fn encode(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({ "nullValue": null }),
        JsonValue::Bool(flag) => json!({ "booleanValue": flag }),
        JsonValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                json!({ "integerValue": int.to_string() })
            } else if let Some(uint) = number.as_u64() {
                json!({ "integerValue": uint.to_string() })
            } else {
                json!({ "doubleValue": number.as_f64().unwrap_or_default() })
            }
        }
        JsonValue::String(text) => json!({ "stringValue": text }),
        JsonValue::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() }
        }),
        JsonValue::Object(map) => json!({
            "mapValue": { "fields": encode_fields(map) }
        }),
    }
}

/// Encodes every entry of `map` as a Firestore field.
pub fn encode_fields(map: &Map<String, JsonValue>) -> JsonValue {
    JsonValue::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), encode(value)))
            .collect(),
    )
}

/// Decodes a Firestore `Value` into plain JSON.
///
/// Timestamps, references and geo points come back in their wire form;
/// unknown shapes decode to `null`.
pub fn decode(value: &JsonValue) -> JsonValue {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return JsonValue::Null;
    };

    match kind.as_str() {
        "nullValue" => JsonValue::Null,
        "booleanValue" => JsonValue::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => match inner {
            JsonValue::String(text) => text
                .parse::<i64>()
                .map(JsonValue::from)
                .or_else(|_| text.parse::<u64>().map(JsonValue::from))
                .unwrap_or(JsonValue::Null),
            JsonValue::Number(_) => inner.clone(),
            _ => JsonValue::Null,
        },
        "doubleValue" => inner
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => JsonValue::Array(
            inner
                .get("values")
                .and_then(JsonValue::as_array)
                .map(|values| values.iter().map(decode).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => decode_fields(inner.get("fields")),
        _ => JsonValue::Null,
    }
}

/// Decodes a document's `fields` object into a plain JSON object.
pub fn decode_fields(fields: Option<&JsonValue>) -> JsonValue {
    let map = fields
        .and_then(JsonValue::as_object)
        .map(|fields| {
            fields
                .iter()
                .map(|(key, value)| (key.clone(), decode(value)))
                .collect()
        })
        .unwrap_or_default();
    JsonValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_use_firestore_wire_forms() {
        assert_eq!(encode(&json!(42)), json!({"integerValue": "42"}));
        assert_eq!(encode(&json!(1.5)), json!({"doubleValue": 1.5}));
        assert_eq!(encode(&json!("Go")), json!({"stringValue": "Go"}));
        assert_eq!(encode(&json!(null)), json!({"nullValue": null}));
        assert_eq!(encode(&json!(true)), json!({"booleanValue": true}));
    }

    #[test]
    fn test_nested_metadata_survives_encoding() {
        let metadata = json!({
            "tagline": "Fast",
            "tech_stack": ["Go", "Docker"],
            "contact": {"email": "a@b.c"},
            "stars": 3
        });

        let encoded = encode(&metadata);
        assert_eq!(
            encoded["mapValue"]["fields"]["tech_stack"]["arrayValue"]["values"][1],
            json!({"stringValue": "Docker"})
        );
        assert_eq!(decode(&encoded), metadata);
    }

    #[test]
    fn test_decode_tolerates_odd_shapes() {
        assert_eq!(decode(&json!({"integerValue": 7})), json!(7));
        assert_eq!(
            decode(&json!({"timestampValue": "2024-01-01T00:00:00Z"})),
            json!("2024-01-01T00:00:00Z")
        );
        assert_eq!(decode(&json!({"arrayValue": {}})), json!([]));
        assert_eq!(decode(&json!({"mapValue": {}})), json!({}));
        assert_eq!(decode(&json!("bare")), JsonValue::Null);
    }
}
