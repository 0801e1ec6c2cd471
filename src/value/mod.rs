//! Value bridge (C1) — bidirectional conversion between the HCL dynamic
//! value domain and host-language structured data, using JSON as the
//! neutral carrier (spec §4.1).

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::error::{CoreError, CoreResult};

/// A typed, self-describing value in the HCL value domain (spec §3.4).
///
/// `Set` and `Tuple` are kept distinct from `List` so that round-tripping
/// through [`to_json`]/[`from_json`] can recover which HCL collection
/// kind produced a given JSON array, via the `{value, type}` tagged
/// envelope described in spec §4.1.
#[derive(Debug, Clone, PartialEq)]
pub enum DynValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<DynValue>),
    Set(Vec<DynValue>),
    Map(BTreeMap<String, DynValue>),
    Object(BTreeMap<String, DynValue>),
    Tuple(Vec<DynValue>),
    /// An unresolved value of the given declared type name (e.g. `"string"`).
    Unknown(String),
}

impl Default for DynValue {
    fn default() -> Self {
        DynValue::Null
    }
}

impl DynValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, DynValue>> {
        match self {
            DynValue::Map(m) | DynValue::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DynValue]> {
        match self {
            DynValue::List(v) | DynValue::Set(v) | DynValue::Tuple(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, DynValue::Unknown(_))
    }

    /// Look up a dotted attribute path, e.g. `["dependency", "vpc", "outputs", "vpc_id"]`.
    pub fn get_path(&self, path: &[String]) -> Option<&DynValue> {
        let mut cur = self;
        for part in path {
            cur = match cur {
                DynValue::Map(m) | DynValue::Object(m) => m.get(part)?,
                _ => return None,
            };
        }
        Some(cur)
    }
}

/// Convert a [`DynValue`] into its JSON representation.
///
/// Collection kinds that JSON cannot distinguish (`Set`, `Tuple` vs
/// `List`) are carried through the `{"value": ..., "type": "..."}`
/// tagged envelope the HCL library uses when the object type is not
/// statically known, per spec §4.1.
pub fn to_dyn_json(value: &DynValue) -> Json {
    match value {
        DynValue::Null => Json::Null,
        DynValue::Bool(b) => Json::Bool(*b),
        DynValue::Number(n) => serde_json::json!(n),
        DynValue::String(s) => Json::String(s.clone()),
        DynValue::List(items) => Json::Array(items.iter().map(to_dyn_json).collect()),
        DynValue::Set(items) => tagged("set", Json::Array(items.iter().map(to_dyn_json).collect())),
        DynValue::Tuple(items) => {
            tagged("tuple", Json::Array(items.iter().map(to_dyn_json).collect()))
        }
        DynValue::Map(entries) => {
            let map = entries
                .iter()
                .map(|(k, v)| (k.clone(), to_dyn_json(v)))
                .collect();
            tagged("map", Json::Object(map))
        }
        DynValue::Object(entries) => {
            let map = entries
                .iter()
                .map(|(k, v)| (k.clone(), to_dyn_json(v)))
                .collect();
            Json::Object(map)
        }
        DynValue::Unknown(ty) => tagged("unknown", Json::String(ty.clone())),
    }
}

fn tagged(type_name: &str, value: Json) -> Json {
    serde_json::json!({ "type": type_name, "value": value })
}

/// Convert a native/JSON tree into a [`DynValue`].
///
/// Unwraps the `{value, type}` tagged envelope when present; otherwise
/// infers the closest untagged representation (`Object` for maps,
/// `List` for arrays).
pub fn from_dyn_json(json: &Json) -> CoreResult<DynValue> {
    match json {
        Json::Null => Ok(DynValue::Null),
        Json::Bool(b) => Ok(DynValue::Bool(*b)),
        Json::Number(n) => n
            .as_f64()
            .map(DynValue::Number)
            .ok_or_else(|| CoreError::InvalidValueEncoding(format!("non-finite number: {n}"))),
        Json::String(s) => Ok(DynValue::String(s.clone())),
        Json::Array(items) => {
            let values = items.iter().map(from_dyn_json).collect::<CoreResult<_>>()?;
            Ok(DynValue::List(values))
        }
        Json::Object(map) => {
            if let (Some(Json::String(tag)), Some(inner)) = (map.get("type"), map.get("value")) {
                return from_tagged(tag, inner);
            }
            let mut entries = BTreeMap::new();
            for (k, v) in map {
                entries.insert(k.clone(), from_dyn_json(v)?);
            }
            Ok(DynValue::Object(entries))
        }
    }
}

fn from_tagged(tag: &str, inner: &Json) -> CoreResult<DynValue> {
    match tag {
        "set" => match inner {
            Json::Array(items) => Ok(DynValue::Set(
                items.iter().map(from_dyn_json).collect::<CoreResult<_>>()?,
            )),
            _ => Err(CoreError::InvalidValueEncoding(
                "set envelope value must be an array".to_string(),
            )),
        },
        "tuple" => match inner {
            Json::Array(items) => Ok(DynValue::Tuple(
                items.iter().map(from_dyn_json).collect::<CoreResult<_>>()?,
            )),
            _ => Err(CoreError::InvalidValueEncoding(
                "tuple envelope value must be an array".to_string(),
            )),
        },
        "map" => match inner {
            Json::Object(map) => {
                let mut entries = BTreeMap::new();
                for (k, v) in map {
                    entries.insert(k.clone(), from_dyn_json(v)?);
                }
                Ok(DynValue::Map(entries))
            }
            _ => Err(CoreError::InvalidValueEncoding(
                "map envelope value must be an object".to_string(),
            )),
        },
        "unknown" => match inner {
            Json::String(ty) => Ok(DynValue::Unknown(ty.clone())),
            _ => Ok(DynValue::Unknown("any".to_string())),
        },
        other => Err(CoreError::InvalidValueEncoding(format!(
            "unrecognized tagged envelope type: {other}"
        ))),
    }
}

/// Replace "unknown" leaves with a sentinel value, preserving the type
/// shape. Lax commands (render-json, render) use this so unresolved
/// references don't fail the whole render (spec §4.1).
pub fn update_unknowns(value: &DynValue, sentinel: Option<&str>) -> DynValue {
    let sentinel = sentinel.unwrap_or("");
    match value {
        DynValue::Unknown(_) => DynValue::String(sentinel.to_string()),
        DynValue::List(items) => {
            DynValue::List(items.iter().map(|v| update_unknowns(v, Some(sentinel))).collect())
        }
        DynValue::Set(items) => {
            DynValue::Set(items.iter().map(|v| update_unknowns(v, Some(sentinel))).collect())
        }
        DynValue::Tuple(items) => {
            DynValue::Tuple(items.iter().map(|v| update_unknowns(v, Some(sentinel))).collect())
        }
        DynValue::Map(entries) => DynValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), update_unknowns(v, Some(sentinel))))
                .collect(),
        ),
        DynValue::Object(entries) => DynValue::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), update_unknowns(v, Some(sentinel))))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        for v in [
            DynValue::Null,
            DynValue::Bool(true),
            DynValue::Number(42.5),
            DynValue::String("hi".to_string()),
        ] {
            let json = to_dyn_json(&v);
            assert_eq!(from_dyn_json(&json).unwrap(), v);
        }
    }

    #[test]
    fn round_trips_object() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), DynValue::Number(1.0));
        entries.insert("b".to_string(), DynValue::String("x".to_string()));
        let v = DynValue::Object(entries);
        let json = to_dyn_json(&v);
        assert_eq!(from_dyn_json(&json).unwrap(), v);
    }

    #[test]
    fn round_trips_set_via_tagged_envelope() {
        let v = DynValue::Set(vec![DynValue::Number(1.0), DynValue::Number(2.0)]);
        let json = to_dyn_json(&v);
        assert!(json.get("type").is_some());
        assert_eq!(from_dyn_json(&json).unwrap(), v);
    }

    #[test]
    fn update_unknowns_replaces_leaves_only() {
        let mut entries = BTreeMap::new();
        entries.insert("known".to_string(), DynValue::Number(1.0));
        entries.insert("pending".to_string(), DynValue::Unknown("string".to_string()));
        let v = DynValue::Object(entries);
        let updated = update_unknowns(&v, None);
        let m = updated.as_map().unwrap();
        assert_eq!(m.get("known"), Some(&DynValue::Number(1.0)));
        assert_eq!(m.get("pending"), Some(&DynValue::String(String::new())));
    }

    #[test]
    fn get_path_traverses_nested_maps() {
        let mut inner = BTreeMap::new();
        inner.insert("vpc_id".to_string(), DynValue::String("vpc-123".to_string()));
        let mut outputs = BTreeMap::new();
        outputs.insert("outputs".to_string(), DynValue::Object(inner));
        let root = DynValue::Object(outputs);

        let path = vec!["outputs".to_string(), "vpc_id".to_string()];
        assert_eq!(root.get_path(&path), Some(&DynValue::String("vpc-123".to_string())));
    }
}
