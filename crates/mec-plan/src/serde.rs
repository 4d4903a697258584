use std::collections::BTreeMap;
use std::iter::FromIterator;

use mec_core::{ErrorInfo, MecError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

fn serde_error(code: &str, err: impl ToString) -> MecError {
    MecError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<BTreeMap<_, _>>();
            Value::Object(Map::from_iter(ordered))
        }
        Value::Array(values) => {
            let canonical_values = values.into_iter().map(canonicalize).collect();
            Value::Array(canonical_values)
        }
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes with deterministic ordering.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, MecError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    let canonical = canonicalize(value);
    let mut bytes = Vec::new();
    serde_json::to_writer(&mut bytes, &canonical).map_err(|err| serde_error("json_write", err))?;
    Ok(bytes)
}

/// Deserializes a value from JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, MecError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json_deserialize", err))
}

/// Serializes a value into deterministic YAML.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, MecError> {
    serde_yaml::to_string(value).map_err(|err| serde_error("yaml_serialize", err))
}

/// Deserializes a YAML payload into the requested type.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, MecError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfiguration;
    use crate::test_fixtures::two_echo_config;

    #[test]
    fn canonical_json_orders_object_keys() {
        let value = serde_json::json!({"zeta": 1, "alpha": {"nested_z": 2, "nested_a": 3}});
        let bytes = to_canonical_json_bytes(&value).expect("canonical");
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.find("alpha").expect("alpha") < text.find("zeta").expect("zeta"));
        assert!(text.find("nested_a").expect("a") < text.find("nested_z").expect("z"));
    }

    #[test]
    fn configurations_round_trip_through_yaml() {
        let mut config = two_echo_config();
        config.smoothing = Some("3mm".to_string());
        config.highpass = Some(0.01);
        let yaml = to_yaml_string(&config).expect("to yaml");
        let restored: RunConfiguration = from_yaml_slice(yaml.as_bytes()).expect("from yaml");
        assert_eq!(config, restored);
    }
}
