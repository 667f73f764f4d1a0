//! Telemetry readings as published by the field gateways.
//!
//! Wire shape: `{"Hospital": <name>, "tipo": "usina" | other, "Data": {...}}`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::topics::{COLLECTION_HOSPITAL, COLLECTION_PLANT};

/// Payload key carrying the entity name.
const KEY_ENTITY: &str = "Hospital";

/// Payload key carrying the device type discriminator.
const KEY_TYPE: &str = "tipo";

/// Payload key carrying the device fields.
const KEY_DATA: &str = "Data";

/// Device type discriminator value for oxygen plants.
const TYPE_PLANT: &str = "usina";

/// Device class of a monitored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    /// Oxygen-generation plant (PSA unit).
    Plant,
    /// Hospital air/oxygen central.
    Hospital,
}

impl EntityClass {
    /// Human-facing label used in alert titles.
    pub fn label(self) -> &'static str {
        match self {
            Self::Plant => "Oxygen Plant",
            Self::Hospital => "Hospital",
        }
    }

    /// Store collection that holds the latest reading for this class.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Plant => COLLECTION_PLANT,
            Self::Hospital => COLLECTION_HOSPITAL,
        }
    }
}

/// One decoded telemetry message for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub entity_name: String,
    pub entity_class: EntityClass,
    /// The device fields, uncoerced.
    pub fields: Map<String, Value>,
    /// The original payload as received.
    pub raw_payload: Value,
}

impl Reading {
    /// Decode a raw transport payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON payload.
    pub fn from_value(raw_payload: Value) -> Result<Self, DecodeError> {
        let object = raw_payload.as_object().ok_or(DecodeError::NotAnObject)?;

        let entity_name = match object.get(KEY_ENTITY) {
            None | Some(Value::Null) => return Err(DecodeError::MissingField(KEY_ENTITY)),
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    field: KEY_ENTITY,
                    reason: format!("expected a non-empty string, got {other}"),
                })
            }
        };

        let entity_class = match object.get(KEY_TYPE).and_then(Value::as_str) {
            Some(TYPE_PLANT) => EntityClass::Plant,
            _ => EntityClass::Hospital,
        };

        let fields = match object.get(KEY_DATA) {
            None | Some(Value::Null) => return Err(DecodeError::MissingField(KEY_DATA)),
            Some(Value::Object(fields)) => fields.clone(),
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    field: KEY_DATA,
                    reason: format!("expected an object, got {other}"),
                })
            }
        };

        Ok(Self {
            entity_name,
            entity_class,
            fields,
            raw_payload,
        })
    }

    /// Diagnostic dump appended to alert bodies.
    ///
    /// Plant readings are wrapped under `psa`; hospital readings are dumped
    /// as-is.
    pub fn extra_context(&self) -> Value {
        let fields = Value::Object(self.fields.clone());
        match self.entity_class {
            EntityClass::Plant => serde_json::json!({ "psa": fields }),
            EntityClass::Hospital => fields,
        }
    }

    /// The device fields serialized for the external store.
    pub fn fields_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}
