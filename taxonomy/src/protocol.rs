//! Wire shapes of the taxonomy update stream.
//!
//! Every message is a JSON object carrying a `msg_type` tag. Property
//! descriptors are kept as raw JSON here; turning them into [`Property`]
//! values is the job of the [`PropertyTypes`] registry.
//!
//! [`Property`]: crate::Property
//! [`PropertyTypes`]: crate::PropertyTypes

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Record;
use crate::error::Result;
use crate::error::TaxonomyError;
use crate::item::Datum;

/// Full snapshot of the taxonomy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoCoMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<BTreeMap<String, TypeMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<BTreeMap<String, ItemMessage>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TypeMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_properties: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_properties: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTypeMessage {
    pub name: String,
    #[serde(flatten)]
    pub body: TypeMessage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Datum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Record>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewItemMessage {
    pub id: String,
    #[serde(flatten)]
    pub body: ItemMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatedItemMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Record>,
}

/// New datum for an item. Servers send either the flat form
/// `{id, data, timestamp}` or the nested form `{id, value: {data, timestamp}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NewDataMessage {
    Nested { id: String, value: Datum },
    Flat {
        id: String,
        #[serde(flatten)]
        value: Datum,
    },
}

impl NewDataMessage {
    pub fn id(&self) -> &str {
        match self {
            NewDataMessage::Nested { id, .. } | NewDataMessage::Flat { id, .. } => id,
        }
    }

    pub fn into_parts(self) -> (String, Datum) {
        match self {
            NewDataMessage::Nested { id, value } | NewDataMessage::Flat { id, value } => {
                (id, value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateMessage {
    CoCo(CoCoMessage),
    NewType(NewTypeMessage),
    NewItem(NewItemMessage),
    UpdatedItem(UpdatedItemMessage),
    NewData(NewDataMessage),
}

impl UpdateMessage {
    /// Decodes a raw message. Returns `Ok(None)` for messages without a
    /// `msg_type` tag or with a tag this client does not understand.
    pub fn from_value(message: Value) -> Result<Option<Self>> {
        let Some(msg_type) = message
            .get("msg_type")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            tracing::debug!("ignoring message without msg_type");
            return Ok(None);
        };
        let malformed = |source: serde_json::Error| TaxonomyError::MalformedMessage {
            msg_type: msg_type.clone(),
            source,
        };
        let decoded = match msg_type.as_str() {
            "coco" => UpdateMessage::CoCo(serde_json::from_value(message).map_err(malformed)?),
            "new_type" => {
                UpdateMessage::NewType(serde_json::from_value(message).map_err(malformed)?)
            }
            "new_item" => {
                UpdateMessage::NewItem(serde_json::from_value(message).map_err(malformed)?)
            }
            "updated_item" => {
                UpdateMessage::UpdatedItem(serde_json::from_value(message).map_err(malformed)?)
            }
            "new_data" => {
                UpdateMessage::NewData(serde_json::from_value(message).map_err(malformed)?)
            }
            other => {
                tracing::debug!("ignoring message of unknown kind `{other}`");
                return Ok(None);
            }
        };
        Ok(Some(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn new_data_accepts_both_shapes() {
        let flat: NewDataMessage =
            serde_json::from_value(json!({"id": "s1", "data": {"temp": 1}, "timestamp": 5}))
                .unwrap();
        let nested: NewDataMessage = serde_json::from_value(
            json!({"id": "s1", "value": {"data": {"temp": 1}, "timestamp": 5}}),
        )
        .unwrap();
        assert_eq!(flat.clone().into_parts(), nested.into_parts());
        assert_eq!(flat.id(), "s1");
    }

    #[test]
    fn unknown_and_untagged_messages_are_skipped() {
        assert!(
            UpdateMessage::from_value(json!({"msg_type": "deleted_item", "id": "x"}))
                .unwrap()
                .is_none()
        );
        assert!(
            UpdateMessage::from_value(json!({"id": "x"}))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn malformed_message_names_its_kind() {
        let err = UpdateMessage::from_value(json!({"msg_type": "new_item"})).unwrap_err();
        assert!(matches!(
            err,
            TaxonomyError::MalformedMessage { ref msg_type, .. } if msg_type == "new_item"
        ));
    }

    #[test]
    fn new_type_body_is_flattened() {
        let msg = UpdateMessage::from_value(json!({
            "msg_type": "new_type",
            "name": "Sensor",
            "parents": ["Device"],
            "dynamic_properties": {"temp": {"type": "float"}}
        }))
        .unwrap()
        .unwrap();
        let UpdateMessage::NewType(ntm) = msg else {
            panic!("expected new_type");
        };
        assert_eq!(ntm.name, "Sensor");
        assert_eq!(ntm.body.parents, Some(vec!["Device".to_string()]));
        assert!(ntm.body.static_properties.is_none());
        assert_eq!(ntm.body.dynamic_properties.unwrap().len(), 1);
    }
}
