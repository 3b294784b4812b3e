//! Form state store: one value per schema field, replaced one event at a time.

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::FormError;
use crate::schema::{DefaultValue, FieldKind, FieldSchema, ServiceDefinition};

const FALLBACK_MIME: &str = "application/octet-stream";

/// An uploaded file; lives only as long as the submission that reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandle {
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Bytes,
}

impl FileHandle {
    /// Builds a handle, guessing the MIME type from the content when none is given.
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let mime_type = mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| sniff_mime(&bytes).to_string());
        Self { name: name.into(), mime_type, bytes }
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes).map(|f| f.to_mime_type()).unwrap_or(FALLBACK_MIME)
}

mod base64_bytes {
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Empty,
    Text(String),
    Number(i64),
    /// Checkbox selections, ordered by when they were picked.
    Selection(Vec<String>),
    File(FileHandle),
}

impl FieldValue {
    /// Missing for the purpose of `required`: unset, empty text, or nothing selected.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::Selection(items) => items.is_empty(),
            FieldValue::Number(_) | FieldValue::File(_) => false,
        }
    }

    pub fn as_file(&self) -> Option<&FileHandle> {
        match self {
            FieldValue::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    fn initial(field: &FieldSchema) -> Self {
        match (&field.default_value, field.kind) {
            (Some(DefaultValue::Selection(items)), FieldKind::CheckboxGroup) => FieldValue::Selection(items.clone()),
            (_, FieldKind::CheckboxGroup) => FieldValue::Selection(Vec::new()),
            (Some(DefaultValue::Number(n)), _) => FieldValue::Number(*n),
            (Some(DefaultValue::Text(text)), _) => FieldValue::Text(text.clone()),
            _ => FieldValue::Empty,
        }
    }
}

/// A field-change message consumed by [`FormState::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FieldEvent {
    Set { name: String, value: FieldValue },
    /// Adds the option to the selection, or removes it if already picked.
    Toggle { name: String, option: String },
    Clear { name: String },
}

/// Immutable snapshot of every field's value, keyed by field name in schema order.
///
/// Updates return a new snapshot; earlier snapshots stay valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    entries: Arc<IndexMap<String, FieldValue>>,
}

impl Serialize for FormState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.as_ref().serialize(serializer)
    }
}

impl FormState {
    pub fn initialize(service: &ServiceDefinition) -> Self {
        let entries = service
            .fields()
            .iter()
            .map(|field| (field.name.clone(), FieldValue::initial(field)))
            .collect();
        Self { entries: Arc::new(entries) }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Replaces exactly one entry. Values are not checked against the schema here.
    pub fn set_field(&self, name: &str, value: FieldValue) -> Result<FormState, FormError> {
        if !self.entries.contains_key(name) {
            return Err(FormError::UnknownField(name.to_string()));
        }
        let mut entries = (*self.entries).clone();
        entries.insert(name.to_string(), value);
        Ok(Self { entries: Arc::new(entries) })
    }

    pub fn apply(&self, service: &ServiceDefinition, event: FieldEvent) -> Result<FormState, FormError> {
        match event {
            FieldEvent::Set { name, value } => {
                let value = match value {
                    FieldValue::File(file) if file.mime_type.trim().is_empty() => {
                        FieldValue::File(FileHandle::new(file.name, None, file.bytes))
                    }
                    other => other,
                };
                self.set_field(&name, value)
            }
            FieldEvent::Toggle { name, option } => {
                let field = service.field(&name).ok_or_else(|| FormError::UnknownField(name.clone()))?;
                if field.kind != FieldKind::CheckboxGroup {
                    return Err(FormError::NotToggleable(name));
                }
                let mut selected = match self.get(&name) {
                    Some(FieldValue::Selection(items)) => items.clone(),
                    Some(_) => Vec::new(),
                    None => return Err(FormError::UnknownField(name)),
                };
                match selected.iter().position(|item| *item == option) {
                    Some(idx) => {
                        selected.remove(idx);
                    }
                    None => selected.push(option),
                }
                self.set_field(&name, FieldValue::Selection(selected))
            }
            FieldEvent::Clear { name } => {
                let field = service.field(&name).ok_or_else(|| FormError::UnknownField(name.clone()))?;
                let cleared = match field.kind {
                    FieldKind::CheckboxGroup => FieldValue::Selection(Vec::new()),
                    _ => FieldValue::Empty,
                };
                self.set_field(&name, cleared)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ServiceCatalog;
    use crate::schema::{FieldRole, ServiceKind};
    use pretty_assertions::assert_eq;

    fn service() -> ServiceDefinition {
        ServiceDefinition::new(
            ServiceKind::PhotoshopImage.service_name(),
            "",
            vec![
                FieldSchema::new("Image", FieldKind::Upload).role(FieldRole::PrimaryInput),
                FieldSchema::new("Style", FieldKind::Dropdown).options(["Cinematic", "Natural"]),
                FieldSchema::new("Ambiance", FieldKind::CheckboxGroup).options(["Calme", "Épique", "Sombre"]),
                FieldSchema::new("Nombre", FieldKind::Number).default_value(DefaultValue::Number(2)).max(4),
                FieldSchema::new("Description", FieldKind::Textarea).role(FieldRole::Description),
            ],
        )
        .unwrap()
    }

    #[test]
    fn initialize_populates_every_field() {
        let state = FormState::initialize(&service());
        let entries: Vec<_> = state.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert_eq!(
            entries,
            vec![
                ("Image".to_string(), FieldValue::Empty),
                ("Style".to_string(), FieldValue::Empty),
                ("Ambiance".to_string(), FieldValue::Selection(vec![])),
                ("Nombre".to_string(), FieldValue::Number(2)),
                ("Description".to_string(), FieldValue::Empty),
            ]
        );
    }

    #[test]
    fn initialize_is_idempotent() {
        let def = service();
        assert_eq!(FormState::initialize(&def), FormState::initialize(&def));
    }

    #[test]
    fn builtin_catalog_checkbox_groups_start_empty() {
        let catalog = ServiceCatalog::builtin().unwrap();
        for def in catalog.services() {
            let state = FormState::initialize(def);
            assert_eq!(state.len(), def.fields().len());
            for field in def.fields().iter().filter(|f| f.kind == FieldKind::CheckboxGroup) {
                assert!(matches!(state.get(&field.name), Some(FieldValue::Selection(_))));
            }
        }
    }

    #[test]
    fn set_field_leaves_previous_snapshot_untouched() {
        let before = FormState::initialize(&service());
        let after = before.set_field("Style", FieldValue::Text("Natural".into())).unwrap();
        assert_eq!(before.get("Style"), Some(&FieldValue::Empty));
        assert_eq!(after.get("Style"), Some(&FieldValue::Text("Natural".into())));
        assert_eq!(after.get("Nombre"), before.get("Nombre"));
    }

    #[test]
    fn set_field_rejects_unknown_names() {
        let state = FormState::initialize(&service());
        let err = state.set_field("Couleur", FieldValue::Text("Rouge".into())).unwrap_err();
        assert_eq!(err, FormError::UnknownField("Couleur".into()));
    }

    #[test]
    fn toggle_keeps_selection_order() {
        let def = service();
        let toggle = |option: &str| FieldEvent::Toggle { name: "Ambiance".into(), option: option.into() };
        let state = FormState::initialize(&def)
            .apply(&def, toggle("Sombre"))
            .and_then(|s| s.apply(&def, toggle("Calme")))
            .and_then(|s| s.apply(&def, toggle("Épique")))
            .and_then(|s| s.apply(&def, toggle("Calme")))
            .unwrap();
        assert_eq!(
            state.get("Ambiance"),
            Some(&FieldValue::Selection(vec!["Sombre".into(), "Épique".into()]))
        );
    }

    #[test]
    fn toggle_only_applies_to_checkbox_groups() {
        let def = service();
        let state = FormState::initialize(&def);
        let err = state
            .apply(&def, FieldEvent::Toggle { name: "Style".into(), option: "Natural".into() })
            .unwrap_err();
        assert_eq!(err, FormError::NotToggleable("Style".into()));
        assert_eq!(state.get("Style"), Some(&FieldValue::Empty));
    }

    #[test]
    fn serializes_as_ordered_map() {
        let def = service();
        let state = FormState::initialize(&def).set_field("Style", FieldValue::Text("Natural".into())).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 5);
        assert_eq!(json["Style"], serde_json::json!({ "type": "text", "value": "Natural" }));
        assert_eq!(json["Nombre"], serde_json::json!({ "type": "number", "value": 2 }));
    }

    #[test]
    fn clear_restores_kind_specific_empty_value() {
        let def = service();
        let state = FormState::initialize(&def)
            .apply(&def, FieldEvent::Toggle { name: "Ambiance".into(), option: "Calme".into() })
            .and_then(|s| s.apply(&def, FieldEvent::Clear { name: "Ambiance".into() }))
            .and_then(|s| s.apply(&def, FieldEvent::Clear { name: "Nombre".into() }))
            .unwrap();
        assert_eq!(state.get("Ambiance"), Some(&FieldValue::Selection(vec![])));
        assert_eq!(state.get("Nombre"), Some(&FieldValue::Empty));
    }

    #[test]
    fn emptiness_follows_required_semantics() {
        assert!(FieldValue::Empty.is_empty());
        assert!(FieldValue::Text(String::new()).is_empty());
        assert!(FieldValue::Selection(vec![]).is_empty());
        assert!(!FieldValue::Number(0).is_empty());
        assert!(!FieldValue::Text(" ".into()).is_empty());
    }

    #[test]
    fn file_handle_sniffs_png() {
        let png_magic = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
        let file = FileHandle::new("ref.png", None, png_magic);
        assert_eq!(file.mime_type, "image/png");

        let unknown = FileHandle::new("notes.bin", Some(String::new()), b"hello".to_vec());
        assert_eq!(unknown.mime_type, "application/octet-stream");
    }

    #[test]
    fn uploads_without_mime_type_are_sniffed() {
        let def = service();
        let event: FieldEvent = serde_json::from_str(
            r#"{"event": "set", "name": "Image", "value": {"type": "file", "value": {"name": "ref", "bytes": "/9j/4AAQSkZJRg=="}}}"#,
        )
        .unwrap();
        let state = FormState::initialize(&def).apply(&def, event).unwrap();
        let file = state.get("Image").and_then(FieldValue::as_file).unwrap();
        assert_eq!(file.mime_type, "image/jpeg");
    }

    #[test]
    fn field_events_deserialize_from_json() {
        let event: FieldEvent = serde_json::from_str(
            r#"{"event": "set", "name": "Style", "value": {"type": "text", "value": "Natural"}}"#,
        )
        .unwrap();
        assert_eq!(event, FieldEvent::Set { name: "Style".into(), value: FieldValue::Text("Natural".into()) });

        let upload: FieldEvent = serde_json::from_str(
            r#"{"event": "set", "name": "Image", "value": {"type": "file", "value": {"name": "a.jpg", "mimeType": "image/jpeg", "bytes": "aGVsbG8="}}}"#,
        )
        .unwrap();
        match upload {
            FieldEvent::Set { value: FieldValue::File(file), .. } => assert_eq!(&file.bytes[..], b"hello"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
