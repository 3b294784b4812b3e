//! Declarative description of a generation service and its input fields.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Upload,
    Dropdown,
    CheckboxGroup,
    Textarea,
    Number,
}

/// Special treatment a field receives when the prompt is assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldRole {
    #[default]
    None,
    /// Appended verbatim after the labelled fragments.
    Description,
    /// Appended as trailing additional instructions.
    Comments,
    /// The file handed to the capability alongside the prompt.
    PrimaryInput,
}

impl FieldRole {
    fn label(self) -> &'static str {
        match self {
            FieldRole::None => "none",
            FieldRole::Description => "description",
            FieldRole::Comments => "comments",
            FieldRole::PrimaryInput => "primaryInput",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Number(i64),
    Text(String),
    Selection(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Label and form-state key at once; unique within a service.
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub role: FieldRole,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            options: Vec::new(),
            default_value: None,
            max: None,
            placeholder: None,
            role: FieldRole::None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }

    fn check(&self, service: &str) -> Result<(), ConfigError> {
        let misplaced = |reason| ConfigError::MisplacedConstraint {
            service: service.to_string(),
            field: self.name.clone(),
            reason,
        };

        if matches!(self.kind, FieldKind::Dropdown | FieldKind::CheckboxGroup) && self.options.is_empty() {
            return Err(ConfigError::MissingOptions { service: service.to_string(), field: self.name.clone() });
        }
        if self.max.is_some() && self.kind != FieldKind::Number {
            return Err(misplaced("max only applies to number fields"));
        }
        if self.placeholder.is_some() && self.kind != FieldKind::Textarea {
            return Err(misplaced("placeholder only applies to textarea fields"));
        }
        match self.role {
            FieldRole::PrimaryInput if self.kind != FieldKind::Upload => {
                return Err(misplaced("primaryInput role requires an upload field"));
            }
            FieldRole::Description | FieldRole::Comments if self.kind != FieldKind::Textarea => {
                return Err(misplaced("description and comments roles require a textarea field"));
            }
            _ => {}
        }

        let default_fits = match (&self.default_value, self.kind) {
            (None, _) => true,
            (Some(DefaultValue::Number(_)), FieldKind::Number) => true,
            (Some(DefaultValue::Text(text)), FieldKind::Dropdown) => self.options.contains(text),
            (Some(DefaultValue::Text(_)), FieldKind::Textarea) => true,
            (Some(DefaultValue::Selection(items)), FieldKind::CheckboxGroup) => {
                items.iter().all(|item| self.options.contains(item))
            }
            _ => false,
        };
        if !default_fits {
            return Err(ConfigError::DefaultMismatch { service: service.to_string(), field: self.name.clone() });
        }
        Ok(())
    }
}

/// Closed set of services the studio knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    RealisticPhoto,
    PhotoshopImage,
    VeoVideo,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::RealisticPhoto, ServiceKind::PhotoshopImage, ServiceKind::VeoVideo];

    pub fn service_name(self) -> &'static str {
        match self {
            ServiceKind::RealisticPhoto => "Photographie Shooting UltraRéaliste",
            ServiceKind::PhotoshopImage => "Générateur d'Image Photoshop",
            ServiceKind::VeoVideo => "Générateur Vidéo VEO IA",
        }
    }

    pub fn from_service_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.service_name() == name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServiceDefinition {
    service_name: String,
    #[serde(default)]
    description: String,
    fields: Vec<FieldSchema>,
}

/// A validated service: its name resolves to a known [`ServiceKind`] and its fields are consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawServiceDefinition", rename_all = "camelCase")]
pub struct ServiceDefinition {
    #[serde(skip_serializing)]
    kind: ServiceKind,
    service_name: String,
    description: String,
    fields: Vec<FieldSchema>,
}

impl ServiceDefinition {
    pub fn new(
        service_name: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<FieldSchema>,
    ) -> Result<Self, ConfigError> {
        let service_name = service_name.into();
        let kind = ServiceKind::from_service_name(&service_name)
            .ok_or_else(|| ConfigError::UnknownService(service_name.clone()))?;

        let mut names = HashSet::new();
        let mut roles = HashSet::new();
        for field in &fields {
            if !names.insert(field.name.as_str()) {
                return Err(ConfigError::DuplicateField { service: service_name, field: field.name.clone() });
            }
            field.check(&service_name)?;
            if field.role != FieldRole::None && !roles.insert(field.role) {
                return Err(ConfigError::DuplicateRole { service: service_name, role: field.role.label() });
            }
        }

        Ok(Self { kind, service_name, description: description.into(), fields })
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_with_role(&self, role: FieldRole) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.role == role)
    }
}

impl TryFrom<RawServiceDefinition> for ServiceDefinition {
    type Error = ConfigError;

    fn try_from(raw: RawServiceDefinition) -> Result<Self, Self::Error> {
        ServiceDefinition::new(raw.service_name, raw.description, raw.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_service_is_rejected_at_load() {
        let err = ServiceDefinition::new("Générateur Audio", "", vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService(name) if name == "Générateur Audio"));
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let fields = vec![
            FieldSchema::new("Style", FieldKind::Dropdown).options(["A"]),
            FieldSchema::new("Style", FieldKind::Textarea),
        ];
        let err = ServiceDefinition::new(ServiceKind::PhotoshopImage.service_name(), "", fields).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField { field, .. } if field == "Style"));
    }

    #[test]
    fn dropdown_without_options_is_rejected() {
        let fields = vec![FieldSchema::new("Style", FieldKind::Dropdown)];
        let err = ServiceDefinition::new(ServiceKind::PhotoshopImage.service_name(), "", fields).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOptions { .. }));
    }

    #[test]
    fn default_must_match_kind() {
        let fields = vec![FieldSchema::new("Durée", FieldKind::Textarea).default_value(DefaultValue::Number(3))];
        let err = ServiceDefinition::new(ServiceKind::VeoVideo.service_name(), "", fields).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultMismatch { .. }));
    }

    #[test]
    fn primary_input_must_be_an_upload() {
        let fields = vec![FieldSchema::new("Photo", FieldKind::Textarea).role(FieldRole::PrimaryInput)];
        let err = ServiceDefinition::new(ServiceKind::RealisticPhoto.service_name(), "", fields).unwrap_err();
        assert!(matches!(err, ConfigError::MisplacedConstraint { .. }));
    }

    #[test]
    fn roles_are_unique() {
        let fields = vec![
            FieldSchema::new("A", FieldKind::Textarea).role(FieldRole::Comments),
            FieldSchema::new("B", FieldKind::Textarea).role(FieldRole::Comments),
        ];
        let err = ServiceDefinition::new(ServiceKind::VeoVideo.service_name(), "", fields).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRole { role: "comments", .. }));
    }

    #[test]
    fn deserializes_camel_case_definition() {
        let json = r#"{
            "serviceName": "Générateur Vidéo VEO IA",
            "description": "Vidéos courtes",
            "fields": [
                {"name": "Champ de description", "kind": "textarea", "required": true, "role": "description"},
                {"name": "Durée", "kind": "number", "defaultValue": 5, "max": 8},
                {"name": "Ambiance", "kind": "checkboxGroup", "options": ["Calme", "Épique"]}
            ]
        }"#;
        let def: ServiceDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.kind(), ServiceKind::VeoVideo);
        assert_eq!(def.fields().len(), 3);
        assert_eq!(def.field_with_role(FieldRole::Description).map(|f| f.name.as_str()), Some("Champ de description"));
        assert_eq!(def.field("Durée").and_then(|f| f.default_value.clone()), Some(DefaultValue::Number(5)));
    }

    #[test]
    fn deserializing_unknown_service_fails() {
        let json = r#"{"serviceName": "Nope", "fields": []}"#;
        assert!(serde_json::from_str::<ServiceDefinition>(json).is_err());
    }
}
