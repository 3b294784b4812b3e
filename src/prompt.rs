//! Folds a form state into the single instruction string handed to a capability.

use std::collections::HashSet;

use crate::form::{FieldValue, FormState};
use crate::schema::{FieldKind, FieldRole, ServiceDefinition};

/// Which entries the labelled section skips, and where the reserved free-text fields live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptLayout {
    excluded: HashSet<String>,
    description: Option<String>,
    comments: Option<String>,
}

impl PromptLayout {
    pub fn new(excluded: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { excluded: excluded.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    /// Derives the layout from field roles: description, comments and every upload are excluded.
    pub fn for_service(service: &ServiceDefinition) -> Self {
        let mut layout = Self::default();
        for field in service.fields() {
            match field.role {
                FieldRole::Description => layout.description = Some(field.name.clone()),
                FieldRole::Comments => layout.comments = Some(field.name.clone()),
                _ => {}
            }
            if field.role != FieldRole::None || field.kind == FieldKind::Upload {
                layout.excluded.insert(field.name.clone());
            }
        }
        layout
    }

    pub fn with_description(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.excluded.insert(name.clone());
        self.description = Some(name);
        self
    }

    pub fn with_comments(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.excluded.insert(name.clone());
        self.comments = Some(name);
        self
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }
}

/// Builds the prompt. Entries are visited in schema order, so equal inputs give equal output.
pub fn build_prompt(state: &FormState, layout: &PromptLayout) -> String {
    let mut prompt = String::new();

    for (name, value) in state.iter() {
        if layout.is_excluded(name) || value.is_empty() {
            continue;
        }
        match value {
            FieldValue::Selection(items) => {
                prompt.push_str(&format!("{}: {}. ", name, items.join(", ")));
            }
            FieldValue::Text(text) => prompt.push_str(&format!("{name}: {text}. ")),
            FieldValue::Number(n) => prompt.push_str(&format!("{name}: {n}. ")),
            // files never take part in the text
            FieldValue::File(_) | FieldValue::Empty => {}
        }
    }

    if let Some(description) = reserved_text(state, layout.description.as_deref()) {
        prompt.push_str(description);
    }
    if let Some(comments) = reserved_text(state, layout.comments.as_deref()) {
        prompt.push_str("\n\nAdditional instructions: ");
        prompt.push_str(comments);
    }

    prompt.trim().to_string()
}

fn reserved_text<'a>(state: &'a FormState, name: Option<&str>) -> Option<&'a str> {
    name.and_then(|n| state.get(n))
        .and_then(FieldValue::as_text)
        .filter(|text| !text.is_empty())
}
