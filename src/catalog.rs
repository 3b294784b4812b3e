use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::ConfigError;
use crate::schema::{DefaultValue, FieldKind, FieldRole, FieldSchema, ServiceDefinition, ServiceKind};

const REFERENCE_IMAGE: &str = "Image de référence";
const OPTIONAL_REFERENCE_IMAGE: &str = "Image de référence (optionnelle)";
const DESCRIPTION: &str = "Champ de description";
const COMMENTS: &str = "Commentaires supplémentaires";

/// The services offered by the studio, in display order.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    services: Vec<ServiceDefinition>,
}

impl ServiceCatalog {
    pub fn new(services: Vec<ServiceDefinition>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for service in &services {
            if !seen.insert(service.kind()) {
                return Err(ConfigError::DuplicateService(service.service_name().to_string()));
            }
        }
        Ok(Self { services })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let catalog = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!("📚 Loaded {} services from {}", catalog.services.len(), path.display());
        Ok(catalog)
    }

    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    pub fn get(&self, service_name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.service_name() == service_name)
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        Self::new(builtin_services()?)
    }
}

fn builtin_services() -> Result<Vec<ServiceDefinition>, ConfigError> {
    Ok(vec![
        ServiceDefinition::new(
            ServiceKind::RealisticPhoto.service_name(),
            "Transformez une photo de référence en shooting professionnel ultra-réaliste.",
            vec![
                FieldSchema::new(REFERENCE_IMAGE, FieldKind::Upload).required().role(FieldRole::PrimaryInput),
                FieldSchema::new("Type de shooting", FieldKind::Dropdown)
                    .options(["Portrait", "Mode", "Corporate", "Produit", "Lifestyle"]),
                FieldSchema::new("Éclairage", FieldKind::Dropdown)
                    .options(["Lumière naturelle", "Studio", "Golden hour", "Néon", "Clair-obscur"]),
                FieldSchema::new("Arrière-plan", FieldKind::CheckboxGroup)
                    .options(["Studio uni", "Urbain", "Nature", "Intérieur luxueux", "Plage"]),
                FieldSchema::new("Nombre d'images", FieldKind::Number).default_value(DefaultValue::Number(1)).max(4),
                FieldSchema::new(COMMENTS, FieldKind::Textarea)
                    .placeholder("Précisions sur la pose, la tenue, l'expression...")
                    .role(FieldRole::Comments),
            ],
        )?,
        ServiceDefinition::new(
            ServiceKind::PhotoshopImage.service_name(),
            "Créez ou retouchez une image à partir d'une description détaillée.",
            vec![
                FieldSchema::new(OPTIONAL_REFERENCE_IMAGE, FieldKind::Upload).role(FieldRole::PrimaryInput),
                FieldSchema::new(DESCRIPTION, FieldKind::Textarea)
                    .required()
                    .placeholder("Décrivez l'image souhaitée...")
                    .role(FieldRole::Description),
                FieldSchema::new("Style artistique", FieldKind::Dropdown)
                    .options(["Photoréaliste", "Illustration", "Peinture numérique", "3D", "Aquarelle"]),
                FieldSchema::new("Format", FieldKind::Dropdown).options(["1:1", "16:9", "9:16", "4:3", "3:4"]),
                FieldSchema::new("Retouches", FieldKind::CheckboxGroup).options([
                    "Amélioration des couleurs",
                    "Suppression d'arrière-plan",
                    "Lissage de peau",
                    "Augmentation de la netteté",
                ]),
                FieldSchema::new(COMMENTS, FieldKind::Textarea)
                    .placeholder("Instructions supplémentaires...")
                    .role(FieldRole::Comments),
            ],
        )?,
        ServiceDefinition::new(
            ServiceKind::VeoVideo.service_name(),
            "Générez une courte vidéo à partir d'une description et d'une image optionnelle.",
            vec![
                FieldSchema::new(OPTIONAL_REFERENCE_IMAGE, FieldKind::Upload).role(FieldRole::PrimaryInput),
                FieldSchema::new(DESCRIPTION, FieldKind::Textarea)
                    .required()
                    .placeholder("Décrivez la scène, l'action et l'ambiance...")
                    .role(FieldRole::Description),
                FieldSchema::new("Mouvement de caméra", FieldKind::Dropdown)
                    .options(["Statique", "Travelling", "Panoramique", "Drone", "Zoom avant"]),
                FieldSchema::new("Ambiance", FieldKind::CheckboxGroup)
                    .options(["Cinématique", "Onirique", "Dynamique", "Mélancolique"]),
                FieldSchema::new("Durée (secondes)", FieldKind::Number).default_value(DefaultValue::Number(5)).max(8),
                FieldSchema::new(COMMENTS, FieldKind::Textarea)
                    .placeholder("Instructions supplémentaires...")
                    .role(FieldRole::Comments),
            ],
        )?,
    ])
}
