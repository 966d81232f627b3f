use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CREATIVITY_LEVEL: f64 = 0.5;
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliarySelection {
    pub upscaler: Option<String>,
    pub face_fixer: Option<String>,
    pub control_model: Option<String>,
}

/// Per-request settings. Built by the caller and dropped once the prompt
/// comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub model_family_id: String,
    pub checkpoint_id: String,
    #[serde(default)]
    pub focus_aspects: Vec<String>,
    #[serde(default = "default_creativity_level")]
    pub creativity_level: f64,
    #[serde(default)]
    pub additional_context: String,
    #[serde(default)]
    pub auxiliary: AuxiliarySelection,
}

fn default_creativity_level() -> f64 {
    DEFAULT_CREATIVITY_LEVEL
}

impl GenerationConfig {
    pub fn new(model_family_id: impl Into<String>, checkpoint_id: impl Into<String>) -> Self {
        Self {
            model_family_id: model_family_id.into(),
            checkpoint_id: checkpoint_id.into(),
            focus_aspects: Vec::new(),
            creativity_level: DEFAULT_CREATIVITY_LEVEL,
            additional_context: String::new(),
            auxiliary: AuxiliarySelection::default(),
        }
    }

    /// Focus aspects as a set: blanks and duplicates dropped, aspects listed
    /// in `catalog_order` first and in that order, unknown ones sorted after.
    pub fn ordered_focus_aspects(&self, catalog_order: &[String]) -> Vec<&str> {
        let selected: BTreeSet<&str> = self
            .focus_aspects
            .iter()
            .map(|aspect| aspect.trim())
            .filter(|aspect| !aspect.is_empty())
            .collect();
        let mut ordered: Vec<&str> = catalog_order
            .iter()
            .filter_map(|aspect| selected.get(aspect.as_str()).copied())
            .collect();
        ordered.extend(selected.iter().copied().filter(|aspect| {
            !catalog_order.iter().any(|known| known.as_str() == *aspect)
        }));
        ordered
    }

    pub fn creativity(&self) -> f64 {
        if self.creativity_level.is_finite() {
            self.creativity_level.clamp(0.0, 1.0)
        } else {
            DEFAULT_CREATIVITY_LEVEL
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
        Ok(Self::new(bytes, guess_image_mime(path)))
    }

    pub fn mime_or_default(&self) -> &str {
        let trimmed = self.mime_type.trim();
        if trimmed.is_empty() {
            DEFAULT_IMAGE_MIME
        } else {
            trimmed
        }
    }
}

pub fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" | "heif" => "image/heic",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// The canonical reply every provider is normalized into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub prompt: String,
    pub negative_prompt: String,
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{guess_image_mime, GenerationConfig, ImageInput, PromptResult};
    use crate::catalog::ModelCatalog;

    #[test]
    fn focus_aspects_are_order_insensitive() {
        let mut first = GenerationConfig::new("sdxl", "sdxl_base");
        first.focus_aspects = vec![
            "Lighting & Atmosphere".to_string(),
            "Subject Identity".to_string(),
            "Film Grain".to_string(),
        ];
        let mut second = first.clone();
        second.focus_aspects = vec![
            "Film Grain".to_string(),
            "Subject Identity".to_string(),
            " Lighting & Atmosphere ".to_string(),
            "Subject Identity".to_string(),
        ];
        let catalog = ModelCatalog::builtin();
        let order = catalog.focus_aspects();
        assert_eq!(
            first.ordered_focus_aspects(order),
            vec!["Subject Identity", "Lighting & Atmosphere", "Film Grain"]
        );
        assert_eq!(
            first.ordered_focus_aspects(order),
            second.ordered_focus_aspects(order)
        );
    }

    #[test]
    fn focus_aspects_follow_a_custom_catalog_order() {
        let mut config = GenerationConfig::new("sdxl", "sdxl_base");
        config.focus_aspects = vec![
            "Alpha".to_string(),
            "Zeta".to_string(),
            "Mood".to_string(),
            "Extra".to_string(),
        ];
        let order = vec!["Zeta".to_string(), "Mood".to_string(), "Alpha".to_string()];
        assert_eq!(
            config.ordered_focus_aspects(&order),
            vec!["Zeta", "Mood", "Alpha", "Extra"]
        );
    }

    #[test]
    fn creativity_is_clamped_and_defaults_when_not_finite() {
        let mut config = GenerationConfig::new("sd15", "sd15_base");
        config.creativity_level = 1.7;
        assert_eq!(config.creativity(), 1.0);
        config.creativity_level = -0.2;
        assert_eq!(config.creativity(), 0.0);
        config.creativity_level = f64::NAN;
        assert_eq!(config.creativity(), 0.5);
    }

    #[test]
    fn config_deserializes_from_camel_case_with_defaults() {
        let config: GenerationConfig = serde_json::from_str(
            r#"{"modelFamilyId": "flux1", "checkpointId": "flux1_dev",
                "auxiliary": {"faceFixer": "gfpgan"}}"#,
        )
        .unwrap();
        assert_eq!(config.creativity_level, 0.5);
        assert!(config.focus_aspects.is_empty());
        assert_eq!(config.auxiliary.face_fixer.as_deref(), Some("gfpgan"));
        assert!(config.auxiliary.upscaler.is_none());
    }

    #[test]
    fn image_mime_defaults_to_png() {
        assert_eq!(guess_image_mime(Path::new("ref.JPG")), "image/jpeg");
        assert_eq!(guess_image_mime(Path::new("ref.webp")), "image/webp");
        assert_eq!(guess_image_mime(Path::new("ref")), "image/png");
        assert_eq!(ImageInput::new(vec![1], " ").mime_or_default(), "image/png");
    }

    #[test]
    fn image_input_reads_file_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("ref.jpeg");
        std::fs::write(&path, [0xff, 0xd8, 0xff])?;
        let image = ImageInput::from_path(&path)?;
        assert_eq!(image.bytes, vec![0xff, 0xd8, 0xff]);
        assert_eq!(image.mime_type, "image/jpeg");
        Ok(())
    }

    #[test]
    fn prompt_result_serializes_negative_prompt_in_camel_case() {
        let result = PromptResult {
            prompt: "a cat".to_string(),
            negative_prompt: "blurry".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"prompt": "a cat", "negativePrompt": "blurry"})
        );
    }
}
