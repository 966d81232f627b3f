use super::registry::{Checkpoint, ModelFamily};

#[derive(Debug, Clone)]
pub struct CheckpointSelection {
    pub checkpoint: Checkpoint,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

/// Picks a checkpoint inside a known family. An unknown or missing id falls
/// back to the family's first checkpoint instead of failing.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointSelector<'a> {
    family: &'a ModelFamily,
}

impl<'a> CheckpointSelector<'a> {
    pub fn new(family: &'a ModelFamily) -> Self {
        Self { family }
    }

    pub fn select(&self, requested: Option<&str>) -> Result<CheckpointSelection, String> {
        let requested_value = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(requested_value) = requested_value {
            if let Some(checkpoint) = self.family.checkpoint(requested_value) {
                return Ok(CheckpointSelection {
                    checkpoint: checkpoint.clone(),
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
        }

        let Some(default) = self.family.default_checkpoint() else {
            return Err(format!(
                "Model family '{}' has no checkpoints.",
                self.family.id
            ));
        };
        let fallback_reason = match requested_value {
            Some(requested_value) => format!(
                "Checkpoint '{requested_value}' not found in '{}'; using '{}'.",
                self.family.id, default.id
            ),
            None => "No checkpoint specified; using default.".to_string(),
        };
        Ok(CheckpointSelection {
            checkpoint: default.clone(),
            requested: requested_value.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
