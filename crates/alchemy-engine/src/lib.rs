mod error;
mod instructions;
mod providers;

use alchemy_contracts::catalog::{Checkpoint, CheckpointSelector, ModelCatalog, ModelFamily};
use alchemy_contracts::credentials::CredentialSources;
use alchemy_contracts::generation::{
    GenerationConfig, ImageInput, PromptResult, DEFAULT_CREATIVITY_LEVEL,
};
use alchemy_contracts::providers::ProviderId;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

pub use error::{AlchemyError, Result};
pub use instructions::{build_instruction, PromptStyle, SAFETY_NEGATIVE_PROMPT};
pub use providers::{
    default_provider_registry, extract_output_text, parse_prompt_reply, EndpointConfig,
    GeminiProvider, PromptProvider, PromptProviderRegistry, ProviderPromptRequest,
    ProviderSettings, ResponsesProvider, DEFAULT_REQUEST_TIMEOUT, FALLBACK_PROMPT,
};

const MIN_TEMPERATURE: f64 = 0.2;
const TEMPERATURE_SPAN: f64 = 0.6;

/// Maps the 0..1 creativity slider linearly onto 0.2..0.8.
pub fn temperature_for_creativity(creativity_level: f64) -> f64 {
    let level = if creativity_level.is_finite() {
        creativity_level.clamp(0.0, 1.0)
    } else {
        DEFAULT_CREATIVITY_LEVEL
    };
    MIN_TEMPERATURE + level * TEMPERATURE_SPAN
}

/// Everything the outer surface collected for one synthesis.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub images: Vec<ImageInput>,
    pub config: GenerationConfig,
    pub provider: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptReport {
    pub result: PromptResult,
    pub provider_label: String,
    pub family_label: String,
    pub checkpoint_label: String,
    pub temperature: f64,
    pub checkpoint_fallback: Option<String>,
}

/// Stateless dispatcher: holds only read-only catalog data and the provider
/// adapters, so one engine can serve concurrent requests.
pub struct PromptEngine {
    catalog: ModelCatalog,
    providers: PromptProviderRegistry,
}

impl PromptEngine {
    pub fn new(catalog: ModelCatalog, settings: &ProviderSettings) -> Self {
        Self::with_registry(catalog, default_provider_registry(settings))
    }

    pub fn with_registry(catalog: ModelCatalog, providers: PromptProviderRegistry) -> Self {
        Self { catalog, providers }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn compile_instruction(
        &self,
        config: &GenerationConfig,
        family: &ModelFamily,
        checkpoint: &Checkpoint,
    ) -> String {
        build_instruction(&self.catalog, config, family, checkpoint)
    }

    /// Sends one synthesis to `provider_id`. Every precondition is checked
    /// before the network is touched.
    pub fn generate(
        &self,
        images: &[ImageInput],
        config: &GenerationConfig,
        provider_id: &str,
        api_key: Option<&str>,
        family: &ModelFamily,
        checkpoint: &Checkpoint,
    ) -> Result<PromptResult> {
        if images.is_empty() {
            return Err(AlchemyError::MissingImages);
        }
        let provider_id = ProviderId::parse(provider_id)
            .ok_or_else(|| AlchemyError::UnsupportedProvider(provider_id.to_string()))?;
        let Some(provider) = self.providers.get(provider_id) else {
            return Err(AlchemyError::UnsupportedProvider(
                provider_id.as_str().to_string(),
            ));
        };
        let Some(api_key) = api_key.map(str::trim).filter(|key| !key.is_empty()) else {
            return Err(AlchemyError::MissingCredential {
                provider: provider.label().to_string(),
            });
        };

        let instruction = self.compile_instruction(config, family, checkpoint);
        debug!(instruction = %instruction, "compiled instruction");
        let temperature = temperature_for_creativity(config.creativity());
        info!(
            provider = provider_id.as_str(),
            family = %family.id,
            checkpoint = %checkpoint.id,
            temperature,
            image_count = images.len(),
            "dispatching prompt synthesis"
        );

        let request = ProviderPromptRequest {
            instruction: &instruction,
            images,
            temperature,
            api_key,
            style: PromptStyle::for_family(&family.id),
        };
        match provider.generate(&request) {
            Ok(result) => {
                info!(
                    provider = provider_id.as_str(),
                    prompt_chars = result.prompt.chars().count(),
                    negative_prompt_chars = result.negative_prompt.chars().count(),
                    "prompt synthesized"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(provider = provider_id.as_str(), error = %err, "provider call failed");
                Err(err)
            }
        }
    }

    /// Full pipeline: catalog lookup, lenient checkpoint selection, key
    /// resolution, then `generate`.
    pub fn synthesize(
        &self,
        request: &PromptRequest,
        credentials: &CredentialSources,
    ) -> Result<PromptReport> {
        let span = info_span!("synthesize", request_id = %Uuid::new_v4());
        let _entered = span.enter();

        if request.images.is_empty() {
            return Err(AlchemyError::MissingImages);
        }
        let config = &request.config;
        let family = self
            .catalog
            .lookup_family(config.model_family_id.trim())
            .ok_or_else(|| AlchemyError::UnknownFamily(config.model_family_id.clone()))?;
        let selection = CheckpointSelector::new(family)
            .select(Some(config.checkpoint_id.as_str()))
            .map_err(AlchemyError::InvalidCatalog)?;
        if let Some(reason) = selection.fallback_reason.as_deref() {
            info!(family = %family.id, reason, "checkpoint fallback");
        }

        let provider = ProviderId::parse(&request.provider)
            .ok_or_else(|| AlchemyError::UnsupportedProvider(request.provider.clone()))?;
        let api_key = credentials.resolve(provider.as_str(), request.api_key.as_deref());

        let result = self.generate(
            &request.images,
            config,
            provider.as_str(),
            api_key.as_deref(),
            family,
            &selection.checkpoint,
        )?;
        Ok(PromptReport {
            result,
            provider_label: provider.label().to_string(),
            family_label: family.label.clone(),
            checkpoint_label: selection.checkpoint.label.clone(),
            temperature: temperature_for_creativity(config.creativity()),
            checkpoint_fallback: selection.fallback_reason,
        })
    }
}
