use alchemy_contracts::catalog::{AuxiliaryKind, Checkpoint, ModelCatalog, ModelFamily};
use alchemy_contracts::generation::GenerationConfig;

pub const SAFETY_NEGATIVE_PROMPT: &str = "blurry ugly bad";

/// Prompting idiom of a model family. Unknown family ids land on `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    TagHeavy,
    HybridTags,
    DetailedNaturalLanguage,
    Narrative,
    LlmCaption,
    VideoMotion,
    Standard,
    Generic,
}

impl PromptStyle {
    pub fn for_family(family_id: &str) -> Self {
        match family_id {
            "sd15" => PromptStyle::TagHeavy,
            "sdxl" => PromptStyle::HybridTags,
            "sd3" => PromptStyle::DetailedNaturalLanguage,
            "flux1" | "flux2" => PromptStyle::Narrative,
            "z_image" => PromptStyle::LlmCaption,
            "wan22" | "svd" => PromptStyle::VideoMotion,
            "cascade" | "sd21" => PromptStyle::Standard,
            _ => PromptStyle::Generic,
        }
    }

    pub fn guidance(self) -> &'static str {
        match self {
            PromptStyle::Narrative => {
                "Output a rich, descriptive natural language paragraph. Focus on textures, \
                 lighting, and physical details. Do NOT use comma-separated tags unless \
                 specifying a specific trigger word. Describe the scene as if writing a story. \
                 Flux handles complex instruction well."
            }
            PromptStyle::HybridTags => {
                "Output a hybrid format: start with a strong subject description in natural \
                 language, followed by comma-separated quality tags (e.g., 'masterpiece, best \
                 quality, 8k, ultra-detailed'). Include specific camera settings if \
                 photorealistic."
            }
            PromptStyle::TagHeavy => {
                "Heavily reliant on tags. Use comma-separated keywords. Focus on 'best quality', \
                 'masterpiece', and specific art station tags. Keep sentences short or broken \
                 into tokens."
            }
            PromptStyle::DetailedNaturalLanguage => {
                "Use natural language with high attention to detail. SD3 adheres strictly to \
                 the prompt, so include every visible element, color, and relationship between \
                 objects. It understands spatial relationships well."
            }
            PromptStyle::LlmCaption => {
                "This model (AuraFlow architecture) uses the Qwen 3.4B LLM as a text encoder. \
                 Write a long, flowing, multi-sentence caption (120-180 words) that reads like \
                 vivid alt-text: cover subject identity, wardrobe, props, background, lighting, \
                 composition, camera/lens info, and microtextures. Avoid tag soup and keep it \
                 natural. CRITICAL: The Negative Prompt must be exactly 'blurry ugly bad'."
            }
            PromptStyle::VideoMotion => {
                "This is for a VIDEO generation model. Describe the MOTION, camera movement \
                 (pan, zoom, tilt), and duration flow. Start with the scene description, then \
                 describe how the subject moves or how the camera moves. E.g., 'The girl smiles \
                 as the camera slowly zooms in'."
            }
            PromptStyle::Standard => {
                "Standard Stable Diffusion prompting. Use a mix of description and quality tags."
            }
            PromptStyle::Generic => {
                "Generate a high-quality, detailed prompt suitable for diffusion models."
            }
        }
    }

    /// The exact negative prompt this family's text encoder expects, if any.
    pub fn required_negative_prompt(self) -> Option<&'static str> {
        match self {
            PromptStyle::LlmCaption => Some(SAFETY_NEGATIVE_PROMPT),
            _ => None,
        }
    }

    pub fn negative_prompt_instruction(self) -> String {
        match self.required_negative_prompt() {
            Some(required) => format!("Negative Prompt MUST be exactly \"{required}\"."),
            None => "Include a concise Negative Prompt that filters common artifacts (blur, \
                     distortion, duplicate limbs, bad anatomy)."
                .to_string(),
        }
    }

    /// Applies the family rule to whatever negative prompt the provider sent.
    pub fn enforce_negative_prompt(self, provided: Option<&str>) -> String {
        match self.required_negative_prompt() {
            Some(required) => required.to_string(),
            None => provided.map(str::trim).unwrap_or_default().to_string(),
        }
    }
}

fn auxiliary_notes(catalog: &ModelCatalog, config: &GenerationConfig) -> String {
    let auxiliary = &config.auxiliary;
    let mut notes: Vec<String> = Vec::new();
    if let Some(control_id) = selected(auxiliary.control_model.as_deref()) {
        let label = catalog
            .lookup_auxiliary(AuxiliaryKind::ControlModel, control_id)
            .map(|model| model.label.as_str())
            .unwrap_or("control model");
        notes.push(format!(
            "User is using ControlNet ({label}). Ensure the prompt describes pose/structure \
             clearly so it aligns with the control signal."
        ));
    }
    if selected(auxiliary.upscaler.as_deref()).is_some() {
        notes.push(
            "User is using an Upscaler. Emphasize high-frequency details (texture, fabric \
             threads, pores) to justify the resolution."
                .to_string(),
        );
    }
    if selected(auxiliary.face_fixer.as_deref()).is_some() {
        notes.push(
            "User is using a face-fixing stage. Keep facial identity consistent and clearly \
             described."
                .to_string(),
        );
    }
    if notes.is_empty() {
        return "No auxiliary models selected.".to_string();
    }
    notes.join(" ")
}

fn selected(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn focus_instruction(catalog: &ModelCatalog, config: &GenerationConfig) -> String {
    let aspects = config.ordered_focus_aspects(catalog.focus_aspects());
    if aspects.is_empty() {
        return "Capture the overall vibe and subject of the images.".to_string();
    }
    format!(
        "Pay special attention to these aspects: {}. Ensure these are described in high detail.",
        aspects.join(", ")
    )
}

/// Compiles the provider-agnostic instruction document. Pure: the same
/// arguments always produce the same text.
pub fn build_instruction(
    catalog: &ModelCatalog,
    config: &GenerationConfig,
    family: &ModelFamily,
    checkpoint: &Checkpoint,
) -> String {
    let style = PromptStyle::for_family(&family.id);
    let context = selected(Some(config.additional_context.as_str())).unwrap_or("None provided");

    format!(
        "You are an expert AI Prompt Engineer.\n\
         Analyze the provided reference images and generate a SINGLE, perfect prompt that would \
         recreate a similar output using '{family_label}' (Checkpoint: {checkpoint_label}).\n\n\
         Target Model Architecture: {architecture}\n\
         Model Type: {modality}\n\
         Focus Areas: {focus}\n\
         User Context/Notes: {context}\n\
         {auxiliary}\n\n\
         Guidance:\n\
         - {guidance}\n\
         - If multiple images are provided, synthesize their common elements into one cohesive \
         character or style definition.\n\
         - {negative}\n\n\
         Return only valid JSON with exactly these two string keys and no other text:\n\
         {{\n  \"prompt\": \"THE GENERATED PROMPT STRING\",\n  \"negativePrompt\": \"THE NEGATIVE \
         PROMPT STRING (OR EMPTY)\"\n}}",
        family_label = family.label,
        checkpoint_label = checkpoint.label,
        architecture = family.architecture,
        modality = family.modality,
        focus = focus_instruction(catalog, config),
        auxiliary = auxiliary_notes(catalog, config),
        guidance = style.guidance(),
        negative = style.negative_prompt_instruction(),
    )
}
