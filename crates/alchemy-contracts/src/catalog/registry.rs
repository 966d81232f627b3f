use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const FOCUS_ASPECTS: &[&str] = &[
    "Subject Identity",
    "Outfit & Fashion",
    "Pose & Angle",
    "Art Style & Aesthetic",
    "Lighting & Atmosphere",
    "Background & Setting",
    "Motion & Camera Movement",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFamily {
    pub id: String,
    pub label: String,
    pub architecture: String,
    #[serde(rename = "type")]
    pub modality: String,
    pub default_resolution: u32,
    pub loader_node: String,
    pub notes: String,
    pub checkpoints: Vec<Checkpoint>,
}

impl ModelFamily {
    pub fn checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|checkpoint| checkpoint.id == id)
    }

    pub fn default_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryModel {
    pub id: String,
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxiliaryKind {
    Vae,
    Upscaler,
    FaceFixer,
    ControlModel,
}

impl AuxiliaryKind {
    pub const ALL: [AuxiliaryKind; 4] = [
        AuxiliaryKind::Vae,
        AuxiliaryKind::Upscaler,
        AuxiliaryKind::FaceFixer,
        AuxiliaryKind::ControlModel,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AuxiliaryKind::Vae => "VAEs",
            AuxiliaryKind::Upscaler => "Upscalers",
            AuxiliaryKind::FaceFixer => "Face fixers",
            AuxiliaryKind::ControlModel => "Control models",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryModels {
    #[serde(default)]
    pub vaes: Vec<AuxiliaryModel>,
    #[serde(default)]
    pub upscalers: Vec<AuxiliaryModel>,
    #[serde(default)]
    pub face_fixers: Vec<AuxiliaryModel>,
    #[serde(default)]
    pub control_models: Vec<AuxiliaryModel>,
}

impl AuxiliaryModels {
    pub fn of_kind(&self, kind: AuxiliaryKind) -> &[AuxiliaryModel] {
        match kind {
            AuxiliaryKind::Vae => &self.vaes,
            AuxiliaryKind::Upscaler => &self.upscalers,
            AuxiliaryKind::FaceFixer => &self.face_fixers,
            AuxiliaryKind::ControlModel => &self.control_models,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    model_families: Vec<ModelFamily>,
    #[serde(default)]
    auxiliary_models: AuxiliaryModels,
    #[serde(default)]
    focus_aspects: Option<Vec<String>>,
}

/// Read-only reference data: model families, their checkpoints and the
/// auxiliary models a workflow may add. Built once and shared by reference.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    families: IndexMap<String, ModelFamily>,
    auxiliary: AuxiliaryModels,
    focus_aspects: Vec<String>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        Self {
            families: default_families(),
            auxiliary: default_auxiliary_models(),
            focus_aspects: FOCUS_ASPECTS.iter().map(|item| (*item).to_string()).collect(),
        }
    }

    pub fn new(
        families: Vec<ModelFamily>,
        auxiliary: AuxiliaryModels,
        focus_aspects: Option<Vec<String>>,
    ) -> Result<Self> {
        let mut indexed = IndexMap::new();
        for family in families {
            if family.checkpoints.is_empty() {
                bail!("model family '{}' has no checkpoints", family.id);
            }
            let mut seen = HashSet::new();
            for checkpoint in &family.checkpoints {
                if !seen.insert(checkpoint.id.as_str()) {
                    bail!(
                        "duplicate checkpoint '{}' in model family '{}'",
                        checkpoint.id,
                        family.id
                    );
                }
            }
            let id = family.id.clone();
            if indexed.insert(id.clone(), family).is_some() {
                bail!("duplicate model family '{id}'");
            }
        }
        Ok(Self {
            families: indexed,
            auxiliary,
            focus_aspects: focus_aspects.unwrap_or_else(|| {
                FOCUS_ASPECTS.iter().map(|item| (*item).to_string()).collect()
            }),
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: CatalogFile =
            serde_json::from_str(raw).context("model catalog is not valid JSON")?;
        Self::new(
            parsed.model_families,
            parsed.auxiliary_models,
            parsed.focus_aspects,
        )
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model catalog {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to load model catalog {}", path.display()))
    }

    pub fn lookup_family(&self, id: &str) -> Option<&ModelFamily> {
        self.families.get(id)
    }

    pub fn lookup_checkpoint<'a>(
        &self,
        family: &'a ModelFamily,
        id: &str,
    ) -> Option<&'a Checkpoint> {
        family.checkpoint(id)
    }

    pub fn lookup_auxiliary(&self, kind: AuxiliaryKind, id: &str) -> Option<&AuxiliaryModel> {
        self.auxiliary
            .of_kind(kind)
            .iter()
            .find(|model| model.id == id)
    }

    pub fn families(&self) -> impl Iterator<Item = &ModelFamily> {
        self.families.values()
    }

    pub fn default_family(&self) -> Option<&ModelFamily> {
        self.families.values().next()
    }

    pub fn auxiliary(&self) -> &AuxiliaryModels {
        &self.auxiliary
    }

    pub fn focus_aspects(&self) -> &[String] {
        &self.focus_aspects
    }
}

fn default_families() -> IndexMap<String, ModelFamily> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str,
                      label: &str,
                      architecture: &str,
                      modality: &str,
                      default_resolution: u32,
                      loader_node: &str,
                      notes: &str,
                      checkpoints: &[(&str, &str, &str)]| {
        map.insert(
            id.to_string(),
            ModelFamily {
                id: id.to_string(),
                label: label.to_string(),
                architecture: architecture.to_string(),
                modality: modality.to_string(),
                default_resolution,
                loader_node: loader_node.to_string(),
                notes: notes.to_string(),
                checkpoints: checkpoints
                    .iter()
                    .map(|(id, label, path)| Checkpoint {
                        id: (*id).to_string(),
                        label: (*label).to_string(),
                        path: (*path).to_string(),
                    })
                    .collect(),
            },
        );
    };

    insert(
        "sd15",
        "Stable Diffusion 1.5 Family",
        "stable-diffusion-v1",
        "image",
        512,
        "CheckpointLoaderSimple",
        "All SD 1.x finetunes (Anything, DreamShaper, etc.) are compatible.",
        &[
            (
                "sd15_base",
                "Stable Diffusion 1.5",
                "models/checkpoints/sd15.safetensors",
            ),
            (
                "sd15_inpaint",
                "SD 1.5 Inpainting",
                "models/checkpoints/sd15_inpainting.safetensors",
            ),
        ],
    );
    insert(
        "sd21",
        "Stable Diffusion 2.x Family",
        "stable-diffusion-v2",
        "image",
        768,
        "CheckpointLoaderSimple",
        "Includes 2.0 / 2.1 512px and 768px variants.",
        &[
            (
                "sd21_base_512",
                "Stable Diffusion 2.1 (512)",
                "models/checkpoints/sd21_512.safetensors",
            ),
            (
                "sd21_base_768",
                "Stable Diffusion 2.1 (768)",
                "models/checkpoints/sd21_768.safetensors",
            ),
        ],
    );
    insert(
        "sdxl",
        "SDXL 1.0 Family",
        "sdxl-1.0",
        "image",
        1024,
        "SDXLCheckpointLoader",
        "SDXL base + refiner + SDXL finetunes.",
        &[
            (
                "sdxl_base",
                "SDXL 1.0 Base",
                "models/checkpoints/sdxl_base.safetensors",
            ),
            (
                "sdxl_refiner",
                "SDXL 1.0 Refiner",
                "models/checkpoints/sdxl_refiner.safetensors",
            ),
            (
                "sdxl_juggernaut",
                "Juggernaut XL (example finetune)",
                "models/checkpoints/juggernaut_xl.safetensors",
            ),
        ],
    );
    insert(
        "sd3",
        "Stable Diffusion 3 / 3.5",
        "stable-diffusion-3",
        "image",
        1024,
        "SD3CheckpointLoader",
        "Requires SD3-specific loader/workflow, separate text encoders.",
        &[
            (
                "sd3_medium",
                "Stable Diffusion 3 Medium",
                "models/checkpoints/sd3_medium.safetensors",
            ),
            (
                "sd3_large",
                "Stable Diffusion 3 Large",
                "models/checkpoints/sd3_large.safetensors",
            ),
            (
                "sd35_large",
                "Stable Diffusion 3.5 Large",
                "models/checkpoints/sd35_large.safetensors",
            ),
            (
                "sd35_turbo",
                "Stable Diffusion 3.5 Turbo",
                "models/checkpoints/sd35_turbo.safetensors",
            ),
        ],
    );
    insert(
        "flux1",
        "FLUX 1.x Family",
        "flux-1",
        "image",
        1024,
        "FLUXLoader",
        "Needs FLUX-specific custom nodes and workflows.",
        &[
            (
                "flux1_dev",
                "FLUX.1 dev",
                "models/checkpoints/flux1_dev.safetensors",
            ),
            (
                "flux1_schnell",
                "FLUX.1 schnell",
                "models/checkpoints/flux1_schnell.safetensors",
            ),
        ],
    );
    insert(
        "flux2",
        "FLUX.2 Family",
        "flux-2",
        "image",
        1024,
        "FLUX2Loader",
        "FLUX.2 dev/flex/pro variants via updated FLUX nodes.",
        &[
            (
                "flux2_dev",
                "FLUX.2 dev",
                "models/checkpoints/flux2_dev.safetensors",
            ),
            (
                "flux2_flex",
                "FLUX.2 flex",
                "models/checkpoints/flux2_flex.safetensors",
            ),
            (
                "flux2_pro",
                "FLUX.2 pro",
                "models/checkpoints/flux2_pro.safetensors",
            ),
        ],
    );
    insert(
        "z_image",
        "Z-Image Turbo (AuraFlow)",
        "auraflow",
        "image",
        1024,
        "UNETLoader (AuraFlow)",
        "Uses Qwen 3.4B LLM as text encoder. High adherence to natural language.",
        &[(
            "z_image_turbo",
            "Z-Image Turbo BF16",
            "z_image_turbo_bf16.safetensors",
        )],
    );
    insert(
        "wan22",
        "WAN 2.2 Family",
        "wan-2.2",
        "image+video",
        720,
        "WAN22Loader",
        "Requires WAN 2.2 custom nodes/workflows; supports T2I and T2V.",
        &[
            (
                "wan22_5b_ti2v",
                "Wan 2.2 5B (T2I/T2V)",
                "models/checkpoints/wan2.2_ti2v_5b_fp16.safetensors",
            ),
            (
                "wan22_14b_ti2v",
                "Wan 2.2 14B (T2I/T2V)",
                "models/checkpoints/wan2.2_ti2v_14b_fp16.safetensors",
            ),
        ],
    );
    insert(
        "svd",
        "Stable Video Diffusion",
        "stable-video-diffusion",
        "video",
        576,
        "VideoDiffusionLoader",
        "Includes SVD and similar open video models via video nodes.",
        &[
            (
                "svd_base",
                "Stable Video Diffusion Base",
                "models/checkpoints/svd_base.safetensors",
            ),
            (
                "svd_xt",
                "Stable Video Diffusion XT",
                "models/checkpoints/svd_xt.safetensors",
            ),
        ],
    );
    insert(
        "cascade",
        "Stable Cascade / Other",
        "stable-cascade",
        "image",
        1024,
        "CascadeCheckpointLoader",
        "Includes Stable Cascade, Kandinsky, Playground v2, PixArt, etc.",
        &[
            (
                "stable_cascade",
                "Stable Cascade",
                "models/checkpoints/stable_cascade.safetensors",
            ),
            (
                "kandinsky_2",
                "Kandinsky 2.x",
                "models/checkpoints/kandinsky2.safetensors",
            ),
            (
                "playground_v2",
                "Playground v2",
                "models/checkpoints/playground_v2.safetensors",
            ),
            (
                "pixart_sigma",
                "PixArt-Σ (Sigma)",
                "models/checkpoints/pixart_sigma.safetensors",
            ),
        ],
    );

    map
}

fn default_auxiliary_models() -> AuxiliaryModels {
    let models = |rows: &[(&str, &str, &str)]| -> Vec<AuxiliaryModel> {
        rows.iter()
            .map(|(id, label, path)| AuxiliaryModel {
                id: (*id).to_string(),
                label: (*label).to_string(),
                path: (*path).to_string(),
            })
            .collect()
    };

    AuxiliaryModels {
        vaes: models(&[
            ("vae_sd15", "VAE for SD 1.5", "models/vae/vae_sd15.safetensors"),
            ("vae_sdxl", "VAE for SDXL", "models/vae/vae_sdxl.safetensors"),
            (
                "vae_wan22",
                "VAE for Wan 2.2",
                "models/vae/vae_wan22.safetensors",
            ),
        ]),
        upscalers: models(&[
            (
                "4x_ultrasharp",
                "4x-UltraSharp",
                "models/upscale/4x_ultrasharp.safetensors",
            ),
            (
                "swinir_4x",
                "SwinIR 4x",
                "models/upscale/swinir_4x.safetensors",
            ),
        ]),
        face_fixers: models(&[
            ("gfpgan", "GFPGAN", "models/facefix/gfpgan.pth"),
            ("codeformer", "CodeFormer", "models/facefix/codeformer.pth"),
        ]),
        control_models: models(&[
            (
                "controlnet_canny",
                "ControlNet Canny",
                "models/controlnet/controlnet_canny.safetensors",
            ),
            (
                "controlnet_depth",
                "ControlNet Depth",
                "models/controlnet/controlnet_depth.safetensors",
            ),
            (
                "ip_adapter_face",
                "IP-Adapter Face",
                "models/ipadapter/ipadapter_face.safetensors",
            ),
        ]),
    }
}
