use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alchemy_contracts::catalog::{AuxiliaryKind, ModelCatalog};
use alchemy_contracts::credentials::{CredentialSources, EnvFileStore};
use alchemy_contracts::generation::{
    AuxiliarySelection, GenerationConfig, ImageInput, DEFAULT_CREATIVITY_LEVEL,
};
use alchemy_contracts::providers::ProviderId;
use alchemy_engine::{AlchemyError, PromptEngine, PromptReport, PromptRequest, ProviderSettings};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const GENERIC_FAILURE: &str = "Failed to generate prompt. Please try again.";

#[derive(Debug, Parser)]
#[command(
    name = "prompt-alchemy",
    version,
    about = "Turn reference images into diffusion-model prompts"
)]
struct Cli {
    /// Key file consulted after --api-key and before the environment.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,
    /// JSON model catalog replacing the built-in one.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = 60)]
    timeout: u64,
    #[arg(long, global = true, default_value = "warn")]
    log_level: Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Models,
    #[command(subcommand)]
    Keys(KeysCommand),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Reference images, sent in the order given.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    family: Option<String>,
    #[arg(long)]
    checkpoint: Option<String>,
    #[arg(long = "focus")]
    focus_aspects: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_CREATIVITY_LEVEL, value_parser = parse_creativity)]
    creativity: f64,
    #[arg(long, default_value = "")]
    context: String,
    #[arg(long)]
    upscaler: Option<String>,
    #[arg(long)]
    face_fixer: Option<String>,
    #[arg(long)]
    control_model: Option<String>,
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long)]
    api_key: Option<String>,
    /// Print the result as a single JSON object.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum KeysCommand {
    Set {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        api_key: String,
    },
    Show {
        #[arg(long)]
        provider: String,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("prompt-alchemy error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let catalog = match cli.catalog.as_deref() {
        Some(path) => ModelCatalog::from_path(path)?,
        None => ModelCatalog::builtin(),
    };
    let store = EnvFileStore::new(&cli.env_file);

    match cli.command {
        Command::Generate(args) => run_generate(args, catalog, &store, cli.timeout),
        Command::Models => {
            print_catalog(&catalog);
            Ok(0)
        }
        Command::Keys(command) => run_keys(command, &store),
    }
}

fn run_generate(
    args: GenerateArgs,
    catalog: ModelCatalog,
    store: &EnvFileStore,
    timeout_secs: u64,
) -> Result<i32> {
    let env: BTreeMap<String, String> = std::env::vars().collect();
    let settings =
        ProviderSettings::from_env(&env).with_timeout(Duration::from_secs(timeout_secs.max(1)));

    let images = args
        .images
        .iter()
        .map(|path| ImageInput::from_path(path))
        .collect::<Result<Vec<_>>>()?;
    let request = build_request(&args, &catalog, images)?;
    let credentials = load_credentials(store, request.api_key.as_deref(), env)?;
    let engine = PromptEngine::new(catalog, &settings);

    match engine.synthesize(&request, &credentials) {
        Ok(report) => {
            print_report(&report, args.json)?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("{}", user_message(&err));
            Ok(if err.is_provider_failure() { 3 } else { 2 })
        }
    }
}

/// The key file is only read when no explicit key was passed.
fn load_credentials(
    store: &EnvFileStore,
    explicit_key: Option<&str>,
    env: BTreeMap<String, String>,
) -> Result<CredentialSources> {
    let stored = match explicit_key {
        Some(_) => BTreeMap::new(),
        None => store.read_all()?,
    };
    Ok(CredentialSources::new(stored, env))
}

fn build_request(
    args: &GenerateArgs,
    catalog: &ModelCatalog,
    images: Vec<ImageInput>,
) -> Result<PromptRequest> {
    let family_id = match args.family.as_deref() {
        Some(family) => family.to_string(),
        None => catalog
            .default_family()
            .map(|family| family.id.clone())
            .context("model catalog has no families")?,
    };
    let mut config = GenerationConfig::new(family_id, args.checkpoint.clone().unwrap_or_default());
    config.focus_aspects = args.focus_aspects.clone();
    config.creativity_level = args.creativity;
    config.additional_context = args.context.clone();
    config.auxiliary = AuxiliarySelection {
        upscaler: non_empty(args.upscaler.as_deref()),
        face_fixer: non_empty(args.face_fixer.as_deref()),
        control_model: non_empty(args.control_model.as_deref()),
    };
    Ok(PromptRequest {
        images,
        config,
        provider: args.provider.clone(),
        api_key: non_empty(args.api_key.as_deref()),
    })
}

fn user_message(err: &AlchemyError) -> String {
    match err {
        AlchemyError::ProviderTransport { .. } | AlchemyError::ProviderResponse { .. } => {
            format!("{GENERIC_FAILURE} ({err})")
        }
        _ => err.to_string(),
    }
}

fn print_report(report: &PromptReport, as_json: bool) -> Result<()> {
    if as_json {
        let payload = json!({
            "prompt": report.result.prompt,
            "negativePrompt": report.result.negative_prompt,
            "modelFamily": report.family_label,
            "checkpoint": report.checkpoint_label,
            "provider": report.provider_label,
            "temperature": report.temperature,
            "checkpointFallback": report.checkpoint_fallback,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if let Some(reason) = report.checkpoint_fallback.as_deref() {
        eprintln!("note: {reason}");
    }
    println!(
        "Model: {} (Checkpoint: {})",
        report.family_label, report.checkpoint_label
    );
    println!(
        "Provider: {} (temperature {:.2})",
        report.provider_label, report.temperature
    );
    println!();
    println!("Prompt:\n{}", report.result.prompt);
    println!();
    if report.result.negative_prompt.is_empty() {
        println!("Negative prompt: (none)");
    } else {
        println!("Negative prompt:\n{}", report.result.negative_prompt);
    }
    Ok(())
}

fn print_catalog(catalog: &ModelCatalog) {
    println!("Model families:");
    for family in catalog.families() {
        println!(
            "  {} - {} [{}, {}, {}px, {}]",
            family.id,
            family.label,
            family.architecture,
            family.modality,
            family.default_resolution,
            family.loader_node
        );
        if !family.notes.is_empty() {
            println!("      {}", family.notes);
        }
        for checkpoint in &family.checkpoints {
            println!("      {} - {}", checkpoint.id, checkpoint.label);
        }
    }
    for kind in AuxiliaryKind::ALL {
        println!("{}:", kind.label());
        for model in catalog.auxiliary().of_kind(kind) {
            println!("  {} - {}", model.id, model.label);
        }
    }
    println!("Focus aspects:");
    for aspect in catalog.focus_aspects() {
        println!("  {aspect}");
    }
}

fn run_keys(command: KeysCommand, store: &EnvFileStore) -> Result<i32> {
    match command {
        KeysCommand::Set { provider, api_key } => {
            let provider = parse_provider(&provider)?;
            store.write_key(provider.primary_credential_name(), &api_key)?;
            println!(
                "Saved {} key to {}",
                provider.label(),
                display_path(store.path())
            );
            Ok(0)
        }
        KeysCommand::Show { provider } => {
            let provider = parse_provider(&provider)?;
            let stored = store.read_all()?;
            let key = CredentialSources::new(stored, Default::default())
                .resolve(provider.as_str(), None);
            match key {
                Some(key) => {
                    println!("{}: {}", provider.label(), mask_key(&key));
                    Ok(0)
                }
                None => {
                    println!(
                        "{}: no key stored in {}",
                        provider.label(),
                        display_path(store.path())
                    );
                    Ok(1)
                }
            }
        }
    }
}

fn parse_provider(raw: &str) -> Result<ProviderId> {
    match ProviderId::parse(raw) {
        Some(provider) => Ok(provider),
        None => bail!(
            "unknown provider '{raw}' (expected one of: {})",
            ProviderId::ALL.map(ProviderId::as_str).join(", ")
        ),
    }
}

fn parse_creativity(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("creativity must be between 0 and 1, got {value}"));
    }
    Ok(value)
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use alchemy_contracts::catalog::ModelCatalog;
    use alchemy_engine::AlchemyError;
    use clap::Parser;

    use alchemy_contracts::credentials::EnvFileStore;

    use super::{
        build_request, load_credentials, mask_key, parse_creativity, parse_provider, run_keys,
        user_message, Cli, Command, KeysCommand, GENERIC_FAILURE,
    };

    #[test]
    fn generate_args_collect_repeated_focus_flags() {
        let cli = Cli::try_parse_from([
            "prompt-alchemy",
            "generate",
            "a.png",
            "b.jpg",
            "--family",
            "sdxl",
            "--focus",
            "Pose & Angle",
            "--focus",
            "Subject Identity",
            "--creativity",
            "0.9",
            "--upscaler",
            "",
            "--provider",
            "grok",
        ])
        .unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate command");
        };
        assert_eq!(args.images.len(), 2);
        assert_eq!(args.focus_aspects, vec!["Pose & Angle", "Subject Identity"]);

        let request = build_request(&args, &ModelCatalog::builtin(), Vec::new()).unwrap();
        assert_eq!(request.config.model_family_id, "sdxl");
        assert_eq!(request.config.checkpoint_id, "");
        assert_eq!(request.config.creativity_level, 0.9);
        assert!(request.config.auxiliary.upscaler.is_none());
        assert_eq!(request.provider, "grok");
        assert!(request.api_key.is_none());
    }

    #[test]
    fn generate_defaults_to_first_catalog_family() {
        let cli = Cli::try_parse_from(["prompt-alchemy", "generate", "a.png"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate command");
        };
        let request = build_request(&args, &ModelCatalog::builtin(), Vec::new()).unwrap();
        assert_eq!(request.config.model_family_id, "sd15");
        assert_eq!(request.provider, "gemini");
        assert_eq!(request.config.creativity_level, 0.5);
    }

    #[test]
    fn generate_requires_an_image() {
        assert!(Cli::try_parse_from(["prompt-alchemy", "generate", "--family", "sd15"]).is_err());
    }

    #[test]
    fn creativity_outside_unit_range_is_rejected() {
        assert_eq!(parse_creativity("0.25"), Ok(0.25));
        assert!(parse_creativity("1.5").is_err());
        assert!(parse_creativity("warm").is_err());
    }

    #[test]
    fn provider_failures_get_the_generic_retry_message() {
        let err = AlchemyError::response("Gemini", "Gemini response was empty.");
        assert_eq!(
            user_message(&err),
            format!("{GENERIC_FAILURE} (Gemini: Gemini response was empty.)")
        );
        assert_eq!(
            user_message(&AlchemyError::MissingImages),
            "Please upload at least one reference image."
        );
    }

    #[test]
    fn keys_are_masked_and_providers_validated() {
        assert_eq!(mask_key("sk-1234567890"), "*********7890");
        assert_eq!(mask_key("short"), "*****");
        assert!(parse_provider("openai").is_ok());
        let err = parse_provider("claude").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown provider 'claude' (expected one of: gemini, openai, grok)"
        );
    }

    #[test]
    fn keys_set_writes_primary_name_and_show_finds_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvFileStore::new(dir.path().join("keys.env"));

        let missing = run_keys(
            KeysCommand::Show {
                provider: "grok".to_string(),
            },
            &store,
        )
        .unwrap();
        assert_eq!(missing, 1);

        let code = run_keys(
            KeysCommand::Set {
                provider: "Grok".to_string(),
                api_key: "xai-secret-value".to_string(),
            },
            &store,
        )
        .unwrap();
        assert_eq!(code, 0);
        let stored = store.read_all().unwrap();
        assert_eq!(
            stored.get("GROK_API_KEY").map(String::as_str),
            Some("xai-secret-value")
        );

        let shown = run_keys(
            KeysCommand::Show {
                provider: "grok".to_string(),
            },
            &store,
        )
        .unwrap();
        assert_eq!(shown, 0);
    }

    #[test]
    fn explicit_key_skips_an_unreadable_key_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the key file fails on read.
        let store = EnvFileStore::new(dir.path());
        let env = BTreeMap::from([("OPENAI_API_KEY".to_string(), "from-env".to_string())]);

        assert!(load_credentials(&store, None, env.clone()).is_err());
        let sources = load_credentials(&store, Some("explicit"), env).unwrap();
        assert_eq!(
            sources.resolve("openai", Some("explicit")).as_deref(),
            Some("explicit")
        );
        assert_eq!(sources.resolve("openai", None).as_deref(), Some("from-env"));
    }

    #[test]
    fn malformed_key_file_line_does_not_block_generate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "just some note\nOPENAI_API_KEY=x\n").unwrap();
        let store = EnvFileStore::new(&path);

        let sources = load_credentials(&store, None, BTreeMap::new()).unwrap();
        assert_eq!(sources.resolve("openai", None).as_deref(), Some("x"));
    }
}
