use thiserror::Error;

/// Every way a prompt synthesis can fail. Provider failures are folded into
/// the two `Provider*` kinds at the adapter boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlchemyError {
    #[error("Please upload at least one reference image.")]
    MissingImages,

    #[error("Invalid model configuration: unknown model family '{0}'.")]
    UnknownFamily(String),

    #[error("Invalid model configuration: {0}")]
    InvalidCatalog(String),

    #[error("API Key is missing. Please enter your {provider} API Key.")]
    MissingCredential { provider: String },

    #[error("Unsupported provider selected: '{0}'.")]
    UnsupportedProvider(String),

    #[error("{provider} API HTTP{}: {detail}{}", format_status(.status), format_body(.body))]
    ProviderTransport {
        provider: String,
        status: Option<u16>,
        detail: String,
        body: String,
    },

    #[error("{provider}: {message}")]
    ProviderResponse { provider: String, message: String },
}

pub type Result<T> = std::result::Result<T, AlchemyError>;

impl AlchemyError {
    pub fn transport(
        provider: &str,
        status: Option<u16>,
        detail: impl Into<String>,
        body: &str,
    ) -> Self {
        AlchemyError::ProviderTransport {
            provider: provider.to_string(),
            status,
            detail: detail.into(),
            body: truncate_text(body.trim(), MAX_ERROR_BODY_CHARS),
        }
    }

    pub fn response(provider: &str, message: impl Into<String>) -> Self {
        AlchemyError::ProviderResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            AlchemyError::ProviderTransport { .. } | AlchemyError::ProviderResponse { .. }
        )
    }
}

pub(crate) const MAX_ERROR_BODY_CHARS: usize = 512;

fn format_status(status: &Option<u16>) -> String {
    status.map(|code| format!(" {code}")).unwrap_or_default()
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
