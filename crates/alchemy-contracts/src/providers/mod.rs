use std::fmt;

/// The closed set of vision providers a prompt can be synthesized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    Gemini,
    OpenAi,
    Grok,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Gemini, ProviderId::OpenAi, ProviderId::Grok];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(ProviderId::Gemini),
            "openai" => Some(ProviderId::OpenAi),
            "grok" => Some(ProviderId::Grok),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAi => "openai",
            ProviderId::Grok => "grok",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProviderId::Gemini => "Gemini",
            ProviderId::OpenAi => "OpenAI",
            ProviderId::Grok => "Grok",
        }
    }

    /// Variable names holding this provider's key, primary name first.
    pub fn credential_names(self) -> &'static [&'static str] {
        match self {
            ProviderId::Gemini => &["GEMINI_API_KEY", "API_KEY"],
            ProviderId::OpenAi => &["OPENAI_API_KEY"],
            ProviderId::Grok => &["GROK_API_KEY", "XAI_API_KEY"],
        }
    }

    pub fn primary_credential_name(self) -> &'static str {
        self.credential_names()[0]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderId;

    #[test]
    fn provider_id_parse_is_case_insensitive_and_closed() {
        assert_eq!(ProviderId::parse("gemini"), Some(ProviderId::Gemini));
        assert_eq!(ProviderId::parse(" OpenAI "), Some(ProviderId::OpenAi));
        assert_eq!(ProviderId::parse("grok"), Some(ProviderId::Grok));
        assert_eq!(ProviderId::parse("anthropic"), None);
        assert_eq!(ProviderId::parse(""), None);
    }

    #[test]
    fn provider_ids_round_trip_through_display() {
        for provider in ProviderId::ALL {
            assert_eq!(ProviderId::parse(&provider.to_string()), Some(provider));
        }
    }

    #[test]
    fn aliases_follow_primary_credential_name() {
        assert_eq!(
            ProviderId::Gemini.credential_names(),
            &["GEMINI_API_KEY", "API_KEY"]
        );
        assert_eq!(ProviderId::Grok.primary_credential_name(), "GROK_API_KEY");
        assert_eq!(ProviderId::OpenAi.credential_names().len(), 1);
    }
}
