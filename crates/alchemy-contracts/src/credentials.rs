use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::providers::ProviderId;

/// A `.env`-style file holding provider keys.
#[derive(Debug, Clone)]
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every key/value pair in the file. A missing file reads as empty and
    /// lines that do not parse are skipped.
    pub fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let iter = dotenvy::from_path_iter(&self.path)
            .with_context(|| format!("failed to open key file {}", self.path.display()))?;
        let mut values = BTreeMap::new();
        for item in iter {
            match item {
                Ok((key, value)) => {
                    values.insert(key, value);
                }
                Err(dotenvy::Error::LineParse(line, index)) => {
                    warn!(
                        path = %self.path.display(),
                        line = line.trim(),
                        index,
                        "skipping unparseable key file line"
                    );
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to read key file {}", self.path.display()));
                }
            }
        }
        Ok(values)
    }

    /// Sets `key='value'`, replacing an existing assignment in place and
    /// leaving every other line untouched. The value is single-quoted so it
    /// reads back verbatim.
    pub fn write_key(&self, key: &str, value: &str) -> Result<()> {
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            bail!("key file entries need a non-empty name and value");
        }
        if value.contains(['\n', '\r']) {
            bail!("key file values must fit on one line");
        }
        let assignment = format!("{key}={}", quote_value(value));

        let existing = if self.path.exists() {
            fs::read_to_string(&self.path)
                .with_context(|| format!("failed to read key file {}", self.path.display()))?
        } else {
            String::new()
        };

        let mut updated = false;
        let mut lines: Vec<String> = Vec::new();
        for line in existing.lines() {
            let stripped = line.trim();
            if stripped.is_empty() || stripped.starts_with('#') {
                lines.push(line.to_string());
                continue;
            }
            let Some((existing_key, _)) = stripped.split_once('=') else {
                lines.push(line.to_string());
                continue;
            };
            if existing_key.trim() == key {
                lines.push(assignment.clone());
                updated = true;
            } else {
                lines.push(line.to_string());
            }
        }

        if !updated {
            if lines.last().map(|line| !line.is_empty()).unwrap_or(false) {
                lines.push(String::new());
            }
            lines.push(assignment);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        fs::write(&self.path, lines.join("\n") + "\n")
            .with_context(|| format!("failed to write key file {}", self.path.display()))
    }
}

/// Read-only snapshot of the persisted key store and the process
/// environment, consulted in that order.
#[derive(Debug, Clone, Default)]
pub struct CredentialSources {
    store: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
}

impl CredentialSources {
    pub fn new(store: BTreeMap<String, String>, env: BTreeMap<String, String>) -> Self {
        Self { store, env }
    }

    /// Explicit key first, then the store, then the environment; within a
    /// source the provider's primary name wins over its aliases.
    pub fn resolve(&self, provider: &str, explicit: Option<&str>) -> Option<String> {
        if let Some(explicit) = non_empty(explicit) {
            return Some(explicit);
        }
        let provider = ProviderId::parse(provider)?;
        let names = provider.credential_names();
        first_non_empty(&self.store, names).or_else(|| first_non_empty(&self.env, names))
    }
}

// Inside single quotes dotenvy only treats `'` and `\` specially; both are
// written as a backslash escape between closed quotes.
fn quote_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push_str("'\\");
            quoted.push(c);
            quoted.push('\'');
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn first_non_empty(values: &BTreeMap<String, String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| non_empty(values.get(*name).map(String::as_str)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use super::{CredentialSources, EnvFileStore};

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn explicit_key_always_wins() {
        let sources = CredentialSources::new(map(&[("OPENAI_API_KEY", "x")]), BTreeMap::new());
        assert_eq!(sources.resolve("openai", Some("")).as_deref(), Some("x"));
        assert_eq!(sources.resolve("openai", None).as_deref(), Some("x"));
        assert_eq!(sources.resolve("openai", Some("y")).as_deref(), Some("y"));
    }

    #[test]
    fn store_wins_over_environment() {
        let sources = CredentialSources::new(
            map(&[("GROK_API_KEY", "from-store")]),
            map(&[("GROK_API_KEY", "from-env")]),
        );
        assert_eq!(
            sources.resolve("grok", None).as_deref(),
            Some("from-store")
        );
    }

    #[test]
    fn primary_name_checked_before_alias() {
        let sources = CredentialSources::new(
            BTreeMap::new(),
            map(&[("API_KEY", "alias"), ("GEMINI_API_KEY", "primary")]),
        );
        assert_eq!(sources.resolve("gemini", None).as_deref(), Some("primary"));

        let alias_only = CredentialSources::new(BTreeMap::new(), map(&[("XAI_API_KEY", "xai")]));
        assert_eq!(alias_only.resolve("grok", None).as_deref(), Some("xai"));
    }

    #[test]
    fn blank_values_and_unknown_providers_are_absent() {
        let sources = CredentialSources::new(
            map(&[("OPENAI_API_KEY", "   ")]),
            map(&[("ANTHROPIC_API_KEY", "k")]),
        );
        assert_eq!(sources.resolve("openai", Some("  ")), None);
        assert_eq!(sources.resolve("anthropic", None), None);
    }

    #[test]
    fn env_file_store_reads_missing_file_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = EnvFileStore::new(temp.path().join(".env"));
        assert!(store.read_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn env_file_store_replaces_existing_key_and_keeps_other_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        fs::write(
            &path,
            "# provider keys\nOPENAI_API_KEY=old\n\nGEMINI_API_KEY=\"gem\"\n",
        )?;
        let store = EnvFileStore::new(&path);
        store.write_key("OPENAI_API_KEY", "new")?;

        let raw = fs::read_to_string(&path)?;
        assert_eq!(
            raw,
            "# provider keys\nOPENAI_API_KEY='new'\n\nGEMINI_API_KEY=\"gem\"\n"
        );
        let values = store.read_all()?;
        assert_eq!(values.get("OPENAI_API_KEY").map(String::as_str), Some("new"));
        assert_eq!(values.get("GEMINI_API_KEY").map(String::as_str), Some("gem"));
        Ok(())
    }

    #[test]
    fn env_file_store_appends_new_key_after_blank_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        fs::write(&path, "GEMINI_API_KEY=gem\n")?;
        let store = EnvFileStore::new(&path);
        store.write_key("GROK_API_KEY", "grok")?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "GEMINI_API_KEY=gem\n\nGROK_API_KEY='grok'\n"
        );

        let sources = CredentialSources::new(store.read_all()?, BTreeMap::new());
        assert_eq!(sources.resolve("grok", None).as_deref(), Some("grok"));
        Ok(())
    }

    #[test]
    fn env_file_store_rejects_empty_values() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = EnvFileStore::new(temp.path().join(".env"));
        assert!(store.write_key("OPENAI_API_KEY", " ").is_err());
        assert!(!store.path().exists());
        Ok(())
    }

    #[test]
    fn env_file_store_skips_unparseable_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        fs::write(&path, "just some note\nOPENAI_API_KEY=x\n")?;
        let store = EnvFileStore::new(&path);

        let values = store.read_all()?;
        assert_eq!(values.len(), 1);
        let sources = CredentialSources::new(values, BTreeMap::new());
        assert_eq!(sources.resolve("openai", None).as_deref(), Some("x"));
        Ok(())
    }

    #[test]
    fn env_file_store_keeps_special_characters_verbatim() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = EnvFileStore::new(temp.path().join(".env"));
        let keys = [
            ("OPENAI_API_KEY", "sk-ab$HOMEcd"),
            ("GROK_API_KEY", "abc #def"),
            ("GEMINI_API_KEY", r"it's a\back\slash\"),
        ];
        for (name, value) in keys {
            store.write_key(name, value)?;
        }

        let values = store.read_all()?;
        for (name, value) in keys {
            assert_eq!(values.get(name).map(String::as_str), Some(value), "{name}");
        }

        store.write_key("GROK_API_KEY", "replaced $X")?;
        assert_eq!(
            store.read_all()?.get("GROK_API_KEY").map(String::as_str),
            Some("replaced $X")
        );
        assert!(store.write_key("OPENAI_API_KEY", "two\nlines").is_err());
        Ok(())
    }
}
