// Keymapper Config Parser - TOML/YAML with Serde
// Parses the ordered device rule list and normalizes keymaps at load time

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use super::rule::MatchRule;
use crate::key::key_from_name;
use crate::mapping::Keymap;
use crate::Key;

/// Configuration parser errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("YAML parse error: {0}")]
    YamlParse(String),

    #[error("Invalid id pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key {0} is mapped more than once in the same rule")]
    DuplicateKey(Key),

    #[error("No device rules defined")]
    NoRules,
}

/// Root of a TOML configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    /// Device rules, in match order
    #[serde(default)]
    device: Vec<RuleEntry>,
}

/// One device rule as written in the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    /// Regular expression searched in the device identity
    id: String,

    /// Source key name -> destination key name(s)
    #[serde(default)]
    keymap: IndexMap<String, KeymapTarget>,
}

/// A keymap value: one key name or a list of key names
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeymapTarget {
    One(String),
    Many(Vec<String>),
}

impl KeymapTarget {
    fn names(&self) -> &[String] {
        match self {
            KeymapTarget::One(name) => std::slice::from_ref(name),
            KeymapTarget::Many(names) => names,
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// Built-in catch-all rule
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Default => f.write_str("built-in default"),
        }
    }
}

/// Immutable, ordered list of device rules
#[derive(Debug, Clone)]
pub struct Config {
    rules: Vec<Arc<MatchRule>>,
    source: ConfigSource,
}

impl Default for Config {
    /// A single catch-all rule with no keymap (pure pass-through)
    fn default() -> Self {
        Self {
            rules: vec![Arc::new(MatchRule::catch_all())],
            source: ConfigSource::Default,
        }
    }
}

impl Config {
    /// Build a configuration from already-compiled rules
    pub fn from_rules(rules: impl IntoIterator<Item = MatchRule>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
            source: ConfigSource::Default,
        }
    }

    /// Load configuration from `path`, falling back to the default catch-all
    /// rule if the file is missing, unreadable or invalid.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let config = match Self::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                log::info!(
                    "Could not load configuration from {}: {}; using default rule",
                    path.display(),
                    e
                );
                Self::default()
            }
        };
        log::info!("Loaded configuration: {}", config);
        config
    }

    /// Parse a configuration file; the format is picked by file extension
    /// (`.yaml`/`.yml` for YAML, anything else for TOML).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let mut config = if is_yaml {
            Self::from_yaml(&content)?
        } else {
            Self::from_toml(&content)?
        };
        config.source = ConfigSource::File(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let parsed: ConfigToml =
            toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
        Self::from_entries(parsed.device)
    }

    /// Parse configuration from a YAML string (a top-level list of rules)
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let entries: Vec<RuleEntry> =
            serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse(e.to_string()))?;
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<RuleEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::NoRules);
        }
        let rules = entries
            .iter()
            .map(RuleEntry::to_rule)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_rules(rules))
    }

    /// Rules in match order
    pub fn rules(&self) -> &[Arc<MatchRule>] {
        &self.rules
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Default config file location: `<config dir>/keymapper/config.toml`,
    /// or `config.toml` in the working directory when no config dir is known.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("keymapper").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rule(s) from {}: [", self.rules.len(), self.source)?;
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", rule)?;
        }
        f.write_str("]")
    }
}

impl RuleEntry {
    fn to_rule(&self) -> Result<MatchRule, ConfigError> {
        let mut keymap = Keymap::new();
        for (source, target) in &self.keymap {
            let source = parse_key(source)?;
            let destinations = target
                .names()
                .iter()
                .map(|name| parse_key(name))
                .collect::<Result<Vec<_>, _>>()?;
            if keymap.insert(source, destinations).is_some() {
                return Err(ConfigError::DuplicateKey(source));
            }
        }

        MatchRule::new(&self.id, keymap).map_err(|e| ConfigError::InvalidPattern {
            pattern: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

fn parse_key(name: &str) -> Result<Key, ConfigError> {
    let trimmed = name.trim();
    key_from_name(trimmed).ok_or_else(|| ConfigError::InvalidKey(trimmed.to_string()))
}
