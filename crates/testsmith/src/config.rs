//! Environment settings and persisted preferences.

use std::env;
use std::fmt::{self, Debug, Display};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use testsmith_claude_model::{ClaudeConfigBuilder, ClaudeProvider};
use testsmith_core::retrieval::{IndexedBestPractices, StaticBestPractices};
use testsmith_core::{
    Harness, IterationBudget, JestRunner, ModelClient, RunnerConfig, Sandbox,
    SessionBuilder,
};
use testsmith_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

/// Name of the preferences file inside the configuration directory.
pub const PREFERENCES_FILE: &str = "preferences.toml";

/// A configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The provider name is not known.
    #[error("unsupported provider {0:?} (expected openai or claude)")]
    UnsupportedProvider(String),
    /// The selected provider has no API key.
    #[error("{provider} is not configured, set {var}")]
    MissingApiKey {
        /// The provider.
        provider: Provider,
        /// The environment variable holding the key.
        var: &'static str,
    },
    /// An environment variable has an invalid value.
    #[error("invalid {var}={value:?}: {reason}")]
    InvalidVar {
        /// The variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The iteration budget is zero.
    #[error("the iteration budget must be at least 1")]
    ZeroBudget,
    /// The platform has no configuration directory.
    #[error("cannot determine the configuration directory")]
    NoConfigDir,
    /// The preferences file could not be read or written.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// The preferences file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The preferences file is not valid.
    #[error("invalid preferences in {}: {source}", path.display())]
    Parse {
        /// The preferences file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },
    /// The preferences could not be serialized.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

/// The model backend a session talks to.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Provider {
    /// OpenAI Chat Completions.
    #[default]
    OpenAI,
    /// Anthropic Messages.
    Claude,
}

impl Provider {
    /// The identifier used in preferences and on the command line.
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAI => testsmith_openai_model::PROVIDER_NAME,
            Provider::Claude => testsmith_claude_model::PROVIDER_NAME,
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        [Provider::OpenAI, Provider::Claude]
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnsupportedProvider(s.to_owned()))
    }
}

impl TryFrom<String> for Provider {
    type Error = ConfigError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Choices remembered between sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// The default provider.
    pub provider: Provider,
    /// The default iteration budget.
    pub iterations: IterationBudget,
}

impl Preferences {
    /// Returns `<config dir>/testsmith/preferences.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("testsmith").join(PREFERENCES_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Reads the preferences at `path`. A missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no preferences at {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Writes the preferences to `path`, creating its directory.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string(self)?;
        let io_err = |source| ConfigError::Io {
            path: path.to_owned(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(path, content).map_err(io_err)?;
        debug!("saved preferences to {}", path.display());
        Ok(())
    }
}

/// Settings read from the environment.
#[derive(Clone, Default)]
pub struct Settings {
    /// `OPENAI_API_KEY`.
    pub openai_api_key: Option<String>,
    /// `OPENAI_BASE_URL`.
    pub openai_base_url: Option<String>,
    /// `OPENAI_MODEL`.
    pub openai_model: Option<String>,
    /// `CLAUDE_API_KEY`.
    pub claude_api_key: Option<String>,
    /// `CLAUDE_BASE_URL`.
    pub claude_base_url: Option<String>,
    /// `CLAUDE_MODEL`.
    pub claude_model: Option<String>,
    /// `TESTSMITH_SANDBOX_DIR`, defaults to `testsmith` in the temporary
    /// directory.
    pub sandbox_dir: PathBuf,
    /// `TESTSMITH_RUNNER_DIR`, the project jest runs in.
    pub runner_dir: Option<PathBuf>,
    /// `TESTSMITH_RUNNER_TIMEOUT_SECS`.
    pub runner_timeout: Duration,
    /// `TESTSMITH_CORPUS_DIR`, holding `<corpus>.json` embedding indexes.
    pub corpus_dir: Option<PathBuf>,
}

impl Settings {
    /// Reads the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads variables through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let runner_timeout = match get("TESTSMITH_RUNNER_TIMEOUT_SECS") {
            None => testsmith_core::runner::DEFAULT_TIMEOUT,
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                Ok(_) => {
                    return Err(ConfigError::InvalidVar {
                        var: "TESTSMITH_RUNNER_TIMEOUT_SECS",
                        value,
                        reason: "must be positive".to_owned(),
                    });
                }
                Err(err) => {
                    return Err(ConfigError::InvalidVar {
                        var: "TESTSMITH_RUNNER_TIMEOUT_SECS",
                        value,
                        reason: err.to_string(),
                    });
                }
            },
        };

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            openai_model: get("OPENAI_MODEL"),
            claude_api_key: get("CLAUDE_API_KEY"),
            claude_base_url: get("CLAUDE_BASE_URL"),
            claude_model: get("CLAUDE_MODEL"),
            sandbox_dir: get("TESTSMITH_SANDBOX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("testsmith")),
            runner_dir: get("TESTSMITH_RUNNER_DIR").map(PathBuf::from),
            runner_timeout,
            corpus_dir: get("TESTSMITH_CORPUS_DIR").map(PathBuf::from),
        })
    }

    /// Creates the OpenAI provider.
    pub fn openai_provider(&self) -> Result<OpenAIProvider, ConfigError> {
        let api_key = self.openai_api_key.as_deref().ok_or(
            ConfigError::MissingApiKey {
                provider: Provider::OpenAI,
                var: "OPENAI_API_KEY",
            },
        )?;
        let mut builder = OpenAIConfigBuilder::with_api_key(api_key);
        if let Some(base_url) = &self.openai_base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(model) = &self.openai_model {
            builder = builder.with_model(model);
        }
        Ok(OpenAIProvider::new(builder.build()))
    }

    /// Creates the Claude provider.
    pub fn claude_provider(&self) -> Result<ClaudeProvider, ConfigError> {
        let api_key = self.claude_api_key.as_deref().ok_or(
            ConfigError::MissingApiKey {
                provider: Provider::Claude,
                var: "CLAUDE_API_KEY",
            },
        )?;
        let mut builder = ClaudeConfigBuilder::with_api_key(api_key);
        if let Some(base_url) = &self.claude_base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(model) = &self.claude_model {
            builder = builder.with_model(model);
        }
        Ok(ClaudeProvider::new(builder.build()))
    }

    /// Creates a client for `provider`.
    pub fn model_client(
        &self,
        provider: Provider,
    ) -> Result<ModelClient, ConfigError> {
        Ok(match provider {
            Provider::OpenAI => ModelClient::new(self.openai_provider()?),
            Provider::Claude => ModelClient::new(self.claude_provider()?),
        })
    }

    /// Creates the harness: the sandbox directory and the jest runner.
    pub fn harness(&self) -> Harness {
        let mut config =
            RunnerConfig::default().with_timeout(self.runner_timeout);
        if let Some(dir) = &self.runner_dir {
            config = config.with_working_dir(dir);
        }
        Harness::new(Sandbox::new(&self.sandbox_dir), JestRunner::new(config))
    }

    /// Creates a session builder talking to `provider`.
    ///
    /// Best practices come from the embedding indexes in the corpus
    /// directory when one is set (this needs the OpenAI key for
    /// embeddings), and from a built-in excerpt otherwise.
    pub fn session_builder(
        &self,
        provider: Provider,
    ) -> Result<SessionBuilder, ConfigError> {
        let builder =
            SessionBuilder::with_model_client(self.model_client(provider)?)
                .harness(self.harness());
        Ok(match &self.corpus_dir {
            Some(dir) => builder.best_practices(IndexedBestPractices::new(
                self.openai_provider()?,
                dir,
            )),
            None => builder.best_practices(StaticBestPractices::default()),
        })
    }
}

impl Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<deducted>");
        f.debug_struct("Settings")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("claude_api_key", &redact(&self.claude_api_key))
            .field("claude_base_url", &self.claude_base_url)
            .field("claude_model", &self.claude_model)
            .field("sandbox_dir", &self.sandbox_dir)
            .field("runner_dir", &self.runner_dir)
            .field("runner_timeout", &self.runner_timeout)
            .field("corpus_dir", &self.corpus_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_parse_provider() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Claude);
        let err = "gemini".parse::<Provider>().unwrap_err();
        assert!(err.to_string().starts_with("unsupported provider"));
    }

    #[test]
    fn test_preferences_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(PREFERENCES_FILE);
        assert_eq!(Preferences::load(&path).unwrap(), Preferences::default());

        let prefs = Preferences {
            provider: Provider::Claude,
            iterations: IterationBudget::new(5).unwrap(),
        };
        prefs.save(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "provider = \"claude\"\niterations = 5\n"
        );
        assert_eq!(Preferences::load(&path).unwrap(), prefs);
    }

    #[test]
    fn test_preferences_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREFERENCES_FILE);

        fs::write(&path, "provider = \"OpenAI\"\n").unwrap();
        assert_eq!(Preferences::load(&path).unwrap(), Preferences::default());

        fs::write(&path, "iterations = 0\n").unwrap();
        assert!(matches!(
            Preferences::load(&path),
            Err(ConfigError::Parse { .. })
        ));

        fs::write(&path, "provider = \"bard\"\n").unwrap();
        assert!(matches!(
            Preferences::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_settings_from_lookup() {
        let settings = Settings::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("CLAUDE_API_KEY", "  "),
            ("TESTSMITH_SANDBOX_DIR", "/tmp/sandbox"),
            ("TESTSMITH_RUNNER_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.claude_api_key, None);
        assert_eq!(settings.sandbox_dir, PathBuf::from("/tmp/sandbox"));
        assert_eq!(settings.runner_timeout, Duration::from_secs(30));
        assert_eq!(
            settings.harness().sandbox().test_dir(),
            Path::new("/tmp/sandbox/test")
        );

        assert!(settings.model_client(Provider::OpenAI).is_ok());
        assert!(matches!(
            settings.model_client(Provider::Claude),
            Err(ConfigError::MissingApiKey {
                provider: Provider::Claude,
                ..
            })
        ));

        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-test"));
    }

    #[test]
    fn test_invalid_timeout() {
        for value in ["0", "soon"] {
            let err = Settings::from_lookup(lookup(&[(
                "TESTSMITH_RUNNER_TIMEOUT_SECS",
                value,
            )]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidVar { .. }));
        }
    }
}
