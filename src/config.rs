//! Configuration types for rippl
//!
//! [`Config`] can be deserialized from JSON (durations as whole seconds) or
//! assembled from `RIPPL_*` environment variables with [`Config::from_env`].

use crate::error::{Error, Result};
use crate::filter::TermFilter;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, str::FromStr, time::Duration};

/// Main configuration for the supervisor and its collaborators
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Subreddits to stream, one worker each
    pub sources: Vec<String>,

    /// Only forward posts whose title contains one of these terms (empty = all)
    #[serde(default)]
    pub filter_terms: TermFilter,

    /// Polling interval for every source (default: one second per source)
    #[serde(default, with = "optional_duration_serde")]
    pub poll_interval: Option<Duration>,

    /// Period between buffer drains (default: the polling interval)
    #[serde(default, with = "optional_duration_serde")]
    pub dispatch_period: Option<Duration>,

    /// Maximum number of buffered submissions (default: 10)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Dispatch as soon as the buffer fills instead of waiting for the next tick
    #[serde(default = "default_true")]
    pub eager_dispatch: bool,

    /// How long shutdown waits for in-flight sink calls (default: 10 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Reddit API settings
    #[serde(default)]
    pub reddit: RedditConfig,

    /// Where drained batches go
    #[serde(default)]
    pub sink: SinkConfig,

    /// Optional HTTP intake for externally submitted identifiers
    #[serde(default)]
    pub intake: Option<IntakeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            filter_terms: TermFilter::default(),
            poll_interval: None,
            dispatch_period: None,
            buffer_capacity: default_buffer_capacity(),
            eager_dispatch: true,
            shutdown_grace: default_shutdown_grace(),
            reddit: RedditConfig::default(),
            sink: SinkConfig::default(),
            intake: None,
        }
    }
}

/// Reddit API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedditConfig {
    /// Script-app credentials; without them the public JSON listings are used
    #[serde(default)]
    pub credentials: Option<RedditCredentials>,

    /// User-Agent header sent with every request (default: "rippl v1")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Override for the listing host (default depends on whether credentials are set)
    #[serde(default)]
    pub api_url: Option<String>,

    /// Override for the token endpoint host (default: "https://www.reddit.com")
    #[serde(default)]
    pub auth_url: Option<String>,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            user_agent: default_user_agent(),
            api_url: None,
            auth_url: None,
        }
    }
}

/// Credentials for Reddit's password grant
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedditCredentials {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

/// Download sink selection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Run a local program with the identifiers as arguments
    Command {
        /// Program to run (default: "python3")
        #[serde(default = "default_program")]
        program: PathBuf,
        /// Script passed as the first argument (default: "download.py")
        #[serde(default = "default_script")]
        script: Option<PathBuf>,
        /// Extra arguments placed before the identifiers
        #[serde(default)]
        args: Vec<String>,
    },

    /// POST the identifiers to a download server
    Http {
        /// Download server URL
        url: String,
        /// Request shape
        #[serde(default)]
        mode: HttpSinkMode,
        /// Per-request timeout (default: 30 seconds)
        #[serde(default = "default_sink_timeout", with = "duration_serde")]
        timeout: Duration,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Command {
            program: default_program(),
            script: default_script(),
            args: Vec::new(),
        }
    }
}

/// Request shape used by the HTTP sink
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpSinkMode {
    /// One `{"submission_id": "<id>"}` request per identifier
    #[default]
    PerItem,
    /// One request carrying a JSON array of identifiers
    Batch,
}

impl FromStr for HttpSinkMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "per_item" | "per-item" | "item" => Ok(HttpSinkMode::PerItem),
            "batch" => Ok(HttpSinkMode::Batch),
            other => Err(Error::config(
                format!("unknown download mode '{other}' (expected per_item or batch)"),
                "RIPPL_DOWNLOAD_MODE",
            )),
        }
    }
}

/// Submission intake server settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Address to listen on
    pub bind_address: SocketAddr,
}

impl Config {
    /// Source names with surrounding whitespace removed and blanks skipped
    pub fn source_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Effective polling interval
    ///
    /// Defaults to one second per configured source, which keeps the total
    /// request rate around one per second.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or_else(|| {
            let sources = self.source_names().len().max(1) as u64;
            Duration::from_secs(sources)
        })
    }

    /// Effective dispatch period
    pub fn dispatch_period(&self) -> Duration {
        self.dispatch_period.unwrap_or_else(|| self.poll_interval())
    }

    /// Check the configuration for values the supervisor cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.source_names().is_empty() {
            return Err(Error::config(
                "at least one source must be configured",
                "sources",
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::config(
                "buffer capacity must be at least 1",
                "buffer_capacity",
            ));
        }
        if self.poll_interval.is_some_and(|d| d.is_zero()) {
            return Err(Error::config(
                "poll interval must be positive",
                "poll_interval",
            ));
        }
        if self.dispatch_period.is_some_and(|d| d.is_zero()) {
            return Err(Error::config(
                "dispatch period must be positive",
                "dispatch_period",
            ));
        }
        if let SinkConfig::Http { url, .. } = &self.sink {
            url::Url::parse(url).map_err(|e| {
                Error::config(format!("invalid download server URL '{url}': {e}"), "sink.url")
            })?;
        }
        Ok(())
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `RIPPL_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or malformed settings.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// Uses the same keys as [`Config::from_env`]. Blank values count as unset.
    /// An unparsable `RIPPL_INTERVAL` or `RIPPL_DISPATCH_PERIOD` falls back to
    /// the default with a warning; other malformed values are errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or malformed settings.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Config {
            sources: get("RIPPL_SUBREDDITS")
                .map(|s| s.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            filter_terms: get("RIPPL_SEARCH_TERMS")
                .map(|s| TermFilter::from_csv(&s))
                .unwrap_or_default(),
            poll_interval: lenient_secs(get("RIPPL_INTERVAL"), "RIPPL_INTERVAL"),
            dispatch_period: lenient_secs(get("RIPPL_DISPATCH_PERIOD"), "RIPPL_DISPATCH_PERIOD"),
            ..Default::default()
        };

        if let Some(capacity) = get("RIPPL_BUFFER_CAPACITY") {
            config.buffer_capacity = parse_value(&capacity, "RIPPL_BUFFER_CAPACITY")?;
        }
        if let Some(eager) = get("RIPPL_EAGER_DISPATCH") {
            config.eager_dispatch = parse_bool(&eager, "RIPPL_EAGER_DISPATCH")?;
        }
        if let Some(grace) = get("RIPPL_SHUTDOWN_GRACE") {
            config.shutdown_grace =
                Duration::from_secs(parse_value(&grace, "RIPPL_SHUTDOWN_GRACE")?);
        }

        if let Some(client_id) = get("RIPPL_CLIENT_ID") {
            let required = |key: &str| {
                get(key).ok_or_else(|| {
                    Error::config(format!("{key} is required when RIPPL_CLIENT_ID is set"), key)
                })
            };
            config.reddit.credentials = Some(RedditCredentials {
                client_id,
                client_secret: required("RIPPL_CLIENT_SECRET")?,
                username: required("RIPPL_USERNAME")?,
                password: required("RIPPL_PASSWORD")?,
            });
        }
        if let Some(user_agent) = get("RIPPL_USER_AGENT") {
            config.reddit.user_agent = user_agent;
        }

        config.sink = match get("RIPPL_DOWNLOAD_SERVER_URL") {
            Some(url) => SinkConfig::Http {
                url,
                mode: get("RIPPL_DOWNLOAD_MODE")
                    .map(|m| m.parse::<HttpSinkMode>())
                    .transpose()?
                    .unwrap_or_default(),
                timeout: default_sink_timeout(),
            },
            None => SinkConfig::Command {
                program: get("RIPPL_DOWNLOAD_PROGRAM")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_program),
                script: get("RIPPL_DOWNLOAD_SCRIPT")
                    .map(PathBuf::from)
                    .or_else(default_script),
                args: Vec::new(),
            },
        };

        if let Some(addr) = get("RIPPL_INTAKE_ADDR") {
            config.intake = Some(IntakeConfig {
                bind_address: parse_value(&addr, "RIPPL_INTAKE_ADDR")?,
            });
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_value<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(format!("invalid value '{value}' for {key}: {e}"), key))
}

fn parse_bool(value: &str, key: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(
            format!("invalid boolean '{value}' for {key}"),
            key,
        )),
    }
}

fn lenient_secs(value: Option<String>, key: &str) -> Option<Duration> {
    let value = value?;
    match value.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            tracing::warn!(key, value = %value, error = %e, "Ignoring unparsable interval, using default");
            None
        }
    }
}

// Default value functions
fn default_buffer_capacity() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    "rippl v1".to_string()
}

fn default_program() -> PathBuf {
    PathBuf::from("python3")
}

fn default_script() -> Option<PathBuf> {
    Some(PathBuf::from("download.py"))
}

fn default_sink_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
