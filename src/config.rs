//! Queue configuration.
//!
//! # Environment
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `MAIL_SPOOL_DIR` | `./cache` | Cache root; the spool lives in `<root>/.spool` |
//! | `MAIL_SPOOL_LOCK_TTL_SECS` | `600` | Minimum interval between retry runs |
//! | `MAIL_SPOOL_MAX_BATCH` | unbounded | Messages claimed per retry run |
//! | `MAIL_SPOOL_ON_PARTIAL_FAILURE` | `discard` | `discard` or `requeue` |
//! | `MAIL_SPOOL_RECOVER_AFTER_SECS` | `900` | Age after which a claim counts as abandoned |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Cache key of the retry debounce token.
pub const LOCK_KEY: &str = "mailer.queue.timer";

/// Default debounce window between retry runs (10 minutes).
const DEFAULT_LOCK_TTL_SECS: u64 = 600;

/// Default age after which a `.processing` claim is considered abandoned.
const DEFAULT_RECOVER_AFTER_SECS: u64 = 900;

/// Default cache root.
const DEFAULT_CACHE_ROOT: &str = "./cache";

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// What a retry run does with a message some of whose recipients were refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialFailurePolicy {
    /// Delete the message; the refused recipients are reported to the caller.
    #[default]
    Discard,

    /// Return the whole message to the pending set for the next run.
    ///
    /// Accepted recipients will receive it again on the next attempt.
    Requeue,
}

impl FromStr for PartialFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(PartialFailurePolicy::Discard),
            "requeue" => Ok(PartialFailurePolicy::Requeue),
            other => Err(format!("expected `discard` or `requeue`, got `{other}`")),
        }
    }
}

impl fmt::Display for PartialFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialFailurePolicy::Discard => f.write_str("discard"),
            PartialFailurePolicy::Requeue => f.write_str("requeue"),
        }
    }
}

/// Configuration for a [`QueueProcessor`](crate::queue::QueueProcessor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolConfig {
    /// Cache root holding the `.spool` directory.
    pub cache_root: PathBuf,

    /// Cache key of the debounce token.
    pub lock_key: String,

    /// How long a retry run holds off other runs.
    ///
    /// Default: 10 minutes. Configure via `MAIL_SPOOL_LOCK_TTL_SECS`.
    pub lock_ttl: Duration,

    /// Upper bound on messages claimed per run. `None` claims everything.
    pub max_batch: Option<usize>,

    /// Handling of partially refused messages.
    pub on_partial_failure: PartialFailurePolicy,

    /// Age after which a claimed message is considered abandoned.
    ///
    /// Only used by explicit recovery, never by a retry run.
    pub recover_after: Duration,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_ROOT)
    }
}

impl SpoolConfig {
    /// Creates a configuration with default values under `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        SpoolConfig {
            cache_root: cache_root.into(),
            lock_key: LOCK_KEY.to_string(),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            max_batch: None,
            on_partial_failure: PartialFailurePolicy::default(),
            recover_after: Duration::from_secs(DEFAULT_RECOVER_AFTER_SECS),
        }
    }

    /// Reads the configuration from `MAIL_SPOOL_*` environment variables.
    ///
    /// Unset variables take their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config =
            SpoolConfig::new(lookup("MAIL_SPOOL_DIR").unwrap_or_else(|| DEFAULT_CACHE_ROOT.into()));

        if let Some(secs) = parse_var::<u64>(&lookup, "MAIL_SPOOL_LOCK_TTL_SECS")? {
            config.lock_ttl = Duration::from_secs(secs);
        }

        if let Some(max) = parse_var::<usize>(&lookup, "MAIL_SPOOL_MAX_BATCH")? {
            if max == 0 {
                return Err(ConfigError::Invalid {
                    name: "MAIL_SPOOL_MAX_BATCH",
                    value: max.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_batch = Some(max);
        }

        if let Some(policy) = parse_var(&lookup, "MAIL_SPOOL_ON_PARTIAL_FAILURE")? {
            config.on_partial_failure = policy;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "MAIL_SPOOL_RECOVER_AFTER_SECS")? {
            config.recover_after = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        })
}
