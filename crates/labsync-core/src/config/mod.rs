//! Legacy connection settings and field mapping configuration.
//!
//! Connection values resolve in layers: an explicit value wins, then the
//! process environment, then the legacy config file. The field mapping lives
//! in [`mapping`].

mod mapping;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, ParseOption, Properties};

pub use mapping::{FieldBinding, FieldMappingPlan, MappingDocument, MappingSet, TableMapping};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const LEGACY_URL_ENV: &str = "LABSYNC_LEGACY_URL";
pub const LEGACY_API_KEY_ENV: &str = "LABSYNC_LEGACY_API_KEY";
pub const LEGACY_USER_ENV: &str = "LABSYNC_LEGACY_USER";
pub const LEGACY_PASSWORD_ENV: &str = "LABSYNC_LEGACY_PASSWORD";
pub const LEGACY_CONF_ENV: &str = "LABSYNC_LEGACY_CONF";
pub const LEGACY_TIMEOUT_ENV: &str = "LABSYNC_LEGACY_TIMEOUT_SECS";

/// Default per-request timeout against the legacy service.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Keys read from the legacy config file.
const CONF_KEYS: &[&str] = &["url", "user", "pw"];

/// Snapshot of the environment variables that affect the legacy connection.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LegacyEnv {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub conf_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl LegacyEnv {
    /// Read the `LABSYNC_LEGACY_*` variables from the running process.
    pub fn from_process() -> Self {
        let var = |name: &str| normalize_text_option(std::env::var(name).ok());
        Self {
            url: var(LEGACY_URL_ENV),
            api_key: var(LEGACY_API_KEY_ENV),
            user: var(LEGACY_USER_ENV),
            password: var(LEGACY_PASSWORD_ENV),
            conf_path: var(LEGACY_CONF_ENV).map(PathBuf::from),
            timeout_secs: var(LEGACY_TIMEOUT_ENV).and_then(|raw| raw.parse().ok()),
        }
    }
}

impl fmt::Debug for LegacyEnv {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LegacyEnv")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("conf_path", &self.conf_path)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Credentials sent with every legacy request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LegacyCredentials {
    pub api_key: Option<String>,
    pub basic: Option<(String, String)>,
}

impl fmt::Debug for LegacyCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LegacyCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "basic",
                &self.basic.as_ref().map(|(user, _)| (user, "[REDACTED]")),
            )
            .finish()
    }
}

/// Fully resolved connection settings for the legacy service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySettings {
    pub base_url: String,
    pub credentials: LegacyCredentials,
    pub timeout: Duration,
}

impl LegacySettings {
    /// Resolve settings from an explicit URL, the environment snapshot, and
    /// the config file at `default_conf_path` (overridden by
    /// `LABSYNC_LEGACY_CONF`).
    pub fn resolve(
        explicit_url: Option<&str>,
        env: &LegacyEnv,
        default_conf_path: Option<&Path>,
    ) -> Result<Self> {
        let conf_path = env.conf_path.as_deref().or(default_conf_path);
        let conf = match conf_path {
            Some(path) => load_legacy_conf(path)?,
            None => BTreeMap::new(),
        };

        let raw_url = explicit_url
            .and_then(|url| normalize_text_option(Some(url.to_string())))
            .or_else(|| env.url.clone())
            .or_else(|| conf.get("url").cloned())
            .ok_or_else(|| {
                Error::Config(format!(
                    "missing legacy base url (pass --legacy-url, set {LEGACY_URL_ENV}, or add `url` to the legacy config file)"
                ))
            })?;

        let user = env.user.clone().or_else(|| conf.get("user").cloned());
        let password = env.password.clone().or_else(|| conf.get("pw").cloned());
        let basic = match (user, password) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        };

        Ok(Self {
            base_url: normalize_base_url(&raw_url)?,
            credentials: LegacyCredentials {
                api_key: env.api_key.clone(),
                basic,
            },
            timeout: Duration::from_secs(env.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    /// Settings for a known URL and no credentials.
    pub fn for_url(url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(url)?,
            credentials: LegacyCredentials::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }
}

/// Trim, add `http://` when no scheme is given, and drop trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let url = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| Error::Config("missing legacy base url".to_string()))?;
    let url = if is_http_url(&url) {
        url
    } else {
        format!("http://{url}")
    };
    Ok(url.trim_end_matches('/').to_string())
}

/// Load `url`, `user`, and `pw` from a legacy config file.
///
/// A missing file yields an empty map.
pub fn load_legacy_conf(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    parse_legacy_conf(&raw)
}

/// Parse an INI file with or without section headers.
///
/// Values outside any section take precedence, then sections in file order.
/// The first non-blank value for a key wins. Values are taken literally.
pub fn parse_legacy_conf(raw: &str) -> Result<BTreeMap<String, String>> {
    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_str_opt(raw, options)
        .map_err(|error| Error::Config(format!("invalid legacy config: {error}")))?;

    let sections: Vec<&Properties> = ini
        .section(None::<String>)
        .into_iter()
        .chain(
            ini.iter()
                .filter(|(name, _)| name.is_some())
                .map(|(_, properties)| properties),
        )
        .collect();

    let mut values = BTreeMap::new();
    for key in CONF_KEYS {
        let found = sections
            .iter()
            .flat_map(|properties| properties.iter())
            .find(|(name, value)| {
                name.trim().eq_ignore_ascii_case(key) && !value.trim().is_empty()
            });
        if let Some((_, value)) = found {
            values.insert((*key).to_string(), value.trim().to_string());
        }
    }
    Ok(values)
}
