use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3310";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_PREFIX: &str = "/api";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_MAX_JSON_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {reason}")]
    InvalidUrl { key: &'static str, reason: String },

    #[error("{key} must be {expected}, got {value:?}")]
    InvalidValue {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Bearer token the gateway presents to the backend.
///
/// The value is only reachable through [`Credential::expose`]; formatting
/// never prints it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Where the private backend lives and how the gateway authenticates to it.
#[derive(Debug, Clone)]
pub struct BackendEndpoint {
    base_address: Url,
    credential: Credential,
}

impl BackendEndpoint {
    pub fn new(base_address: &str, credential: Credential) -> Result<Self, ConfigError> {
        let base_address = parse_base_url("BACKEND_URL", base_address)?;
        Ok(Self {
            base_address,
            credential,
        })
    }

    pub fn base_address(&self) -> &Url {
        &self.base_address
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Appends `path` to the base address and attaches `query` verbatim.
    pub fn url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base_address.clone();
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(query.filter(|q| !q.is_empty()));
        url
    }

    /// Appends each of `segments` to the base address as one encoded path
    /// segment. Callers must not pass `.` or `..`.
    pub fn segment_url<S: AsRef<str>>(&self, segments: &[S], query: Option<&str>) -> Url {
        let mut url = self.base_address.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments.iter().map(AsRef::as_ref));
        }
        url.set_query(query.filter(|q| !q.is_empty()));
        url
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub upstream_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_upload_bytes: usize,
    pub max_json_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_json_bytes: DEFAULT_MAX_JSON_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    SameOrigin,
    AnyOrigin,
    Origins(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendEndpoint,
    pub bind_addr: SocketAddr,
    /// Inbound prefix owned by the gateway; empty means the root.
    pub public_prefix: String,
    /// Prefix substituted for `public_prefix` on pass-through requests.
    pub upstream_prefix: String,
    pub limits: Limits,
    pub cors: CorsPolicy,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let backend = BackendEndpoint::new(
            &get_or_default("BACKEND_URL", DEFAULT_BACKEND_URL),
            Credential::new(get_or_default("API_KEY", "")),
        )?;

        let bind = get_or_default("GATEWAY_BIND", DEFAULT_BIND);
        let bind_addr = parse_value("GATEWAY_BIND", "a socket address", &bind)?;

        let public_prefix = normalize_prefix(
            "GATEWAY_PUBLIC_PREFIX",
            &get_or_default("GATEWAY_PUBLIC_PREFIX", DEFAULT_PREFIX),
        )?;
        let upstream_prefix = normalize_prefix(
            "GATEWAY_UPSTREAM_PREFIX",
            &get_or_default("GATEWAY_UPSTREAM_PREFIX", DEFAULT_PREFIX),
        )?;

        let limits = Limits {
            upstream_timeout: Duration::from_secs(parse_positive(
                "GATEWAY_UPSTREAM_TIMEOUT_SECS",
                lookup("GATEWAY_UPSTREAM_TIMEOUT_SECS"),
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?),
            connect_timeout: Duration::from_secs(parse_positive(
                "GATEWAY_CONNECT_TIMEOUT_SECS",
                lookup("GATEWAY_CONNECT_TIMEOUT_SECS"),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            max_upload_bytes: parse_positive(
                "GATEWAY_MAX_UPLOAD_BYTES",
                lookup("GATEWAY_MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            max_json_bytes: parse_positive(
                "GATEWAY_MAX_JSON_BYTES",
                lookup("GATEWAY_MAX_JSON_BYTES"),
                DEFAULT_MAX_JSON_BYTES,
            )?,
        };

        let cors = parse_cors(&get_or_default("GATEWAY_CORS_ORIGINS", ""));
        let static_dir = lookup("GATEWAY_STATIC_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        Ok(Config {
            backend,
            bind_addr,
            public_prefix,
            upstream_prefix,
            limits,
            cors,
            static_dir,
        })
    }

    pub fn set_backend_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.backend = BackendEndpoint::new(url, self.backend.credential.clone())?;
        Ok(())
    }
}

fn parse_base_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        key,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            key,
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::InvalidUrl {
            key,
            reason: "base address must not carry a query or fragment".to_string(),
        });
    }
    Ok(url)
}

fn parse_value<T: FromStr>(
    key: &'static str,
    expected: &'static str,
    raw: &str,
) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        expected,
        value: raw.to_string(),
    })
}

fn parse_positive<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: T = parse_value(key, "a positive integer", &raw)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            key,
            expected: "a positive integer",
            value: raw,
        });
    }
    Ok(value)
}

/// `/api/` becomes `/api`, `/` becomes the empty (root) prefix.
fn normalize_prefix(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }
    if !raw.starts_with('/') || raw.contains(['?', '#', ':']) {
        return Err(ConfigError::InvalidValue {
            key,
            expected: "a path starting with '/'",
            value: raw.to_string(),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_cors(raw: &str) -> CorsPolicy {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        CorsPolicy::SameOrigin
    } else if origins.iter().any(|o| o == "*") {
        CorsPolicy::AnyOrigin
    } else {
        CorsPolicy::Origins(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend.base_address().as_str(), "http://localhost:3310/");
        assert!(config.backend.credential().is_empty());
        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.public_prefix, "/api");
        assert_eq!(config.upstream_prefix, "/api");
        assert_eq!(config.limits.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.cors, CorsPolicy::SameOrigin);
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_reads_backend_and_credential() {
        let config = config_from(&[
            ("BACKEND_URL", "http://livechat-be:3310"),
            ("API_KEY", "s3cret"),
            ("GATEWAY_UPSTREAM_TIMEOUT_SECS", "12"),
        ])
        .unwrap();
        assert_eq!(config.backend.base_address().host_str(), Some("livechat-be"));
        assert_eq!(config.backend.credential().expose(), "s3cret");
        assert_eq!(config.limits.upstream_timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_credential_is_never_formatted() {
        let config = config_from(&[("API_KEY", "s3cret")]).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert_eq!(config.backend.credential().to_string(), "<redacted>");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            config_from(&[("BACKEND_URL", "not a url")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config_from(&[("BACKEND_URL", "ftp://backend")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config_from(&[("GATEWAY_MAX_UPLOAD_BYTES", "lots")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config_from(&[("GATEWAY_UPSTREAM_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config_from(&[("GATEWAY_PUBLIC_PREFIX", "api")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_prefix_normalization() {
        let config = config_from(&[
            ("GATEWAY_PUBLIC_PREFIX", "/bff/"),
            ("GATEWAY_UPSTREAM_PREFIX", "/"),
        ])
        .unwrap();
        assert_eq!(config.public_prefix, "/bff");
        assert_eq!(config.upstream_prefix, "");
    }

    #[test]
    fn test_cors_policy() {
        assert_eq!(parse_cors(" * "), CorsPolicy::AnyOrigin);
        assert_eq!(
            parse_cors("http://a.test, http://b.test"),
            CorsPolicy::Origins(vec!["http://a.test".into(), "http://b.test".into()])
        );
    }

    #[test]
    fn test_endpoint_url_keeps_query_verbatim() {
        let endpoint = BackendEndpoint::new("http://backend:3310/", Credential::default()).unwrap();
        let url = endpoint.url(
            "/knowledge/documents",
            Some("status=indexed&status=failed&q=a%20b"),
        );
        assert_eq!(
            url.as_str(),
            "http://backend:3310/knowledge/documents?status=indexed&status=failed&q=a%20b"
        );

        let bare = endpoint.url("/health", Some(""));
        assert_eq!(bare.as_str(), "http://backend:3310/health");
    }

    #[test]
    fn test_segment_url_encodes_each_segment() {
        let endpoint =
            BackendEndpoint::new("http://backend:3310/internal/", Credential::default()).unwrap();
        let url = endpoint.segment_url(&["api", "knowledge", "documents", "doc 1/x?y"], None);
        assert_eq!(
            url.as_str(),
            "http://backend:3310/internal/api/knowledge/documents/doc%201%2Fx%3Fy"
        );
    }
}
