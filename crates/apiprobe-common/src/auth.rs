//! Authentication for outbound service calls
//!
//! Each service declares how requests to it are authenticated. The raw
//! credentials ([`AuthConfig`]) are resolved once into an [`AuthScheme`],
//! which then produces the header injected into every request.
//!
//! # Supported Modes
//!
//! - **none**: No header is added
//! - **bearer**: `Authorization: Bearer <token>`
//! - **api_key**: `X-API-Key: <key>`
//! - **oauth2**: `Authorization: Bearer <access_token>`
//!
//! # Example
//!
//! ```
//! use apiprobe_common::auth::{AuthConfig, AuthScheme};
//!
//! let auth = AuthConfig::api_key("secret-key");
//! let scheme = auth.resolve().unwrap();
//!
//! assert_eq!(
//!     scheme.header(),
//!     Some(("X-API-Key", "secret-key".to_string()))
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header used for API key authentication.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header used for bearer and OAuth2 authentication.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Authentication mode declared by a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    Bearer,
    ApiKey,
    OAuth2,
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AuthType::None),
            "bearer" => Ok(AuthType::Bearer),
            "api_key" | "api-key" | "apikey" => Ok(AuthType::ApiKey),
            "oauth2" => Ok(AuthType::OAuth2),
            other => Err(format!("unknown auth type '{}'", other)),
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthType::None => "none",
            AuthType::Bearer => "bearer",
            AuthType::ApiKey => "api_key",
            AuthType::OAuth2 => "oauth2",
        };
        f.write_str(name)
    }
}

/// Raw authentication credentials as they appear in configuration.
///
/// The `type` field is kept as text so an unknown mode surfaces as a
/// validation error instead of a parse failure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type", default)]
    pub auth_type: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl AuthConfig {
    /// Creates a configuration with authentication disabled.
    pub fn disabled() -> Self {
        Self {
            auth_type: "none".to_string(),
            ..Default::default()
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_type: "bearer".to_string(),
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            auth_type: "api_key".to_string(),
            api_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn oauth2(access_token: impl Into<String>) -> Self {
        Self {
            auth_type: "oauth2".to_string(),
            access_token: Some(access_token.into()),
            ..Default::default()
        }
    }

    /// Parses the declared mode.
    pub fn kind(&self) -> Result<AuthType, String> {
        self.auth_type.parse()
    }

    /// Resolves the credentials into the scheme used for header injection.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message if the mode is unknown or the
    /// credential it requires is missing or empty.
    pub fn resolve(&self) -> Result<AuthScheme, String> {
        fn required(value: &Option<String>, field: &str, kind: AuthType) -> Result<String, String> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(format!("auth type '{}' requires '{}'", kind, field)),
            }
        }

        let kind = self.kind()?;
        match kind {
            AuthType::None => Ok(AuthScheme::None),
            AuthType::Bearer => required(&self.token, "token", kind).map(AuthScheme::Bearer),
            AuthType::ApiKey => required(&self.api_key, "api_key", kind).map(AuthScheme::ApiKey),
            AuthType::OAuth2 => {
                required(&self.access_token, "access_token", kind).map(AuthScheme::OAuth2)
            }
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("auth_type", &self.auth_type)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Resolved authentication strategy for one service.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    Bearer(String),
    ApiKey(String),
    OAuth2(String),
}

impl AuthScheme {
    /// Returns the header name and value to inject, if any.
    pub fn header(&self) -> Option<(&'static str, String)> {
        match self {
            AuthScheme::None => None,
            AuthScheme::Bearer(token) | AuthScheme::OAuth2(token) => {
                Some((AUTHORIZATION_HEADER, format!("Bearer {}", token)))
            }
            AuthScheme::ApiKey(key) => Some((API_KEY_HEADER, key.clone())),
        }
    }

    pub fn kind(&self) -> AuthType {
        match self {
            AuthScheme::None => AuthType::None,
            AuthScheme::Bearer(_) => AuthType::Bearer,
            AuthScheme::ApiKey(_) => AuthType::ApiKey,
            AuthScheme::OAuth2(_) => AuthType::OAuth2,
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::None => write!(f, "None"),
            AuthScheme::Bearer(_) => write!(f, "Bearer(*****)"),
            AuthScheme::ApiKey(_) => write!(f, "ApiKey(*****)"),
            AuthScheme::OAuth2(_) => write!(f, "OAuth2(*****)"),
        }
    }
}

impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
