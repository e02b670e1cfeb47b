//! HTTP authorization for the stateless transport.
//!
//! Turns [`Credentials`] into an `Authorization` header plus the `NS`/`DB`/`SC`
//! routing headers the `/sql` endpoint reads.

use crate::credentials::Credentials;
use crate::error::{QuarryError, Result};
use base64::{engine::general_purpose, Engine as _};

/// How a stateless request authenticates.
///
/// ```rust
/// use quarry_link::{AuthProvider, Credentials};
///
/// let auth = AuthProvider::from_credentials(&Credentials::root("root", "root")).unwrap();
/// assert!(matches!(auth, AuthProvider::BasicAuth(..)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProvider {
    /// HTTP Basic Auth (username, password)
    BasicAuth(String, String),

    /// `Authorization: Bearer <token>`
    BearerToken(String),
}

impl AuthProvider {
    pub fn basic_auth(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::BasicAuth(username.into(), password.into())
    }

    pub fn bearer_token(token: impl Into<String>) -> Self {
        Self::BearerToken(token.into())
    }

    /// Pick the header scheme for the given credentials. A token always wins
    /// over username/password.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        if let Credentials::Token { token } = credentials {
            return Ok(Self::BearerToken(token.clone()));
        }

        match credentials.user_pass() {
            Some((user, pass)) if !user.is_empty() || !pass.is_empty() => {
                Ok(Self::BasicAuth(user.to_string(), pass.to_string()))
            },
            _ => Err(QuarryError::InvalidRequest(
                "Missing username & password or token".to_string(),
            )),
        }
    }

    /// The literal `Authorization` header value.
    pub fn header_value(&self) -> String {
        match self {
            Self::BasicAuth(username, password) => {
                // RFC 7617
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                format!("Basic {}", encoded)
            },
            Self::BearerToken(token) => format!("Bearer {}", token),
        }
    }

    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(reqwest::header::AUTHORIZATION, self.header_value())
    }
}
