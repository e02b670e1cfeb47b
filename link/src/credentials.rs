//! Authentication details accepted by `signin`, `authenticate` and `signup`.
//!
//! The server distinguishes access levels by which keys are present in the
//! sign-in object, so every variant serializes to exactly the shape the
//! server expects (`NS`, `DB`, `SC` keys in upper case).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Credentials for one of the server's access levels.
///
/// # Examples
///
/// ```rust
/// use quarry_link::Credentials;
///
/// let root = Credentials::root("root", "root");
/// let db = Credentials::database("test", "test", "admin", "secret");
/// let token = Credentials::token("eyJhbGc...");
/// assert!(token.is_token());
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Credentials {
    /// A previously issued session token, sent through `authenticate`.
    Token { token: String },

    /// Scope (record-level) access. Extra fields are forwarded verbatim to the
    /// scope's sign-in logic.
    Scope {
        #[serde(rename = "NS")]
        namespace: String,
        #[serde(rename = "DB")]
        database: String,
        #[serde(rename = "SC")]
        scope: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },

    Database {
        #[serde(rename = "NS")]
        namespace: String,
        #[serde(rename = "DB")]
        database: String,
        user: String,
        pass: String,
    },

    Namespace {
        #[serde(rename = "NS")]
        namespace: String,
        user: String,
        pass: String,
    },

    Root { user: String, pass: String },
}

impl Credentials {
    pub fn root(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self::Root {
            user: user.into(),
            pass: pass.into(),
        }
    }

    pub fn namespace(
        namespace: impl Into<String>,
        user: impl Into<String>,
        pass: impl Into<String>,
    ) -> Self {
        Self::Namespace {
            namespace: namespace.into(),
            user: user.into(),
            pass: pass.into(),
        }
    }

    pub fn database(
        namespace: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        pass: impl Into<String>,
    ) -> Self {
        Self::Database {
            namespace: namespace.into(),
            database: database.into(),
            user: user.into(),
            pass: pass.into(),
        }
    }

    pub fn scope(
        namespace: impl Into<String>,
        database: impl Into<String>,
        scope: impl Into<String>,
        extra: Map<String, Value>,
    ) -> Self {
        Self::Scope {
            namespace: namespace.into(),
            database: database.into(),
            scope: scope.into(),
            extra,
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Self::Token { .. })
    }

    /// Username and password, when this access level uses them.
    pub fn user_pass(&self) -> Option<(&str, &str)> {
        match self {
            Self::Root { user, pass }
            | Self::Namespace { user, pass, .. }
            | Self::Database { user, pass, .. } => Some((user.as_str(), pass.as_str())),
            Self::Scope { extra, .. } => {
                let user = extra.get("user").and_then(Value::as_str)?;
                let pass = extra.get("pass").and_then(Value::as_str)?;
                Some((user, pass))
            },
            Self::Token { .. } => None,
        }
    }

    pub fn namespace_name(&self) -> Option<&str> {
        match self {
            Self::Namespace { namespace, .. }
            | Self::Database { namespace, .. }
            | Self::Scope { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    pub fn database_name(&self) -> Option<&str> {
        match self {
            Self::Database { database, .. } | Self::Scope { database, .. } => Some(database),
            _ => None,
        }
    }

    pub fn scope_name(&self) -> Option<&str> {
        match self {
            Self::Scope { scope, .. } => Some(scope),
            _ => None,
        }
    }
}

// Passwords and tokens never reach log output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token { .. } => f.debug_struct("Token").field("token", &"***").finish(),
            Self::Scope {
                namespace,
                database,
                scope,
                ..
            } => f
                .debug_struct("Scope")
                .field("namespace", namespace)
                .field("database", database)
                .field("scope", scope)
                .finish_non_exhaustive(),
            Self::Database {
                namespace,
                database,
                user,
                ..
            } => f
                .debug_struct("Database")
                .field("namespace", namespace)
                .field("database", database)
                .field("user", user)
                .field("pass", &"***")
                .finish(),
            Self::Namespace {
                namespace, user, ..
            } => f
                .debug_struct("Namespace")
                .field("namespace", namespace)
                .field("user", user)
                .field("pass", &"***")
                .finish(),
            Self::Root { user, .. } => f
                .debug_struct("Root")
                .field("user", user)
                .field("pass", &"***")
                .finish(),
        }
    }
}

/// Details sent to `signup`. Only scope access supports registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registration {
    #[serde(rename = "NS")]
    pub namespace: String,
    #[serde(rename = "DB")]
    pub database: String,
    #[serde(rename = "SC")]
    pub scope: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Registration {
    pub fn new(
        namespace: impl Into<String>,
        database: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            database: database.into(),
            scope: scope.into(),
            extra: Map::new(),
        }
    }

    /// Add a field consumed by the scope's SIGNUP clause.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
