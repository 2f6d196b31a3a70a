//! Token entities for JWT-based authentication.

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the two token families a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fresh random token identifier
pub fn new_jti() -> String {
    Uuid::new_v4().to_string()
}

/// Caller-supplied identity for an access token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    /// Subject (user ID)
    pub subject: String,

    /// Display username
    pub username: String,

    /// Granted roles
    pub roles: Vec<String>,

    /// Granted permissions
    pub permissions: Vec<String>,
}

impl AccessTokenRequest {
    pub fn new(subject: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            username: username.into(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}

/// Access token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,

    pub username: String,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub permissions: Vec<String>,

    /// JWT ID (unique identifier for the token)
    pub jti: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,
}

impl AccessClaims {
    /// Claims for `request`, valid for `ttl_seconds` from `now`
    pub fn new(request: &AccessTokenRequest, now: DateTime<Utc>, ttl_seconds: i64) -> Self {
        let iat = now.timestamp();
        Self {
            sub: request.subject.clone(),
            username: request.username.clone(),
            roles: request.roles.clone(),
            permissions: request.permissions.clone(),
            jti: new_jti(),
            iat,
            exp: iat + ttl_seconds,
        }
    }

    /// Expired once `now` reaches `exp`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Whether the identity carried by these claims is the one requested
    pub fn matches(&self, request: &AccessTokenRequest) -> bool {
        self.sub == request.subject
            && self.username == request.username
            && self.roles == request.roles
            && self.permissions == request.permissions
    }
}

/// Refresh token payload.
///
/// Unknown fields are rejected so an access token can never pass as a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    /// Subject (user ID)
    pub sub: String,

    /// JWT ID (unique identifier for the token)
    pub jti: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,
}

impl RefreshClaims {
    pub fn new(subject: impl Into<String>, now: DateTime<Utc>, ttl_seconds: i64) -> Self {
        let iat = now.timestamp();
        Self {
            sub: subject.into(),
            jti: new_jti(),
            iat,
            exp: iat + ttl_seconds,
        }
    }

    /// Expired once `now` reaches `exp`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// A freshly signed token and the metadata recorded while signing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Compact serialized token
    pub token: String,

    pub kind: TokenKind,

    pub jti: String,

    /// Algorithm written into the header
    pub algorithm: Algorithm,

    /// Key id written into the header
    pub key_id: String,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Remaining lifetime in whole seconds at issuance
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

/// Access and refresh token issued together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

impl TokenPair {
    /// Access token lifetime in seconds
    pub fn access_expires_in(&self) -> i64 {
        self.access.expires_in()
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_expires_in(&self) -> i64 {
        self.refresh.expires_in()
    }
}
