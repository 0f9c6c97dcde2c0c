//! User authentication: password hashing, signed tokens and bearer lookup
//!
//! Logging in yields a short-lived access token and a longer-lived refresh
//! token, both HS256 JWTs signed with the same secret. The security
//! middleware resolves the access token of every protected request to the
//! [`AuthUser`] it belongs to.
//!
//! # Configuration
//!
//! - `PLIN_WEB_JWT_SECRET`: signing secret (a development default is used when unset)
//! - `PLIN_WEB_JWT_EXPIRES_IN`: access token lifetime, e.g. `24h` (default)
//! - `PLIN_WEB_JWT_REFRESH_EXPIRES_IN`: refresh token lifetime, e.g. `7d` (default)

use std::env;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::error::{AuthError, StoreError, TokenError};
use crate::store::{Store, User, UserRole};

/// Environment variable holding the signing secret
pub const JWT_SECRET_ENV: &str = "PLIN_WEB_JWT_SECRET";

/// Environment variable holding the access token lifetime
pub const JWT_EXPIRES_IN_ENV: &str = "PLIN_WEB_JWT_EXPIRES_IN";

/// Environment variable holding the refresh token lifetime
pub const JWT_REFRESH_EXPIRES_IN_ENV: &str = "PLIN_WEB_JWT_REFRESH_EXPIRES_IN";

/// Secret used when none is configured. Only fit for development.
pub const DEFAULT_JWT_SECRET: &str = "plin-secret-key-change-in-production";

/// bcrypt cost factor for stored passwords
pub const DEFAULT_PASSWORD_COST: u32 = 10;

/// Email of the account created by `create-default-admin`
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@plim.com";

/// Password of the account created by `create-default-admin`
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthConfigError {
    /// A lifetime could not be parsed
    #[error("Invalid duration for {var}: '{value}'")]
    InvalidDuration {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },

    /// The secret is blank
    #[error("{0} cannot be empty")]
    EmptySecret(&'static str),
}

// =============================================================================
// Configuration
// =============================================================================

/// Token and password settings
#[derive(Clone)]
pub struct AuthConfig {
    secret: String,
    /// Access token lifetime
    pub access_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_ttl: Duration,
    /// bcrypt cost factor
    pub password_cost: u32,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("password_cost", &self.password_cost)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_JWT_SECRET.to_string(),
            access_ttl: Duration::hours(24),
            refresh_ttl: Duration::days(7),
            password_cost: DEFAULT_PASSWORD_COST,
        }
    }
}

impl AuthConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, AuthConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        match lookup(JWT_SECRET_ENV) {
            Some(secret) if secret.trim().is_empty() => {
                return Err(AuthConfigError::EmptySecret(JWT_SECRET_ENV))
            }
            Some(secret) => config.secret = secret,
            None => warn!(
                "SECURITY: {} not set, signing tokens with the development secret",
                JWT_SECRET_ENV
            ),
        }

        for (var, slot) in [
            (JWT_EXPIRES_IN_ENV, &mut config.access_ttl),
            (JWT_REFRESH_EXPIRES_IN_ENV, &mut config.refresh_ttl),
        ] {
            if let Some(value) = lookup(var) {
                *slot = parse_duration(&value)
                    .ok_or(AuthConfigError::InvalidDuration { var, value })?;
            }
        }

        Ok(config)
    }

    /// Replace the signing secret
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Replace the bcrypt cost
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }
}

/// Parse `90`, `90s`, `30m`, `24h` or `7d` into a positive duration
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let amount: i64 = digits.parse().ok().filter(|n| *n > 0)?;

    match unit {
        "" | "s" => Some(Duration::seconds(amount)),
        "m" => Some(Duration::minutes(amount)),
        "h" => Some(Duration::hours(amount)),
        "d" => Some(Duration::days(amount)),
        _ => None,
    }
}

// =============================================================================
// Tokens
// =============================================================================

/// Which of the pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Presented on every protected request
    Access,
    /// Exchanged for a new pair
    Refresh,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id as string)
    pub sub: String,
    /// User id
    pub id: i64,
    /// User email at issue time
    pub email: String,
    /// User role at issue time
    pub role: UserRole,
    /// Token kind
    pub kind: TokenKind,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiration, seconds since the epoch
    pub exp: i64,
}

/// Access and refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived token for `Authorization: Bearer`
    pub access_token: String,
    /// Long-lived token for `/api/users/refresh-token`
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Creates and verifies JWTs
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Create a service from configuration
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Claims for `user` valid for `ttl` from now
    pub fn claims(&self, user: &User, kind: TokenKind, ttl: Duration) -> Claims {
        let now = Utc::now();
        Claims {
            sub: user.id.to_string(),
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Sign arbitrary claims
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Issue a fresh access/refresh pair for `user`
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.sign(&self.claims(user, TokenKind::Access, self.access_ttl))?,
            refresh_token: self.sign(&self.claims(user, TokenKind::Refresh, self.refresh_ttl))?,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Verify signature, expiry and kind
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        if claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

// =============================================================================
// Passwords
// =============================================================================

/// bcrypt hashing on the blocking pool
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Hasher with the given bcrypt cost
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a plain password
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check a plain password against a stored hash. Malformed hashes never match.
    pub async fn verify(&self, password: &str, hash: &str) -> bool {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }
}

// =============================================================================
// Bearer authentication
// =============================================================================

/// The caller of an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    /// User id
    pub id: i64,
    /// Current email
    pub email: String,
    /// Current role
    pub role: UserRole,
}

impl AuthUser {
    /// Fail unless the caller is an administrator
    pub fn require_admin(&self) -> Result<(), AuthError> {
        match self.role {
            UserRole::Admin => Ok(()),
            UserRole::User => Err(AuthError::Forbidden),
        }
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

/// Outcome of authenticating one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// Token verified and user found
    Authenticated(AuthUser),
    /// Path does not require authentication
    Bypassed,
    /// Missing `Authorization` header
    MissingHeader,
    /// Header is not `Bearer <token>`
    InvalidFormat,
    /// Token failed verification
    InvalidToken(TokenError),
    /// Token is valid but its user is gone
    UnknownUser,
    /// The user lookup itself failed
    Unavailable,
}

impl AuthResult {
    /// Check if authentication was successful or bypassed
    pub fn is_ok(&self) -> bool {
        matches!(self, AuthResult::Authenticated(_) | AuthResult::Bypassed)
    }

    /// Error message for authentication failure
    pub fn error_message(&self) -> Option<String> {
        match self {
            AuthResult::Authenticated(_) | AuthResult::Bypassed => None,
            AuthResult::MissingHeader => Some("Authorization token not provided".to_string()),
            AuthResult::InvalidFormat => {
                Some("Invalid token format. Expected: Bearer <token>".to_string())
            }
            AuthResult::InvalidToken(err) => Some(err.to_string()),
            AuthResult::UnknownUser => Some(AuthError::UnknownUser.to_string()),
            AuthResult::Unavailable => Some("Internal server error".to_string()),
        }
    }
}

/// Resolves bearer tokens to live users
#[derive(Debug, Clone)]
pub struct Authenticator {
    jwt: JwtService,
    store: Store,
}

impl Authenticator {
    /// Create an authenticator over a token service and the user store
    pub fn new(jwt: JwtService, store: Store) -> Self {
        Self { jwt, store }
    }

    /// Authenticate an `Authorization` header value
    pub async fn authenticate(&self, auth_header: Option<&str>) -> AuthResult {
        let Some(header) = auth_header else {
            return AuthResult::MissingHeader;
        };

        let token = match header.strip_prefix("Bearer ") {
            Some(t) if !t.trim().is_empty() && !t.trim().contains(' ') => t.trim(),
            _ => return AuthResult::InvalidFormat,
        };

        let claims = match self.jwt.verify(token, TokenKind::Access) {
            Ok(claims) => claims,
            Err(err) => {
                warn!("Rejected bearer token: {}", err);
                return AuthResult::InvalidToken(err);
            }
        };

        match self.store.get_user(claims.id).await {
            Ok(user) => {
                debug!("Authenticated user {}", user.id);
                AuthResult::Authenticated(user.into())
            }
            Err(StoreError::NotFound(_)) => AuthResult::UnknownUser,
            Err(err) => {
                error!("User lookup failed: {}", err);
                AuthResult::Unavailable
            }
        }
    }
}
