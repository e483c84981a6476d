//! Identity providers: turn a bearer credential into an [`Actor`].
//!
//! The workflow engine trusts whatever tuple a provider returns; providers
//! are the only place credentials are checked.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use triage_common::{Actor, Role};

use crate::config::{AuthMode, AuthSection, MAX_TOKEN_TTL_HOURS};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Credential expired")]
    Expired,

    #[error("Invalid credential: {0}")]
    Invalid(String),

    #[error("Identity provider not configured: {0}")]
    NotConfigured(String),
}

pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<Actor, IdentityError>;
}

/// Build the provider selected by `[auth].mode`.
pub fn from_config(auth: &AuthSection) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    match auth.mode {
        AuthMode::Static => Ok(Arc::new(StaticTokenProvider::from_config(auth))),
        AuthMode::Jwt => {
            let secret = auth
                .jwt_secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow::anyhow!("auth.mode is 'jwt' but auth.jwt_secret is not set"))?;
            Ok(Arc::new(JwtProvider::new(secret.as_bytes(), auth.token_ttl_hours)?))
        }
    }
}

// ── Static token table ───────────────────────────────────────────────

pub struct StaticTokenProvider {
    tokens: HashMap<String, Actor>,
}

impl StaticTokenProvider {
    pub fn new(entries: impl IntoIterator<Item = (String, Actor)>) -> Self {
        let mut tokens = HashMap::new();
        for (token, actor) in entries {
            tokens.entry(token).or_insert(actor);
        }
        Self { tokens }
    }

    pub fn from_config(auth: &AuthSection) -> Self {
        Self::new(auth.tokens.iter().map(|t| {
            (
                t.token.clone(),
                Actor::new(t.identity.clone(), t.role, t.department.clone()),
            )
        }))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn resolve(&self, credential: &str) -> Result<Actor, IdentityError> {
        if credential.is_empty() {
            return Err(IdentityError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(IdentityError::UnknownCredential)
    }
}

// ── HS256 JWT ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub department: String,
    pub exp: usize,
}

pub struct JwtProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtProvider {
    /// Fails when `ttl_hours` exceeds [`MAX_TOKEN_TTL_HOURS`].
    pub fn new(secret: &[u8], ttl_hours: u64) -> Result<Self, IdentityError> {
        let ttl = Some(ttl_hours)
            .filter(|h| *h <= MAX_TOKEN_TTL_HOURS)
            .and_then(|h| Duration::try_hours(h as i64))
            .ok_or_else(|| {
                IdentityError::NotConfigured(format!(
                    "token_ttl_hours {} exceeds the maximum of {}",
                    ttl_hours, MAX_TOKEN_TTL_HOURS
                ))
            })?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        })
    }

    /// Issue a token for `actor` valid for the configured TTL.
    pub fn mint(&self, actor: &Actor) -> Result<String, IdentityError> {
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| IdentityError::Invalid("token expiry out of range".to_string()))?;
        self.mint_until(actor, expires_at)
    }

    pub fn mint_until(&self, actor: &Actor, expires_at: DateTime<Utc>) -> Result<String, IdentityError> {
        let claims = Claims {
            sub: actor.identity.clone(),
            role: actor.role.as_str().to_string(),
            department: actor.department.clone(),
            exp: expires_at.timestamp().max(0) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| IdentityError::Invalid(e.to_string()))
    }
}

impl IdentityProvider for JwtProvider {
    fn resolve(&self, credential: &str) -> Result<Actor, IdentityError> {
        if credential.is_empty() {
            return Err(IdentityError::MissingCredential);
        }
        let data = decode::<Claims>(credential, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => IdentityError::Expired,
                _ => IdentityError::Invalid(e.to_string()),
            })?;
        let claims = data.claims;
        let role = Role::from_str(&claims.role).map_err(IdentityError::Invalid)?;
        if claims.sub.is_empty() {
            return Err(IdentityError::Invalid("empty subject".to_string()));
        }
        Ok(Actor::new(claims.sub, role, claims.department))
    }
}
