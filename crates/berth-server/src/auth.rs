//! Bearer-token identity gate.
//!
//! Tokens are never held in plaintext: the gate stores SHA-256 digests and
//! compares the digest of the presented token. Every rejection produces the
//! same 401, whatever the reason.

use std::collections::HashMap;
use std::path::Path;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use berth_common::config::AuthConfig;
use berth_common::constants::DEFAULT_TOKEN_SUBJECT;
use berth_common::error::{BerthError, Result};
use sha2::{Digest, Sha256};

use crate::api::AppState;
use crate::error::ApiError;

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Subject the credential was issued to.
    pub subject: String,
}

/// Verifies bearer credentials.
pub trait AuthGate: Send + Sync {
    /// Returns the caller's identity, or `None` to reject.
    fn verify(&self, token: &str) -> Option<Identity>;
}

/// Gate backed by a table of token digests.
#[derive(Debug, Clone, Default)]
pub struct TokenGate {
    digests: HashMap<String, String>,
}

impl TokenGate {
    /// Creates a gate that rejects everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowercase hex SHA-256 of a token.
    #[must_use]
    pub fn digest(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }

    /// Grants `subject` to a plaintext token.
    pub fn insert_token(&mut self, subject: impl Into<String>, token: &str) {
        let _ = self.digests.insert(Self::digest(token), subject.into());
    }

    /// Grants `subject` to a token given by its hex digest.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` when `hex` is not a SHA-256 hex digest.
    pub fn insert_digest(&mut self, subject: impl Into<String>, hex: &str) -> Result<()> {
        let hex = normalize_digest(hex).ok_or_else(|| BerthError::Config {
            message: "token digest must be 64 hex characters".into(),
        })?;
        let _ = self.digests.insert(hex, subject.into());
        Ok(())
    }

    /// Parses `subject:hexdigest` lines. Blank lines and `#` comments are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` naming the first malformed line.
    pub fn parse_tokens(&mut self, content: &str) -> Result<()> {
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let lineno = idx + 1;
            let (subject, hex) = line.split_once(':').ok_or_else(|| BerthError::Config {
                message: format!("tokens line {lineno}: expected subject:digest"),
            })?;
            let subject = subject.trim();
            if subject.is_empty() {
                return Err(BerthError::Config {
                    message: format!("tokens line {lineno}: empty subject"),
                });
            }
            let hex = normalize_digest(hex).ok_or_else(|| BerthError::Config {
                message: format!("tokens line {lineno}: digest must be 64 hex characters"),
            })?;
            let _ = self.digests.insert(hex, subject.to_owned());
        }
        Ok(())
    }

    /// Loads a tokens file.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Io` if the file cannot be read, or
    /// `BerthError::Config` for malformed content.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| BerthError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.parse_tokens(&content)
    }

    /// Builds a gate from every configured credential source.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokens file cannot be read or parsed.
    pub fn from_config(auth: &AuthConfig) -> Result<Self> {
        let mut gate = Self::new();
        if let Some(path) = &auth.tokens_file {
            gate.load(path)?;
        }
        if let Some(token) = auth.api_token.as_deref().filter(|t| !t.is_empty()) {
            gate.insert_token(DEFAULT_TOKEN_SUBJECT, token);
        }
        tracing::info!(credentials = gate.len(), "token gate loaded");
        Ok(gate)
    }

    /// Number of registered credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Whether no credential is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl AuthGate for TokenGate {
    fn verify(&self, token: &str) -> Option<Identity> {
        self.digests
            .get(&Self::digest(token))
            .map(|subject| Identity {
                subject: subject.clone(),
            })
    }
}

fn normalize_digest(hex: &str) -> Option<String> {
    let hex = hex.trim().to_ascii_lowercase();
    (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(hex)
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Axum middleware that rejects requests without a verified identity and
/// attaches the [`Identity`] to request extensions otherwise.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` for a missing, malformed or unknown token.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let identity = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .and_then(|token| state.gate.verify(token))
        .ok_or(ApiError::Unauthorized)?;

    tracing::debug!(subject = %identity.subject, "caller verified");
    let _ = request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
