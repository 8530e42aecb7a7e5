// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request authentication
//!
//! Two independent checks guard the API:
//! - a per-day request token proving the caller is the bundled frontend
//! - an optional HS256 session cookie identifying a signed-in user

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

pub const SESSION_COOKIE: &str = "indexy_session";
pub const TOKEN_HEADER: &str = "x-indexy-token";

/// Session lifetime
pub const SESSION_DAYS: i64 = 30;

const FALLBACK_IP: &str = "127.0.0.1";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unauthorized Origin")]
    InvalidOrigin,

    #[error("Invalid Security Token")]
    InvalidToken,

    #[error("Failed to sign session: {0}")]
    Signing(String),
}

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    #[serde(flatten)]
    session: Session,
    iat: i64,
    exp: i64,
}

/// Verifies (and, for tooling, signs) session cookies
#[derive(Clone)]
pub struct SessionVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token valid for [`SESSION_DAYS`]
    pub fn sign(&self, session: &Session) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            session: session.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::days(SESSION_DAYS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Decode a token; `None` when invalid or expired
    pub fn verify(&self, token: &str) -> Option<Session> {
        match decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims.session),
            Err(e) => {
                debug!("[Auth] Token verification failed: {}", e);
                None
            }
        }
    }

    /// Session from the request's `Cookie` header, if any
    pub fn session_from_headers(&self, headers: &HeaderMap) -> Option<Session> {
        let token = session_cookie(headers)?;
        self.verify(&token)
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Origin and request-token validation
#[derive(Debug, Clone)]
pub struct RequestGuard {
    secret: String,
    allowed_origin: Option<String>,
}

impl RequestGuard {
    pub fn new(secret: impl Into<String>, allowed_origin: Option<String>) -> Self {
        Self {
            secret: secret.into(),
            allowed_origin,
        }
    }

    /// Token for the UTC day containing `now`
    pub fn token_for(&self, now: DateTime<Utc>) -> String {
        let material = format!("{}:{}", self.secret, now.format("%Y-%m-%d"));
        BASE64.encode(Sha256::digest(material.as_bytes()))
    }

    pub fn current_token(&self) -> String {
        self.token_for(Utc::now())
    }

    pub fn validate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        if let (Some(allowed), Some(origin)) = (
            self.allowed_origin.as_deref(),
            headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()),
        ) {
            if !origin.starts_with(allowed) {
                return Err(AuthError::InvalidOrigin);
            }
        }

        let presented = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
        match presented {
            Some(token) if token == self.current_token() => Ok(()),
            _ => Err(AuthError::InvalidToken),
        }
    }
}

/// Caller IP, honouring the first `x-forwarded-for` hop
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(FALLBACK_IP)
        .to_string()
}
