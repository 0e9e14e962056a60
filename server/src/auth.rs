use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{ClinicError, ClinicResult};
use crate::handlers::ApiError;
use crate::models::{Profile, Role};
use crate::store::{AccountStore, ProfileStore, SessionStore, StoreResult};
use crate::AppState;

const PASSWORD_SCHEME: &str = "pbkdf2-sha256";
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;
const TOKEN_LENGTH: usize = 32;

/// Hashes `password` as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt, iterations);
    format!(
        "{}${}${}${}",
        PASSWORD_SCHEME,
        iterations,
        STANDARD.encode(salt),
        STANDARD.encode(hash)
    )
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != PASSWORD_SCHEME {
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        STANDARD.decode(salt),
        STANDARD.decode(expected),
    ) else {
        return false;
    };
    if iterations == 0 {
        return false;
    }

    let actual = derive(password, &salt, iterations);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Opaque bearer token handed to the client.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// What the session table stores in place of the token itself.
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

pub async fn issue_session<S>(sessions: &S, user_id: Uuid, ttl: Duration) -> StoreResult<Session>
where
    S: SessionStore + ?Sized,
{
    let token = generate_token();
    let expires_at = Utc::now() + ttl;
    sessions
        .create_session(user_id, &token_digest(&token), expires_at)
        .await?;
    Ok(Session {
        token,
        user_id,
        expires_at,
    })
}

/// Verifies credentials and opens a session.
///
/// Unknown e-mail and wrong password produce the same error.
pub async fn login<S>(store: &S, email: &str, password: &str, ttl: Duration) -> ClinicResult<Session>
where
    S: AccountStore + SessionStore + ?Sized,
{
    let account = store.find_account_by_email(email.trim()).await?;
    let Some(account) = account.filter(|a| verify_password(password, &a.password_hash)) else {
        tracing::info!("Rejected login for {}", email);
        return Err(ClinicError::unauthorized("Invalid email or password"));
    };

    let session = issue_session(store, account.id, ttl).await?;
    tracing::info!("✓ Session opened for {}", account.id);
    Ok(session)
}

/// The authenticated caller together with their current role.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub async fn resolve<S>(store: &S, token: &str) -> ClinicResult<Self>
    where
        S: SessionStore + ProfileStore + ?Sized,
    {
        let user_id = store
            .resolve_session(&token_digest(token))
            .await?
            .ok_or_else(|| ClinicError::unauthorized("Authentication failed"))?;

        let profile: Profile = store
            .get_profile(user_id)
            .await?
            .filter(|p| p.approved)
            .ok_or_else(|| ClinicError::forbidden("Access denied. Account is not approved."))?;

        Ok(Self {
            user_id,
            role: profile.role,
        })
    }

    pub fn require_superadmin(&self, action: &str) -> ClinicResult<()> {
        if self.role == Role::Superadmin {
            Ok(())
        } else {
            Err(ClinicError::forbidden(format!(
                "Access denied. Only superadmins can {}.",
                action
            )))
        }
    }

    /// Admins and superadmins both run the clinic dashboard.
    pub fn require_staff(&self) -> ClinicResult<()> {
        match self.role {
            Role::Admin | Role::Superadmin => Ok(()),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ClinicError::unauthorized("Missing authorization header"))?;
        Ok(AuthContext::resolve(state.store.as_ref(), token).await?)
    }
}
