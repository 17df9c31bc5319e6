use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_name, validate_password, validate_phone};
use crate::db::{
    DbPool, LoginRequest, PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetToken,
    RefreshRequest, RegisterRequest, Session, TokenResponse, User, UserResponse, UserRole,
};
use crate::AppState;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// True if an RFC 3339 expiry timestamp lies in the future.
/// Unparseable timestamps count as expired.
fn is_unexpired(expires_at: &str) -> bool {
    DateTime::parse_from_rfc3339(expires_at)
        .map(|t| t > Utc::now())
        .unwrap_or(false)
}

/// Create a session row and return the (access, refresh) token pair
async fn issue_session(
    pool: &DbPool,
    config: &crate::config::AuthConfig,
    user_id: &str,
) -> Result<(String, String), ApiError> {
    let access = generate_token();
    let refresh = generate_token();

    let expires_at = (Utc::now() + Duration::minutes(config.access_token_minutes)).to_rfc3339();
    let refresh_expires_at = (Utc::now() + Duration::days(config.refresh_token_days)).to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, token_hash, refresh_token_hash, expires_at, refresh_expires_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(hash_token(&access))
    .bind(hash_token(&refresh))
    .bind(&expires_at)
    .bind(&refresh_expires_at)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok((access, refresh))
}

fn validate_register_request(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    if let Err(e) = validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    // Admin accounts exist only via the bootstrap path
    if req.role == Some(UserRole::Admin) {
        errors.add("role", "Role must be one of: guest, user");
    }

    errors.finish()
}

/// Registration endpoint: creates a user and logs them in
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    validate_register_request(&req)?;

    let existing: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let role = req.role.unwrap_or(UserRole::Guest);
    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %id, role = %role, "Registered new user");

    let (access, refresh) = issue_session(&state.db, &state.config.auth, &id).await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access,
            refresh,
            user: UserResponse {
                id,
                name: req.name,
                email: req.email,
                phone: req.phone,
                role: role.as_str().to_string(),
            },
        }),
    ))
}

/// Login endpoint: email + password in, token pair out
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let (access, refresh) = issue_session(&state.db, &state.config.auth, &user.id).await?;

    Ok(Json(TokenResponse {
        access,
        refresh,
        user: UserResponse::from(user),
    }))
}

/// Exchange a valid refresh token for a fresh token pair
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let refresh_hash = hash_token(&req.refresh);

    let session: Option<Session> =
        sqlx::query_as("SELECT * FROM sessions WHERE refresh_token_hash = ?")
            .bind(&refresh_hash)
            .fetch_optional(&state.db)
            .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;
    if !is_unexpired(&session.refresh_expires_at) {
        return Err(ApiError::unauthorized("Refresh token has expired"));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    // Rotate: the old session is gone once the new pair is issued
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(&session.id)
        .execute(&state.db)
        .await?;

    let (access, refresh) = issue_session(&state.db, &state.config.auth, &user.id).await?;

    Ok(Json(TokenResponse {
        access,
        refresh,
        user: UserResponse::from(user),
    }))
}

/// Issue a password reset token and email it to the account holder.
///
/// Always responds 200 to avoid confirming whether an account exists.
/// The token row is committed before the email is attempted; a send
/// failure is logged and does not undo the issuance.
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    if let Some(user) = user {
        let token = generate_token();
        let expires_at =
            (Utc::now() + Duration::minutes(state.config.auth.reset_token_minutes)).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(hash_token(&token))
        .bind(&expires_at)
        .bind(Utc::now().to_rfc3339())
        .execute(&state.db)
        .await?;

        let reset_url = format!(
            "{}/auth/password/reset/confirm/{}/{}",
            state.config.server.public_url, user.id, token
        );
        let email = state.email.clone();
        let minutes = state.config.auth.reset_token_minutes;
        tokio::spawn(async move {
            if let Err(e) = email
                .send_password_reset_email(&user.email, &user.name, &reset_url, minutes)
                .await
            {
                tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
            }
        });
    }

    Ok(Json(serde_json::json!({
        "message": "If an account with that email exists, a reset link has been sent"
    })))
}

/// Consume a reset token and set a new password
pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Path((uid, token)): Path<(String, String)>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Err(e) = validate_password(&req.password) {
        return Err(ApiError::validation_field("password", e));
    }

    let token_hash = hash_token(&token);
    let reset: Option<PasswordResetToken> = sqlx::query_as(
        "SELECT * FROM password_reset_tokens WHERE user_id = ? AND token_hash = ?",
    )
    .bind(&uid)
    .bind(&token_hash)
    .fetch_optional(&state.db)
    .await?;

    let reset = reset.ok_or_else(|| ApiError::unauthorized("Invalid or expired reset token"))?;
    if reset.used_at.is_some() || !is_unexpired(&reset.expires_at) {
        return Err(ApiError::unauthorized("Invalid or expired reset token"));
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(&now)
        .bind(&uid)
        .execute(&state.db)
        .await?;

    sqlx::query("UPDATE password_reset_tokens SET used_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&reset.id)
        .execute(&state.db)
        .await?;

    // A password change invalidates every open session for the account
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&uid)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %uid, "Password reset completed");

    Ok(Json(serde_json::json!({ "message": "Password has been reset" })))
}

/// Create the bootstrap admin account if no admin exists yet
pub async fn ensure_admin_user(pool: &DbPool, email: &str, password: &str) -> anyhow::Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;

    if count.0 > 0 {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
        VALUES (?, 'Administrator', ?, NULL, ?, 'admin', ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(email = %email, "Created bootstrap admin user");
    Ok(())
}

/// Extract the bearer token from request headers
fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    // Fall back to X-API-Key header (used with the bootstrap admin token)
    headers
        .get("X-API-Key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

/// Get the current user from a token
pub async fn get_current_user(
    pool: &DbPool,
    config: &crate::config::Config,
    token: &str,
) -> Result<User, ApiError> {
    // The bootstrap admin token authenticates as a synthetic admin.
    // Constant-time comparison to prevent timing attacks.
    let admin_token = config.auth.admin_token.as_bytes();
    let provided = token.as_bytes();
    if admin_token.len() == provided.len() && bool::from(admin_token.ct_eq(provided)) {
        return Ok(User {
            id: "system".to_string(),
            name: "System Admin".to_string(),
            email: config.auth.admin_email.clone(),
            phone: None,
            password_hash: String::new(),
            role: "admin".to_string(),
            created_at: Utc::now().to_rfc3339(),
            updated_at: Utc::now().to_rfc3339(),
        });
    }

    let token_hash = hash_token(token);
    let session: Option<Session> = sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ?")
        .bind(&token_hash)
        .fetch_optional(pool)
        .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
    if !is_unexpired(&session.expires_at) {
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
}

/// Extractor for the current authenticated user
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let user = get_current_user(&state.db, &state.config, &token).await?;
        Ok(AuthUser(user))
    }
}

/// Extractor that additionally requires the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::forbidden("Admin role required"));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_token_hash_is_stable_and_hex() {
        let token = "abc123";
        let h1 = hash_token(token);
        let h2 = hash_token(token);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_is_unexpired() {
        let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        assert!(is_unexpired(&future));
        assert!(!is_unexpired(&past));
        assert!(!is_unexpired("not-a-timestamp"));
    }

    #[test]
    fn test_register_rejects_admin_role() {
        let req = RegisterRequest {
            name: "Mallory".to_string(),
            email: "mallory@example.com".to_string(),
            password: "longenough".to_string(),
            phone: None,
            role: Some(UserRole::Admin),
        };
        assert!(validate_register_request(&req).is_err());
    }
}
