use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use manifest_db::models::{UserPatch, UserRow};
use manifest_types::api::{
    AuthResponse, Claims, LoginRequest, ProfileStats, RegisterRequest, UpdateProfileRequest, UserProfile,
};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::stats::UserCounters;
use crate::{AppState, JwtSettings, parse_timestamp, parse_uuid, run_blocking};

pub const MIN_PASSWORD_LEN: usize = 6;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&req.email);
    if !looks_like_email(&email) {
        return Err(ApiError::BadRequest("Invalid email address".into()));
    }
    let full_name = req.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(ApiError::BadRequest("Full name is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }

    let db = state.clone();
    let user = run_blocking(move || {
        if db.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::BadRequest("Email already registered".into()));
        }

        let password_hash = hash_password(&req.password)?;
        let user_id = Uuid::new_v4().to_string();
        db.db.create_user(&user_id, &email, &full_name, &password_hash)?;

        db.db
            .get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user {} vanished after insert", user_id)))
    })
    .await?;

    tracing::info!("Registered user {}", user.id);
    auth_response(&state.jwt, &user, UserCounters::default().profile_stats())
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&req.email);

    let db = state.clone();
    let (user, counters) = run_blocking(move || {
        let user = db.db.get_user_by_email(&email)?.ok_or(ApiError::InvalidCredentials)?;
        if !verify_password(&req.password, &user.password)? {
            return Err(ApiError::InvalidCredentials);
        }
        let counters = UserCounters::load(&db.db, &user.id)?;
        Ok((user, counters))
    })
    .await?;

    auth_response(&state.jwt, &user, counters.profile_stats())
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfile>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let (user, counters) = run_blocking(move || {
        let user = db.db.get_user_by_id(&uid)?.ok_or(ApiError::NotFound("User"))?;
        let counters = UserCounters::load(&db.db, &uid)?;
        Ok((user, counters))
    })
    .await?;

    Ok(Json(profile(&user, counters.profile_stats())))
}

/// Partial profile update. Blank optional fields are stored as cleared.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let full_name = match req.full_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::BadRequest("Full name is required".into()));
        }
        other => other.map(|n| n.trim().to_string()),
    };
    let patch = UserPatch {
        full_name,
        avatar: req.avatar.map(blank_to_none),
        bio: req.bio.map(blank_to_none),
        location: req.location.map(blank_to_none),
        website: req.website.map(blank_to_none),
    };
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No data to update".into()));
    }

    let db = state.clone();
    let uid = claims.sub.to_string();
    let (user, counters) = run_blocking(move || {
        if !db.db.update_user(&uid, &patch)? {
            return Err(ApiError::NotFound("User"));
        }
        let user = db.db.get_user_by_id(&uid)?.ok_or(ApiError::NotFound("User"))?;
        let counters = UserCounters::load(&db.db, &uid)?;
        Ok((user, counters))
    })
    .await?;

    Ok(Json(profile(&user, counters.profile_stats())))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && domain.rsplit_once('.').is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2)
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn profile(user: &UserRow, stats: ProfileStats) -> UserProfile {
    UserProfile {
        id: parse_uuid(&user.id, "id", &user.id),
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        avatar: user.avatar.clone(),
        bio: user.bio.clone(),
        location: user.location.clone(),
        website: user.website.clone(),
        created_at: parse_timestamp(&user.created_at, &user.id),
        stats,
    }
}

fn auth_response(jwt: &JwtSettings, user: &UserRow, stats: ProfileStats) -> Result<Json<AuthResponse>, ApiError> {
    let profile = profile(user, stats);
    let access_token = create_token(jwt, profile.id, &profile.email)?;
    Ok(Json(AuthResponse {
        access_token,
        token_type: "bearer",
        user: profile,
    }))
}

fn create_token(jwt: &JwtSettings, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + jwt.ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_bytes()),
    )?;

    Ok(token)
}
