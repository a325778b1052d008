//! Password reset tokens.
//!
//! A token is issued per forgot-password request, is valid until it expires or
//! is used once, and is never deleted. Issuing a new token leaves earlier
//! ones valid. Only the SHA-256 digest of a token is stored.
//!
//! ```text
//! ISSUED --reset ok--> USED       (terminal, written)
//! ISSUED --now >= expires_at--> EXPIRED (terminal, never written)
//! ```

use axum::{
    Json,
    extract::State,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use manifest_db::Database;
use manifest_types::api::{
    ForgotPasswordRequest, ForgotPasswordResponse, MessageResponse, ResetPasswordRequest,
    ValidateResetTokenQuery, ValidateResetTokenResponse,
};

use crate::auth::{MIN_PASSWORD_LEN, hash_password, normalize_email};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::{AppState, run_blocking};

/// Random bytes per token, before base64.
const TOKEN_BYTES: usize = 32;

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent";

#[derive(Error, Debug)]
pub enum ResetError {
    /// Unknown, already used or expired. Deliberately not distinguished.
    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    #[error("Password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// How an issued token reaches the account owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetDelivery {
    /// Handed to the mail hook; never part of the HTTP response.
    OutOfBand,
    /// Returned in the forgot-password response. Development only.
    InResponse,
}

pub struct ResetSettings {
    pub ttl: Duration,
    pub delivery: ResetDelivery,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Row id of the stored digest; safe to log.
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Issue a token for the account registered under `email`. Returns `None`
/// (and writes nothing) when no such account exists.
pub fn request_reset(
    db: &Database,
    email: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<IssuedToken>> {
    let Some(user) = db.get_user_by_email(&normalize_email(email))? else {
        return Ok(None);
    };

    let id = Uuid::new_v4().to_string();
    let token = generate_token();
    let expires_at = now + ttl;
    db.insert_reset_token(
        &id,
        &user.id,
        &token_digest(&token),
        expires_at.timestamp_millis(),
    )?;

    info!("Issued password reset token for user {}", user.id);
    Ok(Some(IssuedToken {
        id,
        token,
        user_id: user.id,
        expires_at,
    }))
}

/// Expiry of `token` if it is unused and unexpired at `now`.
pub fn validate_token(db: &Database, token: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ResetError> {
    let row = db
        .find_active_reset_token(&token_digest(token), now.timestamp_millis())?
        .ok_or(ResetError::InvalidOrExpiredToken)?;

    DateTime::from_timestamp_millis(row.expires_at)
        .ok_or_else(|| ResetError::Store(anyhow::anyhow!("corrupt expires_at on reset token {}", row.id)))
}

/// Consume `token` and set the owner's password. The password policy is
/// checked first so a rejected password never burns a valid token.
pub fn reset_password(
    db: &Database,
    token: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> Result<(), ResetError> {
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ResetError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }

    let digest = token_digest(token);
    let now_ms = now.timestamp_millis();

    // Cheap lookup first so guessed tokens never pay for a password hash. The
    // conditional write below still decides.
    if db.find_active_reset_token(&digest, now_ms)?.is_none() {
        return Err(ResetError::InvalidOrExpiredToken);
    }

    let password_hash = hash_password(new_password)?;

    match db.consume_reset_token(&digest, now_ms, &password_hash)? {
        Some(user_id) => {
            info!("Password reset completed for user {}", user_id);
            Ok(())
        }
        None => Err(ResetError::InvalidOrExpiredToken),
    }
}

/// Stand-in for the mailer: records that a reset was issued. The token value
/// never reaches the log.
fn deliver_out_of_band(issued: &IssuedToken) {
    info!("{}", delivery_notice(issued));
}

fn delivery_notice(issued: &IssuedToken) -> String {
    format!(
        "Password reset {} for user {} ready for delivery (expires {})",
        issued.id, issued.user_id, issued.expires_at
    )
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let db = state.clone();
    let issued = run_blocking(move || {
        Ok(request_reset(&db.db, &req.email, db.resets.ttl, Utc::now())?)
    })
    .await?;

    let reset_token = match (state.resets.delivery, issued) {
        (ResetDelivery::InResponse, Some(issued)) => Some(issued.token),
        // Decoy keeps the response shape identical for unknown emails; it is
        // never stored, so it never validates.
        (ResetDelivery::InResponse, None) => Some(generate_token()),
        (ResetDelivery::OutOfBand, Some(issued)) => {
            deliver_out_of_band(&issued);
            None
        }
        (ResetDelivery::OutOfBand, None) => None,
    };

    Ok(Json(ForgotPasswordResponse {
        message: FORGOT_PASSWORD_MESSAGE,
        reset_token,
    }))
}

pub async fn validate_reset_token(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ValidateResetTokenQuery>,
) -> Result<Json<ValidateResetTokenResponse>, ApiError> {
    let db = state.clone();
    let expires_at = run_blocking(move || Ok(validate_token(&db.db, &query.token, Utc::now())?)).await?;

    Ok(Json(ValidateResetTokenResponse {
        valid: true,
        expires_at,
    }))
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let db = state.clone();
    run_blocking(move || {
        reset_password(&db.db, &req.token, &req.new_password, Utc::now()).map_err(|e| {
            if matches!(e, ResetError::InvalidOrExpiredToken) {
                warn!("Rejected password reset with invalid or expired token");
            }
            ApiError::from(e)
        })
    })
    .await?;

    Ok(Json(MessageResponse {
        message: "Password reset successful",
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::auth::verify_password;
    use crate::test_support::{register, send, state};

    fn db_with_user(email: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        let hash = hash_password("original-pw").unwrap();
        db.create_user("u1", email, "Test User", &hash).unwrap();
        db
    }

    fn password_of(db: &Database) -> String {
        db.get_user_by_id("u1").unwrap().unwrap().password
    }

    fn token_count(db: &Database) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM password_reset_tokens", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn token_is_url_safe_and_long() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn full_lifecycle() {
        let db = db_with_user("exists@x.com");
        let now = Utc::now();

        let issued = request_reset(&db, "exists@x.com", Duration::hours(1), now).unwrap().unwrap();
        assert_eq!(issued.expires_at, now + Duration::hours(1));

        let expires_at = validate_token(&db, &issued.token, now).unwrap();
        assert_eq!(expires_at.timestamp_millis(), issued.expires_at.timestamp_millis());

        reset_password(&db, &issued.token, "abc12345", now).unwrap();
        assert!(verify_password("abc12345", &password_of(&db)).unwrap());

        let err = reset_password(&db, &issued.token, "other123", now).unwrap_err();
        assert!(matches!(err, ResetError::InvalidOrExpiredToken));
        assert!(matches!(validate_token(&db, &issued.token, now), Err(ResetError::InvalidOrExpiredToken)));
        assert!(verify_password("abc12345", &password_of(&db)).unwrap());
    }

    #[test]
    fn unknown_email_writes_nothing() {
        let db = db_with_user("exists@x.com");
        let issued = request_reset(&db, "unknown@x.com", Duration::hours(1), Utc::now()).unwrap();
        assert!(issued.is_none());
        assert_eq!(token_count(&db), 0);
    }

    #[test]
    fn email_lookup_ignores_case_and_whitespace() {
        let db = db_with_user("exists@x.com");
        let issued = request_reset(&db, "  Exists@X.com ", Duration::hours(1), Utc::now()).unwrap();
        assert!(issued.is_some());
    }

    #[test]
    fn short_password_does_not_consume_token() {
        let db = db_with_user("exists@x.com");
        let now = Utc::now();
        let issued = request_reset(&db, "exists@x.com", Duration::hours(1), now).unwrap().unwrap();

        let err = reset_password(&db, &issued.token, "ab12", now).unwrap_err();
        assert!(matches!(err, ResetError::PasswordTooShort { min: 6 }));
        assert!(validate_token(&db, &issued.token, now).is_ok());
        assert!(verify_password("original-pw", &password_of(&db)).unwrap());
    }

    #[test]
    fn expired_token_is_rejected() {
        let db = db_with_user("exists@x.com");
        let now = Utc::now();
        let issued = request_reset(&db, "exists@x.com", Duration::seconds(-1), now).unwrap().unwrap();

        assert!(matches!(validate_token(&db, &issued.token, now), Err(ResetError::InvalidOrExpiredToken)));
        assert!(matches!(
            reset_password(&db, &issued.token, "abc12345", now),
            Err(ResetError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn token_expires_with_time() {
        let db = db_with_user("exists@x.com");
        let now = Utc::now();
        let issued = request_reset(&db, "exists@x.com", Duration::hours(1), now).unwrap().unwrap();

        assert!(validate_token(&db, &issued.token, now + Duration::minutes(59)).is_ok());
        assert!(validate_token(&db, &issued.token, now + Duration::hours(1)).is_err());
    }

    #[test]
    fn multiple_outstanding_tokens_are_independent() {
        let db = db_with_user("exists@x.com");
        let now = Utc::now();
        let first = request_reset(&db, "exists@x.com", Duration::hours(1), now).unwrap().unwrap();
        let second = request_reset(&db, "exists@x.com", Duration::hours(1), now).unwrap().unwrap();
        assert_ne!(first.token, second.token);

        reset_password(&db, &second.token, "second-pw", now).unwrap();
        assert!(validate_token(&db, &first.token, now).is_ok());
    }

    #[test]
    fn wrong_token_is_rejected() {
        let db = db_with_user("exists@x.com");
        assert!(matches!(
            validate_token(&db, "definitely-not-a-token", Utc::now()),
            Err(ResetError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn unknown_token_reset_leaves_account_untouched() {
        let db = db_with_user("exists@x.com");
        let before = password_of(&db);

        let err = reset_password(&db, &generate_token(), "abc12345", Utc::now()).unwrap_err();
        assert!(matches!(err, ResetError::InvalidOrExpiredToken));
        assert_eq!(password_of(&db), before);
    }

    #[test]
    fn delivery_notice_omits_token_value() {
        let db = db_with_user("exists@x.com");
        let issued = request_reset(&db, "exists@x.com", Duration::hours(1), Utc::now()).unwrap().unwrap();

        let notice = delivery_notice(&issued);
        assert!(notice.contains(&issued.id));
        assert!(notice.contains("u1"));
        assert!(!notice.contains(&issued.token));
        assert!(!notice.contains(&issued.token[..8]));
    }

    #[test]
    fn concurrent_resets_have_one_winner() {
        let db = Arc::new(db_with_user("exists@x.com"));
        let now = Utc::now();
        let token = request_reset(&db, "exists@x.com", Duration::hours(1), now).unwrap().unwrap().token;

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["first-pw", "second-pw"]
            .into_iter()
            .map(|pw| {
                let db = Arc::clone(&db);
                let barrier = Arc::clone(&barrier);
                let token = token.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (pw, reset_password(&db, &token, pw, now))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<&str> = results.iter().filter(|(_, r)| r.is_ok()).map(|(pw, _)| *pw).collect();
        assert_eq!(winners.len(), 1);
        for (_, result) in &results {
            if let Err(e) = result {
                assert!(matches!(e, ResetError::InvalidOrExpiredToken));
            }
        }
        assert!(verify_password(winners[0], &password_of(&db)).unwrap());
    }

    #[tokio::test]
    async fn http_flow_with_in_band_delivery() {
        let state = state(ResetDelivery::InResponse);
        register(&state, "exists@x.com", "TestPassword123!").await;

        let (status, body) =
            send(&state, "POST", "/api/auth/forgot-password", None, Some(json!({ "email": "exists@x.com" })))
                .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["reset_token"].as_str().unwrap().to_string();

        let uri = format!("/api/auth/validate-reset-token?token={token}");
        let (status, body) = send(&state, "POST", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "abc12345" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().to_lowercase().contains("successful"));

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "other123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid or expired reset token");

        let (status, _) = send(
            &state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "exists@x.com", "password": "abc12345" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_email_has_same_response_shape() {
        for delivery in [ResetDelivery::InResponse, ResetDelivery::OutOfBand] {
            let state = state(delivery);
            register(&state, "exists@x.com", "TestPassword123!").await;

            let (known_status, known) =
                send(&state, "POST", "/api/auth/forgot-password", None, Some(json!({ "email": "exists@x.com" })))
                    .await;
            let (unknown_status, unknown) =
                send(&state, "POST", "/api/auth/forgot-password", None, Some(json!({ "email": "unknown@x.com" })))
                    .await;

            assert_eq!(known_status, StatusCode::OK);
            assert_eq!(unknown_status, known_status);
            assert_eq!(unknown["message"], known["message"]);
            let keys = |v: &serde_json::Value| {
                let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
                k.sort();
                k
            };
            assert_eq!(keys(&unknown), keys(&known));
            assert_eq!(known.get("reset_token").is_some(), delivery == ResetDelivery::InResponse);

            if let Some(decoy) = unknown["reset_token"].as_str() {
                let uri = format!("/api/auth/validate-reset-token?token={decoy}");
                let (status, _) = send(&state, "POST", &uri, None, None).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
            }
        }
    }

    #[tokio::test]
    async fn short_password_over_http_keeps_token_valid() {
        let state = state(ResetDelivery::InResponse);
        register(&state, "exists@x.com", "TestPassword123!").await;
        let (_, body) =
            send(&state, "POST", "/api/auth/forgot-password", None, Some(json!({ "email": "exists@x.com" })))
                .await;
        let token = body["reset_token"].as_str().unwrap().to_string();

        let (status, _) = send(
            &state,
            "POST",
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "ab12" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/auth/validate-reset-token?token={token}");
        let (status, _) = send(&state, "POST", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
