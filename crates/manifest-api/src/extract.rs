//! Request extractors whose rejections render as `ApiError`, so malformed
//! bodies and query strings get the same `{"detail": ...}` shape as every
//! other failure.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request, rejection::JsonRejection, rejection::QueryRejection},
    http::request::Parts,
};
use uuid::Uuid;

use crate::error::ApiError;

/// JSON body. Missing fields, unknown fields, bad syntax and a missing
/// content type are all reported as 400.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Query string. A missing or malformed parameter is reported as 400.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Resource ids arrive as raw path segments. Anything that is not a UUID
/// cannot name a stored row, so it is reported as missing.
pub(crate) fn resource_id(raw: &str, resource: &'static str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound(resource))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::password_reset::ResetDelivery;
    use crate::test_support::{register, send, send_raw, state};

    #[test]
    fn non_uuid_id_is_not_found() {
        let err = resource_id("not-a-uuid", "Habit").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Habit not found");
    }

    #[tokio::test]
    async fn missing_body_field_is_bad_request_with_detail() {
        let state = state(ResetDelivery::OutOfBand);

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "x@example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("full_name"), "{body}");

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": "abc" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request_with_detail() {
        let state = state(ResetDelivery::OutOfBand);

        let (status, body) =
            send_raw(&state, "POST", "/api/auth/login", Some("application/json"), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let (status, body) = send_raw(&state, "POST", "/api/auth/login", None, "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn missing_token_query_is_bad_request_with_detail() {
        let state = state(ResetDelivery::OutOfBand);

        let (status, body) = send(&state, "POST", "/api/auth/validate-reset-token", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn non_uuid_path_is_not_found_with_detail() {
        let state = state(ResetDelivery::OutOfBand);
        let token = register(&state, "ids@example.com", "secret123").await;

        for uri in ["/api/habits/not-a-uuid", "/api/goals/not-a-uuid"] {
            let (status, body) = send(&state, "GET", uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert!(body["detail"].as_str().unwrap().ends_with("not found"));
        }

        let (status, body) =
            send(&state, "POST", "/api/habits/not-a-uuid/toggle", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Habit not found");
    }
}
