use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::database::StoreError;
use crate::error::{Result, ServerError};
use crate::router::ValidJson;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ForgotBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgotResponse {
    pub sent: bool,
}

/// Handler to request a password-reset token.
///
/// The response is identical whether or not the email is registered: this
/// endpoint must not confirm account existence.
pub async fn forgot(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<ForgotBody>,
) -> Result<Json<ForgotResponse>> {
    match state.db.users.find_by_email(&body.email).await {
        Ok(_) => {
            let token = state.crypto.tokens.generate();

            // Upsert: a new request silently supersedes any previous token
            // for this email.
            state
                .db
                .resets
                .upsert(&body.email, &token, Utc::now())
                .await?;

            state.mail.send_reset_link(&body.email, &token).await?;

            tracing::debug!("reset token issued");
        },
        Err(StoreError::NotFound) => {
            tracing::debug!("reset requested for unknown email");
        },
        Err(err) => return Err(err.into()),
    }

    Ok(Json(ForgotResponse { sent: true }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResetBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Token must not be empty."))]
    pub token: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: bool,
}

/// Handler to consume a reset token and replace the stored password hash.
///
/// Missing record, token mismatch and an exceeded validity window all
/// collapse to [`ServerError::InvalidToken`].
pub async fn reset(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<ResetBody>,
) -> Result<Json<ResetResponse>> {
    let record = match state.db.resets.find_by_email(&body.email).await {
        Ok(record) => record,
        Err(StoreError::NotFound) => return Err(ServerError::InvalidToken),
        Err(err) => return Err(err.into()),
    };

    if record.token != body.token {
        return Err(ServerError::InvalidToken);
    }

    if Utc::now() - record.created_at > state.config.reset_validity() {
        return Err(ServerError::InvalidToken);
    }

    // Defensive: the unique-email constraint makes an orphaned record
    // unreachable, yet it must still read as a bad token.
    let user = match state.db.users.find_by_email(&body.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ServerError::InvalidToken),
        Err(err) => return Err(err.into()),
    };

    let hash = state.crypto.pwd.hash_password(&body.new_password)?;
    state.db.users.set_password_hash(user.id, &hash).await?;

    // Single-use: a consumed token can never succeed twice.
    state.db.resets.delete_by_email(&body.email).await?;

    tracing::info!(user_id = user.id, "password reset");

    Ok(Json(ResetResponse { reset: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::create::tests::req_body;
    use crate::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;

    async fn register(state: &AppState, email: &str, password: &str) {
        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/create",
            None,
            req_body(email, password),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    async fn forgot(state: &AppState, email: &str) -> StatusCode {
        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/password/forgot",
            None,
            json!({ "email": email }).to_string(),
        )
        .await;
        response.status()
    }

    async fn reset(
        state: &AppState,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> StatusCode {
        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/password/reset",
            None,
            json!({
                "email": email,
                "token": token,
                "new_password": new_password,
            })
            .to_string(),
        )
        .await;
        response.status()
    }

    async fn login(state: &AppState, email: &str, password: &str) -> StatusCode {
        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/login",
            None,
            json!({ "email": email, "password": password }).to_string(),
        )
        .await;
        response.status()
    }

    async fn issued_token(state: &AppState, email: &str) -> String {
        state.db.resets.find_by_email(email).await.unwrap().token
    }

    #[tokio::test]
    async fn test_forgot_hides_account_existence() {
        let state = router::state();
        register(&state, "a@x.com", "longenough1").await;

        let known = make_request(
            app(state.clone()),
            Method::POST,
            "/password/forgot",
            None,
            json!({ "email": "a@x.com" }).to_string(),
        )
        .await;
        let unknown = make_request(
            app(state.clone()),
            Method::POST,
            "/password/forgot",
            None,
            json!({ "email": "nobody@x.com" }).to_string(),
        )
        .await;

        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(unknown.status(), StatusCode::OK);

        let first = known.into_body().collect().await.unwrap().to_bytes();
        let second = unknown.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(first, second);

        // No record materializes for the unknown address.
        assert!(state.db.resets.find_by_email("nobody@x.com").await.is_err());
    }

    #[tokio::test]
    async fn test_new_request_supersedes_token() {
        let state = router::state();
        register(&state, "a@x.com", "longenough1").await;

        assert_eq!(forgot(&state, "a@x.com").await, StatusCode::OK);
        let first = issued_token(&state, "a@x.com").await;

        assert_eq!(forgot(&state, "a@x.com").await, StatusCode::OK);
        let second = issued_token(&state, "a@x.com").await;
        assert_ne!(first, second);

        // Superseded token can never succeed.
        assert_eq!(
            reset(&state, "a@x.com", &first, "newpass123").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            reset(&state, "a@x.com", &second, "newpass123").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_reset_is_single_use() {
        let state = router::state();
        register(&state, "a@x.com", "longenough1").await;

        assert_eq!(forgot(&state, "a@x.com").await, StatusCode::OK);
        let token = issued_token(&state, "a@x.com").await;

        // Wrong token first.
        assert_eq!(
            reset(&state, "a@x.com", "deadbeef", "newpass123").await,
            StatusCode::BAD_REQUEST
        );

        assert_eq!(
            reset(&state, "a@x.com", &token, "newpass123").await,
            StatusCode::OK
        );

        // Old password no longer authenticates, new one does.
        assert_eq!(
            login(&state, "a@x.com", "longenough1").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            login(&state, "a@x.com", "newpass123").await,
            StatusCode::OK
        );

        // Consumed: reusing the same token fails.
        assert_eq!(
            reset(&state, "a@x.com", &token, "anotherpass1").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let state = router::state();
        register(&state, "a@x.com", "longenough1").await;

        let token = state.crypto.tokens.generate();
        let stale = Utc::now()
            - state.config.reset_validity()
            - chrono::Duration::minutes(1);
        state
            .db
            .resets
            .upsert("a@x.com", &token, stale)
            .await
            .unwrap();

        assert_eq!(
            reset(&state, "a@x.com", &token, "newpass123").await,
            StatusCode::BAD_REQUEST
        );
    }
}
