use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::database::NewUser;
use crate::error::Result;
use crate::router::ValidJson;
use crate::user::User;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 50,
        message = "Username must not be empty."
    ))]
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub user: User,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let password = state.crypto.pwd.hash_password(&body.password)?;
    let user = state
        .db
        .users
        .create(NewUser {
            username: body.username,
            email: body.email,
            password,
        })
        .await?;

    tracing::info!(user_id = user.id, "user created");

    let token = state.sessions.establish(user.id);

    Ok((
        StatusCode::CREATED,
        Json(Response {
            token_type: TOKEN_TYPE.to_owned(),
            token,
            user: user.strip_password(),
        }),
    ))
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;

    pub fn req_body(email: &str, password: &str) -> String {
        json!({
            "username": "A",
            "email": email,
            "password": password,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_create_handler() {
        let state = router::state();
        let app = app(state.clone());

        let response = make_request(
            app,
            Method::POST,
            "/create",
            None,
            req_body("a@x.com", "longenough1"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("password"));
        assert!(!text.contains("argon2"));

        let body: Response = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.token_type, TOKEN_TYPE);
        assert_eq!(body.user.email, "a@x.com");
        assert_eq!(state.sessions.resolve(&body.token), Some(body.user.id));

        // stored record holds a salted hash, never the plaintext.
        let stored = state.db.users.find_by_email("a@x.com").await.unwrap();
        assert!(stored.password.starts_with("$argon2id$"));
        assert!(!stored.password.contains("longenough1"));
    }

    #[tokio::test]
    async fn test_create_duplicate_email() {
        let state = router::state();

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/create",
            None,
            req_body("a@x.com", "longenough1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/create",
            None,
            req_body("a@x.com", "otherpass22"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"][0]["field"], "email");
    }

    #[tokio::test]
    async fn test_create_with_short_password() {
        let state = router::state();

        let response = make_request(
            app(state),
            Method::POST,
            "/create",
            None,
            req_body("a@x.com", "short"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
