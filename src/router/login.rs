use axum::http::HeaderMap;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::auth::Credential;
use crate::error::Result;
use crate::router::{ValidJson, bearer};
use crate::user::User;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password must not be empty."))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub user: User,
}

/// Handler to login a user with credentials.
pub async fn handler(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<Body>,
) -> Result<Json<Response>> {
    let user = state
        .authenticator
        .authenticate(&Credential {
            email: body.email,
            password: body.password,
        })
        .await?;

    let token = state.sessions.establish(user.id);

    tracing::debug!(user_id = user.id, "session established");

    Ok(Json(Response {
        token_type: super::create::TOKEN_TYPE.to_owned(),
        token,
        user,
    }))
}

/// Handler to destroy the request's session.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let token = bearer(&headers)?;
    state.sessions.destroy(token);

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::create::tests::req_body;
    use crate::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;

    fn login_body(email: &str, password: &str) -> String {
        json!({ "email": email, "password": password }).to_string()
    }

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

    #[tokio::test]
    async fn test_login_handler() {
        let state = router::state();
        register(&state, "a@x.com", "longenough1").await;

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/login",
            None,
            login_body("a@x.com", "longenough1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("password"));

        let body: Response = serde_json::from_slice(&body).unwrap();
        assert_eq!(state.sessions.resolve(&body.token), Some(body.user.id));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let state = router::state();
        register(&state, "a@x.com", "longenough1").await;

        let wrong_password = make_request(
            app(state.clone()),
            Method::POST,
            "/login",
            None,
            login_body("a@x.com", "wrongpass99"),
        )
        .await;
        let unknown_email = make_request(
            app(state.clone()),
            Method::POST,
            "/login",
            None,
            login_body("nobody@x.com", "longenough1"),
        )
        .await;

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

        // Same body for both: no account enumeration.
        let first =
            wrong_password.into_body().collect().await.unwrap().to_bytes();
        let second =
            unknown_email.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_logout() {
        let state = router::state();
        register(&state, "a@x.com", "longenough1").await;

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/login",
            None,
            login_body("a@x.com", "longenough1"),
        )
        .await;
        let body =
            response.into_body().collect().await.unwrap().to_bytes();
        let body: Response = serde_json::from_slice(&body).unwrap();

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/logout",
            Some(&body.token),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.sessions.resolve(&body.token), None);

        // No header at all is a 401.
        let response = make_request(
            app(state),
            Method::POST,
            "/logout",
            None,
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
