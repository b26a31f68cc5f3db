pub mod create;
pub mod login;
pub mod reset;
pub mod status;
pub mod verify;

use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::http::{HeaderMap, header};
use axum::response::Redirect;
use url::Url;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::AppState;
use crate::config::Configuration;
use crate::error::{Result, ServerError};

/// JSON body extractor that runs `validator` rules after deserialization.
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: serde::de::DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Bearer token from the `Authorization` header.
pub fn bearer(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ServerError::Unauthorized)
}

/// Identity behind the request's session token.
pub fn session_user(state: &AppState, headers: &HeaderMap) -> Result<i64> {
    let token = bearer(headers)?;
    state
        .sessions
        .resolve(token)
        .ok_or(ServerError::Unauthorized)
}

/// Validate a caller-supplied redirect target.
///
/// Targets are untrusted input: they must be absolute http(s) URLs and, when
/// an allow-list is configured, their origin must be listed.
pub fn validate_redirect(
    config: &Configuration,
    field: &'static str,
    target: &str,
) -> Result<Url> {
    if let Ok(url) = Url::parse(target) {
        if matches!(url.scheme(), "http" | "https") {
            let allowed = config.allowed_redirects.is_empty()
                || config.allowed_redirects.iter().any(|origin| {
                    Url::parse(origin)
                        .map(|origin| origin.origin() == url.origin())
                        .unwrap_or(false)
                });

            if allowed {
                return Ok(url);
            }
        }
    }

    let mut errors = ValidationErrors::new();
    errors.add(
        field,
        ValidationError::new("redirect")
            .with_message("Redirect target is not allowed.".into()),
    );
    Err(ServerError::Validation(errors))
}

/// Redirect to `url` with an extra query-string marker appended.
pub fn redirect_with(mut url: Url, key: &str, value: &str) -> Redirect {
    url.query_pairs_mut().append_pair(key, value);
    Redirect::to(url.as_str())
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) fn state() -> AppState {
    use std::sync::Arc;

    let mut config = Configuration::default();
    config.name = "gatehouse".into();
    config.url = "https://gatehouse.test/".into();
    // keep hashing cheap in tests.
    config.argon2 = Some(crate::config::Argon2 {
        memory_cost: 8192,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    });
    let config = Arc::new(config);

    let db = crate::database::Database::in_memory();
    let crypto =
        Arc::new(crate::crypto::Crypto::new(config.argon2.clone()).unwrap());
    let authenticator = Arc::new(crate::auth::PasswordAuthenticator::new(
        Arc::clone(&db.users),
        Arc::clone(&crypto),
    ));

    AppState {
        config,
        db,
        crypto,
        authenticator,
        sessions: crate::session::SessionManager::default(),
        mail: crate::mail::MailManager::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_redirect() {
        let mut config = Configuration::default();

        // any http(s) origin without an allow-list.
        assert!(validate_redirect(&config, "success", "https://app.x.com/done").is_ok());
        assert!(validate_redirect(&config, "success", "ftp://app.x.com").is_err());
        assert!(validate_redirect(&config, "success", "/relative").is_err());

        config.allowed_redirects = vec!["https://app.x.com/".into()];
        assert!(validate_redirect(&config, "success", "https://app.x.com/done").is_ok());
        assert!(validate_redirect(&config, "success", "https://evil.example/done").is_err());
    }

    #[test]
    fn test_redirect_with() {
        let url = Url::parse("https://app.x.com/done?keep=1").unwrap();
        let redirect = redirect_with(url, "verified", "1");

        let response = axum::response::IntoResponse::into_response(redirect);
        let location = response
            .headers()
            .get(axum::http::header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(location, "https://app.x.com/done?keep=1&verified=1");
    }
}
