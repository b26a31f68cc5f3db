use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::AppState;
use crate::crypto::verification_identifier;
use crate::database::StoreError;
use crate::error::{Result, ServerError};
use crate::router::{
    ValidJson, redirect_with, session_user, validate_redirect,
};

const FAILURE_MARKER: (&str, &str) = ("error", "bad_request");
const SUCCESS_MARKER: (&str, &str) = ("verified", "1");

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, message = "Redirect target is required."))]
    pub redirect_success: String,
    #[validate(length(min = 1, message = "Redirect target is required."))]
    pub redirect_failure: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub sent: bool,
}

/// Handler to mail a verification link to the authenticated user.
pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidJson(body): ValidJson<Body>,
) -> Result<Json<Response>> {
    let user_id = session_user(&state, &headers)?;

    let success = validate_redirect(
        &state.config,
        "redirect_success",
        &body.redirect_success,
    )?;
    let failure = validate_redirect(
        &state.config,
        "redirect_failure",
        &body.redirect_failure,
    )?;

    let user = state.db.users.find_by_id(user_id).await?;
    let identifier = verification_identifier(&user.email);

    let mut link = Url::parse(&state.config.url).map_err(|err| {
        ServerError::Internal {
            details: "instance `url` is not a valid URL".into(),
            source: Some(Box::new(err)),
        }
    })?;
    link.set_path("verify");
    link.query_pairs_mut()
        .append_pair("id", &user.id.to_string())
        .append_pair("hash", &identifier)
        .append_pair("success", success.as_str())
        .append_pair("failure", failure.as_str());

    state.mail.send_verification_link(&user, &link).await?;

    tracing::debug!(user_id = user.id, "verification link sent");

    Ok(Json(Response { sent: true }))
}

#[derive(Debug, Deserialize)]
pub struct Params {
    pub id: i64,
    pub hash: String,
    pub success: String,
    pub failure: String,
}

/// Handler for the verification link itself.
///
/// A missing user and a mismatched hash land on the same failure redirect:
/// the link must not reveal which check failed. Re-verifying an already
/// verified account is a success and leaves the timestamp untouched.
pub async fn confirm(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Redirect> {
    // Never follow an unvetted target, not even for failures.
    let success =
        validate_redirect(&state.config, "success", &params.success)?;
    let failure =
        validate_redirect(&state.config, "failure", &params.failure)?;

    let user = match state.db.users.find_by_id(params.id).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Ok(redirect_with(
                failure,
                FAILURE_MARKER.0,
                FAILURE_MARKER.1,
            ));
        },
        Err(err) => return Err(err.into()),
    };

    if verification_identifier(&user.email) != params.hash {
        return Ok(redirect_with(failure, FAILURE_MARKER.0, FAILURE_MARKER.1));
    }

    if user.email_verified_at.is_none() {
        state.db.users.set_verified_at(user.id, Utc::now()).await?;
        tracing::info!(user_id = user.id, "email verified");
    }

    Ok(redirect_with(success, SUCCESS_MARKER.0, SUCCESS_MARKER.1))
}
