use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::config::Configuration;

/// Handler to expose public instance metadata.
///
/// Secret sections are `skip_serializing` on [`Configuration`] and never
/// leave the process.
pub async fn status(
    State(config): State<Arc<Configuration>>,
) -> Json<Arc<Configuration>> {
    Json(config)
}
