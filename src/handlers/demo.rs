use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{error::Result, registry::Registry, state::AppState};

/// The response payload describing the caller's session.
#[derive(Serialize)]
pub struct SessionView {
    pub id: String,
    pub is_new: bool,
    pub visits: u64,
}

/// The response payload for logout.
#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Counts the caller's visits in their session and returns the session.
#[axum::debug_handler]
pub async fn show_session(
    State(state): State<AppState>,
    registry: Registry,
    cookies: Cookies,
) -> Result<impl IntoResponse> {
    let name = state.config.cookie_name.as_str();
    let (mut session, error) = state.store.get(&registry, &cookies, name).await;
    if let Some(e) = error {
        tracing::debug!("Starting a new session: {}", e);
    }

    let is_new = session.is_new;
    let visits = session.values.get::<u64>("visits").unwrap_or(0) + 1;
    session.values.insert("visits", &visits)?;

    state.store.save(&cookies, &mut session).await?;
    registry.put(session.clone()).await;

    let view = SessionView {
        id: session.id,
        is_new,
        visits,
    };
    Ok((StatusCode::OK, Json(view)))
}

/// Deletes the caller's session.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    registry: Registry,
    cookies: Cookies,
) -> Result<impl IntoResponse> {
    let name = state.config.cookie_name.as_str();
    let (mut session, _) = state.store.get(&registry, &cookies, name).await;

    state.store.delete(&cookies, &mut session).await?;
    registry.put(session).await;
    tracing::info!("✅ Session deleted");

    Ok((StatusCode::OK, Json(LogoutResponse { success: true })))
}
