use crate::auth::{expired_session_cookie, session_cookie, session_id_from_cookie};
use crate::errors::AppError;
use crate::models::{DashboardView, LoginForm, TokenQuery};
use crate::scheduler::CycleOutcome;
use crate::state::AppState;
use crate::stats::build_dashboard;
use crate::ui::{render_index, render_login};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use tracing::{debug, info};

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    let cookie_id = session_id(&headers);

    let granted = state.sessions.lock().await.grant_by_token(
        cookie_id,
        &state.authenticator,
        query.token.as_deref(),
    );
    if let Some(id) = granted {
        debug!("session granted by token");
        let page = render_dashboard(&state).await;
        return ([(header::SET_COOKIE, session_cookie(&id))], page).into_response();
    }

    let authenticated = state.sessions.lock().await.is_authenticated(cookie_id);
    if authenticated {
        render_dashboard(&state).await.into_response()
    } else {
        Html(render_login(&state.title, None)).into_response()
    }
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let outcome = state.sessions.lock().await.log_in(
        session_id(&headers),
        &state.authenticator,
        &form.password,
    );

    match outcome {
        Ok(id) => {
            info!("dashboard login accepted");
            ([(header::SET_COOKIE, session_cookie(&id))], Redirect::to("/")).into_response()
        }
        Err(err) => {
            info!("dashboard login rejected");
            let page = render_login(&state.title, Some(&err.to_string()));
            (StatusCode::UNAUTHORIZED, Html(page)).into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.lock().await.remove(id);
    }
    ([(header::SET_COOKIE, expired_session_cookie())], Redirect::to("/")).into_response()
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardView>, AppError> {
    require_session(&state, &headers).await?;
    Ok(Json(current_view(&state).await))
}

/// Runs a cycle now unless one is already in flight, then returns the view.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardView>, AppError> {
    require_session(&state, &headers).await?;
    if state.refresher.try_run_cycle().await == CycleOutcome::Skipped {
        debug!("manual refresh skipped");
    }
    Ok(Json(current_view(&state).await))
}

pub async fn healthz() -> &'static str {
    "ok"
}

async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if state.sessions.lock().await.is_authenticated(session_id(headers)) {
        Ok(())
    } else {
        Err(AppError::unauthorized("login required"))
    }
}

async fn render_dashboard(state: &AppState) -> Html<String> {
    let view = current_view(state).await;
    Html(render_index(&view, state.logo.as_deref()))
}

async fn current_view(state: &AppState) -> DashboardView {
    state.refresher.ensure_loaded().await;
    let display = state.refresher.display().await;
    build_dashboard(&display, &state.title, state.refresh_interval_secs)
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(session_id_from_cookie)
}
