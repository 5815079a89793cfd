use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    middleware::AuthenticatedUser,
    utils::{generate_token, success_to_api_response},
};

use super::model::{
    CreateSessionRequest, CreateSessionResponse, RefreshSessionResponse, SessionDocument,
    UpdateSessionRequest,
};

/// 读取当前用户自己的会话，别人的会话按不存在处理，存储不可用时返回 503
async fn load_owned(
    state: &AppState,
    user: &AuthenticatedUser,
    session_id: &str,
) -> Result<SessionDocument, AppError> {
    let session = state
        .sessions
        .try_load::<SessionDocument>(session_id)
        .await
        .map_err(|e| {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to read session");
            AppError::StoreUnavailable
        })?;
    session
        .filter(|session| session.user_id == user.0)
        .ok_or(AppError::NotFound)
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 检查用户ID格式
    if req.user_id.is_empty() || !req.user_id.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(AppError::BadRequest(
            "用户ID格式无效，只允许使用字母、数字和下划线".to_string(),
        ));
    }

    let ttl = state
        .config
        .session_ttl()
        .map_err(|_| AppError::InternalServerError)?;
    let now = chrono::Utc::now().timestamp();
    let session_id = uuid::Uuid::new_v4().to_string();
    let document = SessionDocument {
        user_id: req.user_id,
        data: req.data,
        created_at: now,
        updated_at: now,
    };

    state
        .sessions
        .save(&session_id, &document, ttl)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Failed to save session");
            AppError::StoreUnavailable
        })?;

    let (token, token_expires_at) = generate_token(&document.user_id, &state.config).map_err(|e| {
        tracing::error!(error = %e, "Failed to generate token");
        AppError::InternalServerError
    })?;

    tracing::info!(session_id = %session_id, user_id = %document.user_id, "Session created");
    Ok(success_to_api_response(CreateSessionResponse {
        session_id,
        token,
        token_expires_at,
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_owned(&state, &user, &session_id).await?;
    Ok(success_to_api_response(session))
}

pub async fn update_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<String>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ttl = state
        .config
        .session_ttl()
        .map_err(|_| AppError::InternalServerError)?;
    let mut session = load_owned(&state, &user, &session_id).await?;
    session.data = req.data;
    session.updated_at = chrono::Utc::now().timestamp();

    state
        .sessions
        .save(&session_id, &session, ttl)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Failed to update session");
            AppError::StoreUnavailable
        })?;
    Ok(success_to_api_response(session))
}

pub async fn refresh_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let ttl = state
        .config
        .session_ttl()
        .map_err(|_| AppError::InternalServerError)?;
    load_owned(&state, &user, &session_id).await?;

    let refreshed = state.sessions.refresh(&session_id, ttl).await.map_err(|e| {
        tracing::warn!(error = %e, "Failed to refresh session");
        AppError::StoreUnavailable
    })?;
    if !refreshed {
        return Err(AppError::NotFound);
    }

    Ok(success_to_api_response(RefreshSessionResponse {
        session_id,
        ttl_secs: ttl.as_secs(),
    }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    load_owned(&state, &user, &session_id).await?;

    state.sessions.invalidate(&session_id).await.map_err(|e| {
        tracing::warn!(error = %e, "Failed to delete session");
        AppError::StoreUnavailable
    })?;

    tracing::info!(session_id = %session_id, "Session deleted");
    Ok(success_to_api_response(session_id))
}
