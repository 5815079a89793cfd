use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{AppState, middleware::AuthenticatedUser, utils::success_to_api_response};

use super::model::PublishResponse;

pub async fn publish(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(channel): Path<String>,
    body: String,
) -> impl IntoResponse {
    let receivers = state.notifier.publish(&channel, body.as_bytes()).await;
    tracing::debug!(channel = %channel, user_id = %user.0, receivers, "Published notification");
    success_to_api_response(PublishResponse { channel, receivers })
}
