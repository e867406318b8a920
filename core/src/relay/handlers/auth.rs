//! Login code exchange passthrough
//! Handles GET /jscode2session

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::oauth::{exchange_code, ExchangeError};
use crate::relay::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    #[serde(default)]
    pub js_code: String,
}

/// Handle GET /jscode2session
pub async fn handle_jscode2session(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Response, (StatusCode, String)> {
    let payload = exchange_code(&state.wechat, &query.js_code)
        .await
        .map_err(|e| match e {
            ExchangeError::MissingCode => (StatusCode::BAD_REQUEST, e.to_string()),
            ExchangeError::Request(_) => {
                tracing::error!("Code exchange failed: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
        })?;

    let status = StatusCode::from_u16(payload.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, payload.body).into_response();
    if let Some(content_type) = payload
        .content_type
        .as_deref()
        .and_then(|c| HeaderValue::from_str(c).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}
