//! WeChat mini-program login code exchange (jscode2session)

use bytes::Bytes;

use crate::config::WechatConfig;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("missing js_code")]
    MissingCode,

    #[error("identity provider unreachable: {0}")]
    Request(#[from] reqwest::Error),
}

/// Raw identity-provider answer, passed back to the caller untouched
#[derive(Debug, Clone)]
pub struct SessionPayload {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Create HTTP client with timeout
fn create_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

fn session_url(config: &WechatConfig) -> String {
    format!("{}/sns/jscode2session", config.base_url.trim_end_matches('/'))
}

/// Forward a short-lived login code plus the app credentials and return the
/// provider's response verbatim.
pub async fn exchange_code(config: &WechatConfig, js_code: &str) -> Result<SessionPayload, ExchangeError> {
    if js_code.is_empty() {
        return Err(ExchangeError::MissingCode);
    }

    let client = create_client(15);
    let params = [
        ("js_code", js_code),
        ("appid", config.app_id.as_str()),
        ("secret", config.secret.as_str()),
        ("grant_type", "authorization_code"),
    ];

    tracing::debug!("Exchanging login code...");

    let response = client.get(session_url(config)).query(&params).send().await?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let body = response.bytes().await?;

    tracing::debug!("Code exchange returned {} ({} bytes)", status, body.len());
    Ok(SessionPayload {
        status,
        content_type,
        body,
    })
}
