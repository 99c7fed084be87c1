pub mod middleware;

use serde::Deserialize;

/// Standard error payload returned by Google APIs.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
}

impl ApiErrorBody {
    pub fn display_message(&self) -> String {
        format!("{} (code: {})", self.error.message, self.error.code)
    }
}

/// Renders a non-success response into a single message, falling back to
/// `default_msg` plus the HTTP status when the body is not the standard
/// error payload.
pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    match response.json::<ApiErrorBody>().await {
        Ok(body) => body.display_message(),
        Err(_) => {
            log::warn!("unparseable error payload (HTTP {})", status);
            format!("{}: {}", default_msg, status)
        }
    }
}
