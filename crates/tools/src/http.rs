//! Shared HTTP plumbing for tools that call upstream APIs.

use std::time::Duration;

use toolwright_core::error::ToolError;

/// Build the client every HTTP tool shares.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent(concat!("toolwright/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a transport error to a tool failure.
pub fn transport_error(tool_name: &str, upstream: &str, e: reqwest::Error) -> ToolError {
    let reason = if e.is_timeout() {
        format!("{upstream} did not respond in time")
    } else {
        format!("could not reach {upstream}: {e}")
    };
    ToolError::failed(tool_name, reason)
}

/// Map an unparseable body to a tool failure.
pub fn decode_error(tool_name: &str, upstream: &str, e: reqwest::Error) -> ToolError {
    ToolError::failed(tool_name, format!("unexpected response from {upstream}: {e}"))
}

pub fn trim_base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}
