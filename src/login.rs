//! Login HTTP handshake (spec.md §4.5, §6).
//!
//! Grounded on the teacher's `client.rs` connect routine for the
//! "distinguish terminal failure from retryable failure" error shape,
//! reimplemented over `reqwest` since the teacher never makes an HTTP
//! call of its own (the wider pack's `other_examples` HTTP clients were
//! consulted for the request-building idiom).

use serde::Serialize;
use serde_json::Value;

/// Outcome of one login attempt.
#[derive(Debug)]
pub enum LoginError {
    /// HTTP 403: bad credentials. Terminal, never retried.
    Forbidden,
    /// Anything else: network failure, non-200/403 status, or an
    /// unparsable response body. Retryable.
    Other(anyhow::Error),
}

impl std::fmt::Display for LoginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginError::Forbidden => write!(f, "credentials rejected"),
            LoginError::Other(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoginError {}

#[derive(Debug)]
pub struct LoginResult {
    pub auth_token: String,
    pub session_id: String,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// Performs a single login attempt. Does not retry; the Session
/// Supervisor owns the retry loop and the 403/other distinction.
pub async fn attempt(
    http: &reqwest::Client,
    login_url: &str,
    username: &str,
    password: &str,
) -> Result<LoginResult, LoginError> {
    let response = http
        .post(login_url)
        .header("x-csrftoken", "a")
        .header("x-requested-with", "XMLHttpRequest")
        .header("cookie", "scratchcsrftoken=a;scratchlanguage=en;")
        .header("referer", "https://scratch.mit.edu")
        .header(
            "user-agent",
            "Mozilla/5.0 (compatible; scratch-cloud/0.1)",
        )
        .json(&LoginBody { username, password })
        .send()
        .await
        .map_err(|e| LoginError::Other(e.into()))?;

    if response.status() == reqwest::StatusCode::FORBIDDEN {
        return Err(LoginError::Forbidden);
    }
    if !response.status().is_success() {
        return Err(LoginError::Other(anyhow::anyhow!(
            "login returned status {}",
            response.status()
        )));
    }

    let session_id = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_session_id)
        .ok_or_else(|| LoginError::Other(anyhow::anyhow!("no session id in Set-Cookie header")))?;

    let body: Vec<Value> = response
        .json()
        .await
        .map_err(|e| LoginError::Other(e.into()))?;

    let auth_token = body
        .first()
        .and_then(|entry| entry.get("token"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| LoginError::Other(anyhow::anyhow!("login response missing token field")))?
        .to_string();

    Ok(LoginResult {
        auth_token,
        session_id,
    })
}

/// Extracts the `scratchsessionsid` cookie value out of a raw
/// `Set-Cookie` header. The original implementation this crate is
/// modeled on scrapes the first quoted substring out of the raw
/// headers; per spec.md §9 we keep the behavior (an opaque token,
/// forwarded verbatim) but get there with the `Set-Cookie` attribute
/// grammar instead of a generic quote-matching regex.
fn extract_session_id(set_cookie: &str) -> Option<String> {
    for cookie_pair in set_cookie.split(';') {
        let cookie_pair = cookie_pair.trim();
        if let Some(raw) = cookie_pair.strip_prefix("scratchsessionsid=") {
            return Some(raw.trim_matches('"').to_string());
        }
    }
    None
}
