//! Signed session cookies and the login guard.
//!
//! A session is carried entirely by the cookie:
//!
//! ```text
//! sgw_session=<b64url(username)>.<expires_unix>.<hex(hmac_sha256(secret, "<b64>.<expires>"))>
//! ```
//!
//! There is no server-side session table. A cookie is accepted when the
//! signature checks, it has not expired, and the user still exists.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::server::AppState;

pub const COOKIE_NAME: &str = "sgw_session";

type HmacSha256 = Hmac<Sha256>;

/// The authenticated user, inserted into request extensions by the guard.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

fn mac(secret: &[u8], payload: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac
}

/// Builds a signed cookie value for `username` expiring at `expires` (unix secs).
pub fn sign(username: &str, expires: i64, secret: &[u8]) -> String {
    let payload = format!("{}.{}", URL_SAFE_NO_PAD.encode(username), expires);
    let sig = hex::encode(mac(secret, &payload).finalize().into_bytes());
    format!("{}.{}", payload, sig)
}

/// Returns the username of a valid, unexpired cookie value.
pub fn verify(value: &str, secret: &[u8], now: i64) -> Option<String> {
    let (payload, sig) = value.rsplit_once('.')?;
    let sig = hex::decode(sig).ok()?;
    mac(secret, payload).verify_slice(&sig).ok()?;

    let (user_b64, expires) = payload.split_once('.')?;
    let expires: i64 = expires.parse().ok()?;
    if expires <= now {
        return None;
    }
    let raw = URL_SAFE_NO_PAD.decode(user_b64).ok()?;
    String::from_utf8(raw).ok()
}

/// `Set-Cookie` value that starts a session.
pub fn session_cookie(value: &str, ttl_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        COOKIE_NAME, value, ttl_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that ends a session.
pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Looks up a cookie by name across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Only same-site absolute paths are honoured as post-login targets.
pub fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}

pub fn login_redirect(target: &str) -> Redirect {
    Redirect::to(&format!("/login?next={}", urlencoding::encode(target)))
}

/// Resolves the session user from request headers, if any.
pub fn session_user(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let value = cookie_value(headers, COOKIE_NAME)?;
    let now = chrono::Utc::now().timestamp();
    let user = verify(value, state.config.server.secret(), now)?;
    state.users.contains(&user).then_some(user)
}

/// Guard for every route except the login page and health check.
pub async fn require_login(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match session_user(&state, req.headers()) {
        Some(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        None => {
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            tracing::debug!(path = %target, "unauthenticated request redirected to login");
            login_redirect(&target).into_response()
        }
    }
}
