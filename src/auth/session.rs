use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::Redirect,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    auth::{dto::CurrentUser, repo::User},
    config::SessionConfig,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// Claims carried by the session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub iat: usize,
    pub exp: usize,
}

/// Signing and verification keys for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let SessionConfig {
            secret,
            ttl_minutes,
        } = state.config.session.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl SessionKeys {
    pub fn sign(&self, user_id: i32) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id, "session token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        debug!(user_id = data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

/// `Set-Cookie` headers establishing a session.
pub fn cookie_headers(token: &str, max_age: Duration) -> anyhow::Result<HeaderMap> {
    let cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.as_secs()
    );
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, HeaderValue::from_str(&cookie)?);
    Ok(headers)
}

/// `Set-Cookie` headers ending a session.
pub fn clear_cookie_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    headers
}

fn token_from_parts(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .map(str::trim)
        .find_map(|kv| {
            kv.strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
}

/// Extracts the authenticated user from the session cookie, or redirects the
/// caller to the login page.
pub struct SessionUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);

        let Some(token) = token_from_parts(parts) else {
            return Err(Redirect::to("/login"));
        };

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired session token");
                return Err(Redirect::to("/login"));
            }
        };

        // Resolve the identity once per request; a stale token whose user no
        // longer resolves is treated the same as no session.
        let user = match User::find_by_id(&state.db, claims.sub).await {
            Ok(Some(u)) => u,
            _ => {
                warn!(user_id = claims.sub, "session user not found");
                return Err(Redirect::to("/login"));
            }
        };

        Ok(SessionUser(CurrentUser {
            id: user.id,
            username: user.username,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> SessionKeys {
        let state = AppState::fake();
        SessionKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let token = keys.sign(42).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, 42);
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn verify_rejects_garbage() {
        let keys = make_keys();
        assert!(keys.verify("not-a-token").is_err());
    }

    #[tokio::test]
    async fn verify_rejects_expired_token() {
        let keys = make_keys();
        let past = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = Claims {
            sub: 7,
            iat: past.unix_timestamp() as usize,
            exp: (past + TimeDuration::minutes(5)).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn token_is_read_from_cookie_header() {
        let req = axum::http::Request::builder()
            .header(header::COOKIE, "theme=dark; session=abc.def.ghi; lang=es")
            .body(())
            .expect("request");
        let (parts, _) = req.into_parts();
        assert_eq!(token_from_parts(&parts), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_cookie_yields_no_token() {
        let req = axum::http::Request::builder().body(()).expect("request");
        let (parts, _) = req.into_parts();
        assert_eq!(token_from_parts(&parts), None);

        let req = axum::http::Request::builder()
            .header(header::COOKIE, "theme=dark")
            .body(())
            .expect("request");
        let (parts, _) = req.into_parts();
        assert_eq!(token_from_parts(&parts), None);
    }

    #[test]
    fn cookie_headers_are_http_only() {
        let headers = cookie_headers("tok", Duration::from_secs(60)).expect("headers");
        let value = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie");
        assert!(value.starts_with("session=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Max-Age=60"));

        let cleared = clear_cookie_headers();
        let value = cleared
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie");
        assert!(value.contains("Max-Age=0"));
    }
}
