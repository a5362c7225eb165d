use axum::{
    extract::{FromRef, State},
    http::HeaderMap,
    response::{Html, Redirect},
    routing::get,
    Form, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginForm, RegisterForm},
        password::{hash_password, verify_password},
        repo::User,
        session::{self, SessionKeys, SessionUser},
    },
    error::AppError,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(login_page))
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/logout", get(logout))
}

fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="es"><head><meta charset="utf-8"><title>Iniciar sesión</title></head>
<body>
  <h1>Iniciar sesión</h1>
  <form method="post" action="/login">
    <label>Usuario <input name="username" required></label>
    <label>Contraseña <input name="password" type="password" required></label>
    <button type="submit">Entrar</button>
  </form>
  <p><a href="/register">Crear una cuenta</a></p>
</body></html>
"#;

const REGISTER_PAGE: &str = r#"<!doctype html>
<html lang="es"><head><meta charset="utf-8"><title>Registro</title></head>
<body>
  <h1>Registro</h1>
  <form method="post" action="/register">
    <label>Usuario <input name="username" required></label>
    <label>Contraseña <input name="password" type="password" required></label>
    <button type="submit">Registrarse</button>
  </form>
  <p><a href="/login">Ya tengo cuenta</a></p>
</body></html>
"#;

pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

pub async fn register_page() -> Html<&'static str> {
    Html(REGISTER_PAGE)
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    Form(mut form): Form<LoginForm>,
) -> Result<(HeaderMap, Redirect), AppError> {
    form.username = form.username.trim().to_string();

    let user = User::find_by_username(&state.db, &form.username)
        .await?
        .ok_or_else(|| {
            warn!(username = %form.username, "login unknown username");
            AppError::Auth
        })?;

    if !verify_password(&form.password, &user.password_hash)? {
        warn!(username = %form.username, user_id = user.id, "login invalid password");
        return Err(AppError::Auth);
    }

    let keys = SessionKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    let headers = session::cookie_headers(&token, keys.ttl)?;

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok((headers, Redirect::to("/productos")))
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    Form(mut form): Form<RegisterForm>,
) -> Result<Redirect, AppError> {
    form.username = form.username.trim().to_string();

    if !is_valid_username(&form.username) {
        warn!(username = %form.username, "invalid username");
        return Err(AppError::Validation("invalid username".into()));
    }

    if form.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("password too short".into()));
    }

    if User::find_by_username(&state.db, &form.username)
        .await?
        .is_some()
    {
        warn!(username = %form.username, "username already registered");
        return Err(AppError::Conflict("username already registered".into()));
    }

    let hash = hash_password(&form.password)?;
    let user = User::create(&state.db, &form.username, &hash).await?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok(Redirect::to("/login"))
}

#[instrument(skip_all)]
pub async fn logout(SessionUser(user): SessionUser) -> (HeaderMap, Redirect) {
    info!(user_id = user.id, username = %user.username, "user logged out");
    (session::clear_cookie_headers(), Redirect::to("/login"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(is_valid_username("ana"));
        assert!(is_valid_username("ana.perez-99"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("con espacios"));
        assert!(!is_valid_username("ñandu"));
        assert!(!is_valid_username(&"x".repeat(33)));
    }
}
