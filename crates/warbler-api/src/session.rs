//! Cookie-backed sessions and flash messages.
//!
//! The session cookie holds a signed JWT whose `sub` claim is the id of the
//! logged-in user. Flashes ride in a second cookie until a page renders them.

use askama::Template;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use uuid::Uuid;

use warbler_db::models::UserRow;
use warbler_types::session::{Flash, SessionClaims};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::pages::PageContext;
use crate::with_db;

pub const SESSION_COOKIE: &str = "warbler_session";
pub const FLASH_COOKIE: &str = "warbler_flash";

const SESSION_DAYS: i64 = 30;

/// The logged-in user, inserted into request extensions by `require_login`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

pub fn create_token(secret: &str, user: &UserRow) -> Result<String, ApiError> {
    let sub: Uuid = user
        .id
        .parse()
        .map_err(|_| ApiError::CorruptId(user.id.clone()))?;
    let claims = SessionClaims {
        sub,
        username: user.username.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Invalid, tampered or expired tokens read as "logged out".
pub fn decode_token(secret: &str, token: &str) -> Option<SessionClaims> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| debug!("Rejected session token: {}", e))
    .ok()
}

pub fn encode_flashes(flashes: &[Flash]) -> String {
    // Serializing plain structs of strings cannot fail.
    B64.encode(serde_json::to_vec(flashes).unwrap_or_default())
}

pub fn decode_flashes(value: &str) -> Vec<Flash> {
    B64.decode(value)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

/// Loads the user named by the session cookie. A session whose user has
/// since been deleted counts as logged out.
pub(crate) async fn load_user(state: &AppState, jar: &CookieJar) -> Result<Option<UserRow>, ApiError> {
    let Some(claims) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| decode_token(&state.session_secret, cookie.value()))
    else {
        return Ok(None);
    };

    let id = claims.sub.to_string();
    with_db(state, move |db| db.get_user(&id)).await
}

/// A 302 to a path on this site.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

pub struct Session {
    jar: CookieJar,
    user: Option<UserRow>,
    flashes: Vec<Flash>,
}

impl Session {
    pub fn from_jar(jar: CookieJar, user: Option<UserRow>) -> Self {
        let flashes = jar
            .get(FLASH_COOKIE)
            .map(|cookie| decode_flashes(cookie.value()))
            .unwrap_or_default();

        Self { jar, user, flashes }
    }

    pub fn user(&self) -> Option<&UserRow> {
        self.user.as_ref()
    }

    pub fn login(mut self, state: &AppState, user: &UserRow) -> Result<Self, ApiError> {
        let token = create_token(&state.session_secret, user)?;
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::days(SESSION_DAYS));

        self.jar = self.jar.add(cookie);
        self.user = Some(user.clone());
        Ok(self)
    }

    pub fn logout(mut self) -> Self {
        self.jar = self.jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
        self.user = None;
        self
    }

    /// Queue a notice for the next rendered page. Notices not yet shown are
    /// kept.
    pub fn flash(mut self, flash: Flash) -> Self {
        self.flashes.push(flash);
        let cookie = Cookie::build((FLASH_COOKIE, encode_flashes(&self.flashes)))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);

        self.jar = self.jar.add(cookie);
        self
    }

    /// Layout data for a page about to render. Hands over the pending flashes
    /// and clears their cookie.
    pub fn page(&mut self) -> PageContext {
        let flashes = std::mem::take(&mut self.flashes);
        if self.jar.get(FLASH_COOKIE).is_some() {
            self.jar = std::mem::take(&mut self.jar).remove(Cookie::build(FLASH_COOKIE).path("/"));
        }

        PageContext {
            user: self.user.clone(),
            flashes,
        }
    }

    pub fn render<T: Template>(self, page: T) -> Result<Response, ApiError> {
        let body = page.render()?;
        Ok((self.jar, Html(body)).into_response())
    }

    pub fn redirect(self, location: &str) -> Response {
        (self.jar, found(location)).into_response()
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let user = match parts.extensions.get::<CurrentUser>() {
            Some(CurrentUser(user)) => Some(user.clone()),
            None => load_user(state, &jar).await?,
        };

        Ok(Self::from_jar(jar, user))
    }
}
