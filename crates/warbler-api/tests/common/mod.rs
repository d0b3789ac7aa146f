//! In-process test client: drives the router with `tower::ServiceExt::oneshot`,
//! keeps cookies between requests and can follow redirects.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;

use warbler_api::session::{SESSION_COOKIE, create_token, decode_token};
use warbler_api::{AppState, AppStateInner};
use warbler_db::Database;
use warbler_db::models::{NewUser, UserRow};

pub const TEST_SECRET: &str = "test-secret";

pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

pub struct TestClient {
    pub state: AppState,
    router: Router,
    cookies: HashMap<String, String>,
}

impl TestClient {
    /// Fresh app on an empty in-memory database.
    pub fn new() -> Self {
        let db = Database::open_in_memory().expect("open test database");
        let state: AppState = Arc::new(AppStateInner {
            db,
            session_secret: TEST_SECRET.to_string(),
        });

        Self {
            router: warbler_api::router(state.clone()),
            state,
            cookies: HashMap::new(),
        }
    }

    pub fn signup(&self, username: &str) -> UserRow {
        self.state
            .db
            .signup(&NewUser::new(username, &format!("{username}@email.com"), "password"))
            .expect("signup test user")
    }

    /// Put the user straight into the session, skipping the login form.
    pub fn login_as(&mut self, user: &UserRow) {
        let token = create_token(TEST_SECRET, user).expect("session token");
        self.cookies.insert(SESSION_COOKIE.to_string(), token);
    }

    /// The current-user key held by the session cookie, if any.
    pub fn session_user_id(&self) -> Option<String> {
        self.cookies
            .get(SESSION_COOKIE)
            .and_then(|token| decode_token(TEST_SECRET, token))
            .map(|claims| claims.sub.to_string())
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = serde_urlencoded::to_string(fields).unwrap();
        let req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    pub async fn get_following_redirects(&mut self, uri: &str) -> TestResponse {
        let resp = self.get(uri).await;
        self.follow_redirects(resp).await
    }

    pub async fn post_following_redirects(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let resp = self.post_form(uri, fields).await;
        self.follow_redirects(resp).await
    }

    pub async fn follow_redirects(&mut self, mut resp: TestResponse) -> TestResponse {
        for _ in 0..10 {
            if !resp.status.is_redirection() {
                return resp;
            }
            let location = resp.location.clone().expect("redirect without location");
            resp = self.get(&location).await;
        }
        panic!("too many redirects");
    }

    async fn send(&mut self, mut req: Request<Body>) -> TestResponse {
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            req.headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let resp = self.router.clone().oneshot(req).await.unwrap();

        for set_cookie in resp.headers().get_all(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            let pair = set_cookie.split(';').next().unwrap_or_default();
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if value.is_empty() {
                self.cookies.remove(name.trim());
            } else {
                self.cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }

        let status = resp.status();
        let location = resp
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            location,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}
