use std::sync::Arc;

use axum::{Form, extract::State, response::Response};
use tracing::{info, warn};
use validator::Validate;

use warbler_db::Database;
use warbler_db::models::NewUser;
use warbler_types::forms::{LoginForm, SignupForm, error_messages};
use warbler_types::session::Flash;

use crate::error::ApiError;
use crate::pages::{LoginPage, SignupPage};
use crate::session::Session;
use crate::with_db;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub session_secret: String,
}

pub async fn signup_form(mut session: Session) -> Result<Response, ApiError> {
    let ctx = session.page();
    session.render(SignupPage {
        ctx,
        errors: vec![],
        username: String::new(),
        email: String::new(),
        image_url: String::new(),
    })
}

/// Create the account and log it in. A taken username or e-mail re-renders
/// the form.
pub async fn signup(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<SignupForm>,
) -> Result<Response, ApiError> {
    let errors = match form.validate() {
        Ok(()) => {
            let new_user = NewUser {
                username: form.username.clone(),
                email: form.email.clone(),
                password: form.password.clone(),
                image_url: form.image_url.clone(),
            };

            match with_db(&state, move |db| db.signup(&new_user)).await {
                Ok(user) => {
                    info!("New user signed up: {}", user.username);
                    return Ok(session.login(&state, &user)?.redirect("/"));
                }
                Err(ApiError::Db(e)) if e.is_constraint() => {
                    warn!("Signup rejected: {}", e);
                    vec!["Username or email already taken.".to_string()]
                }
                Err(e) => return Err(e),
            }
        }
        Err(errors) => error_messages(&errors),
    };

    let ctx = session.page();
    session.render(SignupPage {
        ctx,
        errors,
        username: form.username.unwrap_or_default(),
        email: form.email.unwrap_or_default(),
        image_url: form.image_url.unwrap_or_default(),
    })
}

pub async fn login_form(mut session: Session) -> Result<Response, ApiError> {
    let ctx = session.page();
    session.render(LoginPage {
        ctx,
        errors: vec![],
        username: String::new(),
    })
}

pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let errors = match (form.validate(), &form.username, &form.password) {
        (Ok(()), Some(username), Some(password)) => {
            let (username, password) = (username.clone(), password.clone());
            match with_db(&state, move |db| db.authenticate(&username, &password)).await? {
                Some(user) => {
                    info!("User logged in: {}", user.username);
                    let greeting = Flash::success(format!("Hello, {}!", user.username));
                    return Ok(session.login(&state, &user)?.flash(greeting).redirect("/"));
                }
                None => vec!["Invalid credentials.".to_string()],
            }
        }
        (Err(errors), _, _) => error_messages(&errors),
        _ => vec!["Invalid credentials.".to_string()],
    };

    let ctx = session.page();
    session.render(LoginPage {
        ctx,
        errors,
        username: form.username.unwrap_or_default(),
    })
}

pub async fn logout(session: Session) -> Response {
    session
        .logout()
        .flash(Flash::success("You have successfully logged out."))
        .redirect("/login")
}
