use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use warbler_types::session::Flash;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::session::{CurrentUser, Session, load_user};

/// Resolve the session user, or send the visitor home with a notice.
pub async fn require_login(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match load_user(&state, &jar).await? {
        Some(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            Ok(next.run(req).await)
        }
        None => {
            debug!("Unauthenticated request to {}", req.uri().path());
            Ok(Session::from_jar(jar, None)
                .flash(Flash::danger("Access unauthorized."))
                .redirect("/"))
        }
    }
}
