use axum::{
    Extension,
    extract::{Path, State},
    http::{HeaderMap, Uri, header},
    response::Response,
};
use tracing::debug;

use warbler_types::session::Flash;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::pages::{LikesPage, MessageView};
use crate::session::{CurrentUser, Session};
use crate::users::profile_view;
use crate::{PAGE_LIMIT, parse_id, with_db};

/// Path of the page the request came from. Only the path is kept so the
/// redirect never leaves the site. Browsers read `/\` like `//`, so any
/// backslash falls back to `/`.
fn back_path(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uri>().ok())
        .and_then(|uri| uri.path_and_query().map(|pq| pq.as_str().to_string()))
        .filter(|path| path.starts_with('/') && !path.starts_with("//") && !path.contains('\\'))
        .unwrap_or_else(|| "/".to_string())
}

/// POST /messages/{message_id}/like: toggles; users can't like their own
/// warbles.
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, ApiError> {
    let message_id = parse_id(&message_id)?;
    let back = back_path(&headers);

    let id = message_id.clone();
    let row = with_db(&state, move |db| db.get_message(&id))
        .await?
        .ok_or(ApiError::NotFound)?;

    if row.user_id == me.id {
        return Ok(session
            .flash(Flash::danger("You can't like your own warble."))
            .redirect(&back));
    }

    let user_id = me.id.clone();
    let liked = with_db(&state, move |db| db.toggle_like(&user_id, &message_id)).await?;
    debug!("{} {} message {}", me.username, if liked { "liked" } else { "unliked" }, row.id);

    Ok(session.redirect(&back))
}

/// GET /users/{user_id}/likes
pub async fn show_likes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    mut session: Session,
) -> Result<Response, ApiError> {
    let user_id = parse_id(&user_id)?;

    let viewer = me.clone();
    let (profile, rows, liked_ids) = with_db(&state, move |db| {
        let Some(profile) = profile_view(db, &user_id, &viewer)? else {
            return Ok(None);
        };
        let rows = db.liked_messages(&user_id, PAGE_LIMIT)?;
        let liked_ids = db.liked_message_ids(&viewer.id)?;
        Ok(Some((profile, rows, liked_ids)))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let ctx = session.page();
    session.render(LikesPage {
        ctx,
        profile,
        messages: MessageView::many(rows, Some(&me), &liked_ids),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_referer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn back_path_keeps_local_paths_only() {
        assert_eq!(back_path(&HeaderMap::new()), "/");
        assert_eq!(back_path(&with_referer("http://localhost:3000/users/abc?x=1")), "/users/abc?x=1");
        assert_eq!(back_path(&with_referer("/messages/new")), "/messages/new");
        assert_eq!(back_path(&with_referer("not a uri")), "/");
        assert_eq!(back_path(&with_referer("//evil.example/x")), "/");
        assert_eq!(back_path(&with_referer("/\\evil.example")), "/");
        assert_eq!(back_path(&with_referer("http://localhost:3000/\\evil.example")), "/");
    }
}
