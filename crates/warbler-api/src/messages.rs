use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Response,
};
use tracing::{info, warn};
use validator::Validate;

use warbler_types::forms::{MessageForm, error_messages};
use warbler_types::session::Flash;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::pages::{HomeAnonPage, HomePage, MessagePage, MessageView, NewMessagePage};
use crate::session::{CurrentUser, Session};
use crate::{PAGE_LIMIT, parse_id, with_db};

/// GET /: the timeline of followed users for members, a sign-up pitch for
/// everyone else.
pub async fn homepage(State(state): State<AppState>, mut session: Session) -> Result<Response, ApiError> {
    let Some(me) = session.user().cloned() else {
        let ctx = session.page();
        return session.render(HomeAnonPage { ctx });
    };

    let me_id = me.id.clone();
    let (rows, liked_ids, stats) = with_db(&state, move |db| {
        let rows = db.timeline(&me_id, PAGE_LIMIT)?;
        let liked_ids = db.liked_message_ids(&me_id)?;
        let stats = db.user_stats(&me_id)?;
        Ok((rows, liked_ids, stats))
    })
    .await?;

    let ctx = session.page();
    let messages = MessageView::many(rows, Some(&me), &liked_ids);
    session.render(HomePage {
        ctx,
        me,
        stats,
        messages,
    })
}

/// GET /messages/new
pub async fn new_message_form(mut session: Session) -> Result<Response, ApiError> {
    let ctx = session.page();
    session.render(NewMessagePage {
        ctx,
        errors: vec![],
        text: String::new(),
    })
}

/// POST /messages/new
pub async fn add_message(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    mut session: Session,
    Form(form): Form<MessageForm>,
) -> Result<Response, ApiError> {
    match (form.validate(), form.text.clone()) {
        (Ok(()), Some(text)) => {
            let user_id = me.id.clone();
            let message = with_db(&state, move |db| db.create_message(&user_id, &text)).await?;
            info!("Message {} posted by {}", message.id, me.username);
            Ok(session.redirect(&format!("/users/{}", me.id)))
        }
        (result, _) => {
            let errors = result.err().map(|e| error_messages(&e)).unwrap_or_default();
            let ctx = session.page();
            session.render(NewMessagePage {
                ctx,
                errors,
                text: form.text.unwrap_or_default(),
            })
        }
    }
}

/// GET /messages/{message_id}
pub async fn show_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    mut session: Session,
) -> Result<Response, ApiError> {
    let message_id = parse_id(&message_id)?;

    let me_id = me.id.clone();
    let (row, liked_ids) = with_db(&state, move |db| {
        let Some(row) = db.get_message(&message_id)? else {
            return Ok(None);
        };
        let liked_ids: HashSet<String> = db.liked_message_ids(&me_id)?;
        Ok(Some((row, liked_ids)))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let ctx = session.page();
    session.render(MessagePage {
        ctx,
        message: MessageView::new(row, Some(&me), &liked_ids),
    })
}

/// POST /messages/{message_id}/delete: authors only.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    session: Session,
) -> Result<Response, ApiError> {
    let message_id = parse_id(&message_id)?;

    let id = message_id.clone();
    let row = with_db(&state, move |db| db.get_message(&id))
        .await?
        .ok_or(ApiError::NotFound)?;

    if row.user_id != me.id {
        warn!("{} tried to delete message {} they do not own", me.username, row.id);
        return Ok(session
            .flash(Flash::danger("Access unauthorized."))
            .redirect("/"));
    }

    with_db(&state, move |db| db.delete_message(&message_id)).await?;
    Ok(session.redirect(&format!("/users/{}", me.id)))
}
