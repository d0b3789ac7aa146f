use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::Response,
};
use tracing::{info, warn};
use validator::Validate;

use warbler_db::Database;
use warbler_db::models::{ProfileUpdate, UserRow};
use warbler_types::forms::{ProfileForm, SearchQuery, error_messages};
use warbler_types::session::Flash;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::pages::{
    ConnectionsPage, EditProfilePage, MessageView, ProfilePage, ProfileView, UserCard, UsersPage,
};
use crate::session::{CurrentUser, Session};
use crate::{PAGE_LIMIT, parse_id, with_db};

/// Profile header for `user_id` as seen by `viewer`.
pub(crate) fn profile_view(
    db: &Database,
    user_id: &str,
    viewer: &UserRow,
) -> warbler_db::Result<Option<ProfileView>> {
    let Some(user) = db.get_user(user_id)? else {
        return Ok(None);
    };

    Ok(Some(ProfileView {
        stats: db.user_stats(&user.id)?,
        is_self: user.id == viewer.id,
        followed: db.is_following(&viewer.id, &user.id)?,
        user,
    }))
}

/// GET /users?q=: search by username.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    mut session: Session,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    let search = query.q.unwrap_or_default();

    let q = search.clone();
    let me_id = me.id.clone();
    let (users, following_ids) = with_db(&state, move |db| {
        let users = db.search_users(Some(&q))?;
        let following_ids = db.following_ids(&me_id)?;
        Ok((users, following_ids))
    })
    .await?;

    let ctx = session.page();
    session.render(UsersPage {
        ctx,
        search,
        users: UserCard::many(users, &me, &following_ids),
    })
}

/// GET /users/{user_id}: profile with the user's messages.
pub async fn show_user(
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
        let rows = db.messages_for_user(&user_id, PAGE_LIMIT)?;
        let liked_ids = db.liked_message_ids(&viewer.id)?;
        Ok(Some((profile, rows, liked_ids)))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let ctx = session.page();
    session.render(ProfilePage {
        ctx,
        profile,
        messages: MessageView::many(rows, Some(&me), &liked_ids),
    })
}

pub async fn show_following(
    state: State<AppState>,
    user_id: Path<String>,
    current: Extension<CurrentUser>,
    session: Session,
) -> Result<Response, ApiError> {
    show_connections(state, user_id, current, session, Connections::Following).await
}

pub async fn show_followers(
    state: State<AppState>,
    user_id: Path<String>,
    current: Extension<CurrentUser>,
    session: Session,
) -> Result<Response, ApiError> {
    show_connections(state, user_id, current, session, Connections::Followers).await
}

#[derive(Clone, Copy)]
enum Connections {
    Following,
    Followers,
}

async fn show_connections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    mut session: Session,
    kind: Connections,
) -> Result<Response, ApiError> {
    let user_id = parse_id(&user_id)?;

    let viewer = me.clone();
    let (profile, users, following_ids) = with_db(&state, move |db| {
        let Some(profile) = profile_view(db, &user_id, &viewer)? else {
            return Ok(None);
        };
        let users = match kind {
            Connections::Following => db.following(&user_id)?,
            Connections::Followers => db.followers(&user_id)?,
        };
        let following_ids = db.following_ids(&viewer.id)?;
        Ok(Some((profile, users, following_ids)))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let heading = match kind {
        Connections::Following => "Following",
        Connections::Followers => "Followers",
    };

    let ctx = session.page();
    session.render(ConnectionsPage {
        ctx,
        heading,
        profile,
        users: UserCard::many(users, &me, &following_ids),
    })
}

/// POST /users/follow/{user_id}
pub async fn start_following(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    session: Session,
) -> Result<Response, ApiError> {
    let followed_id = parse_id(&user_id)?;
    let following_page = format!("/users/{}/following", me.id);

    if followed_id == me.id {
        return Ok(session
            .flash(Flash::danger("You can't follow yourself."))
            .redirect(&following_page));
    }

    let follower_id = me.id.clone();
    let followed = with_db(&state, move |db| {
        if db.get_user(&followed_id)?.is_none() {
            return Ok(false);
        }
        db.follow(&follower_id, &followed_id)?;
        Ok(true)
    })
    .await?;

    if !followed {
        return Err(ApiError::NotFound);
    }
    Ok(session.redirect(&following_page))
}

/// POST /users/stop-following/{user_id}
pub async fn stop_following(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    session: Session,
) -> Result<Response, ApiError> {
    let followed_id = parse_id(&user_id)?;

    let follower_id = me.id.clone();
    with_db(&state, move |db| db.unfollow(&follower_id, &followed_id)).await?;

    Ok(session.redirect(&format!("/users/{}/following", me.id)))
}

/// GET /users/profile
pub async fn edit_profile_form(
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    mut session: Session,
) -> Result<Response, ApiError> {
    let ctx = session.page();
    session.render(EditProfilePage {
        ctx,
        errors: vec![],
        username: me.username,
        email: me.email,
        image_url: me.image_url,
        header_image_url: me.header_image_url,
        bio: me.bio.unwrap_or_default(),
        location: me.location.unwrap_or_default(),
    })
}

/// POST /users/profile: the current password must confirm the change.
pub async fn edit_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    mut session: Session,
    Form(form): Form<ProfileForm>,
) -> Result<Response, ApiError> {
    let errors = match form.validate() {
        Ok(()) => {
            let username = me.username.clone();
            let password = form.password.clone().unwrap_or_default();
            let confirmed = with_db(&state, move |db| db.authenticate(&username, &password)).await?;

            if confirmed.is_none() {
                warn!("Profile edit for {} rejected: wrong password", me.username);
                return Ok(session
                    .flash(Flash::danger("Wrong password, please try again."))
                    .redirect("/"));
            }

            let update = ProfileUpdate {
                username: form.username.clone().unwrap_or_default(),
                email: form.email.clone().unwrap_or_default(),
                image_url: form.image_url.clone(),
                header_image_url: form.header_image_url.clone(),
                bio: form.bio.clone(),
                location: form.location.clone(),
            };
            let id = me.id.clone();
            match with_db(&state, move |db| db.update_profile(&id, &update)).await {
                Ok(()) => {
                    info!("Profile updated: {}", me.id);
                    return Ok(session
                        .flash(Flash::success("Profile updated."))
                        .redirect(&format!("/users/{}", me.id)));
                }
                Err(ApiError::Db(e)) if e.is_constraint() => {
                    vec!["Username or email already taken.".to_string()]
                }
                Err(e) => return Err(e),
            }
        }
        Err(errors) => error_messages(&errors),
    };

    let ctx = session.page();
    session.render(EditProfilePage {
        ctx,
        errors,
        username: form.username.unwrap_or_default(),
        email: form.email.unwrap_or_default(),
        image_url: form.image_url.unwrap_or_default(),
        header_image_url: form.header_image_url.unwrap_or_default(),
        bio: form.bio.unwrap_or_default(),
        location: form.location.unwrap_or_default(),
    })
}

/// POST /users/delete: removes the account and everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    session: Session,
) -> Result<Response, ApiError> {
    let id = me.id.clone();
    with_db(&state, move |db| db.delete_user(&id)).await?;
    info!("User deleted: {}", me.username);

    Ok(session
        .logout()
        .flash(Flash::info("Your account has been deleted."))
        .redirect("/signup"))
}
