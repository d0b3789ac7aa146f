//! Askama page templates and the view models they render.

use std::collections::HashSet;

use askama::Template;

use warbler_db::models::{MessageRow, UserRow, UserStats};
use warbler_types::session::Flash;

/// Data every page layout needs.
#[derive(Debug, Default)]
pub struct PageContext {
    pub user: Option<UserRow>,
    pub flashes: Vec<Flash>,
}

#[derive(Debug)]
pub struct MessageView {
    pub row: MessageRow,
    pub liked: bool,
    /// Logged-in viewers may like anyone's messages but their own.
    pub can_like: bool,
    pub can_delete: bool,
}

impl MessageView {
    pub fn new(row: MessageRow, viewer: Option<&UserRow>, liked_ids: &HashSet<String>) -> Self {
        let own = viewer.is_some_and(|v| v.id == row.user_id);
        Self {
            liked: liked_ids.contains(&row.id),
            can_like: viewer.is_some() && !own,
            can_delete: own,
            row,
        }
    }

    pub fn many(rows: Vec<MessageRow>, viewer: Option<&UserRow>, liked_ids: &HashSet<String>) -> Vec<Self> {
        rows.into_iter()
            .map(|row| Self::new(row, viewer, liked_ids))
            .collect()
    }
}

#[derive(Debug)]
pub struct UserCard {
    pub user: UserRow,
    pub followed: bool,
    pub is_self: bool,
}

impl UserCard {
    pub fn many(users: Vec<UserRow>, viewer: &UserRow, following_ids: &HashSet<String>) -> Vec<Self> {
        users
            .into_iter()
            .map(|user| Self {
                followed: following_ids.contains(&user.id),
                is_self: user.id == viewer.id,
                user,
            })
            .collect()
    }
}

/// Header shown on every page about one user.
#[derive(Debug)]
pub struct ProfileView {
    pub user: UserRow,
    pub stats: UserStats,
    pub is_self: bool,
    pub followed: bool,
}

// -- Home --

#[derive(Template)]
#[template(path = "home_anon.html")]
pub struct HomeAnonPage {
    pub ctx: PageContext,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomePage {
    pub ctx: PageContext,
    pub me: UserRow,
    pub stats: UserStats,
    pub messages: Vec<MessageView>,
}

// -- Auth --

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupPage {
    pub ctx: PageContext,
    pub errors: Vec<String>,
    pub username: String,
    pub email: String,
    pub image_url: String,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub ctx: PageContext,
    pub errors: Vec<String>,
    pub username: String,
}

// -- Users --

#[derive(Template)]
#[template(path = "users/index.html")]
pub struct UsersPage {
    pub ctx: PageContext,
    pub search: String,
    pub users: Vec<UserCard>,
}

#[derive(Template)]
#[template(path = "users/show.html")]
pub struct ProfilePage {
    pub ctx: PageContext,
    pub profile: ProfileView,
    pub messages: Vec<MessageView>,
}

/// Following and followers share one layout.
#[derive(Template)]
#[template(path = "users/connections.html")]
pub struct ConnectionsPage {
    pub ctx: PageContext,
    pub heading: &'static str,
    pub profile: ProfileView,
    pub users: Vec<UserCard>,
}

#[derive(Template)]
#[template(path = "users/likes.html")]
pub struct LikesPage {
    pub ctx: PageContext,
    pub profile: ProfileView,
    pub messages: Vec<MessageView>,
}

#[derive(Template)]
#[template(path = "users/edit.html")]
pub struct EditProfilePage {
    pub ctx: PageContext,
    pub errors: Vec<String>,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: String,
    pub location: String,
}

// -- Messages --

#[derive(Template)]
#[template(path = "messages/new.html")]
pub struct NewMessagePage {
    pub ctx: PageContext,
    pub errors: Vec<String>,
    pub text: String,
}

#[derive(Template)]
#[template(path = "messages/show.html")]
pub struct MessagePage {
    pub ctx: PageContext,
    pub message: MessageView,
}

#[derive(Template)]
#[template(path = "404.html")]
pub struct NotFoundPage;
