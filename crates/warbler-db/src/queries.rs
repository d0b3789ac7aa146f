use std::collections::HashSet;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use crate::accounts::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL};
use crate::models::{MessageRow, ProfileUpdate, UserRow, UserStats};
use crate::{Database, Result};

const USER_COLUMNS: &str =
    "id, username, email, password, image_url, header_image_url, bio, location, created_at";

const MESSAGE_SELECT: &str = "SELECT m.id, m.text, m.user_id, m.created_at, u.username, u.image_url
     FROM messages m
     JOIN users u ON u.id = m.user_id";

/// Fixed-width UTC timestamps so text order equals time order.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: Option<&str>,
        email: Option<&str>,
        password_hash: &str,
        image_url: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, image_url, header_image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    username,
                    email,
                    password_hash,
                    image_url,
                    DEFAULT_HEADER_IMAGE_URL,
                    now()
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
    }

    /// Case-insensitive substring match on username; everyone when the
    /// search is empty.
    pub fn search_users(&self, search: Option<&str>) -> Result<Vec<UserRow>> {
        let search = search.map(str::trim).unwrap_or_default().to_lowercase();

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE ?1 = '' OR instr(lower(username), ?1) > 0
                 ORDER BY username"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([&search], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Blank image fields fall back to the defaults.
    pub fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<()> {
        let image_url = update.image_url.as_deref().unwrap_or(DEFAULT_IMAGE_URL);
        let header_image_url = update
            .header_image_url
            .as_deref()
            .unwrap_or(DEFAULT_HEADER_IMAGE_URL);

        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users
                 SET username = ?2, email = ?3, image_url = ?4, header_image_url = ?5,
                     bio = ?6, location = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.username,
                    update.email,
                    image_url,
                    header_image_url,
                    update.bio,
                    update.location
                ],
            )?;
            Ok(())
        })
    }

    /// Removes the user together with their messages, likes and follow edges.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn user_stats(&self, id: &str) -> Result<UserStats> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_following_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_being_followed_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [id],
                |r| {
                    Ok(UserStats {
                        messages: r.get(0)?,
                        following: r.get(1)?,
                        followers: r.get(2)?,
                        likes: r.get(3)?,
                    })
                },
            )?)
        })
    }

    // -- Follows --

    /// Adds the edge `follower -> followed`. Following twice is a no-op.
    pub fn follow(&self, follower_id: &str, followed_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO follows (user_being_followed_id, user_following_id)
                 VALUES (?1, ?2)",
                (followed_id, follower_id),
            )?;
            Ok(())
        })
    }

    pub fn unfollow(&self, follower_id: &str, followed_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM follows WHERE user_being_followed_id = ?1 AND user_following_id = ?2",
                (followed_id, follower_id),
            )?;
            Ok(())
        })
    }

    /// Is `user_id` following `other_id`?
    pub fn is_following(&self, user_id: &str, other_id: &str) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, user_id, other_id))
    }

    /// Is `user_id` followed by `other_id`?
    pub fn is_followed_by(&self, user_id: &str, other_id: &str) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, other_id, user_id))
    }

    /// Users that `user_id` follows.
    pub fn following(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                "SELECT u.id, u.username, u.email, u.password, u.image_url, u.header_image_url,
                        u.bio, u.location, u.created_at
                 FROM follows f
                 JOIN users u ON u.id = f.user_being_followed_id
                 WHERE f.user_following_id = ?1
                 ORDER BY u.username",
                user_id,
            )
        })
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                "SELECT u.id, u.username, u.email, u.password, u.image_url, u.header_image_url,
                        u.bio, u.location, u.created_at
                 FROM follows f
                 JOIN users u ON u.id = f.user_following_id
                 WHERE f.user_being_followed_id = ?1
                 ORDER BY u.username",
                user_id,
            )
        })
    }

    pub fn following_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1",
                user_id,
            )
        })
    }

    // -- Messages --

    pub fn create_message(&self, user_id: &str, text: &str) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, text, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, text, user_id, now()],
            )?;
            query_message(conn, &id)?.ok_or(crate::Error::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    /// The user's own messages, newest first.
    pub fn messages_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     WHERE m.user_id = ?1
                     ORDER BY m.created_at DESC, m.rowid DESC
                     LIMIT ?2"
                ),
                user_id,
                limit,
            )
        })
    }

    /// Messages by the user and everyone they follow, newest first.
    pub fn timeline(&self, user_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     WHERE m.user_id = ?1
                        OR m.user_id IN (
                            SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1
                        )
                     ORDER BY m.created_at DESC, m.rowid DESC
                     LIMIT ?2"
                ),
                user_id,
                limit,
            )
        })
    }

    // -- Likes --

    /// Toggle a like: removes if it exists, inserts if not.
    /// Returns true when the message is liked afterwards.
    pub fn toggle_like(&self, user_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
                (user_id, message_id),
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
                    (user_id, message_id),
                )?;
            }

            tx.commit()?;
            Ok(removed == 0)
        })
    }

    pub fn liked_message_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            query_ids(conn, "SELECT message_id FROM likes WHERE user_id = ?1", user_id)
        })
    }

    pub fn liked_messages(&self, user_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     JOIN likes l ON l.message_id = m.id
                     WHERE l.user_id = ?1
                     ORDER BY m.created_at DESC, m.rowid DESC
                     LIMIT ?2"
                ),
                user_id,
                limit,
            )
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        image_url: row.get(4)?,
        header_image_url: row.get(5)?,
        bio: row.get(6)?,
        location: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        user_id: row.get(2)?,
        created_at: row.get(3)?,
        author_username: row.get(4)?,
        author_image_url: row.get(5)?,
    })
}

/// `column` is always one of our own literals, never user input.
fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], user_from_row).optional()
}

fn query_users(conn: &Connection, sql: &str, user_id: &str) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([user_id], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_ids(conn: &Connection, sql: &str, user_id: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(ids)
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], message_from_row).optional()
}

fn query_messages(conn: &Connection, sql: &str, user_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params![user_id, limit], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn follow_exists(conn: &Connection, follower_id: &str, followed_id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM follows WHERE user_following_id = ?1 AND user_being_followed_id = ?2
        )",
        (follower_id, followed_id),
        |r| r.get(0),
    )?)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    fn setup() -> (Database, UserRow, UserRow) {
        let db = Database::open_in_memory().unwrap();
        let u1 = db.signup(&NewUser::new("u1", "u1@email.com", "password")).unwrap();
        let u2 = db.signup(&NewUser::new("u2", "u2@email.com", "password")).unwrap();
        (db, u1, u2)
    }

    #[test]
    fn follow_is_idempotent_and_reversible() {
        let (db, u1, u2) = setup();

        db.follow(&u1.id, &u2.id).unwrap();
        db.follow(&u1.id, &u2.id).unwrap();
        assert_eq!(db.following(&u1.id).unwrap().len(), 1);
        assert_eq!(db.followers(&u2.id).unwrap()[0].id, u1.id);
        assert!(db.following_ids(&u1.id).unwrap().contains(&u2.id));

        db.unfollow(&u1.id, &u2.id).unwrap();
        assert!(!db.is_following(&u1.id, &u2.id).unwrap());
        assert!(db.followers(&u2.id).unwrap().is_empty());
    }

    #[test]
    fn timeline_includes_followed_users_newest_first() {
        let (db, u1, u2) = setup();
        let u3 = db.signup(&NewUser::new("u3", "u3@email.com", "password")).unwrap();

        db.create_message(&u1.id, "first from u1").unwrap();
        db.create_message(&u2.id, "from u2").unwrap();
        db.create_message(&u3.id, "from u3").unwrap();
        db.create_message(&u1.id, "second from u1").unwrap();

        db.follow(&u1.id, &u2.id).unwrap();

        let texts: Vec<String> = db
            .timeline(&u1.id, 100)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["second from u1", "from u2", "first from u1"]);

        let own = db.messages_for_user(&u1.id, 1).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].text, "second from u1");
        assert_eq!(own[0].author_username, "u1");
        assert!(own[0].timestamp().is_some());
    }

    #[test]
    fn message_text_is_limited() {
        let (db, u1, _) = setup();

        let err = db.create_message(&u1.id, &"a".repeat(141)).unwrap_err();
        assert!(err.is_constraint());
    }

    #[test]
    fn toggle_like_flips_state() {
        let (db, u1, u2) = setup();
        let msg = db.create_message(&u2.id, "like me").unwrap();

        assert!(db.toggle_like(&u1.id, &msg.id).unwrap());
        assert!(db.liked_message_ids(&u1.id).unwrap().contains(&msg.id));
        assert_eq!(db.liked_messages(&u1.id, 100).unwrap()[0].id, msg.id);

        assert!(!db.toggle_like(&u1.id, &msg.id).unwrap());
        assert!(db.liked_message_ids(&u1.id).unwrap().is_empty());
    }

    #[test]
    fn search_matches_substring() {
        let (db, _, _) = setup();
        db.signup(&NewUser::new("alice", "alice@email.com", "password")).unwrap();

        let found = db.search_users(Some("LIC")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "alice");

        assert_eq!(db.search_users(None).unwrap().len(), 3);
        assert_eq!(db.search_users(Some("  ")).unwrap().len(), 3);
    }

    #[test]
    fn update_profile_enforces_uniqueness() {
        let (db, u1, _) = setup();

        let update = ProfileUpdate {
            username: "u1-renamed".into(),
            email: "new@email.com".into(),
            bio: Some("hello".into()),
            ..Default::default()
        };
        db.update_profile(&u1.id, &update).unwrap();

        let u1_after = db.get_user(&u1.id).unwrap().unwrap();
        assert_eq!(u1_after.username, "u1-renamed");
        assert_eq!(u1_after.bio.as_deref(), Some("hello"));
        assert_eq!(u1_after.image_url, DEFAULT_IMAGE_URL);

        let clash = ProfileUpdate {
            username: "u2".into(),
            email: "new@email.com".into(),
            ..Default::default()
        };
        assert!(db.update_profile(&u1.id, &clash).unwrap_err().is_constraint());
    }

    #[test]
    fn delete_user_cascades() {
        let (db, u1, u2) = setup();
        let msg = db.create_message(&u1.id, "bye").unwrap();
        let other = db.create_message(&u2.id, "stay").unwrap();
        db.follow(&u2.id, &u1.id).unwrap();
        db.follow(&u1.id, &u2.id).unwrap();
        db.toggle_like(&u1.id, &other.id).unwrap();
        db.toggle_like(&u2.id, &msg.id).unwrap();

        assert!(db.delete_user(&u1.id).unwrap());

        assert!(db.get_user(&u1.id).unwrap().is_none());
        assert!(db.get_message(&msg.id).unwrap().is_none());
        assert!(db.following(&u2.id).unwrap().is_empty());
        assert!(db.followers(&u2.id).unwrap().is_empty());
        assert!(db.liked_message_ids(&u2.id).unwrap().is_empty());
        assert_eq!(db.user_stats(&u2.id).unwrap(), UserStats { messages: 1, ..Default::default() });
    }
}
