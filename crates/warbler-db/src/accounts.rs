use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::debug;
use uuid::Uuid;

use crate::models::{NewUser, UserRow};
use crate::{Database, Error, Result};

pub const DEFAULT_IMAGE_URL: &str =
    "https://icon-library.com/images/default-user-icon/default-user-icon-28.jpg";

pub const DEFAULT_HEADER_IMAGE_URL: &str = "https://images.unsplash.com/photo-1519751138087-5bf79df62d5b?ixlib=rb-4.0.3&ixid=MnwxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8&auto=format&fit=crop&w=2070&q=80";

impl Database {
    /// Hash the password and insert a new user.
    ///
    /// A missing password fails with [`Error::MissingPassword`] before the
    /// database is touched. Missing or duplicate username/email are left to
    /// the schema and come back as [`Error::Constraint`].
    pub fn signup(&self, new_user: &NewUser) -> Result<UserRow> {
        let password = new_user
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(Error::MissingPassword)?;

        let password_hash = hash_password(password)?;
        let image_url = new_user
            .image_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_IMAGE_URL);

        let id = Uuid::new_v4().to_string();
        self.create_user(
            &id,
            new_user.username.as_deref(),
            new_user.email.as_deref(),
            &password_hash,
            image_url,
        )?;

        debug!("Signed up user {}", id);
        self.get_user(&id)?
            .ok_or(Error::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Returns the user only when the username exists and the password
    /// matches the stored hash.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRow>> {
        let Some(user) = self.get_user_by_username(username)? else {
            return Ok(None);
        };

        if verify_password(&user.password, password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Hash(e.to_string()))
}

pub fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash).map_err(|e| Error::Hash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    struct Fixture {
        db: Database,
        u1: UserRow,
        u2: UserRow,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let u1 = db.signup(&NewUser::new("u1", "u1@email.com", "password")).unwrap();
        let u2 = db.signup(&NewUser::new("u2", "u2@email.com", "password")).unwrap();
        Fixture { db, u1, u2 }
    }

    #[test]
    fn new_user_has_no_messages_or_followers() {
        let Fixture { db, u1, .. } = setup();

        let u1 = db.get_user(&u1.id).unwrap().unwrap();
        assert!(db.messages_for_user(&u1.id, 100).unwrap().is_empty());
        assert!(db.followers(&u1.id).unwrap().is_empty());
    }

    #[test]
    fn detects_following() {
        let Fixture { db, u1, u2 } = setup();

        db.follow(&u1.id, &u2.id).unwrap();

        assert!(db.is_following(&u1.id, &u2.id).unwrap());
        assert!(db.is_followed_by(&u2.id, &u1.id).unwrap());
        // the edge is directed
        assert!(!db.is_following(&u2.id, &u1.id).unwrap());
        assert!(!db.is_followed_by(&u1.id, &u2.id).unwrap());
    }

    #[test]
    fn detects_not_following() {
        let Fixture { db, u1, u2 } = setup();

        assert!(!db.is_following(&u1.id, &u2.id).unwrap());
        assert!(!db.is_followed_by(&u2.id, &u1.id).unwrap());
    }

    #[test]
    fn valid_signup() {
        let Fixture { db, .. } = setup();
        assert_eq!(db.count_users().unwrap(), 2);

        let u3 = db.signup(&NewUser::new("u3", "u3@email.com", "password")).unwrap();

        assert_eq!(db.count_users().unwrap(), 3);
        assert_eq!(u3.username, "u3");
        assert_eq!(u3.email, "u3@email.com");
        assert_eq!(u3.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(u3.header_image_url, DEFAULT_HEADER_IMAGE_URL);
        assert!(u3.password.starts_with("$argon2id$"));
        assert_ne!(u3.password, "password");
    }

    #[test]
    fn signup_keeps_custom_image() {
        let Fixture { db, .. } = setup();

        let mut new_user = NewUser::new("u3", "u3@email.com", "password");
        new_user.image_url = Some("https://example.com/me.png".into());
        let u3 = db.signup(&new_user).unwrap();

        assert_eq!(u3.image_url, "https://example.com/me.png");
    }

    #[test]
    fn signup_rejects_duplicate_username() {
        let Fixture { db, .. } = setup();

        let err = db.signup(&NewUser::new("u2", "u3@email.com", "password")).unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");
        assert_eq!(db.count_users().unwrap(), 2);
    }

    #[test]
    fn signup_rejects_duplicate_email() {
        let Fixture { db, .. } = setup();

        let err = db.signup(&NewUser::new("u4", "u2@email.com", "password")).unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");
        assert_eq!(db.count_users().unwrap(), 2);
    }

    #[test]
    fn signup_rejects_missing_username() {
        let Fixture { db, .. } = setup();

        let new_user = NewUser {
            username: None,
            ..NewUser::new("", "u5@email.com", "password")
        };
        let err = db.signup(&new_user).unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");
    }

    #[test]
    fn signup_rejects_missing_email() {
        let Fixture { db, .. } = setup();

        let new_user = NewUser {
            email: None,
            ..NewUser::new("u6", "", "password")
        };
        let err = db.signup(&new_user).unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");
    }

    #[test]
    fn signup_without_password_fails_before_insert() {
        let Fixture { db, .. } = setup();

        let new_user = NewUser {
            password: None,
            ..NewUser::new("u5", "u5@email.com", "")
        };
        let err = db.signup(&new_user).unwrap_err();
        assert!(matches!(err, Error::MissingPassword));
        assert_eq!(db.count_users().unwrap(), 2);
    }

    #[test]
    fn authenticate_valid_credentials() {
        let Fixture { db, u1, .. } = setup();

        let user = db.authenticate("u1", "password").unwrap().unwrap();
        assert_eq!(user.id, u1.id);
    }

    #[test]
    fn authenticate_unknown_username() {
        let Fixture { db, .. } = setup();

        assert!(db.authenticate("nobody", "password").unwrap().is_none());
    }

    #[test]
    fn authenticate_wrong_password() {
        let Fixture { db, .. } = setup();

        assert!(db.authenticate("u1", "wrong-password").unwrap().is_none());
    }
}
