use serde::{Deserialize, Deserializer};
use validator::{Validate, ValidationErrors};

/// HTML forms submit untouched inputs as empty strings. Treat those as absent
/// so `required` and the optional URL checks behave like missing fields.
fn empty_as_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(de)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Like [`empty_as_none`], but also strips surrounding whitespace. Used for
/// identifiers, where `" u1 "` must not become a second `u1`.
fn trimmed<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(de)?;
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

// -- Auth --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SignupForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "Username is required."),
        length(max = 30, message = "Username must be at most 30 characters.")
    )]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "E-mail is required."),
        email(message = "Invalid e-mail address.")
    )]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(
        required(message = "Password is required."),
        length(min = 6, message = "Password must be at least 6 characters.")
    )]
    pub password: Option<String>,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(url(message = "Image URL must be a valid URL."))]
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "Username is required."))]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(
        required(message = "Password is required."),
        length(min = 6, message = "Password must be at least 6 characters.")
    )]
    pub password: Option<String>,
}

// -- Profile --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "Username is required."),
        length(max = 30, message = "Username must be at most 30 characters.")
    )]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "E-mail is required."),
        email(message = "Invalid e-mail address.")
    )]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(url(message = "Image URL must be a valid URL."))]
    pub image_url: Option<String>,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(url(message = "Header image URL must be a valid URL."))]
    pub header_image_url: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 500, message = "Bio must be at most 500 characters."))]
    pub bio: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 50, message = "Location must be at most 50 characters."))]
    pub location: Option<String>,

    /// Current password, required to confirm the change.
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(required(message = "Password is required."))]
    pub password: Option<String>,
}

// -- Messages --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct MessageForm {
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(
        required(message = "Text is required."),
        length(max = 140, message = "Warbles are limited to 140 characters.")
    )]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// Flattens validation errors into display strings, sorted so pages render
/// them in a stable order.
pub fn error_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}.", field))
            })
        })
        .collect();
    messages.sort();
    messages
}
