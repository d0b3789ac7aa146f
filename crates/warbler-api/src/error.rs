use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::pages::NotFoundPage;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("corrupt user id '{0}'")]
    CorruptId(String),

    #[error(transparent)]
    Db(#[from] warbler_db::Error),

    #[error("spawn_blocking join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),

    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => match NotFoundPage.render() {
                Ok(body) => (StatusCode::NOT_FOUND, Html(body)).into_response(),
                Err(e) => {
                    error!("Failed to render 404 page: {}", e);
                    StatusCode::NOT_FOUND.into_response()
                }
            },
            other => {
                error!("{}", other);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
