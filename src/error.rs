use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::{import::CsvError, notify::NotifyError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invitation not found")]
    NotFound,

    #[error("Invitation token already in use")]
    DuplicateIdentifier,

    #[error(transparent)]
    Seaorm(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Csv(Box<CsvError>),
}

impl From<CsvError> for AppError {
    fn from(err: CsvError) -> Self {
        match err {
            CsvError::Store(err) => err,
            CsvError::Seaorm(err) => AppError::Seaorm(err),
            err => AppError::Csv(Box::new(err)),
        }
    }
}

const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Page introuvable</title>
</head>
<body>
    <h1>Page introuvable</h1>
    <p>Ce lien d'invitation n'existe pas. Vérifiez l'adresse reçue par email.</p>
</body>
</html>"#;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
            err => {
                tracing::error!("Request failed: {err:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.").into_response()
            }
        }
    }
}
