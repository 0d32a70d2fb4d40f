//! HTTP error responses for the web adapter.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::domain::error::StockportError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
    /// Wrap the error fragment in the page layout.
    pub full_page: bool,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            full_page: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }
}

pub fn status_from_error(err: &StockportError) -> StatusCode {
    match err {
        StockportError::ConfigMissing { .. }
        | StockportError::ConfigInvalid { .. }
        | StockportError::ConfigParse { .. }
        | StockportError::Validation { .. } => StatusCode::BAD_REQUEST,
        StockportError::UnknownTicker { .. } => StatusCode::NOT_FOUND,
        StockportError::NoData { .. } | StockportError::InsufficientData { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StockportError::Database { .. }
        | StockportError::DatabaseQuery { .. }
        | StockportError::Model { .. }
        | StockportError::Source { .. }
        | StockportError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StockportError> for WebError {
    fn from(err: StockportError) -> Self {
        Self::new(status_from_error(&err), err.to_string())
    }
}

impl From<askama::Error> for WebError {
    fn from(err: askama::Error) -> Self {
        Self::internal(format!("template error: {err}"))
    }
}

impl From<tower_sessions::session::Error> for WebError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::internal(format!("session error: {err}"))
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub message: &'a str,
    pub status: u16,
}

#[derive(Template)]
#[template(path = "error_page.html")]
struct ErrorPage<'a> {
    content: &'a str,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{} {}", self.status, self.message);
        } else {
            log::debug!("{} {}", self.status, self.message);
        }
        let template = ErrorTemplate {
            message: &self.message,
            status: self.status.as_u16(),
        };
        let content = match template.render() {
            Ok(html) => html,
            Err(_) => return (self.status, self.message).into_response(),
        };
        if !self.full_page {
            return (self.status, Html(content)).into_response();
        }
        match (ErrorPage { content: &content }).render() {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(_) => (self.status, Html(content)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status() {
        let cases = [
            (StockportError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                StockportError::UnknownTicker { symbol: "ZZZ".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                StockportError::NoData { symbol: "AAPL".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                StockportError::Database { reason: "locked".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(WebError::from(err).status, status);
        }
    }

    #[test]
    fn fragment_and_full_page_rendering() {
        let fragment = WebError::bad_request("nope").into_response();
        assert_eq!(fragment.status(), StatusCode::BAD_REQUEST);

        let page = WebError::not_found("missing").page(true).into_response();
        assert_eq!(page.status(), StatusCode::NOT_FOUND);
    }
}
