//! Success envelope shared by every endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::Page;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

/// `{"status": "success", "message"?, "results"?, "pagination"?, "data"}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    #[serde(skip)]
    code: StatusCode,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<Pagination>,
    data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            code: StatusCode::OK,
            status: "success",
            message: None,
            results: None,
            pagination: None,
            data,
        }
    }

    pub fn created(data: T) -> Self {
        Self::new(data).with_code(StatusCode::CREATED)
    }

    pub fn with_code(mut self, code: StatusCode) -> Self {
        self.code = code;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn results(mut self, results: usize) -> Self {
        self.results = Some(results);
        self
    }
}

impl<T> Envelope<Vec<T>> {
    pub fn page(page: Page<T>) -> Self {
        let pagination = Pagination {
            total: page.total,
            page: page.page,
            limit: page.limit,
        };
        let mut envelope = Self::new(page.data);
        envelope.results = Some(envelope.data.len());
        envelope.pagination = Some(pagination);
        envelope
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

/// Message-only success body, e.g. for flows that return no resource.
pub fn message(text: impl Into<String>) -> Envelope<Option<()>> {
    Envelope::new(None).message(text)
}
