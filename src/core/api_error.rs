//! JSON error envelope shared by every router
//!
//! All failures leave the server as `{status_code, message, url}`.

use axum::{
    Json,
    extract::{FromRequest, OriginalUri, Request, rejection::JsonRejection},
    http::{StatusCode, Uri, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

/// An error that knows which HTTP status it surfaces as
pub trait ApiError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    /// Message shown to the client. Server-side failures should not leak
    /// their internals here.
    fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status_code: u16,
    pub message: String,
    pub url: String,
}

impl ErrorResponse {
    pub fn new<E: ApiError + ?Sized>(err: &E, url: &Uri) -> Self {
        let status = err.status_code();

        if status.is_server_error() {
            tracing::error!(url = %url, error = %err, "Request failed");
        } else {
            tracing::warn!(url = %url, status = status.as_u16(), error = %err, "Request rejected");
        }

        Self::with_status(status, err.public_message(), url)
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>, url: &Uri) -> Self {
        Self {
            status_code: status.as_u16(),
            message: message.into(),
            url: url.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Attach the request URL to a typed error
pub trait ResultExt<T> {
    fn at(self, url: &Uri) -> Result<T, ErrorResponse>;
}

impl<T, E: ApiError> ResultExt<T> for Result<T, E> {
    fn at(self, url: &Uri) -> Result<T, ErrorResponse> {
        self.map_err(|err| ErrorResponse::new(&err, url))
    }
}

/// URL the client actually requested, before any nesting stripped it
pub fn request_url(parts: &Parts) -> Uri {
    parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| parts.uri.clone())
}

/// `Json` whose rejections use the error envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let url = request_url(&parts);

        match Json::<T>::from_request(Request::from_parts(parts, body), state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection, &url)),
        }
    }
}

fn json_rejection(rejection: JsonRejection, url: &Uri) -> ErrorResponse {
    tracing::warn!(url = %url, error = %rejection, "Malformed request body");

    ErrorResponse::with_status(StatusCode::BAD_REQUEST, rejection.body_text(), url)
}
