use actix_web::{HttpResponse, ResponseError};

use crate::repo::RepoError;

const NOT_FOUND_HTML: &str = "<!DOCTYPE html>\n<html><head><title>Not Found</title></head>\
<body><h1>404 Not Found</h1><p><a href=\"/blog/\">Back to the blog</a></p></body></html>";

const INTERNAL_HTML: &str = "<!DOCTYPE html>\n<html><head><title>Server Error</title></head>\
<body><h1>500 Internal Server Error</h1></body></html>";

#[derive(thiserror::Error, Debug)]
pub enum PageError {
    #[error("not found")] NotFound,
    #[error("internal error")] Internal,
}

impl From<RepoError> for PageError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => PageError::NotFound,
            RepoError::Conflict => PageError::Internal,
            RepoError::Internal(msg) => {
                log::error!("repository error: {msg}");
                PageError::Internal
            }
        }
    }
}

impl ResponseError for PageError {
    fn error_response(&self) -> HttpResponse {
        match self {
            PageError::NotFound => HttpResponse::NotFound()
                .content_type("text/html; charset=utf-8")
                .body(NOT_FOUND_HTML),
            PageError::Internal => HttpResponse::InternalServerError()
                .content_type("text/html; charset=utf-8")
                .body(INTERNAL_HTML),
        }
    }
}
