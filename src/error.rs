use actix_web::{HttpResponse, ResponseError};
use reqwest::StatusCode;
use serde_json::json;

use crate::pipeline::PipelineError;
use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum EtaError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Error response: {0} {1}")]
    Response(u16, String),
}

impl ResponseError for EtaError {
    fn error_response(&self) -> actix_web::HttpResponse<actix_web::body::BoxBody> {
        match self {
            EtaError::Response(_, message) => {
                HttpResponse::build(self.status_code()).json(json!({ "error": message }))
            }
            other => {
                log::error!("{}", other);
                actix_web::HttpResponse::InternalServerError().finish()
            }
        }
    }

    fn status_code(&self) -> reqwest::StatusCode {
        match self {
            EtaError::Response(status, _) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EtaError> for std::io::Error {
    fn from(e: EtaError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

pub type EtaResult<T> = Result<T, EtaError>;
