use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Unauthenticated,
    InvalidCredentials,
    Forbidden,
    NotFound(&'static str),
    Internal,
}

impl ApiError {
    fn status(&self) -> Status {
        match self {
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Unauthenticated => Status::Unauthorized,
            ApiError::InvalidCredentials => Status::Unauthorized,
            ApiError::Forbidden => Status::Forbidden,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Internal => Status::InternalServerError,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => (*message).to_string(),
            ApiError::Unauthenticated => "Authentication required".to_string(),
            ApiError::InvalidCredentials => "Invalid credentials".to_string(),
            ApiError::Forbidden => "Forbidden".to_string(),
            ApiError::NotFound(message) => (*message).to_string(),
            ApiError::Internal => "Server error".to_string(),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let mut response = Json(ErrorBody {
            error: self.message(),
        })
        .respond_to(request)?;
        response.set_status(status);
        Ok(response)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        log::error!("database error: {err}");
        ApiError::Internal
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(err: r2d2::Error) -> Self {
        log::error!("connection pool error: {err}");
        ApiError::Internal
    }
}
