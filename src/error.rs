use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    #[error("Manifest not found in archive")]
    ManifestMissing,

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Package already exists: {id} {version}")]
    AlreadyExists { id: String, version: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Upload conflicts map to 409; every other upload failure is a 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::AlreadyExists { .. } => StatusCode::CONFLICT,
            Error::MalformedArchive(_)
            | Error::ManifestMissing
            | Error::InvalidManifest(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.to_string()
        });

        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_distinguishable() {
        let err = Error::AlreadyExists {
            id: "demo".into(),
            version: "1.0.0".into(),
        };
        assert!(err.to_string().contains("already exists"));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            Error::ManifestMissing.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_body() {
        let response = Error::NotFound("demo 1.0.0".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
