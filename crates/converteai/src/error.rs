use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use converteai_core::files::UploadRejection;
use pdf::PdfError;

use crate::convert::ConversionError;
use crate::server::state::Limiter;
use crate::store::StoreError;

const PROCESSING_FAILED: &str = "Erro interno no servidor durante o processamento do arquivo.";

/// Errors surfaced to HTTP clients as `{ success: false, message, timestamp }`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),

    #[error("Nenhum arquivo foi enviado")]
    MissingFile,

    #[error("Invalid upload: {0}")]
    Multipart(String),

    #[error("Invalid formatting options: {0}")]
    InvalidOptions(String),

    #[error("Nome de arquivo inválido")]
    InvalidFilename,

    #[error("Arquivo não encontrado. O arquivo pode ter expirado.")]
    NotFound,

    #[error("Recurso inválido")]
    NotAFile,

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("File store error: {0}")]
    Io(#[from] io::Error),

    #[error("{}", .limiter.message())]
    RateLimited { limiter: Limiter, retry_after: u64 },

    #[error("IP address temporarily blocked due to suspicious activity.")]
    Blocked { retry_after: u64 },
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Error::NotFound,
            StoreError::NotAFile(_) => Error::NotAFile,
            StoreError::Io(e) => Error::Io(e),
        }
    }
}

fn io_status(e: &io::Error) -> (StatusCode, &'static str) {
    if e.kind() == io::ErrorKind::StorageFull {
        return (
            StatusCode::INSUFFICIENT_STORAGE,
            "Espaço insuficiente no servidor. Tente novamente mais tarde.",
        );
    }
    // EMFILE / ENFILE
    if matches!(e.raw_os_error(), Some(23) | Some(24)) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Servidor temporariamente sobrecarregado. Tente novamente em alguns minutos.",
        );
    }
    (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED)
}

fn conversion_status(e: &ConversionError) -> (StatusCode, &'static str) {
    match e {
        ConversionError::Extract(PdfError::Parse(_)) => (
            StatusCode::BAD_REQUEST,
            "O arquivo PDF parece estar corrompido ou inválido.",
        ),
        ConversionError::Extract(PdfError::Encrypted) => (
            StatusCode::BAD_REQUEST,
            "PDFs protegidos por senha não são suportados.",
        ),
        ConversionError::Extract(PdfError::NoText) | ConversionError::EmptyInput => (
            StatusCode::BAD_REQUEST,
            "Este PDF não contém texto legível. Pode ser um documento escaneado ou baseado em imagens.",
        ),
        ConversionError::Extract(PdfError::Io(e)) | ConversionError::Io(e) => io_status(e),
        ConversionError::Serialization(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Erro ao criar o documento Word.",
        ),
        ConversionError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED),
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Rejected(_)
            | Error::MissingFile
            | Error::Multipart(_)
            | Error::InvalidOptions(_)
            | Error::InvalidFilename
            | Error::NotAFile => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Conversion(e) => conversion_status(e).0,
            Error::Io(e) => io_status(e).0,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Blocked { .. } => StatusCode::FORBIDDEN,
        }
    }

    /// Message shown to the client. Internal details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            Error::Conversion(e) => conversion_status(e).1.to_string(),
            Error::Io(e) => io_status(e).1.to_string(),
            other => other.to_string(),
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimited { retry_after, .. } | Error::Blocked { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{status}: {self}");
        }

        let mut body = serde_json::json!({
            "success": false,
            "message": self.message(),
            "timestamp": timestamp(),
        });
        if let Some(retry_after) = self.retry_after() {
            body["retryAfter"] = retry_after.into();
        }

        (status, Json(body)).into_response()
    }
}
