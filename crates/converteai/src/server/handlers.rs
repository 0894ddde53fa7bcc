use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use converteai_core::{docx, files, FormattingOptions};
use serde_json::{json, Value};

use super::state::ApiState;
use crate::convert;
use crate::error::timestamp;
use crate::prelude::Error;
use crate::store;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": timestamp(),
        "uptime": state.started.elapsed().as_secs_f64(),
        "environment": state.config.environment,
        "version": VERSION,
    }))
}

pub async fn api_health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": timestamp(),
        "uptime": format!("{} minutes", state.started.elapsed().as_secs() / 60),
        "directories": state.store.dir_status(),
        "environment": state.config.environment,
        "version": VERSION,
    }))
}

pub async fn stats(State(state): State<ApiState>) -> Json<Value> {
    let average = state
        .stats
        .average_processing_ms()
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "N/A".to_string());

    Json(json!({
        "success": true,
        "data": {
            "totalConversions": state.stats.conversions(),
            "failedConversions": state.stats.failures(),
            "totalDownloads": state.stats.downloads(),
            "averageProcessingTime": average,
            "popularFileTypes": ["PDF"],
            "serverStats": {
                "uptime": state.started.elapsed().as_secs_f64(),
                "version": VERSION,
            },
        },
        "timestamp": timestamp(),
    }))
}

pub async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Route not found",
            "message": format!("The route {} does not exist.", uri.path()),
        })),
    )
        .into_response()
}

struct Upload {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
    options: FormattingOptions,
}

/// Pull the `file` part and the optional JSON `options` part out of the form.
async fn read_upload(mut multipart: Multipart, max_size: u64) -> Result<Upload, Error> {
    let mut file = None;
    let mut options = FormattingOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Multipart(e.body_text()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        Error::Rejected(files::UploadRejection::TooLarge { max: max_size })
                    } else {
                        Error::Multipart(e.body_text())
                    }
                })?;
                file = Some((name, content_type, bytes.to_vec()));
            }
            Some("options") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::Multipart(e.body_text()))?;
                options = serde_json::from_str(&text)
                    .map_err(|e| Error::InvalidOptions(e.to_string()))?;
            }
            _ => {}
        }
    }

    let (name, content_type, bytes) = file.ok_or(Error::MissingFile)?;
    Ok(Upload {
        name,
        content_type,
        bytes,
        options,
    })
}

pub async fn upload(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, Error> {
    let started = Instant::now();
    let multipart = multipart.map_err(|e| Error::Multipart(e.body_text()))?;
    let max_size = state.config.max_file_size;
    let upload = read_upload(multipart, max_size).await?;

    if let Err(rejection) = files::validate_upload(
        &upload.name,
        upload.content_type.as_deref(),
        upload.bytes.len() as u64,
        max_size,
    ) {
        log::warn!(
            target: "security",
            "Upload rejected from {}: {:?} ({rejection})",
            addr.ip(),
            upload.name
        );
        return Err(rejection.into());
    }

    log::info!(
        "Processing upload {:?} ({}) from {}",
        upload.name,
        files::format_file_size(upload.bytes.len() as u64),
        addr.ip()
    );

    let original_size = upload.bytes.len() as u64;
    let temp_path = state.store.save_upload(&upload.name, &upload.bytes).await?;

    let result = convert::run_blocking(
        upload.bytes,
        upload.name.clone(),
        upload.options,
        state.store.converted_dir().to_path_buf(),
    )
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            log::warn!("Conversion of {:?} failed: {e}", upload.name);
            store::cleanup(&temp_path).await;
            state.stats.record_failure();
            return Err(e.into());
        }
    };

    store::schedule_cleanup(temp_path, store::TEMP_TTL);
    store::schedule_cleanup(report.output.clone(), store::OUTPUT_TTL);

    let elapsed = started.elapsed();
    state.stats.record_conversion(elapsed);
    log::info!(
        "Converted {:?} into {} in {}ms",
        upload.name,
        report.filename,
        elapsed.as_millis()
    );

    Ok(Json(json!({
        "success": true,
        "message": "Arquivo convertido com sucesso!",
        "data": {
            "downloadUrl": format!("/api/download/{}", report.filename),
            "filename": report.filename,
            "originalFilename": upload.name,
            "originalSize": original_size,
            "formattedSize": files::format_file_size(original_size),
            "textLength": report.text_length,
            "processingTime": format!("{}ms", elapsed.as_millis()),
            "timestamp": timestamp(),
        },
    })))
}

pub async fn download(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(filename): Path<String>,
) -> Result<Response, Error> {
    if !files::is_valid_download_name(&filename) {
        log::warn!(
            target: "security",
            "Invalid download filename from {}: {filename:?}",
            addr.ip()
        );
        return Err(Error::InvalidFilename);
    }

    let (path, bytes) = state.store.read_output(&filename).await?;
    state.stats.record_download();
    log::info!("Serving {filename} ({} bytes) to {}", bytes.len(), addr.ip());

    store::schedule_cleanup(path, store::DOWNLOADED_TTL);

    let headers = [
        (header::CONTENT_TYPE, docx::MIME_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
        (header::CONTENT_LENGTH, bytes.len().to_string()),
        (
            header::CACHE_CONTROL,
            "no-cache, no-store, must-revalidate".to_string(),
        ),
        (header::PRAGMA, "no-cache".to_string()),
        (header::EXPIRES, "0".to_string()),
    ];
    Ok((StatusCode::OK, headers, bytes).into_response())
}
