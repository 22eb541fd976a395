//! `/{file}` 上的断点续传处理器：HEAD 查询、PUT 追加、POST 关闭。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use regex::Regex;
use std::io;
use std::sync::{Arc, LazyLock};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::storage::FileStore;

static FILE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]*$").expect("valid file name pattern")
});

pub fn valid_file_name(name: &str) -> bool {
    FILE_NAME_PATTERN.is_match(name)
}

/// 通过 `Content-Length` 返回已接收的字节数。
pub async fn head_file(
    Extension(storage): Extension<Arc<FileStore>>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    if !valid_file_name(&file) {
        return Err(ApiError::BadRequest);
    }
    match storage.file_info(&username, &file).await {
        Ok(info) => {
            debug!(username, file, size = info.size, "file info");
            Ok((
                StatusCode::OK,
                [(header::CONTENT_LENGTH, info.size.to_string())],
            )
                .into_response())
        }
        Err(err) => {
            debug!(username, file, error = %err, "file info failed");
            Err(ApiError::NotFound)
        }
    }
}

/// 将请求体流式追加到未关闭文件的末尾。
pub async fn put_file(
    Extension(storage): Extension<Arc<FileStore>>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    Path(file): Path<String>,
    body: AxumBody,
) -> Result<StatusCode, ApiError> {
    if file.starts_with('.') {
        return Err(ApiError::Internal("refusing hidden file name".into()));
    }

    let data_stream = BodyExt::into_data_stream(body).map_err(io::Error::other);
    let mut reader = StreamReader::new(data_stream);
    let written = storage.append_file(&username, &file, &mut reader).await?;
    info!(username, file, bytes = written, "append");
    Ok(StatusCode::OK)
}

/// 完成上传；重复关闭视为错误。
pub async fn post_file(
    Extension(storage): Extension<Arc<FileStore>>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    Path(file): Path<String>,
) -> Result<StatusCode, ApiError> {
    storage.close_file(&username, &file).await?;
    info!(username, file, "close");
    Ok(StatusCode::OK)
}

/// 仅确认请求，不做任何处理。
pub async fn delete_file(Path(file): Path<String>) -> StatusCode {
    debug!(file, "delete ignored");
    StatusCode::OK
}
