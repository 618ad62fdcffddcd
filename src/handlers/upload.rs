//! Multipart uploads for book media and covers (staff only).
//!
//! Files are validated in full before anything is written to storage. If the record update
//! fails after the blob was stored, the blob is removed again.

use crate::error::AppError;
use crate::extractors::CurrentUserId;
use crate::model::{Book, Cover, MediaField};
use crate::response::{success_created, success_one, One};
use crate::service::validation::validate_image;
use crate::state::AppState;
use crate::storage::object_key;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
};

/// Multipart field carrying the file.
pub const FILE_FIELD: &str = "file";

struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

fn multipart_error(field: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge {
            field: field.to_string(),
            message: e.body_text(),
        };
    }
    AppError::BadRequest(format!("multipart: {}", e.body_text()))
}

async fn read_upload(mut multipart: Multipart, record_field: &str) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(record_field, e))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| multipart_error(record_field, e))?;
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(AppError::constraint(record_field, "Обязательное поле."))
}

/// Remove a stored blob after the record write failed. Cleanup failures are only logged.
async fn discard_blob(state: &AppState, key: &str) {
    if let Err(e) = state.storage.delete(key).await {
        tracing::warn!(key, error = %e, "failed to remove orphaned upload");
    }
}

async fn upload_book_media(
    state: &AppState,
    user: CurrentUserId,
    id: i64,
    field: MediaField,
    multipart: Multipart,
) -> Result<One<Book>, AppError> {
    let store = state.store.as_ref();
    user.require_staff(store).await?;
    if store.get_book(id).await?.is_none() {
        return Err(AppError::NotFound(format!("book {}", id)));
    }
    let upload = read_upload(multipart, field.field_name()).await?;
    if field.is_image() {
        validate_image(field.field_name(), &upload.bytes)?;
    }
    let key = object_key(field.upload_to(), upload.file_name.as_deref());
    let key = state.storage.put(&key, upload.bytes).await?;
    match store.set_book_media(id, field, Some(&key)).await {
        Ok(book) => {
            tracing::info!(book = id, field = field.field_name(), key = %key, "book media updated");
            Ok(success_one(book))
        }
        Err(e) => {
            discard_blob(state, &key).await;
            Err(e)
        }
    }
}

/// POST /api/v1/uploads/book/{id}/photo
pub async fn book_photo(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<One<Book>, AppError> {
    upload_book_media(&state, user, id, MediaField::PhotoPreview, multipart).await
}

/// POST /api/v1/uploads/book/{id}/file
pub async fn book_file(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<One<Book>, AppError> {
    upload_book_media(&state, user, id, MediaField::BookFile, multipart).await
}

/// POST /api/v1/uploads/cover
pub async fn create_cover(
    State(state): State<AppState>,
    user: CurrentUserId,
    multipart: Multipart,
) -> Result<One<Cover>, AppError> {
    let store = state.store.as_ref();
    user.require_staff(store).await?;
    let upload = read_upload(multipart, "cover").await?;
    validate_image("cover", &upload.bytes)?;
    let key = object_key(Cover::UPLOAD_TO, upload.file_name.as_deref());
    let key = state.storage.put(&key, upload.bytes).await?;
    match store.insert_cover(&key).await {
        Ok(cover) => Ok(success_created(cover)),
        Err(e) => {
            discard_blob(&state, &key).await;
            Err(e)
        }
    }
}

/// GET /api/v1/uploads/cover/{id}
pub async fn get_cover(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path(id): Path<i64>,
) -> Result<One<Cover>, AppError> {
    user.require_staff(state.store.as_ref()).await?;
    let cover = state
        .store
        .get_cover(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("cover {}", id)))?;
    Ok(success_one(cover))
}

/// DELETE /api/v1/uploads/cover/{id}: the record first, then its blob.
pub async fn delete_cover(
    State(state): State<AppState>,
    user: CurrentUserId,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let store = state.store.as_ref();
    user.require_staff(store).await?;
    let cover = store
        .get_cover(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("cover {}", id)))?;
    store.delete_cover(id).await?;
    if !cover.cover.is_empty() {
        state.storage.delete(&cover.cover).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}
