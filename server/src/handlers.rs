#![allow(clippy::unused_async)]
use crate::blobs::SqliteBlobs;
use crate::domain::MetadataStore;
use crate::error::ServiceError;
use crate::file_reply::{ArchiveReply, FileReply};
use crate::roster;
use crate::sqlite::{Mode, Sqlite};
use crate::transfer::{self, UploadRequest};
use crate::{paths, AppState};
use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, Multipart, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{async_trait, Json};
use futures::{Stream, TryStreamExt};
use futures_util::StreamExt;
use kernel::{DeleteResult, DocumentRecord, ImportReport, ReconcileReport, Visibility};
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// The authenticated principal, taken from the `x-principal` header.
///
/// The hosted identity provider in front of this service verifies the user
/// and forwards the identity; a request arriving without it fails the
/// precondition and nothing downstream runs.
pub struct Principal(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-principal")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
            .ok_or(ServiceError::Precondition)
    }
}

#[derive(Deserialize)]
pub struct BrowseQuery {
    /// Slash-joined breadcrumb path; empty or absent means the root.
    #[serde(default)]
    path: String,
    search: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateFolderBody {
    name: String,
    parent_id: Option<i64>,
    visibility: Option<Visibility>,
}

#[derive(Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    path: String,
    visibility: Option<Visibility>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateBody {
    name: Option<String>,
    parent_id: Option<i64>,
    /// Explicit marker for moving to the root, since an absent `parent_id`
    /// means "leave the parent unchanged".
    #[serde(default)]
    to_root: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct ExportBody {
    ids: Vec<i64>,
}

/// Lists the children of the folder named by a breadcrumb path.
#[utoipa::path(
    get,
    path = "/api/browse",
    tag = "records",
    params(
        ("path" = Option<String>, Query, description = "Slash-joined folder path, empty for the root"),
        ("search" = Option<String>, Query, description = "Case-insensitive substring filter")
    ),
    responses(
        (status = 200, description = "Ordered folder listing", body = [DocumentRecord]),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 404, description = "No such folder", body = String)
    ),
)]
pub async fn browse(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    with_meta(&state, Mode::ReadOnly, move |mut meta| {
        let listing = transfer::browse(&mut meta, &principal, &query.path, query.search.as_deref())?;
        Ok(Json(listing))
    })
}

/// Creates a folder.
#[utoipa::path(
    post,
    path = "/api/folders",
    tag = "records",
    responses(
        (status = 201, description = "Folder created", body = DocumentRecord),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 422, description = "Invalid or duplicate folder name", body = String)
    ),
)]
pub async fn create_folder(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateFolderBody>,
) -> Result<impl IntoResponse, ServiceError> {
    with_meta(&state, Mode::ReadWrite, move |mut meta| {
        let visibility = body.visibility.unwrap_or(Visibility::Private);
        let folder =
            transfer::create_folder(&mut meta, &principal, &body.name, body.parent_id, visibility)?;
        Ok((StatusCode::CREATED, Json(folder)))
    })
}

/// Uploads a single file from the raw request body into a folder path.
#[utoipa::path(
    post,
    path = "/api/files/{file_name}",
    tag = "files",
    params(
        ("file_name" = String, Path, description = "Display name of the uploaded file"),
        ("path" = Option<String>, Query, description = "Destination folder path, empty for the root"),
        ("visibility" = Option<String>, Query, description = "private (default) or shared")
    ),
    responses(
        (status = 201, description = "File uploaded", body = DocumentRecord),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 422, description = "Upload failed validation", body = String)
    ),
)]
pub async fn upload_file(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: axum::http::HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ServiceError> {
    let declared = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let (data, read_bytes) = read_from_stream(body.into_data_stream())
        .await
        .map_err(ServiceError::blob)?;
    tracing::info!("file: {file_name} read: {read_bytes}");

    let limits = state.limits;
    with_stores(&state, move |mut meta, mut blobs| {
        let crumbs = paths::split_breadcrumbs(&query.path);
        let parent_id = paths::resolve(&mut meta, &principal, &crumbs)?;
        let document = transfer::upload(
            &mut meta,
            &mut blobs,
            &principal,
            UploadRequest {
                name: &file_name,
                parent_id,
                visibility: query.visibility.unwrap_or(Visibility::Private),
                content_type: declared.as_deref(),
                data,
            },
            &limits,
        )?;
        Ok((StatusCode::CREATED, Json(document)))
    })
}

/// Uploads several files from a multipart form into a folder path.
///
/// One bad file does not cancel the rest; rejected files are logged and
/// skipped, the response lists what was stored.
#[utoipa::path(
    post,
    path = "/api/files",
    tag = "files",
    params(
        ("path" = Option<String>, Query, description = "Destination folder path, empty for the root"),
        ("visibility" = Option<String>, Query, description = "private (default) or shared")
    ),
    responses(
        (status = 201, description = "Stored files", body = [DocumentRecord]),
        (status = 401, description = "No authenticated principal", body = String)
    ),
)]
pub async fn upload_many(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let limits = state.limits;
    let mut fields: Vec<(String, Option<String>, Vec<u8>)> = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let declared = field.content_type().map(str::to_owned);
        match field.bytes().await {
            Ok(bytes) => fields.push((file_name, declared, bytes.to_vec())),
            Err(e) => {
                tracing::error!("field '{file_name}' not read: {e}");
            }
        }
    }

    with_stores(&state, move |mut meta, mut blobs| {
        let crumbs = paths::split_breadcrumbs(&query.path);
        let parent_id = paths::resolve(&mut meta, &principal, &crumbs)?;

        let mut stored: Vec<DocumentRecord> = Vec::new();
        for (file_name, declared, data) in fields {
            let result = transfer::upload(
                &mut meta,
                &mut blobs,
                &principal,
                UploadRequest {
                    name: &file_name,
                    parent_id,
                    visibility: query.visibility.unwrap_or(Visibility::Private),
                    content_type: declared.as_deref(),
                    data,
                },
                &limits,
            );
            match result {
                Ok(document) => stored.push(document),
                Err(e) => {
                    tracing::error!("file '{file_name}' not stored: {e}");
                }
            }
        }
        Ok((StatusCode::CREATED, Json(stored)))
    })
}

/// Gets a record's metadata, including its computed display path.
#[utoipa::path(
    get,
    path = "/api/records/{id}",
    tag = "records",
    params(("id" = i64, Path, description = "Record id")),
    responses(
        (status = 200, body = DocumentRecord),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 404, description = "Record not found", body = String)
    ),
)]
pub async fn get_record(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    with_meta(&state, Mode::ReadOnly, move |mut meta| {
        let document = transfer::get_document(&mut meta, &principal, id)?;
        Ok(Json(document))
    })
}

/// Gets file binary content by record id.
#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    params(("id" = i64, Path, description = "Record id")),
    responses(
        (status = 200, description = "File binary content", content_type = "application/octet-stream", body = [u8]),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 404, description = "Record or blob not found", body = String)
    ),
)]
pub async fn get_file_content(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    with_stores_read(&state, move |mut meta, blobs| {
        let (document, data) = transfer::fetch_content(&mut meta, &blobs, &principal, id)?;
        tracing::info!("File size {}", data.len());
        Ok(FileReply::new(data, document))
    })
}

/// Renames and/or moves a record in place; its id never changes.
#[utoipa::path(
    patch,
    path = "/api/records/{id}",
    tag = "records",
    params(("id" = i64, Path, description = "Record id")),
    responses(
        (status = 200, description = "Updated record", body = DocumentRecord),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 404, description = "Record not found", body = String),
        (status = 422, description = "Invalid rename or move", body = String)
    ),
)]
pub async fn update_record(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let new_parent = if body.to_root {
        Some(None)
    } else {
        body.parent_id.map(Some)
    };

    with_meta(&state, Mode::ReadWrite, move |mut meta| {
        let document =
            transfer::update(&mut meta, &principal, id, body.name.as_deref(), new_parent)?;
        Ok(Json(document))
    })
}

/// Deletes a record together with its blob.
#[utoipa::path(
    delete,
    path = "/api/records/{id}",
    tag = "records",
    params(("id" = i64, Path, description = "Record id")),
    responses(
        (status = 200, description = "Record deleted", body = DeleteResult),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 404, description = "Record not found", body = String),
        (status = 422, description = "Folder is not empty", body = String)
    ),
)]
pub async fn delete_record(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    with_stores(&state, move |mut meta, mut blobs| {
        let result = transfer::delete(&mut meta, &mut blobs, &principal, id)?;
        Ok(Json(result))
    })
}

/// Bundles the selected files into one zip archive.
#[utoipa::path(
    post,
    path = "/api/export",
    tag = "files",
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip", body = [u8]),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 404, description = "Nothing exportable in the selection", body = String)
    ),
)]
pub async fn export(
    Principal(principal): Principal,
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExportBody>,
) -> Result<impl IntoResponse, ServiceError> {
    with_stores_read(&state, move |mut meta, blobs| {
        let archive = transfer::export_zip(&mut meta, &blobs, &principal, &body.ids)?;
        Ok(ArchiveReply::new(archive, "export.zip".to_owned()))
    })
}

/// Runs the reconcile sweep over the two stores.
#[utoipa::path(
    post,
    path = "/api/maintenance/reconcile",
    tag = "maintenance",
    responses(
        (status = 200, description = "Sweep outcome", body = ReconcileReport),
        (status = 401, description = "No authenticated principal", body = String)
    ),
)]
pub async fn reconcile(
    Principal(_principal): Principal,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let timeout = state.pending_timeout;
    with_stores(&state, move |mut meta, mut blobs| {
        let report = transfer::reconcile(&mut meta, &mut blobs, timeout)?;
        Ok(Json(report))
    })
}

/// Imports users from the fixed-header CSV sheet. Valid rows are stored;
/// every rejected row contributes one message with its line number.
#[utoipa::path(
    post,
    path = "/api/roster/users/import",
    tag = "roster",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "Import outcome", body = ImportReport),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 422, description = "Sheet headers do not match the contract", body = String)
    ),
)]
pub async fn import_users(
    Principal(_principal): Principal,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let (valid, errors) = roster::parse_users(&body)?;

    with_meta(&state, Mode::ReadWrite, move |mut meta| {
        let mut imported = 0usize;
        for row in &valid {
            match meta.insert_principal(row) {
                Ok(_) => imported += 1,
                Err(e) => {
                    tracing::error!("principal '{}' not inserted. Error: {e}", row.email);
                }
            }
        }
        tracing::info!("imported {imported} principal(s), {} row error(s)", errors.len());
        Ok(Json(roster::report(imported, errors)))
    })
}

/// Exports every stored principal under the import header schema.
#[utoipa::path(
    get,
    path = "/api/roster/users/export",
    tag = "roster",
    responses(
        (status = 200, description = "CSV sheet", content_type = "text/csv", body = String),
        (status = 401, description = "No authenticated principal", body = String)
    ),
)]
pub async fn export_users(
    Principal(_principal): Principal,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    with_meta(&state, Mode::ReadOnly, move |mut meta| {
        let principals = meta.list_principals().map_err(ServiceError::metadata)?;
        let sheet = roster::write_users(&principals)?;
        Ok(([(CONTENT_TYPE, "text/csv; charset=utf-8")], sheet))
    })
}

/// Validates a job-offer sheet; offers are reported, not stored.
#[utoipa::path(
    post,
    path = "/api/roster/offers/import",
    tag = "roster",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "Import outcome", body = ImportReport),
        (status = 401, description = "No authenticated principal", body = String),
        (status = 422, description = "Sheet headers do not match the contract", body = String)
    ),
)]
pub async fn import_offers(
    Principal(_principal): Principal,
    body: Bytes,
) -> Result<Json<ImportReport>, ServiceError> {
    let (valid, errors) = roster::parse_offers(&body)?;
    tracing::info!("validated {} offer(s), {} row error(s)", valid.len(), errors.len());
    Ok(Json(roster::report(valid.len(), errors)))
}

fn with_meta<F, R>(state: &AppState, mode: Mode, action: F) -> Result<R, ServiceError>
where
    F: FnOnce(Sqlite) -> Result<R, ServiceError>,
    R: IntoResponse,
{
    let start = Instant::now();
    let meta = Sqlite::open(&state.meta_db, mode).map_err(ServiceError::metadata)?;
    let res = action(meta);
    tracing::info!("DB query time: {:?}", start.elapsed());
    res
}

fn with_stores<F, R>(state: &AppState, action: F) -> Result<R, ServiceError>
where
    F: FnOnce(Sqlite, SqliteBlobs) -> Result<R, ServiceError>,
    R: IntoResponse,
{
    let start = Instant::now();
    let meta = Sqlite::open(&state.meta_db, Mode::ReadWrite).map_err(ServiceError::metadata)?;
    let blobs = SqliteBlobs::open(&state.blob_db, Mode::ReadWrite).map_err(ServiceError::blob)?;
    let res = action(meta, blobs);
    tracing::info!("DB query time: {:?}", start.elapsed());
    res
}

fn with_stores_read<F, R>(state: &AppState, action: F) -> Result<R, ServiceError>
where
    F: FnOnce(Sqlite, SqliteBlobs) -> Result<R, ServiceError>,
    R: IntoResponse,
{
    let start = Instant::now();
    let meta = Sqlite::open(&state.meta_db, Mode::ReadOnly).map_err(ServiceError::metadata)?;
    let blobs = SqliteBlobs::open(&state.blob_db, Mode::ReadOnly).map_err(ServiceError::blob)?;
    let res = action(meta, blobs);
    tracing::info!("DB query time: {:?}", start.elapsed());
    res
}

async fn read_from_stream<S, E>(stream: S) -> io::Result<(Vec<u8>, usize)>
where
    S: Stream<Item = Result<Bytes, E>> + StreamExt,
    E: Sync + std::error::Error + Send + 'static,
{
    // Convert the stream into an `AsyncRead`.
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut buffer = Vec::new();

    let copied_bytes = tokio::io::copy(&mut body_reader, &mut buffer).await?;
    let copied_bytes = usize::try_from(copied_bytes).unwrap_or(usize::MAX);
    Ok((buffer, copied_bytes))
}
