use std::io::{Cursor, Write};
use std::time::Duration;

use kernel::{DeleteResult, DocumentRecord, RecordKind, ReconcileReport, Visibility};
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use crate::domain::{BlobStore, MetadataStore, NewFileRecord};
use crate::error::ServiceError;
use crate::paths;

/// MIME types accepted for upload. Anything else is rejected before a single
/// store write happens.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Upload validation limits, configurable through the environment.
#[derive(Clone, Copy)]
pub struct Limits {
    pub max_upload_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

pub struct UploadRequest<'a> {
    pub name: &'a str,
    pub parent_id: Option<i64>,
    pub visibility: Visibility,
    /// Declared MIME type; guessed from the file extension when absent.
    pub content_type: Option<&'a str>,
    pub data: Vec<u8>,
}

fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::validation("name must not be empty"));
    }
    if name.contains(paths::SEPARATOR) {
        return Err(ServiceError::validation("name must not contain '/'"));
    }
    Ok(())
}

fn resolve_content_type(name: &str, declared: Option<&str>) -> Result<String, ServiceError> {
    let content_type = match declared {
        Some(value) if !value.is_empty() && value != "application/octet-stream" => {
            value.to_owned()
        }
        _ => mime_guess::from_path(name)
            .first_raw()
            .map(str::to_owned)
            .ok_or_else(|| {
                ServiceError::validation(format!("cannot determine content type of '{name}'"))
            })?,
    };
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(ServiceError::validation(format!(
            "content type '{content_type}' is not allowed"
        )));
    }
    Ok(content_type)
}

fn visible_record<M: MetadataStore>(
    meta: &mut M,
    principal: &str,
    id: i64,
) -> Result<crate::domain::RecordRow, ServiceError> {
    let row = meta
        .get_record(id)
        .map_err(ServiceError::metadata)?
        .filter(|row| row.visible_to(principal))
        .ok_or_else(|| ServiceError::not_found(format!("record {id} does not exist")))?;
    Ok(row)
}

fn owned_record<M: MetadataStore>(
    meta: &mut M,
    principal: &str,
    id: i64,
) -> Result<crate::domain::RecordRow, ServiceError> {
    let row = visible_record(meta, principal, id)?;
    if row.owner != principal {
        return Err(ServiceError::validation(format!(
            "only the owner may modify record {id}"
        )));
    }
    Ok(row)
}

fn require_folder<M: MetadataStore>(
    meta: &mut M,
    principal: &str,
    id: i64,
) -> Result<(), ServiceError> {
    let row = visible_record(meta, principal, id)?;
    if row.kind != RecordKind::Folder {
        return Err(ServiceError::validation(format!(
            "record {id} is not a folder"
        )));
    }
    Ok(())
}

fn to_document<M: MetadataStore>(
    meta: &mut M,
    row: crate::domain::RecordRow,
) -> Result<DocumentRecord, ServiceError> {
    let path = paths::display_path(meta, &row)?;
    Ok(row.into_document(path))
}

/// A record's metadata with its display path, visibility-checked.
pub fn get_document<M: MetadataStore>(
    meta: &mut M,
    principal: &str,
    id: i64,
) -> Result<DocumentRecord, ServiceError> {
    let row = visible_record(meta, principal, id)?;
    to_document(meta, row)
}

/// Lists the children of the folder named by a breadcrumb path, filtered and
/// ordered for display.
pub fn browse<M: MetadataStore>(
    meta: &mut M,
    principal: &str,
    path: &str,
    search: Option<&str>,
) -> Result<Vec<DocumentRecord>, ServiceError> {
    let crumbs = paths::split_breadcrumbs(path);
    let parent_id = paths::resolve(meta, principal, &crumbs)?;
    let parent_path = paths::folder_path(meta, parent_id)?;

    let children = meta
        .children(parent_id, principal)
        .map_err(ServiceError::metadata)?
        .into_iter()
        .map(|row| {
            let path = paths::join(&parent_path, &row.name);
            row.into_document(path)
        })
        .collect();

    Ok(crate::tree::assemble(children, search))
}

pub fn create_folder<M: MetadataStore>(
    meta: &mut M,
    principal: &str,
    name: &str,
    parent_id: Option<i64>,
    visibility: Visibility,
) -> Result<DocumentRecord, ServiceError> {
    validate_name(name)?;
    if let Some(parent) = parent_id {
        require_folder(meta, principal, parent)?;
    }
    // duplicate sibling names would make breadcrumb resolution ambiguous
    if meta
        .find_child_folder(parent_id, name, principal)
        .map_err(ServiceError::metadata)?
        .is_some()
    {
        return Err(ServiceError::validation(format!(
            "a folder named '{name}' already exists here"
        )));
    }

    let id = meta
        .create_folder(name, parent_id, principal, visibility)
        .map_err(ServiceError::metadata)?;
    tracing::info!("folder '{name}' created, id {id}");

    let row = visible_record(meta, principal, id)?;
    to_document(meta, row)
}

/// Uploads one file: validate, write the pending metadata record referencing
/// the intended blob key, write the blob, flip the record to committed.
///
/// There is no rollback. A failure after the metadata insert leaves the
/// record pending, which listings ignore and the reconcile sweep reports.
pub fn upload<M: MetadataStore, B: BlobStore>(
    meta: &mut M,
    blobs: &mut B,
    principal: &str,
    request: UploadRequest<'_>,
    limits: &Limits,
) -> Result<DocumentRecord, ServiceError> {
    validate_name(request.name)?;
    if request.data.len() > limits.max_upload_bytes {
        return Err(ServiceError::validation(format!(
            "file of {} bytes exceeds the {} byte limit",
            request.data.len(),
            limits.max_upload_bytes
        )));
    }
    let content_type = resolve_content_type(request.name, request.content_type)?;
    if let Some(parent) = request.parent_id {
        require_folder(meta, principal, parent)?;
    }

    let blob_key = format!("users/{principal}/{}", Uuid::new_v4());
    let size = request.data.len() as i64;

    let id = meta
        .insert_pending_file(&NewFileRecord {
            name: request.name,
            parent_id: request.parent_id,
            owner: principal,
            visibility: request.visibility,
            size,
            blob_key: &blob_key,
            content_type: &content_type,
        })
        .map_err(ServiceError::metadata)?;

    if let Err(e) = blobs.put(&blob_key, request.data) {
        return Err(ServiceError::PartialCompletion(format!(
            "blob write failed, record {id} left pending: {e}"
        )));
    }

    meta.commit_file(id).map_err(|e| {
        ServiceError::PartialCompletion(format!(
            "blob written but record {id} could not be committed: {e}"
        ))
    })?;
    tracing::info!("file '{}' uploaded, record {id}, {} bytes", request.name, size);

    let row = visible_record(meta, principal, id)?;
    to_document(meta, row)
}

/// Renames and/or moves a record in place. The record keeps its id and, for
/// files, its blob key; nothing referencing either ever breaks.
pub fn update<M: MetadataStore>(
    meta: &mut M,
    principal: &str,
    id: i64,
    new_name: Option<&str>,
    new_parent: Option<Option<i64>>,
) -> Result<DocumentRecord, ServiceError> {
    let row = owned_record(meta, principal, id)?;

    if let Some(name) = new_name {
        validate_name(name)?;
    }

    if let Some(Some(parent)) = new_parent {
        require_folder(meta, principal, parent)?;
        ensure_not_descendant(meta, id, parent)?;
    }

    // sibling folder names stay unique whether the name or the parent changes
    if row.kind == RecordKind::Folder && (new_name.is_some() || new_parent.is_some()) {
        let target = new_parent.unwrap_or(row.parent_id);
        let name = new_name.unwrap_or(&row.name);
        let clash = meta
            .find_child_folder(target, name, principal)
            .map_err(ServiceError::metadata)?;
        if clash.is_some_and(|existing| existing != id) {
            return Err(ServiceError::validation(format!(
                "a folder named '{name}' already exists at the destination"
            )));
        }
    }

    if let Some(target) = new_parent {
        meta.reparent(id, target).map_err(ServiceError::metadata)?;
        tracing::info!("record {id} moved to parent {target:?}");
    }

    if let Some(name) = new_name {
        meta.rename(id, name).map_err(ServiceError::metadata)?;
        tracing::info!("record {id} renamed to '{name}'");
    }

    let row = visible_record(meta, principal, id)?;
    to_document(meta, row)
}

/// Refuses to move a folder into itself or its own subtree.
fn ensure_not_descendant<M: MetadataStore>(
    meta: &mut M,
    id: i64,
    target: i64,
) -> Result<(), ServiceError> {
    let mut cursor = Some(target);
    while let Some(current) = cursor {
        if current == id {
            return Err(ServiceError::validation(
                "cannot move a folder into its own subtree",
            ));
        }
        cursor = meta
            .get_record(current)
            .map_err(ServiceError::metadata)?
            .and_then(|row| row.parent_id);
    }
    Ok(())
}

/// Deletes a record and its blob. The blob goes first and an already-gone
/// blob counts as success; a hard blob failure is logged and the metadata
/// delete proceeds anyway, leaving at worst an orphan blob for the sweep.
pub fn delete<M: MetadataStore, B: BlobStore>(
    meta: &mut M,
    blobs: &mut B,
    principal: &str,
    id: i64,
) -> Result<DeleteResult, ServiceError> {
    let row = owned_record(meta, principal, id)?;

    if row.kind == RecordKind::Folder && meta.has_children(id).map_err(ServiceError::metadata)? {
        return Err(ServiceError::validation(format!(
            "folder {id} is not empty"
        )));
    }

    let mut result = DeleteResult::default();
    if let Some(key) = row.blob_key.as_deref() {
        match blobs.delete(key) {
            Ok(true) => result.blobs = 1,
            Ok(false) => {
                tracing::info!("blob {key} already gone, treating as deleted");
            }
            Err(e) => {
                tracing::error!("blob {key} not deleted: {e}");
            }
        }
    }

    match meta.delete_record(id) {
        Ok(deleted) => result.files = deleted,
        Err(e) => {
            return Err(ServiceError::PartialCompletion(format!(
                "blob removed but record {id} could not be deleted: {e}"
            )));
        }
    }
    tracing::info!("record {id} deleted, blobs removed {}", result.blobs);

    Ok(result)
}

/// Reads a committed file's bytes together with its metadata.
pub fn fetch_content<M: MetadataStore, B: BlobStore>(
    meta: &mut M,
    blobs: &B,
    principal: &str,
    id: i64,
) -> Result<(DocumentRecord, Vec<u8>), ServiceError> {
    let row = visible_record(meta, principal, id)?;
    if row.kind != RecordKind::File {
        return Err(ServiceError::validation(format!(
            "record {id} is a folder, not a file"
        )));
    }
    let key = row
        .blob_key
        .clone()
        .ok_or_else(|| ServiceError::not_found(format!("record {id} has no blob")))?;
    let data = blobs
        .get(&key)
        .map_err(ServiceError::blob)?
        .ok_or_else(|| ServiceError::not_found(format!("blob for record {id} is missing")))?;

    let document = to_document(meta, row)?;
    Ok((document, data))
}

/// Bundles the selected files into one in-memory zip archive. A failing item
/// is logged and skipped; it never cancels the rest of the export.
pub fn export_zip<M: MetadataStore, B: BlobStore>(
    meta: &mut M,
    blobs: &B,
    principal: &str,
    ids: &[i64],
) -> Result<Vec<u8>, ServiceError> {
    if ids.is_empty() {
        return Err(ServiceError::validation("nothing selected for export"));
    }

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut bundled = 0usize;

    for &id in ids {
        match fetch_content(meta, blobs, principal, id) {
            Ok((document, data)) => {
                if let Err(e) = zip
                    .start_file(document.path.clone(), options)
                    .and_then(|()| zip.write_all(&data).map_err(Into::into))
                {
                    tracing::error!("record {id} not bundled: {e}");
                } else {
                    bundled += 1;
                }
            }
            Err(e) => {
                tracing::error!("record {id} skipped from export: {e}");
            }
        }
    }

    if bundled == 0 {
        return Err(ServiceError::not_found("no exportable file in selection"));
    }

    let cursor = zip
        .finish()
        .map_err(|e| ServiceError::Blob(format!("archive not finalized: {e}")))?;
    tracing::info!("exported {bundled} file(s)");
    Ok(cursor.into_inner())
}

/// Reconcile sweep over the two stores: garbage-collects blobs no record
/// references and reports records stuck in pending longer than the timeout.
pub fn reconcile<M: MetadataStore, B: BlobStore>(
    meta: &mut M,
    blobs: &mut B,
    pending_timeout: Duration,
) -> Result<ReconcileReport, ServiceError> {
    // keys are listed before the reference set: a blob written by an upload
    // racing the sweep is absent from the candidate list, never deletable
    let keys = blobs.keys().map_err(ServiceError::blob)?;
    let referenced = meta
        .referenced_blob_keys()
        .map_err(ServiceError::metadata)?;

    let mut report = ReconcileReport::default();
    for key in keys {
        if referenced.contains(&key) {
            continue;
        }
        match blobs.delete(&key) {
            Ok(true) => report.orphan_blobs_removed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("orphan blob {key} not removed: {e}");
            }
        }
    }

    let timeout =
        chrono::Duration::from_std(pending_timeout).unwrap_or_else(|_| chrono::Duration::zero());
    let cutoff = chrono::Utc::now() - timeout;
    report.stale_pending = meta
        .pending_older_than(cutoff)
        .map_err(ServiceError::metadata)?;

    tracing::info!(
        "reconcile: {} orphan blob(s) removed, {} stale pending record(s)",
        report.orphan_blobs_removed,
        report.stale_pending.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::SqliteBlobs;
    use crate::domain::{BlobStore, MetadataStore};
    use crate::sqlite::{Mode, Sqlite};
    use kernel::CommitState;
    use rstest::rstest;

    fn stores() -> (Sqlite, SqliteBlobs) {
        let meta = Sqlite::open(":memory:", Mode::ReadWrite).unwrap();
        meta.new_database().unwrap();
        let blobs = SqliteBlobs::open(":memory:", Mode::ReadWrite).unwrap();
        blobs.new_database().unwrap();
        (meta, blobs)
    }

    fn pdf_request<'a>(name: &'a str, parent_id: Option<i64>, data: Vec<u8>) -> UploadRequest<'a> {
        UploadRequest {
            name,
            parent_id,
            visibility: Visibility::Private,
            content_type: Some("application/pdf"),
            data,
        }
    }

    /// A blob store whose writes always fail, for partial-completion paths.
    struct BrokenBlobs;

    impl BlobStore for BrokenBlobs {
        type Err = String;

        fn new_database(&self) -> Result<(), Self::Err> {
            Ok(())
        }

        fn put(&mut self, _key: &str, _data: Vec<u8>) -> Result<usize, Self::Err> {
            Err("store unavailable".to_owned())
        }

        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Self::Err> {
            Ok(None)
        }

        fn delete(&mut self, _key: &str) -> Result<bool, Self::Err> {
            Err("store unavailable".to_owned())
        }

        fn keys(&mut self) -> Result<Vec<String>, Self::Err> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn upload_into_nested_folder() {
        // Arrange
        let (mut meta, mut blobs) = stores();
        let clients = create_folder(&mut meta, "alice", "Clients", None, Visibility::Private)
            .unwrap();
        let acme = create_folder(
            &mut meta,
            "alice",
            "Acme",
            Some(clients.id),
            Visibility::Private,
        )
        .unwrap();

        // Act
        let document = upload(
            &mut meta,
            &mut blobs,
            "alice",
            pdf_request("report.pdf", Some(acme.id), vec![1u8; 2048]),
            &Limits::default(),
        )
        .unwrap();

        // Assert
        assert_eq!(document.name, "report.pdf");
        assert_eq!(document.parent_id, Some(acme.id));
        assert_eq!(document.path, "Clients/Acme/report.pdf");
        assert_eq!(document.state, CommitState::Committed);
        assert_eq!(document.size, Some(2048));
        let (_, data) = fetch_content(&mut meta, &blobs, "alice", document.id).unwrap();
        assert_eq!(data.len(), 2048);
    }

    #[rstest]
    #[case("virus.exe", Some("application/x-msdownload"), 16)]
    #[case("report.pdf", Some("application/pdf"), DEFAULT_MAX_UPLOAD_BYTES + 1)]
    #[case("", Some("application/pdf"), 16)]
    #[case("a/b.pdf", Some("application/pdf"), 16)]
    fn upload_rejected_before_any_store_write(
        #[case] name: &str,
        #[case] content_type: Option<&str>,
        #[case] size: usize,
    ) {
        // Arrange
        let (mut meta, mut blobs) = stores();
        let request = UploadRequest {
            name,
            parent_id: None,
            visibility: Visibility::Private,
            content_type,
            data: vec![0u8; size],
        };

        // Act
        let result = upload(&mut meta, &mut blobs, "alice", request, &Limits::default());

        // Assert
        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert!(meta.children(None, "alice").unwrap().is_empty());
        assert!(blobs.keys().unwrap().is_empty());
    }

    #[test]
    fn upload_guesses_content_type_from_extension() {
        // Arrange
        let (mut meta, mut blobs) = stores();

        // Act
        let document = upload(
            &mut meta,
            &mut blobs,
            "alice",
            UploadRequest {
                name: "photo.png",
                parent_id: None,
                visibility: Visibility::Private,
                content_type: None,
                data: vec![0u8; 10],
            },
            &Limits::default(),
        )
        .unwrap();

        // Assert
        assert_eq!(document.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn failed_blob_write_leaves_reconciler_visible_pending() {
        // Arrange
        let (mut meta, _) = stores();
        let mut broken = BrokenBlobs;

        // Act
        let result = upload(
            &mut meta,
            &mut broken,
            "alice",
            pdf_request("report.pdf", None, vec![0u8; 10]),
            &Limits::default(),
        );

        // Assert
        assert!(matches!(result, Err(ServiceError::PartialCompletion(_))));
        assert!(meta.children(None, "alice").unwrap().is_empty());
        let report = reconcile(&mut meta, &mut BrokenBlobs, Duration::ZERO).unwrap();
        assert_eq!(report.stale_pending.len(), 1);
    }

    #[test]
    fn rename_keeps_identity_and_lists_exactly_once() {
        // Arrange
        let (mut meta, mut blobs) = stores();
        let uploaded = upload(
            &mut meta,
            &mut blobs,
            "alice",
            pdf_request("draft.pdf", None, vec![0u8; 10]),
            &Limits::default(),
        )
        .unwrap();

        // Act
        let renamed = update(
            &mut meta,
            "alice",
            uploaded.id,
            Some("final.pdf"),
            None,
        )
        .unwrap();

        // Assert
        assert_eq!(renamed.id, uploaded.id);
        assert_eq!(renamed.blob_key, uploaded.blob_key);
        let listing = browse(&mut meta, "alice", "", None).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "final.pdf");
    }

    #[test]
    fn rename_onto_existing_sibling_folder_is_rejected() {
        // Arrange
        let (mut meta, _) = stores();
        let alpha =
            create_folder(&mut meta, "alice", "Alpha", None, Visibility::Private).unwrap();
        create_folder(&mut meta, "alice", "Beta", None, Visibility::Private).unwrap();

        // Act
        let clash = update(&mut meta, "alice", alpha.id, Some("Beta"), None);
        let keep_own_name = update(&mut meta, "alice", alpha.id, Some("Alpha"), None);

        // Assert
        assert!(matches!(clash, Err(ServiceError::Validation(_))));
        assert!(keep_own_name.is_ok());
        let listing = browse(&mut meta, "alice", "", None).unwrap();
        let betas = listing.iter().filter(|r| r.name == "Beta").count();
        assert_eq!(betas, 1);
    }

    #[test]
    fn move_into_own_subtree_is_rejected() {
        // Arrange
        let (mut meta, _) = stores();
        let top = create_folder(&mut meta, "alice", "Top", None, Visibility::Private).unwrap();
        let sub =
            create_folder(&mut meta, "alice", "Sub", Some(top.id), Visibility::Private).unwrap();

        // Act
        let result = update(&mut meta, "alice", top.id, None, Some(Some(sub.id)));

        // Assert
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn delete_tolerates_blob_already_gone() {
        // Arrange
        let (mut meta, mut blobs) = stores();
        let uploaded = upload(
            &mut meta,
            &mut blobs,
            "alice",
            pdf_request("report.pdf", None, vec![0u8; 10]),
            &Limits::default(),
        )
        .unwrap();
        let key = uploaded.blob_key.clone().unwrap();
        assert!(blobs.delete(&key).unwrap());

        // Act
        let result = delete(&mut meta, &mut blobs, "alice", uploaded.id).unwrap();

        // Assert
        assert_eq!(result.files, 1);
        assert_eq!(result.blobs, 0);
        assert!(browse(&mut meta, "alice", "", None).unwrap().is_empty());
    }

    #[test]
    fn delete_non_empty_folder_is_rejected() {
        // Arrange
        let (mut meta, mut blobs) = stores();
        let folder =
            create_folder(&mut meta, "alice", "Clients", None, Visibility::Private).unwrap();
        upload(
            &mut meta,
            &mut blobs,
            "alice",
            pdf_request("report.pdf", Some(folder.id), vec![0u8; 10]),
            &Limits::default(),
        )
        .unwrap();

        // Act
        let result = delete(&mut meta, &mut blobs, "alice", folder.id);

        // Assert
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn export_bundles_selected_files_and_skips_folders() {
        // Arrange
        let (mut meta, mut blobs) = stores();
        let folder =
            create_folder(&mut meta, "alice", "Clients", None, Visibility::Private).unwrap();
        let a = upload(
            &mut meta,
            &mut blobs,
            "alice",
            pdf_request("a.pdf", Some(folder.id), vec![1u8; 4]),
            &Limits::default(),
        )
        .unwrap();
        let b = upload(
            &mut meta,
            &mut blobs,
            "alice",
            pdf_request("b.pdf", None, vec![2u8; 4]),
            &Limits::default(),
        )
        .unwrap();

        // Act
        let archive = export_zip(&mut meta, &blobs, "alice", &[a.id, folder.id, b.id]).unwrap();

        // Assert
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 2);
        assert!(zip.by_name("Clients/a.pdf").is_ok());
    }

    #[test]
    fn reconcile_removes_unreferenced_blobs() {
        // Arrange
        let (mut meta, mut blobs) = stores();
        upload(
            &mut meta,
            &mut blobs,
            "alice",
            pdf_request("keep.pdf", None, vec![0u8; 4]),
            &Limits::default(),
        )
        .unwrap();
        blobs.put("users/alice/orphan", vec![9u8; 4]).unwrap();

        // Act
        let report = reconcile(&mut meta, &mut blobs, Duration::from_secs(3600)).unwrap();

        // Assert
        assert_eq!(report.orphan_blobs_removed, 1);
        assert!(report.stale_pending.is_empty());
        assert_eq!(blobs.keys().unwrap().len(), 1);
    }

    #[test]
    fn reconcile_snapshots_blob_keys_before_references() {
        use crate::domain::RecordRow;
        use chrono::{DateTime, Utc};
        use kernel::PrincipalRow;
        use std::cell::RefCell;
        use std::collections::HashSet;
        use std::rc::Rc;

        /// Records the order the sweep reads the two stores in. A blob
        /// listed after the reference snapshot could belong to an upload
        /// racing the sweep, so keys must come first.
        struct TracingMeta {
            log: Rc<RefCell<Vec<&'static str>>>,
        }

        impl MetadataStore for TracingMeta {
            type Err = String;

            fn new_database(&self) -> Result<(), Self::Err> {
                Ok(())
            }

            fn insert_pending_file(&mut self, _: &NewFileRecord<'_>) -> Result<i64, Self::Err> {
                unreachable!()
            }

            fn commit_file(&mut self, _: i64) -> Result<usize, Self::Err> {
                unreachable!()
            }

            fn create_folder(
                &mut self,
                _: &str,
                _: Option<i64>,
                _: &str,
                _: Visibility,
            ) -> Result<i64, Self::Err> {
                unreachable!()
            }

            fn get_record(&mut self, _: i64) -> Result<Option<RecordRow>, Self::Err> {
                unreachable!()
            }

            fn children(
                &mut self,
                _: Option<i64>,
                _: &str,
            ) -> Result<Vec<RecordRow>, Self::Err> {
                unreachable!()
            }

            fn find_child_folder(
                &mut self,
                _: Option<i64>,
                _: &str,
                _: &str,
            ) -> Result<Option<i64>, Self::Err> {
                unreachable!()
            }

            fn has_children(&mut self, _: i64) -> Result<bool, Self::Err> {
                unreachable!()
            }

            fn rename(&mut self, _: i64, _: &str) -> Result<usize, Self::Err> {
                unreachable!()
            }

            fn reparent(&mut self, _: i64, _: Option<i64>) -> Result<usize, Self::Err> {
                unreachable!()
            }

            fn delete_record(&mut self, _: i64) -> Result<usize, Self::Err> {
                unreachable!()
            }

            fn pending_older_than(
                &mut self,
                _: DateTime<Utc>,
            ) -> Result<Vec<i64>, Self::Err> {
                Ok(Vec::new())
            }

            fn referenced_blob_keys(&mut self) -> Result<HashSet<String>, Self::Err> {
                self.log.borrow_mut().push("references");
                Ok(HashSet::new())
            }

            fn insert_principal(&mut self, _: &PrincipalRow) -> Result<i64, Self::Err> {
                unreachable!()
            }

            fn list_principals(&mut self) -> Result<Vec<PrincipalRow>, Self::Err> {
                unreachable!()
            }
        }

        struct TracingBlobs {
            log: Rc<RefCell<Vec<&'static str>>>,
        }

        impl BlobStore for TracingBlobs {
            type Err = String;

            fn new_database(&self) -> Result<(), Self::Err> {
                Ok(())
            }

            fn put(&mut self, _: &str, _: Vec<u8>) -> Result<usize, Self::Err> {
                unreachable!()
            }

            fn get(&self, _: &str) -> Result<Option<Vec<u8>>, Self::Err> {
                unreachable!()
            }

            fn delete(&mut self, _: &str) -> Result<bool, Self::Err> {
                unreachable!()
            }

            fn keys(&mut self) -> Result<Vec<String>, Self::Err> {
                self.log.borrow_mut().push("keys");
                Ok(Vec::new())
            }
        }

        // Arrange
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut meta = TracingMeta {
            log: Rc::clone(&log),
        };
        let mut blobs = TracingBlobs {
            log: Rc::clone(&log),
        };

        // Act
        reconcile(&mut meta, &mut blobs, Duration::from_secs(3600)).unwrap();

        // Assert
        assert_eq!(*log.borrow(), vec!["keys", "references"]);
    }

    #[test]
    fn shared_records_visible_but_not_writable_for_others() {
        // Arrange
        let (mut meta, mut blobs) = stores();
        let shared = upload(
            &mut meta,
            &mut blobs,
            "alice",
            UploadRequest {
                name: "handbook.pdf",
                parent_id: None,
                visibility: Visibility::Shared,
                content_type: Some("application/pdf"),
                data: vec![0u8; 4],
            },
            &Limits::default(),
        )
        .unwrap();

        // Act
        let listing = browse(&mut meta, "bob", "", None).unwrap();
        let rename = update(&mut meta, "bob", shared.id, Some("mine.pdf"), None);

        // Assert
        assert_eq!(listing.len(), 1);
        assert!(matches!(rename, Err(ServiceError::Validation(_))));
    }
}
