use std::collections::HashSet;
use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use kernel::{CommitState, PrincipalRow, RecordKind, Visibility};

/// A metadata row as persisted, without the derived display path.
///
/// Converted into a [`kernel::DocumentRecord`] once the ancestor chain has
/// been walked and the path is known.
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub id: i64,
    pub name: String,
    pub kind: RecordKind,
    pub parent_id: Option<i64>,
    pub owner: String,
    pub visibility: Visibility,
    pub state: CommitState,
    pub size: Option<i64>,
    pub blob_key: Option<String>,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordRow {
    /// Whether the given principal may see this record at all.
    #[must_use]
    pub fn visible_to(&self, principal: &str) -> bool {
        self.owner == principal || self.visibility == Visibility::Shared
    }

    #[must_use]
    pub fn into_document(self, path: String) -> kernel::DocumentRecord {
        kernel::DocumentRecord {
            id: self.id,
            name: self.name,
            kind: self.kind,
            parent_id: self.parent_id,
            path,
            owner: self.owner,
            visibility: self.visibility,
            state: self.state,
            size: self.size,
            blob_key: self.blob_key,
            content_type: self.content_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Fields required to create a pending file record.
pub struct NewFileRecord<'a> {
    pub name: &'a str,
    pub parent_id: Option<i64>,
    pub owner: &'a str,
    pub visibility: Visibility,
    pub size: i64,
    pub blob_key: &'a str,
    pub content_type: &'a str,
}

/// The metadata store: one row per file or folder node.
///
/// Hierarchy is carried solely by the `parent_id` edge. File rows move
/// through the pending/committed protocol; folder rows are committed at
/// creation. Rename and reparent mutate rows in place so record identity
/// survives both.
pub trait MetadataStore {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    fn insert_pending_file(&mut self, record: &NewFileRecord<'_>) -> Result<i64, Self::Err>;

    fn commit_file(&mut self, id: i64) -> Result<usize, Self::Err>;

    fn create_folder(
        &mut self,
        name: &str,
        parent_id: Option<i64>,
        owner: &str,
        visibility: Visibility,
    ) -> Result<i64, Self::Err>;

    fn get_record(&mut self, id: i64) -> Result<Option<RecordRow>, Self::Err>;

    /// Committed children of a folder visible to the principal.
    fn children(&mut self, parent_id: Option<i64>, principal: &str)
        -> Result<Vec<RecordRow>, Self::Err>;

    /// Committed folder with the given name directly under `parent_id`,
    /// visible to the principal.
    fn find_child_folder(
        &mut self,
        parent_id: Option<i64>,
        name: &str,
        principal: &str,
    ) -> Result<Option<i64>, Self::Err>;

    /// Whether a committed record has `parent_id` pointing at the folder.
    fn has_children(&mut self, id: i64) -> Result<bool, Self::Err>;

    fn rename(&mut self, id: i64, new_name: &str) -> Result<usize, Self::Err>;

    fn reparent(&mut self, id: i64, new_parent: Option<i64>) -> Result<usize, Self::Err>;

    fn delete_record(&mut self, id: i64) -> Result<usize, Self::Err>;

    /// Ids of file records still pending since before the cutoff.
    fn pending_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, Self::Err>;

    /// Every blob key referenced by any record, pending or committed.
    fn referenced_blob_keys(&mut self) -> Result<HashSet<String>, Self::Err>;

    fn insert_principal(&mut self, row: &PrincipalRow) -> Result<i64, Self::Err>;

    fn list_principals(&mut self) -> Result<Vec<PrincipalRow>, Self::Err>;
}

/// The blob store: a flat, independent key/bytes service.
///
/// Deliberately ignorant of the metadata store; consistency between the two
/// is the transfer orchestrator's concern.
pub trait BlobStore {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    fn put(&mut self, key: &str, data: Vec<u8>) -> Result<usize, Self::Err>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Err>;

    /// Removes a blob. Returns `false` when the key was already gone, which
    /// callers treat as success.
    fn delete(&mut self, key: &str) -> Result<bool, Self::Err>;

    fn keys(&mut self) -> Result<Vec<String>, Self::Err>;
}
