#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Whether a record is a file or a folder node in the virtual hierarchy.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A file backed by a blob in the blob store
    File,
    /// A folder; purely a metadata construct, no blob
    Folder,
}

/// Who can see a record besides its owner.
///
/// Visibility is an explicit field checked on every read path, never an
/// accidental property of which query filter happens to be applied.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to the owning principal only
    Private,
    /// Visible to every authenticated principal
    Shared,
}

/// Commit state of a file record relative to its blob.
///
/// A file record is created `Pending` before its blob is written and flipped
/// to `Committed` afterwards, so a crash between the two writes always leaves
/// a state the reconcile sweep can recognize. Folders are committed at
/// creation.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    /// Metadata written, blob write not yet confirmed
    Pending,
    /// Metadata and blob both durable
    Committed,
}

/// Represents a single file or folder node in the virtual hierarchy.
///
/// The only structural relationship is the `parent_id` edge; the
/// human-readable `path` is computed from the ancestor chain at read time and
/// is never stored, so it cannot go stale when an ancestor is renamed.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct DocumentRecord {
    /// Unique numeric identifier assigned by the metadata store; immutable.
    /// Rename and move mutate this record in place, they never fabricate a
    /// new identity for it.
    pub id: i64,
    /// Display name, mutable via rename
    pub name: String,
    /// File or folder; immutable after creation
    pub kind: RecordKind,
    /// Containing folder id, None for the root
    pub parent_id: Option<i64>,
    /// Slash-joined ancestor names plus `name`, derived at read time
    pub path: String,
    /// Principal that created the record
    pub owner: String,
    /// Explicit sharing flag
    pub visibility: Visibility,
    /// Commit state relative to the blob store
    pub state: CommitState,
    /// Size in bytes; files only
    pub size: Option<i64>,
    /// Key of the backing blob in the blob store; files only
    pub blob_key: Option<String>,
    /// Declared or guessed MIME type; files only
    pub content_type: Option<String>,
    /// Server-assigned creation time
    pub created_at: DateTime<Utc>,
    /// Server-assigned last modification time
    pub updated_at: DateTime<Utc>,
}

/// Result of a delete operation showing the number of items removed.
///
/// Distinguishes metadata records from blob storage objects because the two
/// stores are independent and a blob may already be gone when its record is
/// deleted.
#[derive(Serialize, Deserialize, Default, ToSchema, Debug)]
pub struct DeleteResult {
    /// Number of metadata records deleted
    pub files: usize,
    /// Number of blob storage objects deleted
    pub blobs: usize,
}

/// Outcome of a reconcile sweep over the two stores.
#[derive(Serialize, Deserialize, Default, ToSchema, Debug)]
pub struct ReconcileReport {
    /// Blobs referenced by no record at all, now garbage collected
    pub orphan_blobs_removed: usize,
    /// Records stuck in pending state past the configured timeout
    pub stale_pending: Vec<i64>,
}

/// Role of an imported principal; CSV values are the French display names.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Administrateur,
    Recruteur,
    Utilisateur,
}

impl Role {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Administrateur" => Some(Self::Administrateur),
            "Recruteur" => Some(Self::Recruteur),
            "Utilisateur" => Some(Self::Utilisateur),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Administrateur => "Administrateur",
            Self::Recruteur => "Recruteur",
            Self::Utilisateur => "Utilisateur",
        };
        write!(f, "{s}")
    }
}

/// Contract type of an imported job offer.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Cdi,
    Cdd,
    Stage,
    Alternance,
    Freelance,
}

impl ContractKind {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "CDI" => Some(Self::Cdi),
            "CDD" => Some(Self::Cdd),
            "Stage" => Some(Self::Stage),
            "Alternance" => Some(Self::Alternance),
            "Freelance" => Some(Self::Freelance),
            _ => None,
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cdi => "CDI",
            Self::Cdd => "CDD",
            Self::Stage => "Stage",
            Self::Alternance => "Alternance",
            Self::Freelance => "Freelance",
        };
        write!(f, "{s}")
    }
}

/// A validated row from the user import sheet.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct PrincipalRow {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

/// A validated row from the job-offer import sheet.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct OfferRow {
    pub title: String,
    pub company: String,
    pub city: String,
    pub contract: ContractKind,
}

/// One rejected spreadsheet row with a human-readable reason.
///
/// `row` is the spreadsheet line number as a user sees it: the header is
/// line 1, the first data row line 2.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// Result of a spreadsheet import: how many rows survived validation and one
/// message per rejected row.
#[derive(Serialize, Deserialize, Default, ToSchema, Debug)]
pub struct ImportReport {
    /// Number of rows accepted
    pub imported: usize,
    /// One entry per rejected row
    pub errors: Vec<RowError>,
}
