use crate::domain::{MetadataStore, RecordRow};
use crate::error::ServiceError;

pub const SEPARATOR: char = '/';

/// Hierarchies deeper than this are treated as corrupt rather than walked
/// forever.
const MAX_DEPTH: usize = 255;

/// Splits a slash-joined breadcrumb string into folder names, dropping empty
/// segments so `/Clients//Acme/` and `Clients/Acme` resolve identically.
#[must_use]
pub fn split_breadcrumbs(path: &str) -> Vec<&str> {
    path.split(SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Translates a breadcrumb stack into the id of the folder it names.
///
/// Walks from the root, matching one committed folder visible to the
/// principal per segment. The empty stack is the root (`None`). A segment
/// that matches nothing is a not-found error, never a silent empty view.
pub fn resolve<M: MetadataStore>(
    store: &mut M,
    principal: &str,
    breadcrumbs: &[&str],
) -> Result<Option<i64>, ServiceError> {
    let mut current: Option<i64> = None;
    for segment in breadcrumbs {
        match store
            .find_child_folder(current, segment, principal)
            .map_err(ServiceError::metadata)?
        {
            Some(id) => current = Some(id),
            None => {
                return Err(ServiceError::not_found(format!(
                    "no folder named '{segment}' at this level"
                )))
            }
        }
    }
    Ok(current)
}

/// Slash-joined path of a folder, empty string for the root.
pub fn folder_path<M: MetadataStore>(
    store: &mut M,
    folder_id: Option<i64>,
) -> Result<String, ServiceError> {
    let Some(id) = folder_id else {
        return Ok(String::new());
    };
    let row = store
        .get_record(id)
        .map_err(ServiceError::metadata)?
        .ok_or_else(|| ServiceError::not_found(format!("folder {id} does not exist")))?;
    display_path(store, &row)
}

/// Human-readable location of a record, derived from the ancestor chain at
/// read time. Nothing is stored, so a renamed ancestor is always reflected.
pub fn display_path<M: MetadataStore>(
    store: &mut M,
    row: &RecordRow,
) -> Result<String, ServiceError> {
    let mut segments = vec![row.name.clone()];
    let mut cursor = row.parent_id;
    while let Some(id) = cursor {
        if segments.len() > MAX_DEPTH {
            return Err(ServiceError::Metadata(
                "ancestor chain does not terminate".into(),
            ));
        }
        let parent = store
            .get_record(id)
            .map_err(ServiceError::metadata)?
            .ok_or_else(|| ServiceError::not_found(format!("ancestor {id} is missing")))?;
        segments.push(parent.name);
        cursor = parent.parent_id;
    }
    segments.reverse();
    Ok(segments.join(&SEPARATOR.to_string()))
}

/// Joins a parent folder path and a child name without allocating the whole
/// ancestor walk per child.
#[must_use]
pub fn join(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_owned()
    } else {
        format!("{parent_path}{SEPARATOR}{name}")
    }
}
