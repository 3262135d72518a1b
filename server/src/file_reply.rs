use axum::{
    body::Body,
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use kernel::DocumentRecord;

/// Content types rendered inline by browsers; everything else is served as
/// an attachment.
const INLINE_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

const OCTET_STREAM: &str = "application/octet-stream";

pub struct FileReply {
    data: Vec<u8>,
    record: DocumentRecord,
}

impl FileReply {
    #[must_use]
    pub fn new(data: Vec<u8>, record: DocumentRecord) -> Self {
        Self { data, record }
    }

    fn content_type(&self) -> &str {
        self.record.content_type.as_deref().unwrap_or(OCTET_STREAM)
    }

    fn disposition(&self) -> String {
        let kind = if INLINE_TYPES.contains(&self.content_type()) {
            "inline"
        } else {
            "attachment"
        };
        format!(r#"{kind}; filename="{}""#, self.record.name)
    }
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let content_type = self.content_type().to_owned();
        let disposition = self.disposition();
        let len = self.data.len().to_string();

        let mut res = Body::from(self.data).into_response();
        if let Ok(val) = HeaderValue::from_str(&content_type) {
            res.headers_mut().insert("content-type", val);
        }
        if let Ok(val) = HeaderValue::from_str(&disposition) {
            res.headers_mut().insert("content-disposition", val);
        }
        if let Ok(val) = HeaderValue::from_str(&len) {
            res.headers_mut().insert("Content-Length", val);
        }

        res
    }
}

/// An in-memory zip archive produced by bulk export.
pub struct ArchiveReply {
    data: Vec<u8>,
    file_name: String,
}

impl ArchiveReply {
    #[must_use]
    pub fn new(data: Vec<u8>, file_name: String) -> Self {
        Self { data, file_name }
    }
}

impl IntoResponse for ArchiveReply {
    fn into_response(self) -> Response {
        let attachment = format!(r#"attachment; filename="{}""#, self.file_name);
        let len = self.data.len().to_string();

        let mut res = Body::from(self.data).into_response();
        res.headers_mut().insert(
            "content-type",
            HeaderValue::from_static("application/zip"),
        );
        if let Ok(val) = HeaderValue::from_str(&attachment) {
            res.headers_mut().insert("content-disposition", val);
        }
        if let Ok(val) = HeaderValue::from_str(&len) {
            res.headers_mut().insert("Content-Length", val);
        }

        res
    }
}
