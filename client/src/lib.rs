use std::path::PathBuf;

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use kernel::{DocumentRecord, RecordKind};
use reqwest::Client;
use resource::Resource;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

pub mod preview;
pub mod resource;

const PRINCIPAL_HEADER: &str = "x-principal";

pub struct UploadParams {
    pub uri: String,
    pub user: String,
    pub file: String,
    /// Destination folder path, empty for the root.
    pub folder: String,
    pub shared: bool,
}

pub async fn upload_file(params: UploadParams) {
    let path = PathBuf::from(&params.file);
    let file_name = path.file_name().unwrap().to_os_string();
    let file_name = file_name.to_str().unwrap();

    let mut resource = Resource::new(&params.uri).unwrap();
    resource
        .push("api")
        .push("files")
        .push(file_name)
        .query("path", &params.folder);
    if params.shared {
        resource.query("visibility", "shared");
    }

    let error_message = format!("no such file {}", &params.file);
    let f = File::open(&params.file).await.expect(&error_message);
    let stream = ReaderStream::new(f);
    let stream = reqwest::Body::wrap_stream(stream);

    let client = Client::new();
    let result = client
        .post(resource.to_string())
        .header(PRINCIPAL_HEADER, &params.user)
        .body(stream)
        .send()
        .await;
    match result {
        Ok(x) => {
            println!("file {} uploaded. Status: {}", params.file, x.status());
        }
        Err(e) => {
            println!("upload error: {e}");
        }
    }
}

pub async fn list_records(uri: &str, user: &str, folder: &str, search: Option<&str>) {
    let mut resource = Resource::new(uri).unwrap();
    resource.push("api").push("browse").query("path", folder);
    if let Some(needle) = search {
        resource.query("search", needle);
    }

    let client = Client::new();

    let result = client
        .get(resource.to_string())
        .header(PRINCIPAL_HEADER, user)
        .send()
        .await;
    match result {
        Ok(response) => match response.json().await {
            Ok(r) => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_HORIZONTAL_ONLY)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_width(120)
                    .set_header(vec![
                        Cell::new("Id").add_attribute(Attribute::Bold),
                        Cell::new("Name").add_attribute(Attribute::Bold),
                        Cell::new("Kind").add_attribute(Attribute::Bold),
                        Cell::new("Size").add_attribute(Attribute::Bold),
                        Cell::new("Path").add_attribute(Attribute::Bold),
                    ]);

                let records: Vec<DocumentRecord> = r;
                for record in records {
                    let kind = match record.kind {
                        RecordKind::Folder => "folder",
                        RecordKind::File => "file",
                    };
                    let size = record
                        .size
                        .map(|s| s.to_string())
                        .unwrap_or_default();
                    table.add_row(vec![
                        Cell::new(record.id),
                        Cell::new(record.name),
                        Cell::new(kind),
                        Cell::new(size),
                        Cell::new(record.path),
                    ]);
                }
                println!("{table}");
            }
            Err(e) => println!("JSON decode error: {e}"),
        },
        Err(e) => {
            println!("error: {e}");
        }
    }
}

pub async fn delete_record(uri: &str, user: &str, id: i64) {
    let mut resource = Resource::new(uri).unwrap();
    resource.push("api").push("records").push(&id.to_string());

    let client = Client::new();
    let result = client
        .delete(resource.to_string())
        .header(PRINCIPAL_HEADER, user)
        .send()
        .await;
    match result {
        Ok(x) => {
            println!("record {id} deleted. Status: {}", x.status());
        }
        Err(e) => {
            println!("delete error: {e}");
        }
    }
}

/// Fetches a record's metadata and runs the preview state machine on it,
/// reporting where it ends up.
pub async fn preview_file(uri: &str, user: &str, id: i64) {
    let mut resource = Resource::new(uri).unwrap();
    resource.push("api").push("records").push(&id.to_string());

    let client = Client::new();
    let result = client
        .get(resource.to_string())
        .header(PRINCIPAL_HEADER, user)
        .send()
        .await;
    let record: DocumentRecord = match result {
        Ok(response) => match response.json().await {
            Ok(r) => r,
            Err(e) => {
                println!("JSON decode error: {e}");
                return;
            }
        },
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };

    let mut content = Resource::new(uri).unwrap();
    content.push("api").push("files").push(&id.to_string());

    let content_type = record.content_type.unwrap_or_default();
    let mut loader = preview::PreviewLoader::new(None);
    loader
        .open(id, &content_type, &content.to_string(), user)
        .await;
    match loader.state() {
        preview::PreviewState::Ready(document) => {
            println!(
                "{} ({}): {} byte(s) ready for preview",
                record.name,
                document.content_type,
                document.bytes.len()
            );
        }
        preview::PreviewState::Error { message, .. } => {
            println!("{}: {message}", record.name);
        }
        _ => {}
    }
}

/// Downloads a zip archive of the selected records into `output`.
pub async fn export_records(uri: &str, user: &str, ids: &[i64], output: &str) {
    let mut resource = Resource::new(uri).unwrap();
    resource.push("api").push("export");

    let client = Client::new();
    let result = client
        .post(resource.to_string())
        .header(PRINCIPAL_HEADER, user)
        .json(&serde_json::json!({ "ids": ids }))
        .send()
        .await;
    match result {
        Ok(response) => {
            if !response.status().is_success() {
                println!("export refused. Status: {}", response.status());
                return;
            }
            match response.bytes().await {
                Ok(data) => match File::create(output).await {
                    Ok(mut f) => {
                        if let Err(e) = f.write_all(&data).await {
                            println!("archive not written: {e}");
                        } else {
                            println!("{} byte(s) written to {output}", data.len());
                        }
                    }
                    Err(e) => println!("cannot create {output}: {e}"),
                },
                Err(e) => println!("archive not read: {e}"),
            }
        }
        Err(e) => {
            println!("export error: {e}");
        }
    }
}
