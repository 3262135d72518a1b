use client::UploadParams;

pub async fn upload_single_file(params: UploadParams) {
    client::upload_file(params).await;
}

pub async fn list_folder(uri: &str, user: &str, folder: &str, search: Option<&str>) {
    client::list_records(uri, user, folder, search).await;
}

pub async fn delete_record(uri: &str, user: &str, id: i64) {
    client::delete_record(uri, user, id).await;
}

pub async fn export_records(uri: &str, user: &str, ids: &[i64], output: &str) {
    client::export_records(uri, user, ids, output).await;
}

pub async fn preview_file(uri: &str, user: &str, id: i64) {
    client::preview_file(uri, user, id).await;
}
