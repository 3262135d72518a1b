use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

/// Environment variables the server reads on startup. Their values end
/// up in bug reports, so none of them may carry secrets.
const RELEVANT_VARIABLES: &[&str] = &[
    "DOCSTORE_META_FILE",
    "DOCSTORE_BLOB_FILE",
    "DOCSTORE_DATA_DIR",
    "DOCSTORE_PORT",
    "DOCSTORE_MAX_UPLOAD_BYTES",
    "DOCSTORE_PENDING_TIMEOUT_SECS",
    "RUST_LOG",
];

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(RELEVANT_VARIABLES))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
