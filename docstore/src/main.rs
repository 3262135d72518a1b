use clap::{arg, command, crate_name, value_parser, Command};
use client::UploadParams;

mod cli;

#[tokio::main]
async fn main() {
    let cli = command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            Command::new(cli::UPLOAD_SUBCOMMAND)
                .about(cli::UPLOAD_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Docstore URI"))
                .arg(
                    arg!(--user <USER>)
                        .required(true)
                        .help("Acting principal"),
                )
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .help("Path to file to upload"),
                )
                .arg(
                    arg!(-p --path <PATH>)
                        .required(false)
                        .default_value("")
                        .help("Destination folder path, empty for the root"),
                )
                .arg(
                    arg!(--shared)
                        .required(false)
                        .help("Make the file visible to every principal"),
                ),
        )
        .subcommand(
            Command::new(cli::LIST_SUBCOMMAND)
                .about(cli::LIST_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Docstore URI"))
                .arg(
                    arg!(--user <USER>)
                        .required(true)
                        .help("Acting principal"),
                )
                .arg(
                    arg!(-p --path <PATH>)
                        .required(false)
                        .default_value("")
                        .help("Folder path to list, empty for the root"),
                )
                .arg(
                    arg!(-s --search <SEARCH>)
                        .required(false)
                        .help("Case-insensitive name filter"),
                ),
        )
        .subcommand(
            Command::new(cli::DELETE_SUBCOMMAND)
                .about(cli::DELETE_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Docstore URI"))
                .arg(
                    arg!(--user <USER>)
                        .required(true)
                        .help("Acting principal"),
                )
                .arg(
                    arg!(-i --id <ID>)
                        .required(true)
                        .value_parser(value_parser!(i64))
                        .help("Record id to delete"),
                ),
        )
        .subcommand(
            Command::new(cli::EXPORT_SUBCOMMAND)
                .about(cli::EXPORT_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Docstore URI"))
                .arg(
                    arg!(--user <USER>)
                        .required(true)
                        .help("Acting principal"),
                )
                .arg(
                    arg!(-i --ids <IDS>)
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(i64))
                        .help("Record ids to bundle"),
                )
                .arg(
                    arg!(-o --output <OUTPUT>)
                        .required(true)
                        .help("Path of the zip archive to write"),
                ),
        )
        .subcommand(
            Command::new(cli::PREVIEW_SUBCOMMAND)
                .about(cli::PREVIEW_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Docstore URI"))
                .arg(
                    arg!(--user <USER>)
                        .required(true)
                        .help("Acting principal"),
                )
                .arg(
                    arg!(-i --id <ID>)
                        .required(true)
                        .value_parser(value_parser!(i64))
                        .help("Record id to preview"),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
        .get_matches();

    if cli.subcommand_matches(cli::VERSION_SUBCOMMAND).is_some() {
        cli::version::run();
    } else if cli.subcommand_matches(cli::BUGREPORT_SUBCOMMAND).is_some() {
        cli::bugreport::run();
    } else if let Some(server_matches) = cli.subcommand_matches(cli::SERVER_SUBCOMMAND) {
        cli::server::run(server_matches).await;
    } else if let Some(upload_matches) = cli.subcommand_matches(cli::UPLOAD_SUBCOMMAND) {
        let params = UploadParams {
            uri: upload_matches.get_one::<String>("uri").unwrap().clone(),
            user: upload_matches.get_one::<String>("user").unwrap().clone(),
            file: upload_matches.get_one::<String>("file").unwrap().clone(),
            folder: upload_matches.get_one::<String>("path").unwrap().clone(),
            shared: upload_matches.get_flag("shared"),
        };
        cli::client::upload_single_file(params).await;
    } else if let Some(list_matches) = cli.subcommand_matches(cli::LIST_SUBCOMMAND) {
        let uri = list_matches.get_one::<String>("uri").unwrap();
        let user = list_matches.get_one::<String>("user").unwrap();
        let path = list_matches.get_one::<String>("path").unwrap();
        let search = list_matches.get_one::<String>("search").map(String::as_str);
        cli::client::list_folder(uri, user, path, search).await;
    } else if let Some(delete_matches) = cli.subcommand_matches(cli::DELETE_SUBCOMMAND) {
        let uri = delete_matches.get_one::<String>("uri").unwrap();
        let user = delete_matches.get_one::<String>("user").unwrap();
        let id = delete_matches.get_one::<i64>("id").unwrap();
        cli::client::delete_record(uri, user, *id).await;
    } else if let Some(export_matches) = cli.subcommand_matches(cli::EXPORT_SUBCOMMAND) {
        let uri = export_matches.get_one::<String>("uri").unwrap();
        let user = export_matches.get_one::<String>("user").unwrap();
        let ids: Vec<i64> = export_matches
            .get_many::<i64>("ids")
            .unwrap()
            .copied()
            .collect();
        let output = export_matches.get_one::<String>("output").unwrap();
        cli::client::export_records(uri, user, &ids, output).await;
    } else if let Some(preview_matches) = cli.subcommand_matches(cli::PREVIEW_SUBCOMMAND) {
        let uri = preview_matches.get_one::<String>("uri").unwrap();
        let user = preview_matches.get_one::<String>("user").unwrap();
        let id = preview_matches.get_one::<i64>("id").unwrap();
        cli::client::preview_file(uri, user, *id).await;
    }
}
