//! `dllp-connect-user` -- link an existing UCS user to an existing Azure AD
//! user.
//!
//! Dry-run unless `--modify` is given. The exit status tells what failed:
//!
//! | Code | Meaning                               |
//! |------|---------------------------------------|
//! | 0    | linked, or dry-run                    |
//! | 1    | directory user not found              |
//! | 2    | Azure AD user lookup failed           |
//! | 3    | directory modification failed         |
//! | 4    | Azure AD modification failed          |
//! | 5    | connection not initialized            |
//! | 6    | invalid configuration                 |

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use dllp_graph::GraphApi;
use dllp_tools::config::ToolsConfig;
use dllp_tools::connect::{connect_user, load_connection, ConnectArgs, ConnectError};
use dllp_tools::logging;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init("dllp_connect_user=info,dllp_tools=info,dllp_graph=info,dllp_directory=info");

    let request = match ConnectArgs::parse().into_request() {
        Ok(request) => request,
        Err(message) => ConnectArgs::command()
            .error(ErrorKind::ArgumentConflict, message)
            .exit(),
    };

    let config = match ToolsConfig::from_env() {
        Ok(config) => config,
        Err(e) => return report(e.into()),
    };

    let account = match load_connection(&config.office365_dir, &request.alias) {
        Ok(account) => account,
        Err(e) => return report(e),
    };
    let client = match config.http_client() {
        Ok(client) => client,
        Err(e) => return report(ConnectError::HttpClient(e)),
    };
    let graph = GraphApi::with_client(client, config.graph_url.clone(), config.login_url.clone(), account);
    let directory = config.udm();

    tracing::info!(
        uid = %request.uid,
        upn = %request.upn,
        alias = %request.alias,
        modify = request.modify,
        "Connecting users",
    );

    match connect_user(&graph, &directory, &request).await {
        Ok(outcome) => {
            println!("{outcome}");
            ExitCode::SUCCESS
        }
        Err(e) => report(e),
    }
}

fn report(error: ConnectError) -> ExitCode {
    println!("{error}");
    ExitCode::from(error.exit_code())
}
