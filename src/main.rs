//! Specter server binary.
//!
//! Runs the session server in the current working directory:
//!
//! ```text
//! specter -- vim notes.txt
//! ```
//!
//! The socket lives at `.specter.sock` next to wherever the server was
//! started; clients in the same directory find it there.

use std::path::PathBuf;

use clap::Parser;
use specter::constants::SOCKET_NAME;
use specter::server;

#[derive(Parser)]
#[command(name = "specter", version, about = "Terminal test harness server")]
struct Cli {
    /// Command to run under the pty, given after `--`.
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = server::run(PathBuf::from(SOCKET_NAME), cli.command).await {
        eprintln!("Server error: {e:#}");
        std::process::exit(1);
    }
}
