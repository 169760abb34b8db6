//! permitdb CLI - counting semaphores shared through a database file
//!
//! Binary name: `permitdb`

use std::process;

use permitdb::cli::{handlers::run_cli, EXIT_FAILURE};

#[tokio::main]
async fn main() {
    let code = match run_cli().await {
        Ok(code) => code,
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Error: {err:#}");
            }
            EXIT_FAILURE
        }
    };

    #[allow(clippy::exit)]
    process::exit(code);
}
