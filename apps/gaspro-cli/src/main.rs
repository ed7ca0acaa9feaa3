//! # gaspro
//!
//! Operator command line for the GasPro ledger. Setup and commands live in
//! the library so they can be tested.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    gaspro_cli::run().await
}
