//! AppImage packaging binary.
//!
//! Stages a compiled binary into the layout expected by `app-builder` and
//! runs the tool to produce the final `.AppImage` artifact.

use appimage_packager::cli;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(error) => {
            eprintln!("Fatal error: {error}");
            process::exit(1);
        }
    }
}
