//! # AppImage Packager
//!
//! Packaging-plugin adapter that stages a compiled binary (plus auxiliary
//! directories and symlinks) into an application directory tree and drives
//! the external `app-builder` binary to produce an `.AppImage` artifact.
//!
//! ## Features
//!
//! - **Three-step lifecycle**: `init` prepares directories, `build` stages
//!   files and packages them, `cleanup` removes working storage
//! - **Shared processes**: concurrent builds against one staging directory
//!   share a single external tool run through a reference-counted registry
//! - **Fail-fast staging**: filesystem steps run strictly in order and abort
//!   on the first failure
//! - **Opaque tool contract**: the packaging tool's JSON output is passed
//!   through unchanged, annotated with the artifact path
//!
//! ## Usage
//!
//! ```no_run
//! use appimage_packager::{AppImageBuilder, Configuration, ProcessRegistry, Settings, Target};
//!
//! # async fn package() -> appimage_packager::error::Result<()> {
//! let builder = AppImageBuilder::new(
//!     Target::new("/build/myapp", "/build/out"),
//!     Configuration {
//!         product_file_name: "MyApp".into(),
//!         ..Configuration::default()
//!     },
//!     Settings::default(),
//!     ProcessRegistry::new(),
//! )?;
//!
//! builder.init().await?;
//! if let Some(artifact) = builder.build().await? {
//!     println!("{}", artifact.name.display());
//! }
//! builder.cleanup().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod process;
pub mod registry;
pub mod target;

mod utils;

// Re-export main types for public API
pub use builder::AppImageBuilder;
pub use cli::Args;
pub use config::{Configuration, FileAssociation, Icon, Settings};
pub use error::{Context, Error, ErrorExt, Result};
pub use registry::{ManagedProcess, ProcessRegistry, SharedProcess, ToolInvocation};
pub use target::{DirectoryMapping, SymlinkMapping, Target};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artifact reported by a completed packaging run.
///
/// Combines the path of the produced `.AppImage` with whatever fields the
/// packaging tool reported on stdout; the tool payload is opaque to this
/// crate and carried through as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Path of the produced artifact.
    pub name: PathBuf,

    /// Remaining fields of the tool's output payload.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Artifact {
    /// Creates an artifact from the computed output path and the tool's
    /// parsed payload.
    ///
    /// The computed path always wins over a `name` field in the payload.
    pub fn new(
        name: impl Into<PathBuf>,
        mut fields: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        fields.remove("name");
        Self {
            name: name.into(),
            fields,
        }
    }
}
