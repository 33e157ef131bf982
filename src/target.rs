//! Build target descriptor.
//!
//! A [`Target`] describes what gets packaged: the compiled binary, the output
//! directory, and any auxiliary directories or symlinks to stage alongside
//! the binary. The descriptor is supplied by the caller and never mutated by
//! this crate.

use std::path::PathBuf;

/// Description of one build target to package.
///
/// # Examples
///
/// ```
/// use appimage_packager::{DirectoryMapping, Target};
///
/// let target = Target {
///     output: "/tmp/out".into(),
///     binary: "/tmp/build/myapp".into(),
///     directories: vec![DirectoryMapping {
///         from: "/tmp/build/assets".into(),
///         to: None,
///     }],
///     symlinks: Vec::new(),
/// };
/// assert_eq!(target.output, std::path::PathBuf::from("/tmp/out"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Target {
    /// Directory receiving the application directory, the staging directory,
    /// and the final artifact.
    pub output: PathBuf,

    /// Path to the compiled binary to package.
    pub binary: PathBuf,

    /// Extra directories mirrored into the application directory.
    ///
    /// Default: empty
    pub directories: Vec<DirectoryMapping>,

    /// Symlinks created inside the application directory.
    ///
    /// Default: empty
    pub symlinks: Vec<SymlinkMapping>,
}

impl Target {
    /// Creates a target for a binary with no extra directories or symlinks.
    pub fn new(binary: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            binary: binary.into(),
            directories: Vec::new(),
            symlinks: Vec::new(),
        }
    }
}

/// Request to mirror one directory into the application directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryMapping {
    /// Source directory to mirror.
    pub from: PathBuf,

    /// Destination relative to the application directory.
    ///
    /// Default: None (the source directory's base name)
    pub to: Option<PathBuf>,
}

/// Request to create one symlink inside the application directory.
///
/// `from` names the existing entry the link points at and `to` names the
/// link to create; both are resolved against the application directory when
/// relative.
#[derive(Debug, Clone, Default)]
pub struct SymlinkMapping {
    /// Path the link points at.
    pub from: PathBuf,

    /// Path of the link itself.
    pub to: PathBuf,
}
