//! Configuration structures for AppImage packaging.
//!
//! This module provides the configuration object handed verbatim to the
//! external packaging tool, plus behavior settings that stay local to this
//! crate (debug mode, license, template and tool locations).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Packaging configuration forwarded to the external tool.
///
/// Serialized to JSON (camelCase keys) and passed on the tool's command line
/// via `--configuration=<JSON>`. The field set matches the AppImage
/// configuration understood by `app-builder`; everything here is opaque to
/// this crate beyond naming the output artifact.
///
/// Every field defaults to an empty value, so a minimal configuration only
/// needs the product file name:
///
/// # Examples
///
/// ```
/// use appimage_packager::Configuration;
///
/// let configuration = Configuration {
///     product_name: "My App".into(),
///     product_file_name: "MyApp".into(),
///     executable_name: "myapp".into(),
///     ..Configuration::default()
/// };
/// assert!(configuration.icons.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Human-readable product name shown in desktop integration.
    ///
    /// Default: empty
    #[serde(default)]
    pub product_name: String,

    /// Base name of the final artifact; the output file is
    /// `<output>/<product_file_name>.AppImage`.
    ///
    /// Default: empty
    #[serde(default)]
    pub product_file_name: String,

    /// Name of the executable inside the application directory.
    ///
    /// Default: empty
    #[serde(default)]
    pub executable_name: String,

    /// System integration mode requested from the tool.
    ///
    /// Default: empty (tool default)
    #[serde(default)]
    pub system_integration: String,

    /// Contents of the `.desktop` entry to embed.
    ///
    /// Default: empty
    #[serde(default)]
    pub desktop_entry: String,

    /// File associations to register on install.
    ///
    /// Default: empty
    #[serde(default)]
    pub file_associations: Vec<FileAssociation>,

    /// Icon set bundled into the image.
    ///
    /// Default: empty
    #[serde(default)]
    pub icons: Vec<Icon>,
}

/// A file extension association registered by the packaged application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAssociation {
    /// File extension without the leading dot (e.g. `txt`).
    pub ext: String,

    /// MIME type the extension maps to (e.g. `text/plain`).
    pub mime_type: String,
}

/// An icon entry bundled into the image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
    /// Path to the icon file.
    pub file: PathBuf,

    /// Square pixel size of the icon.
    pub size: u32,
}

/// Behavior settings for one packaging run.
///
/// Unlike [`Configuration`], nothing here is forwarded to the external tool
/// as JSON; these knobs steer staging, cleanup, and tool resolution inside
/// this crate.
///
/// # Examples
///
/// ```
/// use appimage_packager::Settings;
///
/// let settings = Settings {
///     debug: true,
///     ..Settings::default()
/// };
/// assert!(settings.license.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    /// License file forwarded to the tool as `--license <path>`.
    ///
    /// Default: None
    pub license: Option<PathBuf>,

    /// Keep the staging and application directories during cleanup.
    ///
    /// Default: false
    pub debug: bool,

    /// Template tree mirrored into the application directory by `init`.
    ///
    /// Default: a `template` directory next to the current executable
    pub template_dir: PathBuf,

    /// Explicit path to the packaging tool binary.
    ///
    /// Default: None (resolved from `PATH` as `app-builder`)
    pub tool: Option<PathBuf>,

    /// Explicit path to the auxiliary compression tool.
    ///
    /// Default: None (resolved from `PATH` as `7za`)
    pub seven_zip: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            license: None,
            debug: false,
            template_dir: default_template_dir(),
            tool: None,
            seven_zip: None,
        }
    }
}

fn default_template_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("template")))
        .unwrap_or_else(|| PathBuf::from("template"))
}
