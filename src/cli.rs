//! Command line argument parsing and execution.
//!
//! This module provides minimal CLI argument parsing. The binary is designed
//! to "just work": point it at a compiled binary, it packages an AppImage.

use clap::Parser;
use std::path::PathBuf;

use crate::bail;
use crate::builder::AppImageBuilder;
use crate::config::{Configuration, Settings};
use crate::error::Result;
use crate::registry::ProcessRegistry;
use crate::target::{DirectoryMapping, SymlinkMapping, Target};

/// Package a compiled binary as an AppImage
#[derive(Parser, Debug)]
#[command(
    name = "appimage-packager",
    version,
    about = "Package a compiled binary as an AppImage",
    long_about = "Stage a compiled binary into an application directory and run app-builder
to produce an .AppImage.

Usage:
  appimage-packager <binary> --output <dir>
  appimage-packager target/release/myapp --output dist --product-name \"My App\"
  appimage-packager target/release/myapp --output dist --directory assets:usr/share/assets"
)]
pub struct Args {
    /// Compiled binary to package
    #[arg(index = 1, value_name = "BINARY")]
    pub binary: PathBuf,

    /// Directory receiving the staging trees and the final artifact
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Human-readable product name (default: the binary's file stem)
    #[arg(long, value_name = "NAME")]
    pub product_name: Option<String>,

    /// Artifact base name, producing <output>/<name>.AppImage (default: the
    /// binary's file stem)
    #[arg(long, value_name = "NAME")]
    pub product_file_name: Option<String>,

    /// Executable name inside the application directory (default: the
    /// binary's file stem)
    #[arg(long, value_name = "NAME")]
    pub executable_name: Option<String>,

    /// Extra directory to stage, repeatable; TO is relative to the
    /// application directory and defaults to FROM's base name
    #[arg(long = "directory", value_name = "FROM[:TO]", value_parser = parse_directory)]
    pub directories: Vec<DirectoryMapping>,

    /// Symlink to create inside the application directory, repeatable
    #[arg(long = "symlink", value_name = "TARGET:LINK", value_parser = parse_symlink)]
    pub symlinks: Vec<SymlinkMapping>,

    /// License file forwarded to the packaging tool
    #[arg(long, value_name = "FILE")]
    pub license: Option<PathBuf>,

    /// Template tree seeded into the application directory
    #[arg(long, value_name = "DIR")]
    pub template: Option<PathBuf>,

    /// Path of the app-builder binary (default: resolved from PATH)
    #[arg(long, value_name = "FILE")]
    pub tool: Option<PathBuf>,

    /// Keep the staging directories after the build for inspection
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        // The binary's file name seeds the staged copy and every default name
        if self.binary.file_name().is_none() {
            return Err(format!(
                "binary path `{}` has no file name",
                self.binary.display()
            ));
        }

        Ok(())
    }

    fn binary_stem(&self) -> String {
        self.binary
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn target(&self) -> Target {
        Target {
            output: self.output.clone(),
            binary: self.binary.clone(),
            directories: self.directories.clone(),
            symlinks: self.symlinks.clone(),
        }
    }

    fn configuration(&self) -> Configuration {
        let stem = self.binary_stem();
        Configuration {
            product_name: self.product_name.clone().unwrap_or_else(|| stem.clone()),
            product_file_name: self
                .product_file_name
                .clone()
                .unwrap_or_else(|| stem.clone()),
            executable_name: self.executable_name.clone().unwrap_or(stem),
            ..Configuration::default()
        }
    }

    fn settings(&self) -> Settings {
        let mut settings = Settings {
            license: self.license.clone(),
            debug: self.debug,
            tool: self.tool.clone(),
            ..Settings::default()
        };
        if let Some(template) = &self.template {
            settings.template_dir = template.clone();
        }
        settings
    }
}

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute(args).await
}

/// Run one full `init` / `build` / `cleanup` cycle for the parsed arguments.
///
/// The working directories are cleaned up even when the build fails; a build
/// error takes precedence over a cleanup error in the returned result.
pub async fn execute(args: Args) -> Result<i32> {
    if let Err(message) = args.validate() {
        bail!(message);
    }

    let builder = AppImageBuilder::new(
        args.target(),
        args.configuration(),
        args.settings(),
        ProcessRegistry::new(),
    )?;

    builder.init().await?;
    let outcome = builder.build().await;
    let cleanup = builder.cleanup().await;

    let artifact = outcome?;
    cleanup?;

    if let Some(artifact) = artifact {
        println!("{}", serde_json::to_string(&artifact)?);
    }

    Ok(0)
}

fn parse_directory(value: &str) -> std::result::Result<DirectoryMapping, String> {
    let (from, to) = match value.split_once(':') {
        Some((from, to)) if !to.is_empty() => (from, Some(to)),
        Some((from, _)) => (from, None),
        None => (value, None),
    };
    if from.is_empty() {
        return Err(format!("expected FROM[:TO], got `{value}`"));
    }
    Ok(DirectoryMapping {
        from: PathBuf::from(from),
        to: to.map(PathBuf::from),
    })
}

fn parse_symlink(value: &str) -> std::result::Result<SymlinkMapping, String> {
    let (from, to) = value
        .split_once(':')
        .ok_or_else(|| format!("expected TARGET:LINK, got `{value}`"))?;
    if from.is_empty() || to.is_empty() {
        return Err(format!("expected TARGET:LINK, got `{value}`"));
    }
    Ok(SymlinkMapping {
        from: PathBuf::from(from),
        to: PathBuf::from(to),
    })
}
