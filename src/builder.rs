//! AppImage build orchestration.
//!
//! [`AppImageBuilder`] implements the three-step packaging lifecycle used by
//! packaging hosts: `init` prepares the working directories, `build` stages
//! the target and drives the shared external packaging process, and
//! `cleanup` removes the working directories again.
//!
//! Concurrent `build` calls that resolve to the same staging directory share
//! one external process through the injected [`ProcessRegistry`]; see
//! [`crate::registry`] for the counting protocol.

use crate::{
    config::{Configuration, Settings},
    error::{Context, ErrorExt, Result},
    process,
    registry::{ManagedProcess, ProcessRegistry, ToolInvocation},
    target::{SymlinkMapping, Target},
    utils::fs as fs_utils,
    Artifact,
};
use path_absolutize::Absolutize;
use std::{ffi::OsString, path::{Path, PathBuf}};
use tokio::fs;

/// Stages a build target and packages it into an `.AppImage`.
///
/// One builder is bound to one target and one output artifact. The working
/// layout under the target's output directory is:
///
/// - `<output>/app` - the application directory (template + binary + extras)
/// - `<output>/stage` - the staging directory consumed by the tool
/// - `<output>/<productFileName>.AppImage` - the final artifact
///
/// # Examples
///
/// ```no_run
/// use appimage_packager::{AppImageBuilder, Configuration, ProcessRegistry, Settings, Target};
///
/// # async fn demo() -> appimage_packager::error::Result<()> {
/// let target = Target::new("/build/myapp", "/build/out");
/// let configuration = Configuration {
///     product_file_name: "MyApp".into(),
///     ..Configuration::default()
/// };
///
/// let builder = AppImageBuilder::new(
///     target,
///     configuration,
///     Settings::default(),
///     ProcessRegistry::new(),
/// )?;
///
/// builder.init().await?;
/// if let Some(artifact) = builder.build().await? {
///     println!("{}", artifact.name.display());
/// }
/// builder.cleanup().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AppImageBuilder {
    target: Target,
    configuration: Configuration,
    settings: Settings,
    registry: ProcessRegistry,
    app_dir: PathBuf,
    stage_dir: PathBuf,
    stage_key: PathBuf,
    output_name: PathBuf,
}

impl AppImageBuilder {
    /// Creates a builder for one target.
    ///
    /// Computes the working-directory layout and the staging key (the
    /// absolutized staging path) under which concurrent builds share an
    /// external process.
    pub fn new(
        target: Target,
        configuration: Configuration,
        settings: Settings,
        registry: ProcessRegistry,
    ) -> Result<Self> {
        let app_dir = target.output.join("app");
        let stage_dir = target.output.join("stage");
        let output_name = target
            .output
            .join(format!("{}.AppImage", configuration.product_file_name));

        let stage_key = stage_dir
            .absolutize()
            .fs_context("resolving stage directory", &stage_dir)?
            .into_owned();

        Ok(Self {
            target,
            configuration,
            settings,
            registry,
            app_dir,
            stage_dir,
            stage_key,
            output_name,
        })
    }

    /// The application directory under the target's output directory.
    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// The staging directory under the target's output directory.
    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    /// Identity under which this builder's external process is registered.
    pub fn stage_key(&self) -> &Path {
        &self.stage_key
    }

    /// Path of the final artifact.
    pub fn output_name(&self) -> &Path {
        &self.output_name
    }

    /// Prepares the working directories.
    ///
    /// Removes a stale artifact left at the output path, creates the staging
    /// and application directories, and mirrors the template tree into the
    /// application directory without deleting anything already there. Steps
    /// run strictly in order; the first failure aborts the rest.
    pub async fn init(&self) -> Result<()> {
        log::info!("Preparing directories for {}", self.output_name.display());

        // 1. Stale artifact from a previous run
        fs_utils::remove_existing(&self.output_name)
            .await
            .context("removing stale artifact")?;

        // 2. Working directories
        fs::create_dir_all(&self.stage_dir)
            .await
            .fs_context("creating staging directory", &self.stage_dir)?;
        fs::create_dir_all(&self.app_dir)
            .await
            .fs_context("creating application directory", &self.app_dir)?;

        // 3. Template skeleton
        fs_utils::mirror(&self.settings.template_dir, &self.app_dir)
            .await
            .context("mirroring template into application directory")?;

        Ok(())
    }

    /// Stages the target and runs the shared packaging process.
    ///
    /// Staging steps run strictly in order and abort on the first failure.
    /// Afterwards the reference-counting protocol decides whether this call
    /// spawns the external process: the call whose staging finishes last
    /// spawns it and returns `Ok(Some(artifact))`; every other concurrent
    /// call sharing the staging directory returns `Ok(None)`.
    pub async fn build(&self) -> Result<Option<Artifact>> {
        let process = self.registry.lookup_or_create(&self.stage_key, || {
            Ok(ManagedProcess::new(self.invocation()?))
        })?;
        process.activate();

        log::info!(
            "Staging {} into {}",
            self.target.binary.display(),
            self.stage_dir.display()
        );
        if let Err(error) = self.stage().await {
            // keep the count balanced so a later call can still claim the spawn
            process.release();
            return Err(error);
        }

        if !process.deactivate() {
            log::debug!(
                "Staging done for {}, spawn owned by another build call",
                self.stage_dir.display()
            );
            return Ok(None);
        }

        let artifact = process::run_tool(&process, &self.registry, &self.stage_key).await?;
        if let Some(artifact) = &artifact {
            log::info!("✓ Created {}", artifact.name.display());
        }
        Ok(artifact)
    }

    /// Removes the staging directory, then the application directory.
    ///
    /// A no-op when the debug setting is set, so failed runs can be
    /// inspected. Callers invoke this once after final use regardless of
    /// whether the build succeeded.
    pub async fn cleanup(&self) -> Result<()> {
        if self.settings.debug {
            log::debug!(
                "Debug set, keeping {} and {}",
                self.stage_dir.display(),
                self.app_dir.display()
            );
            return Ok(());
        }

        fs_utils::remove_dir_all(&self.stage_dir)
            .await
            .context("removing staging directory")?;
        fs_utils::remove_dir_all(&self.app_dir)
            .await
            .context("removing application directory")?;

        Ok(())
    }

    /// Runs the staging steps for one `build` call.
    async fn stage(&self) -> Result<()> {
        // 1. The compiled binary, under its base name
        let basename = self
            .target
            .binary
            .file_name()
            .context("target binary path has no file name")?;
        fs_utils::copy_file(&self.target.binary, &self.app_dir.join(basename))
            .await
            .context("copying target binary")?;

        // 2. Application directory into the staging directory
        fs_utils::mirror(&self.app_dir, &self.stage_dir)
            .await
            .context("mirroring application directory into stage")?;

        // 3. Extra directories, each optional
        for mapping in &self.target.directories {
            match fs::metadata(&mapping.from).await {
                Ok(metadata) if metadata.is_dir() => {}
                Ok(_) => {
                    log::debug!("Skipping {}: not a directory", mapping.from.display());
                    continue;
                }
                Err(error) => {
                    log::debug!("Skipping {}: {error}", mapping.from.display());
                    continue;
                }
            }

            let destination = match &mapping.to {
                Some(to) => self.app_dir.join(to),
                None => {
                    let basename = mapping
                        .from
                        .file_name()
                        .context("extra directory path has no file name")?;
                    self.app_dir.join(basename)
                }
            };

            fs::create_dir_all(&destination)
                .await
                .fs_context("creating extra directory", &destination)?;
            fs_utils::mirror(&mapping.from, &destination)
                .await
                .context("mirroring extra directory")?;
        }

        // 4. Symlinks inside the application directory
        for mapping in &self.target.symlinks {
            self.create_symlink(mapping)?;
        }

        Ok(())
    }

    /// Creates one symlink, storing its target relative to the application
    /// directory.
    fn create_symlink(&self, mapping: &SymlinkMapping) -> Result<()> {
        let points_at = self.app_dir.join(&mapping.from);
        let link = self.app_dir.join(&mapping.to);
        let stored_target = fs_utils::relative_from(&points_at, &self.app_dir);

        log::debug!("Linking {} -> {}", link.display(), stored_target.display());

        let linked = if points_at.is_dir() {
            fs_utils::symlink_dir(&stored_target, &link)
        } else {
            fs_utils::symlink_file(&stored_target, &link)
        };
        linked.fs_context("creating symlink", &link)
    }

    /// Assembles the external tool invocation for this builder.
    fn invocation(&self) -> Result<ToolInvocation> {
        let program = process::resolve_tool(self.settings.tool.as_deref())?;
        let path_prepend = process::resolve_seven_zip_dir(self.settings.seven_zip.as_deref());
        let configuration = serde_json::to_string(&self.configuration)?;

        let mut args: Vec<OsString> = vec![
            "appimage".into(),
            "--no-remove-stage".into(),
            format!("--configuration={configuration}").into(),
            "--output".into(),
            self.output_name.clone().into(),
            "--stage".into(),
            self.stage_dir.clone().into(),
            "--app".into(),
            self.app_dir.clone().into(),
        ];

        if let Some(license) = &self.settings.license {
            args.push("--license".into());
            args.push(license.clone().into());
        }

        Ok(ToolInvocation::new(
            program,
            args,
            self.output_name.clone(),
            path_prepend,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_tool() -> Settings {
        Settings {
            tool: Some("/opt/tools/app-builder".into()),
            seven_zip: Some("/opt/compression/bin/7za".into()),
            ..Settings::default()
        }
    }

    #[test]
    fn new_computes_working_layout() {
        let target = Target::new("/build/myapp", "/build/out");
        let configuration = Configuration {
            product_file_name: "MyApp".into(),
            ..Configuration::default()
        };

        let builder = AppImageBuilder::new(
            target,
            configuration,
            settings_with_tool(),
            ProcessRegistry::new(),
        )
        .expect("builder");

        assert_eq!(builder.app_dir(), Path::new("/build/out/app"));
        assert_eq!(builder.stage_dir(), Path::new("/build/out/stage"));
        assert_eq!(builder.output_name(), Path::new("/build/out/MyApp.AppImage"));
        assert!(builder.stage_key().is_absolute());
    }

    #[test]
    fn invocation_lists_arguments_in_tool_order() {
        let target = Target::new("/build/myapp", "/build/out");
        let configuration = Configuration {
            product_file_name: "MyApp".into(),
            ..Configuration::default()
        };

        let builder = AppImageBuilder::new(
            target,
            configuration,
            settings_with_tool(),
            ProcessRegistry::new(),
        )
        .expect("builder");

        let invocation = builder.invocation().expect("invocation");
        assert_eq!(invocation.program(), Path::new("/opt/tools/app-builder"));
        assert_eq!(
            invocation.path_prepend(),
            Some(Path::new("/opt/compression/bin"))
        );

        let args = invocation.args();
        assert_eq!(args[0], "appimage");
        assert_eq!(args[1], "--no-remove-stage");
        let configuration_arg = args[2].to_string_lossy();
        assert!(configuration_arg.starts_with("--configuration={"));
        assert!(configuration_arg.contains("\"productFileName\":\"MyApp\""));
        assert_eq!(args[3], "--output");
        assert_eq!(args[4], "/build/out/MyApp.AppImage");
        assert_eq!(args[5], "--stage");
        assert_eq!(args[6], "/build/out/stage");
        assert_eq!(args[7], "--app");
        assert_eq!(args[8], "/build/out/app");
        assert_eq!(args.len(), 9);
    }

    #[test]
    fn invocation_appends_license_when_set() {
        let target = Target::new("/build/myapp", "/build/out");
        let settings = Settings {
            license: Some("/build/LICENSE".into()),
            ..settings_with_tool()
        };

        let builder = AppImageBuilder::new(
            target,
            Configuration::default(),
            settings,
            ProcessRegistry::new(),
        )
        .expect("builder");

        let args = builder.invocation().expect("invocation").args().to_vec();
        assert_eq!(args[args.len() - 2], "--license");
        assert_eq!(args[args.len() - 1], "/build/LICENSE");
    }
}
