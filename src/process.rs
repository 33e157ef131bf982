//! External packaging tool invocation.
//!
//! Spawns the `app-builder` binary described by a [`ToolInvocation`],
//! captures its single stdout payload and any stderr output, and maps the
//! exit status onto the crate's error types. The spawn happens at most once
//! per registry entry; the decision of who spawns lives in
//! [`crate::registry`].

use crate::{
    error::{Context, Error, Result},
    registry::{ProcessRegistry, SharedProcess, ToolInvocation},
    Artifact,
};
use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};

/// Name of the external packaging tool resolved from `PATH`.
pub const TOOL: &str = "app-builder";

/// Name of the auxiliary compression tool resolved from `PATH`.
pub const SEVEN_ZIP: &str = "7za";

/// Resolves the packaging tool binary.
///
/// An explicit override wins; otherwise the tool is looked up on `PATH`.
pub fn resolve_tool(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => which::which(TOOL).map_err(|error| Error::ToolNotFound {
            tool: TOOL.into(),
            error,
        }),
    }
}

/// Resolves the directory holding the auxiliary compression tool.
///
/// Returns `None` with a warning when the tool cannot be found; the
/// packaging tool then runs with an unmodified search path.
pub fn resolve_seven_zip_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    let located = match explicit {
        Some(path) => path.to_path_buf(),
        None => match which::which(SEVEN_ZIP) {
            Ok(path) => path,
            Err(error) => {
                log::warn!("{SEVEN_ZIP} not found on PATH, continuing without it: {error}");
                return None;
            }
        },
    };
    located.parent().map(Path::to_path_buf)
}

/// Runs the packaging tool once and collects its result.
///
/// On the first stdout line the payload is parsed as a JSON object, the
/// tool is stopped, and `process`'s registration under `stage_key` is
/// dropped so later builds start a fresh process. A non-zero exit code
/// fails the call with the accumulated stderr text. The call only ever
/// drops its own registration; an entry a later build registered under the
/// same key after the payload-time drop stays untouched.
///
/// Returns `Ok(None)` when the tool finished without reporting a payload.
pub async fn run_tool(
    process: &SharedProcess,
    registry: &ProcessRegistry,
    stage_key: &Path,
) -> Result<Option<Artifact>> {
    let invocation = process.invocation();
    let result = run_tool_inner(&invocation, process, registry, stage_key).await;
    // failure paths where no payload arrived still own the entry
    registry.deregister(stage_key, process);
    result
}

async fn run_tool_inner(
    invocation: &ToolInvocation,
    process: &SharedProcess,
    registry: &ProcessRegistry,
    stage_key: &Path,
) -> Result<Option<Artifact>> {
    log::info!(
        "Running {} for {}",
        invocation.program().display(),
        invocation.output_name().display()
    );
    log::debug!("Tool arguments: {:?}", invocation.args());

    let mut command = Command::new(invocation.program());
    command
        .args(invocation.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = invocation.path_prepend() {
        command.env("PATH", prepend_to_path(dir));
    }

    let mut child = command.spawn().map_err(|error| Error::CommandFailed {
        command: invocation.program().display().to_string(),
        error,
    })?;

    // Capture stderr in the background while stdout is awaited
    let stderr_handle = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            let mut captured_lines = Vec::new();

            while let Ok(Some(line)) = lines.next_line().await {
                captured_lines.push(line);
            }

            captured_lines
        })
    });

    let mut artifact = None;
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        if let Ok(Some(line)) = lines.next_line().await {
            log::debug!("Tool reported: {line}");
            match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&line) {
                Ok(fields) => {
                    artifact = Some(Artifact::new(invocation.output_name(), fields));
                    // one payload is the whole stdout contract; stop the tool
                    // and free the key for a fresh process
                    child.start_kill().ok();
                    registry.deregister(stage_key, process);
                }
                Err(error) => {
                    child.start_kill().ok();
                    let _ = child.wait().await;
                    return Err(error.into()).context("parsing packaging tool output");
                }
            }
        }
    }

    let status = child.wait().await.map_err(|error| Error::CommandFailed {
        command: invocation.program().display().to_string(),
        error,
    })?;

    let stderr_lines = match stderr_handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    };

    if let Some(code) = status.code().filter(|code| *code != 0) {
        return Err(Error::ToolFailed {
            code: Some(code),
            stderr: stderr_lines.join("\n"),
        });
    }

    if !stderr_lines.is_empty() {
        log::debug!("Tool stderr: {}", stderr_lines.join("\n"));
    }

    Ok(artifact)
}

fn prepend_to_path(dir: &Path) -> OsString {
    let current = env::var_os("PATH").unwrap_or_default();
    let paths = std::iter::once(dir.to_path_buf()).chain(env::split_paths(&current));
    env::join_paths(paths).unwrap_or(current)
}
