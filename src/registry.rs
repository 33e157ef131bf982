//! Shared-process registry and reference counting.
//!
//! Concurrent `build` calls that target the same staging directory must
//! share a single external packaging process. This module provides the
//! registry that maps a staging directory to its pending process
//! description, and the counting protocol that decides which caller spawns
//! it: every caller increments the active count when it acquires the entry
//! and decrements after staging; the caller whose decrement drops the count
//! to zero claims the one and only spawn.
//!
//! The registry is an explicit value injected into each builder, never a
//! process-wide singleton, so independent pipelines and tests get isolated
//! lifecycles.

use crate::error::Result;
use std::{
    collections::{hash_map::Entry, HashMap},
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Snapshot of everything needed to spawn the external packaging tool.
///
/// Built once per `build` call; the instance stored with the first
/// registration of a staging directory is the one that eventually runs,
/// regardless of which caller performs the spawn.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    program: PathBuf,
    args: Vec<OsString>,
    output_name: PathBuf,
    path_prepend: Option<PathBuf>,
}

impl ToolInvocation {
    /// Creates an invocation description.
    ///
    /// `path_prepend` names a directory to put in front of the inherited
    /// `PATH` when the process is spawned, if any.
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
        output_name: impl Into<PathBuf>,
        path_prepend: Option<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            output_name: output_name.into(),
            path_prepend,
        }
    }

    /// Program to execute.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Final artifact path reported back with the tool's output.
    pub fn output_name(&self) -> &Path {
        &self.output_name
    }

    /// Directory prepended to the inherited `PATH`, if any.
    pub fn path_prepend(&self) -> Option<&Path> {
        self.path_prepend.as_deref()
    }
}

/// State of one pending external process.
///
/// Tracks the invocation to run, how many `build` calls are currently using
/// the entry, and whether the process has been spawned already.
#[derive(Debug)]
pub struct ManagedProcess {
    invocation: ToolInvocation,
    active: u32,
    opened: bool,
}

impl ManagedProcess {
    /// Creates an unopened process description with no active callers.
    pub fn new(invocation: ToolInvocation) -> Self {
        Self {
            invocation,
            active: 0,
            opened: false,
        }
    }
}

/// Shared handle to a [`ManagedProcess`].
///
/// All callers that looked up the same staging directory hold clones of the
/// same handle; counter updates are atomic with respect to each other.
#[derive(Debug, Clone)]
pub struct SharedProcess {
    inner: Arc<Mutex<ManagedProcess>>,
}

impl SharedProcess {
    fn new(process: ManagedProcess) -> Self {
        Self {
            inner: Arc::new(Mutex::new(process)),
        }
    }

    /// Marks one more `build` call as actively using this process.
    pub fn activate(&self) {
        let mut process = lock(&self.inner);
        process.active += 1;
    }

    /// Marks one `build` call as done staging.
    ///
    /// Returns `true` exactly once per process lifetime: for the caller
    /// whose decrement drops the active count to zero while the process has
    /// not been opened yet. That caller must spawn the process; every other
    /// caller observes `false` and returns without a result.
    pub fn deactivate(&self) -> bool {
        let mut process = lock(&self.inner);
        process.active = process.active.saturating_sub(1);
        if process.active == 0 && !process.opened {
            process.opened = true;
            true
        } else {
            false
        }
    }

    /// Releases one `build` call's reference without spawn eligibility.
    ///
    /// Used when staging fails: the count stays balanced so a later
    /// successful call can still claim the spawn, but a call that never
    /// finished staging can never be the one that spawns.
    pub fn release(&self) {
        let mut process = lock(&self.inner);
        process.active = process.active.saturating_sub(1);
    }

    /// Snapshot of the invocation stored at registration time.
    pub fn invocation(&self) -> ToolInvocation {
        lock(&self.inner).invocation.clone()
    }

    /// Whether the spawn has been claimed already.
    pub fn is_opened(&self) -> bool {
        lock(&self.inner).opened
    }

    /// Number of `build` calls currently staging against this process.
    pub fn active_count(&self) -> u32 {
        lock(&self.inner).active
    }
}

/// Registry of pending processes keyed by staging directory.
///
/// Cloning the registry yields another handle to the same underlying map,
/// so a registry can be shared across builders and tasks.
///
/// # Examples
///
/// ```
/// use appimage_packager::ProcessRegistry;
///
/// let registry = ProcessRegistry::new();
/// assert!(!registry.is_registered("/tmp/out/stage".as_ref()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<PathBuf, SharedProcess>>>,
}

impl ProcessRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process registered under `stage_key`, creating and
    /// registering one from `factory` when absent.
    ///
    /// `factory` runs only for a vacant key, so callers that join an
    /// existing process skip the cost of assembling an invocation. When it
    /// fails, nothing is registered and the error passes through.
    pub fn lookup_or_create(
        &self,
        stage_key: &Path,
        factory: impl FnOnce() -> Result<ManagedProcess>,
    ) -> Result<SharedProcess> {
        let mut processes = lock(&self.inner);
        let process = match processes.entry(stage_key.to_path_buf()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(SharedProcess::new(factory()?)).clone(),
        };
        Ok(process)
    }

    /// Drops the entry for `stage_key`, if any.
    ///
    /// Idempotent; a subsequent lookup creates a fresh process.
    pub fn remove(&self, stage_key: &Path) {
        let mut processes = lock(&self.inner);
        processes.remove(stage_key);
    }

    /// Drops the entry for `stage_key` while it is still `process`.
    ///
    /// A finished run deregisters late, after its payload-time removal
    /// already freed the key; by then a newer `build` call may have
    /// registered a fresh process under the same key. That registration
    /// belongs to the newer call and is left alone.
    pub fn deregister(&self, stage_key: &Path, process: &SharedProcess) {
        let mut processes = lock(&self.inner);
        let owned = processes
            .get(stage_key)
            .is_some_and(|registered| Arc::ptr_eq(&registered.inner, &process.inner));
        if owned {
            processes.remove(stage_key);
        }
    }

    /// Whether a process is currently registered under `stage_key`.
    pub fn is_registered(&self, stage_key: &Path) -> bool {
        lock(&self.inner).contains_key(stage_key)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(output: &str) -> ToolInvocation {
        ToolInvocation::new("app-builder", Vec::new(), output, None)
    }

    fn register(registry: &ProcessRegistry, key: &Path, output: &str) -> SharedProcess {
        registry
            .lookup_or_create(key, || Ok(ManagedProcess::new(invocation(output))))
            .expect("register process")
    }

    #[test]
    fn lookup_reuses_the_first_registration() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");

        let first = register(&registry, key, "/tmp/out/First.AppImage");
        let second = register(&registry, key, "/tmp/out/Second.AppImage");

        assert_eq!(
            second.invocation().output_name(),
            Path::new("/tmp/out/First.AppImage")
        );
        assert!(Arc::ptr_eq(&first.inner, &second.inner));
    }

    #[test]
    fn a_registered_key_skips_the_factory() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");
        register(&registry, key, "/tmp/out/A");

        // sharing callers never pay for invocation assembly
        let shared = registry
            .lookup_or_create(key, || panic!("factory ran for an occupied key"))
            .expect("shared process");
        assert_eq!(shared.invocation().output_name(), Path::new("/tmp/out/A"));
    }

    #[test]
    fn a_failed_factory_leaves_the_key_vacant() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");

        let failed = registry.lookup_or_create(key, || {
            Err(crate::error::Error::GenericError("tool not found".into()))
        });

        assert!(failed.is_err());
        assert!(!registry.is_registered(key));
    }

    #[test]
    fn single_caller_claims_the_spawn() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");
        let process = register(&registry, key, "/tmp/out/A");

        process.activate();
        assert_eq!(process.active_count(), 1);
        assert!(process.deactivate());
        assert!(process.is_opened());
    }

    #[test]
    fn only_the_last_of_concurrent_callers_claims() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");
        let process = register(&registry, key, "/tmp/out/A");

        process.activate();
        process.activate();

        assert!(!process.deactivate());
        assert!(!process.is_opened());
        assert!(process.deactivate());
        assert!(process.is_opened());
    }

    #[test]
    fn opened_process_is_never_claimed_again() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");
        let process = register(&registry, key, "/tmp/out/A");

        process.activate();
        assert!(process.deactivate());

        // a late caller that found the entry before removal
        process.activate();
        assert!(!process.deactivate());
    }

    #[test]
    fn removal_allows_a_fresh_process() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");

        let process = register(&registry, key, "/tmp/out/A");
        process.activate();
        assert!(process.deactivate());
        assert!(registry.is_registered(key));

        registry.remove(key);
        assert!(!registry.is_registered(key));

        let fresh = register(&registry, key, "/tmp/out/B");
        assert!(!fresh.is_opened());
        assert_eq!(fresh.invocation().output_name(), Path::new("/tmp/out/B"));

        // removing a missing key is fine
        registry.remove(Path::new("/tmp/other"));
    }

    #[test]
    fn deregister_ignores_a_foreign_registration() {
        let registry = ProcessRegistry::new();
        let key = Path::new("/tmp/out/stage");
        let original = register(&registry, key, "/tmp/out/A");

        // payload-time drop by the run that owns the entry
        registry.deregister(key, &original);
        assert!(!registry.is_registered(key));

        let replacement = register(&registry, key, "/tmp/out/B");

        // the finished run deregisters again on return; the fresh entry
        // is not its to drop
        registry.deregister(key, &original);
        assert!(registry.is_registered(key));

        let survivor = register(&registry, key, "/tmp/out/C");
        assert!(Arc::ptr_eq(&survivor.inner, &replacement.inner));

        // deregistering a missing key is fine
        registry.deregister(Path::new("/tmp/other"), &original);
    }

    #[test]
    fn release_keeps_the_spawn_claimable() {
        let registry = ProcessRegistry::new();
        let process = register(&registry, Path::new("/tmp/out/stage"), "/tmp/out/A");

        // two callers; the first one fails staging and releases
        process.activate();
        process.activate();
        process.release();
        assert!(!process.is_opened());

        // the surviving caller still claims the spawn
        assert!(process.deactivate());
        assert!(process.is_opened());
    }

    #[test]
    fn deactivate_never_underflows() {
        let registry = ProcessRegistry::new();
        let process = register(&registry, Path::new("/tmp/out/stage"), "/tmp/out/A");

        assert!(process.deactivate());
        assert_eq!(process.active_count(), 0);
    }
}
