//! File system utilities for staging.
//!
//! Provides safe file operations with automatic directory creation,
//! symlink preservation, and comprehensive error handling.

use crate::error::Result;
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use tokio::fs;

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(fs::remove_dir_all(path).await?)
    } else {
        Ok(())
    }
}

/// Removes whatever currently occupies the given path.
///
/// Handles regular files, directories, and dangling symlinks alike.
/// Succeeds silently when nothing exists at the path.
pub async fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(fs::remove_dir_all(path).await?),
        Ok(_) => Ok(fs::remove_file(path).await?),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Makes a symbolic link to a directory.
#[cfg(unix)]
pub fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a directory.
#[cfg(windows)]
pub fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(unix)]
pub fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(windows)]
pub fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(crate::error::Error::GenericError(format!(
            "{from:?} does not exist"
        )));
    }
    if !from.is_file() {
        return Err(crate::error::Error::GenericError(format!(
            "{from:?} is not a file"
        )));
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir).await?;
    }
    fs::copy(from, to).await?;
    Ok(())
}

/// Recursively mirrors a directory into another as a non-destructive merge.
///
/// Files present in both trees are overwritten with the source version;
/// entries that exist only in the destination are left untouched. Symlinks
/// are recreated rather than followed. Parent directories of the destination
/// are created as necessary.
///
/// Fails if the source path is not a directory or doesn't exist.
pub async fn mirror(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(crate::error::Error::GenericError(format!(
            "{from:?} does not exist"
        )));
    }
    if !from.is_dir() {
        return Err(crate::error::Error::GenericError(format!(
            "{from:?} is not a directory"
        )));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }

    for entry in walkdir::WalkDir::new(from) {
        let entry = entry?;
        debug_assert!(entry.path().starts_with(from));
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path()).await?;
            // a stale link at the destination blocks recreation
            if fs::symlink_metadata(&dest_path).await.is_ok() {
                fs::remove_file(&dest_path).await?;
            }
            if entry.path().is_dir() {
                symlink_dir(&target, &dest_path)?;
            } else {
                symlink_file(&target, &dest_path)?;
            }
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(dest_path).await?;
        } else {
            fs::copy(entry.path(), dest_path).await?;
        }
    }

    Ok(())
}

/// Computes the path of `path` relative to `base`.
///
/// Both paths are compared component-wise; the result climbs out of the
/// unshared tail of `base` with `..` segments and then descends into the
/// unshared tail of `path`. Returns `.` when the paths are equal. Neither
/// path is resolved against the filesystem.
pub fn relative_from(path: &Path, base: &Path) -> PathBuf {
    let path_components: Vec<Component<'_>> = path.components().collect();
    let base_components: Vec<Component<'_>> = base.components().collect();

    let common = path_components
        .iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_components.len() {
        relative.push("..");
    }
    for component in &path_components[common..] {
        relative.push(component);
    }

    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_file_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("source.bin");
        std::fs::write(&source, b"payload").expect("write source");

        let dest = dir.path().join("nested/deeper/copy.bin");
        copy_file(&source, &dest).await.expect("copy");

        assert_eq!(std::fs::read(&dest).expect("read copy"), b"payload");
    }

    #[tokio::test]
    async fn copy_file_rejects_missing_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent");
        let dest = dir.path().join("copy");

        assert!(copy_file(&missing, &dest).await.is_err());
    }

    #[tokio::test]
    async fn mirror_merges_without_deleting_extras() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(src.join("sub")).expect("mkdir src");
        std::fs::create_dir_all(&dst).expect("mkdir dst");
        std::fs::write(src.join("shared.txt"), b"new").expect("write shared");
        std::fs::write(src.join("sub/inner.txt"), b"inner").expect("write inner");
        std::fs::write(dst.join("shared.txt"), b"old").expect("write old shared");
        std::fs::write(dst.join("extra.txt"), b"keep").expect("write extra");

        mirror(&src, &dst).await.expect("mirror");

        assert_eq!(std::fs::read(dst.join("shared.txt")).expect("shared"), b"new");
        assert_eq!(std::fs::read(dst.join("extra.txt")).expect("extra"), b"keep");
        assert_eq!(
            std::fs::read(dst.join("sub/inner.txt")).expect("inner"),
            b"inner"
        );
    }

    #[tokio::test]
    async fn mirror_rejects_file_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").expect("write");

        assert!(mirror(&file, &dir.path().join("out")).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn mirror_preserves_symlinks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).expect("mkdir src");
        std::fs::write(src.join("real.txt"), b"real").expect("write");
        std::os::unix::fs::symlink("real.txt", src.join("link.txt")).expect("symlink");

        let dst = dir.path().join("dst");
        mirror(&src, &dst).await.expect("mirror");

        let copied = dst.join("link.txt");
        let metadata = std::fs::symlink_metadata(&copied).expect("link metadata");
        assert!(metadata.file_type().is_symlink());
        assert_eq!(
            std::fs::read_link(&copied).expect("read link"),
            PathBuf::from("real.txt")
        );
    }

    #[tokio::test]
    async fn remove_existing_handles_files_directories_and_absence() {
        let dir = tempfile::tempdir().expect("tempdir");

        let file = dir.path().join("artifact");
        std::fs::write(&file, b"x").expect("write");
        remove_existing(&file).await.expect("remove file");
        assert!(!file.exists());

        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("nested")).expect("mkdir");
        remove_existing(&tree).await.expect("remove dir");
        assert!(!tree.exists());

        remove_existing(&dir.path().join("never-there"))
            .await
            .expect("remove missing");
    }

    #[test]
    fn relative_from_descends_into_path() {
        assert_eq!(
            relative_from(Path::new("/app/usr/bin/tool"), Path::new("/app")),
            PathBuf::from("usr/bin/tool")
        );
    }

    #[test]
    fn relative_from_climbs_out_of_base() {
        assert_eq!(
            relative_from(Path::new("/app/data"), Path::new("/app/usr/bin")),
            PathBuf::from("../../data")
        );
    }

    #[test]
    fn relative_from_equal_paths_is_dot() {
        assert_eq!(
            relative_from(Path::new("/app"), Path::new("/app")),
            PathBuf::from(".")
        );
    }
}
