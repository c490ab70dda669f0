//! Owner-only file persistence
//!
//! Key material, certificates and generated config all land on disk through
//! these helpers so the permission handling lives in one place.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Create a directory (and its parents) readable only by the owner
pub fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .with_context(|| format!("Unable to create directory {:?}", dir))
}

/// Create the directory that will hold `path`, if it has one
pub fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => create_private_dir(dir),
        _ => Ok(()),
    }
}

/// Write `contents` to `path` with mode 0600, creating parent directories
pub fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    create_parent_dir(path)?;
    fs::write(path, contents).with_context(|| format!("Unable to write file {:?}", path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Unable to restrict permissions on {:?}", path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_private_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/secret");
        write_private(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_parent_dir_of_bare_file_name() {
        assert!(create_parent_dir(Path::new("file-in-cwd")).is_ok());
    }
}
