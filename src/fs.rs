//! Filesystem helpers for action handlers.

use std::fs;
use std::io;
use std::path::Path;

use crate::logger::Logger;

/// Create `path` and any missing parents. Existing directories are fine.
pub fn make_directories(path: &Path, logger: &Logger) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    logger.info(format!("mkdir: {}", path.display()));
    fs::create_dir_all(path)
}

/// Remove `path` and everything below it. A missing path is not an error.
///
/// Symlinks are removed, not followed.
pub fn recursive_delete(path: &Path, logger: &Logger) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            logger.debug(format!("{} doesn't exist, nothing to delete", path.display()));
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    logger.info(format!("rmtree: {}", path.display()));
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn test_make_directories_nested_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::discard();
        let nested = dir.path().join("a/b/c");
        make_directories(&nested, &logger).unwrap();
        make_directories(&nested, &logger).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_recursive_delete_tree() {
        let dir = TempDir::new().unwrap();
        let (logger, sink) = Logger::capture(LogLevel::Debug);
        let root = dir.path().join("build");
        fs::create_dir_all(root.join("obj/dist")).unwrap();
        fs::write(root.join("obj/dist/app.tar"), b"x").unwrap();

        recursive_delete(&root, &logger).unwrap();
        assert!(!root.exists());
        assert!(sink.contains("rmtree"));
    }

    #[test]
    fn test_recursive_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::discard();
        recursive_delete(&dir.path().join("never-created"), &logger).unwrap();
    }

    #[test]
    fn test_recursive_delete_single_file() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::discard();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"x").unwrap();
        recursive_delete(&file, &logger).unwrap();
        assert!(!file.exists());
    }
}
