use declarative::{ActionError, FileStore};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Managed files on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFiles;

impl FileStore for LocalFiles {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ActionError> {
        match fs::read(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ActionError::file_write(format!("Could not read {path}: {e}"))),
        }
    }

    /// Write through a temporary file in the same directory, then rename it
    /// over the target. Parent directories are never created.
    fn write_atomic(&self, path: &str, content: &[u8]) -> Result<(), ActionError> {
        let target = Path::new(path);
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(ActionError::file_write(format!(
                "{path}: parent directory {} does not exist",
                parent.display()
            )));
        }

        let fail = |e: std::io::Error| ActionError::file_write(format!("{path}: {e}"));
        let mut tmp = NamedTempFile::new_in(parent).map_err(fail)?;
        tmp.write_all(content).map_err(fail)?;
        tmp.as_file().sync_all().map_err(fail)?;

        // Keep the mode of the file being replaced
        if let Ok(meta) = fs::metadata(target) {
            fs::set_permissions(tmp.path(), meta.permissions()).map_err(fail)?;
        }

        tmp.persist(target).map_err(|e| fail(e.error))?;
        log::debug!("Wrote {} bytes to {path}", content.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path_in(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(LocalFiles.read(&path_in(&dir, "nagios.yaml")).unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "nagios.yaml");

        LocalFiles.write_atomic(&path, b"init_config:\n").unwrap();
        assert_eq!(LocalFiles.read(&path).unwrap().unwrap(), b"init_config:\n");

        LocalFiles.write_atomic(&path, b"instances: []\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "instances: []\n");
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        LocalFiles
            .write_atomic(&path_in(&dir, "nagios.py"), b"pass\n")
            .unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, ["nagios.py"]);
    }

    #[test]
    fn test_missing_parent_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "conf.d/nagios.yaml");
        let err = LocalFiles.write_atomic(&path, b"x").unwrap_err();
        assert_eq!(err.kind, declarative::ActionErrorKind::FileWrite);
        assert!(!dir.path().join("conf.d").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = path_in(&dir, "nagios.py");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        LocalFiles.write_atomic(&path, b"new").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
