use lambdahouse_core::{LambdahouseError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SUBDIRECTORIES: [&str; 5] = ["user_defined", "data", "metadata", "metadata_dropped", "tmp"];

/// Engine state on disk: a user path kept across cold starts, or a private
/// temporary directory removed on shutdown.
#[derive(Debug)]
pub struct WorkingDirectory {
    root: PathBuf,
    temporary: Option<TempDir>,
    user_scripts: PathBuf,
    top_level_domains: PathBuf,
    status: Option<PathBuf>,
}

impl WorkingDirectory {
    /// `path` is the configured location; `Some("")` is an explicit empty path and is rejected.
    pub fn prepare(
        path: Option<&str>,
        user_scripts_path: Option<&str>,
        top_level_domains_path: Option<&str>,
    ) -> Result<Self> {
        let (root, temporary) = match path {
            Some(path) if path.trim().is_empty() => {
                return Err(LambdahouseError::BadArguments(
                    "Cannot use an empty storage path".to_string(),
                ))
            }
            Some(path) => {
                let root = PathBuf::from(path);
                std::fs::create_dir_all(&root)?;
                (root, None)
            }
            None => {
                let temporary = create_temporary()?;
                (temporary.path().to_path_buf(), Some(temporary))
            }
        };

        for name in SUBDIRECTORIES {
            std::fs::create_dir_all(root.join(name))?;
        }
        let user_scripts = user_scripts_path
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("user_scripts"));
        std::fs::create_dir_all(&user_scripts)?;
        let top_level_domains = top_level_domains_path
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("top_level_domains"));

        tracing::debug!(path = %root.display(), temporary = temporary.is_some(), "working directory ready");
        Ok(Self {
            root,
            temporary,
            user_scripts,
            top_level_domains,
            status: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary.is_some()
    }

    pub fn data(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn user_defined(&self) -> PathBuf {
        self.root.join("user_defined")
    }

    pub fn tmp(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn user_scripts(&self) -> &Path {
        &self.user_scripts
    }

    pub fn top_level_domains(&self) -> &Path {
        &self.top_level_domains
    }

    /// Records who owns a user-provided directory.
    pub fn write_status(&mut self) -> Result<()> {
        let path = self.root.join("status");
        if path.exists() {
            tracing::warn!(path = %path.display(), "status file already exists, previous run did not shut down cleanly");
        }
        let contents = format!(
            "PID: {}\nStarted at: {}\nRevision: {}\n",
            std::process::id(),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            env!("CARGO_PKG_VERSION"),
        );
        std::fs::write(&path, contents)?;
        self.status = Some(path);
        Ok(())
    }

    pub fn cleanup(self) -> Result<()> {
        if let Some(status) = &self.status {
            std::fs::remove_file(status)?;
        }
        if let Some(temporary) = self.temporary {
            let path = temporary.path().to_path_buf();
            temporary.close()?;
            tracing::debug!(path = %path.display(), "removed temporary working directory");
        }
        Ok(())
    }
}

fn create_temporary() -> Result<TempDir> {
    let mut parent = std::env::temp_dir();
    if !parent.is_dir() {
        parent = std::env::current_dir()?;
    }
    let seconds = chrono::Utc::now().timestamp();
    let prefix = format!("lambdahouse-{}-{seconds}-", std::process::id());
    tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir_in(&parent)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => LambdahouseError::FileAlreadyExists(format!(
                "Temporary working directory under {} already exists",
                parent.display()
            )),
            _ => LambdahouseError::Io(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_directory_is_created_and_removed() {
        let dir = WorkingDirectory::prepare(None, None, None).unwrap();
        let root = dir.root().to_path_buf();
        assert!(dir.is_temporary());
        assert!(root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("lambdahouse-{}-", std::process::id())));
        for name in SUBDIRECTORIES {
            assert!(root.join(name).is_dir(), "{name} missing");
        }
        assert!(dir.user_scripts().is_dir());
        dir.cleanup().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn user_path_is_kept_and_status_removed() {
        let base = tempfile::tempdir().unwrap();
        let path = base.path().join("state");
        let mut dir = WorkingDirectory::prepare(path.to_str(), None, None).unwrap();
        dir.write_status().unwrap();
        let status = std::fs::read_to_string(path.join("status")).unwrap();
        assert!(status.starts_with(&format!("PID: {}", std::process::id())));
        dir.cleanup().unwrap();
        assert!(path.join("data").is_dir());
        assert!(!path.join("status").exists());
    }

    #[test]
    fn explicit_empty_path_is_rejected() {
        assert!(WorkingDirectory::prepare(Some(""), None, None).is_err());
    }
}
