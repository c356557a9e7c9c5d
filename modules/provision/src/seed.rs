use seedboot_core::BootError;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The read-only artifact bundled with a deployment.
#[derive(Debug, Clone)]
pub struct Seed {
    path: PathBuf,
    version_file: PathBuf,
    version_override: Option<String>,
}

impl Seed {
    /// Version is read from `<path>.version` unless configured otherwise.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let version_file = default_version_file(&path);
        Seed { path, version_file, version_override: None }
    }

    pub fn with_version_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.version_file = file.into();
        self
    }

    /// An explicit version (e.g. from `SEED_VERSION`) wins over the version file.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version_override = version.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version_file(&self) -> &Path {
        &self.version_file
    }

    /// First non-empty line of the version file. A missing file means no
    /// version tracking and is not an error.
    pub fn version(&self) -> Result<Option<String>, BootError> {
        if let Some(v) = &self.version_override {
            return Ok(Some(v.clone()));
        }
        match fs::read_to_string(&self.version_file) {
            Ok(s) => Ok(s.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BootError::io(
                format!("read seed version file {}", self.version_file.display()),
                e,
            )),
        }
    }
}

fn default_version_file(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(OsString::from(".version"));
    PathBuf::from(name)
}
