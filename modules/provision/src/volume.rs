use crate::decision::RuntimeState;
use crate::marker::Marker;
use checksum::Algorithm;
use seedboot_core::BootError;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Default marker file name, placed next to the runtime artifact.
pub const MARKER_FILE: &str = ".seed_meta.txt";

/// Owner and group read/write, nothing for others.
#[cfg(unix)]
const RUNTIME_MODE: u32 = 0o660;

const SQLITE_SIDECARS: &[&str] = &["-wal", "-shm", "-journal"];

/// Handle to the persistent location holding the runtime artifact and its
/// provisioning marker.
#[derive(Debug, Clone)]
pub struct Volume {
    runtime: PathBuf,
    marker: PathBuf,
}

impl Volume {
    pub fn new(runtime: impl Into<PathBuf>, marker: impl Into<PathBuf>) -> Self {
        Volume { runtime: runtime.into(), marker: marker.into() }
    }

    /// Marker goes next to the runtime artifact as [`MARKER_FILE`].
    pub fn with_default_marker(runtime: impl Into<PathBuf>) -> Self {
        let runtime = runtime.into();
        let marker = parent_dir(&runtime).join(MARKER_FILE);
        Volume { runtime, marker }
    }

    pub fn runtime_path(&self) -> &Path {
        &self.runtime
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    pub fn observe(&self, algo: Algorithm) -> Result<RuntimeState, BootError> {
        let meta = match fs::metadata(&self.runtime) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RuntimeState::Absent),
            Err(e) => return Err(self.io_err("stat runtime artifact", e)),
        };
        if meta.len() == 0 {
            return Ok(RuntimeState::Empty);
        }
        match checksum::digest_file(&self.runtime, algo) {
            Ok(Some(checksum)) => Ok(RuntimeState::Present { checksum }),
            // removed between stat and read
            Ok(None) => Ok(RuntimeState::Absent),
            Err(e) => Err(self.io_err("checksum runtime artifact", e)),
        }
    }

    /// The recorded marker, or `None` when there is none or it cannot be read.
    pub fn read_marker(&self) -> Option<Marker> {
        match fs::read_to_string(&self.marker) {
            Ok(s) => Some(Marker::parse(&s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(marker = %self.marker.display(), error = %e, "provisioning marker unreadable; treating as absent");
                None
            }
        }
    }

    pub fn write_marker(&self, marker: &Marker) -> Result<(), BootError> {
        let dir = parent_dir(&self.marker);
        fs::create_dir_all(&dir).map_err(|e| self.io_err("create marker directory", e))?;
        let tmp = temp_path(&self.marker);
        let res = (|| {
            let mut f = File::create(&tmp)?;
            f.write_all(marker.render().as_bytes())?;
            f.sync_all()?;
            fs::rename(&tmp, &self.marker)
        })();
        if let Err(e) = res {
            let _ = fs::remove_file(&tmp);
            return Err(BootError::io(format!("write marker {}", self.marker.display()), e));
        }
        Ok(())
    }

    /// Replace the runtime artifact with the bytes of `seed`.
    ///
    /// The copy lands in a temporary file in the destination directory and is
    /// renamed over the runtime path, so readers see either the old or the
    /// new file. Returns the number of bytes written.
    pub fn install_from(&self, seed: &Path) -> Result<u64, BootError> {
        let dir = parent_dir(&self.runtime);
        fs::create_dir_all(&dir)
            .map_err(|e| BootError::io(format!("create runtime directory {}", dir.display()), e))?;

        let mut src = match File::open(seed) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BootError::MissingSeed(seed.to_path_buf()))
            }
            Err(e) => return Err(BootError::io(format!("open seed {}", seed.display()), e)),
        };

        let tmp = temp_path(&self.runtime);
        if tmp.exists() {
            let _ = fs::remove_file(&tmp);
        }
        let res = (|| {
            let mut dst = File::create(&tmp)?;
            let n = io::copy(&mut src, &mut dst)?;
            dst.sync_all()?;
            set_runtime_permissions(&tmp)?;
            Ok::<u64, io::Error>(n)
        })();
        let bytes = match res {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(BootError::io(format!("copy seed into {}", tmp.display()), e));
            }
        };

        self.remove_sqlite_sidecars()?;
        if let Err(e) = fs::rename(&tmp, &self.runtime) {
            let _ = fs::remove_file(&tmp);
            return Err(BootError::io(
                format!("move {} into place at {}", tmp.display(), self.runtime.display()),
                e,
            ));
        }
        fsync_dir(&dir).ok();
        Ok(bytes)
    }

    /// A stale WAL would be replayed against the freshly installed database.
    fn remove_sqlite_sidecars(&self) -> Result<(), BootError> {
        for suffix in SQLITE_SIDECARS {
            let mut name = self.runtime.as_os_str().to_os_string();
            name.push(suffix);
            let side = PathBuf::from(name);
            match fs::remove_file(&side) {
                Ok(()) => tracing::info!(path = %side.display(), "removed stale sqlite side file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(BootError::io(format!("remove {}", side.display()), e)),
            }
        }
        Ok(())
    }

    fn io_err(&self, what: &str, e: io::Error) -> BootError {
        BootError::io(format!("{what} {}", self.runtime.display()), e)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "runtime".to_string());
    parent_dir(path).join(format!(".{name}.seedboot-tmp"))
}

#[cfg(unix)]
fn set_runtime_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(RUNTIME_MODE))
}

#[cfg(not(unix))]
fn set_runtime_permissions(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    let f = File::open(dir)?;
    f.sync_all()
}
