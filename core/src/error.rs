use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between container start and server handoff.
///
/// Only some kinds abort startup; see [`BootError::is_fatal`].
#[derive(Debug, Error)]
pub enum BootError {
    #[error("seed artifact missing at {}", .0.display())]
    MissingSeed(PathBuf),
    #[error("seed artifact at {} is empty", .0.display())]
    EmptySeed(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("expected table `{0}` not found")]
    MissingTable(String),
    #[error("sanity check failed: {0}")]
    Sanity(String),
    #[error("job `{name}` failed: {message}")]
    Job { name: String, message: String },
}

impl BootError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BootError::Io { context: context.into(), source }
    }

    /// Fatal errors stop the boot before the server is launched.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BootError::MissingSeed(_) | BootError::EmptySeed(_) | BootError::Io { .. }
        )
    }

    /// Stable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BootError::MissingSeed(_) | BootError::EmptySeed(_) => "fatal-missing-seed",
            BootError::Io { .. } => "fatal-io",
            BootError::Migration(_) => "non-fatal-migration-failure",
            BootError::MissingTable(_) => "non-fatal-missing-expected-table",
            BootError::Sanity(_) => "non-fatal-sanity-failure",
            BootError::Job { .. } => "non-fatal-job-failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(BootError::MissingSeed("/seed.db".into()).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(BootError::io("copy seed", io).is_fatal());
        assert!(!BootError::Migration("exit 1".into()).is_fatal());
        assert!(!BootError::MissingTable("race_program".into()).is_fatal());
        assert!(!BootError::Job { name: "daily".into(), message: "exit 2".into() }.is_fatal());
    }

    #[test]
    fn kinds_are_labelled() {
        assert_eq!(BootError::MissingSeed("/x".into()).kind(), "fatal-missing-seed");
        assert_eq!(BootError::MissingTable("t".into()).kind(), "non-fatal-missing-expected-table");
        assert_eq!(
            BootError::MissingSeed("/opt/seed.db".into()).to_string(),
            "seed artifact missing at /opt/seed.db"
        );
    }
}
