//! Pure copy-or-skip decision. No filesystem access happens here; the caller
//! gathers an [`Observation`] and executes the returned [`Decision`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the runtime artifact looked like when observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeState {
    Absent,
    Empty,
    Present { checksum: String },
}

/// What rule 2 compares the seed checksum against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// The runtime file's current content. A runtime still holding exactly
    /// what was installed from this seed also counts as matching.
    #[default]
    Content,
    /// The seed checksum recorded when the runtime was last provisioned, so
    /// writes made by the live application do not trigger a reseed.
    Applied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub runtime: RuntimeState,
    /// `None` when the seed artifact does not exist.
    pub seed_checksum: Option<String>,
    pub seed_version: Option<String>,
    pub recorded_version: Option<String>,
    pub recorded_seed_checksum: Option<String>,
    /// Runtime checksum recorded after the last install and any boot-time
    /// maintenance that followed it.
    pub recorded_runtime_checksum: Option<String>,
    pub policy: ChecksumPolicy,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Copy,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    RuntimeMissing,
    RuntimeEmpty,
    ChecksumMismatch,
    VersionChanged,
    Forced,
    UpToDate,
    SeedUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub reason: Reason,
}

impl Decision {
    fn copy(reason: Reason) -> Self {
        Decision { action: Action::Copy, reason }
    }

    fn skip(reason: Reason) -> Self {
        Decision { action: Action::Skip, reason }
    }

    pub fn requires_copy(&self) -> bool {
        self.action == Action::Copy
    }
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Copy => "copy",
            Action::Skip => "skip",
        }
    }
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::RuntimeMissing => "runtime_missing",
            Reason::RuntimeEmpty => "runtime_empty",
            Reason::ChecksumMismatch => "checksum_mismatch",
            Reason::VersionChanged => "version_changed",
            Reason::Forced => "forced",
            Reason::UpToDate => "up_to_date",
            Reason::SeedUnavailable => "seed_unavailable",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Reason::RuntimeMissing => "runtime artifact does not exist",
            Reason::RuntimeEmpty => "runtime artifact is zero-length",
            Reason::ChecksumMismatch => "seed and runtime checksums differ",
            Reason::VersionChanged => "seed version differs from the recorded version",
            Reason::Forced => "forced reseed requested",
            Reason::UpToDate => "runtime matches seed checksum and version",
            Reason::SeedUnavailable => "seed artifact missing; keeping existing runtime",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluate the provisioning rules in order:
///
/// 1. runtime absent or empty
/// 2. checksum mismatch (see [`ChecksumPolicy`])
/// 3. seed version differs from the recorded version
/// 4. forced reseed
/// 5. otherwise skip
///
/// A missing seed cannot be compared against, so with an intact runtime the
/// result is a skip unless the reseed is forced. The caller turns a copy
/// without a seed into a fatal error.
pub fn decide(obs: &Observation) -> Decision {
    let runtime_checksum = match &obs.runtime {
        RuntimeState::Absent => return Decision::copy(Reason::RuntimeMissing),
        RuntimeState::Empty => return Decision::copy(Reason::RuntimeEmpty),
        RuntimeState::Present { checksum } => checksum.as_str(),
    };

    let Some(seed_checksum) = obs.seed_checksum.as_deref() else {
        return if obs.force {
            Decision::copy(Reason::Forced)
        } else {
            Decision::skip(Reason::SeedUnavailable)
        };
    };

    let matches = match obs.policy {
        ChecksumPolicy::Content => {
            runtime_checksum == seed_checksum || installed_from(obs, seed_checksum, runtime_checksum)
        }
        // no marker yet: fall back to content
        ChecksumPolicy::Applied => {
            obs.recorded_seed_checksum.as_deref().unwrap_or(runtime_checksum) == seed_checksum
        }
    };
    if !matches {
        return Decision::copy(Reason::ChecksumMismatch);
    }

    if let Some(seed_version) = obs.seed_version.as_deref() {
        if obs.recorded_version.as_deref() != Some(seed_version) {
            return Decision::copy(Reason::VersionChanged);
        }
    }

    if obs.force {
        return Decision::copy(Reason::Forced);
    }
    Decision::skip(Reason::UpToDate)
}

/// The marker says this seed was installed and the runtime has not changed
/// since.
fn installed_from(obs: &Observation, seed_checksum: &str, runtime_checksum: &str) -> bool {
    obs.recorded_seed_checksum.as_deref() == Some(seed_checksum)
        && obs.recorded_runtime_checksum.as_deref() == Some(runtime_checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(checksum: &str) -> Observation {
        Observation {
            runtime: RuntimeState::Present { checksum: checksum.into() },
            seed_checksum: Some("abc123".into()),
            seed_version: None,
            recorded_version: None,
            recorded_seed_checksum: None,
            recorded_runtime_checksum: None,
            policy: ChecksumPolicy::Content,
            force: false,
        }
    }

    #[test]
    fn absent_or_empty_runtime_copies() {
        let mut obs = present("abc123");
        obs.runtime = RuntimeState::Absent;
        assert_eq!(decide(&obs), Decision::copy(Reason::RuntimeMissing));
        obs.runtime = RuntimeState::Empty;
        assert_eq!(decide(&obs), Decision::copy(Reason::RuntimeEmpty));
        // even without a seed: the caller reports the missing seed
        obs.seed_checksum = None;
        assert!(decide(&obs).requires_copy());
    }

    #[test]
    fn checksum_mismatch_copies() {
        assert_eq!(decide(&present("def456")), Decision::copy(Reason::ChecksumMismatch));
    }

    #[test]
    fn matching_runtime_is_kept() {
        assert_eq!(decide(&present("abc123")), Decision::skip(Reason::UpToDate));
    }

    #[test]
    fn version_rules() {
        let mut obs = present("abc123");
        obs.seed_version = Some("2024-11-02".into());
        assert_eq!(decide(&obs), Decision::copy(Reason::VersionChanged));

        obs.recorded_version = Some("2024-10-01".into());
        assert_eq!(decide(&obs), Decision::copy(Reason::VersionChanged));

        obs.recorded_version = Some("2024-11-02".into());
        assert_eq!(decide(&obs), Decision::skip(Reason::UpToDate));

        // no seed version: recorded marker is irrelevant
        obs.seed_version = None;
        obs.recorded_version = Some("unversioned".into());
        assert_eq!(decide(&obs), Decision::skip(Reason::UpToDate));
    }

    #[test]
    fn force_overrides_everything() {
        let mut obs = present("abc123");
        obs.force = true;
        assert_eq!(decide(&obs), Decision::copy(Reason::Forced));
        // earlier rules keep their more specific reason
        let mut obs = present("zzz");
        obs.force = true;
        assert_eq!(decide(&obs), Decision::copy(Reason::ChecksumMismatch));
    }

    #[test]
    fn missing_seed_with_intact_runtime() {
        let mut obs = present("abc123");
        obs.seed_checksum = None;
        assert_eq!(decide(&obs), Decision::skip(Reason::SeedUnavailable));
        obs.force = true;
        assert_eq!(decide(&obs), Decision::copy(Reason::Forced));
    }

    #[test]
    fn applied_policy_ignores_live_mutations() {
        let mut obs = present("mutated-by-app");
        obs.policy = ChecksumPolicy::Applied;
        obs.recorded_seed_checksum = Some("abc123".into());
        assert_eq!(decide(&obs), Decision::skip(Reason::UpToDate));

        obs.recorded_seed_checksum = Some("old-seed".into());
        assert_eq!(decide(&obs), Decision::copy(Reason::ChecksumMismatch));

        // nothing recorded: compare content
        obs.recorded_seed_checksum = None;
        assert_eq!(decide(&obs), Decision::copy(Reason::ChecksumMismatch));
    }

    #[test]
    fn content_policy_accepts_recorded_install_baseline() {
        // dates normalized after install: runtime no longer equals the seed
        let mut obs = present("normalized");
        obs.recorded_seed_checksum = Some("abc123".into());
        obs.recorded_runtime_checksum = Some("normalized".into());
        assert_eq!(decide(&obs), Decision::skip(Reason::UpToDate));

        // written to since then
        obs.runtime = RuntimeState::Present { checksum: "normalized-then-mutated".into() };
        assert_eq!(decide(&obs), Decision::copy(Reason::ChecksumMismatch));

        // baseline belongs to an older seed
        obs.runtime = RuntimeState::Present { checksum: "normalized".into() };
        obs.recorded_seed_checksum = Some("old-seed".into());
        assert_eq!(decide(&obs), Decision::copy(Reason::ChecksumMismatch));
    }
}
