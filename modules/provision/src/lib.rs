//! Seed provisioning: decide whether the runtime artifact on the persistent
//! volume must be (re)populated from the bundled seed, and do it.

mod decision;
mod marker;
mod seed;
mod volume;

pub use decision::{decide, Action, ChecksumPolicy, Decision, Observation, Reason, RuntimeState};
pub use marker::{Marker, UNVERSIONED};
pub use seed::Seed;
pub use volume::{Volume, MARKER_FILE};

use checksum::{display_digest, Algorithm};
use seedboot_core::BootError;
use serde::Serialize;
use std::io;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub force: bool,
    pub algorithm: Algorithm,
    pub policy: ChecksumPolicy,
    /// Recorded in the marker when a copy happens.
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub decision: Decision,
    pub algorithm: Algorithm,
    pub seed_checksum: Option<String>,
    /// Runtime checksum after provisioning (before, when skipped).
    pub runtime_checksum: Option<String>,
    pub seed_version: Option<String>,
    pub recorded_version: Option<String>,
    pub bytes_copied: Option<u64>,
}

/// Gather everything the decision needs without modifying the volume.
pub fn observe(seed: &Seed, volume: &Volume, opts: &ProvisionOptions) -> Result<Observation, BootError> {
    let seed_checksum = checksum::digest_file(seed.path(), opts.algorithm)
        .map_err(|e| BootError::io(format!("checksum seed {}", seed.path().display()), e))?;
    let runtime = volume.observe(opts.algorithm)?;
    let seed_version = seed.version()?;
    let marker = volume.read_marker().unwrap_or_default();
    Ok(Observation {
        runtime,
        seed_checksum,
        seed_version,
        recorded_version: marker.recorded_version().map(str::to_string),
        recorded_seed_checksum: marker.seed_checksum_for(opts.algorithm.name()).map(str::to_string),
        recorded_runtime_checksum: marker.runtime_checksum_for(opts.algorithm.name()).map(str::to_string),
        policy: opts.policy,
        force: opts.force,
    })
}

/// Decide without acting, for dry runs.
pub fn plan(seed: &Seed, volume: &Volume, opts: &ProvisionOptions) -> Result<Outcome, BootError> {
    let obs = observe(seed, volume, opts)?;
    let decision = decide(&obs);
    Ok(outcome_without_copy(&obs, decision, opts.algorithm))
}

/// Run the provisioning procedure against `volume`.
///
/// A copy without a seed, an empty seed, and any I/O failure during the copy
/// are fatal; the caller must not start the server on error.
pub fn provision(seed: &Seed, volume: &Volume, opts: &ProvisionOptions) -> Result<Outcome, BootError> {
    let obs = observe(seed, volume, opts)?;
    let runtime_before = match &obs.runtime {
        RuntimeState::Present { checksum } => Some(checksum.as_str()),
        RuntimeState::Absent | RuntimeState::Empty => None,
    };
    tracing::info!(
        seed = %seed.path().display(),
        runtime = %volume.runtime_path().display(),
        algorithm = opts.algorithm.name(),
        seed_checksum = display_digest(obs.seed_checksum.as_deref()),
        runtime_checksum = display_digest(runtime_before),
        seed_version = obs.seed_version.as_deref().unwrap_or("-"),
        recorded_version = obs.recorded_version.as_deref().unwrap_or("-"),
        force = obs.force,
        "observed seed and runtime"
    );

    let decision = decide(&obs);
    tracing::info!(
        decision = %decision.action,
        reason = %decision.reason,
        "seed decision: {}",
        decision.reason.describe()
    );

    if !decision.requires_copy() {
        if decision.reason == Reason::SeedUnavailable {
            tracing::warn!(seed = %seed.path().display(), "seed artifact missing; runtime left as is");
        }
        return Ok(outcome_without_copy(&obs, decision, opts.algorithm));
    }

    let Some(seed_checksum) = obs.seed_checksum.clone() else {
        tracing::error!(seed = %seed.path().display(), "copy required but seed artifact is missing");
        return Err(BootError::MissingSeed(seed.path().to_path_buf()));
    };
    let seed_len = std::fs::metadata(seed.path())
        .map_err(|e| BootError::io(format!("stat seed {}", seed.path().display()), e))?
        .len();
    if seed_len == 0 {
        tracing::error!(seed = %seed.path().display(), "copy required but seed artifact is empty");
        return Err(BootError::EmptySeed(seed.path().to_path_buf()));
    }

    let bytes = volume.install_from(seed.path())?;
    let after = checksum::digest_file(volume.runtime_path(), opts.algorithm)
        .map_err(|e| BootError::io("checksum runtime after copy", e))?;
    if after.as_deref() != Some(seed_checksum.as_str()) {
        return Err(BootError::io(
            format!("verify {}", volume.runtime_path().display()),
            io::Error::new(io::ErrorKind::InvalidData, "runtime checksum differs from seed after copy"),
        ));
    }

    let marker = Marker {
        time: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        run_id: opts.run_id.clone(),
        algorithm: Some(opts.algorithm.name().to_string()),
        seed_checksum: Some(seed_checksum.clone()),
        runtime_checksum: after.clone(),
        seed_version: Some(obs.seed_version.clone().unwrap_or_else(|| UNVERSIONED.to_string())),
        reason: Some(decision.reason.as_str().to_string()),
    };
    volume.write_marker(&marker)?;
    tracing::info!(
        bytes,
        runtime_checksum = display_digest(after.as_deref()),
        marker = %volume.marker_path().display(),
        "copied seed -> runtime"
    );

    Ok(Outcome {
        decision,
        algorithm: opts.algorithm,
        seed_checksum: Some(seed_checksum),
        runtime_checksum: after,
        seed_version: obs.seed_version,
        recorded_version: marker.seed_version,
        bytes_copied: Some(bytes),
    })
}

/// Record the runtime's current checksum as the installed baseline after
/// boot-time maintenance rewrote it, so the next boot does not mistake the
/// rewrite for a diverged runtime.
///
/// Only done when the marker still holds `previous`, i.e. the runtime was at
/// its recorded baseline before the maintenance ran. Returns the new checksum
/// when the marker was updated.
pub fn rebaseline(volume: &Volume, algorithm: Algorithm, previous: &str) -> Result<Option<String>, BootError> {
    let Some(mut marker) = volume.read_marker() else { return Ok(None) };
    if marker.runtime_checksum_for(algorithm.name()) != Some(previous) {
        return Ok(None);
    }
    let current = checksum::digest_file(volume.runtime_path(), algorithm)
        .map_err(|e| BootError::io("checksum runtime after maintenance", e))?;
    let Some(current) = current else { return Ok(None) };
    if current == previous {
        return Ok(None);
    }
    marker.runtime_checksum = Some(current.clone());
    volume.write_marker(&marker)?;
    tracing::info!(
        runtime_checksum = %current,
        marker = %volume.marker_path().display(),
        "recorded runtime checksum after maintenance"
    );
    Ok(Some(current))
}

fn outcome_without_copy(obs: &Observation, decision: Decision, algorithm: Algorithm) -> Outcome {
    let runtime_checksum = match &obs.runtime {
        RuntimeState::Present { checksum } => Some(checksum.clone()),
        RuntimeState::Absent | RuntimeState::Empty => None,
    };
    Outcome {
        decision,
        algorithm,
        seed_checksum: obs.seed_checksum.clone(),
        runtime_checksum,
        seed_version: obs.seed_version.clone(),
        recorded_version: obs.recorded_version.clone(),
        bytes_copied: None,
    }
}
