//! The `key=value` side file recording which seed was last applied.

use std::fmt::Write as _;

/// Recorded version when the applied seed carried no version marker.
pub const UNVERSIONED: &str = "unversioned";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Marker {
    pub time: Option<String>,
    pub run_id: Option<String>,
    pub algorithm: Option<String>,
    pub seed_checksum: Option<String>,
    pub runtime_checksum: Option<String>,
    pub seed_version: Option<String>,
    pub reason: Option<String>,
}

impl Marker {
    /// Parse marker text. Unknown keys, blank lines and `#` comments are
    /// skipped. `seed_sha256`/`runtime_sha256` written by older boot scripts
    /// are accepted as sha256 checksums.
    pub fn parse(text: &str) -> Self {
        let mut m = Marker::default();
        let mut legacy_sha = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else { continue };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let value = Some(value.to_string());
            match key.trim() {
                "time" => m.time = value,
                "run_id" => m.run_id = value,
                "algorithm" => m.algorithm = value,
                "seed_checksum" => m.seed_checksum = value,
                "runtime_checksum" => m.runtime_checksum = value,
                "seed_sha256" => {
                    legacy_sha = true;
                    if m.seed_checksum.is_none() {
                        m.seed_checksum = value;
                    }
                }
                "runtime_sha256" => {
                    legacy_sha = true;
                    if m.runtime_checksum.is_none() {
                        m.runtime_checksum = value;
                    }
                }
                "seed_version" => m.seed_version = value,
                "reason" => m.reason = value,
                _ => {}
            }
        }
        if m.algorithm.is_none() && legacy_sha {
            m.algorithm = Some("sha256".into());
        }
        m
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let fields = [
            ("time", &self.time),
            ("run_id", &self.run_id),
            ("algorithm", &self.algorithm),
            ("seed_checksum", &self.seed_checksum),
            ("runtime_checksum", &self.runtime_checksum),
            ("seed_version", &self.seed_version),
            ("reason", &self.reason),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                let _ = writeln!(out, "{key}={v}");
            }
        }
        out
    }

    /// Recorded seed version, `None` when the marker predates version tracking.
    pub fn recorded_version(&self) -> Option<&str> {
        self.seed_version.as_deref()
    }

    /// Recorded seed checksum, only when it was taken with `algorithm`.
    pub fn seed_checksum_for(&self, algorithm: &str) -> Option<&str> {
        match self.algorithm.as_deref() {
            Some(a) if a == algorithm => self.seed_checksum.as_deref(),
            _ => None,
        }
    }

    /// Recorded runtime checksum, only when it was taken with `algorithm`.
    pub fn runtime_checksum_for(&self, algorithm: &str) -> Option<&str> {
        match self.algorithm.as_deref() {
            Some(a) if a == algorithm => self.runtime_checksum.as_deref(),
            _ => None,
        }
    }
}
