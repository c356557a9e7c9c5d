//! Everything that happens before the server handoff.

use crate::config::Settings;
use anyhow::{bail, Result};
use hooks::{run_hook, Hook};
use provision::{Outcome, ProvisionOptions};
use seed_sqlite::{Db, SanityOptions, SanityReport};
use seedboot_core::BootError;
use std::path::Path;

#[derive(Debug, Default)]
pub struct BootReport {
    pub provision: Option<Outcome>,
    pub sanity: Option<SanityReport>,
    /// Non-fatal problems, already logged.
    pub warnings: Vec<BootError>,
}

pub fn provision_options(settings: &Settings, run_id: &str) -> ProvisionOptions {
    ProvisionOptions {
        force: settings.force,
        algorithm: settings.algorithm,
        policy: settings.policy,
        run_id: Some(run_id.to_string()),
    }
}

/// Provision, check, migrate and run jobs. Returns `Err` only for failures
/// that must keep the server from starting.
pub fn run_boot(settings: &Settings, run_id: &str) -> Result<BootReport> {
    let mut report = BootReport::default();
    tracing::info!(
        database_url = %settings.store,
        seed = %settings.seed_path.display(),
        runtime = %settings.runtime_path.display(),
        "boot starting"
    );

    if settings.store.is_local() {
        let outcome = provision::provision(
            &settings.seed(),
            &settings.volume(),
            &provision_options(settings, run_id),
        )
        .map_err(fatal)?;

        if let Some(opts) = &settings.sanity {
            let (sanity, warnings) = sanity_check(&settings.runtime_path, opts, settings.strict_sanity)?;
            report.warnings.extend(warnings);
            let rewritten = sanity.as_ref().and_then(|r| r.normalized).is_some_and(|n| n > 0);
            if let (true, Some(previous)) = (rewritten, outcome.runtime_checksum.as_deref()) {
                if let Err(e) = provision::rebaseline(&settings.volume(), settings.algorithm, previous) {
                    report.warnings.push(warn(BootError::Sanity(format!("record runtime checksum: {e}"))));
                }
            }
            report.sanity = sanity;
        }
        report.provision = Some(outcome);
    } else {
        tracing::info!("network database selected; skipping sqlite seed");
        if let Some(hook) = &settings.migrate {
            let hook = hook.clone().with_env("DATABASE_URL", settings.database_url());
            if let Err(e) = run_hook(&hook) {
                report.warnings.push(warn(BootError::Migration(e.to_string())));
            }
        }
    }

    for job in &settings.jobs {
        let job: Hook = job.clone().with_env("DATABASE_URL", settings.database_url());
        if let Err(e) = run_hook(&job) {
            report.warnings.push(warn(BootError::Job { name: job.name.clone(), message: e.to_string() }));
        }
    }
    Ok(report)
}

/// Sanity report for the runtime database. Findings are logged; with
/// `strict`, query failures abort the boot. A missing table never does.
pub fn sanity_check(
    runtime: &Path,
    opts: &SanityOptions,
    strict: bool,
) -> Result<(Option<SanityReport>, Vec<BootError>)> {
    let mut warnings = Vec::new();
    let report = match Db::open_existing(runtime).and_then(|db| db.sanity_check(opts)) {
        Ok(r) => r,
        Err(e) => {
            let err = BootError::Sanity(format!("{e:#}"));
            if strict {
                bail!(err);
            }
            warnings.push(warn(err));
            return Ok((None, warnings));
        }
    };

    if !report.present {
        warnings.push(warn(BootError::MissingTable(report.table.clone())));
        return Ok((Some(report), warnings));
    }

    let span = report.span.clone().unwrap_or_default();
    tracing::info!(
        table = %report.table,
        rows = report.rows.unwrap_or(-1),
        date_min = span.min.as_deref().unwrap_or("-"),
        date_max = span.max.as_deref().unwrap_or("-"),
        normalized = report.normalized.unwrap_or(0),
        "runtime database sanity"
    );
    for w in &report.warnings {
        let err = BootError::Sanity(w.clone());
        if strict {
            bail!(err);
        }
        warnings.push(warn(err));
    }
    Ok((Some(report), warnings))
}

fn warn(err: BootError) -> BootError {
    tracing::warn!(kind = err.kind(), "{err}; continuing");
    err
}

fn fatal(err: BootError) -> anyhow::Error {
    tracing::error!(kind = err.kind(), "{err}; aborting startup");
    anyhow::Error::new(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use std::fs;

    fn settings(dir: &Path, env: &[(&str, &str)]) -> Settings {
        let env: Vec<(String, String)> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let cli = Overrides {
            seed: Some(dir.join("seed.db")),
            runtime: Some(dir.join("vol/racing.db")),
            ..Overrides::default()
        };
        Settings::resolve(
            None,
            move |k| env.iter().find(|(ek, _)| ek == k).map(|(_, v)| v.clone()),
            &cli,
        )
        .unwrap()
    }

    #[test]
    fn sqlite_boot_provisions_and_tolerates_non_database_seed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("seed.db"), b"not really sqlite").unwrap();
        let s = settings(dir.path(), &[]);
        let report = run_boot(&s, "run-1").unwrap();
        assert!(report.provision.unwrap().decision.requires_copy());
        assert!(report.warnings.iter().all(|w| !w.is_fatal()));
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn missing_seed_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path(), &[]);
        let err = run_boot(&s, "run-1").unwrap_err();
        assert!(matches!(err.downcast_ref::<BootError>(), Some(BootError::MissingSeed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn failed_migration_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path(), &[("DATABASE_URL", "postgresql://app:pw@localhost/racing")]);
        s.migrate = Some(Hook::new("migrate", &["sh", "-c", "exit 4"]));
        s.jobs = vec![Hook::new("daily", &["sh", "-c", "test -n \"$DATABASE_URL\""])];
        let report = run_boot(&s, "run-1").unwrap();
        assert!(report.provision.is_none());
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(report.warnings[0], BootError::Migration(_)));
    }

    #[test]
    fn strict_sanity_escalates_query_failures() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.db");
        fs::write(&garbage, b"definitely not sqlite, long enough to have a header").unwrap();
        assert!(sanity_check(&garbage, &SanityOptions::default(), true).is_err());
        let (r, w) = sanity_check(&garbage, &SanityOptions::default(), false).unwrap();
        assert!(r.is_none());
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn normalized_fresh_copy_is_up_to_date_next_boot() {
        let dir = tempfile::tempdir().unwrap();
        rusqlite::Connection::open(dir.path().join("seed.db"))
            .unwrap()
            .execute_batch(
                "CREATE TABLE race_program (id INTEGER PRIMARY KEY, date TEXT);
                 INSERT INTO race_program(date) VALUES ('2025-03-02 00:00:00'), ('2025-03-03');",
            )
            .unwrap();
        let s = settings(dir.path(), &[]);

        let first = run_boot(&s, "run-1").unwrap();
        assert_eq!(first.sanity.unwrap().normalized, Some(1));
        assert!(first.warnings.is_empty());
        let marker = s.volume().read_marker().unwrap();
        assert_ne!(marker.runtime_checksum, marker.seed_checksum);

        let second = run_boot(&s, "run-2").unwrap();
        let decision = second.provision.unwrap().decision;
        assert!(!decision.requires_copy(), "{decision:?}");
        assert_eq!(second.sanity.unwrap().normalized, Some(0));
    }
}
