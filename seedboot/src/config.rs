//! Settings resolution: defaults, then `seedboot.yaml`, then the environment,
//! then CLI flags.

use anyhow::{anyhow, bail, Context, Result};
use checksum::Algorithm;
use hooks::Hook;
use provision::{ChecksumPolicy, Seed, Volume};
use seed_sqlite::SanityOptions;
use seedboot_core::{parse_flag, StoreUrl};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "seedboot.yaml";
pub const DEFAULT_SEED: &str = "data/racing.db";
pub const DEFAULT_RUNTIME: &str = "/data/racing.db";
pub const DEFAULT_PORT: u16 = 10000;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct SeedConfig {
    pub path: Option<PathBuf>,
    pub version_file: Option<PathBuf>,
    pub version: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct RuntimeConfig {
    pub path: Option<PathBuf>,
    pub marker: Option<PathBuf>,
    pub algorithm: Option<Algorithm>,
    pub checksum_policy: Option<ChecksumPolicy>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct SanityConfig {
    pub enabled: Option<bool>,
    pub table: Option<String>,
    pub date_column: Option<String>,
    pub normalize_dates: Option<bool>,
    pub strict: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct MigrateConfig {
    pub enabled: Option<bool>,
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ServerConfig {
    pub command: Option<Vec<String>>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub force: Option<bool>,
    pub seed: Option<SeedConfig>,
    pub runtime: Option<RuntimeConfig>,
    pub sanity: Option<SanityConfig>,
    pub migrate: Option<MigrateConfig>,
    pub jobs: Option<Vec<Hook>>,
    pub server: Option<ServerConfig>,
}

/// Load the YAML config. Without an explicit path, `./seedboot.yaml` is used
/// when present. A file that exists but does not parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if !p.exists() {
                return Ok(None);
            }
            p.to_path_buf()
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("read config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parse config {}", path.display()))?;
    Ok(Some(cfg))
}

/// Flags shared by the provisioning subcommands.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub seed: Option<PathBuf>,
    pub runtime: Option<PathBuf>,
    pub marker: Option<PathBuf>,
    pub force: bool,
    pub server: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreUrl,
    pub seed_path: PathBuf,
    pub seed_version_file: Option<PathBuf>,
    pub seed_version: Option<String>,
    pub runtime_path: PathBuf,
    pub marker_path: Option<PathBuf>,
    pub force: bool,
    pub algorithm: Algorithm,
    pub policy: ChecksumPolicy,
    pub sanity: Option<SanityOptions>,
    pub strict_sanity: bool,
    pub migrate: Option<Hook>,
    pub jobs: Vec<Hook>,
    pub server_command: Vec<String>,
    pub port: u16,
}

impl Settings {
    /// Resolve settings. `lookup` reads environment variables so tests need
    /// not touch the process environment.
    pub fn resolve(
        cfg: Option<&Config>,
        lookup: impl Fn(&str) -> Option<String>,
        cli: &Overrides,
    ) -> Result<Settings> {
        let cfg = cfg.cloned().unwrap_or_default();
        let seed_cfg = cfg.seed.unwrap_or_default();
        let rt_cfg = cfg.runtime.unwrap_or_default();
        let sanity_cfg = cfg.sanity.unwrap_or_default();
        let migrate_cfg = cfg.migrate.unwrap_or_default();
        let server_cfg = cfg.server.unwrap_or_default();
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let url = match env("DATABASE_URL").or(cfg.database_url) {
            Some(raw) => Some(raw.parse::<StoreUrl>().map_err(|e| anyhow!("DATABASE_URL: {e}"))?),
            None => None,
        };
        let runtime_path = cli
            .runtime
            .clone()
            .or_else(|| env("RUNTIME_PATH").map(PathBuf::from))
            .or_else(|| url.as_ref().and_then(|u| u.sqlite_path().map(Path::to_path_buf)))
            .or(rt_cfg.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME));
        let store = match url {
            Some(u @ StoreUrl::Network(_)) => u,
            _ => StoreUrl::sqlite(runtime_path.clone()),
        };

        let seed_path = cli
            .seed
            .clone()
            .or_else(|| env("SEED_PATH").map(PathBuf::from))
            .or(seed_cfg.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SEED));

        let env_force = match env("FORCE_SEED") {
            Some(raw) => Some(parse_flag(&raw).ok_or_else(|| anyhow!("FORCE_SEED: not a boolean: {raw:?}"))?),
            None => None,
        };
        // --force can only turn it on; FORCE_SEED=0 switches off the config value
        let force = cli.force || env_force.or(cfg.force).unwrap_or(false);

        let port = match env("PORT") {
            Some(raw) => raw.parse::<u16>().with_context(|| format!("PORT: invalid port {raw:?}"))?,
            None => server_cfg.port.unwrap_or(DEFAULT_PORT),
        };

        let sanity = if sanity_cfg.enabled.unwrap_or(true) {
            let defaults = SanityOptions::default();
            Some(SanityOptions {
                table: sanity_cfg.table.unwrap_or(defaults.table),
                date_column: match sanity_cfg.date_column {
                    Some(c) if c.trim().is_empty() => None,
                    Some(c) => Some(c),
                    None => defaults.date_column,
                },
                normalize_dates: sanity_cfg.normalize_dates.unwrap_or(defaults.normalize_dates),
            })
        } else {
            None
        };

        let migrate = if migrate_cfg.enabled.unwrap_or(true) {
            let command = migrate_cfg
                .command
                .unwrap_or_else(|| to_strings(&["python", "-m", "api.init_pg_schema"]));
            if command.is_empty() {
                bail!("migrate.command is empty");
            }
            Some(Hook { name: "migrate".into(), command, env: Default::default() })
        } else {
            None
        };

        let server_command = if !cli.server.is_empty() {
            cli.server.clone()
        } else {
            server_cfg.command.unwrap_or_else(|| {
                to_strings(&["uvicorn", "api.main:app", "--host", "0.0.0.0", "--port", "{port}"])
            })
        };
        if server_command.is_empty() {
            bail!("server.command is empty");
        }

        Ok(Settings {
            store,
            seed_path,
            seed_version_file: seed_cfg.version_file,
            seed_version: env("SEED_VERSION").or(seed_cfg.version),
            runtime_path,
            marker_path: cli.marker.clone().or(rt_cfg.marker),
            force,
            algorithm: rt_cfg.algorithm.unwrap_or_default(),
            policy: rt_cfg.checksum_policy.unwrap_or_default(),
            sanity,
            strict_sanity: sanity_cfg.strict.unwrap_or(false),
            migrate,
            jobs: cfg.jobs.unwrap_or_default(),
            server_command,
            port,
        })
    }

    pub fn seed(&self) -> Seed {
        let seed = Seed::new(&self.seed_path).with_version(self.seed_version.clone());
        match &self.seed_version_file {
            Some(f) => seed.with_version_file(f),
            None => seed,
        }
    }

    pub fn volume(&self) -> Volume {
        match &self.marker_path {
            Some(m) => Volume::new(&self.runtime_path, m),
            None => Volume::with_default_marker(&self.runtime_path),
        }
    }

    /// The `DATABASE_URL` handed to hooks and the server.
    pub fn database_url(&self) -> String {
        self.store.to_url_string()
    }

    /// Server argv with `{port}` and `{database_url}` substituted.
    pub fn server_argv(&self) -> Vec<String> {
        self.substitute_server_argv(&self.database_url())
    }

    /// Same as [`Settings::server_argv`] with the database password masked.
    pub fn server_argv_for_log(&self) -> Vec<String> {
        self.substitute_server_argv(&self.store.to_string())
    }

    fn substitute_server_argv(&self, url: &str) -> Vec<String> {
        let port = self.port.to_string();
        self.server_command
            .iter()
            .map(|a| a.replace("{port}", &port).replace("{database_url}", url))
            .collect()
    }
}

fn to_strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let s = Settings::resolve(None, env_of(&[]), &Overrides::default()).unwrap();
        assert_eq!(s.seed_path, PathBuf::from(DEFAULT_SEED));
        assert_eq!(s.runtime_path, PathBuf::from(DEFAULT_RUNTIME));
        assert_eq!(s.database_url(), "sqlite:////data/racing.db");
        assert_eq!(s.port, DEFAULT_PORT);
        assert!(!s.force);
        assert_eq!(s.volume().marker_path(), Path::new("/data/.seed_meta.txt"));
        assert_eq!(
            s.server_argv(),
            vec!["uvicorn", "api.main:app", "--host", "0.0.0.0", "--port", "10000"]
        );
        assert!(s.sanity.is_some());
    }

    #[test]
    fn sqlite_url_sets_runtime_and_cli_wins() {
        let env = env_of(&[("DATABASE_URL", "sqlite:////mnt/vol/app.db"), ("PORT", "8080")]);
        let s = Settings::resolve(None, &env, &Overrides::default()).unwrap();
        assert_eq!(s.runtime_path, PathBuf::from("/mnt/vol/app.db"));
        assert_eq!(s.port, 8080);

        let cli = Overrides { runtime: Some("/tmp/other.db".into()), ..Overrides::default() };
        let s = Settings::resolve(None, &env, &cli).unwrap();
        assert_eq!(s.runtime_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(s.database_url(), "sqlite:////tmp/other.db");
    }

    #[test]
    fn network_store_is_kept() {
        let env = env_of(&[("DATABASE_URL", "postgresql://app:pw@db:5432/racing")]);
        let s = Settings::resolve(None, env, &Overrides::default()).unwrap();
        assert!(!s.store.is_local());
        assert_eq!(s.database_url(), "postgresql://app:pw@db:5432/racing");
        assert_eq!(s.migrate.unwrap().command, vec!["python", "-m", "api.init_pg_schema"]);
    }

    #[test]
    fn force_sources() {
        let s = Settings::resolve(None, env_of(&[("FORCE_SEED", "yes")]), &Overrides::default()).unwrap();
        assert!(s.force);
        let cli = Overrides { force: true, ..Overrides::default() };
        assert!(Settings::resolve(None, env_of(&[("FORCE_SEED", "0")]), &cli).unwrap().force);
        assert!(Settings::resolve(None, env_of(&[("FORCE_SEED", "sometimes")]), &Overrides::default()).is_err());
    }

    #[test]
    fn force_env_overrides_config() {
        let cfg: Config = serde_yaml::from_str("force: true\n").unwrap();
        assert!(Settings::resolve(Some(&cfg), env_of(&[]), &Overrides::default()).unwrap().force);
        assert!(!Settings::resolve(Some(&cfg), env_of(&[("FORCE_SEED", "0")]), &Overrides::default()).unwrap().force);
        let cfg: Config = serde_yaml::from_str("force: false\n").unwrap();
        assert!(Settings::resolve(Some(&cfg), env_of(&[("FORCE_SEED", "on")]), &Overrides::default()).unwrap().force);
    }

    #[test]
    fn logged_server_argv_masks_password() {
        let env = env_of(&[("DATABASE_URL", "postgresql://app:hunter2@db:5432/racing")]);
        let cli = Overrides { server: to_strings(&["serve", "--db", "{database_url}"]), ..Overrides::default() };
        let s = Settings::resolve(None, env, &cli).unwrap();
        assert_eq!(s.server_argv()[2], "postgresql://app:hunter2@db:5432/racing");
        assert_eq!(s.server_argv_for_log()[2], "postgresql://app:***@db:5432/racing");
    }

    #[test]
    fn bad_port_and_url_are_errors() {
        assert!(Settings::resolve(None, env_of(&[("PORT", "http")]), &Overrides::default()).is_err());
        assert!(Settings::resolve(None, env_of(&[("DATABASE_URL", "sqlite://")]), &Overrides::default()).is_err());
    }

    #[test]
    fn yaml_config_layers_under_env() {
        let yaml = r#"
seed:
  path: /app/data/seed.db
  version: "2025.01"
runtime:
  path: /vol/racing.db
  algorithm: blake3
  checksum_policy: applied
sanity:
  date_column: ""
  strict: true
migrate:
  enabled: false
jobs:
  - name: daily
    command: ["python", "-m", "api.daily_job"]
server:
  port: 9000
  command: ["gunicorn", "-b", "0.0.0.0:{port}"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let s = Settings::resolve(Some(&cfg), env_of(&[("SEED_VERSION", "2025.02")]), &Overrides::default()).unwrap();
        assert_eq!(s.seed_path, PathBuf::from("/app/data/seed.db"));
        assert_eq!(s.seed_version.as_deref(), Some("2025.02"));
        assert_eq!(s.runtime_path, PathBuf::from("/vol/racing.db"));
        assert_eq!(s.algorithm, Algorithm::Blake3);
        assert_eq!(s.policy, ChecksumPolicy::Applied);
        assert!(s.sanity.as_ref().unwrap().date_column.is_none());
        assert!(s.strict_sanity);
        assert!(s.migrate.is_none());
        assert_eq!(s.jobs.len(), 1);
        assert_eq!(s.jobs[0].name, "daily");
        assert_eq!(s.server_argv(), vec!["gunicorn", "-b", "0.0.0.0:9000"]);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.yaml"))).is_err());
        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "seed: [unclosed").unwrap();
        assert!(load_config(Some(&bad)).is_err());
    }
}
