use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod boot;
mod config;
mod handoff;

use config::{Overrides, Settings};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Args)]
struct ProvisionArgs {
    /// Bundled seed database (env SEED_PATH)
    #[arg(long, value_name = "FILE")]
    seed: Option<PathBuf>,
    /// Runtime database on the persistent volume (env RUNTIME_PATH, or the sqlite DATABASE_URL path)
    #[arg(long, value_name = "FILE")]
    runtime: Option<PathBuf>,
    /// Provisioning marker file (default: .seed_meta.txt next to the runtime database)
    #[arg(long, value_name = "FILE")]
    marker: Option<PathBuf>,
    /// Overwrite the runtime database even if it is up to date (env FORCE_SEED)
    #[arg(long, default_value_t = false)]
    force: bool,
}

impl ProvisionArgs {
    fn overrides(self, server: Vec<String>) -> Overrides {
        Overrides { seed: self.seed, runtime: self.runtime, marker: self.marker, force: self.force, server }
    }
}

#[derive(Debug, Parser)]
#[command(name = "seedboot", version, about = "Seed the runtime database from the deployment bundle, then exec the server")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./seedboot.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Provision, check, migrate, then exec the server
    Run {
        #[command(flatten)]
        args: ProvisionArgs,
        /// Server command; `{port}` and `{database_url}` are substituted
        #[arg(last = true, value_name = "SERVER")]
        server: Vec<String>,
    },
    /// Provision the runtime database and exit
    Provision {
        #[command(flatten)]
        args: ProvisionArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show what provisioning would do without touching the volume
    Plan {
        #[command(flatten)]
        args: ProvisionArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Report row count and date span of the runtime database (read only)
    Check {
        #[arg(long, value_name = "FILE")]
        runtime: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Compute sha256 and blake3 digests of files (JSON lines)
    Hash { files: Vec<PathBuf> },
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

fn resolve(cfg: Option<&config::Config>, overrides: &Overrides) -> Result<Settings> {
    Settings::resolve(cfg, |k| std::env::var(k).ok(), overrides)
}

fn print_outcome(outcome: &provision::Outcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let d = outcome.decision;
            println!("{} ({}): {}", d.action, d.reason, d.reason.describe());
            println!("seed    {} {}", outcome.algorithm.name(), checksum::display_digest(outcome.seed_checksum.as_deref()));
            println!("runtime {} {}", outcome.algorithm.name(), checksum::display_digest(outcome.runtime_checksum.as_deref()));
            if let Some(n) = outcome.bytes_copied {
                println!("copied  {n} bytes");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(outcome)?),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();
    init_logging();
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    let loaded_cfg = config::load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Version => {
            println!("seedboot {} (core {})", env!("CARGO_PKG_VERSION"), seedboot_core::version());
        }
        Commands::Run { args, server } => {
            let settings = resolve(loaded_cfg.as_ref(), &args.overrides(server))?;
            let run_id = Uuid::now_v7().to_string();
            let span = tracing::info_span!("boot", run_id = %run_id);
            let _guard = span.enter();
            tracing::info!("seedboot {} starting", env!("CARGO_PKG_VERSION"));
            boot::run_boot(&settings, &run_id)?;
            let envs = [("DATABASE_URL", settings.database_url()), ("PORT", settings.port.to_string())];
            handoff::exec_server(&settings.server_argv(), &settings.server_argv_for_log(), &envs)?;
        }
        Commands::Provision { args, format } => {
            let settings = resolve(loaded_cfg.as_ref(), &args.overrides(Vec::new()))?;
            let run_id = Uuid::now_v7().to_string();
            let outcome = provision::provision(
                &settings.seed(),
                &settings.volume(),
                &boot::provision_options(&settings, &run_id),
            )?;
            print_outcome(&outcome, format)?;
        }
        Commands::Plan { args, format } => {
            let settings = resolve(loaded_cfg.as_ref(), &args.overrides(Vec::new()))?;
            let outcome = provision::plan(
                &settings.seed(),
                &settings.volume(),
                &boot::provision_options(&settings, "plan"),
            )?;
            print_outcome(&outcome, format)?;
        }
        Commands::Check { runtime, format } => {
            let overrides = Overrides { runtime, ..Overrides::default() };
            let settings = resolve(loaded_cfg.as_ref(), &overrides)?;
            // read-only report: no date rewriting
            let opts = seed_sqlite::SanityOptions {
                normalize_dates: false,
                ..settings.sanity.clone().unwrap_or_default()
            };
            let db = seed_sqlite::Db::open_existing(&settings.runtime_path)?;
            let report = db.sanity_check(&opts)?;
            match format {
                OutputFormat::Text => {
                    if !report.present {
                        println!("{}: table not found", report.table);
                    } else {
                        let span = report.span.clone().unwrap_or_default();
                        println!(
                            "{}: rows={} span=({}, {})",
                            report.table,
                            report.rows.map(|n| n.to_string()).unwrap_or_else(|| "?".into()),
                            span.min.unwrap_or_default(),
                            span.max.unwrap_or_default(),
                        );
                    }
                    for w in &report.warnings {
                        println!("warning: {w}");
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
            }
        }
        Commands::Hash { files } => {
            for p in files {
                match checksum::hash_file(&p) {
                    Ok(info) => println!("{}", serde_json::to_string(&info)?),
                    Err(e) => {
                        let obj = serde_json::json!({ "path": p.to_string_lossy(), "error": e.to_string() });
                        println!("{}", serde_json::to_string(&obj)?);
                    }
                }
            }
        }
    }
    Ok(())
}
