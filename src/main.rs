pub mod models {
    pub mod domain;
    pub mod kma;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod error;
pub mod geo;
pub mod geocode;
pub mod physics;
pub mod risk;
pub mod schema;
pub mod store;
pub mod utils;
pub mod services {
    pub mod aggregate;
    pub mod ingest;
    pub mod locate;
    pub mod notify;
    pub mod outlook;
    pub mod scheduler;
    pub mod synthetic;
    pub mod ventilation;
}

use crate::client::{ForecastClient, ForecastSource};
use crate::config::{Config, ForecastBackend};
use crate::geocode::GeocodeClient;
use crate::services::ingest::FetchCache;
use crate::services::notify::LogNotifier;
use crate::services::scheduler::{self, Job, JobContext, Schedule};
use crate::services::synthetic::SyntheticForecastSource;
use crate::services::{aggregate, locate, outlook};
use crate::store::PgStore;
use crate::utils::utc_to_local;
use chrono::Utc;
use diesel::PgConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{error, info, warn};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

/// What this invocation does after setup.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    /// Run the daily triggers until killed.
    Serve,
    /// Run the given jobs once, in order, and exit.
    Jobs(Vec<Job>),
    Recompute(i64),
    Relocate { user_id: i64, address: String },
    Show(i64),
    Outlook(i64),
}

#[derive(Debug, PartialEq)]
struct CliArgs {
    env_file: Option<PathBuf>,
    command: Command,
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("encoding output failed: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn run(command: Command) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    let source_name = match &cfg.forecast {
        ForecastBackend::Kma { .. } => "kma",
        ForecastBackend::Synthetic { .. } => "synthetic",
    };
    info!(
        "Config loaded (source={}, cells={}, utc_offset={}, ingest_at={}, risk_at={}, notify_at={}, \
         risk_rows={:?}, geocoder={}, bootstrap={})",
        source_name,
        cfg.cells.len(),
        cfg.utc_offset,
        cfg.ingest_at.format("%H:%M"),
        cfg.risk_at.format("%H:%M"),
        cfg.notify_at.format("%H:%M"),
        cfg.risk_row_mode,
        cfg.geocoder.is_some(),
        cfg.bootstrap_enabled
    );

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    apply_database_migrations(&mut conn)?;
    let mut store = PgStore::new(conn, cfg.risk_row_mode);

    // 4) Wire collaborators
    let source: Box<dyn ForecastSource> = match &cfg.forecast {
        ForecastBackend::Kma { api_key, base_url } => {
            Box::new(ForecastClient::new(base_url.as_str(), api_key.as_str(), cfg.http_timeout))
        }
        ForecastBackend::Synthetic { seed } => Box::new(SyntheticForecastSource::new(*seed)),
    };
    let notifier = LogNotifier;
    let ctx = JobContext {
        source: source.as_ref(),
        notifier: &notifier,
        cells: &cfg.cells,
        tz: cfg.utc_offset,
        ventilation: cfg.ventilation,
    };

    let now = Utc::now();
    let today = utc_to_local(now, cfg.utc_offset).date();

    // 5) Dispatch
    match command {
        Command::Serve => {
            let schedule = Schedule {
                ingest_at: cfg.ingest_at,
                risk_at: cfg.risk_at,
                notify_at: cfg.notify_at,
                tick: cfg.scheduler_tick,
            };
            scheduler::run_loop(&mut store, &ctx, &schedule, cfg.bootstrap_enabled)
        }
        Command::Jobs(jobs) => {
            let mut cache = FetchCache::new();
            for job in jobs {
                match scheduler::run_job(&mut store, &ctx, &mut cache, job, Utc::now())
                    .map_err(|e| format!("job {} aborted: {}", job.name(), e))?
                {
                    Some(report) if report.is_failure() => return Err(format!("job {} failed", job.name())),
                    Some(_) => {}
                    None => warn!("Job {} skipped: another runner holds its lock", job.name()),
                }
            }
            Ok(())
        }
        Command::Recompute(user_id) => {
            let a = aggregate::recompute_user(&mut store, user_id, today, cfg.utc_offset, now)
                .map_err(|e| format!("recompute for user {} failed: {}", user_id, e))?;
            print_json(&a)
        }
        Command::Relocate { user_id, address } => {
            let geo = cfg
                .geocoder
                .as_ref()
                .ok_or_else(|| "relocation requires GEOCODER_API_KEY".to_string())?;
            let geocoder = GeocodeClient::new(geo.base_url.as_str(), geo.api_key.as_str(), cfg.http_timeout);
            let moved = locate::relocate(&mut store, &geocoder, &cfg.cells, user_id, &address, now, cfg.utc_offset)
                .map_err(|e| format!("relocation of user {} failed: {}", user_id, e))?;
            print_json(&moved)
        }
        Command::Show(user_id) => {
            let view = outlook::current_risk(&mut store, user_id).map_err(|e| e.to_string())?;
            print_json(&view)
        }
        Command::Outlook(user_id) => {
            let view = outlook::daily_outlook(&mut store, user_id, now, cfg.utc_offset, &cfg.ventilation)
                .map_err(|e| e.to_string())?;
            print_json(&view)
        }
    }
}

fn next_value(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<String, String> {
    let value = args
        .next()
        .ok_or_else(|| format!("`{}` requires an argument", flag))?;
    value
        .into_string()
        .map_err(|_| format!("`{}` argument contains invalid UTF-8", flag))
}

fn next_user_id(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<i64, String> {
    let raw = next_value(args, flag)?;
    raw.parse::<i64>()
        .map_err(|_| format!("`{}` expects a numeric user id, got {:?}", flag, raw))
}

fn parse_cli(mut args: impl Iterator<Item = OsString>) -> Result<CliArgs, String> {
    let mut env_file: Option<PathBuf> = None;
    let mut command: Option<Command> = None;

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let parsed = match arg.as_str() {
            "--env-file" => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                env_file = Some(PathBuf::from(next_value(&mut args, "--env-file")?));
                continue;
            }
            s if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path = &s["--env-file=".len()..];
                if path.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path));
                continue;
            }
            "--serve" => Command::Serve,
            "--job" => {
                let name = next_value(&mut args, "--job")?;
                if name == "all" {
                    Command::Jobs(vec![Job::Ingest, Job::Risk, Job::Notify])
                } else {
                    let job = Job::parse(&name)
                        .ok_or_else(|| format!("unknown job {:?} (ingest, risk, notify, all)", name))?;
                    Command::Jobs(vec![job])
                }
            }
            "--recompute" => Command::Recompute(next_user_id(&mut args, "--recompute")?),
            "--relocate" => {
                let user_id = next_user_id(&mut args, "--relocate")?;
                let address = next_value(&mut args, "--relocate")?;
                Command::Relocate { user_id, address }
            }
            "--show" => Command::Show(next_user_id(&mut args, "--show")?),
            "--outlook" => Command::Outlook(next_user_id(&mut args, "--outlook")?),
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        };
        if command.is_some() {
            return Err("only one command may be given".to_string());
        }
        command = Some(parsed);
    }

    Ok(CliArgs {
        env_file,
        command: command.unwrap_or(Command::Serve),
    })
}

fn load_env(env_file: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        return Ok(Some(LoadedEnvFile { path, explicit: true }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    load_env_file(&default_path)?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
    }))
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (index, line) in text.lines().enumerate() {
        let parsed = parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?;
        let Some((key, value)) = parsed else { continue };
        // Values already in the process environment win.
        if std::env::var_os(&key).is_none() {
            // Single-threaded at this point; set_var is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// `KEY=value`, optionally prefixed with `export`. Blank lines and `#` comments yield `None`.
fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, raw) = line
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }
    Ok(Some((key.to_string(), parse_env_value(raw.trim())?)))
}

fn parse_env_value(raw: &str) -> Result<String, String> {
    let quote = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        // unquoted values end at an inline comment
        _ => return Ok(raw.split('#').next().unwrap_or_default().trim_end().to_string()),
    };

    let mut value = String::new();
    let mut chars = raw[1..].chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quote == '"' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some(other) => value.push(other),
                None => return Err("unterminated escape sequence in double-quoted value".to_string()),
            },
            c if c == quote => {
                let rest = chars.as_str().trim();
                return if rest.is_empty() || rest.starts_with('#') {
                    Ok(value)
                } else {
                    Err(format!("unexpected characters after closing {} quote", quote))
                };
            }
            c => value.push(c),
        }
    }
    Err(format!("unterminated {}-quoted value", quote))
}

fn main() {
    let cli = match parse_cli(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };
    let loaded_env = match load_env(cli.env_file) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "moldcast {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Result<CliArgs, String> {
        parse_cli(args.iter().map(OsString::from))
    }

    #[test]
    fn no_arguments_means_serve() {
        assert_eq!(cli(&[]).unwrap().command, Command::Serve);
    }

    #[test]
    fn job_all_expands_in_pipeline_order() {
        let parsed = cli(&["--env-file", "prod.env", "--job", "all"]).unwrap();
        assert_eq!(parsed.env_file, Some(PathBuf::from("prod.env")));
        assert_eq!(parsed.command, Command::Jobs(vec![Job::Ingest, Job::Risk, Job::Notify]));
    }

    #[test]
    fn relocate_takes_user_and_address() {
        let parsed = cli(&["--relocate", "42", "서울 중구 세종대로 110"]).unwrap();
        assert_eq!(
            parsed.command,
            Command::Relocate {
                user_id: 42,
                address: "서울 중구 세종대로 110".to_string()
            }
        );
    }

    #[test]
    fn bad_invocations_are_rejected() {
        assert!(cli(&["--job", "backfill"]).is_err());
        assert!(cli(&["--show", "abc"]).is_err());
        assert!(cli(&["--show", "1", "--recompute", "2"]).is_err());
        assert!(cli(&["--env-file=a", "--env-file", "b"]).is_err());
        assert!(cli(&["--relocate", "1"]).is_err());
    }

    #[test]
    fn env_lines_follow_dotenv_conventions() {
        assert_eq!(parse_env_line("  # comment").unwrap(), None);
        assert_eq!(
            parse_env_line("export GRID_CELLS=Seoul:60:127 # inline").unwrap(),
            Some(("GRID_CELLS".to_string(), "Seoul:60:127".to_string()))
        );
        assert_eq!(
            parse_env_line(r#"FORECAST_API_KEY="a#b\"c""#).unwrap(),
            Some(("FORECAST_API_KEY".to_string(), "a#b\"c".to_string()))
        );
        assert_eq!(
            parse_env_line("RISK_ROW_MODE='history' # keep all days").unwrap(),
            Some(("RISK_ROW_MODE".to_string(), "history".to_string()))
        );
        assert!(parse_env_line("NO_EQUALS").is_err());
        assert!(parse_env_line("BAD KEY=1").is_err());
        assert!(parse_env_line("X=\"open").is_err());
    }
}
