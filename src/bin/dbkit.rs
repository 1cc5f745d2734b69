use dbkit::config::{self, Config};
use dbkit::core::db::{Connection, DbParams, SharedConnection};
use dbkit::core::{DbError, Result};
use dbkit::profiler::Profiler;
use dbkit::storage::ProfileStore;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;

const USAGE: &str = "usage: dbkit [--config PATH] [--json] [--store PATH] [DSN] SQL...

Without a DSN or --config the default configuration file is used.";

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    json: bool,
    store: Option<PathBuf>,
    dsn: Option<String>,
    statements: Vec<String>,
}

impl CliArgs {
    /// Parses arguments (without the program name).
    ///
    /// Without `--config`, a first positional argument shaped like
    /// `driver:...` is taken as the DSN.
    fn parse<I: IntoIterator<Item = String>>(args: I) -> std::result::Result<Self, String> {
        let mut parsed = CliArgs::default();
        let mut positional = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().ok_or("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--store" => {
                    let path = args.next().ok_or("--store needs a path")?;
                    parsed.store = Some(PathBuf::from(path));
                }
                "--json" => parsed.json = true,
                flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
                _ => positional.push(arg),
            }
        }

        if parsed.config.is_none() && positional.first().map_or(false, |p| looks_like_dsn(p)) {
            parsed.dsn = Some(positional.remove(0));
        }
        parsed.statements = positional;

        if parsed.statements.is_empty() {
            return Err("no SQL statement given".to_string());
        }
        Ok(parsed)
    }
}

/// `driver:rest` with an alphanumeric driver name
fn looks_like_dsn(arg: &str) -> bool {
    arg.split_once(':')
        .map_or(false, |(driver, _)| !driver.is_empty() && driver.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn open_connection(args: &CliArgs) -> Result<Rc<Connection>> {
    if let Some(dsn) = &args.dsn {
        return Ok(Rc::new(Connection::open(DbParams::new(dsn.clone()))?));
    }

    let path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()
            .filter(|p| p.exists())
            .ok_or_else(|| DbError::Config("no DSN given and no default config file".to_string()))?,
    };
    info!("Loading configuration from {:?}", path);
    let config: Config = config::load_config(path)?;
    SharedConnection::from_config(&config)?.instance()
}

fn run(args: &CliArgs) -> Result<()> {
    let conn = open_connection(args)?;
    conn.profiler_mut().set_enabled(true);

    for sql in &args.statements {
        let mut stmt = conn.prepare(sql)?;
        stmt.execute(None)?;
        for record in stmt.fetch_all() {
            println!("{}", record.display_values().join("\t"));
        }
    }

    let profiler = conn.profiler();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&json_report(&profiler))?);
    } else {
        print_report(&profiler);
    }

    if let Some(path) = &args.store {
        let store = ProfileStore::new(path.clone())?;
        let saved = store.save(&profiler)?;
        info!("Stored {} profile(s) in session {}", saved, store.session_id());
    }

    Ok(())
}

fn json_report(profiler: &Profiler) -> serde_json::Value {
    let profiles: Vec<serde_json::Value> = profiler
        .query_profiles(None, true)
        .into_iter()
        .map(|(handle, profile)| {
            let mut json = profile.to_json();
            json["handle"] = serde_json::Value::from(handle.index());
            json
        })
        .collect();

    serde_json::json!({
        "profiles": profiles,
        "summary": profiler.summary(),
        "total_queries": profiler.total_num_queries(None),
        "total_elapsed_secs": profiler.total_elapsed_secs(None),
    })
}

fn print_report(profiler: &Profiler) {
    eprintln!("-- profile --");
    for (handle, profile) in profiler.query_profiles(None, true) {
        let elapsed = profile
            .elapsed_secs()
            .map(|s| format!("{:.6}s", s))
            .unwrap_or_else(|| "unfinished".to_string());
        eprintln!(
            "#{:<4} {:<12} {:>12}  {}",
            handle.index(),
            profile.category().to_string(),
            elapsed,
            profile.query()
        );
    }
    eprintln!(
        "total: {} queries, {:.6}s",
        profiler.total_num_queries(None),
        profiler.total_elapsed_secs(None)
    );
}

fn main() {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::result::Result<CliArgs, String> {
        CliArgs::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_dsn_and_statements() {
        let parsed = args(&["sqlite::memory:", "SELECT 1", "SELECT 2"]).unwrap();
        assert_eq!(parsed.dsn.as_deref(), Some("sqlite::memory:"));
        assert_eq!(parsed.statements, vec!["SELECT 1", "SELECT 2"]);
        assert!(!parsed.json);
    }

    #[test]
    fn test_parse_config_and_flags() {
        let parsed = args(&["--config", "db.toml", "--json", "SELECT 1"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("db.toml")));
        assert_eq!(parsed.dsn, None);
        assert!(parsed.json);
        assert_eq!(parsed.statements, vec!["SELECT 1"]);
    }

    #[test]
    fn test_parse_without_dsn() {
        let parsed = args(&["SELECT :id"]).unwrap();
        assert_eq!(parsed.dsn, None);
        assert_eq!(parsed.statements, vec!["SELECT :id"]);
    }

    #[test]
    fn test_looks_like_dsn() {
        assert!(looks_like_dsn("sqlite::memory:"));
        assert!(looks_like_dsn("sqlite:/tmp/app.db"));
        assert!(!looks_like_dsn("SELECT :id"));
        assert!(!looks_like_dsn(":memory:"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(args(&[]).is_err());
        assert!(args(&["sqlite::memory:"]).is_err());
        assert!(args(&["--store"]).is_err());
        assert!(args(&["--verbose", "sqlite::memory:", "SELECT 1"]).is_err());
    }

    #[test]
    fn test_json_report() {
        let conn = Connection::open_in_memory().unwrap();
        conn.profiler_mut().set_enabled(true);
        conn.exec("CREATE TABLE t (id INTEGER)").unwrap();

        let report = json_report(&conn.profiler());
        assert_eq!(report["total_queries"], 1);
        assert_eq!(report["profiles"][0]["handle"], 0);
        assert_eq!(report["profiles"][0]["category"], "query");
    }
}
