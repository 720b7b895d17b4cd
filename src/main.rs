use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prov_core::{Catalog, CoreConfig, Descriptor, Session};

#[derive(Parser)]
#[command(name = "prov")]
#[command(about = "Provenance-tracked file access")]
struct Cli {
    /// Run configuration file (default: $PROV_CONFIG)
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Data directory, used when no configuration file is given
    #[arg(long)]
    data_directory: Option<PathBuf>,
    /// Run id recorded in the access log
    #[arg(long)]
    run_id: Option<String>,
    /// Run metadata to record, as key=value (repeatable)
    #[arg(long = "meta", value_parser = parse_key_value, global = true)]
    meta: Vec<(String, String)>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog entries
    Catalog,
    /// Show the entry a query resolves to
    Resolve(Query),
    /// Copy a resolved file to stdout or a file
    Read {
        #[command(flatten)]
        query: Query,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Write stdin to the target a query names
    Write(Query),
}

/// Descriptor fields; unset fields match anything.
#[derive(Args)]
struct Query {
    #[arg(long)]
    data_product: Option<String>,
    #[arg(long)]
    filename: Option<String>,
    #[arg(long = "version")]
    version: Option<String>,
    #[arg(long)]
    extension: Option<String>,
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

impl From<Query> for Descriptor {
    fn from(query: Query) -> Self {
        Descriptor {
            data_product: query.data_product,
            filename: query.filename,
            version: query.version,
            extension: query.extension,
            namespace: query.namespace,
            description: query.description,
            ..Descriptor::new()
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

/// Resolve the run configuration from flags, falling back to `PROV_CONFIG`.
fn load_config(cli: &Cli) -> anyhow::Result<CoreConfig> {
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("PROV_CONFIG").ok().map(PathBuf::from));

    let cfg = match (config_path, &cli.data_directory) {
        (Some(path), _) => CoreConfig::load(&path)?,
        (None, Some(dir)) => CoreConfig::new(dir.clone(), None)?,
        (None, None) => anyhow::bail!("pass --config, set PROV_CONFIG, or pass --data-directory"),
    };

    match cli.run_id.clone() {
        Some(run_id) => Ok(cfg.with_run_id(run_id)?),
        None => Ok(cfg),
    }
}

/// Entry point for the `prov` command.
///
/// # Environment Variables
/// - `PROV_CONFIG`: run configuration file, used when `--config` is not given
/// - `RUST_LOG`: log filter (default: `info` for the provenance crates)
///
/// Logs go to stderr; stdout carries file contents and listings.
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prov_core=info".parse()?)
                .add_directive("prov_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = Arc::new(load_config(&cli)?);

    if let Commands::Catalog = cli.command {
        return list_catalog(&cfg);
    }

    let mut session = Session::open(Arc::clone(&cfg))?;
    session.set_run_metadata(cli.meta)?;

    match cli.command {
        Commands::Catalog => {}
        Commands::Resolve(query) => {
            let resolution = session.resolve(&query.into())?;
            println!("{}", resolution.path.display());
            print!("{}", serde_yaml::to_string(&resolution.resolved)?);
        }
        Commands::Read { query, output } => {
            let mut handle = session.open_for_read(&query.into())?;
            match output {
                Some(path) => {
                    let mut file = BufWriter::new(File::create(&path)?);
                    io::copy(&mut handle, &mut file)?;
                    file.flush()?;
                }
                None => {
                    io::copy(&mut handle, &mut io::stdout().lock())?;
                }
            }
            tracing::info!(path = %handle.path().display(), "read complete");
        }
        Commands::Write(query) => {
            let mut handle = session.open_for_write(&query.into())?;
            io::copy(&mut io::stdin().lock(), &mut handle)?;
            let path = handle.path().to_path_buf();
            let resolved = handle.finish()?;
            println!("{}", path.display());
            if let Some(hash) = resolved.calculated_hash {
                println!("{hash}");
            }
        }
    }

    if let Some(log_path) = session.close()? {
        eprintln!("access log: {}", log_path.display());
    }
    Ok(())
}

fn list_catalog(cfg: &CoreConfig) -> anyhow::Result<()> {
    let catalog = Catalog::load(cfg.metadata_path(), cfg.data_directory())?;
    if catalog.is_empty() {
        println!("No catalog entries found.");
        return Ok(());
    }
    for entry in catalog.entries() {
        println!(
            "{}  {}",
            display_relative(entry.normalised_filename(), catalog.data_directory()),
            entry.descriptor()
        );
    }
    Ok(())
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("git_sha=abc=def").unwrap(),
            ("git_sha".to_string(), "abc=def".to_string())
        );
        assert_eq!(
            parse_key_value("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn test_query_into_descriptor() {
        let cli = Cli::parse_from([
            "prov",
            "--data-directory",
            "/data",
            "--meta",
            "k=v",
            "resolve",
            "--data-product",
            "census",
            "--version",
            "2",
        ]);

        assert_eq!(cli.meta, vec![("k".to_string(), "v".to_string())]);
        match cli.command {
            Commands::Resolve(query) => {
                let descriptor: Descriptor = query.into();
                assert_eq!(
                    descriptor,
                    Descriptor::new().with_data_product("census").with_version("2")
                );
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_load_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let cli = Cli::parse_from([
            "prov",
            "--config",
            temp.path().join("missing.yaml").to_str().unwrap(),
            "catalog",
        ]);
        assert!(load_config(&cli).is_err());

        let cli = Cli::parse_from([
            "prov",
            "--data-directory",
            temp.path().to_str().unwrap(),
            "--run-id",
            "cli-run",
            "catalog",
        ]);
        let cfg = load_config(&cli).unwrap();
        assert_eq!(cfg.run_id(), "cli-run");
        assert_eq!(cfg.data_directory(), temp.path());
    }
}
