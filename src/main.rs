use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sds_finder::config::{load_config, Config};
use sds_finder::models::{BatchResponse, IdentifierKind};
use sds_finder::BatchResolver;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SDS Finder - Find Safety Data Sheets by CAS number or product name
#[derive(Parser, Debug)]
#[command(name = "sds-finder")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find Safety Data Sheets across chemical supplier sites", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up SDS documents by CAS number
    Cas {
        /// CAS registry numbers (e.g. 67-63-0)
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Download the documents into request storage
        #[arg(long, short)]
        download: bool,
    },

    /// Look up SDS documents by product name
    Name {
        /// Product names (quote names containing spaces)
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Download the documents into request storage
        #[arg(long, short)]
        download: bool,
    },

    /// Look up a mix of CAS numbers and product names
    Mixed {
        /// CAS numbers or product names, detected per entry
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Download the documents into request storage
        #[arg(long, short)]
        download: bool,
    },

    /// Copy a downloaded document out of request storage
    Fetch {
        /// Request id reported by an earlier lookup
        request_id: String,

        /// File name from the download URL
        filename: String,

        /// Destination path (default: the file name in the current directory)
        #[arg(long, short)]
        dest: Option<PathBuf>,
    },

    /// Remove expired request directories from download storage
    Sweep,

    /// Show the provider order for each lookup kind
    Sources,

    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration as TOML
    Init {
        /// Target file (default: print to stdout)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&cli, &config);

    match cli.command {
        Commands::Cas {
            identifiers,
            download,
        } => {
            let resolver = BatchResolver::from_config(&config)?;
            let response = resolver.resolve_by_cas(identifiers, download).await?;
            output_response(&response, cli.output)?;
        }

        Commands::Name {
            identifiers,
            download,
        } => {
            let resolver = BatchResolver::from_config(&config)?;
            let response = resolver.resolve_by_name(identifiers, download).await?;
            output_response(&response, cli.output)?;
        }

        Commands::Mixed {
            identifiers,
            download,
        } => {
            let resolver = BatchResolver::from_config(&config)?;
            let response = resolver.resolve_mixed(identifiers, download).await?;
            output_response(&response, cli.output)?;
        }

        Commands::Fetch {
            request_id,
            filename,
            dest,
        } => {
            let resolver = BatchResolver::from_config(&config)?;
            let bytes = resolver.retrieve(&request_id, &filename).await?;
            let dest = dest.unwrap_or_else(|| PathBuf::from(&filename));
            tokio::fs::write(&dest, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            if !cli.quiet {
                eprintln!("Saved {} ({} bytes)", dest.display(), bytes.len());
            }
        }

        Commands::Sweep => {
            let resolver = BatchResolver::from_config(&config)?;
            let materializer = resolver
                .materializer()
                .context("Download storage is not configured")?;
            let report = materializer.sweep().await?;

            match resolve_format(cli.output) {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "root": materializer.root().display().to_string(),
                        "removed": report.removed,
                        "kept": report.kept,
                        "failed": report.failed,
                    }))?
                ),
                _ => println!(
                    "Removed {} request directories from {} ({} kept, {} failed)",
                    report.removed.len(),
                    materializer.root().display(),
                    report.kept,
                    report.failed
                ),
            }
        }

        Commands::Sources => {
            let resolver = BatchResolver::from_config(&config)?;
            output_sources(&resolver, cli.output)?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { path } => {
                let toml = Config::default().to_toml()?;
                match path {
                    Some(path) => {
                        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                            std::fs::create_dir_all(parent)?;
                        }
                        std::fs::write(&path, toml)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        if !cli.quiet {
                            eprintln!("Wrote default configuration to {}", path.display());
                        }
                    }
                    None => print!("{}", toml),
                }
            }
        },
    }

    Ok(())
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("sds_finder={}", level)),
    );

    // logs go to stderr so JSON results on stdout stay parseable
    if config.logging.format.as_deref() == Some("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn resolve_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto if std::io::stdout().is_terminal() => OutputFormat::Table,
        OutputFormat::Auto => OutputFormat::Json,
        other => other,
    }
}

fn output_response(response: &BatchResponse, format: OutputFormat) -> Result<()> {
    match resolve_format(format) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        _ => {
            use comfy_table::{Attribute, Cell, Color, Table};
            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.set_header(vec!["Identifier", "Found", "Source", "URL / Download"]);

            for row in &response.results {
                let found = if row.found {
                    Cell::new("yes").fg(Color::Green)
                } else {
                    Cell::new("no").fg(Color::Red)
                };

                let location = row
                    .download_url
                    .as_deref()
                    .or(row.url.as_deref())
                    .map(str::to_string)
                    .or_else(|| row.error_kind.map(|kind| format!("{:?}", kind)))
                    .unwrap_or_default();

                table.add_row(vec![
                    Cell::new(&row.identifier).add_attribute(Attribute::Bold),
                    found,
                    Cell::new(row.source.as_deref().unwrap_or("-")),
                    Cell::new(location),
                ]);
            }

            println!("{table}");
            println!(
                "{}/{} found (request {})",
                response.found_count, response.total_searched, response.request_id
            );
        }
    }
    Ok(())
}

fn output_sources(resolver: &BatchResolver, format: OutputFormat) -> Result<()> {
    let registry = resolver.registry();
    let order = |kind: IdentifierKind| -> Vec<String> {
        registry
            .providers_for(kind)
            .iter()
            .map(|source| source.id().to_string())
            .collect()
    };
    let by_cas = order(IdentifierKind::Cas);
    let by_name = order(IdentifierKind::Name);

    match resolve_format(format) {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "cas": by_cas,
                    "name": by_name,
                }))?
            );
        }
        _ => {
            use comfy_table::{Cell, Table};
            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.set_header(vec!["Priority", "By CAS", "By name"]);

            for i in 0..by_cas.len().max(by_name.len()) {
                table.add_row(vec![
                    Cell::new(i + 1),
                    Cell::new(by_cas.get(i).map(String::as_str).unwrap_or("")),
                    Cell::new(by_name.get(i).map(String::as_str).unwrap_or("")),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["sds-finder", "-v", "sources"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["sds-finder", "-vv", "sources"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_output_format() {
        let cli = Cli::parse_from(["sds-finder", "-o", "json", "sources"]);
        assert_eq!(cli.output, OutputFormat::Json);

        let cli = Cli::parse_from(["sds-finder", "sources", "--output", "table"]);
        assert_eq!(cli.output, OutputFormat::Table);
    }

    #[test]
    fn test_cli_config_flag() {
        let cli = Cli::parse_from(["sds-finder", "--config", "/path/to/config.toml", "sweep"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
    }

    #[test]
    fn test_cas_command() {
        let cli = Cli::parse_from(["sds-finder", "cas", "67-63-0", "64-19-7", "--download"]);
        match cli.command {
            Commands::Cas {
                identifiers,
                download,
            } => {
                assert_eq!(identifiers, ["67-63-0", "64-19-7"]);
                assert!(download);
            }
            other => panic!("Expected Cas command, got {:?}", other),
        }
    }

    #[test]
    fn test_name_command_requires_identifiers() {
        assert!(Cli::try_parse_from(["sds-finder", "name"]).is_err());
    }

    #[test]
    fn test_fetch_command() {
        let cli = Cli::parse_from([
            "sds-finder",
            "fetch",
            "0b6f1c8e-4b0e-4d6a-9b1e-3f1f1f1f1f1f",
            "67-63-0_ChemBlink-SDS.pdf",
            "--dest",
            "/tmp/ipa.pdf",
        ]);
        match cli.command {
            Commands::Fetch {
                filename, dest, ..
            } => {
                assert_eq!(filename, "67-63-0_ChemBlink-SDS.pdf");
                assert_eq!(dest, Some(PathBuf::from("/tmp/ipa.pdf")));
            }
            other => panic!("Expected Fetch command, got {:?}", other),
        }
    }

    #[test]
    fn test_config_init_command() {
        let cli = Cli::parse_from(["sds-finder", "config", "init", "/tmp/sds.toml"]);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { path: Some(_) }
            }
        ));
    }
}
