use crate::rpc::IndexSource;
use anyhow::{Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "callflow",
    version,
    about = "Caller/callee graphs over a precomputed symbol index",
    after_help = r#"Examples:
  callflow import --snapshot index.json --db .callflow/index.sqlite
  callflow analyze --snapshot index.json --method OrderService.createOrder --depth 3
  callflow analyze --db .callflow/index.sqlite --method createOrder --direction callers --format tree
  callflow request --snapshot index.json --method resolve_injected --params '{"type":"com.example.OrderRepository"}'
  callflow serve --db .callflow/index.sqlite
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Exactly one index source.
#[derive(ClapArgs, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Index snapshot file (JSON, or YAML by extension).
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    /// SQLite index written by `import`.
    #[arg(long)]
    pub db: Option<PathBuf>,
}

impl SourceArgs {
    pub fn source(&self) -> Result<IndexSource> {
        match (&self.snapshot, &self.db) {
            (Some(path), None) => Ok(IndexSource::Snapshot(path.clone())),
            (None, Some(path)) => Ok(IndexSource::Sqlite(path.clone())),
            _ => bail!("pass exactly one of --snapshot or --db"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Mermaid,
    Tree,
    Layout,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import a snapshot into a SQLite index.
    Import {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        db: PathBuf,
        /// Re-import even when the snapshot digest is unchanged.
        #[arg(long)]
        force: bool,
    },
    /// Print row counts and import metadata of a SQLite index.
    Overview {
        #[arg(long)]
        db: PathBuf,
    },
    /// Analyze one method and print the result.
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
        /// Method id, `Type.method`, or bare method name.
        #[arg(long)]
        method: String,
        /// callers | callees | both.
        #[arg(long, default_value = "both")]
        direction: String,
        /// Overrides the configured depth.
        #[arg(long)]
        depth: Option<usize>,
        /// YAML or JSON settings file.
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Run a single JSONL request and exit.
    Request {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long)]
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, value_name = "PATH")]
        params_file: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        id: String,
    },
    /// Run JSONL RPC server over stdin/stdout.
    Serve {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn source_is_exclusive() {
        let parsed = Args::try_parse_from([
            "callflow", "analyze", "--snapshot", "a.json", "--method", "run",
        ])
        .unwrap();
        let Command::Analyze { source, format, .. } = parsed.command else {
            panic!("expected analyze");
        };
        assert!(matches!(source.source().unwrap(), IndexSource::Snapshot(_)));
        assert_eq!(format, OutputFormat::Json);

        assert!(
            Args::try_parse_from([
                "callflow", "serve", "--snapshot", "a.json", "--db", "b.sqlite",
            ])
            .is_err()
        );
        assert!(Args::try_parse_from(["callflow", "serve"]).is_err());
    }
}
