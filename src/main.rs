use anyhow::{Context, Result};
use callflow::analyzer::CallAnalyzer;
use callflow::cli::{self, OutputFormat};
use callflow::db::Db;
use callflow::index::snapshot::IndexSnapshot;
use callflow::model::AnalysisDirection;
use callflow::settings::Settings;
use callflow::{export, layout, rpc};
use clap::Parser;
use serde_json::json;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing() {
    // stdout carries results; logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("CALLFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path),
        None => Ok(Settings::default()),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Import {
            snapshot,
            db,
            force,
        } => {
            let snapshot = IndexSnapshot::load(&snapshot)?;
            let db = Db::new(&db)?;
            let stats = db.import_snapshot(&snapshot, force)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        cli::Command::Overview { db } => {
            let db = Db::new(&db)?;
            println!("{}", serde_json::to_string_pretty(&db.overview()?)?);
            Ok(())
        }
        cli::Command::Analyze {
            source,
            method,
            direction,
            depth,
            settings,
            format,
        } => {
            let settings = load_settings(settings.as_deref())?;
            let index = source.source()?.open()?;
            let mut config = settings.analysis_config();
            if let Some(depth) = depth {
                config.max_depth = depth;
            }
            let direction: AnalysisDirection = direction.parse()?;
            let analyzer = CallAnalyzer::new(index.as_ref(), config);
            let graph = analyzer
                .analyze_query(&method, direction)
                .with_context(|| format!("analyze {method}"))?;
            let Some(graph) = graph else {
                println!("{}", json!({ "graph": null, "message": format!("no method matches {method}") }));
                return Ok(());
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
                OutputFormat::Mermaid => print!("{}", export::to_mermaid(&graph)),
                OutputFormat::Tree => {
                    print!("{}", export::render_tree(&graph, &settings.tree_options()))
                }
                OutputFormat::Layout => println!(
                    "{}",
                    serde_json::to_string_pretty(&layout::layout(&graph.root))?
                ),
            }
            Ok(())
        }
        cli::Command::Request {
            source,
            settings,
            method,
            params,
            params_file,
            id,
        } => {
            let settings = load_settings(settings.as_deref())?;
            let params_raw = if let Some(path) = params_file {
                std::fs::read_to_string(&path)
                    .with_context(|| format!("read params {}", path.display()))?
            } else {
                params
            };
            let response = rpc::call(source.source()?, settings, method, &params_raw, &id)?;
            println!("{response}");
            Ok(())
        }
        cli::Command::Serve { source, settings } => {
            let settings = load_settings(settings.as_deref())?;
            rpc::serve(source.source()?, settings)
        }
    }
}
