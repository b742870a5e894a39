use crate::analyzer::config::AnalysisConfig;
use crate::analyzer::resolver::InterfaceResolver;
use crate::analyzer::{CallAnalyzer, CancellationToken};
use crate::config::Config;
use crate::db::Db;
use crate::export::{self, TreeOptions};
use crate::index::snapshot::MemoryIndex;
use crate::index::{self, SymbolIndex};
use crate::layout::{self, Viewport};
use crate::model::{AnalysisDirection, CallGraph};
use crate::settings::Settings;
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Where the symbol index comes from.
#[derive(Debug, Clone)]
pub enum IndexSource {
    Snapshot(PathBuf),
    Sqlite(PathBuf),
}

impl IndexSource {
    pub fn open(&self) -> Result<Box<dyn SymbolIndex>> {
        let index: Box<dyn SymbolIndex> = match self {
            IndexSource::Snapshot(path) => Box::new(
                MemoryIndex::load(path)
                    .with_context(|| format!("load snapshot {}", path.display()))?,
            ),
            IndexSource::Sqlite(path) => Box::new(Db::new(path)?),
        };
        Ok(index)
    }
}

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct FindMethodsParams {
    #[serde(alias = "method", alias = "name")]
    query: String,
    limit: Option<usize>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AnalyzeParams {
    #[serde(alias = "query", alias = "symbol")]
    method: String,
    direction: Option<String>,
    #[serde(alias = "max_depth")]
    depth: Option<usize>,
    max_nodes: Option<usize>,
    resolve_implementations: Option<bool>,
    track_events: Option<bool>,
    include_external_calls: Option<bool>,
    include_packages: Option<Vec<String>>,
    exclude_packages: Option<Vec<String>>,
}

impl AnalyzeParams {
    fn direction(&self) -> Result<AnalysisDirection> {
        match self.direction.as_deref() {
            Some(raw) => raw.parse(),
            None => Ok(AnalysisDirection::default()),
        }
    }

    /// Settings overlaid with request overrides; `max_nodes` is capped
    /// process-wide.
    fn analysis_config(&self, settings: &Settings) -> AnalysisConfig {
        let mut config = settings.analysis_config();
        if let Some(depth) = self.depth {
            config.max_depth = depth;
        }
        if let Some(max_nodes) = self.max_nodes {
            config.max_nodes = max_nodes;
        }
        config.max_nodes = Config::get().cap_max_nodes(config.max_nodes);
        if let Some(enabled) = self.resolve_implementations {
            config.resolve_implementations = enabled;
        }
        if let Some(enabled) = self.track_events {
            config.track_events = enabled;
        }
        if let Some(enabled) = self.include_external_calls {
            config.include_external_calls = enabled;
        }
        if let Some(prefixes) = &self.include_packages {
            config.include_packages = prefixes.clone();
        }
        if let Some(prefixes) = &self.exclude_packages {
            config.exclude_packages = prefixes.clone();
        }
        config
    }
}

#[derive(Deserialize)]
struct LayoutParams {
    #[serde(flatten)]
    analyze: AnalyzeParams,
    width: Option<f64>,
    height: Option<f64>,
}

#[derive(Deserialize)]
struct TreeParams {
    #[serde(flatten)]
    analyze: AnalyzeParams,
    show_async_badge: Option<bool>,
    show_transactional_badge: Option<bool>,
    show_http_method_badge: Option<bool>,
    expand_levels: Option<usize>,
}

#[derive(Deserialize)]
struct TypeParams {
    #[serde(rename = "type", alias = "type_name", alias = "name")]
    type_name: String,
    project_only: Option<bool>,
}

pub fn serve(source: IndexSource, settings: Settings) -> Result<()> {
    let index: Arc<dyn SymbolIndex> = Arc::from(source.open()?);
    let stdin = io::stdin();
    serve_lines(index, settings, stdin.lock(), io::stdout())
}

/// Reads requests line by line while a worker thread answers them in order.
fn serve_lines<R, W>(index: Arc<dyn SymbolIndex>, settings: Settings, input: R, output: W) -> Result<()>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let mut worker = Worker::spawn(index, settings, output);

    for line in input.lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                warn!("stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => worker.submit(request)?,
            Err(err) => worker.send(Job::Reply(error_response(
                Value::Null,
                &format!("invalid request: {err}"),
            )))?,
        }
    }

    worker.finish()
}

pub fn call(
    source: IndexSource,
    settings: Settings,
    method: String,
    params_raw: &str,
    id_raw: &str,
) -> Result<String> {
    let params: Value = serde_json::from_str(params_raw).with_context(|| "parse params JSON")?;
    let id = parse_value(id_raw);
    let index = source.open()?;
    let request = RpcRequest { id, method, params };
    let response = respond(index.as_ref(), &settings, request, CancellationToken::new());
    Ok(serde_json::to_string(&response)?)
}

enum Job {
    Request(RpcRequest, CancellationToken),
    Reply(RpcResponse),
}

/// Owns the thread that runs requests. Submitting a new analysis cancels the
/// one still running (or queued) before it.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    handle: thread::JoinHandle<Result<()>>,
    in_flight: Option<CancellationToken>,
}

impl Worker {
    fn spawn<W>(index: Arc<dyn SymbolIndex>, settings: Settings, mut output: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let (jobs, queue) = mpsc::channel::<Job>();
        let handle = thread::spawn(move || -> Result<()> {
            for job in queue {
                let response = match job {
                    Job::Request(request, token) => respond(index.as_ref(), &settings, request, token),
                    Job::Reply(response) => response,
                };
                writeln!(output, "{}", serde_json::to_string(&response)?)?;
                output.flush()?;
            }
            Ok(())
        });
        Self {
            jobs: Some(jobs),
            handle,
            in_flight: None,
        }
    }

    fn submit(&mut self, request: RpcRequest) -> Result<()> {
        let token = CancellationToken::new();
        if is_analysis(&request.method) {
            if let Some(previous) = self.in_flight.replace(token.clone()) {
                previous.cancel();
            }
        }
        self.send(Job::Request(request, token))
    }

    fn send(&self, job: Job) -> Result<()> {
        let jobs = self.jobs.as_ref().context("request worker already finished")?;
        jobs.send(job).map_err(|_| anyhow!("request worker stopped"))
    }

    /// Waits for queued requests to be answered.
    fn finish(mut self) -> Result<()> {
        drop(self.jobs.take());
        self.handle
            .join()
            .map_err(|_| anyhow!("request worker panicked"))?
    }
}

fn is_analysis(method: &str) -> bool {
    matches!(method, "analyze" | "layout" | "export_mermaid" | "render_tree")
}

fn respond(
    index: &dyn SymbolIndex,
    settings: &Settings,
    req: RpcRequest,
    token: CancellationToken,
) -> RpcResponse {
    let id = req.id.clone();
    match handle_method(index, settings, &req.method, req.params, token) {
        Ok(value) => RpcResponse {
            id,
            result: Some(value),
            error: None,
        },
        Err(err) => error_response(id, &format!("{err:#}")),
    }
}

pub fn handle_method(
    index: &dyn SymbolIndex,
    settings: &Settings,
    method: &str,
    params: Value,
    token: CancellationToken,
) -> Result<Value> {
    let start = Instant::now();
    let value = match method {
        "help" => method_help(),
        "find_methods" => {
            let params: FindMethodsParams = serde_json::from_value(params)?;
            let mut methods = index::find_methods(index, &params.query)?;
            if let Some(limit) = params.limit {
                methods.truncate(limit);
            }
            json!(methods)
        }
        "analyze" => {
            let params: AnalyzeParams = serde_json::from_value(params)?;
            let graph = run_analysis(index, settings, &params, token)?;
            json!({ "graph": graph })
        }
        "layout" => {
            let params: LayoutParams = serde_json::from_value(params)?;
            match run_analysis(index, settings, &params.analyze, token)? {
                Some(graph) => {
                    let layout = layout::layout(&graph.root);
                    let viewport = match (params.width, params.height) {
                        (Some(width), Some(height)) => {
                            Viewport::fit_layout(&layout, width, height)
                        }
                        _ => Viewport::default(),
                    };
                    json!({ "graph": graph, "layout": layout, "viewport": viewport })
                }
                None => json!({ "graph": Value::Null, "layout": Value::Null }),
            }
        }
        "export_mermaid" => {
            let params: AnalyzeParams = serde_json::from_value(params)?;
            let graph = run_analysis(index, settings, &params, token)?;
            json!({ "mermaid": graph.as_ref().map(export::to_mermaid) })
        }
        "render_tree" => {
            let params: TreeParams = serde_json::from_value(params)?;
            let mut options: TreeOptions = settings.tree_options();
            if let Some(show) = params.show_async_badge {
                options.show_async_badge = show;
            }
            if let Some(show) = params.show_transactional_badge {
                options.show_transactional_badge = show;
            }
            if let Some(show) = params.show_http_method_badge {
                options.show_http_method_badge = show;
            }
            if params.expand_levels.is_some() {
                options.expand_levels = params.expand_levels;
            }
            let graph = run_analysis(index, settings, &params.analyze, token)?;
            json!({ "tree": graph.as_ref().map(|graph| export::render_tree(graph, &options)) })
        }
        "find_implementations" => {
            let params: TypeParams = serde_json::from_value(params)?;
            let resolver = InterfaceResolver::new(index);
            json!(resolver.find_implementations(&params.type_name, params.project_only.unwrap_or(true))?)
        }
        "primary_implementation" => {
            let params: TypeParams = serde_json::from_value(params)?;
            let resolver = InterfaceResolver::new(index);
            json!(resolver.get_primary_implementation(&params.type_name)?)
        }
        "resolve_injected" => {
            let params: TypeParams = serde_json::from_value(params)?;
            let resolver = InterfaceResolver::new(index);
            json!(resolver.resolve_injected_type(&params.type_name)?)
        }
        other => bail!("unknown method: {other}"),
    };
    debug!(method, elapsed_ms = start.elapsed().as_millis() as u64, "handled request");
    Ok(value)
}

fn run_analysis(
    index: &dyn SymbolIndex,
    settings: &Settings,
    params: &AnalyzeParams,
    token: CancellationToken,
) -> Result<Option<CallGraph>> {
    if params.method.trim().is_empty() {
        bail!("missing method query");
    }
    let direction = params.direction()?;
    let analyzer =
        CallAnalyzer::new(index, params.analysis_config(settings)).with_cancellation(token);
    Ok(analyzer.analyze_query(&params.method, direction)?)
}

fn method_help() -> Value {
    json!({
        "summary": "callflow builds caller/callee graphs over a symbol index and serves JSONL RPC over stdin/stdout.",
        "analysis_params": {
            "method": "Method query: an id (`pkg.Type#name(Param)`), `Type.method`, `pkg.Type.method` or a bare name",
            "direction": "callers | callees | both (default both)",
            "depth": "Traversal depth, root is depth 0",
            "max_nodes": "Ceiling on distinct methods; capped by CALLFLOW_MAX_NODES_CAP",
            "resolve_implementations": "Expand interface calls to implementations",
            "track_events": "Follow event publishers to listeners",
            "include_external_calls": "Traverse into non-project code",
            "include_packages": "Package prefixes to keep",
            "exclude_packages": "Package prefixes to drop; replaces the defaults",
        },
        "methods": {
            "help": "This document",
            "find_methods": "Methods matching {query, limit?}",
            "analyze": "Call graph {graph} for analysis params; graph is null when nothing matches",
            "layout": "Graph plus positioned nodes and edges; optional {width, height} fits a viewport",
            "export_mermaid": "Mermaid flowchart text",
            "render_tree": "Indented text tree; badge toggles and expand_levels",
            "find_implementations": "Concrete implementations of {type, project_only?}",
            "primary_implementation": "Injection-selected implementation of {type}",
            "resolve_injected": "Candidate beans for an injection point of {type}",
        },
    })
}

fn error_response(id: Value, message: &str) -> RpcResponse {
    RpcResponse {
        id,
        result: None,
        error: Some(RpcError {
            message: message.to_string(),
        }),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
