//! Call graph analysis.
//!
//! [`CallAnalyzer`] walks callers and/or callees of a root method through a
//! [`SymbolIndex`], resolving interface calls to their injected
//! implementations and following event publish/listen edges. Each run owns
//! its state: an arena of [`MethodEntry`] values keyed by id, a shared set of
//! distinct ids for the node ceiling, and one expanded-id set per direction.

pub mod config;
pub mod metadata;
pub mod resolver;

pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use resolver::InterfaceResolver;

use crate::error::{AnalysisError, AnalysisResult};
use crate::index::{MethodInfo, SymbolIndex, listened_event, resolve_method, split_method_id};
use crate::model::{
    AnalysisDirection, CallGraph, CallNode, MethodEntry, NodeMetadata, NodeType, SourceLocation,
    TraversalSide, simple_name,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Cooperative cancellation flag shared between a request and its analysis.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CallAnalyzer<'a> {
    index: &'a dyn SymbolIndex,
    resolver: InterfaceResolver<'a>,
    config: AnalysisConfig,
    cancel: CancellationToken,
}

/// A method about to become a child node.
struct Target {
    id: String,
    method: Option<MethodInfo>,
    via: Option<String>,
    /// Library code shown as a terminal External node.
    external: bool,
    /// Reached through interface resolution.
    resolved: bool,
    /// Event this method is known to publish.
    publishes: Option<String>,
}

impl Target {
    fn new(id: &str, method: Option<MethodInfo>, via: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            method,
            via,
            external: false,
            resolved: false,
            publishes: None,
        }
    }
}

/// State shared by both directions of one invocation.
#[derive(Default)]
struct Run {
    methods: BTreeMap<String, MethodEntry>,
    seen: HashSet<String>,
    truncated: bool,
}

/// State owned by one direction.
struct Walk {
    side: TraversalSide,
    max_depth: usize,
    expanded: HashSet<String>,
}

impl Walk {
    fn new(side: TraversalSide, max_depth: usize) -> Self {
        Self {
            side,
            max_depth,
            expanded: HashSet::new(),
        }
    }
}

impl<'a> CallAnalyzer<'a> {
    pub fn new(index: &'a dyn SymbolIndex, config: AnalysisConfig) -> Self {
        Self {
            index,
            resolver: InterfaceResolver::new(index),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Looks up `query` and analyzes it with the configured depth. `None`
    /// when no method matches.
    pub fn analyze_query(
        &self,
        query: &str,
        direction: AnalysisDirection,
    ) -> AnalysisResult<Option<CallGraph>> {
        let Some(method) = resolve_method(self.index, query)? else {
            debug!(query, "no method matches query");
            return Ok(None);
        };
        self.analyze(&method, direction, self.config.max_depth)
            .map(Some)
    }

    pub fn analyze(
        &self,
        method: &MethodInfo,
        direction: AnalysisDirection,
        depth: usize,
    ) -> AnalysisResult<CallGraph> {
        match direction {
            AnalysisDirection::CalleesOnly => self.analyze_callees(method, depth),
            AnalysisDirection::CallersOnly => self.analyze_callers(method, depth),
            AnalysisDirection::Both => self.analyze_bidirectional(method, depth),
        }
    }

    pub fn analyze_callees(&self, method: &MethodInfo, depth: usize) -> AnalysisResult<CallGraph> {
        self.run(method, AnalysisDirection::CalleesOnly, depth)
    }

    pub fn analyze_callers(&self, method: &MethodInfo, depth: usize) -> AnalysisResult<CallGraph> {
        self.run(method, AnalysisDirection::CallersOnly, depth)
    }

    pub fn analyze_bidirectional(
        &self,
        method: &MethodInfo,
        depth: usize,
    ) -> AnalysisResult<CallGraph> {
        self.run(method, AnalysisDirection::Both, depth)
    }

    fn run(
        &self,
        method: &MethodInfo,
        direction: AnalysisDirection,
        depth: usize,
    ) -> AnalysisResult<CallGraph> {
        debug!(root = %method.id, ?direction, depth, "starting analysis");
        let mut run = Run::default();
        let mut root = CallNode::leaf(&method.id);

        for side in [TraversalSide::Callers, TraversalSide::Callees] {
            if !direction.includes(side) {
                continue;
            }
            let mut walk = Walk::new(side, depth);
            let target = Target::new(&method.id, Some(method.clone()), None);
            if let Some(node) = self.visit(&mut run, &mut walk, target, 0)? {
                match side {
                    TraversalSide::Callers => root.callers = node.callers,
                    TraversalSide::Callees => root.callees = node.callees,
                }
            }
        }

        debug!(
            root = %method.id,
            nodes = run.seen.len(),
            truncated = run.truncated,
            "analysis finished"
        );
        Ok(CallGraph {
            root,
            direction,
            methods: run.methods,
            truncated: run.truncated,
        })
    }

    fn checkpoint(&self) -> AnalysisResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    fn visit(
        &self,
        run: &mut Run,
        walk: &mut Walk,
        target: Target,
        depth: usize,
    ) -> AnalysisResult<Option<CallNode>> {
        self.checkpoint()?;

        if !run.seen.contains(&target.id) {
            if run.seen.len() >= self.config.max_nodes.max(1) {
                if !run.truncated {
                    debug!(id = %target.id, max_nodes = self.config.max_nodes, "node ceiling reached");
                }
                run.truncated = true;
                return Ok(None);
            }
            run.seen.insert(target.id.clone());
        }
        self.record(run, &target)?;

        if walk.expanded.contains(&target.id) {
            return Ok(Some(CallNode::cyclic(&target.id).with_via(target.via)));
        }
        let mut node = CallNode::leaf(&target.id).with_via(target.via.clone());
        if depth >= walk.max_depth || target.external {
            return Ok(Some(node));
        }
        // Bodiless methods have no callees but can still be called.
        let Some(method) = target
            .method
            .as_ref()
            .filter(|m| walk.side == TraversalSide::Callers || !m.is_abstract)
        else {
            return Ok(Some(node));
        };

        walk.expanded.insert(target.id.clone());
        let children = match walk.side {
            TraversalSide::Callees => self.callee_targets(run, method)?,
            TraversalSide::Callers => self.caller_targets(method)?,
        };
        for child in children {
            if let Some(child) = self.visit(run, walk, child, depth + 1)? {
                match walk.side {
                    TraversalSide::Callees => node.callees.push(child),
                    TraversalSide::Callers => node.callers.push(child),
                }
            }
        }
        Ok(Some(node))
    }

    fn callee_targets(&self, run: &mut Run, method: &MethodInfo) -> AnalysisResult<Vec<Target>> {
        let mut targets = Vec::new();
        for site in self.index.call_sites_of(&method.id)? {
            targets.extend(self.targets_for(&site.target, None, true)?);
            let Some(event) = site.published_event.filter(|_| self.config.track_events) else {
                continue;
            };
            mark_publisher(run, &method.id, &event);
            for listener in self.index.listeners_of(&event)? {
                targets.extend(self.targets_for(&listener, Some(event.clone()), false)?);
            }
        }
        Ok(dedup_targets(targets))
    }

    fn caller_targets(&self, method: &MethodInfo) -> AnalysisResult<Vec<Target>> {
        let mut targets = Vec::new();
        for site in self.index.callers_of(&method.id)? {
            targets.extend(self.targets_for(&site.target, None, false)?);
        }
        if self.config.resolve_implementations {
            for declaration in self.resolver.find_super_methods(method)? {
                for site in self.index.callers_of(&declaration.id)? {
                    targets.extend(self.targets_for(&site.target, Some(declaration.id.clone()), false)?);
                }
            }
        }
        if self.config.track_events {
            if let Some(event) = listened_event(method) {
                for publisher in self.index.publishers_of(&event)? {
                    let mut found = self.targets_for(&publisher, Some(event.clone()), false)?;
                    for target in &mut found {
                        target.publishes = Some(event.clone());
                    }
                    targets.extend(found);
                }
            }
        }
        Ok(dedup_targets(targets))
    }

    /// Children produced by one reference to `id`: nothing when filtered out,
    /// an External leaf for library code, the dispatch targets of an
    /// abstract method, or the method itself.
    fn targets_for(
        &self,
        id: &str,
        via: Option<String>,
        resolve: bool,
    ) -> AnalysisResult<Vec<Target>> {
        let method = self.index.method(id)?;
        let owner = match &method {
            Some(method) => method.owner.clone(),
            None => split_method_id(id).0.to_string(),
        };
        if !self.config.allows(&owner) {
            return Ok(Vec::new());
        }
        if !self.config.include_external_calls && !self.index.is_project_source(&owner)? {
            let mut target = Target::new(id, method, via);
            target.external = true;
            return Ok(vec![target]);
        }
        if let Some(declared) = method.as_ref() {
            if resolve
                && self.config.resolve_implementations
                && self.resolver.is_abstract_target(declared)?
            {
                let resolved: Vec<Target> = self
                    .resolver
                    .dispatch_targets(declared)?
                    .into_iter()
                    .filter(|implementation| self.config.allows(&implementation.owner))
                    .map(|implementation| {
                        let id = implementation.id.clone();
                        let mut target =
                            Target::new(&id, Some(implementation), Some(declared.id.clone()));
                        target.resolved = true;
                        target
                    })
                    .collect();
                if !resolved.is_empty() {
                    return Ok(resolved);
                }
                debug!(id, "no implementation found, keeping abstract call");
            }
        }
        Ok(vec![Target::new(id, method, via)])
    }

    /// Adds the arena entry for `target` if missing.
    fn record(&self, run: &mut Run, target: &Target) -> AnalysisResult<()> {
        if !run.methods.contains_key(&target.id) {
            let entry = self.build_entry(target)?;
            run.methods.insert(target.id.clone(), entry);
        }
        if let Some(event) = &target.publishes {
            mark_publisher(run, &target.id, event);
        }
        Ok(())
    }

    fn build_entry(&self, target: &Target) -> AnalysisResult<MethodEntry> {
        let (owner_name, method_name) = match &target.method {
            Some(method) => (method.owner.clone(), method.name.clone()),
            None => {
                let (owner, name) = split_method_id(&target.id);
                (owner.to_string(), name.to_string())
            }
        };
        let owner = self.index.type_info(&owner_name)?;

        let (metadata, mut node_type, location) = match &target.method {
            Some(method) => {
                let (metadata, node_type) = metadata::extract(method, owner.as_ref());
                let location = method
                    .file_path
                    .clone()
                    .or_else(|| owner.as_ref().and_then(|t| t.file_path.clone()))
                    .map(|file_path| SourceLocation {
                        file_path,
                        line: method.line,
                    });
                (metadata, node_type, location)
            }
            None => {
                let metadata = NodeMetadata {
                    parameter_types: parameters_from_id(&target.id),
                    ..NodeMetadata::default()
                };
                let node_type = match &owner {
                    Some(owner) if owner.kind.is_abstract() => NodeType::Interface,
                    _ => NodeType::Unknown,
                };
                (metadata, node_type, None)
            }
        };
        if target.external {
            node_type = NodeType::External;
        } else if target.resolved && node_type == NodeType::Unknown {
            node_type = NodeType::Implementation;
        }

        Ok(MethodEntry {
            id: target.id.clone(),
            class_name: simple_name(&owner_name).to_string(),
            qualified_class_name: owner_name,
            method_name,
            node_type,
            metadata,
            location,
        })
    }
}

fn mark_publisher(run: &mut Run, id: &str, event: &str) {
    if let Some(entry) = run.methods.get_mut(id) {
        entry.metadata.event_class = Some(event.to_string());
        if entry.node_type == NodeType::Unknown {
            entry.node_type = NodeType::EventPublisher;
        }
    }
}

/// First occurrence of each id wins.
fn dedup_targets(targets: Vec<Target>) -> Vec<Target> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.id.clone()))
        .collect()
}

fn parameters_from_id(id: &str) -> Vec<String> {
    let Some((_, rest)) = id.split_once('(') else {
        return Vec::new();
    };
    rest.trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Annotation, CallSite, MemoryIndex, TypeInfo, TypeKind};

    struct Fixture {
        index: MemoryIndex,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                index: MemoryIndex::default(),
            }
        }

        fn class(&mut self, name: &str, annotation: Option<&str>) -> &mut Self {
            let mut ty = TypeInfo::new(name, TypeKind::Class);
            if let Some(annotation) = annotation {
                ty.annotations.push(Annotation::new(annotation));
            }
            self.index.add_type(ty);
            self
        }

        fn implementing(&mut self, name: &str, iface: &str, annotation: Option<&str>) -> &mut Self {
            self.class(name, annotation);
            let mut ty = self.index.type_info(name).unwrap().unwrap();
            ty.supertypes.push(iface.to_string());
            self.index.add_type(ty);
            self
        }

        fn method(&mut self, owner: &str, name: &str) -> String {
            let method = MethodInfo::new(owner, name, &[]);
            let id = method.id.clone();
            self.index.add_method(method);
            id
        }

        fn call(&mut self, from: &str, to: &str) -> &mut Self {
            self.index.add_call(from, CallSite::to(to));
            self
        }

        fn root(&self, id: &str) -> MethodInfo {
            self.index.method(id).unwrap().unwrap()
        }
    }

    fn ids(nodes: &[CallNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    fn chain() -> (Fixture, Vec<String>) {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service"));
        let ids: Vec<String> = ["m0", "m1", "m2", "m3", "m4"]
            .iter()
            .map(|name| f.method("a.S", name))
            .collect();
        for pair in ids.windows(2) {
            f.call(&pair[0], &pair[1]);
        }
        (f, ids)
    }

    #[test]
    fn cycle_becomes_cyclic_leaf() {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service"));
        let a = f.method("a.S", "a");
        let b = f.method("a.S", "b");
        let c = f.method("a.S", "c");
        f.call(&a, &b).call(&b, &c).call(&c, &a);
        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_callees(&f.root(&a), 10).unwrap();
        let b_node = &graph.root.callees[0];
        let c_node = &b_node.callees[0];
        let again = &c_node.callees[0];
        assert_eq!(again.id, a);
        assert!(again.is_cyclic_ref);
        assert!(again.callees.is_empty());
        assert!(!graph.truncated);
    }

    #[test]
    fn depth_bounds_the_tree() {
        let (f, ids) = chain();
        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_callees(&f.root(&ids[0]), 2).unwrap();
        let level2 = &graph.root.callees[0].callees[0];
        assert_eq!(level2.id, ids[2]);
        assert!(level2.callees.is_empty());
        assert!(!level2.is_cyclic_ref);
        assert!(!graph.truncated);
    }

    #[test]
    fn node_ceiling_truncates() {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service"));
        let root = f.method("a.S", "root");
        for i in 0..10 {
            let child = f.method("a.S", &format!("c{i}"));
            f.call(&root, &child);
        }
        let config = AnalysisConfig::builder().max_nodes(4).build();
        let analyzer = CallAnalyzer::new(&f.index, config);
        let graph = analyzer.analyze_callees(&f.root(&root), 5).unwrap();
        assert_eq!(graph.root.callees.len(), 3);
        assert_eq!(graph.node_ids().len(), 4);
        assert!(graph.truncated);
    }

    #[test]
    fn excluded_packages_never_appear() {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service")).class("a.internal.X", None);
        let root = f.method("a.S", "root");
        let hidden = f.method("a.internal.X", "run");
        f.call(&root, &hidden).call(&root, "java.util.List#add(java.lang.Object)");
        let config = AnalysisConfig::builder()
            .include_package("a.")
            .exclude_package("a.internal.")
            .build();
        let analyzer = CallAnalyzer::new(&f.index, config);
        let graph = analyzer.analyze_callees(&f.root(&root), 5).unwrap();
        assert!(graph.root.callees.is_empty());
        assert_eq!(graph.methods.len(), 1);
    }

    #[test]
    fn library_calls_are_external_leaves() {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service"));
        let root = f.method("a.S", "root");
        f.call(&root, "com.lib.Client#send(java.lang.String)");
        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_callees(&f.root(&root), 5).unwrap();
        let external = graph.method("com.lib.Client#send(java.lang.String)").unwrap();
        assert_eq!(external.node_type, NodeType::External);
        assert_eq!(external.class_name, "Client");
        assert_eq!(external.metadata.parameter_types, vec!["java.lang.String"]);
    }

    #[test]
    fn interface_calls_resolve_to_implementation() {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service"));
        f.index.add_type(TypeInfo::new("a.Repo", TypeKind::Interface));
        f.implementing("a.RepoImpl", "a.Repo", Some("Repository"));
        let root = f.method("a.S", "root");
        f.index.add_method(MethodInfo {
            is_abstract: true,
            ..MethodInfo::new("a.Repo", "save", &[])
        });
        let save_impl = f.method("a.RepoImpl", "save");
        f.call(&root, "a.Repo#save()");

        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_callees(&f.root(&root), 5).unwrap();
        assert_eq!(ids(&graph.root.callees), vec![save_impl.as_str()]);
        assert_eq!(graph.root.callees[0].via.as_deref(), Some("a.Repo#save()"));

        let config = AnalysisConfig::builder().resolve_implementations(false).build();
        let analyzer = CallAnalyzer::new(&f.index, config);
        let graph = analyzer.analyze_callees(&f.root(&root), 5).unwrap();
        assert_eq!(ids(&graph.root.callees), vec!["a.Repo#save()"]);
        assert_eq!(graph.method("a.Repo#save()").unwrap().node_type, NodeType::Interface);
    }

    #[test]
    fn events_link_publishers_and_listeners() {
        let mut f = Fixture::new();
        f.class("a.S", None).class("a.Mailer", Some("Component"));
        let root = f.method("a.S", "place");
        let mut listener = MethodInfo::new("a.Mailer", "onPlaced", &["a.Placed"]);
        listener.annotations.push(Annotation::new("EventListener"));
        let listener_id = listener.id.clone();
        f.index.add_method(listener);
        f.index.add_call(
            &root,
            CallSite {
                target: "org.springframework.context.ApplicationEventPublisher#publishEvent(java.lang.Object)".to_string(),
                line: Some(3),
                published_event: Some("a.Placed".to_string()),
            },
        );

        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_callees(&f.root(&root), 5).unwrap();
        let listener_node = graph
            .root
            .callees
            .iter()
            .find(|n| n.id == listener_id)
            .unwrap();
        assert_eq!(listener_node.via.as_deref(), Some("a.Placed"));
        let publisher = graph.root_method().unwrap();
        assert_eq!(publisher.node_type, NodeType::EventPublisher);
        assert_eq!(publisher.metadata.event_class.as_deref(), Some("a.Placed"));

        let callers = analyzer
            .analyze_callers(&f.root(&listener_id), 5)
            .unwrap();
        assert_eq!(ids(&callers.root.callers), vec![root.as_str()]);

        let quiet = CallAnalyzer::new(
            &f.index,
            AnalysisConfig::builder().track_events(false).build(),
        );
        let graph = quiet.analyze_callees(&f.root(&root), 5).unwrap();
        assert!(graph.root.callees.iter().all(|n| n.id != listener_id));
    }

    #[test]
    fn callers_include_calls_through_interface() {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service"));
        f.index.add_type(TypeInfo::new("a.Repo", TypeKind::Interface));
        f.implementing("a.RepoImpl", "a.Repo", Some("Repository"));
        let caller = f.method("a.S", "root");
        f.index.add_method(MethodInfo {
            is_abstract: true,
            ..MethodInfo::new("a.Repo", "save", &[])
        });
        let save_impl = f.method("a.RepoImpl", "save");
        f.call(&caller, "a.Repo#save()");

        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_callers(&f.root(&save_impl), 5).unwrap();
        assert_eq!(ids(&graph.root.callers), vec![caller.as_str()]);
        assert_eq!(graph.root.callers[0].via.as_deref(), Some("a.Repo#save()"));
        assert!(graph.root.callees.is_empty());

        let graph = analyzer.analyze_callers(&f.root("a.Repo#save()"), 5).unwrap();
        assert_eq!(ids(&graph.root.callers), vec![caller.as_str()]);
        assert!(graph.root.callers[0].via.is_none());
    }

    #[test]
    fn bidirectional_populates_only_the_root_on_both_sides() {
        let (f, ids_) = chain();
        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_bidirectional(&f.root(&ids_[2]), 5).unwrap();
        assert_eq!(ids(&graph.root.callers), vec![ids_[1].as_str()]);
        assert_eq!(ids(&graph.root.callees), vec![ids_[3].as_str()]);
        let upstream = &graph.root.callers[0];
        assert!(upstream.callees.is_empty());
        assert_eq!(upstream.callers[0].id, ids_[0]);
        assert_eq!(graph.direction, AnalysisDirection::Both);
    }

    #[test]
    fn duplicate_call_sites_produce_one_child() {
        let mut f = Fixture::new();
        f.class("a.S", Some("Service"));
        let root = f.method("a.S", "root");
        let child = f.method("a.S", "child");
        f.call(&root, &child).call(&root, &child);
        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        let graph = analyzer.analyze_callees(&f.root(&root), 5).unwrap();
        assert_eq!(graph.root.callees.len(), 1);
    }

    #[test]
    fn cancelled_token_stops_analysis() {
        let (f, ids) = chain();
        let token = CancellationToken::new();
        token.cancel();
        let analyzer =
            CallAnalyzer::new(&f.index, AnalysisConfig::default()).with_cancellation(token);
        let err = analyzer.analyze_callees(&f.root(&ids[0]), 5).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn unknown_query_produces_no_graph() {
        let (f, _) = chain();
        let analyzer = CallAnalyzer::new(&f.index, AnalysisConfig::default());
        assert!(
            analyzer
                .analyze_query("Nope.nothing", AnalysisDirection::Both)
                .unwrap()
                .is_none()
        );
        assert!(
            analyzer
                .analyze_query("S.m0", AnalysisDirection::CalleesOnly)
                .unwrap()
                .is_some()
        );
    }
}
