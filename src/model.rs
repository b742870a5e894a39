use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Role of a method's owning type, used for styling and layer filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Controller,
    Service,
    Repository,
    Entity,
    Interface,
    Implementation,
    EventPublisher,
    EventListener,
    Component,
    Configuration,
    External,
    Unknown,
}

impl NodeType {
    pub fn display_name(self) -> &'static str {
        match self {
            NodeType::Controller => "Controller",
            NodeType::Service => "Service",
            NodeType::Repository => "Repository",
            NodeType::Entity => "Entity",
            NodeType::Interface => "Interface",
            NodeType::Implementation => "Implementation",
            NodeType::EventPublisher => "Event Publisher",
            NodeType::EventListener => "Event Listener",
            NodeType::Component => "Component",
            NodeType::Configuration => "Configuration",
            NodeType::External => "External",
            NodeType::Unknown => "Class",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            NodeType::Controller => "#4CAF50",
            NodeType::Service => "#2196F3",
            NodeType::Repository => "#9C27B0",
            NodeType::Entity => "#FF6F00",
            NodeType::Interface => "#607D8B",
            NodeType::Implementation => "#78909C",
            NodeType::EventPublisher => "#FF9800",
            NodeType::EventListener => "#FFB74D",
            NodeType::Component => "#00BCD4",
            NodeType::Configuration => "#795548",
            NodeType::External => "#757575",
            NodeType::Unknown => "#9E9E9E",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            NodeType::Controller => "controller",
            NodeType::Service => "service",
            NodeType::Repository => "repository",
            NodeType::Entity => "entity",
            NodeType::Interface => "interface",
            NodeType::Implementation => "implementation",
            NodeType::EventPublisher => "event_pub",
            NodeType::EventListener => "event_listener",
            NodeType::Component => "component",
            NodeType::Configuration => "config",
            NodeType::External => "external",
            NodeType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    PackagePrivate,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::PackagePrivate => "package_private",
            Visibility::Private => "private",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Visibility::Public),
            "protected" => Some(Visibility::Protected),
            "package_private" | "package-private" | "package" | "internal" => {
                Some(Visibility::PackagePrivate)
            }
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPropagation {
    #[default]
    None,
    Required,
    RequiresNew,
    NotSupported,
    Supports,
    Mandatory,
    Never,
    Nested,
}

impl TransactionPropagation {
    /// Accepts `REQUIRES_NEW`, `Propagation.REQUIRES_NEW` or a fully qualified enum constant.
    pub fn parse(raw: &str) -> Option<Self> {
        let constant = raw.rsplit('.').next().unwrap_or(raw).trim();
        match constant.to_ascii_uppercase().as_str() {
            "REQUIRED" => Some(TransactionPropagation::Required),
            "REQUIRES_NEW" => Some(TransactionPropagation::RequiresNew),
            "NOT_SUPPORTED" => Some(TransactionPropagation::NotSupported),
            "SUPPORTS" => Some(TransactionPropagation::Supports),
            "MANDATORY" => Some(TransactionPropagation::Mandatory),
            "NEVER" => Some(TransactionPropagation::Never),
            "NESTED" => Some(TransactionPropagation::Nested),
            _ => None,
        }
    }
}

/// Behavioral metadata attached to every node of a call graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub is_async: bool,
    pub is_transactional: bool,
    pub transaction_propagation: TransactionPropagation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_class: Option<String>,
    pub annotations: Vec<String>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    /// 1-based; -1 when unknown.
    pub line_number: i64,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            is_async: false,
            is_transactional: false,
            transaction_propagation: TransactionPropagation::None,
            http_method: None,
            http_path: None,
            event_class: None,
            annotations: Vec::new(),
            visibility: Visibility::Public,
            is_static: false,
            parameter_types: Vec::new(),
            return_type: "void".to_string(),
            line_number: -1,
        }
    }
}

impl NodeMetadata {
    /// Compact signature such as `process(String, Long): Boolean`.
    pub fn signature(&self, method_name: &str) -> String {
        let params: Vec<&str> = self
            .parameter_types
            .iter()
            .map(|ty| simple_name(ty))
            .collect();
        format!(
            "{}({}): {}",
            method_name,
            params.join(", "),
            simple_name(&self.return_type)
        )
    }

    pub fn badges(&self) -> Vec<String> {
        let mut badges = Vec::new();
        if self.is_async {
            badges.push("@Async".to_string());
        }
        if self.is_transactional {
            badges.push("@Tx".to_string());
        }
        if let Some(method) = &self.http_method {
            badges.push(method.clone());
        }
        if self.event_class.is_some() {
            badges.push("Event".to_string());
        }
        badges
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// Arena value: everything known about one method, stored once per graph.
#[derive(Debug, Clone, Serialize)]
pub struct MethodEntry {
    pub id: String,
    pub class_name: String,
    pub qualified_class_name: String,
    pub method_name: String,
    pub node_type: NodeType,
    pub metadata: NodeMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl MethodEntry {
    pub fn label(&self) -> String {
        format!("{}.{}()", self.class_name, self.method_name)
    }
}

/// A traversal tree node. Holds only the method id; details live in the
/// owning graph's arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallNode {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub callers: Vec<CallNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub callees: Vec<CallNode>,
    pub is_cyclic_ref: bool,
    /// Abstract method id or event class this edge was resolved through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl CallNode {
    pub fn leaf(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            callers: Vec::new(),
            callees: Vec::new(),
            is_cyclic_ref: false,
            via: None,
        }
    }

    pub fn cyclic(id: impl Into<String>) -> Self {
        Self {
            is_cyclic_ref: true,
            ..Self::leaf(id)
        }
    }

    pub fn with_via(mut self, via: Option<String>) -> Self {
        self.via = via;
        self
    }

    pub fn children(&self, direction: TraversalSide) -> &[CallNode] {
        match direction {
            TraversalSide::Callers => &self.callers,
            TraversalSide::Callees => &self.callees,
        }
    }
}

/// One of the two traversal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalSide {
    Callers,
    Callees,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDirection {
    CallersOnly,
    CalleesOnly,
    #[default]
    Both,
}

impl AnalysisDirection {
    pub fn includes(self, side: TraversalSide) -> bool {
        matches!(
            (self, side),
            (AnalysisDirection::Both, _)
                | (AnalysisDirection::CallersOnly, TraversalSide::Callers)
                | (AnalysisDirection::CalleesOnly, TraversalSide::Callees)
        )
    }
}

impl FromStr for AnalysisDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "callers" | "callers_only" | "upstream" | "up" | "in" => Ok(AnalysisDirection::CallersOnly),
            "callees" | "callees_only" | "downstream" | "down" | "out" => {
                Ok(AnalysisDirection::CalleesOnly)
            }
            "both" | "bidirectional" | "all" => Ok(AnalysisDirection::Both),
            other => bail!("unknown direction: {other} (expected callers, callees or both)"),
        }
    }
}

/// Result of one analysis: the traversal tree plus the method arena.
#[derive(Debug, Clone, Serialize)]
pub struct CallGraph {
    pub root: CallNode,
    pub direction: AnalysisDirection,
    pub methods: BTreeMap<String, MethodEntry>,
    /// Set when the node ceiling cut the traversal short.
    pub truncated: bool,
}

impl CallGraph {
    pub fn method(&self, id: &str) -> Option<&MethodEntry> {
        self.methods.get(id)
    }

    pub fn root_method(&self) -> Option<&MethodEntry> {
        self.methods.get(&self.root.id)
    }

    /// Distinct method ids reachable in the tree, in discovery order.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        let mut ordered = Vec::new();
        collect_ids(&self.root, &mut seen, &mut ordered);
        ordered
    }
}

fn collect_ids<'a>(
    node: &'a CallNode,
    seen: &mut std::collections::HashSet<&'a str>,
    ordered: &mut Vec<&'a str>,
) {
    if seen.insert(node.id.as_str()) {
        ordered.push(node.id.as_str());
    }
    for child in node.callers.iter().chain(node.callees.iter()) {
        collect_ids(child, seen, ordered);
    }
}

/// Last dotted segment of a type name, with generic arguments kept.
pub fn simple_name(qualified: &str) -> &str {
    let base = qualified.split('<').next().unwrap_or(qualified);
    match base.rfind('.') {
        Some(pos) => &qualified[pos + 1..],
        None => qualified,
    }
}
