//! Symbol index abstraction.
//!
//! The analyzer never parses source. It asks a [`SymbolIndex`] for methods,
//! call sites, type hierarchy and annotations. Two adapters exist: the
//! in-memory [`MemoryIndex`] built from an [`IndexSnapshot`], and the SQLite
//! store in [`crate::db`].

pub mod snapshot;

pub use snapshot::{CallSpec, IndexSnapshot, MemoryIndex};

use crate::model::{Visibility, simple_name};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    #[default]
    Class,
    AbstractClass,
    Interface,
}

impl TypeKind {
    pub fn is_abstract(self) -> bool {
        matches!(self, TypeKind::AbstractClass | TypeKind::Interface)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::AbstractClass => "abstract_class",
            TypeKind::Interface => "interface",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "interface" => TypeKind::Interface,
            "abstract_class" => TypeKind::AbstractClass,
            _ => TypeKind::Class,
        }
    }
}

/// An annotation occurrence. Snapshots may give it as a bare name or as
/// `{ name, attributes }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AnnotationRepr")]
pub struct Annotation {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnnotationRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
}

impl From<AnnotationRepr> for Annotation {
    fn from(repr: AnnotationRepr) -> Self {
        match repr {
            AnnotationRepr::Name(name) => Annotation::new(name),
            AnnotationRepr::Full { name, attributes } => Annotation { name, attributes },
        }
    }
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Exact qualified match, or simple-name match when this occurrence is unqualified.
    pub fn is(&self, qualified: &str) -> bool {
        if self.name == qualified {
            return true;
        }
        !self.name.contains('.') && self.name == simple_name(qualified)
    }

    pub fn is_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.is(name))
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|value| value.as_str())
            .filter(|value| !value.is_empty())
    }
}

fn default_true() -> bool {
    true
}

fn default_return_type() -> String {
    "void".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "name")]
    pub qualified_name: String,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default = "default_true")]
    pub project_source: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl TypeInfo {
    pub fn new(qualified_name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            kind,
            annotations: Vec::new(),
            supertypes: Vec::new(),
            project_source: true,
            file_path: None,
        }
    }

    pub fn simple_name(&self) -> &str {
        simple_name(&self.qualified_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Computed from owner, name and parameters when a snapshot leaves it empty.
    #[serde(default)]
    pub id: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default = "default_return_type")]
    pub return_type: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_static: bool,
    /// No body to inspect (abstract, interface or binary-only).
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

impl MethodInfo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, parameter_types: &[&str]) -> Self {
        let owner = owner.into();
        let name = name.into();
        let parameter_types: Vec<String> = parameter_types.iter().map(|p| p.to_string()).collect();
        Self {
            id: method_id(&owner, &name, &parameter_types),
            owner,
            name,
            parameter_types,
            return_type: default_return_type(),
            visibility: Visibility::Public,
            is_static: false,
            is_abstract: false,
            annotations: Vec::new(),
            file_path: None,
            line: None,
        }
    }

    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = method_id(&self.owner, &self.name, &self.parameter_types);
        }
    }

    /// Same name and parameter list; the override relation used for resolution.
    pub fn same_signature(&self, other: &MethodInfo) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }
}

/// One call edge as the index reports it. For caller queries `target` is the
/// calling method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Event type handed to the publisher at this call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_event: Option<String>,
}

impl CallSite {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            line: None,
            published_event: None,
        }
    }
}

/// Read-only queries the analyzer needs from a source model.
///
/// Errors mean the index itself is unavailable; missing symbols are `None`
/// or empty results.
pub trait SymbolIndex: Send + Sync {
    fn method(&self, id: &str) -> Result<Option<MethodInfo>>;

    fn methods_named(&self, name: &str) -> Result<Vec<MethodInfo>>;

    fn methods_of(&self, type_name: &str) -> Result<Vec<MethodInfo>>;

    fn call_sites_of(&self, method_id: &str) -> Result<Vec<CallSite>>;

    fn callers_of(&self, method_id: &str) -> Result<Vec<CallSite>>;

    fn type_info(&self, type_name: &str) -> Result<Option<TypeInfo>>;

    /// Transitive inheritors, interfaces included.
    fn implementers_of(&self, type_name: &str) -> Result<Vec<TypeInfo>>;

    fn is_project_source(&self, type_name: &str) -> Result<bool> {
        Ok(self
            .type_info(type_name)?
            .map(|info| info.project_source)
            .unwrap_or(false))
    }

    fn listeners_of(&self, event_type: &str) -> Result<Vec<String>>;

    fn publishers_of(&self, event_type: &str) -> Result<Vec<String>>;
}

/// `com.example.OrderService#createOrder(OrderRequest)`.
pub fn method_id(owner: &str, name: &str, parameter_types: &[String]) -> String {
    format!("{}#{}({})", owner, name, parameter_types.join(","))
}

/// Owner type and method name recovered from an id, for methods the index
/// does not describe. Accepts `Owner#name(..)` and dotted `pkg.Owner.name`.
pub fn split_method_id(id: &str) -> (&str, &str) {
    if let Some((owner, rest)) = id.split_once('#') {
        let name = rest.split('(').next().unwrap_or(rest);
        return (owner, name);
    }
    let base = id.split('(').next().unwrap_or(id);
    match base.rfind('.') {
        Some(pos) => (&base[..pos], &base[pos + 1..]),
        None => ("", base),
    }
}

/// Methods matching a user query: an exact id, `Class.method`,
/// `pkg.Class.method` or a bare method name. Sorted by id.
pub fn find_methods(index: &dyn SymbolIndex, query: &str) -> Result<Vec<MethodInfo>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    if query.contains('#') {
        return Ok(index.method(query)?.into_iter().collect());
    }
    let (owner, name) = match query.rfind('.') {
        Some(pos) => (Some(&query[..pos]), &query[pos + 1..]),
        None => (None, query),
    };
    let mut methods: Vec<MethodInfo> = index
        .methods_named(name)?
        .into_iter()
        .filter(|method| match owner {
            Some(owner) => {
                method.owner == owner || method.owner.ends_with(&format!(".{owner}"))
            }
            None => true,
        })
        .collect();
    methods.sort_by(|a, b| a.id.cmp(&b.id));
    methods.dedup_by(|a, b| a.id == b.id);
    Ok(methods)
}

/// Event type a listener method consumes: the annotation's `classes`/`value`
/// attribute, else its first parameter.
pub fn listened_event(method: &MethodInfo) -> Option<String> {
    let annotation = crate::annotations::find(&method.annotations, crate::annotations::EVENT_LISTENER)?;
    let declared = annotation
        .attribute("classes")
        .or_else(|| annotation.attribute("value"))
        .map(|raw| {
            raw.trim_matches(|c| c == '{' || c == '}' || c == '[' || c == ']')
                .trim()
                .trim_end_matches(".class")
                .trim_end_matches("::class")
                .to_string()
        })
        .filter(|event| !event.is_empty());
    declared.or_else(|| method.parameter_types.first().cloned())
}

/// First match for `query`; `None` means there is nothing to analyze.
pub fn resolve_method(index: &dyn SymbolIndex, query: &str) -> Result<Option<MethodInfo>> {
    Ok(find_methods(index, query)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_id_round_trips_owner_and_name() {
        let id = method_id(
            "com.example.OrderService",
            "createOrder",
            &["com.example.OrderRequest".to_string()],
        );
        assert_eq!(
            id,
            "com.example.OrderService#createOrder(com.example.OrderRequest)"
        );
        assert_eq!(split_method_id(&id), ("com.example.OrderService", "createOrder"));
    }

    #[test]
    fn split_dotted_ids() {
        assert_eq!(
            split_method_id("java.util.List.add"),
            ("java.util.List", "add")
        );
        assert_eq!(split_method_id("main"), ("", "main"));
    }

    #[test]
    fn annotation_deserializes_from_name_or_object() {
        let parsed: Vec<Annotation> = serde_json::from_str(
            r#"["Service", {"name": "GetMapping", "attributes": {"value": "/x"}}]"#,
        )
        .unwrap();
        assert_eq!(parsed[0], Annotation::new("Service"));
        assert_eq!(parsed[1].attribute("value"), Some("/x"));
        assert!(parsed[1].is("org.springframework.web.bind.annotation.GetMapping"));
    }

    #[test]
    fn listener_event_prefers_declared_class() {
        let mut method = MethodInfo::new("a.Audit", "on", &["java.lang.Object"]);
        method.annotations.push(
            Annotation::new("EventListener").with_attribute("classes", "a.OrderPlaced::class"),
        );
        assert_eq!(listened_event(&method).as_deref(), Some("a.OrderPlaced"));
        method.annotations[0].attributes.clear();
        assert_eq!(listened_event(&method).as_deref(), Some("java.lang.Object"));
        method.annotations.clear();
        assert_eq!(listened_event(&method), None);
    }

    #[test]
    fn find_methods_by_class_suffix() {
        let mut index = MemoryIndex::default();
        index.add_method(MethodInfo::new("com.a.OrderService", "create", &[]));
        index.add_method(MethodInfo::new("com.b.OtherOrderService", "create", &[]));
        let found = find_methods(&index, "OrderService.create").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner, "com.a.OrderService");
        assert_eq!(find_methods(&index, "create").unwrap().len(), 2);
        assert!(resolve_method(&index, "Missing.create").unwrap().is_none());
    }
}
