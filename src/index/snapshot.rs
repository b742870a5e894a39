//! Precomputed index snapshots and the in-memory index built from them.

use super::{CallSite, MethodInfo, SymbolIndex, TypeInfo, listened_event};
use anyhow::{Context, Result};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

/// A call edge in snapshot form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSpec {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Event type published by this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishes: Option<String>,
}

/// Output of an external batch parse: types, methods and call edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub types: Vec<TypeInfo>,
    #[serde(default)]
    pub methods: Vec<MethodInfo>,
    #[serde(default)]
    pub calls: Vec<CallSpec>,
}

impl IndexSnapshot {
    /// Reads JSON, or YAML when the extension is `.yaml`/`.yml`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut snapshot: IndexSnapshot = if is_yaml {
            serde_yaml_ng::from_str(&content)
                .with_context(|| format!("parse yaml snapshot {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("parse json snapshot {}", path.display()))?
        };
        snapshot.normalize();
        Ok(snapshot)
    }

    /// Fills in missing method ids.
    pub fn normalize(&mut self) {
        for method in &mut self.methods {
            method.ensure_id();
        }
    }

    /// Content digest, used to skip re-importing an unchanged snapshot.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Hasher::new();
        hasher.update(&serde_json::to_vec(self)?);
        Ok(format!("snap_{}", &hasher.finalize().to_hex()[..16]))
    }
}

/// Hash-map backed [`SymbolIndex`]. Iteration follows insertion order so
/// results are reproducible.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    types: HashMap<String, TypeInfo>,
    type_order: Vec<String>,
    methods: HashMap<String, MethodInfo>,
    method_order: Vec<String>,
    callees: HashMap<String, Vec<CallSite>>,
    callers: HashMap<String, Vec<CallSite>>,
    listeners: HashMap<String, Vec<String>>,
    publishers: HashMap<String, Vec<String>>,
}

impl MemoryIndex {
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut index = MemoryIndex::default();
        for ty in snapshot.types {
            index.add_type(ty);
        }
        for mut method in snapshot.methods {
            method.ensure_id();
            index.add_method(method);
        }
        for call in snapshot.calls {
            let site = CallSite {
                target: call.to,
                line: call.line,
                published_event: call.publishes,
            };
            index.add_call(&call.from, site);
        }
        index
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_snapshot(IndexSnapshot::load(path)?))
    }

    pub fn add_type(&mut self, ty: TypeInfo) {
        if !self.types.contains_key(&ty.qualified_name) {
            self.type_order.push(ty.qualified_name.clone());
        }
        self.types.insert(ty.qualified_name.clone(), ty);
    }

    pub fn add_method(&mut self, mut method: MethodInfo) {
        method.ensure_id();
        if let Some(event) = listened_event(&method) {
            let listeners = self.listeners.entry(event).or_default();
            if !listeners.contains(&method.id) {
                listeners.push(method.id.clone());
            }
        }
        if !self.methods.contains_key(&method.id) {
            self.method_order.push(method.id.clone());
        }
        self.methods.insert(method.id.clone(), method);
    }

    pub fn add_call(&mut self, from: &str, site: CallSite) {
        if let Some(event) = &site.published_event {
            let publishers = self.publishers.entry(event.clone()).or_default();
            if !publishers.iter().any(|id| id == from) {
                publishers.push(from.to_string());
            }
        }
        self.callers
            .entry(site.target.clone())
            .or_default()
            .push(CallSite {
                target: from.to_string(),
                line: site.line,
                published_event: site.published_event.clone(),
            });
        self.callees.entry(from.to_string()).or_default().push(site);
    }

    pub fn method_count(&self) -> usize {
        self.method_order.len()
    }

    pub fn type_count(&self) -> usize {
        self.type_order.len()
    }
}

impl SymbolIndex for MemoryIndex {
    fn method(&self, id: &str) -> Result<Option<MethodInfo>> {
        Ok(self.methods.get(id).cloned())
    }

    fn methods_named(&self, name: &str) -> Result<Vec<MethodInfo>> {
        Ok(self
            .method_order
            .iter()
            .filter_map(|id| self.methods.get(id))
            .filter(|method| method.name == name)
            .cloned()
            .collect())
    }

    fn methods_of(&self, type_name: &str) -> Result<Vec<MethodInfo>> {
        Ok(self
            .method_order
            .iter()
            .filter_map(|id| self.methods.get(id))
            .filter(|method| method.owner == type_name)
            .cloned()
            .collect())
    }

    fn call_sites_of(&self, method_id: &str) -> Result<Vec<CallSite>> {
        Ok(self.callees.get(method_id).cloned().unwrap_or_default())
    }

    fn callers_of(&self, method_id: &str) -> Result<Vec<CallSite>> {
        Ok(self.callers.get(method_id).cloned().unwrap_or_default())
    }

    fn type_info(&self, type_name: &str) -> Result<Option<TypeInfo>> {
        Ok(self.types.get(type_name).cloned())
    }

    fn implementers_of(&self, type_name: &str) -> Result<Vec<TypeInfo>> {
        let mut found: Vec<TypeInfo> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(type_name);
        queue.push_back(type_name);
        while let Some(current) = queue.pop_front() {
            for name in &self.type_order {
                let Some(ty) = self.types.get(name) else {
                    continue;
                };
                if ty.supertypes.iter().any(|s| s == current) && seen.insert(name.as_str()) {
                    found.push(ty.clone());
                    queue.push_back(name.as_str());
                }
            }
        }
        Ok(found)
    }

    fn listeners_of(&self, event_type: &str) -> Result<Vec<String>> {
        Ok(self.listeners.get(event_type).cloned().unwrap_or_default())
    }

    fn publishers_of(&self, event_type: &str) -> Result<Vec<String>> {
        Ok(self.publishers.get(event_type).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Annotation, TypeKind};

    fn sample() -> MemoryIndex {
        let snapshot: IndexSnapshot = serde_json::from_str(
            r#"{
                "types": [
                    {"name": "a.Repo", "kind": "interface"},
                    {"name": "a.BaseRepo", "kind": "abstract_class", "supertypes": ["a.Repo"]},
                    {"name": "a.JpaRepo", "supertypes": ["a.BaseRepo"]},
                    {"name": "a.MemRepo", "supertypes": ["a.Repo"], "annotations": ["Repository"]}
                ],
                "methods": [
                    {"owner": "a.Repo", "name": "save", "parameter_types": ["a.Order"], "is_abstract": true},
                    {"owner": "a.MemRepo", "name": "save", "parameter_types": ["a.Order"]},
                    {"owner": "a.Audit", "name": "onSaved", "parameter_types": ["a.Saved"],
                     "annotations": ["EventListener"]}
                ],
                "calls": [
                    {"from": "a.MemRepo#save(a.Order)", "to": "x.Bus#publish(java.lang.Object)",
                     "line": 7, "publishes": "a.Saved"}
                ]
            }"#,
        )
        .unwrap();
        MemoryIndex::from_snapshot(snapshot)
    }

    #[test]
    fn implementers_are_transitive_in_snapshot_order() {
        let index = sample();
        let names: Vec<String> = index
            .implementers_of("a.Repo")
            .unwrap()
            .into_iter()
            .map(|t| t.qualified_name)
            .collect();
        assert_eq!(names, vec!["a.BaseRepo", "a.MemRepo", "a.JpaRepo"]);
    }

    #[test]
    fn calls_are_indexed_both_ways() {
        let index = sample();
        let callees = index.call_sites_of("a.MemRepo#save(a.Order)").unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].line, Some(7));
        let callers = index.callers_of("x.Bus#publish(java.lang.Object)").unwrap();
        assert_eq!(callers[0].target, "a.MemRepo#save(a.Order)");
    }

    #[test]
    fn event_registry_from_annotations_and_calls() {
        let index = sample();
        assert_eq!(
            index.listeners_of("a.Saved").unwrap(),
            vec!["a.Audit#onSaved(a.Saved)".to_string()]
        );
        assert_eq!(
            index.publishers_of("a.Saved").unwrap(),
            vec!["a.MemRepo#save(a.Order)".to_string()]
        );
    }

    #[test]
    fn unknown_types_are_not_project_source() {
        let mut index = sample();
        index.add_type(TypeInfo {
            project_source: false,
            ..TypeInfo::new("lib.Client", TypeKind::Class)
        });
        assert!(index.is_project_source("a.MemRepo").unwrap());
        assert!(!index.is_project_source("lib.Client").unwrap());
        assert!(!index.is_project_source("nowhere.Thing").unwrap());
    }

    #[test]
    fn yaml_snapshot_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.yaml");
        std::fs::write(
            &path,
            "types:\n  - name: a.Svc\n    annotations: [Service]\nmethods:\n  - owner: a.Svc\n    name: run\n",
        )
        .unwrap();
        let snapshot = IndexSnapshot::load(&path).unwrap();
        assert_eq!(snapshot.methods[0].id, "a.Svc#run()");
        assert_eq!(snapshot.types[0].annotations[0], Annotation::new("Service"));
        assert!(snapshot.digest().unwrap().starts_with("snap_"));
    }
}
