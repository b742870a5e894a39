//! Mermaid flowchart export.

use super::{entry_badges, node_label, via_label};
use crate::model::{CallGraph, CallNode, NodeType, TraversalSide};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;

/// Mermaid-safe node identifier derived from the method id. Stable across
/// runs so diagrams diff cleanly.
pub fn node_key(id: &str) -> String {
    let hash = blake3::hash(id.as_bytes()).to_hex();
    format!("n_{}", &hash.as_str()[..12])
}

fn class_name(node_type: NodeType) -> &'static str {
    node_type.icon()
}

fn escape(label: &str) -> String {
    label.replace('"', "#quot;")
}

struct Edge<'g> {
    from: &'g str,
    to: &'g str,
    via: Option<&'g str>,
}

fn collect_edges<'g>(
    node: &'g CallNode,
    side: TraversalSide,
    seen: &mut HashSet<(&'g str, &'g str)>,
    edges: &mut Vec<Edge<'g>>,
) {
    for child in node.children(side) {
        let (from, to) = match side {
            TraversalSide::Callers => (child.id.as_str(), node.id.as_str()),
            TraversalSide::Callees => (node.id.as_str(), child.id.as_str()),
        };
        if seen.insert((from, to)) {
            edges.push(Edge {
                from,
                to,
                via: child.via.as_deref(),
            });
        }
        collect_edges(child, side, seen, edges);
    }
}

pub fn to_mermaid(graph: &CallGraph) -> String {
    let mut out = String::from("flowchart LR\n");
    let mut used = BTreeSet::new();

    for id in graph.node_ids() {
        let entry = graph.method(id);
        let node_type = entry.map(|e| e.node_type).unwrap_or(NodeType::Unknown);
        used.insert(class_name(node_type));
        let mut label = node_label(graph, id);
        for badge in entry_badges(entry, |_| true) {
            label.push_str(" [");
            label.push_str(&badge);
            label.push(']');
        }
        let _ = writeln!(
            out,
            "    {}[\"{}\"]:::{}",
            node_key(id),
            escape(&label),
            class_name(node_type)
        );
    }

    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    collect_edges(&graph.root, TraversalSide::Callers, &mut seen, &mut edges);
    collect_edges(&graph.root, TraversalSide::Callees, &mut seen, &mut edges);
    for edge in edges {
        match edge.via {
            Some(via) => {
                let _ = writeln!(
                    out,
                    "    {} -->|{}| {}",
                    node_key(edge.from),
                    escape(&via_label(via)),
                    node_key(edge.to)
                );
            }
            None => {
                let _ = writeln!(out, "    {} --> {}", node_key(edge.from), node_key(edge.to));
            }
        }
    }

    for node_type in ALL_TYPES {
        let name = class_name(node_type);
        if used.contains(name) {
            let _ = writeln!(
                out,
                "    classDef {} fill:{},stroke:#333,color:#fff",
                name,
                node_type.color()
            );
        }
    }
    out
}

const ALL_TYPES: [NodeType; 12] = [
    NodeType::Controller,
    NodeType::Service,
    NodeType::Repository,
    NodeType::Entity,
    NodeType::Interface,
    NodeType::Implementation,
    NodeType::EventPublisher,
    NodeType::EventListener,
    NodeType::Component,
    NodeType::Configuration,
    NodeType::External,
    NodeType::Unknown,
];
