//! Text renderings of an analyzed call graph.

pub mod mermaid;
pub mod tree;

pub use mermaid::to_mermaid;
pub use tree::{TreeOptions, render_tree};

use crate::index::split_method_id;
use crate::model::{CallGraph, MethodEntry, simple_name};

/// `Class.method()` for a node, falling back to the id when the arena has no entry.
fn node_label(graph: &CallGraph, id: &str) -> String {
    match graph.method(id) {
        Some(entry) => entry.label(),
        None => {
            let (owner, name) = split_method_id(id);
            format!("{}.{}()", simple_name(owner), name)
        }
    }
}

/// Short description of what an edge was resolved through: an abstract
/// method id or an event class.
fn via_label(via: &str) -> String {
    if via.contains('#') {
        let (owner, name) = split_method_id(via);
        format!("via {}.{}", simple_name(owner), name)
    } else {
        format!("event {}", simple_name(via))
    }
}

fn entry_badges(entry: Option<&MethodEntry>, keep: impl Fn(&str) -> bool) -> Vec<String> {
    entry
        .map(|entry| {
            entry
                .metadata
                .badges()
                .into_iter()
                .filter(|badge| keep(badge))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn via_labels_distinguish_interfaces_and_events() {
        assert_eq!(
            via_label("com.example.OrderRepository#save(com.example.Order)"),
            "via OrderRepository.save"
        );
        assert_eq!(via_label("com.example.OrderCreatedEvent"), "event OrderCreatedEvent");
    }
}
