//! Indented text tree with caller and callee sections.

use super::{entry_badges, node_label, via_label};
use crate::model::{CallGraph, CallNode, TraversalSide};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const INDENT: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    pub show_async_badge: bool,
    pub show_transactional_badge: bool,
    pub show_http_method_badge: bool,
    /// Levels below each section that are expanded; `None` expands everything.
    pub expand_levels: Option<usize>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            show_async_badge: true,
            show_transactional_badge: true,
            show_http_method_badge: true,
            expand_levels: None,
        }
    }
}

impl TreeOptions {
    fn keeps(&self, badge: &str) -> bool {
        match badge {
            "@Async" => self.show_async_badge,
            "@Tx" => self.show_transactional_badge,
            "Event" => true,
            _ => self.show_http_method_badge,
        }
    }
}

fn describe(graph: &CallGraph, node: &CallNode, options: &TreeOptions) -> String {
    let entry = graph.method(&node.id);
    let mut line = node_label(graph, &node.id);
    for badge in entry_badges(entry, |badge| options.keeps(badge)) {
        let _ = write!(line, " [{badge}]");
    }
    if node.is_cyclic_ref {
        line.push_str(" [cycle]");
    }
    if let Some(entry) = entry {
        let _ = write!(line, " {}", entry.node_type.display_name());
    }
    if let Some(via) = &node.via {
        let _ = write!(line, " ({})", via_label(via));
    }
    line
}

fn render_children(
    graph: &CallGraph,
    node: &CallNode,
    side: TraversalSide,
    level: usize,
    options: &TreeOptions,
    out: &mut String,
) {
    for child in node.children(side) {
        let mut line = describe(graph, child, options);
        let hidden = options
            .expand_levels
            .is_some_and(|levels| level >= levels)
            && !child.children(side).is_empty();
        if hidden {
            let _ = write!(line, " (+{})", child.children(side).len());
        }
        let _ = writeln!(out, "{}{}", INDENT.repeat(level), line);
        if !hidden {
            render_children(graph, child, side, level + 1, options, out);
        }
    }
}

pub fn render_tree(graph: &CallGraph, options: &TreeOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", describe(graph, &graph.root, options));
    for (side, title) in [
        (TraversalSide::Callers, "Callers"),
        (TraversalSide::Callees, "Callees"),
    ] {
        let children = graph.root.children(side);
        if children.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} ({})", title, children.len());
        render_children(graph, &graph.root, side, 1, options, &mut out);
    }
    if graph.truncated {
        out.push_str("(truncated: node limit reached)\n");
    }
    out
}
