//! Layered layout of a call tree.
//!
//! Callers go in columns left of the root, callees to the right. Each id is
//! placed once, columns are centered vertically against the tallest one, and
//! the whole computation is integer arithmetic over discovery order, so the
//! same tree always yields the same layout.

mod viewport;

pub use viewport::{MAX_SCALE, MIN_SCALE, Viewport};

use crate::model::{CallNode, TraversalSide};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

pub const NODE_WIDTH: i32 = 200;
pub const NODE_HEIGHT: i32 = 60;
pub const HORIZONTAL_GAP: i32 = 60;
pub const VERTICAL_GAP: i32 = 30;
/// Columns collected on each side of the root, independent of analysis depth.
pub const LAYOUT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionedNode {
    pub id: String,
    pub x: i32,
    pub y: i32,
    /// Negative for callers, positive for callees, 0 for the root.
    pub column: i32,
}

impl PositionedNode {
    pub fn contains(&self, world_x: f64, world_y: f64) -> bool {
        world_x >= f64::from(self.x)
            && world_x <= f64::from(self.x + NODE_WIDTH)
            && world_y >= f64::from(self.y)
            && world_y <= f64::from(self.y + NODE_HEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionedEdge {
    pub from: String,
    pub to: String,
}

/// Bounding box of all node rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Bounds {
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphLayout {
    /// Root first, then callers by column, then callees by column.
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<PositionedEdge>,
    pub total_height: i32,
}

impl GraphLayout {
    pub fn root(&self) -> Option<&PositionedNode> {
        self.nodes.first()
    }

    pub fn node(&self, id: &str) -> Option<&PositionedNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.nodes.first()?;
        let mut bounds = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x + NODE_WIDTH,
            max_y: first.y + NODE_HEIGHT,
        };
        for node in &self.nodes[1..] {
            bounds.min_x = bounds.min_x.min(node.x);
            bounds.min_y = bounds.min_y.min(node.y);
            bounds.max_x = bounds.max_x.max(node.x + NODE_WIDTH);
            bounds.max_y = bounds.max_y.max(node.y + NODE_HEIGHT);
        }
        Some(bounds)
    }

    /// Topmost-first hit test in world coordinates.
    pub fn node_at(&self, world_x: f64, world_y: f64) -> Option<&PositionedNode> {
        self.nodes.iter().find(|node| node.contains(world_x, world_y))
    }
}

/// Unique ids per depth, in discovery order. `placed` is shared by both
/// sides so an id lands in exactly one column.
fn collect<'t>(
    nodes: &'t [CallNode],
    side: TraversalSide,
    depth: usize,
    placed: &mut HashSet<&'t str>,
    buckets: &mut BTreeMap<usize, Vec<&'t str>>,
) {
    if depth > LAYOUT_MAX_DEPTH {
        return;
    }
    for node in nodes {
        if placed.insert(node.id.as_str()) {
            buckets.entry(depth).or_default().push(node.id.as_str());
        }
        if !node.is_cyclic_ref {
            collect(node.children(side), side, depth + 1, placed, buckets);
        }
    }
}

fn edges_from<'t>(
    node: &'t CallNode,
    side: TraversalSide,
    depth: usize,
    positioned: &HashSet<&str>,
    seen: &mut HashSet<(&'t str, &'t str)>,
    edges: &mut Vec<PositionedEdge>,
) {
    if depth > LAYOUT_MAX_DEPTH {
        return;
    }
    for child in node.children(side) {
        if positioned.contains(child.id.as_str()) {
            let (from, to) = match side {
                TraversalSide::Callers => (child.id.as_str(), node.id.as_str()),
                TraversalSide::Callees => (node.id.as_str(), child.id.as_str()),
            };
            if seen.insert((from, to)) {
                edges.push(PositionedEdge {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        if !child.is_cyclic_ref {
            edges_from(child, side, depth + 1, positioned, seen, edges);
        }
    }
}

pub fn layout(root: &CallNode) -> GraphLayout {
    let row = NODE_HEIGHT + VERTICAL_GAP;
    let step = NODE_WIDTH + HORIZONTAL_GAP;

    let mut placed: HashSet<&str> = HashSet::new();
    placed.insert(root.id.as_str());
    let mut caller_buckets = BTreeMap::new();
    let mut callee_buckets = BTreeMap::new();
    collect(&root.callers, TraversalSide::Callers, 1, &mut placed, &mut caller_buckets);
    collect(&root.callees, TraversalSide::Callees, 1, &mut placed, &mut callee_buckets);

    let tallest = caller_buckets
        .values()
        .chain(callee_buckets.values())
        .map(|ids| ids.len() as i32)
        .max()
        .unwrap_or(0);
    let total_height = tallest.max(1) * row;

    let mut nodes = vec![PositionedNode {
        id: root.id.clone(),
        x: 0,
        y: total_height / 2 - NODE_HEIGHT / 2,
        column: 0,
    }];
    for (buckets, sign) in [(&caller_buckets, -1), (&callee_buckets, 1)] {
        for (depth, ids) in buckets {
            let column = sign * *depth as i32;
            let level_height = ids.len() as i32 * row - VERTICAL_GAP;
            let mut y = total_height / 2 - level_height / 2;
            for id in ids {
                nodes.push(PositionedNode {
                    id: id.to_string(),
                    x: column * step,
                    y,
                    column,
                });
                y += row;
            }
        }
    }

    let edges = {
        let positioned: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        edges_from(root, TraversalSide::Callers, 1, &positioned, &mut seen, &mut edges);
        edges_from(root, TraversalSide::Callees, 1, &positioned, &mut seen, &mut edges);
        edges
    };

    GraphLayout {
        nodes,
        edges,
        total_height,
    }
}
