//! View transform over a computed layout. Every operation returns a new
//! `Viewport`; nothing is re-laid out.

use super::{Bounds, GraphLayout, NODE_WIDTH, PositionedNode};
use serde::{Deserialize, Serialize};

pub const MIN_SCALE: f64 = 0.2;
pub const MAX_SCALE: f64 = 3.0;

const FIT_MARGIN: f64 = 50.0;
const STEP_ZOOM: f64 = 1.2;
const WHEEL_ZOOM_IN: f64 = 1.1;
const WHEEL_ZOOM_OUT: f64 = 0.9;
const ROOT_TOP_OFFSET: f64 = 80.0;

/// Screen = world * scale + offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: FIT_MARGIN,
            offset_y: FIT_MARGIN,
        }
    }
}

fn clamp_scale(scale: f64) -> f64 {
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

impl Viewport {
    /// Scale and translate so `bounds` plus a margin fits a `width` x `height` view.
    pub fn fit(bounds: Bounds, width: f64, height: f64) -> Self {
        let graph_width = f64::from(bounds.width()) + 2.0 * FIT_MARGIN;
        let graph_height = f64::from(bounds.height()) + 2.0 * FIT_MARGIN;
        let scale = clamp_scale((width / graph_width).min(height / graph_height));
        Self {
            scale,
            offset_x: (width - graph_width * scale) / 2.0 - f64::from(bounds.min_x) * scale
                + FIT_MARGIN,
            offset_y: (height - graph_height * scale) / 2.0 - f64::from(bounds.min_y) * scale
                + FIT_MARGIN,
        }
    }

    /// `fit` over the layout's bounds; an empty layout keeps the default view.
    pub fn fit_layout(layout: &GraphLayout, width: f64, height: f64) -> Self {
        layout
            .bounds()
            .map(|bounds| Self::fit(bounds, width, height))
            .unwrap_or_default()
    }

    /// Rescales about the screen point (`x`, `y`), which stays fixed.
    pub fn zoom_about(self, factor: f64, x: f64, y: f64) -> Self {
        let scale = clamp_scale(self.scale * factor);
        let ratio = scale / self.scale;
        Self {
            scale,
            offset_x: x - (x - self.offset_x) * ratio,
            offset_y: y - (y - self.offset_y) * ratio,
        }
    }

    pub fn zoom_in(self, width: f64, height: f64) -> Self {
        self.zoom_about(STEP_ZOOM, width / 2.0, height / 2.0)
    }

    pub fn zoom_out(self, width: f64, height: f64) -> Self {
        self.zoom_about(1.0 / STEP_ZOOM, width / 2.0, height / 2.0)
    }

    /// Negative rotation zooms in, as a wheel scrolled away from the user.
    pub fn wheel(self, rotation: i32, x: f64, y: f64) -> Self {
        let factor = if rotation < 0 {
            WHEEL_ZOOM_IN
        } else {
            WHEEL_ZOOM_OUT
        };
        self.zoom_about(factor, x, y)
    }

    pub fn pan(self, dx: f64, dy: f64) -> Self {
        Self {
            offset_x: self.offset_x + dx,
            offset_y: self.offset_y + dy,
            ..self
        }
    }

    /// Horizontally centers the root node near the top of a view `width` wide.
    pub fn center_on(self, root: &PositionedNode, width: f64) -> Self {
        Self {
            offset_x: width / 2.0 - f64::from(root.x + NODE_WIDTH / 2) * self.scale,
            offset_y: ROOT_TOP_OFFSET,
            ..self
        }
    }

    /// Back to 100% centered on the root.
    pub fn reset(self, root: &PositionedNode, width: f64) -> Self {
        Self {
            scale: 1.0,
            ..self
        }
        .center_on(root, width)
    }

    pub fn to_world(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }

    pub fn to_screen(&self, world_x: f64, world_y: f64) -> (f64, f64) {
        (
            world_x * self.scale + self.offset_x,
            world_y * self.scale + self.offset_y,
        )
    }

    /// Node under the screen point, if any.
    pub fn node_at<'l>(&self, layout: &'l GraphLayout, x: f64, y: f64) -> Option<&'l PositionedNode> {
        let (world_x, world_y) = self.to_world(x, y);
        layout.node_at(world_x, world_y)
    }
}
