//! Route as consumed by the relevance tests

use serde::{Deserialize, Serialize};

use super::Position;

/// Route identifier assigned by the route source
pub type RouteId = u64;

/// A planned route. Only the waypoints and the display flag matter here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    #[serde(default)]
    pub name: String,
    pub waypoints: Vec<Position>,
    /// Whether the route is currently displayed on the chart
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Route {
    pub fn new(id: RouteId, waypoints: Vec<Position>) -> Self {
        Self {
            id,
            name: format!("Route {id}"),
            waypoints,
            visible: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}
