//! Route source seam
//!
//! The route manager owns the routes; the handler only reads the current
//! list and the active route, and is told about changes through `RouteEvent`.

use std::sync::RwLock;

use crate::types::{Route, RouteId};

/// Discrete route change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEvent {
    Added(RouteId),
    Removed(RouteId),
    VisibilityChanged(RouteId),
    Activated(RouteId),
    Deactivated,
}

impl std::fmt::Display for RouteEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added(id) => write!(f, "route {id} added"),
            Self::Removed(id) => write!(f, "route {id} removed"),
            Self::VisibilityChanged(id) => write!(f, "route {id} visibility changed"),
            Self::Activated(id) => write!(f, "route {id} activated"),
            Self::Deactivated => write!(f, "active route deactivated"),
        }
    }
}

/// Read access to the route manager.
pub trait RouteSource: Send + Sync {
    /// All currently known routes, displayed or not.
    fn routes(&self) -> Vec<Route>;

    /// The route being followed, if any.
    fn active_route(&self) -> Option<Route>;
}

/// Route list held in memory; the binary fills it from a JSON file.
#[derive(Debug, Default)]
pub struct InMemoryRoutes {
    routes: RwLock<Vec<Route>>,
    active: RwLock<Option<RouteId>>,
}

impl InMemoryRoutes {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: RwLock::new(routes),
            active: RwLock::new(None),
        }
    }

    /// Insert or replace a route by id. Returns the event to forward.
    pub fn upsert(&self, route: Route) -> RouteEvent {
        let id = route.id;
        let mut routes = self.routes.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = routes.iter_mut().find(|r| r.id == id) {
            *existing = route;
            RouteEvent::VisibilityChanged(id)
        } else {
            routes.push(route);
            RouteEvent::Added(id)
        }
    }

    pub fn remove(&self, id: RouteId) -> Option<RouteEvent> {
        let mut routes = self.routes.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = routes.len();
        routes.retain(|r| r.id != id);
        if routes.len() == before {
            return None;
        }
        drop(routes);

        let mut active = self.active.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *active == Some(id) {
            *active = None;
        }
        Some(RouteEvent::Removed(id))
    }

    pub fn set_visible(&self, id: RouteId, visible: bool) -> Option<RouteEvent> {
        let mut routes = self.routes.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let route = routes.iter_mut().find(|r| r.id == id)?;
        route.visible = visible;
        Some(RouteEvent::VisibilityChanged(id))
    }

    pub fn activate(&self, id: RouteId) -> Option<RouteEvent> {
        let known = self
            .routes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|r| r.id == id);
        if !known {
            return None;
        }
        *self.active.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(id);
        Some(RouteEvent::Activated(id))
    }

    pub fn deactivate(&self) -> RouteEvent {
        *self.active.write().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        RouteEvent::Deactivated
    }
}

impl RouteSource for InMemoryRoutes {
    fn routes(&self) -> Vec<Route> {
        self.routes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn active_route(&self) -> Option<Route> {
        let active = (*self.active.read().unwrap_or_else(std::sync::PoisonError::into_inner))?;
        self.routes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|r| r.id == active)
            .cloned()
    }
}
