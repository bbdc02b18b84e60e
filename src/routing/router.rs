//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled upload routes
//! - Classify a request as an upload or a plain proxy request
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - First match wins (ordered by priority)

use axum::http::Method;

use crate::config::UploadRouteConfig;
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPrefixMatcher};

/// How the proxy treats a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    /// Multipart bodies are intercepted; carries the route name.
    Upload(String),
    /// Forwarded untouched.
    Proxy,
}

#[derive(Debug)]
struct CompiledRoute {
    name: String,
    matcher: AndMatcher,
}

/// Compiled, immutable set of upload routes.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    pub fn from_config(mut routes: Vec<UploadRouteConfig>) -> Self {
        // Stable sort keeps config order among equal priorities.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        let routes = routes
            .into_iter()
            .map(|route| CompiledRoute {
                matcher: AndMatcher::new(vec![
                    Box::new(PathPrefixMatcher::new(route.path_prefix)),
                    Box::new(MethodMatcher::uploads()),
                ]),
                name: route.name,
            })
            .collect();

        Self { routes }
    }

    pub fn classify(&self, method: &Method, path: &str) -> RouteKind {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(method, path))
            .map(|route| RouteKind::Upload(route.name.clone()))
            .unwrap_or(RouteKind::Proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, prefix: &str, priority: u32) -> UploadRouteConfig {
        UploadRouteConfig {
            name: name.into(),
            path_prefix: prefix.into(),
            priority,
        }
    }

    #[test]
    fn classifies_by_prefix_and_method() {
        let router = Router::from_config(vec![route("uploads", "/uploads", 0)]);

        assert_eq!(
            router.classify(&Method::POST, "/uploads/1"),
            RouteKind::Upload("uploads".into())
        );
        assert_eq!(router.classify(&Method::GET, "/uploads/1"), RouteKind::Proxy);
        assert_eq!(router.classify(&Method::POST, "/other"), RouteKind::Proxy);
    }

    #[test]
    fn higher_priority_wins() {
        let router = Router::from_config(vec![
            route("broad", "/api", 0),
            route("artifacts", "/api/jobs", 5),
        ]);

        assert_eq!(
            router.classify(&Method::PUT, "/api/jobs/7/artifacts"),
            RouteKind::Upload("artifacts".into())
        );
        assert_eq!(
            router.classify(&Method::PUT, "/api/projects"),
            RouteKind::Upload("broad".into())
        );
    }
}
