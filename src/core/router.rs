//! Route table: (HTTP method, path template) → service method binding.
//!
//! The table is built once by the service builder and never mutated again;
//! request tasks resolve against it concurrently without locking. Path
//! templates use `matchit` syntax (`/users/{id}`); static segments take
//! precedence over parameters, and an explicit numeric priority decides
//! between duplicate registrations of the same template.

use std::{collections::HashMap, sync::Arc, time::Duration};

use http::Method;
use matchit::Router;

use crate::{
    core::registry::FormatterRegistry,
    ports::{MethodHandler, ServiceBehavior},
};

/// Identity of one route: what `applies_to` predicates and logs see.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    method: Method,
    template: String,
    name: Option<String>,
}

impl RouteDescriptor {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            name: None,
        }
    }

    pub fn named(method: Method, template: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            name: Some(name.into()),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Optional service name used for logging and `applies_to` matching.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Output caching policy for a route.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    /// Entry lifetime; `None` uses the configured default.
    pub duration: Option<Duration>,
}

impl CachePolicy {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
        }
    }
}

/// Everything the pipeline needs to run one route.
pub struct RouteBinding {
    pub(crate) descriptor: Arc<RouteDescriptor>,
    pub(crate) handler: MethodHandler,
    /// Merged behavior chain (globals that apply, then route behaviors),
    /// frozen at build time.
    pub(crate) chain: Vec<Arc<dyn ServiceBehavior>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cache: Option<CachePolicy>,
    pub(crate) formatters: FormatterRegistry,
    pub(crate) default_media_type: Option<String>,
    pub(crate) priority: i32,
}

impl RouteBinding {
    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }
}

/// Route resolution outcome.
pub enum RouteResolution {
    Found {
        binding: Arc<RouteBinding>,
        params: HashMap<String, String>,
    },
    /// The path exists under other HTTP methods.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Errors raised while the route table is assembled.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("duplicate route {method} {template} registered at equal priority")]
    DuplicateRoute { method: Method, template: String },

    #[error("invalid route template '{template}': {message}")]
    InvalidTemplate { template: String, message: String },
}

/// Immutable lookup structure over all registered routes.
pub struct RouteTable {
    routers: HashMap<Method, Router<usize>>,
    bindings: Vec<Arc<RouteBinding>>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.bindings.len())
            .finish()
    }
}

impl RouteTable {
    /// Build the table. Duplicate (method, template) pairs are resolved by
    /// priority. The higher registration wins; equal priorities are an
    /// error.
    pub(crate) fn build(registrations: Vec<RouteBinding>) -> Result<Self, RouterError> {
        let mut chosen: HashMap<(Method, String), RouteBinding> = HashMap::new();

        for binding in registrations {
            let key = (
                binding.descriptor.method().clone(),
                binding.descriptor.template().to_string(),
            );
            match chosen.get(&key) {
                Some(existing) if existing.priority == binding.priority => {
                    return Err(RouterError::DuplicateRoute {
                        method: key.0,
                        template: key.1,
                    });
                }
                Some(existing) if existing.priority > binding.priority => {}
                _ => {
                    chosen.insert(key, binding);
                }
            }
        }

        let mut routers: HashMap<Method, Router<usize>> = HashMap::new();
        let mut bindings = Vec::with_capacity(chosen.len());

        for ((method, template), binding) in chosen {
            let index = bindings.len();
            bindings.push(Arc::new(binding));
            let router = routers.entry(method).or_default();
            router
                .insert(&template, index)
                .map_err(|e| RouterError::InvalidTemplate {
                    template,
                    message: e.to_string(),
                })?;
        }

        Ok(Self { routers, bindings })
    }

    /// Resolve an inbound (method, path) pair.
    pub fn resolve(&self, method: &Method, path: &str) -> RouteResolution {
        if let Some(router) = self.routers.get(method) {
            if let Ok(matched) = router.at(path) {
                let params = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                return RouteResolution::Found {
                    binding: Arc::clone(&self.bindings[*matched.value]),
                    params,
                };
            }
        }

        // Distinguish 405 from 404: does any other method serve this path?
        let mut allowed: Vec<Method> = self
            .routers
            .iter()
            .filter(|(m, router)| *m != method && router.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();

        if allowed.is_empty() {
            RouteResolution::NotFound
        } else {
            allowed.sort_by_key(|m| m.as_str().to_string());
            RouteResolution::MethodNotAllowed(allowed)
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MethodReturn, handler};

    fn binding(method: Method, template: &str, priority: i32) -> RouteBinding {
        RouteBinding {
            descriptor: Arc::new(RouteDescriptor::new(method.clone(), template)),
            handler: handler(|_, _| async { Ok(MethodReturn::None) }),
            chain: Vec::new(),
            timeout: None,
            cache: None,
            formatters: FormatterRegistry::new(),
            default_media_type: None,
            priority,
        }
    }

    #[test]
    fn test_parameterized_match() {
        let table = RouteTable::build(vec![
            binding(Method::GET, "/users/{id}", 0),
            binding(Method::GET, "/users/all", 1),
        ])
        .unwrap();

        match table.resolve(&Method::GET, "/users/42") {
            RouteResolution::Found { params, .. } => {
                assert_eq!(params.get("id").map(String::as_str), Some("42"));
            }
            _ => panic!("expected a match"),
        }

        // The static segment wins over the parameter.
        match table.resolve(&Method::GET, "/users/all") {
            RouteResolution::Found { binding, .. } => {
                assert_eq!(binding.descriptor().template(), "/users/all");
            }
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn test_method_not_allowed_lists_alternatives() {
        let table = RouteTable::build(vec![
            binding(Method::GET, "/users", 0),
            binding(Method::POST, "/users", 0),
        ])
        .unwrap();

        match table.resolve(&Method::DELETE, "/users") {
            RouteResolution::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            _ => panic!("expected 405"),
        }
    }

    #[test]
    fn test_priority_resolves_duplicates() {
        let table = RouteTable::build(vec![
            binding(Method::GET, "/users", 0),
            binding(Method::GET, "/users", 5),
        ])
        .unwrap();
        assert_eq!(table.len(), 1);
        match table.resolve(&Method::GET, "/users") {
            RouteResolution::Found { binding, .. } => assert_eq!(binding.priority, 5),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn test_equal_priority_duplicate_is_an_error() {
        let err = RouteTable::build(vec![
            binding(Method::GET, "/users", 0),
            binding(Method::GET, "/users", 0),
        ])
        .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateRoute { .. }));
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let table = RouteTable::build(vec![binding(Method::GET, "/users", 0)]).unwrap();
        assert!(matches!(
            table.resolve(&Method::GET, "/orders"),
            RouteResolution::NotFound
        ));
    }
}
