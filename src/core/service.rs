//! Service assembly: route registration and the immutable `RestService`.
//!
//! Everything mutable happens here, once, before traffic: routes are
//! registered, behavior chains merged and checked, formatter registries
//! frozen. The built service holds only shared read-only state (plus the
//! concurrent output cache and throttle stores, which are designed for
//! concurrent access), so `dispatch` never takes a lock.

use std::{future::Future, sync::Arc, time::Duration};

use http::Method;

use crate::{
    adapters::formatters::default_formatters,
    config::{FrameworkConfig, FrameworkConfigValidator, ValidationError},
    core::{
        cache::OutputCache,
        context::MethodArgs,
        registry::{self, FormatterRegistry, RegistryError},
        router::{CachePolicy, RouteBinding, RouteDescriptor, RouteTable, RouterError},
    },
    errors::ServiceError,
    ports::{MediaTypeFormatter, MethodHandler, MethodReturn, ServiceBehavior, handler},
};

/// Errors raised while a service is assembled.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ValidationError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("route {method} {template} has no handler")]
    MissingHandler { method: Method, template: String },
}

/// Fluent registration of one route.
pub struct Route {
    method: Method,
    template: String,
    name: Option<String>,
    handler: Option<MethodHandler>,
    behaviors: Vec<Arc<dyn ServiceBehavior>>,
    timeout: Option<Duration>,
    cache: Option<CachePolicy>,
    formatters: Vec<Arc<dyn MediaTypeFormatter>>,
    default_media_type: Option<String>,
    priority: i32,
}

impl Route {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            name: None,
            handler: None,
            behaviors: Vec::new(),
            timeout: None,
            cache: None,
            formatters: Vec::new(),
            default_media_type: None,
            priority: 0,
        }
    }

    pub fn get(template: impl Into<String>) -> Self {
        Self::new(Method::GET, template)
    }

    pub fn post(template: impl Into<String>) -> Self {
        Self::new(Method::POST, template)
    }

    pub fn put(template: impl Into<String>) -> Self {
        Self::new(Method::PUT, template)
    }

    pub fn delete(template: impl Into<String>) -> Self {
        Self::new(Method::DELETE, template)
    }

    pub fn patch(template: impl Into<String>) -> Self {
        Self::new(Method::PATCH, template)
    }

    /// Service name used in logs and `applies_to` predicates.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a prebuilt handler.
    pub fn handler(mut self, handler: MethodHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach an async closure as the service method.
    pub fn handle<F, Fut>(self, f: F) -> Self
    where
        F: Fn(MethodArgs, tokio_util::sync::CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<MethodReturn, ServiceError>> + Send + 'static,
    {
        self.handler(handler(f))
    }

    /// Append a route-scoped behavior; route behaviors run after globals.
    pub fn behavior(mut self, behavior: Arc<dyn ServiceBehavior>) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Per-route method timeout; `Duration::ZERO` disables the global one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable output caching for this route.
    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// Route-scoped formatter override.
    pub fn formatter(mut self, formatter: Arc<dyn MediaTypeFormatter>) -> Self {
        self.formatters.push(formatter);
        self
    }

    /// Route-scoped fallback media type.
    pub fn default_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.default_media_type = Some(media_type.into());
        self
    }

    /// Disambiguates duplicate templates; higher wins.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Builder for a [`RestService`].
pub struct RestServiceBuilder {
    config: FrameworkConfig,
    global_behaviors: Vec<Arc<dyn ServiceBehavior>>,
    formatters: Vec<Arc<dyn MediaTypeFormatter>>,
    routes: Vec<Route>,
}

impl RestServiceBuilder {
    pub fn new(config: FrameworkConfig) -> Self {
        Self {
            config,
            global_behaviors: Vec::new(),
            formatters: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Register a process-wide behavior, run for every route it applies to.
    pub fn behavior(mut self, behavior: Arc<dyn ServiceBehavior>) -> Self {
        self.global_behaviors.push(behavior);
        self
    }

    /// Register a formatter on top of the defaults (JSON, XML, BSON, form).
    pub fn formatter(mut self, formatter: Arc<dyn MediaTypeFormatter>) -> Self {
        self.formatters.push(formatter);
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Validate everything and freeze the service.
    pub fn build(self) -> Result<RestService, BuildError> {
        FrameworkConfigValidator::validate(&self.config)?;

        // Already validated as parsable above.
        let method_timeout = self
            .config
            .method_timeout
            .as_deref()
            .and_then(|t| humantime::parse_duration(t).ok());
        let cache_duration = humantime::parse_duration(&self.config.cache.duration)
            .unwrap_or_else(|_| Duration::from_secs(30));

        let mut formatters = FormatterRegistry::new();
        for formatter in default_formatters(self.config.json) {
            formatters.register(formatter);
        }
        for formatter in self.formatters {
            formatters.register(formatter);
        }

        let mut bindings = Vec::with_capacity(self.routes.len());
        for route in self.routes {
            let descriptor = Arc::new(match route.name {
                Some(name) => RouteDescriptor::named(route.method.clone(), &route.template, name),
                None => RouteDescriptor::new(route.method.clone(), &route.template),
            });

            let handler = route.handler.ok_or_else(|| BuildError::MissingHandler {
                method: route.method.clone(),
                template: route.template.clone(),
            })?;

            let chain =
                registry::merge_chain(&self.global_behaviors, &route.behaviors, &descriptor);
            registry::validate_single_authentication(&chain, &descriptor)?;

            let mut route_formatters = FormatterRegistry::new();
            for formatter in route.formatters {
                route_formatters.register(formatter);
            }

            tracing::debug!(
                method = %descriptor.method(),
                template = %descriptor.template(),
                behaviors = chain.len(),
                "Registering route"
            );

            bindings.push(RouteBinding {
                descriptor,
                handler,
                chain,
                timeout: route.timeout,
                cache: route.cache,
                formatters: route_formatters,
                default_media_type: route.default_media_type,
                priority: route.priority,
            });
        }

        let routes = RouteTable::build(bindings)?;
        tracing::info!(routes = routes.len(), "Service assembled");

        Ok(RestService {
            routes,
            formatters,
            cache: OutputCache::new(),
            method_timeout,
            cache_duration,
            config: Arc::new(self.config),
        })
    }
}

/// The assembled, immutable service: route table, registries, output cache.
///
/// Cheap to share (`Arc`) across connections and tasks.
pub struct RestService {
    pub(crate) routes: RouteTable,
    pub(crate) formatters: FormatterRegistry,
    pub(crate) cache: OutputCache,
    pub(crate) method_timeout: Option<Duration>,
    pub(crate) cache_duration: Duration,
    config: Arc<FrameworkConfig>,
}

impl std::fmt::Debug for RestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestService")
            .field("routes", &self.routes)
            .field("method_timeout", &self.method_timeout)
            .field("cache_duration", &self.cache_duration)
            .finish()
    }
}

impl RestService {
    pub fn builder(config: FrameworkConfig) -> RestServiceBuilder {
        RestServiceBuilder::new(config)
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}
