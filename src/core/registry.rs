//! Formatter and behavior registries.
//!
//! Both are assembled by the service builder and frozen before traffic
//! starts; request tasks only read them. Behavior chains are merged per
//! route at build time (globals that apply, then route-specific behaviors)
//! so dispatch does no per-request merging.

use std::{collections::HashMap, sync::Arc};

use crate::{
    core::router::RouteDescriptor,
    ports::{MediaTypeFormatter, ServiceBehavior},
};

/// Media type → formatter lookup, keyed case-insensitively.
#[derive(Clone, Default)]
pub struct FormatterRegistry {
    by_type: HashMap<String, Arc<dyn MediaTypeFormatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formatter under every media type it declares. Later
    /// registrations override earlier ones for the same type.
    pub fn register(&mut self, formatter: Arc<dyn MediaTypeFormatter>) {
        for media_type in formatter.media_types() {
            self.by_type
                .insert(media_type.to_ascii_lowercase(), Arc::clone(&formatter));
        }
    }

    pub fn lookup(&self, media_type: &str) -> Option<Arc<dyn MediaTypeFormatter>> {
        self.by_type.get(&media_type.to_ascii_lowercase()).cloned()
    }

    /// First registered formatter whose media type falls under `type/*`.
    pub fn lookup_by_range(&self, type_prefix: &str) -> Option<Arc<dyn MediaTypeFormatter>> {
        let prefix = format!("{}/", type_prefix.to_ascii_lowercase());
        let mut types: Vec<&String> = self
            .by_type
            .keys()
            .filter(|mt| mt.starts_with(&prefix))
            .collect();
        types.sort();
        types
            .first()
            .and_then(|mt| self.by_type.get(*mt))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Errors raised while behavior chains are assembled.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Multiple credential-validating behaviors on one method is an error
    /// state: they would issue competing challenges.
    #[error("route {method} {template} has {count} authentication behaviors; at most one is allowed")]
    MultipleAuthenticationBehaviors {
        method: http::Method,
        template: String,
        count: usize,
    },
}

/// Merge the global and route-specific behaviors for one route, in pipeline
/// order: globals that apply to the route first, then route behaviors.
pub(crate) fn merge_chain(
    globals: &[Arc<dyn ServiceBehavior>],
    route_behaviors: &[Arc<dyn ServiceBehavior>],
    route: &RouteDescriptor,
) -> Vec<Arc<dyn ServiceBehavior>> {
    globals
        .iter()
        .filter(|b| b.applies_to(route))
        .chain(route_behaviors.iter())
        .cloned()
        .collect()
}

/// Enforce the single-authentication-behavior invariant for a merged chain.
pub(crate) fn validate_single_authentication(
    chain: &[Arc<dyn ServiceBehavior>],
    route: &RouteDescriptor,
) -> Result<(), RegistryError> {
    let count = chain
        .iter()
        .filter_map(|b| b.as_secure())
        .filter(|s| s.is_authentication())
        .count();
    if count > 1 {
        return Err(RegistryError::MultipleAuthenticationBehaviors {
            method: route.method().clone(),
            template: route.template().to_string(),
            count,
        });
    }
    Ok(())
}

/// Secure behaviors of a chain in authorizing order: authentication first,
/// otherwise stable.
pub(crate) fn authorizing_order(
    chain: &[Arc<dyn ServiceBehavior>],
) -> Vec<Arc<dyn ServiceBehavior>> {
    let mut secure: Vec<Arc<dyn ServiceBehavior>> = chain
        .iter()
        .filter(|b| b.as_secure().is_some())
        .cloned()
        .collect();
    secure.sort_by_key(|b| {
        b.as_secure()
            .map(|s| !s.is_authentication())
            .unwrap_or(true)
    });
    secure
}
