//! Content negotiation: map an `Accept` header onto a registered formatter.
//!
//! Route-level formatter overrides are consulted before the global registry,
//! and the configured default media type stands in for an absent header or a
//! `*/*` preference. A client that accepts nothing we can produce gets 406;
//! a request body in a media type we cannot read gets 415.

use std::sync::Arc;

use crate::{
    core::registry::FormatterRegistry,
    errors::ServiceError,
    ports::MediaTypeFormatter,
};

/// One parsed `Accept` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptEntry {
    pub media_type: String,
    pub quality: f32,
}

/// Parse an `Accept` header into entries ordered by descending quality.
/// Entries with `q=0` are excluded; ties keep header order.
pub fn parse_accept(header: &str) -> Vec<AcceptEntry> {
    let mut entries: Vec<AcceptEntry> = header
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let media_type = parts.next()?.trim().to_ascii_lowercase();
            if media_type.is_empty() {
                return None;
            }
            let mut quality = 1.0f32;
            for param in parts {
                let mut kv = param.splitn(2, '=');
                let key = kv.next().map(str::trim).unwrap_or_default();
                if key.eq_ignore_ascii_case("q") {
                    quality = kv
                        .next()
                        .and_then(|v| v.trim().parse::<f32>().ok())
                        .unwrap_or(0.0)
                        .clamp(0.0, 1.0);
                }
            }
            Some(AcceptEntry {
                media_type,
                quality,
            })
        })
        .filter(|entry| entry.quality > 0.0)
        .collect();

    entries.sort_by(|a, b| {
        b.quality
            .partial_cmp(&a.quality)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    entries
}

fn lookup_writable(
    media_type: &str,
    route_formatters: &FormatterRegistry,
    global: &FormatterRegistry,
) -> Option<Arc<dyn MediaTypeFormatter>> {
    route_formatters
        .lookup(media_type)
        .or_else(|| global.lookup(media_type))
        .filter(|f| f.can_write())
}

/// Select the formatter that will write the response body.
///
/// `default_media_type` is the route override if present, else the global
/// configuration value.
pub fn negotiate_writer(
    accept: Option<&str>,
    route_formatters: &FormatterRegistry,
    global: &FormatterRegistry,
    default_media_type: &str,
) -> Result<Arc<dyn MediaTypeFormatter>, ServiceError> {
    let entries = accept.map(parse_accept).unwrap_or_default();

    if entries.is_empty() {
        return lookup_writable(default_media_type, route_formatters, global)
            .ok_or(ServiceError::NotAcceptable);
    }

    for entry in &entries {
        let found = match entry.media_type.as_str() {
            "*/*" | "*" => lookup_writable(default_media_type, route_formatters, global),
            range if range.ends_with("/*") => {
                let prefix = &range[..range.len() - 2];
                if default_media_type.starts_with(&format!("{prefix}/")) {
                    lookup_writable(default_media_type, route_formatters, global)
                } else {
                    route_formatters
                        .lookup_by_range(prefix)
                        .or_else(|| global.lookup_by_range(prefix))
                        .filter(|f| f.can_write())
                }
            }
            exact => lookup_writable(exact, route_formatters, global),
        };
        if let Some(formatter) = found {
            return Ok(formatter);
        }
    }

    Err(ServiceError::NotAcceptable)
}

/// Select the formatter that reads the request body, by `Content-Type`.
pub fn negotiate_reader(
    content_type: Option<&str>,
    route_formatters: &FormatterRegistry,
    global: &FormatterRegistry,
) -> Result<Arc<dyn MediaTypeFormatter>, ServiceError> {
    let media_type = content_type
        .ok_or_else(|| ServiceError::UnsupportedMediaType("<missing content type>".into()))?;
    route_formatters
        .lookup(media_type)
        .or_else(|| global.lookup(media_type))
        .ok_or_else(|| ServiceError::UnsupportedMediaType(media_type.to_string()))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::Value;

    use super::*;
    use crate::ports::MediaTypeFormatter;

    struct Fake {
        types: &'static [&'static str],
        writable: bool,
    }

    impl MediaTypeFormatter for Fake {
        fn media_types(&self) -> &[&'static str] {
            self.types
        }
        fn can_write(&self) -> bool {
            self.writable
        }
        fn read(&self, _: &[u8]) -> Result<Value, ServiceError> {
            Ok(Value::Null)
        }
        fn write(&self, _: &Value) -> Result<Bytes, ServiceError> {
            Ok(Bytes::new())
        }
    }

    fn registry() -> FormatterRegistry {
        let mut registry = FormatterRegistry::new();
        registry.register(Arc::new(Fake {
            types: &["application/json"],
            writable: true,
        }));
        registry.register(Arc::new(Fake {
            types: &["application/xml", "text/xml"],
            writable: true,
        }));
        registry.register(Arc::new(Fake {
            types: &["application/x-www-form-urlencoded"],
            writable: false,
        }));
        registry
    }

    #[test]
    fn test_parse_accept_orders_by_quality() {
        let entries = parse_accept("text/xml;q=0.5, application/json, */*;q=0.1");
        assert_eq!(entries[0].media_type, "application/json");
        assert_eq!(entries[1].media_type, "text/xml");
        assert_eq!(entries[2].media_type, "*/*");
    }

    #[test]
    fn test_zero_quality_excluded() {
        let entries = parse_accept("application/xml;q=0, application/json");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].media_type, "application/json");
    }

    #[test]
    fn test_wildcard_uses_default() {
        let global = registry();
        let formatter = negotiate_writer(
            Some("*/*"),
            &FormatterRegistry::new(),
            &global,
            "application/xml",
        )
        .unwrap();
        assert_eq!(formatter.content_type(), "application/xml");
    }

    #[test]
    fn test_missing_accept_uses_default() {
        let global = registry();
        let formatter =
            negotiate_writer(None, &FormatterRegistry::new(), &global, "application/json")
                .unwrap();
        assert_eq!(formatter.content_type(), "application/json");
    }

    #[test]
    fn test_type_range_matches_registered_subtype() {
        let global = registry();
        let formatter = negotiate_writer(
            Some("text/*"),
            &FormatterRegistry::new(),
            &global,
            "application/json",
        )
        .unwrap();
        assert!(formatter.media_types().contains(&"text/xml"));
    }

    #[test]
    fn test_unwritable_formatter_is_not_negotiable() {
        let global = registry();
        let err = negotiate_writer(
            Some("application/x-www-form-urlencoded"),
            &FormatterRegistry::new(),
            &global,
            "application/x-www-form-urlencoded",
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotAcceptable));
    }

    #[test]
    fn test_reader_unsupported_media_type() {
        let global = registry();
        let err = negotiate_reader(Some("text/csv"), &FormatterRegistry::new(), &global)
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedMediaType(_)));
    }

    #[test]
    fn test_route_override_wins() {
        let global = registry();
        let mut route = FormatterRegistry::new();
        route.register(Arc::new(Fake {
            types: &["application/json"],
            writable: true,
        }));
        // Both registries serve application/json; the route one is consulted
        // first. Distinguish by identity through Arc::ptr_eq.
        let from_route = route.lookup("application/json").unwrap();
        let negotiated = negotiate_writer(
            Some("application/json"),
            &route,
            &global,
            "application/json",
        )
        .unwrap();
        assert!(Arc::ptr_eq(&from_route, &negotiated));
    }
}
