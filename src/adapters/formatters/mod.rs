//! Built-in media-type formatters.

pub mod bson;
pub mod form;
pub mod json;
pub mod xml;

use std::sync::Arc;

pub use bson::BsonFormatter;
pub use form::FormUrlEncodedFormatter;
pub use json::JsonFormatter;
pub use xml::XmlFormatter;

use crate::{config::JsonOptions, ports::MediaTypeFormatter};

/// The formatters every service starts with: JSON, XML, BSON, and the
/// form-urlencoded reader.
pub fn default_formatters(json: JsonOptions) -> Vec<Arc<dyn MediaTypeFormatter>> {
    vec![
        Arc::new(JsonFormatter::new(json)),
        Arc::new(XmlFormatter::new()),
        Arc::new(BsonFormatter::new()),
        Arc::new(FormUrlEncodedFormatter::new()),
    ]
}
