//! Syndication feed results: a minimal Atom 1.0 / RSS 2.0 document model.

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

/// Output flavor for a feed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Atom,
    Rss,
}

impl FeedFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            FeedFormat::Atom => "application/atom+xml; charset=utf-8",
            FeedFormat::Rss => "application/rss+xml; charset=utf-8",
        }
    }
}

/// One feed entry / RSS item.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub updated: DateTime<Utc>,
}

/// A feed document.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: String,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub updated: DateTime<Utc>,
    pub entries: Vec<FeedEntry>,
}

impl Feed {
    pub fn new(id: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
            description: None,
            updated: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn entry(mut self, entry: FeedEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn render(&self, format: FeedFormat) -> String {
        match format {
            FeedFormat::Atom => self.render_atom(),
            FeedFormat::Rss => self.render_rss(),
        }
    }

    fn render_atom(&self) -> String {
        let mut out = String::with_capacity(256 + self.entries.len() * 256);
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<feed xmlns=\"http://www.w3.org/2005/Atom\">\n");
        tag(&mut out, "id", &self.id);
        tag(&mut out, "title", &self.title);
        tag(&mut out, "updated", &self.updated.to_rfc3339());
        out.push_str(&format!("<link href=\"{}\"/>\n", escape(&self.link)));
        if let Some(description) = &self.description {
            tag(&mut out, "subtitle", description);
        }
        for entry in &self.entries {
            out.push_str("<entry>\n");
            tag(&mut out, "id", &entry.id);
            tag(&mut out, "title", &entry.title);
            tag(&mut out, "updated", &entry.updated.to_rfc3339());
            out.push_str(&format!("<link href=\"{}\"/>\n", escape(&entry.link)));
            if let Some(summary) = &entry.summary {
                tag(&mut out, "summary", summary);
            }
            out.push_str("</entry>\n");
        }
        out.push_str("</feed>\n");
        out
    }

    fn render_rss(&self) -> String {
        let mut out = String::with_capacity(256 + self.entries.len() * 256);
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<rss version=\"2.0\">\n<channel>\n");
        tag(&mut out, "title", &self.title);
        tag(&mut out, "link", &self.link);
        tag(
            &mut out,
            "description",
            self.description.as_deref().unwrap_or(&self.title),
        );
        tag(&mut out, "lastBuildDate", &self.updated.to_rfc2822());
        for entry in &self.entries {
            out.push_str("<item>\n");
            out.push_str(&format!(
                "<guid isPermaLink=\"false\">{}</guid>\n",
                escape(&entry.id)
            ));
            tag(&mut out, "title", &entry.title);
            tag(&mut out, "link", &entry.link);
            if let Some(summary) = &entry.summary {
                tag(&mut out, "description", summary);
            }
            tag(&mut out, "pubDate", &entry.updated.to_rfc2822());
            out.push_str("</item>\n");
        }
        out.push_str("</channel>\n</rss>\n");
        out
    }
}

fn tag(out: &mut String, name: &str, text: &str) {
    out.push('<');
    out.push_str(name);
    out.push('>');
    out.push_str(&escape(text));
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
}
