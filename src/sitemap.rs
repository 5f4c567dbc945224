use std::collections::HashSet;

use chrono::NaiveDate;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Absolute page URLs in discovery order, each kept once.
#[derive(Debug, Clone, Default)]
pub struct SitemapSet {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl SitemapSet {
    /// Returns false when the URL was already present.
    pub fn insert(&mut self, url: String) -> bool {
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.urls.push(url);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }
}

/// Serializes the set as a `<urlset>` document. `lastmod` is run provenance
/// and is the only part allowed to differ between runs on the same input.
pub fn render_sitemap(urls: &SitemapSet, lastmod: NaiveDate) -> String {
    let lastmod = lastmod.format("%Y-%m-%d").to_string();
    let mut xml = String::with_capacity(64 + urls.len() * 128);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<urlset xmlns=\"{SITEMAP_NS}\">\n"));
    for url in urls.iter() {
        xml.push_str(&format!(
            "  <url><loc>{}</loc><lastmod>{lastmod}</lastmod><changefreq>daily</changefreq></url>\n",
            xml_escape(url)
        ));
    }
    xml.push_str("</urlset>\n");
    xml
}

/// Pulls every `<loc>` value back out of a sitemap document.
pub fn parse_locs(xml: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<loc>") {
        let after = &rest[start + "<loc>".len()..];
        let Some(end) = after.find("</loc>") else {
            break;
        };
        out.push(xml_unescape(&after[..end]));
        rest = &after[end + "</loc>".len()..];
    }
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
