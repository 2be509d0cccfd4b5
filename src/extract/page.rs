// src/extract/page.rs
//! Field extraction from arbitrary HTML.
//!
//! Each field walks a fixed priority list (Open Graph, Twitter cards, plain
//! meta, document structure, class-name heuristics) and takes the first
//! non-empty hit.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::ingest::normalize_text;

const TITLE_MAX: usize = 300;
const DESCRIPTION_MAX: usize = 500;
const PARAGRAPH_MIN: usize = 40;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub site_name: Option<String>,
}

fn sel(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn clean(s: &str, max: usize) -> Option<String> {
    let out = normalize_text(s, max);
    (!out.is_empty()).then_some(out)
}

/// First `content` of a `<meta>` matched by `name` or `property`.
fn meta(doc: &Html, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        let css = format!(r#"meta[property="{k}"], meta[name="{k}"], meta[itemprop="{k}"]"#);
        let s = sel(&css)?;
        doc.select(&s)
            .filter_map(|el| el.value().attr("content"))
            .find_map(|c| clean(c, usize::MAX))
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Text of the first element matched by any selector in `css`, in order.
fn first_text(doc: &Html, css: &[&str], min_len: usize, max: usize) -> Option<String> {
    css.iter().find_map(|c| {
        let s = sel(c)?;
        doc.select(&s).find_map(|el| {
            let t = clean(&element_text(el), max)?;
            (t.chars().count() >= min_len).then_some(t)
        })
    })
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

pub fn parse_html(body: &str, base: &Url) -> ParsedPage {
    let doc = Html::parse_document(body);
    ParsedPage {
        title: extract_title(&doc),
        description: extract_description(&doc),
        thumbnail_url: extract_thumbnail(&doc, base),
        author: extract_author(&doc),
        published_at: extract_published(&doc),
        site_name: meta(&doc, &["og:site_name"]),
    }
}

fn extract_title(doc: &Html) -> Option<String> {
    meta(doc, &["og:title", "twitter:title"])
        .map(|t| normalize_text(&t, TITLE_MAX))
        .or_else(|| first_text(doc, &["head > title", "title"], 1, TITLE_MAX))
        .or_else(|| first_text(doc, &["h1"], 1, TITLE_MAX))
        .or_else(|| {
            first_text(
                doc,
                &[
                    r#"[class*="headline"]"#,
                    r#"[class*="title"]"#,
                    r#"[id*="title"]"#,
                ],
                3,
                TITLE_MAX,
            )
        })
}

fn extract_description(doc: &Html) -> Option<String> {
    meta(doc, &["og:description", "twitter:description", "description"])
        .map(|d| normalize_text(&d, DESCRIPTION_MAX))
        .or_else(|| {
            first_text(
                doc,
                &["article p", "main p", r#"[class*="content"] p"#, "p"],
                PARAGRAPH_MIN,
                DESCRIPTION_MAX,
            )
        })
}

fn extract_thumbnail(doc: &Html, base: &Url) -> Option<String> {
    let from_meta = meta(
        doc,
        &[
            "og:image",
            "og:image:url",
            "og:image:secure_url",
            "twitter:image",
            "twitter:image:src",
        ],
    )
    .and_then(|src| resolve(base, &src));
    if from_meta.is_some() {
        return from_meta;
    }

    ["article img", "main img", "img"].iter().find_map(|c| {
        let s = sel(c)?;
        doc.select(&s).find_map(|el| {
            let v = el.value();
            let src = v
                .attr("src")
                .or_else(|| v.attr("data-src"))
                .or_else(|| v.attr("data-lazy-src"))?;
            resolve(base, src)
        })
    })
}

fn strip_byline(s: String) -> String {
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("by ") {
        s[3..].trim().to_string()
    } else {
        s
    }
}

fn extract_author(doc: &Html) -> Option<String> {
    meta(doc, &["author", "article:author", "twitter:creator", "dc.creator"])
        .filter(|a| !a.starts_with("http"))
        .or_else(|| {
            first_text(
                doc,
                &[
                    r#"[rel="author"]"#,
                    r#"[itemprop="author"]"#,
                    r#"[class*="author"]"#,
                    r#"[class*="byline"]"#,
                ],
                2,
                120,
            )
        })
        .map(strip_byline)
        .filter(|a| !a.is_empty())
}

fn extract_published(doc: &Html) -> Option<DateTime<Utc>> {
    if let Some(dt) = meta(
        doc,
        &[
            "article:published_time",
            "datePublished",
            "pubdate",
            "publish-date",
            "date",
            "dc.date",
        ],
    )
    .and_then(|s| parse_datetime(&s))
    {
        return Some(dt);
    }

    if let Some(s) = sel("time[datetime]") {
        if let Some(dt) = doc
            .select(&s)
            .filter_map(|el| el.value().attr("datetime"))
            .find_map(parse_datetime)
        {
            return Some(dt);
        }
    }

    ["time", r#"[class*="date"]"#, r#"[class*="published"]"#]
        .iter()
        .find_map(|c| {
            let s = sel(c)?;
            doc.select(&s)
                .find_map(|el| parse_datetime(&normalize_text(&element_text(el), 80)))
        })
}

/// Lenient date parsing for the formats pages actually use.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%b. %d, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    None
}
