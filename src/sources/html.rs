//! Small HTML scraping helpers shared by the page-based sources

use crate::error::SourceError;
use regex::Regex;
use url::Url;

/// An `<img>` tag's interesting attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ImgTag {
    pub src: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Compile a built-in pattern, reporting failure as a parse error for `url`
pub(crate) fn compile(pattern: &str, url: &str) -> Result<Regex, SourceError> {
    Regex::new(pattern).map_err(|e| SourceError::Parse {
        url: url.to_string(),
        reason: format!("bad pattern: {}", e),
    })
}

/// All `<img>` tags with a `src` (or lazy-load `data-src`) attribute
pub(crate) fn img_tags(html: &str, page_url: &str) -> Result<Vec<ImgTag>, SourceError> {
    let tag_re = compile(r"(?is)<img\b[^>]*>", page_url)?;
    let attr_re = compile(
        r#"(?is)\b(src|data-src|alt|title|width|height)\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        page_url,
    )?;

    let mut tags = Vec::new();
    for tag in tag_re.find_iter(html) {
        let mut src = None;
        let mut lazy_src = None;
        let mut alt = None;
        let mut width = None;
        let mut height = None;

        for caps in attr_re.captures_iter(tag.as_str()) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            match caps[1].to_ascii_lowercase().as_str() {
                "src" => src = Some(value),
                "data-src" => lazy_src = Some(value),
                "alt" => alt = Some(value),
                "title" if alt.is_none() => alt = Some(value),
                "width" => width = value.trim().parse().ok(),
                "height" => height = value.trim().parse().ok(),
                _ => {}
            }
        }

        let src = match (src, lazy_src) {
            (Some(s), _) if !s.is_empty() && !s.starts_with("data:") => s,
            (_, Some(s)) if !s.is_empty() => s,
            _ => continue,
        };
        tags.push(ImgTag {
            src,
            alt: alt.filter(|a| !a.trim().is_empty()),
            width,
            height,
        });
    }
    Ok(tags)
}

/// `href` targets of all `<a>` tags, entity-decoded
pub(crate) fn links(html: &str, page_url: &str) -> Result<Vec<String>, SourceError> {
    let re = compile(
        r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        page_url,
    )?;
    Ok(re
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| decode_entities(m.as_str()))
        .collect())
}

/// Resolve a possibly relative reference against the page it appeared on
///
/// Protocol-relative references (`//host/path`) are upgraded to https.
pub(crate) fn resolve(page_url: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return None;
    }
    if let Some(rest) = reference.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    let base = Url::parse(page_url).ok()?;
    let resolved = base.join(reference).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Decode the handful of entities that show up in attribute values and
/// embedded JSON
pub(crate) fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
