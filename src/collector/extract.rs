/// Candidate extraction from search result pages
///
/// Three methods are tried in order and the first that yields anything wins:
/// embedded JSON state, HTML data attributes, then a regex sweep for direct
/// clip URLs.
use super::CandidateItem;
use crate::ledger::ContentId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info};

const CLIP_EXTENSIONS: [&str; 3] = [".mp4", ".mov", ".webm"];

/// Globals a page may assign its search state to, most common first
fn state_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.*?\});",
            r"(?s)window\.INITIAL_STATE\s*=\s*(\{.*?\});",
            r#"(?s)__APOLLO_STATE__["']?\s*:\s*(\{.*?\})"#,
            r"(?s)window\.APOLLO_STATE\s*=\s*(\{.*?\});",
            r#"(?s)"searchResults":\s*(\{.*?\})"#,
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

const SEARCH_PATHS: [&[&str]; 5] = [
    &["search", "results"],
    &["searchResults"],
    &["data", "search", "results"],
    &["assets"],
    &["items"],
];

const URL_FIELDS: [&str; 6] = [
    "video_preview_url",
    "video_preview_url_https",
    "video_small_preview_url",
    "preview_url",
    "comp_url",
    "video_url",
];

const ID_FIELDS: [&str; 4] = ["id", "content_id", "asset_id", "media_id"];

const ELEMENT_SELECTORS: [&str; 5] = [
    "[data-video-preview-url]",
    "[data-comp-url]",
    "[data-asset-type=\"Videos\"]",
    ".js-glyph-video",
    "video",
];

const URL_ATTRIBUTES: [&str; 6] = [
    "data-video-preview-url",
    "data-comp-url",
    "data-preview-url",
    "data-video-url",
    "src",
    "data-src",
];

const ID_ATTRIBUTES: [&str; 4] = ["data-content-id", "data-id", "data-asset-id", "data-media-id"];

/// Extract every candidate on a page
pub fn extract_candidates(html: &str) -> Vec<CandidateItem> {
    let candidates = from_embedded_state(html);
    if !candidates.is_empty() {
        info!("✅ Found {} candidates in embedded JSON state", candidates.len());
        return candidates;
    }

    let candidates = from_data_attributes(html);
    if !candidates.is_empty() {
        info!("✅ Found {} candidates in HTML data attributes", candidates.len());
        return candidates;
    }

    let candidates = from_raw_urls(html);
    if !candidates.is_empty() {
        info!("✅ Found {} candidates with URL pattern matching", candidates.len());
    }
    candidates
}

/// Method 1: JSON blobs assigned to well-known globals
pub fn from_embedded_state(html: &str) -> Vec<CandidateItem> {
    for re in state_patterns() {
        let Some(captures) = re.captures(html) else {
            continue;
        };
        let Some(blob) = captures.get(1) else {
            continue;
        };

        match serde_json::from_str::<Value>(blob.as_str()) {
            Ok(state) => {
                let candidates = from_state_document(&state);
                if !candidates.is_empty() {
                    return candidates;
                }
            }
            Err(e) => debug!("Embedded state did not parse as JSON: {}", e),
        }
    }
    Vec::new()
}

/// Walk the known search paths of a parsed state document
pub fn from_state_document(state: &Value) -> Vec<CandidateItem> {
    for path in SEARCH_PATHS {
        let Some(results) = lookup(state, path) else {
            continue;
        };

        let candidates: Vec<CandidateItem> = match results {
            // keyed by id
            Value::Object(map) => map
                .iter()
                .filter_map(|(key, item)| item.as_object().and_then(|obj| candidate_from_object(obj, Some(key.as_str()))))
                .collect(),
            Value::Array(list) => list
                .iter()
                .filter_map(|item| item.as_object().and_then(|obj| candidate_from_object(obj, None)))
                .collect(),
            _ => Vec::new(),
        };

        if !candidates.is_empty() {
            debug!("Search path {:?} yielded {} candidates", path, candidates.len());
            return dedup(candidates);
        }
    }
    Vec::new()
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn is_video_type(item: &Map<String, Value>) -> bool {
    ["asset_type", "content_type", "media_type"].iter().any(|field| {
        item.get(*field)
            .and_then(Value::as_str)
            .map(|kind| matches!(kind.to_lowercase().as_str(), "video" | "videos" | "motion"))
            .unwrap_or(false)
    })
}

/// Build a candidate from one JSON result entry. Entries that are not videos,
/// carry no clip URL, or have no stable id are dropped.
fn candidate_from_object(item: &Map<String, Value>, key: Option<&str>) -> Option<CandidateItem> {
    if !is_video_type(item) {
        return None;
    }

    let url = URL_FIELDS
        .iter()
        .filter_map(|field| item.get(*field).and_then(Value::as_str))
        .find(|url| is_clip_url(url))?
        .to_string();

    let id = ID_FIELDS
        .iter()
        .filter_map(|field| item.get(*field))
        .find_map(ContentId::from_json)
        .or_else(|| key.and_then(ContentId::parse))
        .or_else(|| id_from_url(&url))?;

    let title = item
        .get("title")
        .or_else(|| item.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Video_{}", id));

    let duration_seconds = ["duration", "video_duration", "duration_seconds"]
        .iter()
        .filter_map(|field| item.get(*field))
        .find_map(number_like);

    let size_bytes = ["file_size", "size_bytes", "filesize"]
        .iter()
        .filter_map(|field| item.get(*field))
        .find_map(number_like)
        .map(|size| size as u64);

    Some(CandidateItem {
        id,
        title,
        duration_seconds,
        size_bytes,
        url,
    })
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_duration_text(s),
        _ => None,
    }
}

/// Accepts plain seconds ("12.5") or clock form ("0:14", "1:02:03")
pub fn parse_duration_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if !text.contains(':') {
        return text.parse::<f64>().ok();
    }

    text.split(':').try_fold(0.0, |total, part| {
        part.trim().parse::<f64>().ok().map(|value| total * 60.0 + value)
    })
}

/// Method 2: elements carrying clip URLs in data attributes
pub fn from_data_attributes(html: &str) -> Vec<CandidateItem> {
    let document = Html::parse_document(html);
    let mut candidates = Vec::new();

    for selector_str in ELEMENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(candidate) = candidate_from_element(&element) {
                candidates.push(candidate);
            }
        }
    }

    dedup(candidates)
}

fn candidate_from_element(element: &ElementRef) -> Option<CandidateItem> {
    let attrs = element.value();

    let url = URL_ATTRIBUTES
        .iter()
        .filter_map(|attr| attrs.attr(attr))
        .find(|url| is_clip_url(url))?
        .to_string();

    let id = ID_ATTRIBUTES
        .iter()
        .filter_map(|attr| attrs.attr(attr))
        .find_map(ContentId::parse)
        .or_else(|| id_from_url(&url))?;

    let text = element.text().collect::<String>();
    let title = attrs
        .attr("data-title")
        .or_else(|| attrs.attr("alt"))
        .or_else(|| attrs.attr("title"))
        .map(str::to_string)
        .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
        .map(|t| t.chars().take(100).collect::<String>())
        .unwrap_or_else(|| format!("Video_{}", id));

    let duration_seconds = attrs.attr("data-duration").and_then(parse_duration_text);
    let size_bytes = attrs
        .attr("data-file-size")
        .and_then(|size| size.trim().parse::<u64>().ok());

    Some(CandidateItem {
        id,
        title,
        duration_seconds,
        size_bytes,
        url,
    })
}

fn raw_url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)data-video-preview-url="([^"]+)""#,
            r#"(?i)data-comp-url="([^"]+)""#,
            r#"(?i)"video_preview_url":\s*"([^"]+)""#,
            r#"(?i)"comp_url":\s*"([^"]+)""#,
            r#"(?i)(https://[^"\s'<>]+\.(?:mp4|mov|webm))"#,
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Method 3: bare clip URLs anywhere in the page. Only URLs that embed a
/// numeric content id are usable since there is nothing else to key on.
pub fn from_raw_urls(html: &str) -> Vec<CandidateItem> {
    let mut candidates = Vec::new();

    for re in raw_url_patterns() {
        for captures in re.captures_iter(html) {
            let Some(url) = captures.get(1).map(|m| m.as_str().replace("\\/", "/")) else {
                continue;
            };
            if !is_clip_url(&url) {
                continue;
            }
            let Some(id) = id_from_url(&url) else {
                debug!("Dropping clip URL without an id: {}", url);
                continue;
            };
            candidates.push(CandidateItem {
                title: format!("Video_{}", id),
                id,
                duration_seconds: None,
                size_bytes: None,
                url,
            });
        }
    }

    dedup(candidates)
}

/// True for URLs whose path ends in a supported clip extension
pub fn is_clip_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    CLIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn url_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[/_\-])(\d{6,})(?:[/_.\-]|$)").expect("static regex"))
}

/// Pull a numeric content id (6+ digits) out of a clip URL
pub fn id_from_url(url: &str) -> Option<ContentId> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    url_id_pattern()
        .captures(path)
        .and_then(|captures| captures.get(1))
        .and_then(|m| ContentId::parse(m.as_str()))
}

fn dedup(candidates: Vec<CandidateItem>) -> Vec<CandidateItem> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.id.clone()))
        .collect()
}
