/// Query name normalisation shared by directories, ignore lists and exports
use regex::Regex;
use std::sync::OnceLock;

const UNKNOWN_QUERY: &str = "unknown_query";

fn special_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static regex"))
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-\s]+").expect("static regex"))
}

/// Turn free-text query into a stable directory/file stem.
///
/// "Dolly Zoom!" -> "dolly_zoom", "city - skyline" -> "city_skyline".
pub fn clean_query(query: &str) -> String {
    let cleaned = slugify(query).to_lowercase();
    if cleaned.is_empty() {
        UNKNOWN_QUERY.to_string()
    } else {
        cleaned
    }
}

/// Same normalisation as [`clean_query`] but keeps case and caps the length,
/// for use inside downloaded file names.
pub fn safe_title(title: &str, max_chars: usize) -> String {
    let slug = slugify(title);
    let truncated: String = slug.chars().take(max_chars).collect();
    truncated.trim_matches('_').to_string()
}

fn slugify(input: &str) -> String {
    let stripped = special_chars().replace_all(input, "");
    let joined = separators().replace_all(&stripped, "_");
    joined.trim_matches('_').to_string()
}

/// Name of the exclusion list file for a query
pub fn ignore_list_file_name(query: &str) -> String {
    format!("{}_ignore_list.json", clean_query(query))
}
