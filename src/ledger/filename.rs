/// Content identifier extraction from downloaded file names
use super::ContentId;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Known naming patterns, most specific first. Each captures the id in group 1.
///
/// - `55512_sunset.mp4`            leading id written by the download sink
/// - `clip_123456789.mp4`          trailing `_<id>` before the extension
/// - `ocean_123456789_waves.mov`   `_<id>_` somewhere in the stem
/// - `55512.mp4`                   bare id, written for untitled clips
fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^(\d+)_",
            r"_(\d{8,})$",
            r"_(\d{8,})_",
            r"^(\d+)$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

/// Extracts content ids from file names for one query directory
#[derive(Debug, Clone)]
pub struct FilenameIdExtractor {
    /// Lowercased extensions without the dot
    extensions: Vec<String>,
    /// Known prefixes followed by `_<id>` (usually the clean query)
    prefixes: Vec<String>,
}

impl FilenameIdExtractor {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            prefixes: Vec::new(),
        }
    }

    /// Also recognise `<prefix>_<id>.<ext>` where the id has six or more digits
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Whether the path carries one of the configured video extensions
    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    /// Extract the id from a file name. Names matching no pattern yield `None`.
    pub fn extract(&self, file_name: &str) -> Option<ContentId> {
        let path = Path::new(file_name);
        if !self.is_video(path) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;

        for prefix in &self.prefixes {
            if let Some(rest) = stem.strip_prefix(prefix.as_str()) {
                if let Some(digits) = rest.strip_prefix('_') {
                    if digits.len() >= 6 && digits.chars().all(|c| c.is_ascii_digit()) {
                        return ContentId::parse(digits);
                    }
                }
            }
        }

        patterns()
            .iter()
            .find_map(|re| re.captures(stem))
            .and_then(|caps| caps.get(1))
            .and_then(|m| ContentId::parse(m.as_str()))
    }
}
