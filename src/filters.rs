/// Per-candidate filters applied before the ledger check
use crate::collector::CandidateItem;
use crate::config::FilterConfig;
use std::fmt;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Why a candidate was turned away
#[derive(Debug, Clone, PartialEq)]
pub enum FilterRejection {
    TooLong { duration: f64, max: f64 },
    TooShort { duration: f64, min: f64 },
    TooLarge { size_mb: f64, max: f64 },
    ExcludedTitle(String),
}

impl fmt::Display for FilterRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong { duration, max } => write!(f, "duration {:.1}s exceeds {:.1}s", duration, max),
            Self::TooShort { duration, min } => write!(f, "duration {:.1}s below {:.1}s", duration, min),
            Self::TooLarge { size_mb, max } => write!(f, "size {:.1}MB exceeds {:.1}MB", size_mb, max),
            Self::ExcludedTitle(pattern) => write!(f, "title matches excluded pattern '{}'", pattern),
        }
    }
}

/// Duration, size and title rules. Unknown duration or size never rejects.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    max_duration: Option<f64>,
    min_duration: Option<f64>,
    max_size_mb: Option<f64>,
    excluded_patterns: Vec<String>,
}

impl CandidateFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            max_duration: config.max_duration_seconds,
            min_duration: config.min_duration_seconds,
            max_size_mb: config.max_size_mb,
            excluded_patterns: config
                .exclude_title_patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// True when no rule is configured
    pub fn is_empty(&self) -> bool {
        self.max_duration.is_none()
            && self.min_duration.is_none()
            && self.max_size_mb.is_none()
            && self.excluded_patterns.is_empty()
    }

    pub fn check(&self, item: &CandidateItem) -> Result<(), FilterRejection> {
        if let Some(duration) = item.duration_seconds {
            if let Some(max) = self.max_duration {
                if duration > max {
                    return Err(FilterRejection::TooLong { duration, max });
                }
            }
            if let Some(min) = self.min_duration {
                if duration < min {
                    return Err(FilterRejection::TooShort { duration, min });
                }
            }
        }

        if let (Some(size), Some(max)) = (item.size_bytes, self.max_size_mb) {
            let size_mb = size as f64 / BYTES_PER_MB;
            if size_mb > max {
                return Err(FilterRejection::TooLarge { size_mb, max });
            }
        }

        let title = item.title.to_lowercase();
        if let Some(pattern) = self.excluded_patterns.iter().find(|p| title.contains(p.as_str())) {
            return Err(FilterRejection::ExcludedTitle(pattern.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ContentId;

    fn item(title: &str, duration: Option<f64>, size: Option<u64>) -> CandidateItem {
        CandidateItem {
            id: ContentId::parse("123456").unwrap(),
            title: title.to_string(),
            duration_seconds: duration,
            size_bytes: size,
            url: "https://x/123456.mp4".to_string(),
        }
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let filter = CandidateFilter::default();
        assert!(filter.is_empty());
        assert!(filter.check(&item("anything", Some(9999.0), Some(u64::MAX))).is_ok());
    }

    #[test]
    fn test_duration_bounds() {
        let filter = CandidateFilter::new(&FilterConfig {
            max_duration_seconds: Some(30.0),
            min_duration_seconds: Some(5.0),
            ..Default::default()
        });

        assert!(filter.check(&item("ok", Some(10.0), None)).is_ok());
        assert!(matches!(
            filter.check(&item("long", Some(31.0), None)),
            Err(FilterRejection::TooLong { .. })
        ));
        assert!(matches!(
            filter.check(&item("short", Some(2.0), None)),
            Err(FilterRejection::TooShort { .. })
        ));
        // unknown duration passes
        assert!(filter.check(&item("unknown", None, None)).is_ok());
    }

    #[test]
    fn test_size_limit() {
        let filter = CandidateFilter::new(&FilterConfig {
            max_size_mb: Some(10.0),
            ..Default::default()
        });
        assert!(filter.check(&item("small", None, Some(5 * 1024 * 1024))).is_ok());
        assert!(matches!(
            filter.check(&item("big", None, Some(11 * 1024 * 1024))),
            Err(FilterRejection::TooLarge { .. })
        ));
        assert!(filter.check(&item("unknown", None, None)).is_ok());
    }

    #[test]
    fn test_title_patterns_case_insensitive() {
        let filter = CandidateFilter::new(&FilterConfig {
            exclude_title_patterns: vec!["Watermark".to_string(), "  ".to_string()],
            ..Default::default()
        });
        assert_eq!(
            filter.check(&item("Ocean WATERMARK sample", None, None)),
            Err(FilterRejection::ExcludedTitle("watermark".to_string()))
        );
        assert!(filter.check(&item("Ocean waves", None, None)).is_ok());
    }
}
