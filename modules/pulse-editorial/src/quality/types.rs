use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    StatRepetition,
    SectionEcho,
    StalePrediction,
    UnfalsifiablePrediction,
    EmptyContent,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatRepetition => write!(f, "stat_repetition"),
            Self::SectionEcho => write!(f, "section_echo"),
            Self::StalePrediction => write!(f, "stale_prediction"),
            Self::UnfalsifiablePrediction => write!(f, "unfalsifiable_prediction"),
            Self::EmptyContent => write!(f, "empty_content"),
        }
    }
}

/// Ordered so that sorting puts critical issues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A problem found in generated content. Returned, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub detail: String,
}

impl QualityIssue {
    pub fn critical(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            detail: detail.into(),
        }
    }

    pub fn warning(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind, self.detail)
    }
}
