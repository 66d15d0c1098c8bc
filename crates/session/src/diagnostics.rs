//! Backend-reported annotations: issues, semantic highlighting and
//! identifier occurrences.
//!
//! Every update replaces the previous set wholesale. Ranges are mapped
//! through local edits so they stay attached to the text they describe until
//! the backend catches up.

use modelsync_protocol::{HighlightRange, Issue, Severity, TextRange};
use serde::Serialize;

use crate::document::ChangeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounts {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl DiagnosticCounts {
    fn of(issues: &[Issue]) -> Self {
        issues
            .iter()
            .fold(Self::default(), |mut counts, issue| {
                match issue.severity {
                    Severity::Error => counts.errors += 1,
                    Severity::Warning => counts.warnings += 1,
                    Severity::Info => counts.infos += 1,
                }
                counts
            })
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.errors,
            Severity::Warning => self.warnings,
            Severity::Info => self.infos,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsTracker {
    issues: Vec<Issue>,
    issues_version: u64,
    counts: DiagnosticCounts,
    highlights: Vec<HighlightRange>,
    type_hashes: Vec<String>,
    highlights_version: u64,
    write_occurrences: Vec<TextRange>,
    read_occurrences: Vec<TextRange>,
}

impl DiagnosticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all issues. `version` is the document version they arrived at.
    pub fn replace_issues(&mut self, issues: Vec<Issue>, version: u64) {
        self.counts = DiagnosticCounts::of(&issues);
        self.issues = issues;
        self.issues_version = version;
    }

    /// Replace highlight ranges and their type hashes together.
    pub fn replace_highlighting(
        &mut self,
        ranges: Vec<HighlightRange>,
        type_hashes: Vec<String>,
        version: u64,
    ) {
        self.highlights = ranges;
        self.type_hashes = type_hashes;
        self.highlights_version = version;
    }

    pub fn replace_occurrences(&mut self, write: Vec<TextRange>, read: Vec<TextRange>) {
        self.write_occurrences = write;
        self.read_occurrences = read;
    }

    /// Keep every range anchored across a local edit. Highlights that
    /// collapse to nothing are dropped; issues are kept as point markers.
    pub fn map_through(&mut self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        for issue in &mut self.issues {
            issue.range = changes.map_range(issue.range);
        }
        self.highlights.retain_mut(|highlight| {
            highlight.range = changes.map_range(highlight.range);
            !highlight.range.is_empty()
        });
        for range in self
            .write_occurrences
            .iter_mut()
            .chain(self.read_occurrences.iter_mut())
        {
            *range = changes.map_range(*range);
        }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn issues_version(&self) -> u64 {
        self.issues_version
    }

    pub fn counts(&self) -> DiagnosticCounts {
        self.counts
    }

    pub fn highlights(&self) -> &[HighlightRange] {
        &self.highlights
    }

    pub fn type_hashes(&self) -> &[String] {
        &self.type_hashes
    }

    pub fn highlights_version(&self) -> u64 {
        self.highlights_version
    }

    pub fn write_occurrences(&self) -> &[TextRange] {
        &self.write_occurrences
    }

    pub fn read_occurrences(&self) -> &[TextRange] {
        &self.read_occurrences
    }

    /// First issue starting strictly after `pos`, wrapping to the first issue
    /// in the document.
    pub fn next_issue_after(&self, pos: usize) -> Option<&Issue> {
        let first = self.issues.iter().min_by_key(|issue| issue.range.from)?;
        self.issues
            .iter()
            .filter(|issue| issue.range.from > pos)
            .min_by_key(|issue| issue.range.from)
            .or(Some(first))
    }
}

#[cfg(test)]
mod tests {
    use modelsync_protocol::TextEdit;

    use super::*;
    use crate::document::{DocumentState, TransactionSpec};

    fn issue(severity: Severity, from: usize, to: usize) -> Issue {
        Issue {
            description: format!("{severity:?} at {from}"),
            severity,
            range: TextRange::new(from, to),
        }
    }

    #[test]
    fn counts_are_recomputed_not_accumulated() {
        let mut tracker = DiagnosticsTracker::new();
        tracker.replace_issues(
            vec![
                issue(Severity::Error, 0, 1),
                issue(Severity::Error, 2, 3),
                issue(Severity::Warning, 4, 5),
            ],
            1,
        );
        assert_eq!(
            tracker.counts(),
            DiagnosticCounts {
                errors: 2,
                warnings: 1,
                infos: 0
            }
        );

        tracker.replace_issues(vec![issue(Severity::Info, 0, 1)], 2);
        assert_eq!(tracker.counts().get(Severity::Error), 0);
        assert_eq!(tracker.counts().get(Severity::Info), 1);
        assert_eq!(tracker.issues_version(), 2);
    }

    #[test]
    fn highlighting_and_hashes_replace_together() {
        let mut tracker = DiagnosticsTracker::new();
        tracker.replace_highlighting(
            vec![HighlightRange {
                range: TextRange::new(0, 3),
                classes: vec!["class".into()],
            }],
            vec!["ff0000".into()],
            4,
        );
        tracker.replace_highlighting(Vec::new(), vec!["00ff00".into()], 5);
        assert!(tracker.highlights().is_empty());
        assert_eq!(tracker.type_hashes(), ["00ff00".to_string()]);
        assert_eq!(tracker.highlights_version(), 5);
    }

    #[test]
    fn ranges_follow_local_edits() {
        let mut tracker = DiagnosticsTracker::new();
        tracker.replace_issues(vec![issue(Severity::Error, 4, 6)], 0);
        tracker.replace_highlighting(
            vec![HighlightRange {
                range: TextRange::new(0, 2),
                classes: Vec::new(),
            }],
            Vec::new(),
            0,
        );
        tracker.replace_occurrences(vec![TextRange::new(4, 6)], Vec::new());

        let doc = DocumentState::new("ab cd ef");
        let (_, changes) = doc
            .apply(&TransactionSpec::edit(TextEdit::delete(0, 3)))
            .unwrap();
        tracker.map_through(&changes);

        assert_eq!(tracker.issues()[0].range, TextRange::new(1, 3));
        assert!(tracker.highlights().is_empty());
        assert_eq!(tracker.write_occurrences()[0], TextRange::new(1, 3));
    }

    #[test]
    fn next_issue_wraps_around() {
        let mut tracker = DiagnosticsTracker::new();
        assert!(tracker.next_issue_after(0).is_none());

        tracker.replace_issues(
            vec![issue(Severity::Warning, 10, 12), issue(Severity::Error, 2, 3)],
            0,
        );
        assert_eq!(tracker.next_issue_after(0).unwrap().range.from, 2);
        assert_eq!(tracker.next_issue_after(2).unwrap().range.from, 10);
        assert_eq!(tracker.next_issue_after(10).unwrap().range.from, 2);
    }
}
