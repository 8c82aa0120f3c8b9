//! Named time spans layered over a recording's annotations.
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{RatatError, Result};
use crate::selection::{SelectionSpan, SpanOutcome};
use crate::types::Annotation;

/// Marks shown per page.
pub const PAGE_LENGTH: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub label: String,
    pub start: f64,
    pub end: f64,
}

impl Mark {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Label-unique catalogue of marks with a 1-indexed page cursor.
#[derive(Debug, Clone)]
pub struct MarkCatalogue {
    marks: BTreeMap<String, Mark>,
    current_page: usize,
}

impl Default for MarkCatalogue {
    fn default() -> Self {
        MarkCatalogue { marks: BTreeMap::new(), current_page: 1 }
    }
}

impl MarkCatalogue {
    /// Seeds marks from non-`BAD_` annotations.
    ///
    /// Repeated descriptions get a counter suffix on every occurrence after
    /// the first (`Tone`, `Tone1`, `Tone2`); a generated label that already
    /// exists is skipped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ratat::{Annotation, MarkCatalogue};
    ///
    /// let marks = MarkCatalogue::from_annotations(&[
    ///     Annotation::new(0.0, 1.0, "Tone"),
    ///     Annotation::new(2.0, 1.0, "Tone"),
    ///     Annotation::new(3.0, 1.0, "BAD_"),
    /// ]);
    /// let labels: Vec<_> = marks.ordered().iter().map(|m| m.label.clone()).collect();
    /// assert_eq!(labels, ["Tone", "Tone1"]);
    /// ```
    pub fn from_annotations(annotations: &[Annotation]) -> Self {
        let mut catalogue = MarkCatalogue::default();
        let mut counters: HashMap<&str, usize> = HashMap::new();

        for annotation in annotations.iter().filter(|a| !a.is_bad()) {
            let counter = counters.entry(annotation.description.as_str()).or_insert(0);
            let label = if *counter == 0 {
                annotation.description.clone()
            } else {
                format!("{}{}", annotation.description, counter)
            };
            *counter += 1;

            if catalogue.marks.contains_key(&label) {
                debug!(%label, "generated mark label already exists, skipped");
                continue;
            }
            catalogue.marks.insert(
                label.clone(),
                Mark { label, start: annotation.onset, end: annotation.end() },
            );
        }

        catalogue
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Mark> {
        self.marks.get(label)
    }

    /// Adds a mark over `span`. The label is trimmed first.
    pub fn add(&mut self, label: &str, span: (f64, f64)) -> Result<&Mark> {
        let label = label.trim();
        if label.is_empty() {
            return Err(RatatError::EmptyLabel);
        }
        if span == (0.0, 0.0) {
            return Err(RatatError::EmptySpan);
        }
        if self.marks.contains_key(label) {
            return Err(RatatError::DuplicateLabel(label.to_string()));
        }

        let (start, end) = if span.0 <= span.1 { span } else { (span.1, span.0) };
        let mark = self
            .marks
            .entry(label.to_string())
            .or_insert(Mark { label: label.to_string(), start, end });
        Ok(mark)
    }

    pub fn remove(&mut self, label: &str) -> Result<Mark> {
        let mark = self
            .marks
            .remove(label)
            .ok_or_else(|| RatatError::NotFound(format!("mark {label}")))?;
        self.current_page = self.current_page.min(self.page_count());
        Ok(mark)
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        if new.is_empty() {
            return Err(RatatError::EmptyLabel);
        }
        if !self.marks.contains_key(old) {
            return Err(RatatError::NotFound(format!("mark {old}")));
        }
        if old == new {
            return Ok(());
        }
        if self.marks.contains_key(new) {
            return Err(RatatError::DuplicateLabel(new.to_string()));
        }
        if let Some(mut mark) = self.marks.remove(old) {
            mark.label = new.to_string();
            self.marks.insert(new.to_string(), mark);
        }
        Ok(())
    }

    /// All marks by ascending start, ties by label.
    pub fn ordered(&self) -> Vec<&Mark> {
        let mut marks: Vec<&Mark> = self.marks.values().collect();
        marks.sort_by(|a, b| a.start.total_cmp(&b.start));
        marks
    }

    /// `ceil(len / PAGE_LENGTH)`, at least 1.
    pub fn page_count(&self) -> usize {
        self.marks.len().div_ceil(PAGE_LENGTH).max(1)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Moves the cursor, clamped to `[1, page_count]`, and returns the new page.
    pub fn set_page(&mut self, page: usize) -> usize {
        self.current_page = page.clamp(1, self.page_count());
        self.current_page
    }

    pub fn next_page(&mut self) -> usize {
        self.set_page(self.current_page + 1)
    }

    pub fn prev_page(&mut self) -> usize {
        self.set_page(self.current_page.saturating_sub(1))
    }

    /// Up to [`PAGE_LENGTH`] marks of page `n` (clamped).
    pub fn page(&self, n: usize) -> Vec<&Mark> {
        let n = n.clamp(1, self.page_count());
        self.ordered()
            .into_iter()
            .skip((n - 1) * PAGE_LENGTH)
            .take(PAGE_LENGTH)
            .collect()
    }

    pub fn span(&self, label: &str) -> Result<(f64, f64)> {
        self.marks
            .get(label)
            .map(|m| (m.start, m.end))
            .ok_or_else(|| RatatError::NotFound(format!("mark {label}")))
    }

    /// Makes the mark's span the active selection.
    pub fn select(&self, label: &str, selection: &mut SelectionSpan) -> Result<SpanOutcome> {
        let (start, end) = self.span(label)?;
        Ok(selection.set(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(marks: &[&Mark]) -> Vec<String> {
        marks.iter().map(|m| m.label.clone()).collect()
    }

    #[test]
    fn duplicate_descriptions_get_suffixes() {
        let cat = MarkCatalogue::from_annotations(&[
            Annotation::new(0.0, 1.0, "Tone"),
            Annotation::new(2.0, 1.0, "Tone"),
            Annotation::new(4.0, 1.0, "Tone"),
        ]);
        let ordered = cat.ordered();
        assert_eq!(labels(&ordered), ["Tone", "Tone1", "Tone2"]);
        assert!(ordered.windows(2).all(|w| w[0].start < w[1].start));
        assert_eq!(cat.span("Tone1").unwrap(), (2.0, 3.0));
    }

    #[test]
    fn generated_label_collision_is_skipped() {
        let cat = MarkCatalogue::from_annotations(&[
            Annotation::new(0.0, 1.0, "Tone1"),
            Annotation::new(1.0, 1.0, "Tone"),
            Annotation::new(2.0, 1.0, "Tone"),
        ]);
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.span("Tone1").unwrap(), (0.0, 1.0));
    }

    #[test]
    fn add_validation() {
        let mut cat = MarkCatalogue::default();
        assert!(matches!(cat.add("  ", (1.0, 2.0)), Err(RatatError::EmptyLabel)));
        assert!(matches!(cat.add("a", (0.0, 0.0)), Err(RatatError::EmptySpan)));
        cat.add(" a ", (3.0, 1.0)).unwrap();
        assert_eq!(cat.span("a").unwrap(), (1.0, 3.0));
        assert!(matches!(cat.add("a", (5.0, 6.0)), Err(RatatError::DuplicateLabel(_))));
    }

    #[test]
    fn remove_and_rename() {
        let mut cat = MarkCatalogue::default();
        cat.add("a", (1.0, 2.0)).unwrap();
        cat.add("b", (2.0, 3.0)).unwrap();

        assert!(matches!(cat.rename("a", "b"), Err(RatatError::DuplicateLabel(_))));
        cat.rename("a", "c").unwrap();
        assert_eq!(cat.get("c").unwrap().label, "c");
        assert!(cat.get("a").is_none());

        assert_eq!(cat.remove("c").unwrap().start, 1.0);
        assert!(matches!(cat.remove("c"), Err(RatatError::NotFound(_))));
        assert!(matches!(cat.rename("zz", "q"), Err(RatatError::NotFound(_))));
    }

    #[test]
    fn pagination_clamps() {
        let mut cat = MarkCatalogue::default();
        assert_eq!(cat.page_count(), 1);
        assert!(cat.page(1).is_empty());

        for i in (0..23).rev() {
            cat.add(&format!("m{i}"), (i as f64, i as f64 + 1.0)).unwrap();
        }
        assert_eq!(cat.page_count(), 3);
        assert_eq!(labels(&cat.page(1))[0], "m0");
        assert_eq!(cat.page(2).len(), 10);
        assert_eq!(labels(&cat.page(3)), ["m20", "m21", "m22"]);
        assert_eq!(labels(&cat.page(9)), labels(&cat.page(3)));

        assert_eq!(cat.prev_page(), 1);
        assert_eq!(cat.set_page(7), 3);
        for i in 0..5 {
            cat.remove(&format!("m{i}")).unwrap();
        }
        assert_eq!(cat.current_page(), 2);
    }

    #[test]
    fn select_sets_selection() {
        let mut cat = MarkCatalogue::default();
        cat.add("long", (1.0, 3.0)).unwrap();
        cat.add("short", (5.0, 5.2)).unwrap();
        let mut span = SelectionSpan::default();

        assert_eq!(cat.select("long", &mut span).unwrap(), SpanOutcome::Accepted);
        assert_eq!(span.bounds(), (1.0, 3.0));
        assert!(matches!(cat.select("short", &mut span).unwrap(), SpanOutcome::TooShort { .. }));
        assert!(span.is_empty());
        assert!(cat.select("none", &mut span).is_err());
    }
}
