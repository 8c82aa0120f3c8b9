use tracing::{info, warn};

/// Spans shorter than this are treated as an accidental click.
pub const HARD_FLOOR_SECONDS: f64 = 0.1;

/// Shortest span accepted for analysis.
pub const MIN_ALLOWED_DURATION_SECONDS: f64 = 0.5;

/// Result of [`SelectionSpan::set`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpanOutcome {
    Accepted,
    /// Below the hard floor; silently reset.
    Cancelled,
    /// Above the hard floor but below the minimum; reset with a warning.
    TooShort { duration: f64 },
}

/// The highlighted time window of an analysis session. `(0, 0)` means none.
///
/// # Examples
///
/// ```rust
/// use ratat::{SelectionSpan, SpanOutcome};
///
/// let mut span = SelectionSpan::default();
/// assert_eq!(span.set(10.0, 5.0), SpanOutcome::Accepted);
/// assert_eq!(span.bounds(), (5.0, 10.0));
///
/// assert!(matches!(span.set(5.0, 5.3), SpanOutcome::TooShort { .. }));
/// assert!(span.is_empty());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SelectionSpan {
    xmin: f64,
    xmax: f64,
}

impl SelectionSpan {
    pub fn set(&mut self, xmin: f64, xmax: f64) -> SpanOutcome {
        let (xmin, xmax) = if xmin > xmax { (xmax, xmin) } else { (xmin, xmax) };
        let duration = xmax - xmin;
        info!(duration, "selected duration in seconds");

        if !(duration >= HARD_FLOOR_SECONDS) {
            warn!(duration, "duration is really small, removed");
            self.clear();
            return SpanOutcome::Cancelled;
        }
        if duration < MIN_ALLOWED_DURATION_SECONDS {
            warn!(duration, "selected duration is too small");
            self.clear();
            return SpanOutcome::TooShort { duration };
        }

        self.xmin = xmin;
        self.xmax = xmax;
        SpanOutcome::Accepted
    }

    pub fn clear(&mut self) {
        self.xmin = 0.0;
        self.xmax = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.xmin == 0.0 && self.xmax == 0.0
    }

    /// `(xmin, xmax)`, `(0, 0)` when empty.
    pub fn bounds(&self) -> (f64, f64) {
        (self.xmin, self.xmax)
    }

    pub fn get(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.xmin, self.xmax))
    }
}
