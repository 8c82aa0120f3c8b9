//! Per-process context handed to every flow: settings plus the current
//! notification target.
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

/// Where user-facing messages go.
pub trait Notifier {
    fn notify(&self, level: NoticeLevel, title: &str, message: &str);

    fn success(&self, message: &str) {
        self.notify(NoticeLevel::Success, "Done", message);
    }

    fn warning(&self, message: &str) {
        self.notify(NoticeLevel::Warning, "Warning", message);
    }

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, "Error!", message);
    }
}

/// Sends notices to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, title: &str, message: &str) {
        match level {
            NoticeLevel::Success => info!(title, "{message}"),
            NoticeLevel::Warning => warn!(title, "{message}"),
            NoticeLevel::Error => error!(title, "{message}"),
        }
    }
}

/// Collects notices. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    notices: Rc<RefCell<Vec<Notice>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.borrow().last().cloned()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.notices.borrow().iter().filter(|n| n.level == level).count()
    }

    pub fn clear(&self) {
        self.notices.borrow_mut().clear();
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, level: NoticeLevel, title: &str, message: &str) {
        self.notices.borrow_mut().push(Notice {
            level,
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

/// Settings and notification target shared by the flows of one process.
///
/// ```rust
/// use ratat::session::{MemoryNotifier, NoticeLevel, Session};
/// use ratat::{RatatError, Settings};
///
/// let notices = MemoryNotifier::new();
/// let session = Session::new(Settings::default(), notices.clone());
///
/// let out: Option<()> = session.run("load", || Err(RatatError::NotFound("x".into())));
/// assert!(out.is_none());
/// assert_eq!(notices.count(NoticeLevel::Error), 1);
/// ```
#[derive(Clone)]
pub struct Session {
    settings: Settings,
    notifier: Rc<dyn Notifier>,
}

impl Session {
    pub fn new<N: Notifier + 'static>(settings: Settings, notifier: N) -> Self {
        Session { settings, notifier: Rc::new(notifier) }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn notifier(&self) -> Rc<dyn Notifier> {
        Rc::clone(&self.notifier)
    }

    /// Action boundary. Runs `f`; a failure is logged, raised as a notice
    /// and turned into `None`. Recoverable errors become warnings.
    pub fn run<T, F>(&self, action: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Result<T>,
    {
        match f() {
            Ok(value) => Some(value),
            Err(e) if e.is_recoverable() => {
                warn!(action, error = ?e, "action degraded");
                self.notifier.warning(&e.to_string());
                None
            }
            Err(e) => {
                error!(action, error = ?e, "action failed");
                self.notifier.error(&e.to_string());
                None
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("settings", &self.settings).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RatatError;

    #[test]
    fn run_passes_values_through() {
        let notes = MemoryNotifier::new();
        let session = Session::new(Settings::default(), notes.clone());
        assert_eq!(session.run("add", || Ok(2 + 2)), Some(4));
        assert!(notes.notices().is_empty());
    }

    #[test]
    fn recoverable_error_is_warning() {
        let notes = MemoryNotifier::new();
        let session = Session::new(Settings::default(), notes.clone());
        let out: Option<()> = session.run("tfr", || Err(RatatError::Transform("too short".into())));
        assert!(out.is_none());
        let last = notes.last().unwrap();
        assert_eq!(last.level, NoticeLevel::Warning);
        assert_eq!(last.message, "too short");
    }

    #[test]
    fn failure_is_error_notice() {
        let notes = MemoryNotifier::new();
        let session = Session::new(Settings::default(), notes.clone());
        let _: Option<()> = session.run("mark", || Err(RatatError::EmptyLabel));
        assert_eq!(notes.count(NoticeLevel::Error), 1);
        assert_eq!(notes.last().unwrap().title, "Error!");
    }
}
