//! Notifications emitted by a [`Session`](crate::session::Session) for
//! whatever is presenting it.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
};
use serde::Serialize;
use tracing::info;
use crate::validate::Report;

/// Progress of a sampling or histogram operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Status {
    Generating { requested: usize },
    Progress { done: usize, total: usize, failures: usize },
    Cancelled { discarded: usize },
    Updating,
    Done { stored: usize, failures: usize },
    Cleared,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return match self {
            Self::Generating { requested } => {
                write!(f, "Generating {} samples...", requested)
            },
            Self::Progress { done, total, .. } => {
                write!(f, "Sampling {}/{}...", done, total)
            },
            Self::Cancelled { discarded } => {
                write!(f, "Cancelled, discarded {} samples.", discarded)
            },
            Self::Updating => f.write_str("Updating graph..."),
            Self::Done { failures: 0, .. } => f.write_str("Done."),
            Self::Done { failures, .. } => {
                write!(f, "Done. {} samples failed.", failures)
            },
            Self::Cleared => f.write_str("Cleared"),
        };
    }
}

/// Receives everything a session wants displayed.
pub trait Notify {
    fn validation(&mut self, report: &Report);

    fn status(&mut self, status: &Status);

    /// The density changed and any plotted curve should be redrawn.
    fn curve_changed(&mut self) { }
}

/// Discards all notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Notify for Silent {
    fn validation(&mut self, _report: &Report) { }

    fn status(&mut self, _status: &Status) { }
}

/// Forwards notifications to `tracing` at the info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotify;

impl Notify for LogNotify {
    fn validation(&mut self, report: &Report) {
        info!(ok = report.ok, "{}", report.message);
    }

    fn status(&mut self, status: &Status) {
        info!("{}", status);
    }

    fn curve_changed(&mut self) {
        info!("curve changed");
    }
}

/// A single notification as stored by [`Recorder`].
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Validation(Report),
    Status(Status),
    CurveChanged,
}

/// Keeps every notification in order. Clones share the same log, so one copy
/// can be handed to a session and another kept for inspection.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    events: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<Event> { self.events.borrow().clone() }

    /// Only the status notifications, in order.
    pub fn statuses(&self) -> Vec<Status> {
        return self.events.borrow().iter()
            .filter_map(|ev| {
                match ev {
                    Event::Status(status) => Some(status.clone()),
                    _ => None,
                }
            })
            .collect();
    }

    pub fn clear(&self) { self.events.borrow_mut().clear(); }
}

impl Notify for Recorder {
    fn validation(&mut self, report: &Report) {
        self.events.borrow_mut().push(Event::Validation(report.clone()));
    }

    fn status(&mut self, status: &Status) {
        self.events.borrow_mut().push(Event::Status(status.clone()));
    }

    fn curve_changed(&mut self) {
        self.events.borrow_mut().push(Event::CurveChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines() {
        assert_eq!(Status::Updating.to_string(), "Updating graph...");
        assert_eq!(Status::Done { stored: 10, failures: 0 }.to_string(), "Done.");
        assert_eq!(
            Status::Done { stored: 8, failures: 2 }.to_string(),
            "Done. 2 samples failed.",
        );
        assert_eq!(
            Status::Progress { done: 500, total: 1000, failures: 0 }.to_string(),
            "Sampling 500/1000...",
        );
    }

    #[test]
    fn recorder_clones_share_a_log() {
        let rec = Recorder::new();
        let mut handle = rec.clone();
        handle.status(&Status::Cleared);
        handle.curve_changed();
        assert_eq!(rec.events(), vec![Event::Status(Status::Cleared), Event::CurveChanged]);
        assert_eq!(rec.statuses(), vec![Status::Cleared]);
        rec.clear();
        assert!(handle.events().is_empty());
    }
}
