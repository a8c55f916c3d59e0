//! Reader state machine and navigation
//!
//! `Initial --load--> Loading --ok--> Ready(page_count)`,
//! `Loading --err--> Error`, `Ready --close--> Initial`,
//! `Error --load--> Loading`.
//!
//! Both engines own one [`Navigator`]; it is the only place where the
//! current index and page count change.

use serde::Serialize;
use tokio::sync::watch;

use super::types::ReadingProgress;

/// Lifecycle state observed by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ReaderState {
    Initial,
    Loading,
    #[serde(rename_all = "camelCase")]
    Ready {
        page_count: usize,
    },
    Error {
        reason: String,
    },
}

impl ReaderState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReaderState::Ready { .. })
    }
}

/// Current index plus page count, with change notification
#[derive(Debug)]
pub struct Navigator {
    state: watch::Sender<ReaderState>,
    progress: watch::Sender<ReadingProgress>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ReaderState::Initial);
        let (progress, _) = watch::channel(ReadingProgress::default());
        Self { state, progress }
    }

    pub fn state(&self) -> ReaderState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReaderState> {
        self.state.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ReadingProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> ReadingProgress {
        *self.progress.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Zero unless Ready
    pub fn page_count(&self) -> usize {
        if self.is_ready() {
            self.progress.borrow().page_count
        } else {
            0
        }
    }

    pub fn current_page(&self) -> usize {
        if self.is_ready() {
            self.progress.borrow().current_page
        } else {
            0
        }
    }

    pub fn begin_loading(&self) {
        self.reset_progress();
        self.state.send_replace(ReaderState::Loading);
    }

    /// Enter Ready at page 0
    pub fn finish_loading(&self, page_count: usize) {
        self.progress.send_replace(ReadingProgress {
            current_page: 0,
            page_count,
        });
        self.state.send_replace(ReaderState::Ready { page_count });
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.reset_progress();
        self.state.send_replace(ReaderState::Error {
            reason: reason.into(),
        });
    }

    pub fn reset(&self) {
        self.reset_progress();
        self.state.send_replace(ReaderState::Initial);
    }

    fn reset_progress(&self) {
        self.progress.send_if_modified(|p| {
            let changed = *p != ReadingProgress::default();
            *p = ReadingProgress::default();
            changed
        });
    }

    /// Clamp `page` into the document; `None` when not Ready
    pub fn clamp(&self, page: i64) -> Option<usize> {
        let count = self.page_count();
        if count == 0 {
            return None;
        }
        Some(page.clamp(0, count as i64 - 1) as usize)
    }

    /// Target index for a fraction of the document
    pub fn position_target(&self, fraction: f32) -> Option<usize> {
        let count = self.page_count();
        if count == 0 || fraction.is_nan() {
            return None;
        }
        let fraction = fraction.clamp(0.0, 1.0) as f64;
        Some((fraction * (count - 1) as f64).floor() as usize)
    }

    /// Move to the clamped target; true iff the index changed
    pub fn go_to(&self, page: i64) -> bool {
        let Some(target) = self.clamp(page) else {
            return false;
        };
        self.progress.send_if_modified(|p| {
            if p.current_page == target {
                return false;
            }
            p.current_page = target;
            true
        })
    }

    pub fn can_go_next(&self) -> bool {
        let count = self.page_count();
        count > 0 && self.current_page() + 1 < count
    }

    pub fn can_go_previous(&self) -> bool {
        self.page_count() > 0 && self.current_page() > 0
    }

    /// Fraction per navigation unit, `i / (n - 1)`
    pub fn unit_positions(&self) -> Vec<f32> {
        match self.page_count() {
            0 => Vec::new(),
            1 => vec![0.0],
            n => (0..n).map(|i| i as f32 / (n - 1) as f32).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(count: usize) -> Navigator {
        let nav = Navigator::new();
        nav.begin_loading();
        nav.finish_loading(count);
        nav
    }

    #[test]
    fn test_not_ready_is_inert() {
        let nav = Navigator::new();
        assert_eq!(nav.page_count(), 0);
        assert!(!nav.go_to(3));
        assert!(!nav.can_go_next());
        assert!(!nav.can_go_previous());
        assert_eq!(nav.position_target(0.5), None);
    }

    #[test]
    fn test_go_to_clamps_and_reports_change() {
        let nav = ready(10);
        assert!(nav.go_to(999));
        assert_eq!(nav.current_page(), 9);
        assert!(!nav.go_to(999));
        assert!(nav.go_to(-1));
        assert_eq!(nav.current_page(), 0);
        assert!(!nav.go_to(-1));
        for p in 0..10 {
            nav.go_to(p);
            assert_eq!(nav.current_page(), p as usize);
        }
    }

    #[test]
    fn test_boundaries() {
        let nav = ready(3);
        assert!(nav.can_go_next());
        assert!(!nav.can_go_previous());
        nav.go_to(2);
        assert!(!nav.can_go_next());
        assert!(nav.can_go_previous());

        let single = ready(1);
        assert!(!single.can_go_next());
        assert!(!single.can_go_previous());
    }

    #[test]
    fn test_position_target() {
        let nav = ready(10);
        assert_eq!(nav.position_target(0.0), Some(0));
        assert_eq!(nav.position_target(1.0), Some(9));
        assert_eq!(nav.position_target(0.5), Some(4));
        assert_eq!(nav.position_target(7.0), Some(9));
    }

    #[test]
    fn test_state_transitions() {
        let nav = Navigator::new();
        let mut rx = nav.subscribe_state();
        assert_eq!(*rx.borrow_and_update(), ReaderState::Initial);
        nav.begin_loading();
        assert_eq!(nav.state(), ReaderState::Loading);
        nav.fail("missing");
        assert_eq!(
            nav.state(),
            ReaderState::Error {
                reason: "missing".into()
            }
        );
        assert_eq!(nav.page_count(), 0);
        nav.begin_loading();
        nav.finish_loading(4);
        assert!(rx.has_changed().unwrap());
        assert_eq!(nav.state(), ReaderState::Ready { page_count: 4 });
        nav.reset();
        assert_eq!(nav.state(), ReaderState::Initial);
        assert_eq!(nav.page_count(), 0);
    }

    #[test]
    fn test_progress_notifies_only_on_change() {
        let nav = ready(5);
        let mut rx = nav.subscribe_progress();
        rx.borrow_and_update();
        nav.go_to(0);
        assert!(!rx.has_changed().unwrap());
        nav.go_to(3);
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            ReadingProgress {
                current_page: 3,
                page_count: 5
            }
        );
    }

    #[test]
    fn test_unit_positions() {
        assert_eq!(ready(1).unit_positions(), vec![0.0]);
        assert_eq!(ready(3).unit_positions(), vec![0.0, 0.5, 1.0]);
        assert!(Navigator::new().unit_positions().is_empty());
    }
}
