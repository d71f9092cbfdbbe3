//! Debounced autosave for the admin editors.
//!
//! A local buffer takes every edit immediately; a debounce timer delays the
//! write to the remote store until the user pauses. [`Reconciler`] is the pure
//! state machine deciding when to write and how to fold remote changes back
//! in. [`session`] drives it with tokio timers and the store's change feed.
//!
//! Concurrent edits of one entity from two admin sessions are last-write-wins:
//! a diverging remote value is reported as a conflict, never merged.

use serde::Serialize;

use crate::store::Record;

pub mod session;

pub use session::{EditorError, EditorSlot};

/// A record that can be edited through the autosave loop.
pub trait Editable: Record + std::fmt::Debug {
    /// Equality over the user-editable fields, ignoring store-managed columns.
    fn same_content(&self, other: &Self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorState {
    Unselected,
    Clean,
    DirtyPending,
    Writing,
    WriteFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// User-facing toast message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub entity: Option<String>,
}

impl Notice {
    pub fn error(entity: &str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            entity: Some(entity.to_string()),
        }
    }

    pub fn warning(entity: &str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            entity: Some(entity.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action<T> {
    RestartTimer,
    CancelTimer,
    Write(T),
    Notify(Notice),
}

#[derive(Debug, Clone, Serialize)]
pub struct EditorSnapshot<T> {
    pub state: EditorState,
    pub buffer: Option<T>,
    pub remote: Option<T>,
    pub conflict: Option<T>,
    pub last_error: Option<String>,
    pub writes_issued: u64,
}

pub struct Reconciler<T> {
    state: EditorState,
    entity: String,
    buffer: Option<T>,
    // Last-known remote value, the baseline for dirty checks
    remote: Option<T>,
    in_flight: Option<T>,
    // Remote value that diverged while local edits were unsaved
    conflict: Option<T>,
    timer_armed: bool,
    last_error: Option<String>,
    writes_issued: u64,
}

impl<T: Editable> Default for Reconciler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Editable> Reconciler<T> {
    pub fn new() -> Self {
        Self {
            state: EditorState::Unselected,
            entity: String::new(),
            buffer: None,
            remote: None,
            in_flight: None,
            conflict: None,
            timer_armed: false,
            last_error: None,
            writes_issued: 0,
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn buffer(&self) -> Option<&T> {
        self.buffer.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        match (&self.buffer, &self.remote) {
            (Some(buffer), Some(remote)) => !buffer.same_content(remote),
            _ => false,
        }
    }

    pub fn snapshot(&self) -> EditorSnapshot<T> {
        EditorSnapshot {
            state: self.state,
            buffer: self.buffer.clone(),
            remote: self.remote.clone(),
            conflict: self.conflict.clone(),
            last_error: self.last_error.clone(),
            writes_issued: self.writes_issued,
        }
    }

    /// Starts editing `remote`. The buffer is an independent deep copy from here on.
    pub fn select(&mut self, remote: T) -> Vec<Action<T>> {
        *self = Self::new();
        self.entity = format!("{}/{}", T::KIND, remote.id());
        self.buffer = Some(remote.clone());
        self.remote = Some(remote);
        self.state = EditorState::Clean;
        vec![Action::CancelTimer]
    }

    pub fn deselect(&mut self) -> Vec<Action<T>> {
        *self = Self::new();
        vec![Action::CancelTimer]
    }

    /// Applies `f` to the buffer. A failing edit leaves the buffer untouched.
    pub fn edit<E>(
        &mut self,
        f: impl FnOnce(&mut T) -> Result<(), E>,
    ) -> Result<Vec<Action<T>>, E> {
        let Some(buffer) = self.buffer.as_ref() else {
            return Ok(Vec::new());
        };
        let mut edited = buffer.clone();
        f(&mut edited)?;
        self.buffer = Some(edited);

        if self.state != EditorState::Writing {
            self.state = EditorState::DirtyPending;
        }
        self.timer_armed = true;
        Ok(vec![Action::RestartTimer])
    }

    pub fn timer_elapsed(&mut self) -> Vec<Action<T>> {
        self.timer_armed = false;
        match self.state {
            EditorState::DirtyPending | EditorState::WriteFailed => self.flush(),
            // The write completion picks up edits made meanwhile
            _ => Vec::new(),
        }
    }

    /// Manual retry after a failed write.
    pub fn retry(&mut self) -> Vec<Action<T>> {
        match self.state {
            EditorState::DirtyPending | EditorState::WriteFailed => {
                self.timer_armed = false;
                let mut actions = vec![Action::CancelTimer];
                actions.extend(self.flush());
                actions
            }
            _ => Vec::new(),
        }
    }

    // Writes the buffer unless it already matches the remote value
    fn flush(&mut self) -> Vec<Action<T>> {
        let (Some(buffer), Some(remote)) = (&self.buffer, &self.remote) else {
            return Vec::new();
        };
        if buffer.same_content(remote) {
            self.state = EditorState::Clean;
            return Vec::new();
        }
        let value = buffer.clone();
        self.in_flight = Some(value.clone());
        self.state = EditorState::Writing;
        self.writes_issued += 1;
        vec![Action::Write(value)]
    }

    pub fn write_succeeded(&mut self) -> Vec<Action<T>> {
        if self.state != EditorState::Writing {
            return Vec::new();
        }
        self.remote = self.in_flight.take();
        self.last_error = None;
        self.conflict = None;

        if !self.is_dirty() {
            self.state = EditorState::Clean;
            return Vec::new();
        }
        // Edited while the write was in flight
        self.state = EditorState::DirtyPending;
        if self.timer_armed {
            Vec::new()
        } else {
            self.flush()
        }
    }

    pub fn write_failed(&mut self, message: &str) -> Vec<Action<T>> {
        if self.state != EditorState::Writing {
            return Vec::new();
        }
        self.in_flight = None;
        self.state = EditorState::WriteFailed;
        self.last_error = Some(message.to_string());
        vec![Action::Notify(Notice::error(
            &self.entity,
            format!("Could not save changes: {}. Your edits are kept.", message),
        ))]
    }

    /// Folds a freshly fetched remote value into the editor.
    pub fn remote_changed(&mut self, incoming: T) -> Vec<Action<T>> {
        match self.state {
            EditorState::Unselected => Vec::new(),
            EditorState::Clean => {
                self.buffer = Some(incoming.clone());
                self.remote = Some(incoming);
                Vec::new()
            }
            EditorState::Writing => {
                let own_echo = self.in_flight.as_ref().is_some_and(|v| v.same_content(&incoming));
                let unchanged = self.remote.as_ref().is_some_and(|v| v.same_content(&incoming));
                if own_echo || unchanged {
                    Vec::new()
                } else {
                    self.hold_conflict(incoming)
                }
            }
            EditorState::DirtyPending | EditorState::WriteFailed => {
                if self.buffer.as_ref().is_some_and(|b| b.same_content(&incoming)) {
                    // Remote caught up with the buffer, nothing left to write
                    self.remote = Some(incoming);
                    self.conflict = None;
                    self.state = EditorState::Clean;
                    self.timer_armed = false;
                    return vec![Action::CancelTimer];
                }
                if self.remote.as_ref().is_some_and(|r| r.same_content(&incoming)) {
                    return Vec::new();
                }
                self.remote = Some(incoming.clone());
                self.hold_conflict(incoming)
            }
        }
    }

    fn hold_conflict(&mut self, incoming: T) -> Vec<Action<T>> {
        let repeated = self.conflict.as_ref().is_some_and(|c| c.same_content(&incoming));
        self.conflict = Some(incoming);
        if repeated {
            return Vec::new();
        }
        vec![Action::Notify(Notice::warning(
            &self.entity,
            "This item was changed elsewhere. \
             Saving will overwrite those changes; discard to load them.",
        ))]
    }

    pub fn remote_deleted(&mut self) -> Vec<Action<T>> {
        let entity = std::mem::take(&mut self.entity);
        let mut actions = self.deselect();
        actions.push(Action::Notify(Notice::warning(
            &entity,
            "This item was deleted elsewhere and closed in the editor.",
        )));
        actions
    }

    /// Drops unsaved edits and adopts the newest known remote value.
    pub fn discard(&mut self) -> Vec<Action<T>> {
        if matches!(self.state, EditorState::Unselected | EditorState::Writing) {
            return Vec::new();
        }
        let adopted = self.conflict.take().or_else(|| self.remote.clone());
        self.buffer = adopted.clone();
        self.remote = adopted;
        self.state = EditorState::Clean;
        self.timer_armed = false;
        self.last_error = None;
        vec![Action::CancelTimer]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Section;
    use serde_json::json;

    fn section(title: &str) -> Section {
        serde_json::from_value(json!({
            "id": "s1",
            "section_type": "hero",
            "title": title,
            "visible": true,
            "sort_order": 1,
            "content": { "heading": "Drive" }
        }))
        .unwrap()
    }

    fn retitle(title: &str) -> impl FnOnce(&mut Section) -> Result<(), String> + '_ {
        move |s: &mut Section| {
            s.title = title.to_string();
            Ok(())
        }
    }

    fn writes(actions: &[Action<Section>]) -> Vec<&Section> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Write(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    fn notices(actions: &[Action<Section>]) -> usize {
        actions.iter().filter(|a| matches!(a, Action::Notify(_))).count()
    }

    fn selected() -> Reconciler<Section> {
        let mut r = Reconciler::new();
        r.select(section("Welcome"));
        r
    }

    #[test]
    fn select_copies_remote_into_clean_buffer() {
        let r = selected();
        assert_eq!(r.state(), EditorState::Clean);
        assert_eq!(r.buffer().unwrap().title, "Welcome");
        assert!(!r.is_dirty());
    }

    #[test]
    fn edits_restart_timer_and_only_last_value_is_written() {
        let mut r = selected();
        for title in ["W", "We", "Wel", "Welc"] {
            let actions = r.edit(retitle(title)).unwrap();
            assert_eq!(actions, vec![Action::RestartTimer]);
            assert_eq!(r.state(), EditorState::DirtyPending);
        }

        let actions = r.timer_elapsed();
        let written = writes(&actions);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].title, "Welc");
        assert_eq!(r.state(), EditorState::Writing);

        assert!(r.write_succeeded().is_empty());
        assert_eq!(r.state(), EditorState::Clean);
        assert_eq!(r.snapshot().writes_issued, 1);
    }

    #[test]
    fn reverting_to_remote_value_skips_the_write() {
        let mut r = selected();
        r.edit(retitle("Other")).unwrap();
        r.edit(retitle("Welcome")).unwrap();
        assert!(r.timer_elapsed().is_empty());
        assert_eq!(r.state(), EditorState::Clean);
        assert_eq!(r.snapshot().writes_issued, 0);
    }

    #[test]
    fn failed_write_keeps_buffer_and_notifies_once() {
        let mut r = selected();
        r.edit(retitle("Summer Sale")).unwrap();
        r.timer_elapsed();

        let actions = r.write_failed("timeout");
        assert_eq!(notices(&actions), 1);
        assert_eq!(r.state(), EditorState::WriteFailed);
        assert_eq!(r.buffer().unwrap().title, "Summer Sale");
        assert_eq!(r.snapshot().last_error.as_deref(), Some("timeout"));

        // A second failure report for the same write is ignored
        assert!(r.write_failed("timeout").is_empty());

        let retry = r.retry();
        assert_eq!(writes(&retry)[0].title, "Summer Sale");
        r.write_succeeded();
        assert_eq!(r.state(), EditorState::Clean);
        assert!(r.snapshot().last_error.is_none());
    }

    #[test]
    fn external_change_after_failed_write_is_held_until_retry() {
        let mut r = selected();
        r.edit(retitle("Summer Sale")).unwrap();
        r.timer_elapsed();
        r.write_failed("offline");

        let actions = r.remote_changed(section("Renamed elsewhere"));
        assert_eq!(notices(&actions), 1);
        assert!(writes(&actions).is_empty());
        assert_eq!(r.state(), EditorState::WriteFailed);
        assert_eq!(r.buffer().unwrap().title, "Summer Sale");
        assert_eq!(r.snapshot().conflict.unwrap().title, "Renamed elsewhere");
        assert_eq!(r.snapshot().last_error.as_deref(), Some("offline"));

        // Same remote value again is not news
        assert!(r.remote_changed(section("Renamed elsewhere")).is_empty());

        let retry = r.retry();
        assert_eq!(writes(&retry)[0].title, "Summer Sale");
        r.write_succeeded();
        assert_eq!(r.state(), EditorState::Clean);
        assert!(r.snapshot().conflict.is_none());
    }

    #[test]
    fn remote_catching_up_clears_write_failed() {
        let mut r = selected();
        r.edit(retitle("Summer Sale")).unwrap();
        r.timer_elapsed();
        r.write_failed("offline");

        let actions = r.remote_changed(section("Summer Sale"));
        assert_eq!(actions, vec![Action::CancelTimer]);
        assert_eq!(r.state(), EditorState::Clean);
        assert!(r.retry().is_empty());
    }

    #[test]
    fn edit_after_failure_rearms_the_timer() {
        let mut r = selected();
        r.edit(retitle("A")).unwrap();
        r.timer_elapsed();
        r.write_failed("offline");

        assert_eq!(r.edit(retitle("AB")).unwrap(), vec![Action::RestartTimer]);
        assert_eq!(r.state(), EditorState::DirtyPending);
        assert_eq!(writes(&r.timer_elapsed())[0].title, "AB");
    }

    #[test]
    fn edits_during_write_are_flushed_after_it_lands() {
        let mut r = selected();
        r.edit(retitle("First")).unwrap();
        r.timer_elapsed();
        r.edit(retitle("Second")).unwrap();
        assert_eq!(r.state(), EditorState::Writing);

        // Timer armed by the second edit is still pending
        assert!(r.write_succeeded().is_empty());
        assert_eq!(r.state(), EditorState::DirtyPending);
        assert_eq!(writes(&r.timer_elapsed())[0].title, "Second");

        // Timer fired while writing: write immediately once the first lands
        let mut r = selected();
        r.edit(retitle("First")).unwrap();
        r.timer_elapsed();
        r.edit(retitle("Second")).unwrap();
        assert!(r.timer_elapsed().is_empty());
        assert_eq!(writes(&r.write_succeeded())[0].title, "Second");
    }

    #[test]
    fn own_write_echo_does_not_trigger_anything() {
        let mut r = selected();
        r.edit(retitle("Saved")).unwrap();
        r.timer_elapsed();

        // Echo while the write is in flight
        assert!(r.remote_changed(section("Saved")).is_empty());
        r.write_succeeded();

        // Echo after it landed
        assert!(r.remote_changed(section("Saved")).is_empty());
        assert_eq!(r.state(), EditorState::Clean);
        assert_eq!(r.snapshot().writes_issued, 1);
    }

    #[test]
    fn external_change_replaces_clean_buffer() {
        let mut r = selected();
        assert!(r.remote_changed(section("From another admin")).is_empty());
        assert_eq!(r.buffer().unwrap().title, "From another admin");
        assert_eq!(r.state(), EditorState::Clean);
    }

    #[test]
    fn external_change_never_clobbers_unsaved_edits() {
        let mut r = selected();
        r.edit(retitle("Mine")).unwrap();

        let actions = r.remote_changed(section("Theirs"));
        assert_eq!(notices(&actions), 1);
        assert_eq!(r.buffer().unwrap().title, "Mine");
        assert_eq!(r.snapshot().conflict.unwrap().title, "Theirs");
        assert_eq!(r.state(), EditorState::DirtyPending);

        // Same conflicting value again is not re-announced
        assert_eq!(notices(&r.remote_changed(section("Theirs"))), 0);

        // Last write wins and clears the conflict
        assert_eq!(writes(&r.timer_elapsed())[0].title, "Mine");
        r.write_succeeded();
        assert!(r.snapshot().conflict.is_none());
    }

    #[test]
    fn external_change_during_write_is_held() {
        let mut r = selected();
        r.edit(retitle("Mine")).unwrap();
        r.timer_elapsed();
        let actions = r.remote_changed(section("Theirs"));
        assert_eq!(notices(&actions), 1);
        assert_eq!(r.buffer().unwrap().title, "Mine");
    }

    #[test]
    fn discard_adopts_conflicting_value() {
        let mut r = selected();
        r.edit(retitle("Mine")).unwrap();
        r.remote_changed(section("Theirs"));

        assert_eq!(r.discard(), vec![Action::CancelTimer]);
        assert_eq!(r.state(), EditorState::Clean);
        assert_eq!(r.buffer().unwrap().title, "Theirs");
        assert!(r.timer_elapsed().is_empty());
    }

    #[test]
    fn remote_matching_buffer_settles_dirty_state() {
        let mut r = selected();
        r.edit(retitle("Same")).unwrap();
        assert_eq!(r.remote_changed(section("Same")), vec![Action::CancelTimer]);
        assert_eq!(r.state(), EditorState::Clean);
    }

    #[test]
    fn failing_edit_leaves_buffer_untouched() {
        let mut r = selected();
        let result = r.edit(|s: &mut Section| {
            s.title = "half-applied".into();
            Err("bad content")
        });
        assert_eq!(result, Err("bad content"));
        assert_eq!(r.buffer().unwrap().title, "Welcome");
        assert_eq!(r.state(), EditorState::Clean);
    }

    #[test]
    fn deletion_and_deselect_cancel_timer() {
        let mut r = selected();
        r.edit(retitle("x")).unwrap();
        let actions = r.remote_deleted();
        assert_eq!(actions[0], Action::CancelTimer);
        assert_eq!(notices(&actions), 1);
        assert_eq!(r.state(), EditorState::Unselected);
        assert!(r.buffer().is_none());

        // Nothing to edit once unselected
        assert!(r.edit(retitle("y")).unwrap().is_empty());
        assert_eq!(selected().deselect(), vec![Action::CancelTimer]);
    }
}
