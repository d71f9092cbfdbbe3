// Async driver for the reconciler: one task per open editor

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::{Action, Editable, EditorSnapshot, EditorState, Notice, Reconciler};
use crate::config::EditorSettings;
use crate::error::{AppError, StoreError};
use crate::store::{self, ChangeOp, RemoteStore};

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("editor session is closed")]
    Closed,
    #[error("no editor is open for '{0}'")]
    NotOpen(String),
    #[error("{0}")]
    InvalidEdit(String),
}

impl From<EditorError> for AppError {
    fn from(e: EditorError) -> Self {
        match e {
            EditorError::InvalidEdit(message) => AppError::Validation(message),
            other => AppError::Conflict(other.to_string()),
        }
    }
}

type EditFn<T> = Box<dyn FnOnce(&mut T) -> Result<(), String> + Send>;
type Reply<T> = oneshot::Sender<EditorSnapshot<T>>;
type WriteFuture = BoxFuture<'static, Result<(), StoreError>>;
type ReadFuture<T> = BoxFuture<'static, Result<Option<T>, StoreError>>;

enum Command<T> {
    Edit(EditFn<T>, oneshot::Sender<Result<EditorSnapshot<T>, String>>),
    Retry(Reply<T>),
    Discard(Reply<T>),
    Snapshot(Reply<T>),
}

/// Handle to a running editor task. Dropping or closing it stops the task and
/// cancels any pending debounce timer.
pub struct EditorHandle<T: Editable> {
    id: String,
    tx: mpsc::Sender<Command<T>>,
    task: JoinHandle<()>,
}

impl<T: Editable> EditorHandle<T> {
    pub async fn open(
        store: Arc<dyn RemoteStore>,
        id: &str,
        settings: EditorSettings,
        notices: broadcast::Sender<Notice>,
    ) -> Result<Self, StoreError> {
        // Subscribe before the read so no change between the two is missed
        let changes = store.subscribe(T::KIND);
        let record = store::fetch_record::<T>(store.as_ref(), id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;

        let mut machine = Reconciler::new();
        machine.select(record);
        tracing::info!(kind = %T::KIND, id, "Editor opened");

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let session = EditorSession {
            machine,
            store,
            id: id.to_string(),
            settings,
            notices,
            deadline: None,
            write: None,
            refetch: None,
        };
        let task = tokio::spawn(session.run(rx, changes));

        Ok(Self {
            id: id.to_string(),
            tx,
            task,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn request(
        &self,
        make: impl FnOnce(Reply<T>) -> Command<T>,
    ) -> Result<EditorSnapshot<T>, EditorError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| EditorError::Closed)?;
        rx.await.map_err(|_| EditorError::Closed)
    }

    pub async fn edit<F>(&self, f: F) -> Result<EditorSnapshot<T>, EditorError>
    where
        F: FnOnce(&mut T) -> Result<(), String> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Edit(Box::new(f), reply))
            .await
            .map_err(|_| EditorError::Closed)?;
        rx.await
            .map_err(|_| EditorError::Closed)?
            .map_err(EditorError::InvalidEdit)
    }

    pub async fn retry(&self) -> Result<EditorSnapshot<T>, EditorError> {
        self.request(Command::Retry).await
    }

    pub async fn discard(&self) -> Result<EditorSnapshot<T>, EditorError> {
        self.request(Command::Discard).await
    }

    pub async fn snapshot(&self) -> Result<EditorSnapshot<T>, EditorError> {
        self.request(Command::Snapshot).await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the session. An already issued write is allowed to land.
    pub async fn close(self) {
        let EditorHandle { id, tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::error!(kind = %T::KIND, id = %id, error = %e, "Editor task ended abnormally");
        }
    }
}

// Task-side state of one open editor. Remote calls run as boxed futures polled
// from the select loop, so commands and timers are served while they are pending.
struct EditorSession<T: Editable> {
    machine: Reconciler<T>,
    store: Arc<dyn RemoteStore>,
    id: String,
    settings: EditorSettings,
    notices: broadcast::Sender<Notice>,
    deadline: Option<Instant>,
    write: Option<WriteFuture>,
    refetch: Option<ReadFuture<T>>,
}

async fn in_flight<O>(call: &mut Option<BoxFuture<'static, O>>) -> O {
    match call {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

impl<T: Editable> EditorSession<T> {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Command<T>>,
        mut changes: broadcast::Receiver<store::ChangeNotification>,
    ) {
        let mut listening = true;
        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    let actions = self.machine.timer_elapsed();
                    self.apply(actions);
                }
                outcome = in_flight(&mut self.write), if self.write.is_some() => {
                    self.write = None;
                    let actions = match outcome {
                        Ok(()) => {
                            tracing::debug!(kind = %T::KIND, id = %self.id, "Autosave landed");
                            self.machine.write_succeeded()
                        }
                        Err(e) => {
                            tracing::warn!(
                                kind = %T::KIND,
                                id = %self.id,
                                error = %e,
                                "Autosave write failed"
                            );
                            self.machine.write_failed(&e.to_string())
                        }
                    };
                    self.apply(actions);
                }
                fetched = in_flight(&mut self.refetch), if self.refetch.is_some() => {
                    self.refetch = None;
                    self.refreshed(fetched);
                }
                note = changes.recv(), if listening => match note {
                    Ok(note) => {
                        let ours = note.op == ChangeOp::Refresh
                            || note.id.as_deref().is_none_or(|id| id == self.id);
                        if ours {
                            self.start_refetch();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Change feed lagged, refetching");
                        self.start_refetch();
                    }
                    Err(broadcast::error::RecvError::Closed) => listening = false,
                },
            }

            if self.machine.state() == EditorState::Unselected {
                break;
            }
        }

        if self.machine.is_dirty() && self.write.is_none() {
            tracing::warn!(kind = %T::KIND, id = %self.id, "Editor closed with unsaved changes");
        }
        // Pending timer is dropped with the session; an issued write still lands
        if let Some(write) = self.write.take() {
            if let Err(e) = write.await {
                tracing::warn!(
                    kind = %T::KIND,
                    id = %self.id,
                    error = %e,
                    "Final autosave write failed"
                );
            }
        }
        tracing::info!(kind = %T::KIND, id = %self.id, "Editor closed");
    }

    fn handle(&mut self, cmd: Command<T>) {
        match cmd {
            Command::Edit(f, reply) => {
                let result = match self.machine.edit(f) {
                    Ok(actions) => {
                        self.apply(actions);
                        Ok(self.machine.snapshot())
                    }
                    Err(message) => Err(message),
                };
                let _ = reply.send(result);
            }
            Command::Retry(reply) => {
                let actions = self.machine.retry();
                self.apply(actions);
                let _ = reply.send(self.machine.snapshot());
            }
            Command::Discard(reply) => {
                let actions = self.machine.discard();
                self.apply(actions);
                let _ = reply.send(self.machine.snapshot());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.machine.snapshot());
            }
        }
    }

    // A newer notification supersedes a refetch still in flight
    fn start_refetch(&mut self) {
        let store = Arc::clone(&self.store);
        let id = self.id.clone();
        let timeout = self.settings.write_timeout();
        if self.refetch.is_some() {
            tracing::debug!(kind = %T::KIND, id = %id, "Restarting refetch");
        }

        self.refetch = Some(Box::pin(async move {
            let fetch = store::fetch_record::<T>(store.as_ref(), &id);
            match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(timeout)),
            }
        }));
    }

    fn refreshed(&mut self, fetched: Result<Option<T>, StoreError>) {
        let actions = match fetched {
            Ok(Some(record)) => self.machine.remote_changed(record),
            Ok(None) => self.machine.remote_deleted(),
            Err(e) => {
                // Keep editing on a failed read; the next notification retries
                tracing::warn!(
                    kind = %T::KIND,
                    id = %self.id,
                    error = %e,
                    "Refetch after change notification failed"
                );
                Vec::new()
            }
        };
        self.apply(actions);
    }

    fn apply(&mut self, actions: Vec<Action<T>>) {
        for action in actions {
            match action {
                Action::RestartTimer => {
                    self.deadline = Some(Instant::now() + self.settings.debounce());
                }
                Action::CancelTimer => self.deadline = None,
                Action::Write(value) => self.start_write(value),
                Action::Notify(notice) => {
                    tracing::info!(
                        level = ?notice.level,
                        entity = ?notice.entity,
                        "{}",
                        notice.message
                    );
                    // Nobody listening is fine
                    let _ = self.notices.send(notice);
                }
            }
        }
    }

    fn start_write(&mut self, value: T) {
        let store = Arc::clone(&self.store);
        let id = self.id.clone();
        let timeout = self.settings.write_timeout();
        tracing::debug!(kind = %T::KIND, id = %id, "Issuing autosave write");

        self.write = Some(Box::pin(async move {
            let fields = store::to_fields(&value)?;
            match tokio::time::timeout(timeout, store.update(T::KIND, &id, fields)).await {
                Ok(result) => result.map(|_| ()),
                Err(_) => Err(StoreError::Timeout(timeout)),
            }
        }));
    }
}

/// Holds at most one open editor per entity kind; opening another entity
/// closes the previous one first.
pub struct EditorSlot<T: Editable> {
    active: Mutex<Option<EditorHandle<T>>>,
    store: Arc<dyn RemoteStore>,
    settings: EditorSettings,
    notices: broadcast::Sender<Notice>,
}

impl<T: Editable> EditorSlot<T> {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        settings: EditorSettings,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            active: Mutex::new(None),
            store,
            settings,
            notices,
        }
    }

    pub async fn open(&self, id: &str) -> Result<EditorSnapshot<T>, AppError> {
        let mut active = self.active.lock().await;
        if let Some(handle) = active.as_ref() {
            if handle.id() == id && !handle.is_finished() {
                return Ok(handle.snapshot().await?);
            }
        }
        if let Some(previous) = active.take() {
            previous.close().await;
        }

        let handle = EditorHandle::open(
            Arc::clone(&self.store),
            id,
            self.settings.clone(),
            self.notices.clone(),
        )
        .await?;
        let snapshot = handle.snapshot().await?;
        *active = Some(handle);
        Ok(snapshot)
    }

    pub async fn edit<F>(&self, id: &str, f: F) -> Result<EditorSnapshot<T>, AppError>
    where
        F: FnOnce(&mut T) -> Result<(), String> + Send + 'static,
    {
        let active = self.active.lock().await;
        Ok(Self::matching(&active, id)?.edit(f).await?)
    }

    pub async fn retry(&self, id: &str) -> Result<EditorSnapshot<T>, AppError> {
        let active = self.active.lock().await;
        Ok(Self::matching(&active, id)?.retry().await?)
    }

    pub async fn discard(&self, id: &str) -> Result<EditorSnapshot<T>, AppError> {
        let active = self.active.lock().await;
        Ok(Self::matching(&active, id)?.discard().await?)
    }

    pub async fn snapshot(&self, id: &str) -> Result<EditorSnapshot<T>, AppError> {
        let active = self.active.lock().await;
        Ok(Self::matching(&active, id)?.snapshot().await?)
    }

    pub async fn close(&self, id: &str) -> Result<(), AppError> {
        let mut active = self.active.lock().await;
        Self::matching(&active, id)?;
        if let Some(handle) = active.take() {
            handle.close().await;
        }
        Ok(())
    }

    pub async fn active_id(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|handle| handle.id().to_string())
    }

    // Used on shutdown
    pub async fn close_any(&self) {
        if let Some(handle) = self.active.lock().await.take() {
            handle.close().await;
        }
    }

    fn matching<'a>(
        active: &'a Option<EditorHandle<T>>,
        id: &str,
    ) -> Result<&'a EditorHandle<T>, EditorError> {
        active
            .as_ref()
            .filter(|handle| handle.id() == id)
            .ok_or_else(|| EditorError::NotOpen(format!("{}/{}", T::KIND, id)))
    }
}
