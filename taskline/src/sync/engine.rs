//! The actor that owns the task store and the pending queue.
//!
//! All requests arrive through one `mpsc` inbox and are handled in order.
//! Direct commands for user mutations run inline, so a mutation's remote
//! call completes before the next request is looked at. A resync cycle runs
//! on a worker task that only talks to the peer; its result comes back
//! through a private channel and is applied here. Mutations that arrive
//! while a cycle is in flight are parked and handled once it finishes.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use taskline_proto::snapshot;
use taskline_proto::task::{PendingKind, Task, TaskKey};

use super::{
    ConnectivitySignal, EngineError, ResyncOutcome, SyncError, SyncEvent, SyncState, replay,
};
use crate::client::CommandClient;
use crate::queue::{PendingMutation, PendingQueue};
use crate::store::{TaskStore, TaskView, local_today};

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum Request {
    Add {
        name: String,
        date: NaiveDate,
        reply: Reply<Result<Task, EngineError>>,
    },
    Update {
        task: Task,
        reply: Reply<Result<Task, EngineError>>,
    },
    SetCompleted {
        key: TaskKey,
        completed: bool,
        reply: Reply<Result<Task, EngineError>>,
    },
    Delete {
        key: TaskKey,
        reply: Reply<Result<(), EngineError>>,
    },
    Find {
        key: TaskKey,
        reply: Reply<Option<Task>>,
    },
    Tasks {
        view: TaskView,
        reply: Reply<Vec<Task>>,
    },
    State {
        reply: Reply<SyncState>,
    },
    PendingLen {
        reply: Reply<usize>,
    },
    Resync {
        reply: Reply<ResyncOutcome>,
    },
    Signal {
        signal: ConnectivitySignal,
        reply: Option<Reply<ResyncOutcome>>,
    },
    Shutdown,
}

impl Request {
    const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Add { .. } | Self::Update { .. } | Self::SetCompleted { .. } | Self::Delete { .. }
        )
    }
}

/// What a resync worker reports back.
struct Cycle {
    batch: Vec<PendingMutation>,
    result: Result<String, SyncError>,
}

fn respond(reply: Option<Reply<ResyncOutcome>>, outcome: ResyncOutcome) {
    if let Some(reply) = reply {
        let _ = reply.send(outcome);
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable front end to a running engine.
///
/// Every method fails with [`EngineError::Closed`] once the engine has
/// stopped.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<Request>,
}

impl SyncHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Adds a task for `date`, or replaces the one with the same key.
    ///
    /// # Errors
    ///
    /// [`EngineError::Task`] if `name` is blank.
    pub async fn add(&self, name: &str, date: NaiveDate) -> Result<Task, EngineError> {
        let name = name.to_string();
        self.call(|reply| Request::Add { name, date, reply }).await?
    }

    /// Replaces the record with `task`'s key.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if no visible record has that key.
    pub async fn update(&self, task: Task) -> Result<Task, EngineError> {
        self.call(|reply| Request::Update { task, reply }).await?
    }

    /// Marks the task with `key` done or not done.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if no visible record has that key.
    pub async fn set_completed(&self, key: TaskKey, completed: bool) -> Result<Task, EngineError> {
        self.call(|reply| Request::SetCompleted {
            key,
            completed,
            reply,
        })
        .await?
    }

    /// Deletes the task with `key`.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if no visible record has that key.
    pub async fn delete(&self, key: TaskKey) -> Result<(), EngineError> {
        self.call(|reply| Request::Delete { key, reply }).await?
    }

    /// Looks up a record by key, including ones pending deletion.
    ///
    /// # Errors
    ///
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn find(&self, key: TaskKey) -> Result<Option<Task>, EngineError> {
        self.call(|reply| Request::Find { key, reply }).await
    }

    /// Visible tasks in `view`, sorted by day then name.
    ///
    /// # Errors
    ///
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn tasks(&self, view: TaskView) -> Result<Vec<Task>, EngineError> {
        self.call(|reply| Request::Tasks { view, reply }).await
    }

    /// Current connection state.
    ///
    /// # Errors
    ///
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn state(&self) -> Result<SyncState, EngineError> {
        self.call(|reply| Request::State { reply }).await
    }

    /// Number of queued mutations.
    ///
    /// # Errors
    ///
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn pending_len(&self) -> Result<usize, EngineError> {
        self.call(|reply| Request::PendingLen { reply }).await
    }

    /// Requests a manual refresh and waits for it to finish.
    ///
    /// # Errors
    ///
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn resync(&self) -> Result<ResyncOutcome, EngineError> {
        self.call(|reply| Request::Resync { reply }).await
    }

    /// Delivers a connectivity signal and waits for any cycle it starts.
    ///
    /// # Errors
    ///
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn signal(&self, signal: ConnectivitySignal) -> Result<ResyncOutcome, EngineError> {
        self.call(|reply| Request::Signal {
            signal,
            reply: Some(reply),
        })
        .await
    }

    /// Delivers a connectivity signal without waiting.
    ///
    /// # Errors
    ///
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn notify(&self, signal: ConnectivitySignal) -> Result<(), EngineError> {
        self.tx
            .send(Request::Signal {
                signal,
                reply: None,
            })
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Asks the engine to stop. A cycle in flight and any parked mutations
    /// are finished first.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Request::Shutdown).await;
    }
}

/// Starts an engine on the current tokio runtime.
///
/// The queue is rebuilt from pending tags in `store`, and the engine starts
/// `Offline`. The join handle yields the store back after shutdown.
pub fn spawn<C: CommandClient>(
    client: C,
    store: TaskStore,
    capacity: usize,
) -> (SyncHandle, mpsc::Receiver<SyncEvent>, JoinHandle<TaskStore>) {
    let capacity = capacity.max(1);
    let (tx, inbox) = mpsc::channel(capacity);
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let engine = SyncEngine::new(client, store, events_tx);
    let task = tokio::spawn(engine.run(inbox));
    (SyncHandle { tx }, events_rx, task)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct SyncEngine<C> {
    client: Arc<C>,
    store: TaskStore,
    queue: PendingQueue,
    state: SyncState,
    events: mpsc::Sender<SyncEvent>,
    parked: VecDeque<Request>,
    waiters: Vec<Reply<ResyncOutcome>>,
    lost_during_sync: bool,
}

impl<C: CommandClient> SyncEngine<C> {
    fn new(client: C, store: TaskStore, events: mpsc::Sender<SyncEvent>) -> Self {
        let queue = PendingQueue::rebuild_from(&store);
        if !queue.is_empty() {
            tracing::info!(pending = queue.len(), "rebuilt pending queue from stored tags");
        }
        Self {
            client: Arc::new(client),
            store,
            queue,
            state: SyncState::Offline,
            events,
            parked: VecDeque::new(),
            waiters: Vec::new(),
            lost_during_sync: false,
        }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Request>) -> TaskStore {
        let (done_tx, mut done_rx) = mpsc::channel::<Cycle>(1);
        loop {
            tokio::select! {
                request = inbox.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle(request, &done_tx).await,
                },
                Some(cycle) = done_rx.recv() => {
                    self.finish_resync(cycle);
                    self.drain_parked().await;
                }
            }
        }

        let in_flight = if self.state == SyncState::Syncing {
            done_rx.recv().await
        } else {
            None
        };
        if let Some(cycle) = in_flight {
            self.finish_resync(cycle);
        }
        self.drain_parked().await;
        tracing::debug!(tasks = self.store.len(), pending = self.queue.len(), "sync engine stopped");
        self.store
    }

    async fn handle(&mut self, request: Request, done_tx: &mpsc::Sender<Cycle>) {
        if self.state == SyncState::Syncing && request.is_mutation() {
            tracing::debug!(parked = self.parked.len() + 1, "parking mutation until resync finishes");
            self.parked.push_back(request);
            return;
        }
        match request {
            Request::Find { key, reply } => {
                let _ = reply.send(self.store.find(&key).cloned());
            }
            Request::Tasks { view, reply } => {
                let tasks = self
                    .store
                    .view_on(view, local_today())
                    .into_iter()
                    .cloned()
                    .collect();
                let _ = reply.send(tasks);
            }
            Request::State { reply } => {
                let _ = reply.send(self.state);
            }
            Request::PendingLen { reply } => {
                let _ = reply.send(self.queue.len());
            }
            Request::Resync { reply } => self.start_resync(done_tx, Some(reply)),
            Request::Signal { signal, reply } => self.on_signal(signal, reply, done_tx),
            Request::Shutdown => {}
            mutation => self.apply_mutation(mutation).await,
        }
    }

    async fn apply_mutation(&mut self, request: Request) {
        match request {
            Request::Add { name, date, reply } => {
                let result = self.add(&name, date).await;
                let _ = reply.send(result);
            }
            Request::Update { task, reply } => {
                let result = self.update(task).await;
                let _ = reply.send(result);
            }
            Request::SetCompleted {
                key,
                completed,
                reply,
            } => {
                let changed = self.live(&key).map(|t| t.with_completed(completed));
                let result = match changed {
                    Some(task) => self.update(task).await,
                    None => Err(EngineError::NotFound(key)),
                };
                let _ = reply.send(result);
            }
            Request::Delete { key, reply } => {
                let result = self.delete(&key).await;
                let _ = reply.send(result);
            }
            other => tracing::debug!(request = ?other, "not a mutation"),
        }
    }

    async fn drain_parked(&mut self) {
        while let Some(request) = self.parked.pop_front() {
            self.apply_mutation(request).await;
        }
    }

    // ----- user mutations -----

    async fn add(&mut self, name: &str, date: NaiveDate) -> Result<Task, EngineError> {
        let task = Task::new(name, date)?;
        let key = task.key();

        // Re-adding a confirmed task is an update; the peer already holds it.
        let known = self
            .store
            .find(&key)
            .is_some_and(|t| t.pending_kind() == PendingKind::None);
        let (task, mutation) = if known {
            (task.clone(), PendingMutation::Update(task))
        } else {
            let task = task.with_pending(PendingKind::UncommittedCreate);
            (task.clone(), PendingMutation::Create(task))
        };
        self.store.upsert(task.clone());
        self.commit();

        if self.dispatch(mutation).await && self.mark_confirmed(&key) {
            self.commit();
        }
        Ok(self.store.find(&key).cloned().unwrap_or(task))
    }

    async fn update(&mut self, task: Task) -> Result<Task, EngineError> {
        let key = task.key();
        let existing = self
            .live(&key)
            .ok_or_else(|| EngineError::NotFound(key.clone()))?;
        let updated = task.with_pending(existing.pending_kind());
        self.store.upsert(updated.clone());
        self.commit();

        if self.dispatch(PendingMutation::Update(updated.clone())).await
            && self.mark_confirmed(&key)
        {
            self.commit();
        }
        Ok(self.store.find(&key).cloned().unwrap_or(updated))
    }

    async fn delete(&mut self, key: &TaskKey) -> Result<(), EngineError> {
        let existing = self
            .live(key)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(key.clone()))?;

        if existing.pending_kind() == PendingKind::UncommittedCreate {
            // Re-added after a queued delete: the peer still holds the old
            // record, so only the re-add is dropped.
            if let Some(dropped) = self.queue.discard_after_delete(key) {
                tracing::debug!(task = %key, dropped, "dropped re-add; delete stays queued");
                self.store
                    .upsert(existing.with_pending(PendingKind::UncommittedDelete));
                self.commit();
                return Ok(());
            }

            // The peer never saw it, so there is nothing to tell it.
            self.store.remove_key(key);
            let dropped = self.queue.discard_task(key);
            tracing::debug!(task = %key, dropped, "dropped unsynced task");
            self.commit();
            return Ok(());
        }

        let tombstone = existing.with_pending(PendingKind::UncommittedDelete);
        self.store.upsert(tombstone.clone());
        self.commit();

        if self.dispatch(PendingMutation::Delete(tombstone)).await {
            self.store.remove_key(key);
            self.commit();
        }
        Ok(())
    }

    /// Sends `mutation` when online, otherwise queues it. A failed send is
    /// queued too and takes the engine offline.
    ///
    /// Returns whether the peer acknowledged the command.
    async fn dispatch(&mut self, mutation: PendingMutation) -> bool {
        let command = mutation.to_command();
        if self.state != SyncState::Online {
            tracing::debug!(verb = command.verb(), task = %mutation.task().key(), "offline; queueing mutation");
            self.queue.enqueue(mutation);
            return false;
        }

        match self.client.execute(&command).await {
            Ok(reply) => {
                if reply.trim() == "ERR" {
                    tracing::warn!(verb = command.verb(), task = %mutation.task().key(), "peer rejected command");
                }
                true
            }
            Err(err) => {
                tracing::warn!(verb = command.verb(), error = %err, "direct command failed; queueing for replay");
                self.queue.enqueue(mutation);
                self.emit(SyncEvent::Error(format!("{} failed: {err}", command.verb())));
                self.set_state(SyncState::Offline);
                false
            }
        }
    }

    // ----- connectivity and resync -----

    fn on_signal(
        &mut self,
        signal: ConnectivitySignal,
        reply: Option<Reply<ResyncOutcome>>,
        done_tx: &mpsc::Sender<Cycle>,
    ) {
        tracing::info!(?signal, state = %self.state, "connectivity signal");
        match (signal, self.state) {
            (ConnectivitySignal::Lost, SyncState::Online) => {
                self.set_state(SyncState::Offline);
                respond(reply, ResyncOutcome::NotStarted);
            }
            (ConnectivitySignal::Lost, SyncState::Syncing) => {
                self.lost_during_sync = true;
                respond(reply, ResyncOutcome::NotStarted);
            }
            (ConnectivitySignal::Lost, SyncState::Offline)
            | (
                ConnectivitySignal::Available | ConnectivitySignal::Resumed,
                SyncState::Online,
            ) => respond(reply, ResyncOutcome::NotStarted),
            (_, SyncState::Syncing) => respond(reply, ResyncOutcome::AlreadyRunning),
            (_, SyncState::Offline) => self.start_resync(done_tx, reply),
        }
    }

    fn start_resync(&mut self, done_tx: &mpsc::Sender<Cycle>, reply: Option<Reply<ResyncOutcome>>) {
        if self.state == SyncState::Syncing {
            tracing::debug!("resync already in flight");
            respond(reply, ResyncOutcome::AlreadyRunning);
            return;
        }

        let batch = self.queue.drain();
        tracing::info!(queued = batch.len(), "starting resync");
        self.lost_during_sync = false;
        self.waiters.extend(reply);
        self.set_state(SyncState::Syncing);

        let client = Arc::clone(&self.client);
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result = replay::resync(client.as_ref(), &batch).await;
            let _ = done_tx.send(Cycle { batch, result }).await;
        });
    }

    fn finish_resync(&mut self, cycle: Cycle) {
        let Cycle { batch, result } = cycle;
        let outcome = match result {
            Ok(payload) => {
                self.queue.acknowledge(batch.len());
                let snapshot = snapshot::parse(&payload);
                for anomaly in &snapshot.anomalies {
                    tracing::warn!(%anomaly, "skipped snapshot line");
                }
                self.store.replace_all(snapshot.tasks);
                let tasks = self.store.len();
                self.commit();

                let next = if self.lost_during_sync {
                    SyncState::Offline
                } else {
                    SyncState::Online
                };
                tracing::info!(replayed = batch.len(), tasks, "resync complete");
                self.set_state(next);
                ResyncOutcome::Completed {
                    replayed: batch.len(),
                    tasks,
                }
            }
            Err(err) => {
                // Every queued mutation reached the peer; only the listing
                // failed.
                if matches!(err, SyncError::Listing { .. }) {
                    self.queue.acknowledge(batch.len());
                    self.settle(&batch);
                }
                tracing::warn!(error = %err, pending = self.queue.len(), "resync failed");
                self.emit(SyncEvent::Error(err.to_string()));
                self.set_state(SyncState::Offline);
                ResyncOutcome::Failed(err)
            }
        };
        self.lost_during_sync = false;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Clears the pending tags of records whose mutations were replayed.
    fn settle(&mut self, batch: &[PendingMutation]) {
        for mutation in batch {
            let key = mutation.task().key();
            match mutation {
                PendingMutation::Create(_) | PendingMutation::Update(_) => {
                    self.mark_confirmed(&key);
                }
                PendingMutation::Delete(_) => {
                    let tombstoned = self
                        .store
                        .find(&key)
                        .is_some_and(|t| t.pending_kind() == PendingKind::UncommittedDelete);
                    if tombstoned {
                        self.store.remove_key(&key);
                    }
                }
            }
        }
        self.commit();
    }

    // ----- helpers -----

    /// Record with `key` unless it is pending deletion.
    fn live(&self, key: &TaskKey) -> Option<&Task> {
        self.store
            .find(key)
            .filter(|t| t.pending_kind() != PendingKind::UncommittedDelete)
    }

    /// Clears an `UncommittedCreate` tag. Returns whether anything changed.
    fn mark_confirmed(&mut self, key: &TaskKey) -> bool {
        let Some(task) = self
            .store
            .find(key)
            .filter(|t| t.pending_kind() == PendingKind::UncommittedCreate)
        else {
            return false;
        };
        let confirmed = task.with_pending(PendingKind::None);
        self.store.upsert(confirmed);
        true
    }

    /// Persists the store and announces the change.
    fn commit(&self) {
        if let Err(err) = self.store.save() {
            tracing::warn!(error = %err, "failed to persist tasks");
            self.emit(SyncEvent::Error(format!("saving tasks failed: {err}")));
        }
        self.emit(SyncEvent::TasksChanged {
            count: self.store.len(),
        });
    }

    fn set_state(&mut self, next: SyncState) {
        if self.state == next {
            return;
        }
        tracing::info!(from = %self.state, to = %next, "sync state changed");
        self.state = next;
        self.emit(SyncEvent::StateChanged(next));
    }

    fn emit(&self, event: SyncEvent) {
        if let Err(err) = self.events.try_send(event) {
            tracing::trace!(error = %err, "sync event dropped");
        }
    }
}
