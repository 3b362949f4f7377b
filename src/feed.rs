//! Feed cursor and poll loop.
//!
//! [`ChangesFeed`] drives repeated long-poll exchanges against a database's
//! changes endpoint, maintains the resumable position, enforces an optional
//! total-change ceiling, classifies failures, and publishes ordered events
//! to its channel. At most one exchange is in flight per feed; events of one
//! exchange are fully published before the next exchange is issued.

use crate::error::{ConfigError, FeedFailure};
use crate::events::{EventBus, FeedEvent, Subscription};
use crate::transport::{changes_path, Transport};
use crate::types::{ChangesPage, FeedPosition};
use http::Method;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);
const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(5_000);

/// Options for a feed run.
///
/// Omitted fields keep their defaults; [`ChangesFeed::configure`] validates
/// the whole set before storing it.
#[derive(Clone, Debug)]
pub struct FeedOptions {
    /// Changes requested per exchange (default 100)
    pub batch_size: usize,
    /// Position to resume from (default: the current tail)
    pub start_position: FeedPosition,
    /// Ask the server to attach document bodies (default false)
    pub include_docs: bool,
    /// Stop after this many changes have been delivered (default unbounded)
    pub max_changes: Option<u64>,
    /// Server-side long-poll window (default 60s)
    pub timeout: Duration,
    /// Server-side keep-alive interval during the poll window (default 5s)
    pub heartbeat: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            start_position: FeedPosition::default(),
            include_docs: false,
            max_changes: None,
            timeout: DEFAULT_TIMEOUT,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

impl FeedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn start_position(mut self, position: impl Into<FeedPosition>) -> Self {
        self.start_position = position.into();
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    pub fn max_changes(mut self, max_changes: u64) -> Self {
        self.max_changes = Some(max_changes);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_changes == Some(0) {
            return Err(ConfigError::ZeroMaxChanges);
        }
        Ok(())
    }
}

/// Mutable state of one feed run.
///
/// Exclusively mutated by the loop while running; replaced wholesale with
/// `FeedSession::default()` on every halt so a later start begins clean
/// unless re-configured.
#[derive(Debug)]
struct FeedSession {
    position: FeedPosition,
    batch_size: usize,
    include_docs: bool,
    timeout: Duration,
    heartbeat: Duration,
    max_changes: Option<u64>,
    delivered: u64,
    bounded: bool,
    stop_requested: bool,
    running: bool,
}

impl Default for FeedSession {
    fn default() -> Self {
        let defaults = FeedOptions::default();
        Self {
            position: defaults.start_position,
            batch_size: defaults.batch_size,
            include_docs: defaults.include_docs,
            timeout: defaults.timeout,
            heartbeat: defaults.heartbeat,
            max_changes: defaults.max_changes,
            delivered: 0,
            bounded: false,
            stop_requested: false,
            running: false,
        }
    }
}

impl FeedSession {
    fn apply(&mut self, options: &FeedOptions) {
        self.position = options.start_position.clone();
        self.batch_size = options.batch_size;
        self.include_docs = options.include_docs;
        self.timeout = options.timeout;
        self.heartbeat = options.heartbeat;
        self.max_changes = options.max_changes;
        self.delivered = 0;
    }

    fn ceiling_reached(&self) -> bool {
        self.max_changes
            .is_some_and(|max| self.delivered >= max)
    }

    /// Page size for the next exchange: the configured batch size, clamped
    /// to what remains under the ceiling.
    fn next_limit(&self) -> usize {
        match self.max_changes {
            Some(max) => {
                let remaining = max.saturating_sub(self.delivered);
                (self.batch_size as u64).min(remaining) as usize
            }
            None => self.batch_size,
        }
    }

    fn query_params(&self, limit: usize) -> Vec<(&'static str, String)> {
        vec![
            ("feed", "longpoll".to_string()),
            ("timeout", self.timeout.as_millis().to_string()),
            ("since", self.position.as_str().to_string()),
            ("limit", limit.to_string()),
            ("heartbeat", self.heartbeat.as_millis().to_string()),
            ("seq_interval", self.batch_size.to_string()),
            ("include_docs", self.include_docs.to_string()),
        ]
    }
}

/// Loop states. Idle is the absence of a spawned task; a spawned loop
/// begins in `Polling` and always passes through `Halting` (session reset)
/// before `Halted`.
enum LoopState {
    Polling,
    Halting,
    Halted,
}

/// A resumable consumer of one database's changes feed.
///
/// Created via [`Client::changes`](crate::Client::changes), or directly from
/// [`ChangesFeed::new`] with a custom [`Transport`].
///
/// # Example
/// ```rust,no_run
/// use changes_follower::{Client, FeedEvent};
///
/// # async fn run() {
/// let client = Client::new("http://localhost:5984");
/// let feed = client.changes("orders");
///
/// let mut events = feed.start();
/// while let Some(event) = events.recv().await {
///     match event {
///         FeedEvent::Change(change) => println!("changed: {}", change.id),
///         FeedEvent::Seq(position) => println!("checkpoint: {}", position),
///         _ => {}
///     }
/// }
/// # }
/// ```
pub struct ChangesFeed<T: Transport> {
    database: String,
    path: String,
    transport: Arc<T>,
    session: Arc<Mutex<FeedSession>>,
    bus: EventBus,
}

impl<T: Transport> ChangesFeed<T> {
    /// Create a feed over the given transport and database.
    pub fn new(transport: T, database: impl Into<String>) -> Self {
        let database = database.into();
        let path = changes_path(&database);
        Self {
            database,
            path,
            transport: Arc::new(transport),
            session: Arc::new(Mutex::new(FeedSession::default())),
            bus: EventBus::new(),
        }
    }

    /// Database this feed consumes.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Validate and store options for the next run.
    ///
    /// Fails with [`ConfigError::Running`] while the loop is active: the
    /// session belongs to the loop until it halts.
    pub fn configure(&self, options: FeedOptions) -> Result<(), ConfigError> {
        options.validate()?;
        let mut session = self.session.lock();
        if session.running {
            return Err(ConfigError::Running);
        }
        session.apply(&options);
        Ok(())
    }

    /// Start tailing the feed indefinitely.
    ///
    /// Non-blocking: the loop runs on a spawned task and this returns a
    /// subscription to the event channel immediately. Idempotent: if the
    /// loop is already running, a handle to the existing channel is returned
    /// and no second loop is spawned.
    pub fn start(&self) -> Subscription {
        self.launch(false)
    }

    /// Start in bounded mode: consume until caught up to the tail.
    ///
    /// Like [`start`](Self::start), but the loop additionally halts and
    /// emits [`FeedEvent::End`] the first time a page holds strictly fewer
    /// changes than the requested limit.
    pub fn drain_to_tail(&self) -> Subscription {
        self.launch(true)
    }

    /// Request a graceful halt.
    ///
    /// The in-flight exchange is allowed to complete; no further exchange is
    /// issued, and the session resets to defaults. Safe to call from any
    /// context, repeatedly, or before [`start`](Self::start) (no-op).
    pub fn stop(&self) {
        let mut session = self.session.lock();
        if session.running {
            session.stop_requested = true;
        }
    }

    /// Subscribe to the event channel without affecting the loop.
    ///
    /// Late subscribers miss earlier events; there is no replay.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.session.lock().running
    }

    /// The current position - the resume checkpoint after the loop halts.
    pub fn position(&self) -> FeedPosition {
        self.session.lock().position.clone()
    }

    fn launch(&self, bounded: bool) -> Subscription {
        let subscription = self.bus.subscribe();
        {
            let mut session = self.session.lock();
            if session.running {
                return subscription;
            }
            session.running = true;
            session.bounded = bounded;
            session.stop_requested = false;
        }

        tokio::spawn(run_loop(
            Arc::clone(&self.transport),
            self.path.clone(),
            Arc::clone(&self.session),
            self.bus.clone(),
        ));

        subscription
    }
}

async fn run_loop<T: Transport>(
    transport: Arc<T>,
    path: String,
    session: Arc<Mutex<FeedSession>>,
    bus: EventBus,
) {
    #[cfg(feature = "tracing")]
    tracing::debug!(%path, "changes feed started");

    let mut state = LoopState::Polling;
    loop {
        state = match state {
            LoopState::Polling => poll_once(transport.as_ref(), &path, &session, &bus).await,
            LoopState::Halting => {
                *session.lock() = FeedSession::default();
                LoopState::Halted
            }
            LoopState::Halted => break,
        };
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(%path, "changes feed halted");
}

/// One loop iteration: a single exchange, its events, and the continuation
/// decision.
async fn poll_once<T: Transport>(
    transport: &T,
    path: &str,
    session: &Mutex<FeedSession>,
    bus: &EventBus,
) -> LoopState {
    let (limit, params) = {
        let session = session.lock();
        if session.stop_requested || session.ceiling_reached() {
            return LoopState::Halting;
        }
        let limit = session.next_limit();
        (limit, session.query_params(limit))
    };

    match transport.exchange(Method::GET, path, &params).await {
        Ok(page) => {
            let ChangesPage { results, last_seq, .. } = page;
            let count = results.len();

            if count > 0 {
                for record in &results {
                    bus.publish(FeedEvent::Change(record.clone()));
                }
                bus.publish(FeedEvent::Batch(results));
            }

            let (seq_event, caught_up, next) = {
                let mut session = session.lock();
                session.delivered += count as u64;

                // The position only ever takes server-issued values; an
                // unchanged last_seq (heartbeat, no-op poll) emits nothing.
                let mut seq_event = None;
                if let Some(last) = last_seq {
                    if last != session.position {
                        session.position = last.clone();
                        seq_event = Some(last);
                    }
                }

                let caught_up = session.bounded && count < limit;
                let next = if caught_up || session.stop_requested || session.ceiling_reached()
                {
                    LoopState::Halting
                } else {
                    LoopState::Polling
                };
                (seq_event, caught_up, next)
            };

            if let Some(position) = seq_event {
                bus.publish(FeedEvent::Seq(position));
            }
            if caught_up {
                bus.publish(FeedEvent::End);
            }
            next
        }
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%path, error = %err, transient = err.is_transient(), "exchange failed");

            bus.publish(FeedEvent::Error(FeedFailure::from(&err)));

            if err.is_transient() {
                // Retry with the same position; nothing is lost.
                let session = session.lock();
                if session.stop_requested || session.ceiling_reached() {
                    LoopState::Halting
                } else {
                    LoopState::Polling
                }
            } else {
                LoopState::Halting
            }
        }
    }
}
