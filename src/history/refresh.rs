//! Background fetch-and-process cycle of one history session.
//!
//! ```text
//! Idle -> Fetching -> Processing -> Idle
//!             \            \
//!              +-----------+--> Cancelled -> Idle
//! ```
//!
//! Each `refresh` starts a new generation and cancels the previous one. A
//! worker only publishes while its generation is still current, and the
//! check and the send happen under the same lock, so results arrive in
//! generation order and superseded work never reaches the caller.

use super::category::{Category, categorize};
use super::dedupe::dedupe;
use super::edition::{Edition, EditionMap};
use super::filter::HistoryFilter;
use super::types::{ResourceId, Revision, RevisionProvider, RevisionSet};
use crate::config::Settings;
use crate::error::{Cancelled, FetchError};
use crate::messages::ResponseMessage;
use crate::progress::CancelToken;
use chrono::{DateTime, Local};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
    Processing,
    Cancelled,
}

/// Reference time for date grouping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Local>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Local> {
        match self {
            Clock::System => Local::now(),
            Clock::Fixed(now) => *now,
        }
    }
}

/// How the fetched revisions are post-processed
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOptions {
    pub group_by_date: bool,
    pub filter: HistoryFilter,
    pub clock: Clock,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            group_by_date: true,
            filter: HistoryFilter::default(),
            clock: Clock::System,
        }
    }
}

impl From<&Settings> for RefreshOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            group_by_date: settings.group_by_date,
            filter: settings.filter.clone(),
            clock: Clock::System,
        }
    }
}

/// Whether the provider answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Complete,
    /// The provider failed; the snapshot holds whatever it could list locally
    FetchFailed(FetchError),
}

/// Result of one completed refresh
#[derive(Debug)]
pub struct HistorySnapshot {
    pub status: RefreshStatus,
    /// Everything the provider returned
    pub fetched: RevisionSet,
    /// Distinct editions that passed the filter, newest first
    pub revisions: Vec<Revision>,
    /// `None` when grouping by date is off
    pub categories: Option<Vec<Category>>,
    /// Materialized editions of the kept revisions
    pub editions: EditionMap,
}

struct Shared {
    state: RefreshState,
    generation: u64,
    shut_down: bool,
    cached: Option<RevisionSet>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RefreshCoordinator {
    resource: ResourceId,
    provider: Arc<dyn RevisionProvider>,
    options: RefreshOptions,
    shared: Arc<Mutex<Shared>>,
    cancel: Option<CancelToken>,
    sender: Sender<ResponseMessage>,
    receiver: Receiver<ResponseMessage>,
    _thread_handle: Option<thread::JoinHandle<()>>,
}

impl RefreshCoordinator {
    pub fn new(resource: ResourceId, provider: Arc<dyn RevisionProvider>, options: RefreshOptions) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            resource,
            provider,
            options,
            shared: Arc::new(Mutex::new(Shared {
                state: RefreshState::Idle,
                generation: 0,
                shut_down: false,
                cached: None,
            })),
            cancel: None,
            sender,
            receiver,
            _thread_handle: None,
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn state(&self) -> RefreshState {
        lock(&self.shared).state
    }

    /// Generation of the most recent `refresh`, 0 before the first one
    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state(), RefreshState::Fetching | RefreshState::Processing)
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    /// Applies from the next `refresh`
    pub fn set_options(&mut self, options: RefreshOptions) {
        self.options = options;
    }

    /// Start a new cycle, cancelling the one in flight.
    ///
    /// Without `force_refetch` the last fetched revision set is processed
    /// again instead of asking the provider. Returns the new generation.
    pub fn refresh(&mut self, force_refetch: bool) -> u64 {
        let (generation, cached) = {
            let mut shared = lock(&self.shared);
            if shared.shut_down {
                return shared.generation;
            }
            if let Some(token) = self.cancel.take() {
                debug!(
                    "Superseding refresh {} of {}",
                    shared.generation, self.resource
                );
                token.cancel();
            }
            shared.generation += 1;
            shared.state = RefreshState::Fetching;
            let cached = if force_refetch { None } else { shared.cached.clone() };
            (shared.generation, cached)
        };

        let token = CancelToken::new();
        self.cancel = Some(token.clone());

        let worker = Worker {
            generation,
            resource: self.resource.clone(),
            provider: Arc::clone(&self.provider),
            options: self.options.clone(),
            shared: Arc::clone(&self.shared),
            sender: self.sender.clone(),
            cancel: token,
        };
        self._thread_handle = Some(thread::spawn(move || worker.run(cached)));

        generation
    }

    /// Cancel the cycle in flight. The caller still receives a
    /// `RefreshCancelled` for it.
    pub fn cancel(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    /// Next result of the current generation, without blocking
    pub fn poll(&self) -> Option<ResponseMessage> {
        while let Ok(message) = self.receiver.try_recv() {
            if let Some(message) = self.accept(message) {
                return Some(message);
            }
        }
        None
    }

    /// Block until the current generation delivers or `timeout` passes
    pub fn wait(&self, timeout: Duration) -> Option<ResponseMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(message) => {
                    if let Some(message) = self.accept(message) {
                        return Some(message);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Cancel any work and stop publishing. Called on drop.
    pub fn shutdown(&mut self) {
        let mut shared = lock(&self.shared);
        if shared.shut_down {
            return;
        }
        shared.shut_down = true;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if matches!(shared.state, RefreshState::Fetching | RefreshState::Processing) {
            shared.state = RefreshState::Cancelled;
        }
    }

    fn accept(&self, message: ResponseMessage) -> Option<ResponseMessage> {
        let mut shared = lock(&self.shared);
        if message.generation() != shared.generation {
            debug!("Dropping stale refresh result {}", message.generation());
            return None;
        }
        if shared.state == RefreshState::Cancelled {
            shared.state = RefreshState::Idle;
        }
        Some(message)
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    generation: u64,
    resource: ResourceId,
    provider: Arc<dyn RevisionProvider>,
    options: RefreshOptions,
    shared: Arc<Mutex<Shared>>,
    sender: Sender<ResponseMessage>,
    cancel: CancelToken,
}

impl Worker {
    fn run(self, cached: Option<RevisionSet>) {
        match self.process(cached) {
            Ok(snapshot) => self.publish(snapshot),
            Err(Cancelled) => self.finish_cancelled(),
        }
    }

    fn process(&self, cached: Option<RevisionSet>) -> Result<HistorySnapshot, Cancelled> {
        let (fetched, status) = match cached {
            Some(set) => {
                debug!("Reusing {} fetched revisions of {}", set.len(), self.resource);
                (set, RefreshStatus::Complete)
            }
            None => self.fetch()?,
        };

        if self.cancel.is_cancelled() || !self.enter_processing() {
            return Err(Cancelled);
        }

        let mut reference = Edition::local(self.resource.clone());
        let mut editions = EditionMap::new();
        let kept = dedupe(
            &mut reference,
            fetched.revisions(),
            self.provider.as_ref(),
            &mut editions,
            &self.cancel,
        )?;

        let revisions = if self.options.filter.is_empty() {
            kept
        } else {
            self.options.filter.apply(&kept)
        };
        let categories = self
            .options
            .group_by_date
            .then(|| categorize(&revisions, &self.options.clock.now()));

        info!(
            "History of {}: {} revisions, {} distinct, {} shown",
            self.resource,
            fetched.len(),
            editions.len(),
            revisions.len()
        );

        Ok(HistorySnapshot {
            status,
            fetched,
            revisions,
            categories,
            editions,
        })
    }

    fn fetch(&self) -> Result<(RevisionSet, RefreshStatus), Cancelled> {
        match self.provider.fetch_revisions(&self.resource, &self.cancel) {
            Ok(set) => {
                let mut shared = lock(&self.shared);
                if shared.generation == self.generation {
                    shared.cached = Some(set.clone());
                }
                Ok((set, RefreshStatus::Complete))
            }
            Err(FetchError::Cancelled) => Err(Cancelled),
            Err(_) if self.cancel.is_cancelled() => Err(Cancelled),
            Err(e) => {
                warn!("Falling back to local history of {}: {}", self.resource, e);
                let set = self.provider.fetch_local_only(&self.resource);
                Ok((set, RefreshStatus::FetchFailed(e)))
            }
        }
    }

    /// False when this generation was superseded while fetching
    fn enter_processing(&self) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation || shared.shut_down {
            return false;
        }
        shared.state = RefreshState::Processing;
        true
    }

    fn publish(&self, snapshot: HistorySnapshot) {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation || shared.shut_down || self.cancel.is_cancelled() {
            debug!("Suppressing result of refresh {}", self.generation);
            drop(shared);
            self.finish_cancelled();
            return;
        }
        shared.state = RefreshState::Idle;
        let _ = self.sender.send(ResponseMessage::HistoryLoaded {
            generation: self.generation,
            snapshot,
        });
    }

    fn finish_cancelled(&self) {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation {
            return;
        }
        shared.state = RefreshState::Cancelled;
        if shared.shut_down {
            return;
        }
        debug!("Refresh {} of {} cancelled", self.generation, self.resource);
        let _ = self.sender.send(ResponseMessage::RefreshCancelled {
            generation: self.generation,
        });
    }
}
