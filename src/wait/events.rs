// Events - Poll System.Events until an expected (pallet, event) pair shows up
//
// Each poll reads the best block and every block produced since the previous
// poll (bounded by the catch-up window), so a matching event is seen within
// one poll interval of the block that carries it.

use super::WaitError;
use crate::chain::events::EventRecord;
use crate::chain::primitives::{BlockNumber, H256};
use crate::client::{ChainConnection, ClientError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Predicate over a whole event record
pub type EventPredicate = Arc<dyn Fn(&EventRecord) -> bool + Send + Sync>;

/// Optional payload requirement of an [`AwaitSpec`]
#[derive(Clone)]
pub enum PayloadMatch {
    /// A top-level field name, or a top-level key of an object-valued field
    Field(String),
    Predicate(EventPredicate),
}

impl fmt::Debug for PayloadMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PayloadMatch::Field(name) => f.debug_tuple("Field").field(name).finish(),
            PayloadMatch::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// What to wait for
#[derive(Debug, Clone)]
pub struct AwaitSpec {
    pub pallet: String,
    pub variant: String,
    pub payload: Option<PayloadMatch>,
}

impl AwaitSpec {
    pub fn new(pallet: &str, variant: &str) -> Self {
        Self {
            pallet: pallet.to_string(),
            variant: variant.to_string(),
            payload: None,
        }
    }

    pub fn with_field(mut self, name: &str) -> Self {
        self.payload = Some(PayloadMatch::Field(name.to_string()));
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventRecord) -> bool + Send + Sync + 'static,
    {
        self.payload = Some(PayloadMatch::Predicate(Arc::new(predicate)));
        self
    }

    /// Pallet compared case-insensitively, event kind exactly
    pub fn matches(&self, record: &EventRecord) -> bool {
        if !record.is(&self.pallet, &self.variant) {
            return false;
        }
        match &self.payload {
            None => true,
            Some(PayloadMatch::Field(name)) => record.has_key(name),
            Some(PayloadMatch::Predicate(predicate)) => predicate(record),
        }
    }

    pub fn find<'a>(&self, records: &'a [EventRecord]) -> Option<&'a EventRecord> {
        records.iter().find(|r| self.matches(r))
    }
}

impl fmt::Display for AwaitSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.pallet, self.variant)?;
        match &self.payload {
            Some(PayloadMatch::Field(name)) => write!(f, " with field `{}`", name),
            Some(PayloadMatch::Predicate(_)) => write!(f, " matching predicate"),
            None => Ok(()),
        }
    }
}

/// Event polling knobs
#[derive(Debug, Clone, Copy)]
pub struct EventWaitSettings {
    pub poll_interval: Duration,
    /// Most blocks read per poll when the chain moved on by several blocks
    pub catch_up_blocks: u32,
}

impl Default for EventWaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            catch_up_blocks: 16,
        }
    }
}

#[derive(Debug, Default)]
struct ScanProgress {
    last: Option<(BlockNumber, H256)>,
    blocks_scanned: u32,
    polls: u32,
    failures: u32,
}

/// Waits for events by polling block event vectors
pub struct EventWaiter {
    connection: Arc<ChainConnection>,
    settings: EventWaitSettings,
}

impl EventWaiter {
    pub fn new(connection: Arc<ChainConnection>, settings: EventWaitSettings) -> Self {
        Self { connection, settings }
    }

    pub fn settings(&self) -> &EventWaitSettings {
        &self.settings
    }

    /// First matching event seen before `deadline` elapses
    pub async fn wait_for(&self, spec: &AwaitSpec, deadline: Duration) -> Result<EventRecord, WaitError> {
        let mut progress = ScanProgress::default();
        let result = timeout(deadline, self.poll(spec, &mut progress)).await;
        match result {
            Ok(found) => found,
            Err(_) => {
                debug!(
                    %spec,
                    polls = progress.polls,
                    failures = progress.failures,
                    blocks = progress.blocks_scanned,
                    "Event not observed"
                );
                Err(WaitError::NotObserved {
                    what: spec.to_string(),
                    timeout: deadline,
                    blocks_scanned: progress.blocks_scanned,
                })
            }
        }
    }

    /// Poll until the event appears, with no deadline
    pub async fn wait_unbounded(&self, spec: &AwaitSpec) -> Result<EventRecord, WaitError> {
        let mut progress = ScanProgress::default();
        self.poll(spec, &mut progress).await
    }

    /// `Session.NewSession`
    pub async fn wait_for_next_session(&self, deadline: Duration) -> Result<EventRecord, WaitError> {
        self.wait_for(&AwaitSpec::new("Session", "NewSession"), deadline).await
    }

    /// A failed poll is retried on the next tick unless the connection is gone;
    /// blocks it did not finish are scanned again.
    async fn poll(&self, spec: &AwaitSpec, progress: &mut ScanProgress) -> Result<EventRecord, WaitError> {
        loop {
            progress.polls += 1;
            match self.scan_new_blocks(spec, progress).await {
                Ok(Some(record)) => {
                    info!(%spec, event = %record, polls = progress.polls, "Event observed");
                    return Ok(record);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(%spec, error = %e, polls = progress.polls, "Event poll failed, retrying");
                    progress.failures += 1;
                }
                Err(e) => return Err(e.into()),
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Read events of the blocks after the last scanned one, up to the best block
    async fn scan_new_blocks(
        &self,
        spec: &AwaitSpec,
        progress: &mut ScanProgress,
    ) -> Result<Option<EventRecord>, ClientError> {
        let (best_number, best_hash) = self.connection.best_block().await?;
        if progress.last == Some((best_number, best_hash)) {
            return Ok(None);
        }

        let window_start = best_number.saturating_sub(self.settings.catch_up_blocks.saturating_sub(1));
        let start = match progress.last {
            Some((last, _)) if last < best_number => (last + 1).max(window_start),
            _ => best_number,
        };

        for number in start..=best_number {
            let hash = if number == best_number {
                best_hash
            } else {
                match self.connection.client().block_hash(Some(number)).await? {
                    Some(hash) => hash,
                    None => continue,
                }
            };

            let events = self.connection.events_at(Some(hash)).await?;
            progress.blocks_scanned += 1;
            if let Some(record) = spec.find(&events) {
                debug!(block = number, %hash, "Matching event found");
                return Ok(Some(record.clone()));
            }
        }

        progress.last = Some((best_number, best_hash));
        Ok(None)
    }
}
