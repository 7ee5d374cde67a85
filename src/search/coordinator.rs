//! Search coordinator running a fixed pool of CPU workers

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use super::handoff::{Publisher, ResultSlot};
use super::matcher::matches;
use super::progress::{ProgressAccounter, StopReason};
use super::{FoundKey, Progress, SearchConfig, SearchError, SearchOutcome, SearchRequest};
use crate::keys::{KeyError, KeySource, Keypair};

/// Lifecycle of a single search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Running,
    /// A worker signalled a match
    Found,
    /// Cancelled from outside
    Aborted,
    /// Every worker has exited
    Drained,
}

/// Drives one vanity search over a pool of worker threads
pub struct Coordinator<S> {
    source: S,
    config: SearchConfig,
    accounter: Arc<ProgressAccounter>,
    state: SearchState,
}

impl<S: KeySource> Coordinator<S> {
    pub fn new(source: S, config: SearchConfig) -> Self {
        Self {
            source,
            config,
            accounter: Arc::new(ProgressAccounter::new()),
            state: SearchState::Idle,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Shared progress of this search
    ///
    /// Calling [`ProgressAccounter::cancel`] on it aborts a running search.
    pub fn accounter(&self) -> Arc<ProgressAccounter> {
        self.accounter.clone()
    }

    /// Run the search to completion
    ///
    /// Blocks until a worker finds a match or the search is cancelled, then
    /// stops and joins every worker. The attempt count in the outcome is
    /// exact. When `progress_tx` is given a [`Progress`] snapshot is sent
    /// every `report_interval` and once more at the end.
    pub fn run(
        &mut self,
        request: &SearchRequest,
        progress_tx: Option<Sender<Progress>>,
    ) -> Result<SearchOutcome, SearchError> {
        if self.state != SearchState::Idle {
            return Err(SearchError::AlreadyStarted);
        }

        let source = &self.source;
        let config = &self.config;
        let accounter = &*self.accounter;
        let state = &mut self.state;

        let workers = config.workers.max(1);
        let batch_size = config.batch_size;
        let slot = ResultSlot::new();
        let start_time = Instant::now();

        info!(
            "searching for {} ({}) with {} workers",
            request.label(),
            request.mode(),
            workers
        );

        let result = thread::scope(|s| {
            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let publisher = slot.publisher();
                let spawned = thread::Builder::new()
                    .name(format!("vanity-worker-{}", id))
                    .spawn_scoped(s, move || {
                        worker(id, source, request, accounter, publisher, batch_size)
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => return Err(spawn_failed(state, accounter, handles, id, e)),
                }
            }
            transition(state, SearchState::Running);

            let mut last_report = Instant::now();
            while !accounter.is_cancelled() {
                if handles.iter().all(|h| h.is_finished()) {
                    break;
                }

                if let Some(tx) = &progress_tx {
                    if last_report.elapsed() >= config.report_interval {
                        let _ = tx.send(Progress::snapshot(
                            accounter.total_attempts(),
                            start_time.elapsed(),
                        ));
                        last_report = Instant::now();
                    }
                }

                thread::sleep(config.poll_interval);
            }

            let reason = accounter.stop_reason();
            let mut found = None;
            match reason {
                Some(StopReason::Found) => {
                    transition(state, SearchState::Found);
                    // Publication happens before the stop, so this only waits
                    // on a broken worker
                    found = slot.take(config.result_timeout);
                    if found.is_none() {
                        error!(
                            "search stopped as found but no result arrived within {:?}",
                            config.result_timeout
                        );
                        accounter.cancel();
                        drain(handles);
                        transition(state, SearchState::Drained);
                        return Err(SearchError::ResultMissing);
                    }
                }
                Some(StopReason::Aborted) => transition(state, SearchState::Aborted),
                None => debug!("every worker exited without a match"),
            }

            accounter.cancel();
            let failure = drain(handles);
            transition(state, SearchState::Drained);

            // A match published after an abort is still a match
            match found.or_else(|| slot.try_take()) {
                Some(keypair) => Ok(Some(keypair)),
                None if reason == Some(StopReason::Aborted) => Ok(None),
                None => Err(failure.unwrap_or(SearchError::ResultMissing)),
            }
        });

        let attempts = accounter.total_attempts();
        let elapsed = start_time.elapsed();
        if let Some(tx) = &progress_tx {
            let _ = tx.send(Progress::snapshot(attempts, elapsed));
        }

        match result? {
            Some(keypair) => {
                info!("found {} after {} attempts", keypair.public_key_hex(), attempts);
                Ok(SearchOutcome::Found(FoundKey {
                    keypair,
                    attempts,
                    elapsed,
                }))
            }
            None => {
                info!("search aborted after {} attempts", attempts);
                Ok(SearchOutcome::Aborted { attempts, elapsed })
            }
        }
    }
}

fn transition(state: &mut SearchState, next: SearchState) {
    debug!("search state {:?} -> {:?}", state, next);
    *state = next;
}

/// What became of a worker's match
#[derive(Debug, PartialEq, Eq)]
enum Claim {
    /// Published and stopped the search
    Won,
    /// Published, but the search had already been stopped
    AfterStop,
    /// Slot already held a result
    Discarded,
}

fn claim(
    publisher: &Publisher<Keypair>,
    accounter: &ProgressAccounter,
    keypair: Keypair,
) -> Claim {
    // The slot can be empty again once the coordinator has taken the winner,
    // so only the first stop counts as found
    if !publisher.publish(keypair) {
        Claim::Discarded
    } else if accounter.stop(StopReason::Found) {
        Claim::Won
    } else {
        Claim::AfterStop
    }
}

/// Stop and join the workers already running after a spawn error
fn spawn_failed(
    state: &mut SearchState,
    accounter: &ProgressAccounter,
    handles: Vec<ScopedJoinHandle<'_, Result<(), KeyError>>>,
    id: usize,
    e: io::Error,
) -> SearchError {
    error!("failed to spawn worker {}: {}", id, e);
    accounter.cancel();
    drain(handles);
    transition(state, SearchState::Drained);
    SearchError::Spawn(e)
}

/// Generate, match and count until cancelled or matched
fn worker<S: KeySource>(
    id: usize,
    source: &S,
    request: &SearchRequest,
    accounter: &ProgressAccounter,
    publisher: Publisher<Keypair>,
    batch_size: u64,
) -> Result<(), KeyError> {
    let mut local = accounter.local(batch_size);

    while !accounter.is_cancelled() {
        let keypair = source.generate()?;
        local.bump();

        if matches(&keypair.public_key, request) {
            // The winning attempt is counted before anyone sees the stop
            local.flush();
            match claim(&publisher, accounter, keypair) {
                Claim::Won => debug!("worker {} found a match", id),
                Claim::AfterStop => {
                    debug!("worker {} published a match after the search stopped", id)
                }
                Claim::Discarded => debug!("worker {} discarded a late match", id),
            }
            break;
        }
    }

    Ok(())
}

/// Join every worker, returning the first failure
fn drain(handles: Vec<ScopedJoinHandle<'_, Result<(), KeyError>>>) -> Option<SearchError> {
    let mut failure = None;

    for (id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => debug!("worker {} exited", id),
            Ok(Err(e)) => {
                warn!("worker {} aborted: {}", id, e);
                failure.get_or_insert(SearchError::RandomSource(e));
            }
            Err(_) => {
                error!("worker {} panicked", id);
                failure.get_or_insert(SearchError::WorkerPanicked);
            }
        }
    }

    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMode;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Every key matches "ab"; counts calls
    struct AlwaysMatch {
        calls: AtomicU64,
    }

    impl KeySource for AlwaysMatch {
        fn generate(&self) -> Result<Keypair, KeyError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            let mut private_key = [0u8; 32];
            private_key[24..].copy_from_slice(&n.to_be_bytes());
            let mut public_key = [0u8; 32];
            public_key[0] = 0xab;
            Ok(Keypair {
                private_key,
                public_key,
            })
        }
    }

    fn fast_config(workers: usize) -> SearchConfig {
        SearchConfig {
            poll_interval: Duration::from_millis(1),
            ..SearchConfig::with_workers(workers)
        }
    }

    #[test]
    fn test_state_walks_to_drained() {
        let request = SearchRequest::new("ab", SearchMode::Hex).unwrap();
        let mut coordinator = Coordinator::new(
            AlwaysMatch {
                calls: AtomicU64::new(0),
            },
            fast_config(1),
        );
        assert_eq!(coordinator.state(), SearchState::Idle);

        let outcome = coordinator.run(&request, None).unwrap();
        assert_eq!(coordinator.state(), SearchState::Drained);
        assert_eq!(outcome.attempts(), 1);
    }

    #[test]
    fn test_coordinator_runs_once() {
        let request = SearchRequest::new("ab", SearchMode::Hex).unwrap();
        let mut coordinator = Coordinator::new(
            AlwaysMatch {
                calls: AtomicU64::new(0),
            },
            fast_config(2),
        );
        coordinator.run(&request, None).unwrap();
        assert!(matches!(
            coordinator.run(&request, None),
            Err(SearchError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_spawn_failure_leaves_coordinator_drained() {
        let request = SearchRequest::new("ab", SearchMode::Hex).unwrap();
        let mut coordinator = Coordinator::new(
            AlwaysMatch {
                calls: AtomicU64::new(0),
            },
            fast_config(2),
        );

        let accounter = coordinator.accounter();
        let error = thread::scope(|s| {
            let handles = vec![s.spawn(|| Ok(()))];
            spawn_failed(
                &mut coordinator.state,
                &accounter,
                handles,
                1,
                io::Error::new(io::ErrorKind::OutOfMemory, "no threads left"),
            )
        });

        assert!(matches!(error, SearchError::Spawn(_)));
        assert!(accounter.is_cancelled());
        assert_eq!(coordinator.state(), SearchState::Drained);
        assert!(matches!(
            coordinator.run(&request, None),
            Err(SearchError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_only_first_claim_wins() {
        let slot = ResultSlot::new();
        let publisher = slot.publisher();
        let accounter = ProgressAccounter::new();
        let key = |tag| Keypair {
            private_key: [tag; 32],
            public_key: [0xab; 32],
        };

        assert_eq!(claim(&publisher, &accounter, key(1)), Claim::Won);
        assert_eq!(claim(&publisher, &accounter, key(2)), Claim::Discarded);

        // Once the winner is taken the slot accepts a late result again,
        // but the search is already stopped
        assert_eq!(slot.try_take(), Some(key(1)));
        assert_eq!(claim(&publisher, &accounter, key(3)), Claim::AfterStop);
        assert_eq!(accounter.stop_reason(), Some(StopReason::Found));
    }

    #[test]
    fn test_drain_reports_first_failure() {
        let failure = thread::scope(|s| {
            let handles = vec![
                s.spawn(|| Ok(())),
                s.spawn(|| Err(KeyError::RandomSource("entropy pool closed".into()))),
            ];
            drain(handles)
        });
        assert!(matches!(failure, Some(SearchError::RandomSource(_))));
    }
}
