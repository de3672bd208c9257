// NetGather - app/executor.rs
//
// Runs one command against many targets with a bounded worker pool.
//
// Architecture:
//   - A rayon pool of `workers` threads; each work unit is one target.
//     Splitting is forced down to single targets so an idle worker can
//     steal any target still queued behind a hung one.
//   - Each invocation runs on its own short-lived thread and the worker
//     waits at most `timeout` for its answer, so a hung device costs one
//     worker slot for `timeout` and nothing more.
//   - Every target yields exactly one `ExecutionResult`, published as a
//     `CollectionEvent::TargetCompleted` on the channel. The consumer on
//     the other end owns all downstream state.
//   - A shared cancel flag is checked before each target starts; targets
//     not yet started are reported as `Cancelled`.

use crate::app::session::{Credentials, SessionProvider, SessionRequest};
use crate::core::model::{CollectionEvent, ExecutionResult, SessionFailure, Target};
use crate::util::constants;
use crate::util::error::CollectError;
use crate::util::logging;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum sessions in flight.
    pub workers: usize,

    /// Per-target budget covering connect, paging priming, and the command.
    pub timeout: Duration,

    /// Target type passed to the provider and used for template lookup.
    pub device_type: String,

    /// Send the paging-disable command before the target command.
    pub disable_paging: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: constants::DEFAULT_WORKERS,
            timeout: Duration::from_secs(constants::DEFAULT_TIMEOUT_SECS),
            device_type: constants::DEFAULT_DEVICE_TYPE.to_string(),
            disable_paging: true,
        }
    }
}

/// Completed/total counter, safe to read from any thread while a run is live.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Bump the counter and return the new completed count.
    fn complete_one(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }
}

/// Dispatches session invocations across a bounded pool.
pub struct Executor {
    provider: Arc<dyn SessionProvider>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(provider: Arc<dyn SessionProvider>, config: ExecutorConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `command` on every target, publishing events on `tx`.
    ///
    /// Blocks until every target has produced its result. Fails only when
    /// the run cannot start: no targets, an empty command, or a pool that
    /// cannot be built. Returns the wall-clock duration of the run.
    pub fn run(
        &self,
        targets: Vec<Target>,
        command: &str,
        credentials: &Credentials,
        tx: mpsc::Sender<CollectionEvent>,
        cancel: Arc<AtomicBool>,
        progress: Arc<Progress>,
    ) -> Result<Duration, CollectError> {
        if targets.is_empty() {
            return Err(CollectError::NoTargets);
        }
        let command = command.trim();
        if command.is_empty() {
            return Err(CollectError::EmptyCommand);
        }

        let workers = self
            .config
            .workers
            .clamp(constants::MIN_WORKERS, constants::MAX_WORKERS);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("netgather-worker-{i}"))
            .build()
            .map_err(|e| CollectError::PoolBuild { source: e })?;

        let total = targets.len();
        progress.reset(total);
        let started = Instant::now();

        tracing::info!(
            targets = total,
            workers,
            timeout_secs = self.config.timeout.as_secs(),
            provider = self.provider.name(),
            device_type = %self.config.device_type,
            command,
            "Collection started"
        );
        // Receiver gone means nobody is listening; results are still counted.
        let _ = tx.send(CollectionEvent::Started { total });

        pool.install(|| {
            targets
                .into_par_iter()
                .with_max_len(1)
                .for_each_with(tx.clone(), |tx, target| {
                    let result = if cancel.load(Ordering::SeqCst) {
                        tracing::debug!(target = %target, "Skipped after cancel");
                        ExecutionResult::failure(target, SessionFailure::cancelled(), Duration::ZERO)
                    } else {
                        self.run_one(target, command, credentials)
                    };
                    let completed = progress.complete_one();
                    let _ = tx.send(CollectionEvent::TargetCompleted {
                        result,
                        completed,
                        total,
                    });
                });
        });

        let duration = started.elapsed();
        tracing::info!(
            targets = total,
            duration_ms = duration.as_millis() as u64,
            "Collection finished"
        );
        let _ = tx.send(CollectionEvent::Finished { duration });
        Ok(duration)
    }

    /// Blocking convenience: run and return the results in completion order.
    pub fn run_collect(
        &self,
        targets: Vec<Target>,
        command: &str,
        credentials: &Credentials,
    ) -> Result<Vec<ExecutionResult>, CollectError> {
        let (tx, rx) = mpsc::channel();
        self.run(
            targets,
            command,
            credentials,
            tx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(Progress::new()),
        )?;
        Ok(rx
            .try_iter()
            .filter_map(|event| match event {
                CollectionEvent::TargetCompleted { result, .. } => Some(result),
                _ => None,
            })
            .collect())
    }

    /// One target: open, prime, run, all bounded by the per-target timeout.
    fn run_one(&self, target: Target, command: &str, credentials: &Credentials) -> ExecutionResult {
        let timeout = self.config.timeout;
        let started = Instant::now();
        let request = SessionRequest {
            target: target.clone(),
            credentials: credentials.clone(),
            device_type: self.config.device_type.clone(),
            timeout,
        };

        let (result_tx, result_rx) = mpsc::channel();
        let provider = Arc::clone(&self.provider);
        let command_owned = command.to_string();
        let disable_paging = self.config.disable_paging;

        let spawned = std::thread::Builder::new()
            .name(format!("netgather-session-{}", target.index))
            .spawn(move || {
                let _ = result_tx.send(invoke(
                    provider.as_ref(),
                    &request,
                    &command_owned,
                    disable_paging,
                ));
            });
        if let Err(e) = spawned {
            return ExecutionResult::failure(
                target,
                SessionFailure::unknown(format!("could not start session thread: {e}")),
                started.elapsed(),
            );
        }

        let outcome = match result_rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    target = %target,
                    timeout_secs = timeout.as_secs(),
                    "Target timed out"
                );
                Err(SessionFailure::timeout(timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SessionFailure::unknown(
                "session thread ended without a result",
            )),
        };

        let elapsed = started.elapsed();
        match outcome {
            Ok(output) => {
                tracing::debug!(
                    target = %target,
                    bytes = output.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Target completed"
                );
                ExecutionResult::success(target, output, elapsed)
            }
            Err(failure) => {
                tracing::debug!(target = %target, failure = %failure, "Target failed");
                ExecutionResult::failure(target, failure, elapsed)
            }
        }
    }
}

/// Runs on the per-invocation thread.
fn invoke(
    provider: &dyn SessionProvider,
    request: &SessionRequest,
    command: &str,
    disable_paging: bool,
) -> Result<String, SessionFailure> {
    let mut session = provider.open(request)?;
    if disable_paging {
        if let Err(failure) = session.disable_paging() {
            tracing::debug!(
                target = %request.target,
                failure = %failure,
                "Paging priming failed; continuing"
            );
        }
    }
    let output = session.send_command(command, request.timeout)?;
    if let Some(first) = output.lines().next() {
        tracing::trace!(target = %request.target, first_line = logging::preview(first), "Output received");
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::session::Session;
    use crate::core::corpus::{corpus_from_results, CorpusOptions};
    use crate::core::model::FailureKind;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::thread;

    /// What a scripted host does when asked to run the command.
    #[derive(Clone)]
    enum Script {
        Output(&'static str),
        Hang(Duration),
        Fail(SessionFailure),
        RefuseOpen(SessionFailure),
    }

    struct ScriptedProvider {
        scripts: HashMap<&'static str, Script>,
        primed: Arc<Mutex<Vec<String>>>,
        paging_fails: bool,
    }

    impl ScriptedProvider {
        fn new(scripts: &[(&'static str, Script)]) -> Self {
            Self {
                scripts: scripts.iter().cloned().collect(),
                primed: Arc::new(Mutex::new(Vec::new())),
                paging_fails: false,
            }
        }
    }

    struct ScriptedSession {
        host: String,
        script: Script,
        primed: Arc<Mutex<Vec<String>>>,
        paging_fails: bool,
    }

    impl Session for ScriptedSession {
        fn disable_paging(&mut self) -> Result<(), SessionFailure> {
            self.primed.lock().unwrap().push(self.host.clone());
            if self.paging_fails {
                return Err(SessionFailure::unknown("paging rejected"));
            }
            Ok(())
        }

        fn send_command(&mut self, _command: &str, _timeout: Duration) -> Result<String, SessionFailure> {
            match &self.script {
                Script::Output(text) => Ok(text.to_string()),
                Script::Hang(d) => {
                    thread::sleep(*d);
                    Ok("too late".to_string())
                }
                Script::Fail(f) => Err(f.clone()),
                Script::RefuseOpen(_) => unreachable!(),
            }
        }
    }

    impl SessionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn open(&self, request: &SessionRequest) -> Result<Box<dyn Session>, SessionFailure> {
            let script = self
                .scripts
                .get(request.target.host.as_str())
                .cloned()
                .unwrap_or(Script::Fail(SessionFailure::transport("no route to host")));
            if let Script::RefuseOpen(f) = script {
                return Err(f);
            }
            Ok(Box::new(ScriptedSession {
                host: request.target.host.clone(),
                script,
                primed: Arc::clone(&self.primed),
                paging_fails: self.paging_fails,
            }))
        }
    }

    fn targets(hosts: &[&str]) -> Vec<Target> {
        hosts.iter().enumerate().map(|(i, h)| Target::new(i, *h)).collect()
    }

    fn executor(provider: ScriptedProvider, workers: usize, timeout: Duration) -> Executor {
        Executor::new(
            Arc::new(provider),
            ExecutorConfig {
                workers,
                timeout,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_one_result_per_target_including_duplicates() {
        for workers in [1, 2, 8] {
            let provider = ScriptedProvider::new(&[("r1", Script::Output("a\nb"))]);
            let exec = executor(provider, workers, Duration::from_secs(5));
            let results = exec
                .run_collect(targets(&["r1", "r1", "r2", "r1"]), "show version", &Credentials::default())
                .unwrap();
            assert_eq!(results.len(), 4);
            assert_eq!(results.iter().filter(|r| r.is_success()).count(), 3);
        }
    }

    #[test]
    fn test_scenario_two_successes_one_timeout() {
        let provider = ScriptedProvider::new(&[
            ("r1", Script::Output("l1\nl2\nl3")),
            ("r2", Script::Hang(Duration::from_secs(3))),
            ("r3", Script::Output("a\nb\nc\nd\ne")),
        ]);
        let exec = executor(provider, 3, Duration::from_millis(300));

        let (tx, rx) = mpsc::channel();
        let progress = Arc::new(Progress::new());
        let started = Instant::now();
        exec.run(
            targets(&["r1", "r2", "r3"]),
            "show ip int brief",
            &Credentials::default(),
            tx,
            Arc::new(AtomicBool::new(false)),
            Arc::clone(&progress),
        )
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        let results: Vec<ExecutionResult> = rx
            .try_iter()
            .filter_map(|e| match e {
                CollectionEvent::TargetCompleted { result, .. } => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);
        let timed_out: Vec<_> = results
            .iter()
            .filter_map(|r| r.failure_reason().map(|f| (r.target.host.as_str(), f.kind)))
            .collect();
        assert_eq!(timed_out, vec![("r2", FailureKind::Timeout)]);

        let corpus = corpus_from_results(&results, CorpusOptions::default(), Utc::now());
        assert_eq!(corpus.len(), 8);
        assert_eq!(progress.completed(), 3);
        assert_eq!(progress.total(), 3);
    }

    #[test]
    fn test_hung_target_does_not_hold_back_its_neighbours() {
        let hosts = ["slow", "f1", "f2", "f3", "f4", "f5", "f6", "f7"];
        let mut scripts = vec![("slow", Script::Hang(Duration::from_secs(3)))];
        scripts.extend(hosts[1..].iter().map(|h| (*h, Script::Output("ok"))));
        let timeout = Duration::from_millis(800);
        let exec = executor(ScriptedProvider::new(&scripts), 2, timeout);

        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        let watcher = thread::spawn(move || {
            let mut done = Vec::new();
            for event in rx {
                if let CollectionEvent::TargetCompleted { result, .. } = event {
                    done.push((result.target.host, started.elapsed()));
                }
            }
            done
        });
        exec.run(
            targets(&hosts),
            "show clock",
            &Credentials::default(),
            tx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(Progress::new()),
        )
        .unwrap();
        let done = watcher.join().unwrap();

        assert_eq!(done.len(), hosts.len());
        for (host, at) in &done {
            if host == "slow" {
                assert!(*at >= timeout);
            } else {
                assert!(*at < timeout / 2, "{host} finished at {at:?}");
            }
        }
    }

    #[test]
    fn test_failures_are_classified_and_isolated() {
        let provider = ScriptedProvider::new(&[
            ("auth", Script::RefuseOpen(SessionFailure::authentication())),
            ("gone", Script::RefuseOpen(SessionFailure::unavailable("ssh not installed"))),
            ("weird", Script::Fail(SessionFailure::unknown("channel closed"))),
            ("ok", Script::Output("fine")),
        ]);
        let exec = executor(provider, 2, Duration::from_secs(5));
        let results = exec
            .run_collect(targets(&["auth", "gone", "weird", "ok"]), "show clock", &Credentials::default())
            .unwrap();
        let kind = |host: &str| {
            results
                .iter()
                .find(|r| r.target.host == host)
                .and_then(|r| r.failure_reason().map(|f| f.kind))
        };
        assert_eq!(kind("auth"), Some(FailureKind::Authentication));
        assert_eq!(kind("gone"), Some(FailureKind::TransportUnavailable));
        assert_eq!(kind("weird"), Some(FailureKind::Unknown));
        assert_eq!(kind("ok"), None);
    }

    #[test]
    fn test_paging_failure_is_swallowed() {
        let mut provider = ScriptedProvider::new(&[("r1", Script::Output("x"))]);
        provider.paging_fails = true;
        let primed = Arc::clone(&provider.primed);
        let exec = executor(provider, 1, Duration::from_secs(5));
        let results = exec
            .run_collect(targets(&["r1"]), "show clock", &Credentials::default())
            .unwrap();
        assert!(results[0].is_success());
        assert_eq!(*primed.lock().unwrap(), vec!["r1".to_string()]);
    }

    #[test]
    fn test_cancel_before_start_reports_cancelled() {
        let provider = ScriptedProvider::new(&[("r1", Script::Output("x"))]);
        let exec = executor(provider, 1, Duration::from_secs(5));
        let (tx, rx) = mpsc::channel();
        exec.run(
            targets(&["r1", "r1"]),
            "show clock",
            &Credentials::default(),
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(Progress::new()),
        )
        .unwrap();
        let kinds: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                CollectionEvent::TargetCompleted { result, .. } => {
                    result.failure_reason().map(|f| f.kind)
                }
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![FailureKind::Cancelled, FailureKind::Cancelled]);
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        let exec = executor(ScriptedProvider::new(&[]), 1, Duration::from_secs(5));
        assert!(matches!(
            exec.run_collect(Vec::new(), "show clock", &Credentials::default()),
            Err(CollectError::NoTargets)
        ));
        assert!(matches!(
            exec.run_collect(targets(&["r1"]), "   ", &Credentials::default()),
            Err(CollectError::EmptyCommand)
        ));
    }

    #[test]
    fn test_events_bracket_the_run() {
        let exec = executor(ScriptedProvider::new(&[("r1", Script::Output("x"))]), 1, Duration::from_secs(5));
        let (tx, rx) = mpsc::channel();
        exec.run(
            targets(&["r1"]),
            "show clock",
            &Credentials::default(),
            tx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(Progress::new()),
        )
        .unwrap();
        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(CollectionEvent::Started { total: 1 })));
        assert!(matches!(
            events.get(1),
            Some(CollectionEvent::TargetCompleted { completed: 1, total: 1, .. })
        ));
        assert!(matches!(events.last(), Some(CollectionEvent::Finished { .. })));
    }
}
