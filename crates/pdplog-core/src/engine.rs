//! Sampling engine: the heart of pdplog.
//!
//! `SamplingEngine::new()` builds a dedicated tokio runtime. `start()` opens a
//! fresh log file and spawns the sampling loop on that runtime; the loop owns
//! the sampler and the sink for the whole session and hands the sampler back
//! when it exits. `stop()` cancels the loop and waits for it, so once it
//! returns the file is flushed and closed.
//!
//! `start` and `stop` are serialized through one mutex, which is held while a
//! session is launched or joined. The period can be changed at any time.
//! Both may be called from inside another tokio runtime; the join then runs
//! on a short-lived helper thread.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use tokio::runtime::{Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{clamp_period_ms, LoggerConfig};
use crate::encoder::RecordEncoder;
use crate::error::{LoggerError, Result};
use crate::models::{EngineState, SessionEnd, SessionSummary};
use crate::naming::{self, IdentifierProvider};
use crate::sampler::{ChannelSampler, PowerDistribution};
use crate::sink::BufferedLogSink;

/// Periodically samples a power distribution device into a CSV log.
pub struct SamplingEngine<D: PowerDistribution + 'static> {
    directory: PathBuf,
    max_channel: usize,
    encoder: RecordEncoder,
    buffer_capacity: usize,
    period_ms: Arc<AtomicU64>,
    identifier: Box<dyn IdentifierProvider>,
    /// Creates session files. Never truncates an existing file.
    open_sink: fn(&Path, usize) -> Result<BufferedLogSink>,
    lifecycle: Mutex<Lifecycle<D>>,
    /// Taken and shut down in the background on drop.
    runtime: Option<Runtime>,
}

struct Lifecycle<D> {
    /// Present while idle; moved into the loop while a session runs.
    sampler: Option<ChannelSampler<D>>,
    session: Option<ActiveSession<D>>,
    /// Set when a loop panicked and took the sampler down with it.
    fault: Option<String>,
}

struct ActiveSession<D> {
    path: PathBuf,
    started_at: NaiveDateTime,
    cancel: CancellationToken,
    handle: JoinHandle<LoopExit<D>>,
}

/// What the sampling loop returns when it exits.
struct LoopExit<D> {
    sampler: ChannelSampler<D>,
    records: u64,
    end: SessionEnd,
}

impl<D: PowerDistribution + 'static> SamplingEngine<D> {
    /// Validate the log directory, read the device's channel count, and build
    /// the background runtime. No file is opened until [`start`](Self::start).
    pub fn new<I>(config: LoggerConfig, device: D, identifier: I) -> Result<Self>
    where
        I: IdentifierProvider + 'static,
    {
        let directory = config.resolve_directory()?;
        let sampler = ChannelSampler::new(device)?;
        let max_channel = sampler.max_channel();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pdplog-sampler")
            .enable_all()
            .build()
            .map_err(|e| LoggerError::Worker(e.to_string()))?;

        info!(
            dir = %directory.display(),
            max_channel,
            period_ms = config.effective_period_ms(),
            "SamplingEngine initialized"
        );

        Ok(Self {
            directory,
            max_channel,
            encoder: RecordEncoder::new(config.channels),
            buffer_capacity: config.effective_buffer_capacity(),
            period_ms: Arc::new(AtomicU64::new(config.effective_period_ms())),
            identifier: Box::new(identifier),
            open_sink: BufferedLogSink::create_new_with_capacity,
            lifecycle: Mutex::new(Lifecycle {
                sampler: Some(sampler),
                session: None,
                fault: None,
            }),
            runtime: Some(runtime),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Highest channel index sampled, fixed at construction.
    pub fn max_channel(&self) -> usize {
        self.max_channel
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms.load(Ordering::Relaxed)
    }

    /// Change the polling period. Values below 25 ms are raised to 25 ms.
    /// A running session picks the new period up on its next tick.
    pub fn set_period_ms(&self, period_ms: u64) {
        self.period_ms
            .store(clamp_period_ms(period_ms), Ordering::Relaxed);
    }

    pub fn state(&self) -> EngineState {
        let lifecycle = self.lock();
        match &lifecycle.session {
            Some(session) if !session.handle.is_finished() => EngineState::Running,
            _ => EngineState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Log file of the running session, or of the last one not yet reaped.
    pub fn session_path(&self) -> Option<PathBuf> {
        self.lock().session.as_ref().map(|s| s.path.clone())
    }

    /// Open a new log file and start sampling into it.
    ///
    /// Returns `Ok(false)` without doing anything if a session is already
    /// running. A session that ended itself is reaped first. If the file name
    /// for this second is taken, start waits for the next second.
    pub fn start(&self) -> Result<bool> {
        let mut lifecycle = self.lock();
        if let Some(fault) = &lifecycle.fault {
            return Err(LoggerError::Worker(format!(
                "engine unusable after sampling loop panic: {fault}"
            )));
        }

        if let Some(session) = &lifecycle.session {
            if !session.handle.is_finished() {
                debug!(path = %session.path.display(), "start ignored: already running");
                return Ok(false);
            }
        }
        if let Some(session) = lifecycle.session.take() {
            let summary = self.reap(&mut lifecycle, session)?;
            debug!(path = %summary.path.display(), "reaped finished session");
        }

        let runtime = self.runtime()?;
        let identifier = self.identifier.identifier()?;
        let (path, started_at, sink) = self.open_session_file(&identifier)?;

        let sampler = lifecycle.sampler.take().ok_or_else(|| {
            LoggerError::Worker("sampler lost by a previous session".to_string())
        })?;
        let cancel = CancellationToken::new();
        let handle = runtime.spawn(sampling_loop(
            sampler,
            sink,
            self.encoder,
            Arc::clone(&self.period_ms),
            cancel.clone(),
        ));

        info!(
            path = %path.display(),
            period_ms = self.period_ms(),
            channels = self.max_channel + 1,
            "logging session started"
        );
        lifecycle.session = Some(ActiveSession {
            path,
            started_at,
            cancel,
            handle,
        });
        Ok(true)
    }

    /// Stop the running session and close its file.
    ///
    /// Blocks until the loop has exited, at most about one period plus one
    /// tick of work. Returns `None` when there was no session to stop.
    pub fn stop(&self) -> Result<Option<SessionSummary>> {
        let mut lifecycle = self.lock();
        let Some(session) = lifecycle.session.take() else {
            debug!("stop ignored: no session");
            return Ok(None);
        };
        session.cancel.cancel();
        self.reap(&mut lifecycle, session).map(Some)
    }

    /// Create the session file, retrying once per second while the name is
    /// taken by an earlier session.
    fn open_session_file(
        &self,
        identifier: &str,
    ) -> Result<(PathBuf, NaiveDateTime, BufferedLogSink)> {
        let mut retries = 0;
        loop {
            let started_at = Local::now().naive_local();
            let path = naming::log_file_name(&self.directory, identifier, started_at);
            match (self.open_sink)(&path, self.buffer_capacity) {
                Ok(sink) => return Ok((path, started_at, sink)),
                Err(LoggerError::Write { source, .. })
                    if source.kind() == ErrorKind::AlreadyExists && retries < 2 =>
                {
                    retries += 1;
                    debug!(path = %path.display(), "log file exists, waiting for the next second");
                    let into_second = u64::from(started_at.nanosecond() % 1_000_000_000);
                    thread::sleep(
                        Duration::from_secs(1).saturating_sub(Duration::from_nanos(into_second)),
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for a session's loop to exit and take the sampler back.
    fn reap(
        &self,
        lifecycle: &mut Lifecycle<D>,
        session: ActiveSession<D>,
    ) -> Result<SessionSummary> {
        let (records, end) = match self.join(session.handle)? {
            Ok(exit) => {
                lifecycle.sampler = Some(exit.sampler);
                (exit.records, exit.end)
            }
            Err(e) => {
                let reason = format!("sampling loop aborted: {e}");
                error!(path = %session.path.display(), "{}", reason);
                lifecycle.fault = Some(reason.clone());
                (0, SessionEnd::Failed(LoggerError::Worker(reason)))
            }
        };

        let summary = SessionSummary {
            path: session.path,
            started_at: session.started_at,
            records,
            end,
        };
        match &summary.end {
            SessionEnd::Stopped => info!(
                path = %summary.path.display(),
                records = summary.records,
                "logging session stopped"
            ),
            SessionEnd::Failed(e) => warn!(
                path = %summary.path.display(),
                records = summary.records,
                "logging session had ended itself: {}",
                e
            ),
        }
        Ok(summary)
    }

    fn join(
        &self,
        handle: JoinHandle<LoopExit<D>>,
    ) -> Result<std::result::Result<LoopExit<D>, JoinError>> {
        let runtime = self.runtime()?;
        if Handle::try_current().is_err() {
            return Ok(runtime.block_on(handle));
        }
        // A thread already driving a runtime may not block on another one.
        thread::scope(|scope| scope.spawn(move || runtime.block_on(handle)).join())
            .map_err(|_| LoggerError::Worker("join thread panicked".to_string()))
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| LoggerError::Worker("runtime already shut down".to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle<D>> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: PowerDistribution + 'static> Drop for SamplingEngine<D> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("failed to stop logging session on drop: {}", e);
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// ─── Sampling loop ───────────────────────────────────────────────────────────

async fn sampling_loop<D: PowerDistribution>(
    mut sampler: ChannelSampler<D>,
    mut sink: BufferedLogSink,
    encoder: RecordEncoder,
    period_ms: Arc<AtomicU64>,
    cancel: CancellationToken,
) -> LoopExit<D> {
    let mut end = loop {
        if cancel.is_cancelled() {
            break SessionEnd::Stopped;
        }
        let tick_started = Instant::now();
        let sampled_at = Local::now().naive_local();

        let reading = match sampler.sample() {
            Ok(reading) => reading,
            Err(e) => {
                error!(path = %sink.path().display(), "sampling failed, ending session: {}", e);
                break SessionEnd::Failed(e);
            }
        };
        let record = encoder.encode(sampled_at, &reading);
        if let Err(e) = sink.append(&record) {
            error!("log write failed, ending session: {}", e);
            break SessionEnd::Failed(e);
        }

        let deadline = tick_started + Duration::from_millis(period_ms.load(Ordering::Relaxed));
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break SessionEnd::Stopped,
            _ = sleep_until(deadline) => {}
        }
    };

    if let Err(e) = sink.close() {
        error!("failed to close log file: {}", e);
        if !end.is_failure() {
            end = SessionEnd::Failed(e);
        }
    }

    LoopExit {
        sampler,
        records: sink.records(),
        end,
    }
}
