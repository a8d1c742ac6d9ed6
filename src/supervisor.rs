//! Supervisor core — the root coordinator.
//!
//! Owns the project lock, the change monitor, the control channel, and the
//! current worker session. `start` acquires the lock (or degrades with an
//! "already running" warning), launches the worker, arms the monitor, binds
//! the control channel, registers termination-signal handlers, and enters a
//! single event loop in which commands, signals, file changes, and the
//! worker-exit poll interleave cooperatively. All mutation of the shared
//! resources happens inside this loop's command handlers, in arrival order.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::GlobalConfig;
use crate::ipc::channel::ControlChannel;
use crate::ipc::CommandToken;
use crate::lock::ProjectLock;
use crate::monitor::Monitor;
use crate::session::{SessionStatus, WorkerSession};
use crate::Result;

/// Supervisor lifecycle states.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SupervisorState {
    /// No lock held, no worker running.
    Stopped,
    /// Lock acquired, resources coming up.
    Starting,
    /// Event loop active, worker session live.
    Running,
    /// A worker-session recycle (reload or restart) is in progress.
    Reloading,
    /// Graceful shutdown in progress.
    Stopping,
}

impl SupervisorState {
    /// Lowercase wire/display name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Reloading => "reloading",
            Self::Stopping => "stopping",
        }
    }
}

/// Tri-state guard preventing overlapping reload cycles.
///
/// Requests that arrive while a cycle is in flight collapse into a single
/// pending follow-up, re-triggered once the settle window elapses — never
/// an unbounded queue.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum ReloadStatus {
    /// No reload in flight.
    #[default]
    Idle,
    /// A reload cycle is running (or settling).
    Running,
    /// A follow-up reload was requested during the in-flight cycle.
    Pending,
}

/// State machine driving [`ReloadStatus`].
#[derive(Debug, Default)]
pub struct ReloadGuard {
    status: ReloadStatus,
}

impl ReloadGuard {
    /// Create a guard in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reload request.
    ///
    /// Returns `true` when the caller should run a cycle now; `false` when
    /// the request was coalesced into the in-flight cycle.
    pub fn request(&mut self) -> bool {
        match self.status {
            ReloadStatus::Idle => {
                self.status = ReloadStatus::Running;
                true
            }
            ReloadStatus::Running | ReloadStatus::Pending => {
                self.status = ReloadStatus::Pending;
                false
            }
        }
    }

    /// Close the settle window of the current cycle.
    ///
    /// Returns `true` when a pending follow-up should run (the guard stays
    /// in `Running` for that cycle); `false` once the guard is idle again.
    pub fn settle(&mut self) -> bool {
        match self.status {
            ReloadStatus::Pending => {
                self.status = ReloadStatus::Running;
                true
            }
            ReloadStatus::Running | ReloadStatus::Idle => {
                self.status = ReloadStatus::Idle;
                false
            }
        }
    }

    /// Drop any in-flight or pending cycle.
    pub fn reset(&mut self) {
        self.status = ReloadStatus::Idle;
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ReloadStatus {
        self.status
    }
}

/// Shared snapshot served to IPC `status` queries.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Supervisor state name.
    pub state: String,
    /// Current worker-session id, when one is live.
    pub session_id: Option<String>,
    /// Current worker pid, when one is live.
    pub worker_pid: Option<u32>,
    /// RFC 3339 timestamp of the moment the supervisor entered `running`.
    pub started_at: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: SupervisorState::Stopped.as_str().to_owned(),
            session_id: None,
            worker_pid: None,
            started_at: None,
        }
    }
}

/// Shared handle to the status snapshot.
pub type StatusHandle = Arc<RwLock<StatusSnapshot>>;

/// File-change notifications routed out of the monitor callbacks.
#[derive(Debug)]
enum WatchEvent {
    Created(std::path::PathBuf),
    Modified(std::path::PathBuf),
    Deleted(std::path::PathBuf),
}

/// Events the supervisor posts to itself.
#[derive(Debug)]
enum InternalEvent {
    ReloadSettled,
}

/// The root coordinator.
pub struct Supervisor {
    config: Arc<GlobalConfig>,
    lock: ProjectLock,
    state: SupervisorState,
    reload: ReloadGuard,
    session: Option<WorkerSession>,
    respawn: bool,
    status: StatusHandle,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    internal_rx: Option<mpsc::UnboundedReceiver<InternalEvent>>,
}

impl Supervisor {
    /// Build a supervisor for the given configuration. Nothing is acquired
    /// or spawned until [`start`](Self::start).
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            lock: ProjectLock::new(&config.lock_path()),
            config,
            state: SupervisorState::Stopped,
            reload: ReloadGuard::new(),
            session: None,
            respawn: true,
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
            internal_tx,
            internal_rx: Some(internal_rx),
        }
    }

    /// Shared status snapshot, for observers and tests.
    #[must_use]
    pub fn status_handle(&self) -> StatusHandle {
        Arc::clone(&self.status)
    }

    /// Acquire ownership and run the event loop until stopped.
    ///
    /// When the lock is already held elsewhere this logs "already running"
    /// and returns normally — losing the ownership race is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal startup failures: the worker cannot be
    /// spawned, a watch entry is invalid, or the control channel cannot be
    /// bound. Failures after the loop is entered are logged and handled as
    /// state transitions instead.
    pub async fn start(mut self) -> Result<()> {
        if !self.lock.acquire_exclusive()? {
            warn!("the server is already running");
            return Ok(());
        }
        self.set_state(SupervisorState::Starting);

        let session = WorkerSession::launch(&self.config)?;
        self.record_session(&session);
        self.session = Some(session);

        let (mut monitor, mut watch_rx) = self.arm_monitor()?;

        let (channel, mut commands) =
            ControlChannel::create(&self.config.channel_name(), Arc::clone(&self.status))?;

        let mut signals = SignalStreams::register();

        let Some(mut internal_rx) = self.internal_rx.take() else {
            // `start` consumes self, so the receiver is always present.
            return Ok(());
        };

        self.set_state(SupervisorState::Running);
        info!(project = %self.config.project_root.display(), "procwarden started");

        let mut poll =
            tokio::time::interval(Duration::from_millis(self.config.timeouts.poll_interval_ms));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_command = commands.recv() => {
                    match maybe_command {
                        Some(CommandToken::Stop) => {
                            self.stop().await;
                            break;
                        }
                        Some(CommandToken::Reload) => self.reload().await,
                        Some(CommandToken::Restart) => self.restart().await,
                        None => {
                            warn!("control channel closed, shutting down");
                            self.stop().await;
                            break;
                        }
                    }
                }
                Some(event) = watch_rx.recv() => self.handle_change(event).await,
                Some(event) = internal_rx.recv() => {
                    match event {
                        InternalEvent::ReloadSettled => self.on_reload_settled().await,
                    }
                }
                signal_name = signals.recv() => {
                    info!(signal = signal_name, "termination signal received");
                    self.stop().await;
                    break;
                }
                _ = poll.tick() => {
                    monitor.tick();
                    self.poll_session();
                }
            }
        }

        channel.close();
        self.lock.release();
        info!("procwarden shut down");
        Ok(())
    }

    /// Build the change monitor from the configured watch entries.
    ///
    /// Invalid entries are fatal: watching a path that does not exist is a
    /// configuration error surfaced before the event loop is entered.
    fn arm_monitor(&self) -> Result<(Monitor, mpsc::UnboundedReceiver<WatchEvent>)> {
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        let mut monitor = Monitor::new();

        if self.config.watch.enabled && !self.config.watch.entries.is_empty() {
            for entry in &self.config.watch.entries {
                let path = self.config.resolve_watch_path(entry);
                monitor.add(&path, entry.ext.as_deref())?;
            }

            let tx = watch_tx.clone();
            monitor.on_create = Some(Box::new(move |path: &Path| {
                let _ = tx.send(WatchEvent::Created(path.to_path_buf()));
            }));
            let tx = watch_tx.clone();
            monitor.on_modify = Some(Box::new(move |path: &Path| {
                let _ = tx.send(WatchEvent::Modified(path.to_path_buf()));
            }));
            let tx = watch_tx;
            monitor.on_delete = Some(Box::new(move |path: &Path| {
                let _ = tx.send(WatchEvent::Deleted(path.to_path_buf()));
            }));

            info!(
                entries = self.config.watch.entries.len(),
                files = monitor.tracked_files(),
                "change monitor armed"
            );
        }

        Ok((monitor, watch_rx))
    }

    /// Route a detected file change: modifications reload, structural
    /// changes (create/delete) restart.
    async fn handle_change(&mut self, event: WatchEvent) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        match event {
            WatchEvent::Modified(path) => {
                info!("[{stamp}] {} has been modified", self.relative(&path));
                self.reload().await;
            }
            WatchEvent::Created(path) => {
                info!("[{stamp}] {} has been created", self.relative(&path));
                self.restart().await;
            }
            WatchEvent::Deleted(path) => {
                info!("[{stamp}] {} has been removed", self.relative(&path));
                self.restart().await;
            }
        }
    }

    /// Recycle the worker session with coalescing.
    async fn reload(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        if !self.reload.request() {
            debug!("reload already in flight, coalescing");
            return;
        }
        self.run_reload_cycle().await;
    }

    /// One reload cycle: launch the replacement first, then stop the old
    /// session, so in-flight work is handed off rather than dropped.
    async fn run_reload_cycle(&mut self) {
        self.set_state(SupervisorState::Reloading);

        match WorkerSession::launch(&self.config) {
            Ok(new_session) => {
                self.record_session(&new_session);
                let old = self.session.replace(new_session);
                if let Some(mut old) = old {
                    old.graceful_stop(&self.config.timeouts).await;
                }
                info!("worker session reloaded");
            }
            Err(err) => {
                error!(%err, "reload failed to launch replacement worker, keeping current session");
            }
        }

        self.set_state(SupervisorState::Running);

        let settle = Duration::from_millis(self.config.timeouts.reload_settle_ms);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let _ = tx.send(InternalEvent::ReloadSettled);
        });
    }

    /// Settle-window expiry: run the single coalesced follow-up, if any.
    async fn on_reload_settled(&mut self) {
        if self.reload.settle() {
            if self.state != SupervisorState::Running {
                self.reload.reset();
                return;
            }
            self.run_reload_cycle().await;
        }
    }

    /// Stop the current worker session and launch a fresh one. The lock
    /// and the control channel are untouched.
    async fn restart(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        self.set_state(SupervisorState::Reloading);

        let respawn_was_armed = self.respawn;
        self.respawn = false;
        if let Some(mut old) = self.session.take() {
            old.graceful_stop(&self.config.timeouts).await;
        }

        match WorkerSession::launch(&self.config) {
            Ok(session) => {
                self.record_session(&session);
                self.session = Some(session);
                info!("worker session restarted");
            }
            Err(err) => {
                error!(%err, "restart failed to launch new worker");
            }
        }

        self.respawn = respawn_was_armed;
        self.set_state(SupervisorState::Running);
    }

    /// Graceful shutdown. Idempotent: a signal racing a command-driven
    /// stop finds the state already `Stopping` and returns.
    async fn stop(&mut self) {
        if matches!(self.state, SupervisorState::Stopping | SupervisorState::Stopped) {
            return;
        }
        self.set_state(SupervisorState::Stopping);
        self.respawn = false;

        if let Some(mut session) = self.session.take() {
            session.graceful_stop(&self.config.timeouts).await;
        }

        self.set_state(SupervisorState::Stopped);
    }

    /// Worker-exit check, driven by the poll interval. While the respawn
    /// hook is armed, an exited worker is relaunched with the same startup
    /// payload on the tick that observes the exit.
    fn poll_session(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.status() == SessionStatus::Running {
            return;
        }

        let session_id = session.id().to_owned();
        let status_text = session.exit_status_text();

        if !self.respawn {
            info!(session_id = %session_id, status = %status_text, "worker exited");
            self.session = None;
            return;
        }

        warn!(
            session_id = %session_id,
            status = %status_text,
            "worker exited unexpectedly, relaunching"
        );
        match WorkerSession::launch(&self.config) {
            Ok(new_session) => {
                self.record_session(&new_session);
                self.session = Some(new_session);
            }
            Err(err) => {
                error!(%err, "failed to relaunch worker, retrying on next tick");
            }
        }
    }

    fn set_state(&mut self, state: SupervisorState) {
        self.state = state;
        let mut snapshot = self
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshot.state = state.as_str().to_owned();
        match state {
            SupervisorState::Running if snapshot.started_at.is_none() => {
                snapshot.started_at = Some(chrono::Local::now().to_rfc3339());
            }
            SupervisorState::Stopped => {
                snapshot.session_id = None;
                snapshot.worker_pid = None;
            }
            _ => {}
        }
    }

    fn record_session(&self, session: &WorkerSession) {
        let mut snapshot = self
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshot.session_id = Some(session.id().to_owned());
        snapshot.worker_pid = session.pid();
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.config.project_root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Termination-signal streams, registered via a capability probe.
///
/// Registration failure is not fatal: a warning is emitted and shutdown
/// control reverts to the channel-command path alone.
#[cfg(unix)]
struct SignalStreams {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
    quit: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl SignalStreams {
    fn register() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let mut register_kind = |kind: SignalKind, name: &str| match signal(kind) {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!(
                    %err,
                    signal = name,
                    "failed to register signal handler, relying on control channel"
                );
                None
            }
        };

        Self {
            interrupt: register_kind(SignalKind::interrupt(), "SIGINT"),
            terminate: register_kind(SignalKind::terminate(), "SIGTERM"),
            quit: register_kind(SignalKind::quit(), "SIGQUIT"),
        }
    }

    async fn recv(&mut self) -> &'static str {
        async fn wait_for(stream: &mut Option<tokio::signal::unix::Signal>) {
            match stream {
                Some(stream) => {
                    if stream.recv().await.is_none() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        }

        tokio::select! {
            () = wait_for(&mut self.interrupt) => "SIGINT",
            () = wait_for(&mut self.terminate) => "SIGTERM",
            () = wait_for(&mut self.quit) => "SIGQUIT",
        }
    }
}

/// Termination-signal stream for non-Unix platforms: ctrl-c only.
#[cfg(not(unix))]
struct SignalStreams;

#[cfg(not(unix))]
impl SignalStreams {
    fn register() -> Self {
        Self
    }

    async fn recv(&mut self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}
