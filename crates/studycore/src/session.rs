use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audit::SecurityEventType;
use crate::monitor::{SecurityMonitor, UserNotice};

pub type SignOutFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// External session-termination action; the core triggers it, the host
/// application implements it.
pub trait SignOut: Send + Sync {
    fn sign_out(&self) -> SignOutFuture<'_>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    WarningIssued,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    WarningDue,
    ExpiryDue,
}

/// Inactivity timeout as an explicit state machine: a single reference
/// instant (the last tracked activity) and one recomputed deadline, instead
/// of a pair of ad-hoc timers per interaction. `poll` fires each signal at
/// most once; `Expired` is terminal and a fresh login builds a new machine.
#[derive(Debug)]
pub struct SessionTimeout {
    last_activity: Instant,
    phase: SessionPhase,
    warning_after: Duration,
    expire_after: Duration,
}

impl SessionTimeout {
    pub fn new(now: Instant, warning_after: Duration, expire_after: Duration) -> Self {
        Self {
            last_activity: now,
            phase: SessionPhase::Active,
            warning_after,
            expire_after,
        }
    }

    /// Any tracked interaction resets the reference point, so only the last
    /// interaction's deadlines matter. A no-op once expired.
    pub fn record_activity(&mut self, now: Instant) {
        if self.phase == SessionPhase::Expired {
            return;
        }
        self.last_activity = now;
        self.phase = SessionPhase::Active;
    }

    pub fn poll(&mut self, now: Instant) -> Option<SessionSignal> {
        match self.phase {
            SessionPhase::Active => {
                if now >= self.last_activity + self.warning_after {
                    self.phase = SessionPhase::WarningIssued;
                    return Some(SessionSignal::WarningDue);
                }
                None
            }
            SessionPhase::WarningIssued => {
                if now >= self.last_activity + self.expire_after {
                    self.phase = SessionPhase::Expired;
                    return Some(SessionSignal::ExpiryDue);
                }
                None
            }
            SessionPhase::Expired => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            SessionPhase::Active => Some(self.last_activity + self.warning_after),
            SessionPhase::WarningIssued => Some(self.last_activity + self.expire_after),
            SessionPhase::Expired => None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

struct WatcherInner {
    machine: Mutex<SessionTimeout>,
    activity: Notify,
    shutdown: Notify,
}

impl WatcherInner {
    fn lock_machine(&self) -> std::sync::MutexGuard<'_, SessionTimeout> {
        match self.machine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Async driver for `SessionTimeout`: one task owns one cancellable sleep.
/// The task re-reads the deadline under the lock after every wakeup, so an
/// activity-driven reschedule can never interleave with a firing.
pub struct SessionWatcher {
    inner: Arc<WatcherInner>,
    handle: JoinHandle<()>,
}

impl SessionWatcher {
    pub fn spawn(
        user_id: Option<String>,
        warning_after: Duration,
        expire_after: Duration,
        monitor: SecurityMonitor,
        sign_out: Arc<dyn SignOut>,
    ) -> Self {
        let inner = Arc::new(WatcherInner {
            machine: Mutex::new(SessionTimeout::new(Instant::now(), warning_after, expire_after)),
            activity: Notify::new(),
            shutdown: Notify::new(),
        });
        let handle = tokio::spawn(run(inner.clone(), user_id, monitor, sign_out));
        Self { inner, handle }
    }

    /// Reports a tracked user interaction (pointer, key, scroll, touch,
    /// click) and wakes the timer task to recompute its deadline.
    pub fn touch(&self) {
        self.inner.lock_machine().record_activity(Instant::now());
        self.inner.activity.notify_one();
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock_machine().phase()
    }

    /// Component teardown: stop the timer task without firing anything.
    pub async fn shutdown(self) {
        self.inner.shutdown.notify_one();
        let _ = self.handle.await;
    }
}

async fn run(
    inner: Arc<WatcherInner>,
    user_id: Option<String>,
    monitor: SecurityMonitor,
    sign_out: Arc<dyn SignOut>,
) {
    loop {
        let deadline = inner.lock_machine().next_deadline();
        let Some(deadline) = deadline else {
            return;
        };

        tokio::select! {
            _ = inner.activity.notified() => continue,
            _ = inner.shutdown.notified() => return,
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
        }

        let now = Instant::now();
        let (signal, idle) = {
            let mut machine = inner.lock_machine();
            (machine.poll(now), machine.idle(now))
        };

        match signal {
            Some(SessionSignal::WarningDue) => {
                info!(idle_ms = idle.as_millis() as u64, "session inactivity warning");
                monitor.notifier().notify(UserNotice::warning(
                    "You have been inactive for a while. Your session will expire soon.",
                ));
                let warning_time = Utc::now();
                let last_activity = warning_time - chrono::Duration::milliseconds(idle.as_millis() as i64);
                let mut details = HashMap::new();
                details.insert("last_activity".to_string(), last_activity.to_rfc3339());
                details.insert("warning_time".to_string(), warning_time.to_rfc3339());
                monitor
                    .record_session_event(
                        SecurityEventType::SessionTimeoutWarning,
                        user_id.as_deref(),
                        details,
                    )
                    .await;
            }
            Some(SessionSignal::ExpiryDue) => {
                info!("session expired after inactivity");
                monitor.notifier().notify(UserNotice::error(
                    "Your session has expired. Please sign in again.",
                ));
                let mut details = HashMap::new();
                details.insert("idle_ms".to_string(), idle.as_millis().to_string());
                monitor
                    .record_session_event(
                        SecurityEventType::SessionExpired,
                        user_id.as_deref(),
                        details,
                    )
                    .await;
                sign_out.sign_out().await;
                return;
            }
            None => {
                debug!("timer woke before any deadline was due");
            }
        }
    }
}
