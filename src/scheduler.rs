//! Periodic auto-sync and its interplay with manual syncs
//!
//! The scheduler owns one named alarm. Its state moves between
//! [`SchedulerState::Idle`] (no alarm), [`SchedulerState::Armed`] and
//! [`SchedulerState::Running`]. Every sync, periodic or manual, holds
//! the run gate, clears the alarm first and recomputes it from the
//! current settings last, so at most one sync runs at a time and the
//! alarm always reflects the latest configuration.

use crate::error::Result;
use crate::settings::SETTINGS_KEY;
use crate::sync::{TicketSync, log_auto_sync_error};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Name of the periodic sync alarm.
pub const SYNC_ALARM: &str = "syncAlarm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SchedulerState {
    Idle,
    Armed { period_minutes: u32 },
    Running,
}

/// What a manual sync covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualSync {
    /// The folder currently displayed.
    DisplayedFolder,
    /// Every case folder under both roots.
    AllFolders,
}

/// Outcome of the most recent periodic sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSyncReport {
    pub finished_at: DateTime<Utc>,
    pub moved: usize,
    pub error: Option<String>,
}

/// A firing of a named alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fired {
    name: String,
    generation: u64,
}

#[derive(Debug)]
struct ArmedAlarm {
    period: Duration,
    generation: u64,
    task: JoinHandle<()>,
}

/// Repeating named timers delivering firings on one channel.
#[derive(Debug)]
struct Alarms {
    fired: mpsc::UnboundedSender<Fired>,
    armed: HashMap<String, ArmedAlarm>,
    generation: u64,
}

impl Alarms {
    fn new(fired: mpsc::UnboundedSender<Fired>) -> Self {
        Self {
            fired,
            armed: HashMap::new(),
            generation: 0,
        }
    }

    /// Arm `name` to fire every `period`, first after one full period.
    /// Replaces an alarm of the same name.
    fn create(&mut self, name: &str, period: Duration) {
        self.clear(name);
        self.generation += 1;
        let generation = self.generation;
        let tx = self.fired.clone();
        let fired_name = name.to_string();

        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let fired = Fired {
                    name: fired_name.clone(),
                    generation,
                };
                if tx.send(fired).is_err() {
                    break;
                }
            }
        });
        self.armed.insert(
            name.to_string(),
            ArmedAlarm {
                period,
                generation,
                task,
            },
        );
    }

    fn clear(&mut self, name: &str) -> bool {
        self.armed.remove(name).is_some_and(|alarm| {
            alarm.task.abort();
            true
        })
    }

    fn clear_all(&mut self) {
        for (_, alarm) in self.armed.drain() {
            alarm.task.abort();
        }
    }

    /// Whether `fired` came from an alarm that is still armed.
    fn is_current(&self, fired: &Fired) -> bool {
        self.armed
            .get(&fired.name)
            .is_some_and(|alarm| alarm.generation == fired.generation)
    }

    fn list(&self) -> Vec<(String, Duration)> {
        let mut alarms: Vec<_> = self
            .armed
            .iter()
            .map(|(name, alarm)| (name.clone(), alarm.period))
            .collect();
        alarms.sort();
        alarms
    }
}

impl Drop for Alarms {
    fn drop(&mut self) {
        self.clear_all();
    }
}

#[derive(Debug)]
struct Inner {
    state: SchedulerState,
    alarms: Alarms,
    debug_mode: Option<bool>,
    last_auto_sync: Option<AutoSyncReport>,
}

/// Drives [`TicketSync::auto_sync`] on the configured period.
#[derive(Debug)]
pub struct SyncScheduler {
    sync: Arc<TicketSync>,
    inner: Mutex<Inner>,
    /// Held for the whole duration of any sync.
    gate: Mutex<()>,
    fired: Mutex<mpsc::UnboundedReceiver<Fired>>,
}

impl SyncScheduler {
    #[must_use]
    pub fn new(sync: Arc<TicketSync>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sync,
            inner: Mutex::new(Inner {
                state: SchedulerState::Idle,
                alarms: Alarms::new(tx),
                debug_mode: None,
                last_auto_sync: None,
            }),
            gate: Mutex::new(()),
            fired: Mutex::new(rx),
        }
    }

    #[must_use]
    pub const fn sync(&self) -> &Arc<TicketSync> {
        &self.sync
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.lock().await.state
    }

    /// Currently armed alarms with their periods.
    pub async fn alarms(&self) -> Vec<(String, Duration)> {
        self.inner.lock().await.alarms.list()
    }

    pub async fn last_auto_sync(&self) -> Option<AutoSyncReport> {
        self.inner.lock().await.last_auto_sync.clone()
    }

    /// Clear every alarm, then arm the sync alarm if auto-sync is
    /// enabled. Unreadable settings leave the scheduler idle.
    pub async fn configure(&self) -> SchedulerState {
        // Settings are read under the lock: a change that lands while
        // the state is still Running is then seen here.
        let mut inner = self.inner.lock().await;
        inner.alarms.clear_all();

        let settings = match self.sync.settings() {
            Ok(settings) => settings,
            Err(e) => {
                error!("Error setting up alarm: {e}");
                inner.state = SchedulerState::Idle;
                return inner.state;
            }
        };

        if inner.debug_mode.is_some_and(|was| was != settings.debug_mode) {
            info!(
                "Debug mode has been {}.",
                if settings.debug_mode { "ENABLED" } else { "DISABLED" }
            );
        }
        inner.debug_mode = Some(settings.debug_mode);

        if !settings.auto_sync_enabled {
            info!("AutoSync is disabled, alarm not created.");
            inner.state = SchedulerState::Idle;
            return inner.state;
        }
        let period_minutes = match settings.period_minutes() {
            Ok(minutes) => minutes,
            Err(e) => {
                error!("Error setting up alarm: {e}");
                inner.state = SchedulerState::Idle;
                return inner.state;
            }
        };
        info!("Configuring alarm. Period: {period_minutes} mins, AutoSync: true");
        let period = Duration::from_secs(u64::from(period_minutes) * 60);
        inner.alarms.create(SYNC_ALARM, period);
        info!("Alarm '{SYNC_ALARM}' created with a {period_minutes} minute period.");
        inner.state = SchedulerState::Armed { period_minutes };
        inner.state
    }

    /// React to a settings change. While a sync runs, the change is
    /// picked up by the reconfiguration that ends the run.
    pub async fn settings_changed(&self) {
        if self.state().await == SchedulerState::Running {
            debug!("Settings changed during a sync; reconfiguring when it finishes.");
            return;
        }
        info!("Settings have changed, re-evaluating alarms.");
        self.configure().await;
    }

    /// Run a manual sync with the alarm suspended. Waits for a running
    /// sync to finish first. The alarm is re-armed from the current
    /// settings whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the sync's error. The alarm is re-armed either way.
    pub async fn manual_sync(&self, kind: ManualSync) -> Result<usize> {
        let _gate = self.gate.lock().await;
        info!("Pausing auto-sync alarm during manual sync.");
        self.begin_run().await;

        let result = match kind {
            ManualSync::DisplayedFolder => self.sync.sync_folder_mails().await,
            ManualSync::AllFolders => self.sync.sync_all_folders().await,
        };

        info!("Re-evaluating and re-enabling auto-sync alarm.");
        self.configure().await;
        result
    }

    /// Run the periodic sync now, unless another sync is running.
    /// Returns `None` when skipped.
    pub async fn trigger(&self) -> Option<AutoSyncReport> {
        let Ok(_gate) = self.gate.try_lock() else {
            debug!("A sync is already running; skipping this alarm.");
            return None;
        };
        info!("Alarm '{SYNC_ALARM}' triggered at {}.", Utc::now().format("%H:%M:%S"));
        self.begin_run().await;

        let result = self.sync.auto_sync().await;
        if let Err(e) = &result {
            log_auto_sync_error(e);
        }
        let report = AutoSyncReport {
            finished_at: Utc::now(),
            moved: *result.as_ref().unwrap_or(&0),
            error: result.err().map(|e| e.to_string()),
        };
        self.inner.lock().await.last_auto_sync = Some(report.clone());

        self.configure().await;
        Some(report)
    }

    async fn begin_run(&self) {
        let mut inner = self.inner.lock().await;
        inner.alarms.clear(SYNC_ALARM);
        inner.state = SchedulerState::Running;
    }

    async fn on_fired(&self, fired: Fired) {
        let current = self.inner.lock().await.alarms.is_current(&fired);
        if !current {
            debug!("Ignoring firing of cleared alarm '{}'", fired.name);
            return;
        }
        if fired.name == SYNC_ALARM {
            self.trigger().await;
        }
    }

    /// Configure from the current settings, then serve alarm firings
    /// and settings changes until `shutdown` is cancelled. Alarms are
    /// cleared on exit.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut changes = self.sync.store().subscribe(SETTINGS_KEY);
        changes.mark_unchanged();
        let mut fired = self.fired.lock().await;
        self.configure().await;
        let mut watching = true;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                Some(f) = fired.recv() => self.on_fired(f).await,
                changed = changes.changed(), if watching => {
                    if changed.is_err() {
                        debug!("Settings store closed; no longer watching for changes.");
                        watching = false;
                        continue;
                    }
                    changes.mark_unchanged();
                    self.settings_changed().await;
                }
            }
        }

        let mut inner = self.inner.lock().await;
        inner.alarms.clear_all();
        inner.state = SchedulerState::Idle;
        info!("Scheduler stopped.");
    }
}
