use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerOptions;
use crate::errors::{DeliveryError, SourceError};
use crate::models::destination::DestinationConfig;
use crate::models::meeting::{Meeting, MeetingKey};
use crate::service::calendar_source::CalendarSource;
use crate::service::meeting_format::{Threshold, notification_message};
use crate::service::notification_sink::{DeliveryOutcome, NotificationSink};
use crate::service::settings_store::SettingsProvider;
use crate::tasks::notification_state::NotificationState;

type SharedState = Arc<RwLock<HashMap<String, NotificationState>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub key: MeetingKey,
    pub threshold: Threshold,
    pub outcomes: Vec<DeliveryOutcome>,
}

/// What a single tick did, mostly for logging and tests.
#[derive(Debug, Default)]
pub struct TickReport {
    pub sent: Vec<SentNotification>,
    pub failed_destinations: Vec<(String, SourceError)>,
}

impl TickReport {
    pub fn count(&self, threshold: Threshold) -> usize {
        self.sent.iter().filter(|n| n.threshold == threshold).count()
    }
}

/// Polls every destination's calendar and announces meetings to their
/// attendees once when they are close and once when they start.
pub struct NotificationScheduler {
    settings: Arc<dyn SettingsProvider>,
    source: Arc<dyn CalendarSource>,
    sink: Arc<dyn NotificationSink>,
    options: SchedulerOptions,
    state: SharedState,
    tick_lock: Mutex<()>,
}

impl NotificationScheduler {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        source: Arc<dyn CalendarSource>,
        sink: Arc<dyn NotificationSink>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            settings,
            source,
            sink,
            options,
            state: Arc::new(RwLock::new(HashMap::new())),
            tick_lock: Mutex::new(()),
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        // One writer per destination state, even if ticks are requested
        // from several places.
        let _guard = self.tick_lock.lock().await;
        let cutoff = self.options.cutoff(now);

        let destinations: Vec<(String, DestinationConfig)> = self
            .settings
            .list_destinations()
            .into_iter()
            .filter_map(|id| match self.settings.get(&id) {
                Some(config) => Some((id, config)),
                None => {
                    warn!(destination = %id, "no usable settings, skipping");
                    None
                }
            })
            .collect();

        let fetches: Vec<_> = destinations
            .iter()
            .map(|(id, config)| self.fetch_with_timeout(id, config, cutoff))
            .collect();
        let fetched = join_all(fetches).await;

        let mut report = TickReport::default();
        for (destination, config, result) in fetched {
            let meetings = match result {
                Ok(meetings) => meetings,
                Err(err) => {
                    error!(destination = %destination, error = %err, "failed to load calendar");
                    report.failed_destinations.push((destination.clone(), err));
                    continue;
                }
            };
            self.process_destination(destination, config, meetings, now, cutoff, &mut report)
                .await;
        }

        let configured: HashSet<&String> = destinations.iter().map(|(id, _)| id).collect();
        let mut state = self.state.write().await;
        state.retain(|id, _| configured.contains(id));
        for destination_state in state.values_mut() {
            destination_state.prune(cutoff);
        }
        report
    }

    async fn fetch_with_timeout<'a>(
        &self,
        destination: &'a String,
        config: &'a DestinationConfig,
        since: DateTime<Utc>,
    ) -> (&'a String, &'a DestinationConfig, Result<Vec<Meeting>, SourceError>) {
        let result = match timeout(
            self.options.fetch_timeout,
            self.source.fetch(destination, config, since),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SourceError::Unreachable(format!(
                "no response within {:?}",
                self.options.fetch_timeout
            ))),
        };
        (destination, config, result)
    }

    async fn process_destination(
        &self,
        destination: &str,
        config: &DestinationConfig,
        meetings: Vec<Meeting>,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        // Work on a copy so readers never see a half-processed destination.
        let mut state = self
            .state
            .read()
            .await
            .get(destination)
            .cloned()
            .unwrap_or_default();

        for meeting in &meetings {
            let Some(threshold) = state.evaluate(destination, meeting, config.soon, now, cutoff)
            else {
                continue;
            };
            let message = notification_message(threshold, meeting, &config.timezone);
            let outcomes = self.deliver(destination, &meeting.attendees, &message).await;
            info!(
                destination,
                title = %meeting.title,
                ?threshold,
                attendees = meeting.attendees.len(),
                failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
                "sent meeting reminder"
            );
            report.sent.push(SentNotification {
                key: meeting.key(destination),
                threshold,
                outcomes,
            });
        }

        state.set_meetings(meetings);
        self.state
            .write()
            .await
            .insert(destination.to_string(), state);
    }

    async fn deliver(
        &self,
        destination: &str,
        attendees: &[String],
        message: &str,
    ) -> Vec<DeliveryOutcome> {
        if attendees.is_empty() {
            debug!(destination, "meeting has no attendees to remind");
            return Vec::new();
        }
        let deliveries: Vec<_> = attendees
            .iter()
            .map(|attendee| self.deliver_one(destination, attendee, message))
            .collect();
        join_all(deliveries).await
    }

    /// The delivery timeout applies to each attendee separately.
    async fn deliver_one(&self, destination: &str, attendee: &str, message: &str) -> DeliveryOutcome {
        let result = timeout(
            self.options.delivery_timeout,
            self.sink.send(destination, attendee, message),
        )
        .await
        .unwrap_or(Err(DeliveryError::TimedOut));
        match result {
            Ok(()) => {
                debug!(destination, attendee, "sent meeting reminder");
                DeliveryOutcome::delivered(attendee)
            }
            Err(err) => {
                warn!(destination, attendee, error = %err, "meeting reminder not delivered");
                DeliveryOutcome::failed(attendee, err)
            }
        }
    }

    pub async fn was_notified(&self, key: &MeetingKey, threshold: Threshold) -> bool {
        self.state
            .read()
            .await
            .get(&key.destination)
            .is_some_and(|state| state.was_notified(key, threshold))
    }

    /// Number of notification records kept for a destination.
    pub async fn tracked(&self, destination: &str) -> usize {
        self.state
            .read()
            .await
            .get(destination)
            .map_or(0, NotificationState::tracked)
    }

    /// Separates the control handle from the polling loop future, which the
    /// caller is expected to spawn.
    pub fn into_task(
        self,
    ) -> (SchedulerHandle, impl std::future::Future<Output = ()> + Send + 'static) {
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SchedulerHandle {
            refresh_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            state: self.state.clone(),
        };
        (handle, self.run(refresh_rx, shutdown_rx))
    }

    pub fn spawn(self) -> (SchedulerHandle, tokio::task::JoinHandle<()>) {
        let (handle, task) = self.into_task();
        (handle, tokio::spawn(task))
    }

    /// Ticks, then waits for the poll interval or a refresh request. Shutdown
    /// is only observed between ticks.
    pub async fn run(self, mut refresh: mpsc::Receiver<()>, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.options.poll_interval, "meeting reminder loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.tick(Utc::now()).await;
            debug!(
                soon = report.count(Threshold::Soon),
                now = report.count(Threshold::Now),
                failed = report.failed_destinations.len(),
                "finished meeting reminder tick"
            );
            tokio::select! {
                _ = sleep(self.options.poll_interval) => {}
                Some(()) = refresh.recv() => {
                    debug!("manual calendar refresh requested");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("meeting reminder loop stopped");
    }
}

/// Control and inspection of a running scheduler. Dropping every clone stops
/// the loop after its current tick.
#[derive(Clone)]
pub struct SchedulerHandle {
    refresh_tx: mpsc::Sender<()>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    state: SharedState,
}

impl SchedulerHandle {
    /// Asks for an immediate tick. A refresh already queued absorbs this one.
    pub fn refresh(&self) {
        if self.refresh_tx.try_send(()).is_err() {
            debug!("refresh already pending");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Meetings from the destination's last successful fetch.
    pub async fn upcoming(&self, destination: &str) -> Option<Vec<Meeting>> {
        self.state
            .read()
            .await
            .get(destination)
            .map(|state| state.meetings().to_vec())
    }

    pub async fn was_notified(&self, key: &MeetingKey, threshold: Threshold) -> bool {
        self.state
            .read()
            .await
            .get(&key.destination)
            .is_some_and(|state| state.was_notified(key, threshold))
    }
}
