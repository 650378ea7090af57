use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::clients::discord_dm::DiscordDmSink;
use crate::config::AppConfig;
use crate::errors::{ConfigError, SourceError};
use crate::models::destination::{
    CalendarLocator, DestinationConfig, DestinationSettings, parse_timezone, validate_source,
};
use crate::service::calendar_source::{CalendarSource, LocatorSource};
use crate::service::meeting_format::meeting_list;
use crate::service::settings_store::{JsonSettingsStore, SettingsProvider};
use crate::tasks::meeting_loop::{NotificationScheduler, SchedulerHandle};
use crate::tasks::task_runner::TaskRunner;

/// Runs the reminder loop until ctrl-c.
pub async fn run_bot(config: AppConfig) -> Result<(), ConfigError> {
    let token = config.require("DISCORD_TOKEN")?;
    let options = config.scheduler_options()?;
    let settings = Arc::new(JsonSettingsStore::load(config.settings_file())?);
    for (destination, err) in settings.validate_all() {
        warn!(destination = %destination, error = %err, "destination will be skipped");
    }

    let scheduler = NotificationScheduler::new(
        settings.clone(),
        Arc::new(LocatorSource::new(reqwest::Client::new())),
        Arc::new(DiscordDmSink::new(&token)),
        options,
    );
    let (handle, scheduler_task) = scheduler.into_task();

    let mut task_runner = TaskRunner::new();
    task_runner.add_task("meeting-reminders", scheduler_task);
    task_runner.add_task("signals", handle_signals(handle, settings));
    task_runner.start_all().wait_all().await;
    Ok(())
}

/// ctrl-c stops the loop. On unix, SIGHUP requests an immediate refresh and
/// SIGUSR1 logs every destination's last fetched meetings.
async fn handle_signals(handle: SchedulerHandle, settings: Arc<JsonSettingsStore>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to listen for shutdown signal");
        }
    };
    tokio::pin!(ctrl_c);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::hangup()), signal(SignalKind::user_defined1())) {
            (Ok(mut hangup), Ok(mut user1)) => loop {
                tokio::select! {
                    _ = &mut ctrl_c => break,
                    Some(()) = hangup.recv() => {
                        info!("refresh requested");
                        handle.refresh();
                    }
                    Some(()) = user1.recv() => log_upcoming(&handle, settings.as_ref()).await,
                }
            },
            (Err(err), _) | (_, Err(err)) => {
                error!(error = %err, "unable to listen for control signals");
                (&mut ctrl_c).await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = &settings;
        (&mut ctrl_c).await;
    }

    info!("shutdown requested");
    handle.shutdown();
}

async fn log_upcoming(handle: &SchedulerHandle, settings: &dyn SettingsProvider) {
    for destination in settings.list_destinations() {
        let (Some(config), Some(meetings)) =
            (settings.get(&destination), handle.upcoming(&destination).await)
        else {
            info!(destination = %destination, "no meetings fetched yet");
            continue;
        };
        info!(
            destination = %destination,
            "upcoming meetings:\n{}",
            meeting_list(&meetings, &config.timezone)
        );
    }
}

/// Fetches one destination's calendar and renders it, optionally in another
/// timezone than the configured one.
pub async fn list_meetings(
    config: &AppConfig,
    destination: &str,
    display_zone: Option<&str>,
) -> Result<String, CommandError> {
    let options = config.scheduler_options()?;
    let settings = JsonSettingsStore::load(config.settings_file())?;
    let destination_config = settings.get(destination).ok_or_else(|| {
        ConfigError::Missing(format!("valid settings for destination {}", destination))
    })?;

    let mut zone = destination_config.timezone;
    let mut notice = String::new();
    if let Some(requested) = display_zone {
        match parse_timezone(requested) {
            Ok(parsed) => zone = parsed,
            Err(_) => {
                notice = format!(
                    "Time zone provided isn't valid. Using {} instead.\n",
                    zone
                );
            }
        }
    }

    let source = LocatorSource::new(reqwest::Client::new());
    let meetings = source
        .fetch(destination, &destination_config, options.cutoff(Utc::now()))
        .await?;
    Ok(format!("{}{}", notice, meeting_list(&meetings, &zone)))
}

/// Points a destination at a new calendar. The calendar is fetched once with
/// the new locator and the settings are only saved if that succeeds. Returns
/// the number of meetings found.
pub async fn set_source(
    config: &AppConfig,
    destination: &str,
    locator: CalendarLocator,
) -> Result<usize, CommandError> {
    let options = config.scheduler_options()?;
    let settings = JsonSettingsStore::load(config.settings_file())?;
    let source = LocatorSource::new(reqwest::Client::new());
    try_source(
        &settings,
        &source,
        destination,
        locator,
        options.cutoff(Utc::now()),
    )
    .await
}

pub async fn try_source(
    settings: &JsonSettingsStore,
    source: &dyn CalendarSource,
    destination: &str,
    locator: CalendarLocator,
    since: chrono::DateTime<Utc>,
) -> Result<usize, CommandError> {
    validate_source(&locator)?;
    let candidate = DestinationSettings {
        source: locator.clone(),
        ..settings.settings(destination)
    };
    let destination_config = DestinationConfig::try_from(&candidate)?;
    let meetings = source.fetch(destination, &destination_config, since).await?;
    settings.set_source(destination, locator)?;
    info!(destination, meetings = meetings.len(), "calendar source updated");
    Ok(meetings.len())
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::meeting::Meeting;
    use std::collections::BTreeMap;

    struct FixedSource(Result<Vec<Meeting>, SourceError>);

    #[serenity::async_trait]
    impl CalendarSource for FixedSource {
        async fn fetch(
            &self,
            _destination: &str,
            _config: &DestinationConfig,
            _since: chrono::DateTime<Utc>,
        ) -> Result<Vec<Meeting>, SourceError> {
            self.0.clone()
        }
    }

    fn feed(url: &str) -> CalendarLocator {
        CalendarLocator::IcsFeed {
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn source_is_kept_only_when_it_can_be_read() {
        let settings = JsonSettingsStore::in_memory(BTreeMap::new());
        settings
            .set_source("guild", feed("https://example.com/old.ics"))
            .unwrap();

        let broken = FixedSource(Err(SourceError::Unauthorized("401".to_string())));
        let result = try_source(
            &settings,
            &broken,
            "guild",
            feed("https://example.com/new.ics"),
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(CommandError::Source(SourceError::Unauthorized(_)))));
        assert_eq!(settings.settings("guild").source, feed("https://example.com/old.ics"));

        let working = FixedSource(Ok(Vec::new()));
        let found = try_source(
            &settings,
            &working,
            "guild",
            feed("https://example.com/new.ics"),
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(found, 0);
        assert_eq!(settings.settings("guild").source, feed("https://example.com/new.ics"));
    }

    #[tokio::test]
    async fn invalid_locator_is_rejected_before_fetching() {
        let settings = JsonSettingsStore::in_memory(BTreeMap::new());
        let result = try_source(
            &settings,
            &FixedSource(Ok(Vec::new())),
            "guild",
            feed("ftp://example.com/cal.ics"),
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(CommandError::Config(ConfigError::InvalidSource(_)))));
        assert!(settings.list_destinations().is_empty());
    }
}
