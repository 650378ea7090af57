use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::models::destination::CalendarLocator;
use crate::runtime;
use crate::service::settings_store::JsonSettingsStore;

#[derive(Parser)]
#[command(about = "Direct-messages meeting attendees before and when their meetings start")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll calendars and send reminders until interrupted.
    Run,
    /// Print the next meetings of a destination.
    List {
        destination: String,
        /// Display timezone such as US/Pacific or Europe/London.
        #[arg(long)]
        tz: Option<String>,
    },
    /// Validate the destination settings file.
    CheckConfig,
    /// Set the timezone meetings are shown in.
    SetTimezone {
        destination: String,
        timezone: String,
    },
    /// Set how many minutes before a meeting the first reminder goes out. 0
    /// only announces the start.
    SetReminderTime {
        destination: String,
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },
    /// Point a destination at a calendar. The calendar is read once before
    /// the change is saved.
    SetSource {
        destination: String,
        #[command(subcommand)]
        source: SourceArgs,
    },
}

#[derive(Subcommand)]
pub enum SourceArgs {
    /// A Google calendar read with a bearer token.
    Google {
        #[arg(long, default_value = "primary")]
        calendar_id: String,
        /// File holding the bearer token.
        #[arg(long)]
        token_file: String,
    },
    /// An iCalendar feed served over http(s).
    Ics { url: String },
}

impl From<SourceArgs> for CalendarLocator {
    fn from(args: SourceArgs) -> Self {
        match args {
            SourceArgs::Google {
                calendar_id,
                token_file,
            } => CalendarLocator::Google {
                calendar_id,
                token_file: Some(token_file),
            },
            SourceArgs::Ics { url } => CalendarLocator::IcsFeed { url },
        }
    }
}

pub async fn cli(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Fine to panic here
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => runtime::run_bot(config).await?,
        Commands::List { destination, tz } => {
            let listing = runtime::list_meetings(&config, &destination, tz.as_deref()).await?;
            println!("{}", listing);
        }
        Commands::CheckConfig => {
            let store = JsonSettingsStore::load(config.settings_file())?;
            let problems = store.validate_all();
            if problems.is_empty() {
                println!("All destinations are valid.");
            } else {
                for (destination, err) in &problems {
                    println!("{}: {}", destination, err);
                }
                return Err(format!("{} destination(s) have invalid settings", problems.len()).into());
            }
        }
        Commands::SetTimezone {
            destination,
            timezone,
        } => {
            let store = JsonSettingsStore::load(config.settings_file())?;
            store.set_timezone(&destination, &timezone)?;
            println!("Time zone for {} set to {}.", destination, timezone);
        }
        Commands::SetReminderTime {
            destination,
            minutes,
        } => {
            let store = JsonSettingsStore::load(config.settings_file())?;
            store.set_soon_minutes(&destination, minutes)?;
            println!("Reminder time for {} set to {} minutes.", destination, minutes);
        }
        Commands::SetSource {
            destination,
            source,
        } => {
            let found = runtime::set_source(&config, &destination, source.into()).await?;
            println!(
                "Calendar for {} updated, {} upcoming meeting(s) found.",
                destination, found
            );
        }
    }
    Ok(())
}
