pub mod discord_dm;
pub mod google_calendar;
pub mod ics_feed;
