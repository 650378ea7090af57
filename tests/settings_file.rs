use std::env;
use std::fs;
use std::path::PathBuf;

use meetingReminderBot::errors::ConfigError;
use meetingReminderBot::models::destination::CalendarLocator;
use meetingReminderBot::service::settings_store::{JsonSettingsStore, SettingsProvider};

fn temp_settings_path(test_name: &str) -> PathBuf {
    env::temp_dir()
        .join(format!("meetingreminders_{}_{}", test_name, std::process::id()))
        .join("settings.json")
}

#[test]
fn creates_missing_file_and_persists_changes() {
    let path = temp_settings_path("persist");
    let _ = fs::remove_file(&path);

    let store = JsonSettingsStore::load(&path).expect("store should load");
    assert!(path.exists());
    assert!(store.list_destinations().is_empty());

    store.set_timezone("1234", "Europe/London").unwrap();
    store.set_soon_minutes("1234", 15).unwrap();
    store
        .set_source(
            "1234",
            CalendarLocator::IcsFeed {
                url: "https://calendar.example.com/team.ics".to_string(),
            },
        )
        .unwrap();

    let reloaded = JsonSettingsStore::load(&path).expect("store should reload");
    let config = reloaded.get("1234").expect("destination saved");
    assert_eq!(config.timezone, chrono_tz::Europe::London);
    assert_eq!(config.soon, chrono::Duration::minutes(15));
    assert_eq!(
        config.source,
        CalendarLocator::IcsFeed {
            url: "https://calendar.example.com/team.ics".to_string()
        }
    );

    let _ = fs::remove_file(&path);
}

#[test]
fn rejected_values_never_reach_the_file() {
    let path = temp_settings_path("rejected");
    let _ = fs::remove_file(&path);
    let store = JsonSettingsStore::load(&path).unwrap();

    assert_eq!(
        store.set_timezone("1234", "Pacific/Nowhere"),
        Err(ConfigError::InvalidTimezone("Pacific/Nowhere".to_string()))
    );
    assert!(store.set_soon_minutes("1234", -10).is_err());

    let reloaded = JsonSettingsStore::load(&path).unwrap();
    assert!(reloaded.list_destinations().is_empty());
    let _ = fs::remove_file(&path);
}

#[test]
fn hand_edited_invalid_entries_are_reported() {
    let path = temp_settings_path("invalid");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        r#"{
            "1": {"timezone": "US/Pacific", "soon_minutes": 30},
            "2": {"timezone": "Not/AZone", "soon_minutes": 30}
        }"#,
    )
    .unwrap();

    let store = JsonSettingsStore::load(&path).unwrap();
    assert!(store.get("1").is_some());
    assert!(store.get("2").is_none());
    let problems = store.validate_all();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].0, "2");
    let _ = fs::remove_file(&path);
}

#[test]
fn unreadable_entries_are_skipped_and_kept_on_disk() {
    let path = temp_settings_path("unreadable");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let original = r#"{
        "good": {"timezone": "US/Pacific", "soon_minutes": 30},
        "typo": {"soon_minutes": "ten"},
        "odd": {"source": {"kind": "carrier_pigeon"}}
    }"#;
    fs::write(&path, original).unwrap();

    let store = JsonSettingsStore::load(&path).expect("one bad entry must not fail the load");
    assert_eq!(store.list_destinations(), vec!["good"]);
    assert!(store.get("good").is_some());
    let problems = store.validate_all();
    let ids: Vec<&str> = problems.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["odd", "typo"]);
    assert!(matches!(problems[0].1, ConfigError::Parse(_)));

    // Loading is read-only.
    assert_eq!(fs::read_to_string(&path).unwrap(), original);

    store.set_soon_minutes("good", 10).unwrap();
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["good"]["soon_minutes"], 10);
    assert_eq!(saved["typo"]["soon_minutes"], "ten");
    assert_eq!(saved["odd"]["source"]["kind"], "carrier_pigeon");
    let _ = fs::remove_file(&path);
}

#[test]
fn malformed_file_is_a_parse_error() {
    let path = temp_settings_path("malformed");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        JsonSettingsStore::load(&path),
        Err(ConfigError::Parse(_))
    ));
    let _ = fs::remove_file(&path);
}
