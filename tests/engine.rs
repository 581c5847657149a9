use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use openshock_clock::{
    countdown,
    sink::{Fired, RecordingSink},
    Alarm, AlarmClock, AlarmStore, Credentials, Dispatch, Stimulus,
};

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 10, 26)
        .unwrap()
        .and_hms_opt(6, 30, 0)
        .unwrap()
}

fn ms(n: i64) -> Duration {
    Duration::milliseconds(n)
}

fn clock_for(store: &AlarmStore, now: NaiveDateTime, sink: Arc<RecordingSink>) -> AlarmClock {
    AlarmClock::new(
        store.load(now),
        store.clone(),
        sink,
        Credentials::new("token", "target"),
        Dispatch::Inline,
    )
}

#[test]
fn wake_alarm_fires_once_and_moves_a_day() {
    let dir = tempfile::tempdir().unwrap();
    let store = AlarmStore::new(dir.path().join("alarms.toml"));
    let now = start();
    let wake = Alarm::new(now + Duration::seconds(1), 60, 3000, false).unwrap();

    let sink = Arc::new(RecordingSink::default());
    let mut clock = clock_for(&store, now, sink.clone());
    clock.add_alarm("Wake".to_string(), wake);

    let report = clock.tick(now + ms(700));
    assert_eq!(report.fired, vec!["Wake".to_string()]);
    assert_eq!(
        sink.calls(),
        vec![Fired {
            shock_id: "target".to_string(),
            stimulus: Stimulus {
                intensity: 60,
                duration_ms: 3000,
                warning: false,
            },
        }]
    );
    assert_eq!(
        clock.alarms()["Wake"].trigger_at,
        wake.trigger_at + Duration::days(1)
    );
}

#[test]
fn repeated_days_do_not_drift() {
    let dir = tempfile::tempdir().unwrap();
    let store = AlarmStore::new(dir.path().join("alarms.toml"));
    let seven = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
    let first = Alarm::at_time_of_day(seven, start(), 80, 2000, true).unwrap();
    store.save("Morning", &first).unwrap();

    let sink = Arc::new(RecordingSink::default());
    let days = 5;
    for day in 0..days {
        // a fresh process every day, as after a restart
        let base = first.trigger_at + Duration::days(day);
        let mut clock = clock_for(&store, base - Duration::minutes(5), sink.clone());
        for offset in [-90_000, -29_400, -10_000, -600, 400, 60_000] {
            clock.tick(base + ms(offset));
        }
        assert_eq!(
            clock.alarms()["Morning"].trigger_at,
            first.trigger_at + Duration::days(day + 1)
        );
    }

    let calls = sink.calls();
    assert_eq!(calls.iter().filter(|c| c.stimulus.warning).count(), 5);
    assert_eq!(calls.iter().filter(|c| !c.stimulus.warning).count(), 5);
    let stored = store.load(first.trigger_at)["Morning"];
    assert_eq!(stored.trigger_at, first.trigger_at + Duration::days(days));
    assert_eq!(stored.time_of_day(), seven);
}

#[test]
fn restart_after_days_offline_rolls_whole_days() {
    let dir = tempfile::tempdir().unwrap();
    let store = AlarmStore::new(dir.path().join("alarms.toml"));
    let alarm = Alarm::new(start(), 10, 1000, false).unwrap();
    store.save("Old", &alarm).unwrap();

    let later = start() + Duration::days(4) + Duration::hours(3);
    let sink = Arc::new(RecordingSink::default());
    let mut clock = clock_for(&store, later, sink.clone());
    let rolled = clock.alarms()["Old"].trigger_at;
    assert!(rolled > later);
    assert_eq!((rolled - start()).num_seconds() % 86_400, 0);

    // nothing stale goes off on the first tick
    assert!(clock.tick(later).is_empty());
    assert!(sink.calls().is_empty());
}

#[test]
fn displayed_countdown_agrees_with_firing() {
    let dir = tempfile::tempdir().unwrap();
    let store = AlarmStore::new(dir.path().join("alarms.toml"));
    let alarm = Alarm::new(start(), 50, 1000, false).unwrap();

    let sink = Arc::new(RecordingSink::default());
    let mut clock = clock_for(&store, start() - Duration::hours(1), sink.clone());
    clock.add_alarm("Wake".to_string(), alarm);

    let before = start() - ms(1500);
    assert_eq!(countdown::project(&alarm, before).remaining, "00:00:01");
    assert!(clock.tick(before).fired.is_empty());

    let during = start() - ms(500);
    assert_eq!(countdown::project(&alarm, during).remaining, "00:00:00");
    assert_eq!(clock.tick(during).fired.len(), 1);
}
