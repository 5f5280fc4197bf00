use chrono::{Duration, TimeZone, Utc};
use dbreinit::{CopyStatus, DatabaseRecord, ReplicaCopy, SafetyWindow, TopologySnapshot};
use proptest::prelude::*;

fn entity() -> DatabaseRecord {
    DatabaseRecord {
        name: "DB1".to_string(),
        mounted: true,
        recovery: false,
        retention_days: 14,
        circular_logging: false,
        provisioning_excluded: false,
        host_server: "MBX1".to_string(),
        data_file_path: "D:\\DB1\\DB1.edb".to_string(),
        log_directory: "D:\\DB1\\Logs".to_string(),
    }
}

fn copies_strategy() -> impl Strategy<Value = Vec<(u32, Option<u32>)>> {
    prop::collection::vec((1u32..16, prop::option::of(0u32..30)), 0..8)
}

proptest! {
    #[test]
    fn prop_window_is_max_of_retention_and_lag(retention in 0u32..400, lag in 0u32..400) {
        let w = SafetyWindow::new(retention, lag);
        prop_assert_eq!(w.days(), retention.max(lag));
        prop_assert!(w.days() >= retention && w.days() >= lag);
    }

    #[test]
    fn prop_blocks_iff_within_window(days in 0u32..120, age_secs in 0i64..(130 * 86_400)) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let w = SafetyWindow::new(days, 0);
        let last = now - Duration::seconds(age_secs);
        let within = age_secs <= i64::from(days) * 86_400;
        prop_assert_eq!(w.blocks(last, now), within);
        if w.blocks(last, now) {
            prop_assert!(w.safe_after(last) >= now);
        }
    }

    #[test]
    fn prop_boundary_still_blocks(days in 0u32..3650) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let w = SafetyWindow::new(days, days / 2);
        prop_assert!(w.blocks(now - w.duration(), now));
        prop_assert!(!w.blocks(now - w.duration() - Duration::seconds(1), now));
    }

    #[test]
    fn prop_snapshot_sorted_and_excludes_active_host(layout in copies_strategy()) {
        let copies: Vec<ReplicaCopy> = layout
            .iter()
            .enumerate()
            .map(|(i, (pref, lag))| ReplicaCopy {
                name: format!("DB1\\MBX{}", i + 1),
                host_server: format!("MBX{}", i + 1),
                activation_preference: *pref,
                lag_enabled: lag.is_some(),
                lag_days: lag.unwrap_or(0),
                status: CopyStatus::Healthy,
                activation_suspended: false,
            })
            .collect();
        let snapshot = TopologySnapshot::from_copies(&entity(), copies.clone());

        prop_assert!(snapshot.copies().iter().all(|c| c.host_server != "MBX1"));
        prop_assert!(snapshot
            .copies()
            .windows(2)
            .all(|w| w[0].activation_preference <= w[1].activation_preference));
        let expected_lag = copies
            .iter()
            .filter(|c| c.host_server != "MBX1" && c.lag_enabled)
            .map(|c| c.lag_days)
            .max()
            .unwrap_or(0);
        prop_assert_eq!(snapshot.max_lag_days(), expected_lag);
        prop_assert!(snapshot.diff(snapshot.copies()).is_clean());
    }
}
