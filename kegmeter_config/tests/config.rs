//! Config parsing/validation and the calibration store.

use kegmeter_config::{load_toml, CalStore, Config, MeterCalibration};
use rstest::rstest;
use std::collections::BTreeMap;

#[test]
fn defaults_validate() {
    Config::default().validate().expect("defaults must be valid");
}

#[test]
fn empty_toml_gives_defaults() {
    let cfg = load_toml("").expect("empty config");
    assert_eq!(cfg.meters.count, 8);
    assert_eq!(cfg.window.capacity, 50);
    assert_eq!(cfg.min_dwell_ticks(), 50);
    cfg.validate().expect("defaults valid");
}

#[test]
fn partial_toml_overrides_only_named_fields() {
    let cfg = load_toml(
        r#"
            [meters]
            count = 4

            [thresholds]
            trust_variance = 0.9

            [dwell]
            min_ticks = 25
        "#,
    )
    .expect("parse");
    assert_eq!(cfg.meters.count, 4);
    assert!((cfg.thresholds.trust_variance - 0.9).abs() < 1e-12);
    assert_eq!(cfg.min_dwell_ticks(), 25);
    // Untouched sections keep defaults.
    assert_eq!(cfg.window.capacity, 50);
    assert!((cfg.containers.corny_empty_kg - 4.0).abs() < 1e-12);
}

#[test]
fn unknown_toml_is_rejected_gracefully() {
    assert!(load_toml("meters = 3").is_err());
    assert!(load_toml("[[meters]]").is_err());
}

#[rstest]
#[case::zero_meters("[meters]\ncount = 0", "meters.count")]
#[case::too_many_meters("[meters]\ncount = 500", "meters.count")]
#[case::zero_status_period("[meters]\nstatus_period_ticks = 0", "status_period_ticks")]
#[case::zero_window("[window]\ncapacity = 0", "window.capacity")]
#[case::window_over_u8("[window]\ncapacity = 300", "window.capacity")]
#[case::negative_seed("[window]\nseed_kg = -1.0", "seed_kg")]
#[case::zero_settle("[thresholds]\nsettle_variance = 0.0", "settle_variance")]
#[case::negative_trust("[thresholds]\ntrust_variance = -0.5", "trust_variance")]
#[case::zero_margin("[thresholds]\ncalibration_margin_kg = 0.0", "calibration_margin_kg")]
#[case::zero_dwell("[dwell]\nmin_ticks = 0", "dwell.min_ticks")]
#[case::zero_fill_anim("[dwell]\nfill_anim_ticks = 0", "fill_anim_ticks")]
#[case::container_order("[containers]\ncorny_max_full_kg = 1.0", "corny_max_full_kg")]
#[case::zero_rate("[sampling]\nrate_hz = 0", "rate_hz")]
#[case::zero_poll("[timeouts]\ntransport_poll_ms = 0", "transport_poll_ms")]
#[case::huge_poll("[timeouts]\ntransport_poll_ms = 60000", "transport_poll_ms")]
#[case::zero_sensor_timeout("[timeouts]\nsensor_ms = 0", "sensor_ms")]
fn invalid_values_fail_validation(#[case] toml: &str, #[case] expect_in_msg: &str) {
    let cfg = load_toml(toml).expect("parses fine, fails validation");
    let err = cfg.validate().expect_err("must be invalid");
    assert!(
        err.to_string().contains(expect_in_msg),
        "error {err:?} does not mention {expect_in_msg}"
    );
}

#[test]
fn min_dwell_falls_back_to_window_capacity() {
    let cfg = load_toml("[window]\ncapacity = 30").expect("parse");
    assert_eq!(cfg.min_dwell_ticks(), 30);
}

#[test]
fn store_missing_file_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CalStore::new(dir.path().join("absent.toml"));
    assert!(store.load().expect("load").is_empty());
}

#[test]
fn store_round_trip_preserves_sparse_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CalStore::new(dir.path().join("cal.toml"));

    let mut map = BTreeMap::new();
    map.insert(
        0,
        MeterCalibration {
            empty_mass_kg: Some(4.0),
            full_mass_kg: Some(20.0),
            last_percent: 0.8,
            ..Default::default()
        },
    );
    map.insert(
        7,
        MeterCalibration {
            empty_sensor_value: Some(100.0),
            ..Default::default()
        },
    );
    store.save(&map).expect("save");
    assert_eq!(store.load().expect("load"), map);
}

#[test]
fn store_rejects_non_numeric_meter_keys() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cal.toml");
    std::fs::write(&path, "[meter.left]\nlast_percent = 0.5\n").expect("write");
    assert!(CalStore::new(&path).load().is_err());
}

#[test]
fn store_file_is_human_editable_toml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cal.toml");
    std::fs::write(
        &path,
        "[meter.2]\nempty_mass_kg = 4.5\nlast_percent = 0.25\n",
    )
    .expect("write");
    let loaded = CalStore::new(&path).load().expect("load");
    let cal = loaded.get(&2).expect("meter 2");
    assert_eq!(cal.empty_mass_kg, Some(4.5));
    assert!((cal.last_percent - 0.25).abs() < 1e-12);
    assert!(cal.full_mass_kg.is_none());
}
