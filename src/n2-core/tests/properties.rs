// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Property tests for the control law, ramp limiter, watchdog and gate.

use std::time::{Duration, Instant};

use n2_core::control::gate::{can_enable_auto, Permission, PermissionSet};
use n2_core::control::logic::{apply_ramp, evaluate, Thresholds};
use n2_core::control::watchdog::{Watchdog, WatchdogState};
use n2_core::{Measurements, ProjectPhase};
use proptest::prelude::*;

fn any_f64() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => -1000.0f64..1000.0,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
        1 => any::<f64>(),
    ]
}

fn any_phase() -> impl Strategy<Value = ProjectPhase> {
    prop_oneof![
        Just(ProjectPhase::ReadOnly),
        Just(ProjectPhase::Advisory),
        Just(ProjectPhase::ClosedLoop),
    ]
}

prop_compose! {
    fn any_measurements()(
        values in proptest::collection::vec(any_f64(), 8),
        flags in proptest::collection::vec(any::<bool>(), 7),
    ) -> Measurements {
        Measurements {
            velocity: values[0],
            zinc_temp_c: values[1],
            furnace_temp_c: values[2],
            n2_purity_pct: values[3],
            n2_pressure_bar: values[4],
            fg_h2_pct: values[5],
            fg_pressure_bar: values[6],
            fg_mixer_temp_c: values[7],
            line_running: flags[0],
            furnace_alarm: flags[1],
            zinc_alarm: flags[2],
            psa_alarm: flags[3],
            fg_h2_high_alarm: flags[4],
            fg_h2_low_alarm: flags[5],
            fg_pressure_alarm: flags[6],
            ..Measurements::default()
        }
    }
}

prop_compose! {
    /// Readings inside every band, only the speed varies.
    fn healthy_measurements()(velocity in 0.0f64..300.0) -> Measurements {
        Measurements {
            velocity,
            zinc_temp_c: 450.0,
            furnace_temp_c: 680.0,
            n2_purity_pct: 99.0,
            n2_pressure_bar: 1.0,
            fg_h2_pct: 5.0,
            fg_pressure_bar: 1.0,
            fg_mixer_temp_c: 25.0,
            line_running: true,
            ..Measurements::default()
        }
    }
}

proptest! {
    #[test]
    fn evaluate_target_always_in_range(m in any_measurements(), phase in any_phase()) {
        let d = evaluate(&m, phase, &Thresholds::default());
        prop_assert!((0.0..=100.0).contains(&d.target), "target {}", d.target);
    }

    #[test]
    fn hard_alarm_always_wins(m in healthy_measurements(), which in 0usize..3) {
        let m = match which {
            0 => Measurements { furnace_alarm: true, ..m },
            1 => Measurements { zinc_alarm: true, ..m },
            _ => Measurements { n2_purity_pct: 90.0, ..m },
        };
        let d = evaluate(&m, ProjectPhase::ClosedLoop, &Thresholds::default());
        prop_assert!(d.failsafe_trigger.is_some());
        prop_assert_eq!(d.target, 0.0);
    }

    #[test]
    fn healthy_inputs_never_trip(m in healthy_measurements()) {
        let d = evaluate(&m, ProjectPhase::ClosedLoop, &Thresholds::default());
        prop_assert!(d.failsafe_trigger.is_none());
        prop_assert!(d.target <= 95.0);
    }

    #[test]
    fn ramp_step_is_bounded(
        target in -50.0f64..150.0,
        current in 0.0f64..=100.0,
        max_delta in 0.0f64..50.0,
    ) {
        let next = apply_ramp(target, current, max_delta);
        let clamped = target.clamp(0.0, 100.0);
        prop_assert!((next - current).abs() <= max_delta + 1e-9);
        prop_assert!(next >= current.min(clamped) - 1e-9);
        prop_assert!(next <= current.max(clamped) + 1e-9);
        prop_assert!((0.0..=100.0).contains(&next));
    }

    #[test]
    fn ramp_is_idempotent_at_target(x in 0.0f64..=100.0, max_delta in any_f64()) {
        prop_assert_eq!(apply_ramp(x, x, max_delta), x);
    }

    #[test]
    fn ramp_total_over_all_inputs(target in any_f64(), current in any_f64(), max_delta in any_f64()) {
        let next = apply_ramp(target, current, max_delta);
        prop_assert!((0.0..=100.0).contains(&next));
    }

    #[test]
    fn watchdog_follows_age(age_s in 0u64..200, timeout_s in 1u64..120) {
        let start = Instant::now();
        let mut wd = Watchdog::new(Duration::from_secs(timeout_s), start);
        wd.feed(start);
        let report = wd.check(start + Duration::from_secs(age_s));
        let expected = if age_s >= timeout_s { WatchdogState::Stale } else { WatchdogState::Ok };
        prop_assert_eq!(report.state, expected);

        wd.feed(start + Duration::from_secs(age_s));
        prop_assert_eq!(wd.state(), WatchdogState::Ok);
    }

    #[test]
    fn enable_auto_needs_all_conditions(
        has_perm in any::<bool>(),
        phase in any_phase(),
        failsafe in any::<bool>(),
    ) {
        let perms = if has_perm {
            PermissionSet::from_iter([Permission::View, Permission::EnableAuto])
        } else {
            PermissionSet::from_iter([Permission::View, Permission::SetMode])
        };
        let allowed = can_enable_auto(perms, phase, failsafe).is_allowed();
        prop_assert_eq!(allowed, has_perm && phase == ProjectPhase::ClosedLoop && !failsafe);
    }
}
