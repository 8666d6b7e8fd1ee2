//! Rate derivation across arbitrary enable/delay sequences.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use motion_hal::{EnableRateController, PhysicalMask, RateRoute};
use motion_types::{Duration, VirtualSensor};
use proptest::prelude::*;

const MIN: Duration = Duration::from_millis(10);
const DEFAULT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
enum Op {
    Enable(usize, bool),
    Delay(usize, i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..VirtualSensor::COUNT, any::<bool>()).prop_map(|(s, on)| Op::Enable(s, on)),
        (0..VirtualSensor::COUNT, 0i64..400_000_000).prop_map(|(s, ns)| Op::Delay(s, ns)),
    ]
}

proptest! {
    #[test]
    fn period_is_minimum_over_enabled(ops in prop::collection::vec(op(), 0..40)) {
        let mut rates = EnableRateController::new(MIN, DEFAULT);
        let mut enabled = [false; VirtualSensor::COUNT];
        let mut delays = [DEFAULT; VirtualSensor::COUNT];

        for op in ops {
            match op {
                Op::Enable(i, on) => {
                    let changed = rates.enable(VirtualSensor::ALL[i], on);
                    prop_assert_eq!(changed, enabled[i] != on);
                    enabled[i] = on;
                }
                Op::Delay(i, ns) => {
                    let got = rates.set_delay(VirtualSensor::ALL[i], ns).unwrap();
                    delays[i] = Duration::from_nanos(u64::try_from(ns).unwrap()).max(MIN);
                    prop_assert_eq!(got, delays[i]);
                }
            }

            let expected = (0..VirtualSensor::COUNT)
                .filter(|i| enabled[*i])
                .map(|i| delays[i])
                .min();
            let plan = rates.plan();
            prop_assert_eq!(plan.period, expected);
            prop_assert!(plan.period.is_none_or(|p| p >= MIN));
            prop_assert_eq!(plan.route == RateRoute::Idle, expected.is_none());

            let fusion = (0..VirtualSensor::COUNT)
                .any(|i| enabled[i] && VirtualSensor::ALL[i].needs_fusion());
            if fusion {
                prop_assert_eq!(plan.mask, PhysicalMask::FUSION);
            }
        }
    }
}

#[test]
fn minimum_rises_when_fastest_consumer_leaves() {
    let mut rates = EnableRateController::new(MIN, DEFAULT);
    let a = VirtualSensor::Accelerometer;
    let b = VirtualSensor::Gyroscope;

    rates.enable(a, true);
    rates.set_delay(a, 20_000_000).unwrap();
    rates.enable(b, true);
    rates.set_delay(b, 10_000_000).unwrap();
    assert_eq!(rates.plan().period, Some(Duration::from_millis(10)));

    rates.enable(b, false);
    assert_eq!(rates.plan().period, Some(Duration::from_millis(20)));
}
