// Integration tests for the mapping engine's safety clamp and direction handling

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use teleop_rs::config::Config;
    use teleop_rs::joint::{GainSign, JointId, JointLimits, PerJoint};
    use teleop_rs::mapping::{map_arm, map_gripper};

    const EPS: f64 = 1e-9;

    fn assert_within_follower(config: &Config, input: &[f64]) {
        let mapped = map_arm(input, config);
        assert!(mapped.is_processed());
        for joint in JointId::ALL {
            let limits = config.follower.limits[joint];
            let out = mapped.angles[joint.index()];
            assert!(
                limits.contains(out),
                "{joint}: input {:?} mapped to {out} outside {limits}",
                input
            );
        }
    }

    fn scenario_config() -> Config {
        let mut config = Config::default();
        config.leader.limits[JointId::J1] = JointLimits::new(-160.0, 160.0);
        config.leader.home_offsets[JointId::J1] = 0.0;
        config.follower.limits[JointId::J1] = JointLimits::new(-165.0, 165.0);
        config.follower.gain_signs[JointId::J1] = GainSign::Inverted;
        config
    }

    #[test]
    fn test_fixed_extremes_stay_in_range() {
        let config = Config::default();
        for value in [-10_000.0, -180.0, 0.0, 180.0, 10_000.0, f64::MAX, f64::MIN] {
            assert_within_follower(&config, &[value; 6]);
        }
        let leader_min: Vec<f64> = config.leader.limits.values().iter().map(|l| l.min).collect();
        let leader_max: Vec<f64> = config.leader.limits.values().iter().map(|l| l.max).collect();
        assert_within_follower(&config, &leader_min);
        assert_within_follower(&config, &leader_max);
    }

    #[test]
    fn test_scenario_inverted_j1() {
        let config = scenario_config();
        let angles = |j1: f64| [j1, 0.0, 0.0, 0.0, 0.0, 0.0];

        let mapped = map_arm(&angles(0.0), &config);
        assert!((mapped.normalized[0] - 0.5).abs() < EPS);
        assert!(mapped.angles[0].abs() < EPS);

        let mapped = map_arm(&angles(-160.0), &config);
        assert!((mapped.angles[0] - 165.0).abs() < EPS);

        let mapped = map_arm(&angles(200.0), &config);
        assert!(mapped.normalized[0] > 1.0);
        assert_eq!(mapped.angles[0], -165.0);
    }

    #[test]
    fn test_identity_and_inverted_endpoints() {
        let mut config = Config::default();
        config.leader.home_offsets = PerJoint::default();
        for joint in JointId::ALL {
            let leader = config.leader.limits[joint];
            let follower = config.follower.limits[joint];
            let mut at_min = [0.0; 6];
            let mut at_max = [0.0; 6];
            at_min[joint.index()] = leader.min;
            at_max[joint.index()] = leader.max;
            let out_min = map_arm(&at_min, &config).angles[joint.index()];
            let out_max = map_arm(&at_max, &config).angles[joint.index()];
            if config.follower.gain_signs[joint].is_inverted() {
                assert!((out_min - follower.max).abs() < EPS, "{joint}");
                assert!((out_max - follower.min).abs() < EPS, "{joint}");
            } else {
                assert!((out_min - follower.min).abs() < EPS, "{joint}");
                assert!((out_max - follower.max).abs() < EPS, "{joint}");
            }
        }
    }

    #[test]
    fn test_short_sample_not_processed() {
        let mapped = map_arm(&[1.0, 2.0, 3.0], &Config::default());
        assert_eq!(mapped.angles, vec![1.0, 2.0, 3.0]);
        assert!(mapped.normalized.is_empty());
    }

    proptest! {
        #[test]
        fn prop_output_never_leaves_follower_range(
            angles in prop::array::uniform6(-1.0e6f64..1.0e6),
        ) {
            let config = Config::default();
            let mapped = map_arm(&angles, &config);
            for joint in JointId::ALL {
                prop_assert!(config.follower.limits[joint].contains(mapped.angles[joint.index()]));
            }
        }

        #[test]
        fn prop_any_float_is_clamped(angles in prop::array::uniform6(any::<f64>())) {
            let config = Config::default();
            let mapped = map_arm(&angles, &config);
            for joint in JointId::ALL {
                prop_assert!(config.follower.limits[joint].contains(mapped.angles[joint.index()]));
            }
        }

        #[test]
        fn prop_degenerate_leader_maps_to_midpoint(value in -1.0e4f64..1.0e4) {
            let mut config = Config::default();
            config.leader.limits[JointId::J3] = JointLimits::new(12.0, 12.0);
            let mapped = map_arm(&[value; 6], &config);
            prop_assert_eq!(mapped.normalized[2], 0.5);
            let expected = config.follower.limits[JointId::J3].midpoint();
            prop_assert!((mapped.angles[2] - expected).abs() < EPS);
        }

        #[test]
        fn prop_mapping_is_monotonic_in_gain_direction(
            a in -400.0f64..400.0,
            b in -400.0f64..400.0,
        ) {
            let config = Config::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let out_lo = map_arm(&[lo; 6], &config);
            let out_hi = map_arm(&[hi; 6], &config);
            for joint in JointId::ALL {
                let i = joint.index();
                if config.follower.gain_signs[joint].is_inverted() {
                    prop_assert!(out_lo.angles[i] >= out_hi.angles[i] - EPS);
                } else {
                    prop_assert!(out_lo.angles[i] <= out_hi.angles[i] + EPS);
                }
            }
        }

        #[test]
        fn prop_gripper_in_command_range(
            angle in any::<f64>(),
            closed in -200.0f64..200.0,
            open in -200.0f64..200.0,
        ) {
            prop_assert!(map_gripper(angle, closed, open) <= 100);
        }
    }

    #[test]
    fn test_gripper_endpoints() {
        let config = Config::default();
        let (closed, open) = (config.gripper.leader_closed, config.gripper.leader_open);
        assert_eq!(map_gripper(closed, closed, open), 0);
        assert_eq!(map_gripper(open, closed, open), 100);
        assert_eq!(map_gripper(closed + 50.0, closed, open), 0);
        assert_eq!(map_gripper(open - 50.0, closed, open), 100);
    }
}
