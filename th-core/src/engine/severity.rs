//! Hysteresis-aware throttling severity classification
//!
//! A reading escalates as soon as it reaches a threshold, but only falls back
//! once it has moved past `threshold - hysteresis` (hot) or
//! `threshold + hysteresis` (cold). Unset (NaN) levels are skipped.

use crate::data::{SensorInfo, ThrottlingArray, ThrottlingSeverity};

/// Hot and cold severity of one reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityPair {
    pub hot: ThrottlingSeverity,
    pub cold: ThrottlingSeverity,
}

impl SeverityPair {
    /// Combined severity reported to observers
    pub fn combined(&self) -> ThrottlingSeverity {
        self.hot.max(self.cold)
    }
}

/// Highest level (excluding NONE) whose set threshold satisfies `pred`
fn highest_matching(
    thresholds: &ThrottlingArray,
    pred: impl Fn(usize, f32) -> bool,
) -> ThrottlingSeverity {
    ThrottlingSeverity::ALL[1..]
        .iter()
        .rev()
        .copied()
        .find(|sev| {
            let i = sev.index();
            let t = thresholds[i];
            !t.is_nan() && pred(i, t)
        })
        .unwrap_or(ThrottlingSeverity::None)
}

/// Classify `value` against hot and cold thresholds given the previous severities
#[allow(clippy::too_many_arguments)]
pub fn severity_from_thresholds(
    hot_thresholds: &ThrottlingArray,
    cold_thresholds: &ThrottlingArray,
    hot_hysteresis: &ThrottlingArray,
    cold_hysteresis: &ThrottlingArray,
    prev_hot: ThrottlingSeverity,
    prev_cold: ThrottlingSeverity,
    value: f32,
) -> SeverityPair {
    let mut hot = highest_matching(hot_thresholds, |_, t| t <= value);
    if hot < prev_hot {
        hot = highest_matching(hot_thresholds, |i, t| t - hot_hysteresis[i] < value);
    }

    let mut cold = highest_matching(cold_thresholds, |_, t| t >= value);
    if cold < prev_cold {
        cold = highest_matching(cold_thresholds, |i, t| t + cold_hysteresis[i] > value);
    }

    SeverityPair { hot, cold }
}

/// Classify a reading of the sensor described by `info`
pub fn classify(
    info: &SensorInfo,
    prev_hot: ThrottlingSeverity,
    prev_cold: ThrottlingSeverity,
    value: f32,
) -> SeverityPair {
    severity_from_thresholds(
        &info.hot_thresholds,
        &info.cold_thresholds,
        &info.hot_hysteresis,
        &info.cold_hysteresis,
        prev_hot,
        prev_cold,
        value,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{UNSET_THRESHOLDS, ZERO_HYSTERESIS};
    use ThrottlingSeverity::{Critical, Light, Moderate, Severe, Shutdown};

    const NONE: ThrottlingSeverity = ThrottlingSeverity::None;

    fn hot_only(levels: &[(usize, f32, f32)]) -> (ThrottlingArray, ThrottlingArray) {
        let mut hot = UNSET_THRESHOLDS;
        let mut hyst = ZERO_HYSTERESIS;
        for &(i, t, h) in levels {
            hot[i] = t;
            hyst[i] = h;
        }
        (hot, hyst)
    }

    fn classify_hot(
        hot: &ThrottlingArray,
        hyst: &ThrottlingArray,
        prev: ThrottlingSeverity,
        v: f32,
    ) -> ThrottlingSeverity {
        severity_from_thresholds(hot, &UNSET_THRESHOLDS, hyst, &ZERO_HYSTERESIS, prev, NONE, v).hot
    }

    /// Feed a sequence of readings, carrying the hot severity forward
    fn run_sequence(
        hot: &ThrottlingArray,
        hyst: &ThrottlingArray,
        values: &[f32],
    ) -> Vec<ThrottlingSeverity> {
        let mut prev = NONE;
        values
            .iter()
            .map(|&v| {
                prev = classify_hot(hot, hyst, prev, v);
                prev
            })
            .collect()
    }

    #[test]
    fn test_escalates_at_threshold() {
        let (hot, hyst) = hot_only(&[(3, 45.0, 2.0), (6, 50.0, 2.0)]);
        assert_eq!(classify_hot(&hot, &hyst, NONE, 44.9), NONE);
        assert_eq!(classify_hot(&hot, &hyst, NONE, 45.0), Severe);
        assert_eq!(classify_hot(&hot, &hyst, NONE, 49.0), Severe);
        assert_eq!(classify_hot(&hot, &hyst, NONE, 50.0), Shutdown);
    }

    #[test]
    fn test_hysteresis_holds_level_until_cleared() {
        let (hot, hyst) = hot_only(&[(3, 45.0, 2.0), (6, 50.0, 2.0)]);
        let seq = run_sequence(&hot, &hyst, &[30.0, 46.0, 44.0, 43.5, 42.0]);
        assert_eq!(seq, vec![NONE, Severe, Severe, Severe, NONE]);
    }

    #[test]
    fn test_hysteresis_property_for_every_level() {
        for level in 1..7 {
            let threshold = 20.0 + level as f32 * 5.0;
            let (hot, hyst) = hot_only(&[(level, threshold, 3.0)]);
            let entered = ThrottlingSeverity::from_index(level).unwrap();

            let seq = run_sequence(&hot, &hyst, &[threshold - 10.0, threshold, threshold - 1.5]);
            assert_eq!(seq, vec![NONE, entered, entered], "level {level}");

            let seq = run_sequence(&hot, &hyst, &[threshold, threshold - 3.5]);
            assert_eq!(seq[1], NONE, "level {level}");
        }
    }

    #[test]
    fn test_drop_lands_on_hysteresis_level() {
        let (hot, hyst) = hot_only(&[(2, 40.0, 2.0), (4, 45.0, 2.0)]);
        // 42.5 is below CRITICAL's release point (43) but above MODERATE's (38)
        assert_eq!(classify_hot(&hot, &hyst, Critical, 44.0), Critical);
        assert_eq!(classify_hot(&hot, &hyst, Critical, 42.5), Moderate);
        assert_eq!(classify_hot(&hot, &hyst, Critical, 37.0), NONE);
    }

    #[test]
    fn test_deterministic() {
        let (hot, hyst) = hot_only(&[(1, 30.0, 1.0), (5, 60.0, 5.0)]);
        for v in [0.0, 29.9, 30.0, 58.0, 61.0] {
            for prev in ThrottlingSeverity::ALL {
                let a = classify_hot(&hot, &hyst, prev, v);
                let b = classify_hot(&hot, &hyst, prev, v);
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_unset_higher_levels_do_not_change_lower_results() {
        let (sparse, hyst) = hot_only(&[(2, 40.0, 1.0)]);
        let (dense, dense_hyst) = hot_only(&[(2, 40.0, 1.0), (5, 70.0, 1.0), (6, 80.0, 1.0)]);
        for v in [10.0, 39.5, 40.0, 55.0, 69.0] {
            assert_eq!(
                classify_hot(&sparse, &hyst, NONE, v),
                classify_hot(&dense, &dense_hyst, NONE, v)
            );
        }
    }

    #[test]
    fn test_all_unset_is_none() {
        let pair = severity_from_thresholds(
            &UNSET_THRESHOLDS,
            &UNSET_THRESHOLDS,
            &ZERO_HYSTERESIS,
            &ZERO_HYSTERESIS,
            Shutdown,
            Shutdown,
            1000.0,
        );
        assert_eq!(pair, SeverityPair::default());
    }

    #[test]
    fn test_cold_direction() {
        let mut cold = UNSET_THRESHOLDS;
        cold[1] = 0.0;
        cold[3] = -10.0;
        let mut hyst = ZERO_HYSTERESIS;
        hyst[1] = 2.0;
        hyst[3] = 2.0;

        let c = |prev, v| {
            let unset = &UNSET_THRESHOLDS;
            severity_from_thresholds(unset, &cold, &ZERO_HYSTERESIS, &hyst, NONE, prev, v).cold
        };
        assert_eq!(c(NONE, 5.0), NONE);
        assert_eq!(c(NONE, 0.0), Light);
        assert_eq!(c(NONE, -10.0), Severe);
        // Warming from SEVERE must pass -8 before dropping
        assert_eq!(c(Severe, -9.0), Severe);
        assert_eq!(c(Severe, -7.0), Light);
        assert_eq!(c(Light, 1.5), Light);
        assert_eq!(c(Light, 2.5), NONE);
    }

    #[test]
    fn test_combined_takes_max() {
        let pair = SeverityPair {
            hot: Moderate,
            cold: Critical,
        };
        assert_eq!(pair.combined(), Critical);
    }
}
