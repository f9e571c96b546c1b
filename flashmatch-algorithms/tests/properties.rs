//! Property tests for the numerical building blocks.
//!
//! - A correction is zero outside its skew limit or without a hypothesis.
//! - Derived bins keep their mean inside `[min, max]` with a non-negative spread.
//! - Shard merges are associative and commutative.
//! - Widening windows never lose entries and end with the whole histogram.
//! - An exactly quadratic bias is recovered by the correction fit.

use approx::assert_relative_eq;
use flashmatch_algorithms::{
    BiasCorrector, BinnedStatistics, ConditionalSampler, Histogram2D, Hypothesis, Polynomial,
    PolynomialCorrection, SkewWindow, ValueAxis,
};
use flashmatch_core::{
    CorrectionFit, DistanceBinning, Metric, MetricAxis, OffsetAxis, ProfileErrors, SliceEvent,
};
use proptest::prelude::*;

fn binning() -> DistanceBinning {
    DistanceBinning::new(200.0, 10)
}

/// (distance, value) pairs, some of them outside the binning or the window.
fn samples(max: usize) -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-20.0f64..220.0, -30.0f64..30.0), 0..max)
}

fn accumulate(samples: &[(f64, f64)]) -> BinnedStatistics {
    let mut stats = BinnedStatistics::new(Metric::Dy, binning(), &MetricAxis::new(40, -20.0, 20.0));
    for &(x, v) in samples {
        stats.accumulate(x, v);
    }
    stats
}

fn merged(parts: &[&BinnedStatistics]) -> BinnedStatistics {
    let mut total = accumulate(&[]);
    for part in parts {
        total.merge(part).unwrap();
    }
    total
}

fn assert_same_tables(a: &BinnedStatistics, b: &BinnedStatistics) {
    assert_eq!(a.histogram(), b.histogram());
    let (ta, tb) = (a.derive(ProfileErrors::Spread), b.derive(ProfileErrors::Spread));
    for (x, y) in ta.bins().iter().zip(tb.bins()) {
        match (x, y) {
            (Some(x), Some(y)) => {
                assert_eq!(x.entries, y.entries);
                assert_eq!((x.min, x.max), (y.min, y.max));
                assert_relative_eq!(x.mean, y.mean, epsilon = 1e-9);
                assert_relative_eq!(x.spread, y.spread, epsilon = 1e-9);
            }
            (None, None) => {}
            _ => panic!("populated bins differ"),
        }
    }
}

fn selected_event(flash_yb: f64, y_skew: f64) -> SliceEvent {
    SliceEvent {
        slices: 1,
        true_nus: 1,
        mc_t0: 0.5,
        charge_x: 50.0,
        flash_yb,
        y_skew,
        ..SliceEvent::default()
    }
}

proptest! {
    #[test]
    fn correction_is_zero_beyond_skew_limit(
        coefficients in prop::collection::vec(-100.0f64..100.0, 1..5),
        limit in 0.5f64..50.0,
        excess in 1e-6f64..1e6,
        negative in any::<bool>(),
        x in -500.0f64..500.0,
    ) {
        let correction = PolynomialCorrection::new("y", Polynomial::new(coefficients), limit);
        let skew = if negative { -(limit + excess) } else { limit + excess };
        prop_assert_eq!(correction.apply(skew, x), 0.0);
        prop_assert_eq!(correction.apply(f64::NAN, x), 0.0);
    }

    #[test]
    fn correction_is_zero_without_hypothesis(
        coefficients in prop::collection::vec(-100.0f64..100.0, 1..5),
        skew in -10.0f64..=10.0,
    ) {
        let correction = PolynomialCorrection::new("z", Polynomial::new(coefficients), 10.0);
        prop_assert_eq!(correction.apply(skew, Hypothesis::Undefined.value()), 0.0);
    }

    #[test]
    fn derived_mean_lies_within_min_max(samples in samples(400)) {
        let stats = accumulate(&samples);
        let table = stats.derive(ProfileErrors::Spread);
        let mut entries = 0;
        for bin in table.bins().iter().flatten() {
            prop_assert!(bin.min <= bin.mean && bin.mean <= bin.max);
            prop_assert!(bin.spread >= 0.0 && bin.spread.is_finite());
            prop_assert!(bin.spread <= bin.max - bin.min + 1e-9);
            entries += bin.entries;
        }
        prop_assert_eq!(entries, stats.profile().entries());

        let errors = stats.derive(ProfileErrors::ErrorOfMean);
        for (s, e) in table.bins().iter().flatten().zip(errors.bins().iter().flatten()) {
            prop_assert!(e.spread <= s.spread);
        }
    }

    #[test]
    fn shard_merge_is_associative_and_commutative(
        a in samples(150),
        b in samples(150),
        c in samples(150),
    ) {
        let (a, b, c) = (accumulate(&a), accumulate(&b), accumulate(&c));

        let ab = merged(&[&a, &b]);
        let ba = merged(&[&b, &a]);
        assert_same_tables(&ab, &ba);

        let ab_c = merged(&[&ab, &c]);
        let bc = merged(&[&b, &c]);
        let a_bc = merged(&[&a, &bc]);
        assert_same_tables(&ab_c, &a_bc);
    }

    #[test]
    fn windows_never_lose_entries(
        points in prop::collection::vec((0.0f64..200.0, -20.0f64..120.0), 1..500),
        observed in -50.0f64..150.0,
    ) {
        let mut h = Histogram2D::new(binning(), ValueAxis::new(25, 0.0, 100.0));
        for &(x, v) in &points {
            h.fill(x, v);
        }
        let counts: Vec<u64> = ConditionalSampler::default()
            .windows(&h, observed)
            .map(|w| w.entries())
            .collect();
        prop_assert!(!counts.is_empty());
        prop_assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
        prop_assert_eq!(counts.last().copied(), Some(h.entries()));
        prop_assert!(counts.len() <= h.axis().slots());
    }

    #[test]
    fn exact_quadratic_bias_is_recovered(
        a in -10.0f64..10.0,
        b in -0.1f64..0.1,
        c in -1e-3f64..1e-3,
        draws in prop::collection::vec((1.0f64..199.0, 0.1f64..3.0, any::<bool>()), 20..200),
    ) {
        let truth = Polynomial::new(vec![a, b, c]);
        let mut events = Vec::with_capacity(draws.len());
        let mut hypotheses = Vec::with_capacity(draws.len());
        for &(x, magnitude, negative) in &draws {
            let skew = if negative { -magnitude } else { magnitude };
            events.push(selected_event(skew * truth.eval(x), skew));
            hypotheses.push(Hypothesis::Defined { x, uncertainty: 1.0 });
        }

        let corrector = BiasCorrector::new(2, CorrectionFit::Points, DistanceBinning::new(200.0, 40));
        let window = SkewWindow { low: 0.05, high: 10.0 };
        let correction = corrector
            .fit_axis(&events, &hypotheses, OffsetAxis::Y, window)
            .unwrap();
        prop_assert_eq!(correction.selected(), draws.len());

        let scale = 1.0 + a.abs() + 200.0 * b.abs() + 40_000.0 * c.abs();
        for &(x, _, _) in &draws {
            let fitted = correction.polynomial().eval(x);
            prop_assert!((fitted - truth.eval(x)).abs() <= 1e-6 * scale);
        }
    }
}
