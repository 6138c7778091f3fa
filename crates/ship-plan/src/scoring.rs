//! Ranking of candidate options per [`Preference`].

use ship_core::types::{Preference, ShippingOption};
use std::cmp::Ordering;

pub trait Scorer: Send + Sync {
    /// Orders `options` best-first. The order must be total and deterministic.
    fn rank(&self, options: &mut [ShippingOption]);
}

pub fn scorer_for(preference: Preference) -> Box<dyn Scorer> {
    match preference {
        Preference::Fastest => Box::new(FastestScorer),
        Preference::Cheapest => Box::new(CheapestScorer),
        Preference::Balanced => Box::new(BalancedScorer),
        Preference::Green => Box::new(GreenScorer),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FastestScorer;

impl Scorer for FastestScorer {
    fn rank(&self, options: &mut [ShippingOption]) {
        options.sort_by(|a, b| {
            a.eta_days
                .cmp(&b.eta_days)
                .then_with(|| a.price_usd.total_cmp(&b.price_usd))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheapestScorer;

impl Scorer for CheapestScorer {
    fn rank(&self, options: &mut [ShippingOption]) {
        options.sort_by(|a, b| {
            a.price_usd
                .total_cmp(&b.price_usd)
                .then_with(|| a.eta_days.cmp(&b.eta_days))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

/// Lowest emissions first; options without a CO2 figure go last.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreenScorer;

impl Scorer for GreenScorer {
    fn rank(&self, options: &mut [ShippingOption]) {
        options.sort_by(|a, b| {
            compare_co2(a.co2_kg, b.co2_kg)
                .then_with(|| a.price_usd.total_cmp(&b.price_usd))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

/// Mean of min-max normalized price, transit time and emissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedScorer;

impl Scorer for BalancedScorer {
    fn rank(&self, options: &mut [ShippingOption]) {
        let price = Range::over(options.iter().map(|o| o.price_usd));
        let eta = Range::over(options.iter().map(|o| f64::from(o.eta_days)));
        let co2 = Range::over(options.iter().filter_map(|o| o.co2_kg));

        let score = |option: &ShippingOption| {
            let co2_part = option.co2_kg.map_or(1.0, |value| co2.normalize(value));
            (price.normalize(option.price_usd)
                + eta.normalize(f64::from(option.eta_days))
                + co2_part)
                / 3.0
        };

        options.sort_by(|a, b| {
            score(a)
                .total_cmp(&score(b))
                .then_with(|| a.price_usd.total_cmp(&b.price_usd))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

fn compare_co2(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn over(values: impl Iterator<Item = f64>) -> Self {
        values.fold(
            Range {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            |range, value| Range {
                min: range.min.min(value),
                max: range.max.max(value),
            },
        )
    }

    fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if !span.is_finite() || span <= f64::EPSILON {
            return 0.0;
        }
        (value - self.min) / span
    }
}
