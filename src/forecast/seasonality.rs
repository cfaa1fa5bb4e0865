//! Fourier seasonality terms

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Whether a seasonal component is fitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityToggle {
    /// Enabled when the history is long enough to identify it
    #[default]
    Auto,
    On,
    Off,
}

/// A periodic component expressed as `order` sine/cosine pairs
#[derive(Debug, Clone, PartialEq)]
pub struct Seasonality {
    pub name: &'static str,
    /// Period in days
    pub period_days: f64,
    pub fourier_order: usize,
}

impl Seasonality {
    pub fn daily() -> Self {
        Self { name: "daily", period_days: 1.0, fourier_order: 4 }
    }

    pub fn weekly() -> Self {
        Self { name: "weekly", period_days: 7.0, fourier_order: 3 }
    }

    pub fn yearly() -> Self {
        Self { name: "yearly", period_days: 365.25, fourier_order: 10 }
    }

    /// Number of design-matrix columns this component contributes
    pub fn columns(&self) -> usize {
        2 * self.fourier_order
    }

    /// Append the component's features for `ds` to `out`.
    ///
    /// Phase is measured from the Unix epoch so the same calendar instant
    /// always gets the same features, independent of the training window.
    pub fn push_features(&self, ds: DateTime<Utc>, out: &mut Vec<f64>) {
        let days = ds.timestamp() as f64 / SECONDS_PER_DAY
            + ds.timestamp_subsec_nanos() as f64 / (SECONDS_PER_DAY * 1e9);
        for k in 1..=self.fourier_order {
            let angle = 2.0 * std::f64::consts::PI * k as f64 * days / self.period_days;
            out.push(angle.sin());
            out.push(angle.cos());
        }
    }
}

/// Resolve toggles against the history span, in the fixed order daily,
/// weekly, yearly.
///
/// `Auto` enables a component once the history covers two full periods;
/// daily additionally needs sub-daily sampling.
pub fn resolve_components(
    daily: SeasonalityToggle,
    weekly: SeasonalityToggle,
    yearly: SeasonalityToggle,
    span_days: f64,
    min_spacing_days: f64,
) -> Vec<Seasonality> {
    let wanted = |toggle: SeasonalityToggle, auto: bool| match toggle {
        SeasonalityToggle::On => true,
        SeasonalityToggle::Off => false,
        SeasonalityToggle::Auto => auto,
    };

    let mut components = Vec::new();
    if wanted(daily, span_days >= 2.0 && min_spacing_days < 1.0) {
        components.push(Seasonality::daily());
    }
    if wanted(weekly, span_days >= 14.0) {
        components.push(Seasonality::weekly());
    }
    if wanted(yearly, span_days >= 730.0) {
        components.push(Seasonality::yearly());
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_features_repeat_every_period() {
        let daily = Seasonality::daily();
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t_next = t + chrono::Duration::days(1);

        let mut a = Vec::new();
        let mut b = Vec::new();
        daily.push_features(t, &mut a);
        daily.push_features(t_next, &mut b);

        assert_eq!(a.len(), daily.columns());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_auto_resolution() {
        use SeasonalityToggle::*;

        let two_weeks_5min = resolve_components(Auto, Auto, Auto, 14.0, 5.0 / 1440.0);
        let names: Vec<_> = two_weeks_5min.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["daily", "weekly"]);

        let short_daily_data = resolve_components(Auto, Auto, Auto, 10.0, 1.0);
        assert!(short_daily_data.is_empty());

        let forced = resolve_components(Off, Off, On, 3.0, 1.0);
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].name, "yearly");
    }
}
