//! Daily grid-cost accounting (§4.6) from any signed grid-power series.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::dispatch::DispatchError;
use crate::tariff::TariffTable;

/// `daily_cost = (sum(P_grid_pos * buy) + sum(P_grid_neg * sell)) / days_spanned`.
///
/// `p_grid` must share `tariff`'s index; `index` is used only to compute the
/// number of days spanned.
pub fn daily_cost(
    index: &[DateTime<Tz>],
    p_grid: &[f64],
    tariff: &TariffTable,
) -> Result<f64, DispatchError> {
    if index.len() != p_grid.len() || index.len() != tariff.index.len() {
        return Err(DispatchError::InputMisalignment(
            "index, grid power, and tariff must have the same length".to_string(),
        ));
    }
    let (Some(first), Some(last)) = (index.first(), index.last()) else {
        return Err(DispatchError::InputMisalignment(
            "cannot compute a daily cost over an empty series".to_string(),
        ));
    };

    let total: f64 = p_grid
        .iter()
        .zip(tariff.buy.iter())
        .zip(tariff.sell.iter())
        .map(|((&p, &buy), &sell)| p.max(0.0) * buy + p.min(0.0) * sell)
        .sum();

    // Each sample is the energy consumed *during the hour ending at* its
    // timestamp, so the series covers one more hour than last-minus-first.
    let days_spanned = ((*last - *first) + Duration::hours(1)).num_seconds() as f64 / 86_400.0;
    if days_spanned <= 0.0 {
        return Err(DispatchError::InvalidParameters(
            "index does not span a positive number of days".to_string(),
        ));
    }

    Ok(total / days_spanned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tariff::{build_tariff, TariffSchedule};
    use chrono::{Duration, TimeZone};
    use chrono_tz::America::Los_Angeles;

    #[test]
    fn flat_day_no_tech_cost_matches_scenario_a() {
        let start = Los_Angeles.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).single().unwrap();
        let index: Vec<_> = (0..24).map(|h| start + Duration::hours(h)).collect();
        let schedule = TariffSchedule {
            peak_buy: 0.40,
            offpeak_buy: 0.40,
            peak_sell: 0.05,
            offpeak_sell: 0.05,
            ..TariffSchedule::default()
        };
        let tariff = build_tariff(&index, &schedule).unwrap();
        let p_grid = vec![1.0; 24];

        let cost = daily_cost(&index, &p_grid, &tariff).unwrap();
        assert!((cost - 9.60).abs() < 1e-6);
    }

    #[test]
    fn pure_export_produces_negative_cost() {
        let start = Los_Angeles.with_ymd_and_hms(2023, 6, 1, 10, 0, 0).single().unwrap();
        let index: Vec<_> = (0..5).map(|h| start + Duration::hours(h)).collect();
        let tariff = build_tariff(&index, &TariffSchedule::default()).unwrap();
        let p_grid = vec![-3.0; 5];

        let cost = daily_cost(&index, &p_grid, &tariff).unwrap();
        assert!(cost < 0.0);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let start = Los_Angeles.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).single().unwrap();
        let index: Vec<_> = (0..3).map(|h| start + Duration::hours(h)).collect();
        let tariff = build_tariff(&index, &TariffSchedule::default()).unwrap();
        let p_grid = vec![1.0, 1.0];
        assert!(daily_cost(&index, &p_grid, &tariff).is_err());
    }
}
