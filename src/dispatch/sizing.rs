//! Endogenous sizing extension (§4.4): adds an integer battery-block count
//! and a continuous solar size as decision variables, turning the LP into a
//! mixed-integer LP when the integer flag is set.

use chrono_tz::Tz;
use good_lp::{constraint, variable, variables, Expression, Solution, SolverModel};

use super::{classify_resolution_error, DispatchError, Schedule};
use crate::site_series::SiteSeries;
use crate::tariff::TariffTable;

/// Per-block battery physical parameters and per-kW annualized equipment costs.
#[derive(Debug, Clone, Copy)]
pub struct SizingParameters {
    pub e_block_kwh: f64,
    pub p_block_kw: f64,
    pub round_trip_efficiency: f64,
    pub reserve_fraction: f64,
    pub annualized_cost_per_batt: f64,
    pub annualized_cost_per_solar_kw: f64,
    pub integer_problem: bool,
}

/// Result of the endogenous sizing optimization: the chosen battery block
/// count, solar size in kW, and the dispatch schedule under that sizing.
#[derive(Debug, Clone)]
pub struct SizingResult {
    pub n_batt: f64,
    pub solar_kw: f64,
    pub schedule: Schedule,
}

/// `site.solar_kwh` is ignored here: this module rescales the aligned
/// per-kW reference (`solar_ref_aligned`) by the `k_solar` decision variable
/// instead of taking a fixed solar size, so the caller passes the *aligned,
/// per-kW-installed* reference rather than a pre-scaled solar series.
pub fn run_endogenous_sizing(
    site_load_kwh: &[f64],
    solar_ref_aligned_per_kw: &[f64],
    index: &[chrono::DateTime<Tz>],
    tariff: &TariffTable,
    params: &SizingParameters,
) -> Result<SizingResult, DispatchError> {
    if site_load_kwh.len() != tariff.index.len() || index.len() != tariff.index.len() {
        return Err(DispatchError::InputMisalignment(
            "load, solar reference, and tariff series must share one index".to_string(),
        ));
    }
    if solar_ref_aligned_per_kw.len() != site_load_kwh.len() {
        return Err(DispatchError::InputMisalignment(
            "solar reference series has a different length than the load series".to_string(),
        ));
    }
    for (i, (&b, &s)) in tariff.buy.iter().zip(tariff.sell.iter()).enumerate() {
        if s > b {
            return Err(DispatchError::InvalidParameters(format!(
                "sell price {s} exceeds buy price {b} at hour {i}"
            )));
        }
    }
    if params.e_block_kwh <= 0.0 || params.p_block_kw <= 0.0 {
        return Err(DispatchError::InvalidParameters(
            "battery block capacity and power rating must be positive".to_string(),
        ));
    }
    if !(params.round_trip_efficiency > 0.0 && params.round_trip_efficiency <= 1.0) {
        return Err(DispatchError::InvalidParameters(format!(
            "round_trip_efficiency must be in (0, 1], got {}",
            params.round_trip_efficiency
        )));
    }

    let n = site_load_kwh.len();
    let eta = params.round_trip_efficiency.sqrt();
    let horizon_years = n as f64 / 8760.0;

    let mut vars = variables!();
    let charge: Vec<_> = (0..n).map(|_| vars.add(variable().min(0.0))).collect();
    let discharge: Vec<_> = (0..n).map(|_| vars.add(variable().min(0.0))).collect();
    let grid_buy: Vec<_> = (0..n).map(|_| vars.add(variable().min(0.0))).collect();
    let grid_sell: Vec<_> = (0..n).map(|_| vars.add(variable().max(0.0))).collect();
    let e: Vec<_> = (0..=n).map(|_| vars.add(variable().min(0.0))).collect();
    let n_batt = if params.integer_problem {
        vars.add(variable().integer().min(0))
    } else {
        vars.add(variable().min(0.0))
    };
    let k_solar = vars.add(variable().min(0.0));

    let mut objective = Expression::from(0.0);
    for i in 0..n {
        objective += tariff.buy[i] * grid_buy[i] + tariff.sell[i] * grid_sell[i];
    }
    objective += horizon_years * params.annualized_cost_per_batt * n_batt;
    objective += horizon_years * params.annualized_cost_per_solar_kw * k_solar;

    let mut problem = if params.integer_problem {
        vars.minimise(objective).using(good_lp::solvers::highs::highs)
    } else {
        vars.minimise(objective).using(good_lp::solvers::clarabel::clarabel)
    };

    // `charge`/`discharge` here are both non-negative magnitudes (unlike the
    // signed split variables in `dispatch_lp`); the battery's signed
    // contribution to the power balance is `discharge - charge`.
    problem = problem.with(constraint!(e[0] == params.reserve_fraction * params.e_block_kwh * n_batt));
    for i in 0..n {
        problem = problem.with(constraint!(
            e[i + 1] == e[i] + eta * charge[i] - (1.0 / eta) * discharge[i]
        ));
        problem = problem.with(constraint!(
            discharge[i] - charge[i] + grid_buy[i] + grid_sell[i] + k_solar * solar_ref_aligned_per_kw[i]
                == site_load_kwh[i]
        ));
        problem = problem.with(constraint!(discharge[i] <= params.p_block_kw * n_batt));
        problem = problem.with(constraint!(charge[i] <= params.p_block_kw * n_batt));
        problem = problem.with(constraint!(e[i + 1] <= params.e_block_kwh * n_batt));
        problem = problem.with(constraint!(
            e[i + 1] >= params.reserve_fraction * params.e_block_kwh * n_batt
        ));
    }

    let solution = problem.solve().map_err(classify_resolution_error)?;

    let mut p_batt = Vec::with_capacity(n);
    let mut p_grid = Vec::with_capacity(n);
    let mut e_out = Vec::with_capacity(n);
    for i in 0..n {
        p_batt.push(solution.value(discharge[i]) - solution.value(charge[i]));
        p_grid.push(solution.value(grid_buy[i]) + solution.value(grid_sell[i]));
        e_out.push(solution.value(e[i + 1]));
    }

    Ok(SizingResult {
        n_batt: solution.value(n_batt),
        solar_kw: solution.value(k_solar),
        schedule: Schedule {
            index: index.to_vec(),
            p_batt,
            p_grid,
            e: e_out,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tariff::{build_tariff, TariffSchedule};
    use chrono::{Duration, TimeZone};
    use chrono_tz::America::Los_Angeles;

    #[test]
    fn sizes_a_battery_for_peak_arbitrage() {
        let start = Los_Angeles.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).single().unwrap();
        let index: Vec<_> = (0..24).map(|h| start + Duration::hours(h)).collect();
        let load = vec![1.0; 24];
        let solar_ref = vec![0.0; 24];
        let tariff = build_tariff(&index, &TariffSchedule::default()).unwrap();

        let params = SizingParameters {
            e_block_kwh: 13.5,
            p_block_kw: 5.0,
            round_trip_efficiency: 0.85,
            reserve_fraction: 0.2,
            annualized_cost_per_batt: 1400.0,
            annualized_cost_per_solar_kw: 150.0,
            integer_problem: false,
        };

        let result =
            run_endogenous_sizing(&load, &solar_ref, &index, &tariff, &params).unwrap();
        assert!(result.n_batt >= 0.0);
        assert!(result.solar_kw >= 0.0);
        assert_eq!(result.schedule.p_grid.len(), 24);
    }
}
