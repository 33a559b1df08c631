//! Non-optimizing causal fallback (§4.5): a single forward pass that charges
//! on solar surplus and discharges to cover deficit, with the same interface
//! as [`crate::dispatch::dispatch_lp`].

use crate::battery::BatteryParameters;
use crate::dispatch::{DispatchError, Schedule};
use crate::site_series::SiteSeries;
use crate::tariff::TariffTable;

/// Greedy self-consumption dispatch.
///
/// Deliberately does not honor the battery's reserve floor `E_min` — the
/// source behavior this baseline matches starts from an empty battery and
/// never refuses to discharge below the reserve fraction. Callers that want
/// the LP's stronger guarantees should use [`crate::dispatch::dispatch_lp`].
pub fn dispatch_greedy(
    site: &SiteSeries,
    tariff: &TariffTable,
    battery: &BatteryParameters,
) -> Result<Schedule, DispatchError> {
    if site.index.len() != tariff.index.len() || site.index != tariff.index {
        return Err(DispatchError::InputMisalignment(
            "site series and tariff indices differ".to_string(),
        ));
    }
    battery.validate()?;

    let n = site.index.len();
    let eta = battery.one_way_efficiency();
    let p_max = battery.p_max_kw;
    let e_max = battery.e_max_kwh;

    let mut e_batt = 0.0f64;
    let mut p_batt = Vec::with_capacity(n);
    let mut p_grid = Vec::with_capacity(n);
    let mut e = Vec::with_capacity(n);

    for i in 0..n {
        let net = site.load_kwh[i] - site.solar_kwh[i];
        if net < 0.0 {
            let charge = (-net).min(p_max).min((e_max - e_batt) / eta);
            let charge = charge.max(0.0);
            p_batt.push(-charge);
            e_batt += charge * eta;
            p_grid.push(net + charge);
        } else {
            let discharge = net.min(p_max).min(e_batt * eta);
            let discharge = discharge.max(0.0);
            p_batt.push(discharge);
            e_batt -= discharge / eta;
            // Corrected sign: discharge reduces the import, it does not add to it.
            p_grid.push(net - discharge);
        }
        e.push(e_batt);
    }

    Ok(Schedule {
        index: site.index.clone(),
        p_batt,
        p_grid,
        e,
    })
}
