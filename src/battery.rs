use serde::Deserialize;

use crate::dispatch::DispatchError;

/// Physical parameters of a stationary battery as seen by the dispatch core.
///
/// `e_max_kwh` and `p_max_kw` describe one block's worth of capacity and
/// power rating; the endogenous sizing extension (`dispatch::sizing`) scales
/// both by an integer block count rather than mutating this struct.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BatteryParameters {
    pub e_max_kwh: f64,
    pub p_max_kw: f64,
    pub round_trip_efficiency: f64,
    pub reserve_fraction: f64,
}

impl BatteryParameters {
    /// Reserve floor `E_min = r_backup * E_max`.
    pub fn e_min_kwh(&self) -> f64 {
        self.reserve_fraction * self.e_max_kwh
    }

    /// One-way (charge or discharge) efficiency `eta = sqrt(eta_rt)`.
    pub fn one_way_efficiency(&self) -> f64 {
        self.round_trip_efficiency.sqrt()
    }

    /// Rejects battery parameters the LP and greedy dispatchers cannot honor.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.e_max_kwh <= 0.0 {
            return Err(DispatchError::InvalidParameters(format!(
                "e_max_kwh must be positive, got {}",
                self.e_max_kwh
            )));
        }
        if self.p_max_kw <= 0.0 {
            return Err(DispatchError::InvalidParameters(format!(
                "p_max_kw must be positive, got {}",
                self.p_max_kw
            )));
        }
        if !(self.round_trip_efficiency > 0.0 && self.round_trip_efficiency <= 1.0) {
            return Err(DispatchError::InvalidParameters(format!(
                "round_trip_efficiency must be in (0, 1], got {}",
                self.round_trip_efficiency
            )));
        }
        if !(0.0..1.0).contains(&self.reserve_fraction) {
            return Err(DispatchError::InvalidParameters(format!(
                "reserve_fraction must be in [0, 1), got {}",
                self.reserve_fraction
            )));
        }
        if self.e_min_kwh() > self.e_max_kwh {
            return Err(DispatchError::InvalidParameters(
                "reserve floor exceeds capacity".to_string(),
            ));
        }
        Ok(())
    }
}
