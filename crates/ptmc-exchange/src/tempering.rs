use ptmc_core::{ErrorInfo, PtError, RngHandle};

use crate::config::LadderConfig;

/// Builds the geometric temperature ladder, one temperature per rank.
///
/// Adjacent temperatures share the constant ratio `(t_max / t_min)^(1 / (P - 1))`.
/// Rank 0 receives `t_min` and rank `P - 1` receives `t_max`: the coordinator
/// gets the coldest replica, whose local moves are the cheapest.
pub fn build_ladder(config: &LadderConfig, participants: usize) -> Result<Vec<f64>, PtError> {
    config.validate()?;
    if participants < 2 {
        return Err(PtError::Config(
            ErrorInfo::new(
                "ladder-participants",
                "parallel tempering requires at least two participants",
            )
            .with_context("participants", participants.to_string()),
        ));
    }
    let ratio = (config.t_max / config.t_min).powf(1.0 / (participants - 1) as f64);
    let mut ladder: Vec<f64> = (0..participants)
        .map(|i| config.t_min * ratio.powi(i as i32))
        .collect();
    // pin the hot end so rounding in `powi` never drifts past the bound
    ladder[participants - 1] = config.t_max;
    Ok(ladder)
}

/// Metropolis acceptance for swapping the payloads of two ladder slots.
///
/// `w = min(1, exp((E_i - E_j) * (1/T_i - 1/T_j)))`. An undefined exponent
/// yields 0, so the swap is never taken.
pub fn exchange_acceptance(energy_i: f64, temp_i: f64, energy_j: f64, temp_j: f64) -> f64 {
    let delta_e = energy_i - energy_j;
    let delta_beta = 1.0 / temp_i - 1.0 / temp_j;
    let exponent = delta_e * delta_beta;
    if exponent.is_nan() {
        return 0.0;
    }
    if exponent >= 0.0 {
        return 1.0;
    }
    exponent.exp().min(1.0)
}

/// Attempts a replica exchange using the provided RNG handle.
///
/// Returns whether the swap was accepted together with its acceptance probability.
pub fn attempt_exchange(
    energy_i: f64,
    temp_i: f64,
    energy_j: f64,
    temp_j: f64,
    rng: &mut RngHandle,
) -> (bool, f64) {
    let acceptance = exchange_acceptance(energy_i, temp_i, energy_j, temp_j);
    let draw = rng.uniform();
    (acceptance > draw, acceptance)
}
