//! Transaction cost simulation across networks

use serde::{Deserialize, Serialize};

use crate::shared::types::{FeeLevels, NetworkId, SimulationResult};

/// 18-decimal native assets (ETH, MATIC)
pub const DEFAULT_NATIVE_DECIMALS: u32 = 18;

/// Per-network inputs of a simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationInput {
    pub network: NetworkId,
    pub gas_limit: u64,
    pub levels: FeeLevels,
    pub native_decimals: u32,
}

/// Results in input order plus the index of the cheapest entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub results: Vec<SimulationResult>,
    pub cheapest: Option<usize>,
}

impl Comparison {
    pub fn cheapest_result(&self) -> Option<&SimulationResult> {
        self.cheapest.and_then(|i| self.results.get(i))
    }
}

/// Simulate one transfer of `amount` native units at `quote_price`.
///
/// Never fails: a bad amount counts as 0 and a non-finite quote price zeroes
/// every quote-denominated field.
pub fn simulate(
    network: NetworkId,
    gas_limit: u64,
    base_fee: u128,
    priority_fee: u128,
    amount: &str,
    quote_price: f64,
) -> SimulationResult {
    simulate_with_decimals(
        network,
        gas_limit,
        base_fee,
        priority_fee,
        amount,
        quote_price,
        DEFAULT_NATIVE_DECIMALS,
    )
}

pub fn simulate_with_decimals(
    network: NetworkId,
    gas_limit: u64,
    base_fee: u128,
    priority_fee: u128,
    amount: &str,
    quote_price: f64,
    native_decimals: u32,
) -> SimulationResult {
    let gas_price = base_fee.saturating_add(priority_fee);
    let gas_cost_base = gas_price.saturating_mul(gas_limit as u128);
    let gas_cost_native = finite_or_zero(gas_cost_base as f64 / 10_f64.powi(native_decimals as i32));

    let quote_price = finite_or_zero(quote_price);
    let gas_cost_quote = finite_or_zero(gas_cost_native * quote_price);
    let transfer_value_quote = finite_or_zero(parse_amount(amount) * quote_price);
    let total_cost_quote = finite_or_zero(transfer_value_quote + gas_cost_quote);

    SimulationResult {
        network,
        gas_limit,
        gas_cost_base,
        gas_cost_native,
        gas_cost_quote,
        transfer_value_quote,
        total_cost_quote,
    }
}

/// Run `simulate` for every input and pick the lowest total cost.
///
/// Ties go to the entry that comes first.
pub fn compare(inputs: &[SimulationInput], amount: &str, quote_price: f64) -> Comparison {
    let results: Vec<SimulationResult> = inputs
        .iter()
        .map(|input| {
            simulate_with_decimals(
                input.network.clone(),
                input.gas_limit,
                input.levels.base_fee,
                input.levels.priority_fee,
                amount,
                quote_price,
                input.native_decimals,
            )
        })
        .collect();

    let mut cheapest: Option<usize> = None;
    for (i, result) in results.iter().enumerate() {
        match cheapest {
            Some(best) if results[best].total_cost_quote <= result.total_cost_quote => {}
            _ => cheapest = Some(i),
        }
    }

    Comparison { results, cheapest }
}

/// Non-negative decimal amount; anything else is 0
pub fn parse_amount(amount: &str) -> f64 {
    match amount.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => 0.0,
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
