//! Simulation domain - what a transfer would cost on each network

mod gas_cost;

pub use gas_cost::{
    compare, parse_amount, simulate, simulate_with_decimals, Comparison, SimulationInput,
    DEFAULT_NATIVE_DECIMALS,
};
