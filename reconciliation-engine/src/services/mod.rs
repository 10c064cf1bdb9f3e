pub mod metrics;
pub mod money;

pub use money::{is_zero, round_to_decimals, CurrencyInfo, CurrencyRegistry};
