//! Currency-aware rounding, formatting and parsing of amounts.

use std::collections::HashMap;
use std::str::FromStr;

use num_format::{Locale, ToFormattedString as _};
use reconcile_core::error::EngineError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::RecordId;

const DEFAULT_DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    pub decimal_places: u32,
}

/// Digits of precision per currency.
#[derive(Debug, Clone, Default)]
pub struct CurrencyRegistry {
    currencies: HashMap<RecordId, CurrencyInfo>,
}

impl CurrencyRegistry {
    pub fn new(currencies: impl IntoIterator<Item = CurrencyInfo>) -> Self {
        Self {
            currencies: currencies.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn currency_for(&self, currency_id: RecordId) -> Option<&CurrencyInfo> {
        self.currencies.get(&currency_id)
    }

    /// Decimal places of a currency; unknown currencies use cents.
    pub fn precision(&self, currency_id: Option<RecordId>) -> u32 {
        currency_id
            .and_then(|id| self.currencies.get(&id))
            .map(|c| c.decimal_places)
            .unwrap_or(DEFAULT_DECIMAL_PLACES)
    }

    pub fn round(&self, amount: Decimal, currency_id: Option<RecordId>) -> Decimal {
        round_to_decimals(amount, self.precision(currency_id))
    }

    /// Format with the currency's decimal places and `,` thousands grouping
    /// (ex. `-1,234.50`).
    pub fn format(&self, amount: Decimal, currency_id: Option<RecordId>) -> String {
        let decimal_places = self.precision(currency_id) as usize;
        let rounded = round_to_decimals(amount, decimal_places as u32);
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        let abs = rounded.abs();
        let integer_part = abs
            .trunc()
            .to_u128()
            .unwrap_or_default()
            .to_formatted_string(&Locale::en);
        if decimal_places == 0 {
            return format!("{}{}", sign, integer_part);
        }
        let fractional_part = format!("{:.decimal_places$}", abs.fract())
            .split('.')
            .nth(1)
            .map(str::to_string)
            .unwrap_or_default();
        format!(
            "{}{}.{:0<decimal_places$}",
            sign, integer_part, fractional_part
        )
    }

    /// Parse user input, accepting `,` grouping, and round it to the
    /// currency's precision.
    pub fn parse(&self, text: &str, currency_id: Option<RecordId>) -> Result<Decimal, EngineError> {
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .collect();
        let value = Decimal::from_str(&cleaned)
            .map_err(|e| EngineError::bad_request(format!("invalid amount {:?}: {}", text, e)))?;
        Ok(self.round(value, currency_id))
    }

    pub fn is_zero(&self, amount: Decimal, currency_id: Option<RecordId>) -> bool {
        is_zero(amount, self.precision(currency_id))
    }
}

/// Round half away from zero.
pub fn round_to_decimals(amount: Decimal, decimal_places: u32) -> Decimal {
    amount.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
}

pub fn is_zero(amount: Decimal, decimal_places: u32) -> bool {
    round_to_decimals(amount, decimal_places).is_zero()
}
