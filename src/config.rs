use std::env;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub earnings: EarningsPolicy,
}

/// Rate table for rider earnings and the cash-out floor. The observed
/// business rule is ambiguous between rate variants, so the canonical
/// values live here and can be overridden per deployment.
#[derive(Debug, Clone)]
pub struct EarningsPolicy {
    pub same_region_rate: Decimal,
    pub cross_region_rate: Decimal,
    pub cashout_minimum: Decimal,
}

impl Default for EarningsPolicy {
    fn default() -> Self {
        Self {
            same_region_rate: dec!(0.75),
            cross_region_rate: dec!(0.90),
            cashout_minimum: dec!(200),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = EarningsPolicy::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            earnings: EarningsPolicy {
                same_region_rate: parse_or_default(
                    "EARNINGS_SAME_REGION_RATE",
                    defaults.same_region_rate,
                )?,
                cross_region_rate: parse_or_default(
                    "EARNINGS_CROSS_REGION_RATE",
                    defaults.cross_region_rate,
                )?,
                cashout_minimum: parse_or_default("CASHOUT_MINIMUM", defaults.cashout_minimum)?,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
