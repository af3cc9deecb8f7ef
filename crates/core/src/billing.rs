use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConfig {
    pub rate_per_unit_area: Decimal,
    pub currency: String,
    /// Multiplier from squared linear units to billed area units, e.g. m² → sqft.
    pub unit_conversion_factor: Decimal,
    pub linear_unit: String,
    pub area_unit: String,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            rate_per_unit_area: Decimal::new(420, 2),
            currency: "USD".to_string(),
            unit_conversion_factor: Decimal::new(10_764, 3),
            linear_unit: "m".to_string(),
            area_unit: "sqft".to_string(),
        }
    }
}

/// Read once per submission. Later changes never touch already-priced requests.
pub trait RateConfigProvider: Send + Sync {
    fn current(&self) -> RateConfig;
}

#[derive(Clone, Debug, Default)]
pub struct StaticRateConfigProvider {
    config: RateConfig,
}

impl StaticRateConfigProvider {
    pub fn new(config: RateConfig) -> Self {
        Self { config }
    }
}

impl RateConfigProvider for StaticRateConfigProvider {
    fn current(&self) -> RateConfig {
        self.config.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub area: Decimal,
    pub area_unit: String,
    pub days: i64,
    pub billable_days: i64,
    pub rate_per_unit_area: Decimal,
    /// Exact product; this is the value frozen into a submitted request.
    pub amount: Decimal,
    /// `amount` rounded to cents, midpoint away from zero.
    pub display_amount: Decimal,
    pub currency: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RateCalculator;

impl RateCalculator {
    pub fn quote(
        &self,
        length: Decimal,
        width: Decimal,
        days: i64,
        config: &RateConfig,
    ) -> RateQuote {
        let area = billable_area(length, width, config.unit_conversion_factor);
        let billable_days = billable_days(days);
        let amount = (area * config.rate_per_unit_area * Decimal::from(billable_days)).normalize();

        RateQuote {
            area,
            area_unit: config.area_unit.clone(),
            days,
            billable_days,
            rate_per_unit_area: config.rate_per_unit_area,
            amount,
            display_amount: display_amount(amount),
            currency: config.currency.clone(),
        }
    }

    pub fn quote_for_dates(
        &self,
        length: Decimal,
        width: Decimal,
        date_in: NaiveDate,
        date_out: NaiveDate,
        config: &RateConfig,
    ) -> RateQuote {
        self.quote(length, width, (date_out - date_in).num_days(), config)
    }
}

pub fn billable_area(length: Decimal, width: Decimal, unit_conversion_factor: Decimal) -> Decimal {
    length * width * unit_conversion_factor
}

pub fn display_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Same-day and inverted ranges still bill one day.
pub fn billable_days(days: i64) -> i64 {
    days.max(1)
}
