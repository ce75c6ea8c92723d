//! Rate resolution under an exact-date or prior-date policy.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use defter_shared::config::{FxFallbackPolicy, PostingConfig};
use defter_shared::types::CurrencyCode;
use defter_shared::types::money::round_money;

use super::error::FxError;

/// Decimal places kept on inverted rates.
const RATE_SCALE: u32 = 10;

/// Fallback policy for dates without a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FxPolicy {
    /// A quote must exist on the requested date.
    ExactOnly,
    /// The nearest earlier quote within `max_days` is accepted.
    PriorDate {
        /// Maximum number of days to look back.
        max_days: u32,
    },
}

impl FxPolicy {
    /// Builds the policy from posting configuration.
    #[must_use]
    pub const fn from_config(config: &PostingConfig) -> Self {
        match config.fx_fallback_policy {
            FxFallbackPolicy::ExactOnly => Self::ExactOnly,
            FxFallbackPolicy::PriorDate => Self::PriorDate {
                max_days: config.fx_fallback_max_days,
            },
        }
    }

    /// Number of days before `date` that may supply a quote.
    #[must_use]
    pub const fn window_days(self) -> u32 {
        match self {
            Self::ExactOnly => 0,
            Self::PriorDate { max_days } => max_days,
        }
    }

    /// Earliest acceptable quote date.
    #[must_use]
    pub fn earliest(self, date: NaiveDate) -> NaiveDate {
        date.checked_sub_days(Days::new(u64::from(self.window_days())))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// How a snapshot rate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxProvenance {
    /// Quote dated on the transaction date, or same currency.
    Exact,
    /// Nearest earlier quote within the fallback window.
    Fallback,
    /// Caller-supplied rate.
    Override,
}

impl FxProvenance {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::Fallback => "FALLBACK",
            Self::Override => "OVERRIDE",
        }
    }
}

impl std::str::FromStr for FxProvenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXACT" => Ok(Self::Exact),
            "FALLBACK" => Ok(Self::Fallback),
            "OVERRIDE" => Ok(Self::Override),
            other => Err(format!("Unknown FX provenance: {other}")),
        }
    }
}

/// A stored exchange-rate quote (`1 from = rate to`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateQuote {
    /// Source currency.
    pub from_currency: CurrencyCode,
    /// Target currency.
    pub to_currency: CurrencyCode,
    /// Rate.
    pub rate: Decimal,
    /// Date the quote applies to.
    pub effective_date: NaiveDate,
}

/// Rate frozen onto a document at creation time. Never re-resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxSnapshot {
    /// Transaction-to-base rate.
    pub rate: Decimal,
    /// How the rate was obtained.
    pub provenance: FxProvenance,
    /// Date of the quote used (the transaction date for overrides).
    pub rate_date: NaiveDate,
}

impl FxSnapshot {
    /// Identity snapshot for same-currency documents.
    #[must_use]
    pub const fn identity(date: NaiveDate) -> Self {
        Self {
            rate: Decimal::ONE,
            provenance: FxProvenance::Exact,
            rate_date: date,
        }
    }

    /// Converts a transaction amount to base currency with banker's rounding.
    #[must_use]
    pub fn to_base(&self, amount: Decimal, scale: u32) -> Decimal {
        round_money(amount * self.rate, scale)
    }
}

/// Stateless rate resolver.
pub struct FxResolver;

impl FxResolver {
    /// Resolves the transaction-to-base rate for `date`.
    ///
    /// Lookup order:
    /// 1. Same currency resolves to 1 (EXACT)
    /// 2. An override, when supplied, is used as is (OVERRIDE)
    /// 3. The most recent quote inside the policy window, direct or inverted;
    ///    on equal dates the direct quote wins
    ///
    /// A quote dated `date` is EXACT, an earlier one is FALLBACK.
    ///
    /// # Errors
    ///
    /// Returns `FxError::RateNotFound` when the window holds no quote and
    /// `FxError::NonPositiveRate` for a non-positive override or quote.
    pub fn resolve(
        txn_currency: &CurrencyCode,
        base_currency: &CurrencyCode,
        date: NaiveDate,
        policy: FxPolicy,
        override_rate: Option<Decimal>,
        quotes: &[RateQuote],
    ) -> Result<FxSnapshot, FxError> {
        if txn_currency == base_currency {
            return Ok(FxSnapshot::identity(date));
        }

        if let Some(rate) = override_rate {
            if rate <= Decimal::ZERO {
                return Err(FxError::NonPositiveRate(rate));
            }
            return Ok(FxSnapshot {
                rate,
                provenance: FxProvenance::Override,
                rate_date: date,
            });
        }

        let earliest = policy.earliest(date);
        let in_window = |q: &&RateQuote| q.effective_date <= date && q.effective_date >= earliest;

        let direct = quotes
            .iter()
            .filter(|q| &q.from_currency == txn_currency && &q.to_currency == base_currency)
            .filter(in_window)
            .max_by_key(|q| q.effective_date);
        let inverse = quotes
            .iter()
            .filter(|q| &q.from_currency == base_currency && &q.to_currency == txn_currency)
            .filter(in_window)
            .max_by_key(|q| q.effective_date);

        let (rate, rate_date) = match (direct, inverse) {
            (Some(d), Some(i)) if i.effective_date > d.effective_date => {
                (Self::invert(i.rate)?, i.effective_date)
            }
            (Some(d), _) => (Self::positive(d.rate)?, d.effective_date),
            (None, Some(i)) => (Self::invert(i.rate)?, i.effective_date),
            (None, None) => {
                return Err(FxError::RateNotFound {
                    from: txn_currency.to_string(),
                    to: base_currency.to_string(),
                    date,
                    searched_days: policy.window_days(),
                });
            }
        };

        let provenance = if rate_date == date {
            FxProvenance::Exact
        } else {
            FxProvenance::Fallback
        };
        Ok(FxSnapshot {
            rate,
            provenance,
            rate_date,
        })
    }

    fn positive(rate: Decimal) -> Result<Decimal, FxError> {
        if rate > Decimal::ZERO {
            Ok(rate)
        } else {
            Err(FxError::NonPositiveRate(rate))
        }
    }

    fn invert(rate: Decimal) -> Result<Decimal, FxError> {
        let rate = Self::positive(rate)?;
        Ok((Decimal::ONE / rate).round_dp(RATE_SCALE))
    }
}
