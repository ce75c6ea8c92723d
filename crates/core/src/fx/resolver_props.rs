//! Property-based tests for `FxResolver`.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use defter_shared::types::CurrencyCode;

use super::resolver::{FxPolicy, FxProvenance, FxResolver, RateQuote};

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

fn quotes_strategy() -> impl Strategy<Value = Vec<(u64, Decimal, bool)>> {
    prop::collection::vec((0u64..40, rate_strategy(), any::<bool>()), 0..10)
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

fn build(quotes: &[(u64, Decimal, bool)]) -> Vec<RateQuote> {
    let usd = CurrencyCode::parse("USD").unwrap();
    let eur = CurrencyCode::parse("EUR").unwrap();
    quotes
        .iter()
        .map(|(offset, rate, direct)| {
            let (from, to) = if *direct {
                (eur.clone(), usd.clone())
            } else {
                (usd.clone(), eur.clone())
            };
            RateQuote {
                from_currency: from,
                to_currency: to,
                rate: *rate,
                effective_date: base_date() + Days::new(*offset),
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The chosen quote always lies inside the policy window and provenance
    /// reflects whether it is dated on the requested day.
    #[test]
    fn prop_resolved_rate_respects_window(
        raw in quotes_strategy(),
        target_offset in 0u64..40,
        max_days in 0u32..10,
    ) {
        let quotes = build(&raw);
        let date = base_date() + Days::new(target_offset);
        let policy = FxPolicy::PriorDate { max_days };
        let eur = CurrencyCode::parse("EUR").unwrap();
        let usd = CurrencyCode::parse("USD").unwrap();

        let any_in_window = quotes
            .iter()
            .any(|q| q.effective_date <= date && q.effective_date >= policy.earliest(date));

        match FxResolver::resolve(&eur, &usd, date, policy, None, &quotes) {
            Ok(snap) => {
                prop_assert!(snap.rate > Decimal::ZERO);
                prop_assert!(snap.rate_date <= date);
                prop_assert!(snap.rate_date >= policy.earliest(date));
                prop_assert_eq!(snap.provenance == FxProvenance::Exact, snap.rate_date == date);
            }
            Err(_) => prop_assert!(!any_in_window),
        }
    }

    /// Exact-only never produces a fallback snapshot.
    #[test]
    fn prop_exact_only_never_falls_back(raw in quotes_strategy(), target_offset in 0u64..40) {
        let quotes = build(&raw);
        let date = base_date() + Days::new(target_offset);
        let eur = CurrencyCode::parse("EUR").unwrap();
        let usd = CurrencyCode::parse("USD").unwrap();

        if let Ok(snap) = FxResolver::resolve(&eur, &usd, date, FxPolicy::ExactOnly, None, &quotes) {
            prop_assert_eq!(snap.provenance, FxProvenance::Exact);
            prop_assert_eq!(snap.rate_date, date);
        }
    }
}
