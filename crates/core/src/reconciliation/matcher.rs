//! Rule selection for statement lines.

use regex::RegexBuilder;

use super::error::ReconciliationError;
use super::types::{BankStatementLine, PostingRule};

/// Stateless rule matcher.
pub struct RuleMatcher;

impl RuleMatcher {
    /// Returns the lowest-priority-number rule matching `line`.
    ///
    /// A rule matches when every criterion it sets holds:
    /// - direction equals the line's direction
    /// - description matches the pattern (case-insensitive)
    /// - reference starts with the prefix
    /// - the absolute amount lies within `[min_amount, max_amount]`
    ///
    /// Ties on priority are broken by rule id so the choice is stable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` when an evaluated rule's pattern does not compile.
    pub fn select<'r>(
        line: &BankStatementLine,
        rules: &'r [PostingRule],
    ) -> Result<Option<&'r PostingRule>, ReconciliationError> {
        let mut ordered: Vec<&PostingRule> = rules.iter().collect();
        ordered.sort_by_key(|r| (r.priority, r.id));

        for rule in ordered {
            if Self::matches(line, rule)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    fn matches(line: &BankStatementLine, rule: &PostingRule) -> Result<bool, ReconciliationError> {
        if rule.direction.is_some_and(|d| d != line.direction()) {
            return Ok(false);
        }

        let amount = line.amount.abs();
        if rule.min_amount.is_some_and(|min| amount < min) || rule.max_amount.is_some_and(|max| amount > max) {
            return Ok(false);
        }

        if let Some(prefix) = &rule.reference_prefix {
            let starts = line
                .reference
                .as_deref()
                .is_some_and(|r| r.starts_with(prefix.as_str()));
            if !starts {
                return Ok(false);
            }
        }

        if let Some(pattern) = &rule.description_pattern {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ReconciliationError::InvalidPattern {
                    rule: rule.id,
                    reason: e.to_string(),
                })?;
            if !re.is_match(&line.description) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
