//! Pure eligibility and accrual rules. No I/O; every function takes the
//! account and the wall-clock instant explicitly.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use super::error::RewardsError;
use crate::config::RewardsConfig;
use crate::store::RewardAccount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Cooldown {
    Ready,
    Waiting {
        #[serde(with = "time::serde::rfc3339")]
        eligible_at: OffsetDateTime,
        remaining_seconds: i64,
    },
}

impl Cooldown {
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Cooldown::Ready => None,
            Cooldown::Waiting {
                remaining_seconds, ..
            } => Some(Duration::seconds(*remaining_seconds)),
        }
    }
}

pub fn is_withdrawal_eligible(
    cfg: &RewardsConfig,
    account: &RewardAccount,
    now: OffsetDateTime,
) -> bool {
    match account.last_withdrawal_at {
        None => true,
        Some(last) => now - last >= cfg.withdraw_cooldown,
    }
}

pub fn time_until_eligible(
    cfg: &RewardsConfig,
    account: &RewardAccount,
    now: OffsetDateTime,
) -> Cooldown {
    match account.last_withdrawal_at {
        Some(last) if !is_withdrawal_eligible(cfg, account, now) => {
            let eligible_at = last + cfg.withdraw_cooldown;
            let remaining = eligible_at - now;
            Cooldown::Waiting {
                eligible_at,
                // round up so a sub-second wait never reads as zero
                remaining_seconds: (remaining + Duration::nanoseconds(999_999_999))
                    .whole_seconds()
                    .max(1),
            }
        }
        _ => Cooldown::Ready,
    }
}

/// Balance after one completed ad view, capped at `max_credits`.
pub fn accrue(cfg: &RewardsConfig, credits: Decimal) -> Decimal {
    (credits + cfg.ad_reward).min(cfg.max_credits)
}

/// Parses a user-supplied withdrawal amount. Accepts fractional values
/// up to `amount_scale` decimal places.
pub fn parse_amount(cfg: &RewardsConfig, raw: &str) -> Result<Decimal, RewardsError> {
    let raw = raw.trim();
    let amount = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| RewardsError::InvalidAmount)?
        .normalize();
    if amount <= Decimal::ZERO || amount.scale() > cfg.amount_scale {
        return Err(RewardsError::InvalidAmount);
    }
    Ok(amount)
}

/// Relative phrase for a wait, e.g. "in about 3 days".
pub fn humanize_wait(wait: Duration) -> String {
    let minutes = wait.whole_minutes();
    let hours = wait.whole_hours();
    if minutes < 1 {
        "in less than a minute".to_string()
    } else if minutes < 45 {
        format!("in {} minute{}", minutes, plural(minutes))
    } else if hours < 24 {
        let h = ((minutes + 30) / 60).max(1);
        format!("in about {} hour{}", h, plural(h))
    } else {
        let d = ((hours + 12) / 24).max(1);
        format!("in about {} day{}", d, plural(d))
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    fn account(last: Option<OffsetDateTime>) -> RewardAccount {
        RewardAccount {
            last_withdrawal_at: last,
            ..RewardAccount::new(Uuid::new_v4())
        }
    }

    #[test]
    fn never_withdrawn_is_eligible() {
        let cfg = RewardsConfig::default();
        let now = datetime!(2024-05-01 12:00 UTC);
        assert!(is_withdrawal_eligible(&cfg, &account(None), now));
        assert_eq!(time_until_eligible(&cfg, &account(None), now), Cooldown::Ready);
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let cfg = RewardsConfig::default();
        let last = datetime!(2024-05-01 12:00 UTC);
        let acc = account(Some(last));
        assert!(!is_withdrawal_eligible(&cfg, &acc, last + Duration::days(3) - Duration::seconds(1)));
        assert!(is_withdrawal_eligible(&cfg, &acc, last + Duration::days(3)));
    }

    #[test]
    fn time_until_eligible_is_remaining_window() {
        let cfg = RewardsConfig::default();
        let last = datetime!(2024-05-01 12:00 UTC);
        let now = last + Duration::hours(1);
        let state = time_until_eligible(&cfg, &account(Some(last)), now);
        assert_eq!(
            state,
            Cooldown::Waiting {
                eligible_at: datetime!(2024-05-04 12:00 UTC),
                remaining_seconds: (Duration::days(3) - Duration::hours(1)).whole_seconds(),
            }
        );
        assert!(state.remaining().unwrap() > Duration::ZERO);
    }

    #[test]
    fn sub_second_wait_still_reports_positive() {
        let cfg = RewardsConfig::default();
        let last = datetime!(2024-05-01 12:00 UTC);
        let now = last + Duration::days(3) - Duration::milliseconds(10);
        assert_eq!(
            time_until_eligible(&cfg, &account(Some(last)), now).remaining(),
            Some(Duration::seconds(1))
        );
    }

    #[test]
    fn accrue_clamps_at_cap() {
        let cfg = RewardsConfig::default();
        assert_eq!(accrue(&cfg, dec!(0)), dec!(0.5));
        assert_eq!(accrue(&cfg, dec!(79.8)), dec!(80));
        assert_eq!(accrue(&cfg, dec!(80)), dec!(80));
    }

    #[rstest]
    #[case("10", dec!(10))]
    #[case(" 7.5 ", dec!(7.5))]
    #[case("12.25", dec!(12.25))]
    fn parse_amount_accepts(#[case] raw: &str, #[case] expected: Decimal) {
        let cfg = RewardsConfig::default();
        assert_eq!(parse_amount(&cfg, raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("NaN")]
    #[case("Infinity")]
    #[case("0")]
    #[case("-5")]
    #[case("7.125")]
    fn parse_amount_rejects(#[case] raw: &str) {
        let cfg = RewardsConfig::default();
        assert_eq!(parse_amount(&cfg, raw), Err(RewardsError::InvalidAmount));
    }

    #[rstest]
    #[case(Duration::seconds(20), "in less than a minute")]
    #[case(Duration::minutes(1), "in 1 minute")]
    #[case(Duration::minutes(12), "in 12 minutes")]
    #[case(Duration::minutes(50), "in about 1 hour")]
    #[case(Duration::hours(5), "in about 5 hours")]
    #[case(Duration::days(3) - Duration::hours(1), "in about 3 days")]
    #[case(Duration::hours(30), "in about 1 day")]
    fn humanize_wait_phrases(#[case] wait: Duration, #[case] expected: &str) {
        assert_eq!(humanize_wait(wait), expected);
    }
}
