use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use url::Url;

/// Decimal places of the `NUMERIC(12, 2)` credit and amount columns.
pub const STORED_SCALE: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Credit economy knobs, fixed per deployment.
#[derive(Debug, Clone)]
pub struct RewardsConfig {
    pub max_credits: Decimal,
    pub min_withdrawal: Decimal,
    pub ad_reward: Decimal,
    pub ad_duration: std::time::Duration,
    pub withdraw_cooldown: time::Duration,
    /// Decimal places accepted in a withdrawal amount.
    pub amount_scale: u32,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            max_credits: dec!(80),
            min_withdrawal: dec!(7),
            ad_reward: dec!(0.5),
            ad_duration: std::time::Duration::from_millis(3000),
            withdraw_cooldown: time::Duration::days(3),
            amount_scale: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub users_url: Url,
    pub avatar_url: Url,
    pub timeout: std::time::Duration,
    pub relink_resets_credits: bool,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub export_offset: time::UtcOffset,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            export_offset: time::UtcOffset::UTC,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub admin_emails: Vec<String>,
    pub rewards: RewardsConfig,
    pub identity: IdentityConfig,
    pub ledger: LedgerConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "adcredits".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "adcredits-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };
        let admin_emails = parse_email_list(&std::env::var("ADMIN_EMAILS").unwrap_or_default());

        let defaults = RewardsConfig::default();
        let rewards = RewardsConfig {
            max_credits: env_or("REWARDS_MAX_CREDITS", defaults.max_credits)?,
            min_withdrawal: env_or("REWARDS_MIN_WITHDRAWAL", defaults.min_withdrawal)?,
            ad_reward: env_or("REWARDS_AD_REWARD", defaults.ad_reward)?,
            ad_duration: std::time::Duration::from_millis(env_or("REWARDS_AD_DURATION_MS", 3000)?),
            withdraw_cooldown: time::Duration::hours(env_or(
                "REWARDS_WITHDRAW_COOLDOWN_HOURS",
                72,
            )?),
            amount_scale: env_or("REWARDS_AMOUNT_SCALE", defaults.amount_scale)?,
        };
        rewards.validate()?;

        let identity = IdentityConfig {
            users_url: env_or(
                "IDENTITY_USERS_URL",
                Url::parse("https://users.roproxy.com/v1/usernames/users")?,
            )?,
            avatar_url: env_or(
                "IDENTITY_AVATAR_URL",
                Url::parse("https://thumbnails.roproxy.com/v1/users/avatar-headshot")?,
            )?,
            timeout: std::time::Duration::from_millis(env_or("IDENTITY_TIMEOUT_MS", 5000)?),
            relink_resets_credits: env_or("IDENTITY_RELINK_RESETS_CREDITS", true)?,
        };

        let offset_minutes: i32 = env_or("LEDGER_EXPORT_UTC_OFFSET_MINUTES", 0)?;
        let ledger = LedgerConfig {
            export_offset: time::UtcOffset::from_whole_seconds(offset_minutes * 60)
                .context("LEDGER_EXPORT_UTC_OFFSET_MINUTES out of range")?,
        };

        Ok(Self {
            database_url,
            jwt,
            admin_emails,
            rewards,
            identity,
            ledger,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }
}

impl RewardsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_credits > Decimal::ZERO, "max credits must be positive");
        anyhow::ensure!(self.ad_reward > Decimal::ZERO, "ad reward must be positive");
        anyhow::ensure!(
            self.min_withdrawal > Decimal::ZERO,
            "minimum withdrawal must be positive"
        );
        anyhow::ensure!(
            self.min_withdrawal <= self.max_credits,
            "minimum withdrawal {} exceeds max credits {}",
            self.min_withdrawal,
            self.max_credits
        );
        anyhow::ensure!(
            self.amount_scale <= STORED_SCALE,
            "amount scale {} exceeds stored precision of {STORED_SCALE} places",
            self.amount_scale
        );
        for (name, value) in [
            ("max credits", self.max_credits),
            ("minimum withdrawal", self.min_withdrawal),
            ("ad reward", self.ad_reward),
        ] {
            anyhow::ensure!(
                value.scale() <= STORED_SCALE,
                "{name} {value} has more than {STORED_SCALE} decimal places"
            );
        }
        anyhow::ensure!(
            self.withdraw_cooldown >= time::Duration::ZERO,
            "withdraw cooldown must not be negative"
        );
        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
