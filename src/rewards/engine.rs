use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::error::RewardsError;
use super::locks::{AdViewRegistry, UserLocks};
use super::policy::{self, Cooldown};
use crate::config::RewardsConfig;
use crate::store::{NewWithdrawal, RewardAccount, RewardStore, StoreError, WithdrawalRequest};

/// Stale-version retries per mutation, all under the user lock.
const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdViewOutcome {
    pub credits: Decimal,
    pub max_credits: Decimal,
    /// True when the reward was cut short by the cap.
    pub capped: bool,
}

/// Result of a committed withdrawal: the ledger record and the account as
/// stored by the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalReceipt {
    pub withdrawal: WithdrawalRequest,
    pub account: RewardAccount,
}

/// Owns every rule that changes `credits` or `last_withdrawal_at`.
#[derive(Clone)]
pub struct CreditEngine {
    store: Arc<dyn RewardStore>,
    cfg: Arc<RewardsConfig>,
    locks: UserLocks,
    ad_views: AdViewRegistry,
}

impl CreditEngine {
    pub fn new(store: Arc<dyn RewardStore>, cfg: Arc<RewardsConfig>, locks: UserLocks) -> Self {
        Self {
            store,
            cfg,
            locks,
            ad_views: AdViewRegistry::new(),
        }
    }

    pub fn config(&self) -> &RewardsConfig {
        &self.cfg
    }

    pub async fn account(&self, user_id: Uuid) -> Result<RewardAccount, RewardsError> {
        self.store
            .get_account(user_id)
            .await?
            .ok_or(RewardsError::UnknownUser(user_id))
    }

    async fn linked_account(&self, user_id: Uuid) -> Result<RewardAccount, RewardsError> {
        let account = self.account(user_id).await?;
        if account.identity.is_none() {
            return Err(RewardsError::IdentityNotLinked);
        }
        Ok(account)
    }

    pub fn is_withdrawal_eligible(&self, account: &RewardAccount, now: OffsetDateTime) -> bool {
        policy::is_withdrawal_eligible(&self.cfg, account, now)
    }

    pub fn time_until_eligible(&self, account: &RewardAccount, now: OffsetDateTime) -> Cooldown {
        policy::time_until_eligible(&self.cfg, account, now)
    }

    /// Credits one completed ad view after `ad_duration`. Dropping the
    /// returned future before then credits nothing.
    #[instrument(skip(self))]
    pub async fn record_ad_view(&self, user_id: Uuid) -> Result<AdViewOutcome, RewardsError> {
        let account = self.linked_account(user_id).await?;
        if account.credits >= self.cfg.max_credits {
            warn!(%user_id, credits = %account.credits, "ad view rejected at cap");
            return Err(RewardsError::CreditCapReached {
                max: self.cfg.max_credits,
            });
        }

        let Some(_ticket) = self.ad_views.try_begin(user_id) else {
            warn!(%user_id, "ad view already in flight");
            return Err(RewardsError::AdViewInFlight);
        };

        tokio::time::sleep(self.cfg.ad_duration).await;

        let _guard = self.locks.lock(user_id).await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut account = self.linked_account(user_id).await?;
            let before = account.credits;
            account.credits = policy::accrue(&self.cfg, before);
            let capped = account.credits - before < self.cfg.ad_reward;

            match self.store.put_account(&account).await {
                Ok(saved) => {
                    info!(%user_id, before = %before, credits = %saved.credits, capped, "ad view credited");
                    return Ok(AdViewOutcome {
                        credits: saved.credits,
                        max_credits: self.cfg.max_credits,
                        capped,
                    });
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(%user_id, attempt, "stale account on ad view, retrying");
                }
                Err(e) => {
                    error!(%user_id, error = %e, "ad view credit failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Parses `raw_amount` and, if every check passes, records the
    /// withdrawal, debits the balance and starts the cooldown in one
    /// store transaction.
    #[instrument(skip(self))]
    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        raw_amount: &str,
        now: OffsetDateTime,
    ) -> Result<WithdrawalReceipt, RewardsError> {
        let amount = policy::parse_amount(&self.cfg, raw_amount).map_err(|e| {
            warn!(%user_id, raw_amount, "invalid withdrawal amount");
            e
        })?;
        self.withdraw(user_id, amount, now).await
    }

    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        user_id: Uuid,
        amount: Decimal,
        now: OffsetDateTime,
    ) -> Result<WithdrawalReceipt, RewardsError> {
        if amount <= Decimal::ZERO {
            return Err(RewardsError::InvalidAmount);
        }
        if amount < self.cfg.min_withdrawal {
            warn!(%user_id, %amount, "withdrawal below minimum");
            return Err(RewardsError::BelowMinimum {
                minimum: self.cfg.min_withdrawal,
            });
        }

        let _guard = self.locks.lock(user_id).await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let account = self.linked_account(user_id).await?;
            let identity = account
                .identity
                .clone()
                .ok_or(RewardsError::IdentityNotLinked)?;

            if amount > account.credits {
                warn!(%user_id, %amount, available = %account.credits, "insufficient balance");
                return Err(RewardsError::InsufficientBalance {
                    requested: amount,
                    available: account.credits,
                });
            }
            if let Some(remaining) = self.time_until_eligible(&account, now).remaining() {
                warn!(%user_id, remaining_seconds = remaining.whole_seconds(), "withdrawal cooldown active");
                return Err(RewardsError::CooldownActive { remaining });
            }

            let updated = RewardAccount {
                credits: account.credits - amount,
                last_withdrawal_at: Some(now),
                ..account
            };
            let withdrawal = NewWithdrawal {
                external_username: identity.username,
                external_id: identity.external_id,
                amount,
                created_at: now,
            };

            match self.store.record_withdrawal(&updated, withdrawal).await {
                Ok((saved, record)) => {
                    info!(
                        %user_id,
                        withdrawal_id = %record.id,
                        %amount,
                        credits = %saved.credits,
                        "withdrawal requested"
                    );
                    return Ok(WithdrawalReceipt {
                        withdrawal: record,
                        account: saved,
                    });
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(%user_id, attempt, "stale account on withdrawal, retrying");
                }
                Err(e) => {
                    error!(%user_id, error = %e, "withdrawal failed");
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use rust_decimal_macros::dec;
    use time::macros::datetime;
    use time::Duration;

    use super::*;
    use crate::store::{ExternalIdentity, InMemoryRewardStore, MockRewardStore, SortOrder};

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    fn identity() -> ExternalIdentity {
        ExternalIdentity {
            username: "builderman".into(),
            external_id: "156".into(),
            avatar_url: Some("https://cdn.example/156.png".into()),
        }
    }

    fn linked(user_id: Uuid, credits: Decimal) -> RewardAccount {
        RewardAccount {
            identity: Some(identity()),
            credits,
            ..RewardAccount::new(user_id)
        }
    }

    async fn engine_with(account: RewardAccount) -> (CreditEngine, InMemoryRewardStore) {
        let store = InMemoryRewardStore::new();
        store.insert_account(account).await;
        let engine = CreditEngine::new(
            Arc::new(store.clone()),
            Arc::new(RewardsConfig::default()),
            UserLocks::new(),
        );
        (engine, store)
    }

    async fn credits(store: &InMemoryRewardStore, user_id: Uuid) -> Decimal {
        store.get_account(user_id).await.unwrap().unwrap().credits
    }

    #[tokio::test(start_paused = true)]
    async fn ad_view_credits_after_duration() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(0))).await;

        let started = tokio::time::Instant::now();
        let outcome = engine.record_ad_view(user_id).await.unwrap();
        assert!(started.elapsed() >= StdDuration::from_millis(3000));
        assert_eq!(outcome.credits, dec!(0.5));
        assert!(!outcome.capped);
        assert_eq!(credits(&store, user_id).await, dec!(0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn ad_view_clamps_to_cap() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(79.8))).await;

        let outcome = engine.record_ad_view(user_id).await.unwrap();
        assert_eq!(outcome.credits, dec!(80));
        assert!(outcome.capped);
        assert_eq!(credits(&store, user_id).await, dec!(80));
    }

    #[tokio::test(start_paused = true)]
    async fn ad_view_at_cap_is_rejected_without_waiting() {
        let user_id = Uuid::new_v4();
        let (engine, _store) = engine_with(linked(user_id, dec!(80))).await;

        let started = tokio::time::Instant::now();
        let err = engine.record_ad_view(user_id).await.unwrap_err();
        assert_eq!(err, RewardsError::CreditCapReached { max: dec!(80) });
        assert_eq!(started.elapsed(), StdDuration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_ad_views_never_leave_range() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(77))).await;

        for _ in 0..10 {
            let _ = engine.record_ad_view(user_id).await;
            let c = credits(&store, user_id).await;
            assert!(c >= dec!(0) && c <= dec!(80), "credits out of range: {c}");
        }
        assert_eq!(credits(&store, user_id).await, dec!(80));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ad_view_is_rejected() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(1))).await;

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.record_ad_view(user_id).await })
        };
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        let err = engine.record_ad_view(user_id).await.unwrap_err();
        assert_eq!(err, RewardsError::AdViewInFlight);

        first.await.unwrap().unwrap();
        assert_eq!(credits(&store, user_id).await, dec!(1.5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_ad_view_credits_nothing_and_frees_slot() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(2))).await;

        let view = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.record_ad_view(user_id).await })
        };
        tokio::time::sleep(StdDuration::from_millis(1500)).await;
        view.abort();
        assert!(view.await.unwrap_err().is_cancelled());

        tokio::time::sleep(StdDuration::from_secs(5)).await;
        assert_eq!(credits(&store, user_id).await, dec!(2));

        let outcome = engine.record_ad_view(user_id).await.unwrap();
        assert_eq!(outcome.credits, dec!(2.5));
    }

    #[tokio::test]
    async fn unlinked_user_cannot_use_engine() {
        let user_id = Uuid::new_v4();
        let (engine, _store) = engine_with(RewardAccount {
            credits: dec!(20),
            ..RewardAccount::new(user_id)
        })
        .await;

        assert_eq!(
            engine.record_ad_view(user_id).await.unwrap_err(),
            RewardsError::IdentityNotLinked
        );
        assert_eq!(
            engine.request_withdrawal(user_id, "10", NOW).await.unwrap_err(),
            RewardsError::IdentityNotLinked
        );
    }

    #[tokio::test]
    async fn below_minimum_fails_regardless_of_balance() {
        let user_id = Uuid::new_v4();
        let (engine, _store) = engine_with(linked(user_id, dec!(80))).await;

        let err = engine.request_withdrawal(user_id, "5", NOW).await.unwrap_err();
        assert_eq!(err, RewardsError::BelowMinimum { minimum: dec!(7) });
    }

    #[tokio::test]
    async fn insufficient_balance_is_reported() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(8))).await;

        let err = engine.request_withdrawal(user_id, "10", NOW).await.unwrap_err();
        assert_eq!(
            err,
            RewardsError::InsufficientBalance {
                requested: dec!(10),
                available: dec!(8)
            }
        );
        assert_eq!(credits(&store, user_id).await, dec!(8));
    }

    #[tokio::test]
    async fn validation_order_first_failure_wins() {
        let user_id = Uuid::new_v4();
        let (engine, _store) = engine_with(RewardAccount {
            last_withdrawal_at: Some(NOW - Duration::hours(1)),
            ..linked(user_id, dec!(3))
        })
        .await;

        // invalid beats everything
        assert_eq!(
            engine.request_withdrawal(user_id, "-1", NOW).await.unwrap_err(),
            RewardsError::InvalidAmount
        );
        // below minimum beats balance and cooldown
        assert!(matches!(
            engine.request_withdrawal(user_id, "5", NOW).await.unwrap_err(),
            RewardsError::BelowMinimum { .. }
        ));
        // balance beats cooldown
        assert!(matches!(
            engine.request_withdrawal(user_id, "10", NOW).await.unwrap_err(),
            RewardsError::InsufficientBalance { .. }
        ));
    }

    #[tokio::test]
    async fn successful_withdrawal_then_cooldown() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(20))).await;

        let receipt = engine.request_withdrawal(user_id, "10", NOW).await.unwrap();
        assert_eq!(receipt.account.credits, dec!(10));
        assert_eq!(receipt.account.last_withdrawal_at, Some(NOW));
        let record = receipt.withdrawal;
        assert_eq!(record.amount, dec!(10));
        assert_eq!(record.created_at, NOW);
        assert_eq!(record.external_username, "builderman");
        assert_eq!(record.external_id, "156");

        let account = store.get_account(user_id).await.unwrap().unwrap();
        assert_eq!(account.credits, dec!(10));
        assert_eq!(account.last_withdrawal_at, Some(NOW));
        assert_eq!(store.list_withdrawals(SortOrder::Desc).await.unwrap().len(), 1);

        let err = engine
            .request_withdrawal(user_id, "7", NOW + Duration::hours(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RewardsError::CooldownActive {
                remaining: Duration::days(3) - Duration::hours(1)
            }
        );
        assert_eq!(credits(&store, user_id).await, dec!(10));

        let later = NOW + Duration::days(3) + Duration::seconds(1);
        engine.request_withdrawal(user_id, "7", later).await.unwrap();
        let account = store.get_account(user_id).await.unwrap().unwrap();
        assert_eq!(account.credits, dec!(3));
        assert_eq!(account.last_withdrawal_at, Some(later));
    }

    #[tokio::test]
    async fn fractional_withdrawal_is_accepted() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(12.5))).await;

        let record = engine
            .request_withdrawal(user_id, "7.5", NOW)
            .await
            .unwrap()
            .withdrawal;
        assert_eq!(record.amount, dec!(7.5));
        assert_eq!(credits(&store, user_id).await, dec!(5));
    }

    #[tokio::test]
    async fn concurrent_withdrawals_are_serialized() {
        let user_id = Uuid::new_v4();
        let (engine, store) = engine_with(linked(user_id, dec!(15))).await;

        let (a, b) = tokio::join!(
            engine.request_withdrawal(user_id, "10", NOW),
            engine.request_withdrawal(user_id, "10", NOW),
        );
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert_eq!(credits(&store, user_id).await, dec!(5));
        assert_eq!(store.list_withdrawals(SortOrder::Desc).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_leaves_no_partial_state() {
        let user_id = Uuid::new_v4();
        let mut mock = MockRewardStore::new();
        mock.expect_get_account()
            .returning(move |id| Ok(Some(linked(id, dec!(20)))));
        mock.expect_record_withdrawal()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("connection reset".into())));
        let engine = CreditEngine::new(
            Arc::new(mock),
            Arc::new(RewardsConfig::default()),
            UserLocks::new(),
        );

        let err = engine.request_withdrawal(user_id, "10", NOW).await.unwrap_err();
        assert!(matches!(err, RewardsError::StorageUnavailable(_)));
    }

    fn committing_store() -> MockRewardStore {
        let mut mock = MockRewardStore::new();
        mock.expect_get_account()
            .times(1)
            .returning(move |id| Ok(Some(linked(id, dec!(20)))));
        mock.expect_record_withdrawal()
            .times(1)
            .returning(|account, withdrawal| {
                // numeric(12,2) hands amounts back at scale 2
                let mut amount = withdrawal.amount;
                amount.rescale(2);
                Ok((
                    RewardAccount {
                        version: account.version + 1,
                        ..account.clone()
                    },
                    WithdrawalRequest {
                        id: Uuid::new_v4(),
                        external_username: withdrawal.external_username,
                        external_id: withdrawal.external_id,
                        amount,
                        created_at: withdrawal.created_at,
                    },
                ))
            });
        mock
    }

    #[tokio::test]
    async fn receipt_carries_committed_account_without_rereading() {
        let user_id = Uuid::new_v4();
        let engine = CreditEngine::new(
            Arc::new(committing_store()),
            Arc::new(RewardsConfig::default()),
            UserLocks::new(),
        );

        let receipt = engine.request_withdrawal(user_id, "10", NOW).await.unwrap();
        assert_eq!(receipt.account.credits, dec!(10));
        assert_eq!(receipt.account.version, 1);
        assert_eq!(receipt.withdrawal.amount, dec!(10));
    }

    #[tokio::test]
    async fn stale_writes_are_retried_then_surfaced() {
        let user_id = Uuid::new_v4();
        let mut mock = MockRewardStore::new();
        mock.expect_get_account()
            .times(MAX_WRITE_ATTEMPTS)
            .returning(move |id| Ok(Some(linked(id, dec!(20)))));
        mock.expect_record_withdrawal()
            .times(MAX_WRITE_ATTEMPTS)
            .returning(|account, _| Err(StoreError::Conflict(account.user_id)));
        let engine = CreditEngine::new(
            Arc::new(mock),
            Arc::new(RewardsConfig::default()),
            UserLocks::new(),
        );

        let err = engine.request_withdrawal(user_id, "10", NOW).await.unwrap_err();
        assert!(matches!(err, RewardsError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let (engine, _store) = engine_with(linked(Uuid::new_v4(), dec!(1))).await;
        let stranger = Uuid::new_v4();
        assert_eq!(
            engine.record_ad_view(stranger).await.unwrap_err(),
            RewardsError::UnknownUser(stranger)
        );
    }
}
