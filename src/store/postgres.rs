use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::repo_types::RewardAccountRow;
use super::{NewWithdrawal, RewardAccount, RewardStore, SortOrder, StoreError, WithdrawalRequest};

#[derive(Clone)]
pub struct PgRewardStore {
    db: PgPool,
}

impl PgRewardStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn update_account_tx(
    tx: &mut Transaction<'_, Postgres>,
    account: &RewardAccount,
) -> Result<RewardAccount, StoreError> {
    let (username, external_id, avatar_url) = match &account.identity {
        Some(i) => (
            Some(i.username.as_str()),
            Some(i.external_id.as_str()),
            i.avatar_url.as_deref(),
        ),
        None => (None, None, None),
    };

    let row = sqlx::query_as::<_, RewardAccountRow>(
        r#"
        UPDATE users
           SET external_username = $3,
               external_id = $4,
               avatar_url = $5,
               credits = $6,
               last_withdrawal_at = $7,
               version = version + 1
         WHERE id = $1 AND version = $2
        RETURNING id, external_username, external_id, avatar_url,
                  credits, last_withdrawal_at, version
        "#,
    )
    .bind(account.user_id)
    .bind(account.version)
    .bind(username)
    .bind(external_id)
    .bind(avatar_url)
    .bind(account.credits)
    .bind(account.last_withdrawal_at)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some(row) => Ok(row.into()),
        None => {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
                .bind(account.user_id)
                .fetch_optional(&mut **tx)
                .await?;
            if exists.is_some() {
                Err(StoreError::Conflict(account.user_id))
            } else {
                Err(StoreError::NotFound(account.user_id))
            }
        }
    }
}

#[async_trait]
impl RewardStore for PgRewardStore {
    async fn get_account(&self, user_id: Uuid) -> Result<Option<RewardAccount>, StoreError> {
        let row = sqlx::query_as::<_, RewardAccountRow>(
            r#"
            SELECT id, external_username, external_id, avatar_url,
                   credits, last_withdrawal_at, version
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(RewardAccount::from))
    }

    async fn put_account(&self, account: &RewardAccount) -> Result<RewardAccount, StoreError> {
        let mut tx = self.db.begin().await?;
        let updated = update_account_tx(&mut tx, account).await?;
        tx.commit().await?;
        debug!(user_id = %updated.user_id, version = updated.version, "account stored");
        Ok(updated)
    }

    async fn record_withdrawal(
        &self,
        account: &RewardAccount,
        withdrawal: NewWithdrawal,
    ) -> Result<(RewardAccount, WithdrawalRequest), StoreError> {
        let mut tx = self.db.begin().await?;
        let updated = update_account_tx(&mut tx, account).await?;

        let record = sqlx::query_as::<_, WithdrawalRequest>(
            r#"
            INSERT INTO withdrawal_requests (external_username, external_id, amount, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, external_username, external_id, amount, created_at
            "#,
        )
        .bind(&withdrawal.external_username)
        .bind(&withdrawal.external_id)
        .bind(withdrawal.amount)
        .bind(withdrawal.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(user_id = %updated.user_id, withdrawal_id = %record.id, "withdrawal stored");
        Ok((updated, record))
    }

    async fn list_withdrawals(
        &self,
        order: SortOrder,
    ) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let sql = match order {
            SortOrder::Desc => {
                r#"
                SELECT id, external_username, external_id, amount, created_at
                FROM withdrawal_requests
                ORDER BY created_at DESC, seq DESC
                "#
            }
            SortOrder::Asc => {
                r#"
                SELECT id, external_username, external_id, amount, created_at
                FROM withdrawal_requests
                ORDER BY created_at ASC, seq ASC
                "#
            }
        };
        let rows = sqlx::query_as::<_, WithdrawalRequest>(sql)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }
}
