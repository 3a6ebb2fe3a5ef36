use crate::auth::repo_types::User;
use sqlx::PgPool;
use uuid::Uuid;

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_admin, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_admin, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// New accounts start with zero credits and no linked identity.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, is_admin)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, is_admin, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(is_admin)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}
