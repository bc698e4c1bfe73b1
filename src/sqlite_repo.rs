use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, Agreement, AgreementType, Membership, NewAccount};
use crate::models::activity::AccountActivity;
use crate::repository::{AccountRepository, ActivityRepository};
use crate::util::now_millis;

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Attach agreements and membership to a bare account row.
    async fn hydrate_account(
        &self,
        id: String,
        email_address: Option<String>,
        federated_platform: Option<String>,
    ) -> Result<Account, AppError> {
        let agreements: Vec<Agreement> = sqlx::query_as(
            "SELECT agreement_type, accept_date FROM agreements WHERE account_id = ?",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let membership: Option<Membership> = sqlx::query_as(
            "SELECT membership_type, start_date FROM memberships WHERE account_id = ?",
        )
        .bind(&id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Account {
            id,
            email_address,
            federated_platform,
            agreements,
            membership,
        })
    }

    async fn fetch_account(
        &self,
        sql: &str,
        bind_value: &str,
    ) -> Result<Option<Account>, AppError> {
        let row: Option<(String, Option<String>, Option<String>)> = sqlx::query_as(sql)
            .bind(bind_value)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((id, email, platform)) => {
                Ok(Some(self.hydrate_account(id, email, platform).await?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AccountRepository for SqliteRepository {
    async fn add_account(&self, new: &NewAccount) -> Result<String, AppError> {
        let account_id = Uuid::new_v4().to_string();
        tracing::debug!(account_id = %account_id, "db: INSERT account with agreements");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO accounts (id, email_address, password, federated_platform, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&account_id)
        .bind(&new.email_address)
        .bind(&new.password_hash)
        .bind(&new.federated_platform)
        .bind(now_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("email address already registered".into())
            }
            _ => AppError::Database(e),
        })?;

        for agreement_type in [AgreementType::TermsOfUse, AgreementType::PrivacyPolicy] {
            sqlx::query(
                "INSERT INTO agreements (id, account_id, agreement_type, accept_date) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&account_id)
            .bind(agreement_type)
            .bind(new.accept_date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(account_id = %account_id, "db: account and agreements inserted");

        Ok(account_id)
    }

    async fn get_account_by_id(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        tracing::debug!(account_id = %account_id, "db: SELECT account by id");
        self.fetch_account(
            "SELECT id, email_address, federated_platform FROM accounts WHERE id = ?",
            account_id,
        )
        .await
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        tracing::debug!("db: SELECT account by email");
        self.fetch_account(
            "SELECT id, email_address, federated_platform FROM accounts WHERE email_address = ?",
            email,
        )
        .await
    }

    async fn get_account_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<Account>, AppError> {
        tracing::debug!(device_id = %device_id, "db: SELECT account by device id");
        self.fetch_account(
            "SELECT a.id, a.email_address, a.federated_platform \
             FROM accounts a JOIN devices d ON d.account_id = a.id WHERE d.id = ?",
            device_id,
        )
        .await
    }

    async fn delete_account(&self, account_id: &str) -> Result<bool, AppError> {
        tracing::debug!(account_id = %account_id, "db: DELETE account (cascade)");

        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        tracing::debug!(
            account_id = %account_id,
            rows_affected = result.rows_affected(),
            deleted,
            "db: delete result"
        );

        Ok(deleted)
    }

    async fn add_device(&self, account_id: &str, name: &str) -> Result<String, AppError> {
        let device_id = Uuid::new_v4().to_string();
        tracing::debug!(account_id = %account_id, device_id = %device_id, "db: INSERT device");

        sqlx::query("INSERT INTO devices (id, account_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&device_id)
            .bind(account_id)
            .bind(name)
            .bind(now_millis())
            .execute(&self.pool)
            .await?;

        Ok(device_id)
    }

    async fn add_membership(
        &self,
        account_id: &str,
        membership_type: &str,
        start_date: NaiveDate,
    ) -> Result<(), AppError> {
        tracing::debug!(account_id = %account_id, membership_type, "db: UPSERT membership");

        sqlx::query(
            "INSERT INTO memberships (account_id, membership_type, start_date) VALUES (?, ?, ?) \
             ON CONFLICT (account_id) DO UPDATE SET \
               membership_type = excluded.membership_type, \
               start_date = excluded.start_date",
        )
        .bind(account_id)
        .bind(membership_type)
        .bind(start_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityRepository for SqliteRepository {
    async fn increment_accounts_added(&self, date: NaiveDate) -> Result<(), AppError> {
        tracing::debug!(date = %date, "db: increment accounts_added");

        // One statement: no window between a failed update and an insert
        sqlx::query(
            "INSERT INTO account_activity (activity_date, accounts_added) VALUES (?, 1) \
             ON CONFLICT (activity_date) DO UPDATE SET accounts_added = accounts_added + 1",
        )
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_accounts_deleted(&self, date: NaiveDate) -> Result<(), AppError> {
        tracing::debug!(date = %date, "db: increment accounts_deleted");

        sqlx::query(
            "INSERT INTO account_activity (activity_date, accounts_deleted) VALUES (?, 1) \
             ON CONFLICT (activity_date) DO UPDATE SET accounts_deleted = accounts_deleted + 1",
        )
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_activity_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Option<AccountActivity>, AppError> {
        tracing::debug!(date = %date, "db: SELECT account_activity by date");

        let row: Option<AccountActivity> = sqlx::query_as(
            "SELECT activity_date, accounts_added, accounts_deleted, accounts_active, \
                    active_open_dataset, active_member \
             FROM account_activity WHERE activity_date = ?",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        tracing::debug!(date = %date, found = row.is_some(), "db: activity row result");

        Ok(row)
    }
}
