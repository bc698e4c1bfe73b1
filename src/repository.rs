use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::account::{Account, NewAccount};
use crate::models::activity::AccountActivity;

/// Account aggregate: accounts with their agreements, devices and
/// membership. Agreements are only ever written as part of account
/// creation and removed by the cascading delete.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert the account and its two signup agreements in one
    /// transaction, returning the new account id.
    async fn add_account(&self, new: &NewAccount) -> Result<String, AppError>;
    async fn get_account_by_id(&self, account_id: &str) -> Result<Option<Account>, AppError>;
    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;
    /// Resolve the account owning a device, if any.
    async fn get_account_by_device_id(&self, device_id: &str)
        -> Result<Option<Account>, AppError>;
    /// Cascading delete: agreements, devices and membership go with the
    /// account. Returns false when no such account exists.
    async fn delete_account(&self, account_id: &str) -> Result<bool, AppError>;
    /// Register a device to an account, returning the device uuid.
    async fn add_device(&self, account_id: &str, name: &str) -> Result<String, AppError>;
    async fn add_membership(
        &self,
        account_id: &str,
        membership_type: &str,
        start_date: NaiveDate,
    ) -> Result<(), AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

/// Daily account-activity counters. Increments are atomic
/// insert-or-increment operations, safe against concurrent first writers
/// for the same date.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn increment_accounts_added(&self, date: NaiveDate) -> Result<(), AppError>;
    async fn increment_accounts_deleted(&self, date: NaiveDate) -> Result<(), AppError>;
    async fn get_activity_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Option<AccountActivity>, AppError>;
}
