use chrono::NaiveDate;
use serde::Serialize;

/// Daily account lifecycle counters. One row per calendar date, counters
/// never decrease.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccountActivity {
    pub activity_date: NaiveDate,
    pub accounts_added: i64,
    pub accounts_deleted: i64,
    pub accounts_active: i64,
    pub active_open_dataset: i64,
    pub active_member: i64,
}
