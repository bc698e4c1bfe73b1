use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::AppError;
use crate::util::today_utc;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub date: Option<NaiveDate>,
}

/// GET /api/account/activity?date=YYYY-MM-DD — daily account lifecycle
/// counters, defaulting to today. 404 when nothing happened that day.
pub async fn get_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let date = params.date.unwrap_or_else(today_utc);

    tracing::info!(
        handler = "get_activity",
        date = %date,
        "Handler: GET /api/account/activity"
    );

    let activity = state
        .activity
        .get_activity_by_date(date)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no account activity recorded for {date}")))?;

    Ok(Json(activity))
}
