use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::reconcile::StoreError;
use crate::types::{AnomalyKind, AnomalyRecord, ProcessedEventRecord, ProcessedOutcome};

/// Position after the last row of a page, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorCursor {
    pub at: String,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct ListParams {
    pub limit: i64,
    pub before: Option<InspectorCursor>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_before: Option<InspectorCursor>,
}

pub async fn list_processed_events(
    pool: &SqlitePool,
    params: &ListParams,
) -> Result<Page<ProcessedEventRecord>, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT \
            event_id, \
            event_type, \
            outcome, \
            order_id, \
            processor_payment_id, \
            occurred_at, \
            processed_at \
        FROM processed_events \
        WHERE outcome != 'in_progress'",
    );

    if let Some(cursor) = &params.before {
        query.push(" AND (processed_at < ");
        query.push_bind(&cursor.at);
        query.push(" OR (processed_at = ");
        query.push_bind(&cursor.at);
        query.push(" AND event_id < ");
        query.push_bind(&cursor.id);
        query.push("))");
    }

    query.push(" ORDER BY processed_at DESC, event_id DESC LIMIT ");
    query.push_bind(params.limit + 1);

    let rows: Vec<ProcessedEventRow> = query.build_query_as().fetch_all(pool).await?;

    paginate(rows, params.limit, |row| {
        let cursor = InspectorCursor {
            at: row.processed_at.clone(),
            id: row.event_id.clone(),
        };
        Ok((ProcessedEventRecord::try_from(row)?, cursor))
    })
}

pub async fn list_anomalies(
    pool: &SqlitePool,
    params: &ListParams,
) -> Result<Page<AnomalyRecord>, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT \
            id, \
            event_id, \
            event_type, \
            kind, \
            correlation_id, \
            detail, \
            recorded_at \
        FROM webhook_anomalies \
        WHERE 1 = 1",
    );

    if let Some(cursor) = &params.before {
        query.push(" AND (recorded_at < ");
        query.push_bind(&cursor.at);
        query.push(" OR (recorded_at = ");
        query.push_bind(&cursor.at);
        query.push(" AND id < ");
        query.push_bind(&cursor.id);
        query.push("))");
    }

    query.push(" ORDER BY recorded_at DESC, id DESC LIMIT ");
    query.push_bind(params.limit + 1);

    let rows: Vec<AnomalyRow> = query.build_query_as().fetch_all(pool).await?;

    paginate(rows, params.limit, |row| {
        let cursor = InspectorCursor {
            at: row.recorded_at.clone(),
            id: row.id.clone(),
        };
        Ok((AnomalyRecord::try_from(row)?, cursor))
    })
}

fn paginate<R, T>(
    rows: Vec<R>,
    limit: i64,
    convert: impl Fn(R) -> Result<(T, InspectorCursor), StoreError>,
) -> Result<Page<T>, StoreError> {
    let has_more = rows.len() > limit as usize;
    let take_count = if has_more { limit as usize } else { rows.len() };

    let mut items = Vec::with_capacity(take_count);
    let mut last_cursor = None;
    for row in rows.into_iter().take(take_count) {
        let (item, cursor) = convert(row)?;
        last_cursor = Some(cursor);
        items.push(item);
    }

    Ok(Page {
        items,
        next_before: if has_more { last_cursor } else { None },
    })
}

#[derive(sqlx::FromRow)]
struct ProcessedEventRow {
    event_id: String,
    event_type: String,
    outcome: String,
    order_id: Option<String>,
    processor_payment_id: String,
    occurred_at: String,
    processed_at: String,
}

impl TryFrom<ProcessedEventRow> for ProcessedEventRecord {
    type Error = StoreError;

    fn try_from(row: ProcessedEventRow) -> Result<Self, Self::Error> {
        let outcome = match row.outcome.as_str() {
            "applied" => ProcessedOutcome::Applied,
            "stale_transition" => ProcessedOutcome::StaleTransition,
            other => return Err(StoreError::Parse(format!("unknown outcome: {other}"))),
        };
        Ok(ProcessedEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            outcome,
            order_id: row.order_id,
            processor_payment_id: row.processor_payment_id,
            occurred_at: row.occurred_at,
            processed_at: row.processed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AnomalyRow {
    id: String,
    event_id: String,
    event_type: String,
    kind: String,
    correlation_id: String,
    detail: String,
    recorded_at: String,
}

impl TryFrom<AnomalyRow> for AnomalyRecord {
    type Error = StoreError;

    fn try_from(row: AnomalyRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "order_not_found" => AnomalyKind::OrderNotFound,
            other => return Err(StoreError::Parse(format!("unknown anomaly kind: {other}"))),
        };
        Ok(AnomalyRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid anomaly id: {err}")))?,
            event_id: row.event_id,
            event_type: row.event_type,
            kind,
            correlation_id: row.correlation_id,
            detail: row.detail,
            recorded_at: row.recorded_at,
        })
    }
}
