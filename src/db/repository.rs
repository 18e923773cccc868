//! Event store access: bulk insertion, existence checks and the read path.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::models::{FeeEvent, FeeEventRow};
use crate::error::Result;

/// Typed read filters, so the query surface stays enumerable.
#[derive(Debug, Clone)]
pub enum EventFilter {
    ByIntegrator {
        integrator: String,
    },
    ByChain {
        chain_id: i64,
    },
    WithFilters {
        integrator: Option<String>,
        chain_id: Option<i64>,
        token: Option<String>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
}

impl EventFilter {
    /// Append this filter's WHERE clause to a query.
    fn push_where(&self, qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>) {
        match self {
            EventFilter::ByIntegrator { integrator } => {
                qb.push(" WHERE integrator = ").push_bind(integrator.clone());
            }
            EventFilter::ByChain { chain_id } => {
                qb.push(" WHERE chain_id = ").push_bind(*chain_id);
            }
            EventFilter::WithFilters {
                integrator,
                chain_id,
                token,
                from,
                to,
            } => {
                qb.push(" WHERE TRUE");
                if let Some(integrator) = integrator {
                    qb.push(" AND integrator = ").push_bind(integrator.clone());
                }
                if let Some(chain_id) = chain_id {
                    qb.push(" AND chain_id = ").push_bind(*chain_id);
                }
                if let Some(token) = token {
                    qb.push(" AND token = ").push_bind(token.clone());
                }
                if let Some(from) = from {
                    qb.push(" AND block_timestamp >= ").push_bind(*from);
                }
                if let Some(to) = to {
                    qb.push(" AND block_timestamp <= ").push_bind(*to);
                }
            }
        }
    }
}

/// Insert a batch of fee events using multi-row INSERT with ON CONFLICT DO
/// NOTHING, so a replayed window is idempotent. Chunks into groups of 500
/// to stay within PostgreSQL parameter limits.
pub async fn insert_events_batch(pool: &PgPool, events: &[FeeEvent]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }

    for chunk in events.chunks(500) {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "INSERT INTO fee_events (chain_id, block_number, block_hash, transaction_hash, \
             log_index, token, integrator, integrator_fee, lifi_fee, block_timestamp) ",
        );

        query_builder.push_values(chunk, |mut b, e| {
            b.push_bind(e.chain_id)
                .push_bind(e.block_number)
                .push_bind(&e.block_hash)
                .push_bind(&e.transaction_hash)
                .push_bind(e.log_index)
                .push_bind(&e.token)
                .push_bind(&e.integrator)
                .push_bind(&e.integrator_fee)
                .push_bind(&e.lifi_fee)
                .push_bind(e.block_timestamp);
        });

        query_builder.push(" ON CONFLICT (chain_id, transaction_hash, log_index) DO NOTHING");
        query_builder.build().execute(pool).await?;
    }

    Ok(())
}

/// Which of the candidate `(transaction_hash, log_index)` keys already
/// exist for a chain. One bulk query per window.
pub async fn find_existing_keys(
    pool: &PgPool,
    chain_id: i64,
    keys: &[(String, i64)],
) -> Result<HashSet<(String, i64)>> {
    if keys.is_empty() {
        return Ok(HashSet::new());
    }

    let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
        "SELECT transaction_hash, log_index FROM fee_events WHERE chain_id = ",
    );
    query_builder.push_bind(chain_id);
    query_builder.push(" AND (transaction_hash, log_index) IN ");
    query_builder.push_tuples(keys, |mut b, (tx_hash, log_index)| {
        b.push_bind(tx_hash.clone()).push_bind(*log_index);
    });

    let rows: Vec<(String, i64)> = query_builder.build_query_as().fetch_all(pool).await?;

    Ok(rows.into_iter().collect())
}

/// Count events matching a filter.
pub async fn count_events(pool: &PgPool, filter: &EventFilter) -> Result<i64> {
    let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
        sqlx::QueryBuilder::new("SELECT COUNT(*) FROM fee_events");
    filter.push_where(&mut query_builder);

    let (count,): (i64,) = query_builder.build_query_as().fetch_one(pool).await?;

    Ok(count)
}

/// Fetch events matching a filter, newest block first, paginated.
pub async fn find_events(
    pool: &PgPool,
    filter: &EventFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<FeeEventRow>> {
    let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
        "SELECT chain_id, block_number, block_hash, transaction_hash, log_index, token, \
         integrator, integrator_fee, lifi_fee, block_timestamp, created_at FROM fee_events",
    );
    filter.push_where(&mut query_builder);
    query_builder.push(" ORDER BY block_number DESC, log_index DESC LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    let rows = query_builder
        .build_query_as::<FeeEventRow>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
