//! Query-and-wait adapters.
//!
//! Each variant runs a fixed SQL statement against the catalog database,
//! waits for the execution to reach a terminal state, and copies the
//! engine's generated result object to a fixed key so downstream stages
//! always read from the same address.

use async_trait::async_trait;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::QueryConfig;
use crate::error::{AdapterError, BadResultLocationSnafu, QuerySnafu, StorageSnafu};
use crate::outcome::Outcome;
use crate::poll::{StatusClass, StatusSource, poll_until_terminal};
use crate::services::{QueryEngine, QueryHandle, QueryStatus};
use crate::storage::StorageProvider;

const ML_EXPORT_SQL: &str = "\
SELECT
    city,
    accommodates,
    room_type,
    bathrooms,
    bedrooms,
    CASE WHEN host_is_superhost = true THEN 1 ELSE 0 END AS is_superhost,
    CASE WHEN amenities LIKE '%Wireless%' THEN 1 ELSE 0 END AS has_wifi,
    CASE WHEN amenities LIKE '%Air Conditioning%' THEN 1 ELSE 0 END AS has_ac,
    CASE WHEN amenities LIKE '%Kitchen%' THEN 1 ELSE 0 END AS has_kitchen,
    CASE WHEN amenities LIKE '%Heating%' THEN 1 ELSE 0 END AS has_heating,
    CASE WHEN amenities LIKE '%Washer%' THEN 1 ELSE 0 END AS has_washer,
    CASE WHEN amenities LIKE '%Dryer%' THEN 1 ELSE 0 END AS has_dryer,
    CASE WHEN amenities LIKE '%TV%' THEN 1 ELSE 0 END AS has_tv,
    CASE WHEN amenities LIKE '%Shampoo%' THEN 1 ELSE 0 END AS has_shampoo,
    CASE WHEN amenities LIKE '%Essentials%' THEN 1 ELSE 0 END AS has_essentials,
    CASE WHEN amenities LIKE '%Hair Dryer%' THEN 1 ELSE 0 END AS has_hair_dryer,
    CASE WHEN amenities LIKE '%Elevator%' THEN 1 ELSE 0 END AS has_elevator,
    CASE WHEN amenities LIKE '%Gym%' THEN 1 ELSE 0 END AS has_gym,
    price
FROM processed
WHERE price > 15 AND price IS NOT NULL";

const PROPERTY_INSIGHTS_SQL: &str = "\
SELECT
    property_type,
    COUNT(*) AS number_of_listings,
    AVG(review_scores_accuracy) AS avg_accuracy,
    AVG(review_scores_communication) AS avg_communication,
    AVG(review_scores_location) AS avg_location,
    AVG(review_scores_value) AS avg_value
FROM processed
WHERE number_of_reviews > 5
GROUP BY property_type
ORDER BY number_of_listings DESC";

const PRICE_RANGE_SQL: &str = "\
SELECT
    CASE
        WHEN price < 50 THEN 'Budget (Under $50)'
        WHEN price >= 50 AND price < 150 THEN 'Mid-range ($50-$149)'
        WHEN price >= 150 AND price < 300 THEN 'Upper Mid-range ($150-$299)'
        ELSE 'Luxury ($300+)'
    END AS price_tier,
    COUNT(*) AS number_of_listings,
    AVG(review_scores_accuracy) AS avg_accuracy,
    AVG(review_scores_value) AS avg_value
FROM processed
WHERE number_of_reviews > 5 AND price IS NOT NULL
GROUP BY
    CASE
        WHEN price < 50 THEN 'Budget (Under $50)'
        WHEN price >= 50 AND price < 150 THEN 'Mid-range ($50-$149)'
        WHEN price >= 150 AND price < 300 THEN 'Upper Mid-range ($150-$299)'
        ELSE 'Luxury ($300+)'
    END
ORDER BY MIN(price)";

/// The fixed queries the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryVariant {
    /// Per-listing feature extraction consumed by the training job.
    MlExport,
    /// Review-score aggregates grouped by property type.
    PropertyInsights,
    /// Review-score aggregates grouped by price tier.
    PriceRange,
}

impl QueryVariant {
    pub fn sql(self) -> &'static str {
        match self {
            QueryVariant::MlExport => ML_EXPORT_SQL,
            QueryVariant::PropertyInsights => PROPERTY_INSIGHTS_SQL,
            QueryVariant::PriceRange => PRICE_RANGE_SQL,
        }
    }

    /// Fixed key the result object is copied to.
    pub fn target_key(self, config: &QueryConfig) -> &str {
        match self {
            QueryVariant::MlExport => &config.ml_data_key,
            QueryVariant::PropertyInsights => &config.insights_key,
            QueryVariant::PriceRange => &config.price_range_key,
        }
    }

    fn stage(self) -> &'static str {
        match self {
            QueryVariant::MlExport => "query-ml",
            QueryVariant::PropertyInsights => "query-insights",
            QueryVariant::PriceRange => "query-price-range",
        }
    }
}

pub async fn run(
    engine: &dyn QueryEngine,
    results: &StorageProvider,
    config: &QueryConfig,
    variant: QueryVariant,
    cancel: &CancellationToken,
) -> Outcome {
    super::outcome_or_failure(
        variant.stage(),
        run_to_key(
            engine,
            results,
            config,
            variant.sql(),
            variant.target_key(config),
            cancel,
        )
        .await,
    )
}

/// Run caller-supplied SQL and copy the result to `target_key`.
pub async fn run_sql(
    engine: &dyn QueryEngine,
    results: &StorageProvider,
    config: &QueryConfig,
    sql: &str,
    target_key: &str,
    cancel: &CancellationToken,
) -> Outcome {
    super::outcome_or_failure(
        "query",
        run_to_key(engine, results, config, sql, target_key, cancel).await,
    )
}

struct ExecutionStatus<'a> {
    engine: &'a dyn QueryEngine,
    handle: QueryHandle,
}

#[async_trait]
impl StatusSource for ExecutionStatus<'_> {
    type Status = QueryStatus;
    type Error = AdapterError;

    async fn fetch(&mut self) -> Result<(StatusClass, QueryStatus), AdapterError> {
        let status = self
            .engine
            .query_status(&self.handle)
            .await
            .context(QuerySnafu)?;
        Ok((status.class, status))
    }
}

async fn run_to_key(
    engine: &dyn QueryEngine,
    results: &StorageProvider,
    config: &QueryConfig,
    sql: &str,
    target_key: &str,
    cancel: &CancellationToken,
) -> Result<Outcome, AdapterError> {
    let handle = engine
        .start_query(sql, &config.database, &config.output_location)
        .await
        .context(QuerySnafu)?;
    info!("[query] started execution {}", handle.as_str());

    let mut source = ExecutionStatus { engine, handle };
    let terminal = poll_until_terminal(&mut source, config.poll_policy(), cancel).await?;

    if terminal.class != StatusClass::Succeeded {
        let mut outcome = Outcome::failed(format!(
            "query finished in state {}",
            terminal.status.state
        ))
        .with("state", terminal.status.state.as_str());
        if let Some(reason) = &terminal.status.reason {
            outcome = outcome.with("reason", reason.as_str());
        }
        return Ok(outcome);
    }

    let location = terminal
        .status
        .output_location
        .as_deref()
        .context(BadResultLocationSnafu {
            location: "<absent>",
        })
        .context(QuerySnafu)?;
    let source_key = source_key_in_bucket(location, results.bucket())
        .context(BadResultLocationSnafu { location })
        .context(QuerySnafu)?;

    results
        .copy(&source_key, target_key)
        .await
        .context(StorageSnafu)?;
    info!("[query] copied {} -> {}", source_key, target_key);

    Ok(
        Outcome::ok(format!("query result copied to '{target_key}'"))
            .with("bucket", results.bucket())
            .with("key", target_key)
            .with(
                "result_location",
                format!("{}/{}", results.url().trim_end_matches('/'), target_key),
            )
            .with("polls", terminal.polls),
    )
}

/// Split `<scheme>://bucket/key` and return the key when the bucket is
/// the one the provider is scoped to. Malformed locations and locations
/// in a different bucket yield `None`.
fn source_key_in_bucket(location: &str, bucket: &str) -> Option<String> {
    let (_, rest) = location.split_once("://")?;
    let (location_bucket, key) = rest.split_once('/')?;
    if location_bucket != bucket || key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;

    #[test]
    fn test_source_key_extraction() {
        assert_eq!(
            source_key_in_bucket("s3://myresult-sc171/abc-123.csv", "myresult-sc171"),
            Some("abc-123.csv".to_string())
        );
        assert_eq!(
            source_key_in_bucket("s3://myresult-sc171/athena/abc.csv", "myresult-sc171"),
            Some("athena/abc.csv".to_string())
        );
    }

    #[test]
    fn test_source_key_rejects_other_buckets_and_garbage() {
        assert_eq!(source_key_in_bucket("s3://elsewhere/abc.csv", "results"), None);
        assert_eq!(source_key_in_bucket("s3://results/", "results"), None);
        assert_eq!(source_key_in_bucket("not a url", "results"), None);
    }

    #[test]
    fn test_variant_target_keys() {
        let config = QueryConfig::default();
        assert_eq!(QueryVariant::MlExport.target_key(&config), "ml_data.csv");
        assert_eq!(
            QueryVariant::PropertyInsights.target_key(&config),
            "property_insights.csv"
        );
        assert_eq!(
            QueryVariant::PriceRange.target_key(&config),
            "price_range.csv"
        );
    }

    #[test]
    fn test_variant_sql_targets_processed_table() {
        for variant in [
            QueryVariant::MlExport,
            QueryVariant::PropertyInsights,
            QueryVariant::PriceRange,
        ] {
            assert!(variant.sql().contains("FROM processed"), "{variant:?}");
        }
    }
}
