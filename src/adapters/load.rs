//! Bulk CSV loader.
//!
//! Reads one of the fixed query exports and loads it into a relational
//! table: resolve the instance endpoint, create the database and table if
//! absent, then insert every data row in input order inside one
//! transaction. The price-range target also creates the database
//! instance when it does not exist yet.

use snafu::prelude::*;
use tracing::info;

use crate::config::{DatabaseConfig, QueryConfig};
use crate::error::{
    AdapterError, CsvSnafu, DatabaseSnafu, MissingEndpointSnafu, ProvisionSnafu, StorageSnafu,
};
use crate::outcome::Outcome;
use crate::services::{Infrastructure, TableStore};
use crate::storage::StorageProvider;

/// Which fixed export a load run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    /// Property insights aggregate; assumes the instance already exists.
    Insights,
    /// Price range aggregate; creates the instance first when missing.
    PriceRange,
}

impl LoadTarget {
    fn table(self, config: &DatabaseConfig) -> &str {
        match self {
            LoadTarget::Insights => &config.insights_table,
            LoadTarget::PriceRange => &config.price_range_table,
        }
    }

    fn key(self, config: &QueryConfig) -> &str {
        match self {
            LoadTarget::Insights => &config.insights_key,
            LoadTarget::PriceRange => &config.price_range_key,
        }
    }

    fn ensures_instance(self) -> bool {
        matches!(self, LoadTarget::PriceRange)
    }

    fn stage(self) -> &'static str {
        match self {
            LoadTarget::Insights => "load-insights",
            LoadTarget::PriceRange => "load-price-range",
        }
    }
}

/// Overrides for one load run.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub table: Option<String>,
    pub key: Option<String>,
}

pub async fn run(
    infra: &dyn Infrastructure,
    store: &dyn TableStore,
    storage: &StorageProvider,
    database: &DatabaseConfig,
    query: &QueryConfig,
    target: LoadTarget,
    request: LoadRequest,
) -> Outcome {
    super::outcome_or_failure(
        target.stage(),
        execute(infra, store, storage, database, query, target, request).await,
    )
}

async fn execute(
    infra: &dyn Infrastructure,
    store: &dyn TableStore,
    storage: &StorageProvider,
    database: &DatabaseConfig,
    query: &QueryConfig,
    target: LoadTarget,
    request: LoadRequest,
) -> Result<Outcome, AdapterError> {
    let table = request.table.as_deref().unwrap_or(target.table(database));
    let key = request.key.as_deref().unwrap_or(target.key(query));

    if target.ensures_instance()
        && infra
            .db_endpoint(&database.instance_id)
            .await
            .context(ProvisionSnafu)?
            .is_none()
    {
        info!(
            "[load] creating database instance '{}'",
            database.instance_id
        );
        // A racing creator is fine; both arms continue to the endpoint
        // lookup below.
        if infra
            .create_db_instance(database)
            .await
            .context(ProvisionSnafu)?
            .already_exists()
        {
            info!("[load] instance appeared while checking");
        }
    }

    let endpoint = infra
        .db_endpoint(&database.instance_id)
        .await
        .context(ProvisionSnafu)?;
    let Some(endpoint) = endpoint else {
        return MissingEndpointSnafu {
            id: database.instance_id.as_str(),
        }
        .fail()
        .context(ProvisionSnafu);
    };
    info!("[load] instance endpoint: {}", endpoint);

    store
        .ensure_database(&endpoint, &database.db_name)
        .await
        .context(DatabaseSnafu)?;

    let data = storage.get(key).await.context(StorageSnafu)?;
    let csv = super::parse_csv(&data).context(CsvSnafu)?;

    let loaded = store
        .load_rows(&endpoint, &database.db_name, table, &csv.header, &csv.rows)
        .await
        .context(DatabaseSnafu)?;

    Ok(Outcome::ok(format!(
        "loaded {} rows into {}.{}",
        loaded, database.db_name, table
    ))
    .with("endpoint", endpoint)
    .with("rows_loaded", loaded)
    .with("bucket", storage.bucket())
    .with("key", key))
}
