//! Adapter behavior tests against in-memory storage and fake services.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use monsoon::adapters::check::{self, CheckRequest};
use monsoon::adapters::etl;
use monsoon::adapters::ingest::{self, IngestRequest};
use monsoon::adapters::load::{self, LoadRequest, LoadTarget};
use monsoon::adapters::notify;
use monsoon::adapters::provision::{self, AsgRequest};
use monsoon::adapters::query::{self, QueryVariant};
use monsoon::adapters::train;
use monsoon::config::Config;
use monsoon::error::{JobError, NotifyError, ProvisionError, QueryError};
use monsoon::outcome::{OutcomeStatus, Provisioned};
use monsoon::poll::StatusClass;
use monsoon::services::{
    CrawlStart, CrawlerService, EtlJobService, Infrastructure, JobSpec, JobStatus,
    LoadBalancerInfo, Notifier, QueryEngine, QueryHandle, QueryStatus, TableStore,
    TrainingJobService,
};
use monsoon::storage::StorageProvider;

// ---------------------------------------------------------------- fakes

#[derive(Default)]
struct FakeCrawler {
    starts: Mutex<u32>,
    running: bool,
}

impl FakeCrawler {
    fn start_count(&self) -> u32 {
        *self.starts.lock().unwrap()
    }
}

#[async_trait]
impl CrawlerService for FakeCrawler {
    async fn start_crawler(&self, _name: &str) -> Result<CrawlStart, JobError> {
        *self.starts.lock().unwrap() += 1;
        if self.running {
            Ok(CrawlStart::AlreadyRunning)
        } else {
            Ok(CrawlStart::Started)
        }
    }
}

struct FakeEtl;

#[async_trait]
impl EtlJobService for FakeEtl {
    async fn start_job_run(
        &self,
        _job_name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<String, JobError> {
        assert!(arguments.contains_key("--input_path"));
        assert!(arguments.contains_key("--output_path"));
        Ok("jr_0123456789".to_string())
    }
}

/// Returns scripted statuses in order; the last one repeats.
struct FakeEngine {
    statuses: Mutex<Vec<QueryStatus>>,
}

impl FakeEngine {
    fn scripted(statuses: Vec<QueryStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses),
        }
    }

    fn running() -> QueryStatus {
        QueryStatus {
            class: StatusClass::Running,
            state: "RUNNING".to_string(),
            output_location: None,
            reason: None,
        }
    }

    fn succeeded(location: &str) -> QueryStatus {
        QueryStatus {
            class: StatusClass::Succeeded,
            state: "SUCCEEDED".to_string(),
            output_location: Some(location.to_string()),
            reason: None,
        }
    }
}

#[async_trait]
impl QueryEngine for FakeEngine {
    async fn start_query(
        &self,
        sql: &str,
        _database: &str,
        _output_location: &str,
    ) -> Result<QueryHandle, QueryError> {
        assert!(!sql.is_empty());
        Ok(QueryHandle::new("exec-1"))
    }

    async fn query_status(&self, _handle: &QueryHandle) -> Result<QueryStatus, QueryError> {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            Ok(statuses.remove(0))
        } else {
            Ok(statuses[0].clone())
        }
    }
}

/// Returns scripted job statuses in order; the last one repeats.
struct FakeJobs {
    created: Mutex<Vec<JobSpec>>,
    statuses: Mutex<Vec<JobStatus>>,
}

impl FakeJobs {
    fn scripted(statuses: Vec<JobStatus>) -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses),
        }
    }

    fn running() -> JobStatus {
        JobStatus {
            class: StatusClass::Running,
            state: "InProgress".to_string(),
            failure_reason: None,
        }
    }

    fn completed() -> JobStatus {
        JobStatus {
            class: StatusClass::Succeeded,
            state: "Completed".to_string(),
            failure_reason: None,
        }
    }

    fn failed(reason: &str) -> JobStatus {
        JobStatus {
            class: StatusClass::Failed,
            state: "Failed".to_string(),
            failure_reason: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl TrainingJobService for FakeJobs {
    async fn create_job(&self, spec: &JobSpec) -> Result<(), JobError> {
        self.created.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn job_status(&self, _name: &str) -> Result<JobStatus, JobError> {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            Ok(statuses.remove(0))
        } else {
            Ok(statuses[0].clone())
        }
    }
}

#[derive(Default)]
struct FakeNotifier {
    published: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn publish(
        &self,
        topic_arn: &str,
        subject: &str,
        message: &str,
    ) -> Result<String, NotifyError> {
        if self.fail {
            return Err(NotifyError::NotifyApi {
                message: "topic gone".to_string(),
            });
        }
        self.published.lock().unwrap().push((
            topic_arn.to_string(),
            subject.to_string(),
            message.to_string(),
        ));
        Ok("msg-1".to_string())
    }
}

#[derive(Default)]
struct FakeStore {
    databases: Mutex<Vec<(String, String)>>,
    loads: Mutex<Vec<(String, String, String, Vec<String>, usize)>>,
}

#[async_trait]
impl TableStore for FakeStore {
    async fn ensure_database(
        &self,
        host: &str,
        database: &str,
    ) -> Result<(), monsoon::error::DatabaseError> {
        self.databases
            .lock()
            .unwrap()
            .push((host.to_string(), database.to_string()));
        Ok(())
    }

    async fn load_rows(
        &self,
        host: &str,
        database: &str,
        table: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<u64, monsoon::error::DatabaseError> {
        self.loads.lock().unwrap().push((
            host.to_string(),
            database.to_string(),
            table.to_string(),
            header.to_vec(),
            rows.len(),
        ));
        Ok(rows.len() as u64)
    }
}

/// In-memory account state for the provisioning adapters.
#[derive(Default)]
struct FakeInfra {
    vpc: Option<String>,
    subnets: Vec<String>,
    security_groups: HashMap<String, String>,
    db_instances: Mutex<HashMap<String, String>>,
    target_groups: Mutex<Vec<String>>,
    load_balancers: Mutex<Vec<String>>,
    asgs: Mutex<Vec<String>>,
}

impl FakeInfra {
    /// An account with a default VPC, two subnets, and the serving
    /// security group.
    fn with_network() -> Self {
        Self {
            vpc: Some("vpc-1".to_string()),
            subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            security_groups: HashMap::from([("ml_sg".to_string(), "sg-1".to_string())]),
            ..Default::default()
        }
    }

    fn with_db_instance(self, id: &str) -> Self {
        self.db_instances
            .lock()
            .unwrap()
            .insert(id.to_string(), format!("{id}.fake.local"));
        self
    }
}

#[async_trait]
impl Infrastructure for FakeInfra {
    async fn create_db_instance(
        &self,
        config: &monsoon::config::DatabaseConfig,
    ) -> Result<Provisioned, ProvisionError> {
        let mut instances = self.db_instances.lock().unwrap();
        if instances.contains_key(&config.instance_id) {
            return Ok(Provisioned::AlreadyExists);
        }
        instances.insert(
            config.instance_id.clone(),
            format!("{}.fake.local", config.instance_id),
        );
        Ok(Provisioned::Created(()))
    }

    async fn db_endpoint(&self, instance_id: &str) -> Result<Option<String>, ProvisionError> {
        Ok(self.db_instances.lock().unwrap().get(instance_id).cloned())
    }

    async fn default_vpc(&self) -> Result<Option<String>, ProvisionError> {
        Ok(self.vpc.clone())
    }

    async fn vpc_subnets(&self, _vpc_id: &str) -> Result<Vec<String>, ProvisionError> {
        Ok(self.subnets.clone())
    }

    async fn default_subnets(&self) -> Result<Vec<String>, ProvisionError> {
        Ok(self.subnets.clone())
    }

    async fn security_group_id(
        &self,
        name: &str,
        _vpc_id: &str,
    ) -> Result<Option<String>, ProvisionError> {
        Ok(self.security_groups.get(name).cloned())
    }

    async fn target_group_arn(&self, name: &str) -> Result<Option<String>, ProvisionError> {
        let groups = self.target_groups.lock().unwrap();
        Ok(groups
            .iter()
            .find(|group| group.as_str() == name)
            .map(|name| format!("arn:fake:targetgroup/{name}")))
    }

    async fn create_target_group(
        &self,
        config: &monsoon::config::ServingConfig,
        _vpc_id: &str,
    ) -> Result<Provisioned<String>, ProvisionError> {
        let mut groups = self.target_groups.lock().unwrap();
        if groups.contains(&config.target_group) {
            return Ok(Provisioned::AlreadyExists);
        }
        groups.push(config.target_group.clone());
        Ok(Provisioned::Created(format!(
            "arn:fake:targetgroup/{}",
            config.target_group
        )))
    }

    async fn create_load_balancer(
        &self,
        name: &str,
        subnet_ids: &[String],
        _security_group_id: &str,
    ) -> Result<Provisioned<LoadBalancerInfo>, ProvisionError> {
        assert_eq!(subnet_ids.len(), 2);
        let mut balancers = self.load_balancers.lock().unwrap();
        if balancers.iter().any(|lb| lb == name) {
            return Ok(Provisioned::AlreadyExists);
        }
        balancers.push(name.to_string());
        Ok(Provisioned::Created(LoadBalancerInfo {
            arn: format!("arn:fake:loadbalancer/{name}"),
            dns_name: format!("{name}.elb.fake.local"),
        }))
    }

    async fn create_listener(
        &self,
        _load_balancer_arn: &str,
        _port: i32,
        _target_group_arn: &str,
    ) -> Result<Provisioned<String>, ProvisionError> {
        Ok(Provisioned::Created("arn:fake:listener/1".to_string()))
    }

    async fn create_auto_scaling_group(
        &self,
        config: &monsoon::config::ServingConfig,
        subnet_ids_csv: &str,
    ) -> Result<Provisioned, ProvisionError> {
        assert!(!subnet_ids_csv.is_empty());
        let mut asgs = self.asgs.lock().unwrap();
        if asgs.contains(&config.asg_name) {
            return Ok(Provisioned::AlreadyExists);
        }
        asgs.push(config.asg_name.clone());
        Ok(Provisioned::Created(()))
    }
}

// ---------------------------------------------------------------- ingest

#[tokio::test]
async fn test_ingest_without_processed_objects_never_starts_crawler() {
    let storage = StorageProvider::memory("raw");
    let crawler = FakeCrawler::default();
    let config = Config::default();

    let outcome = ingest::run(&storage, &crawler, &config.ingest, IngestRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::NotFound);
    assert_eq!(crawler.start_count(), 0);
}

#[tokio::test]
async fn test_ingest_with_processed_object_starts_crawler_once() {
    let storage = StorageProvider::memory("raw");
    storage
        .put(
            "processed/airbnb_ratings_new.csv",
            Bytes::from_static(b"id,price\n1,100\n"),
        )
        .await
        .unwrap();
    let crawler = FakeCrawler::default();
    let config = Config::default();

    let outcome = ingest::run(&storage, &crawler, &config.ingest, IngestRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(crawler.start_count(), 1);
    assert_eq!(
        outcome.details["s3_path"],
        json!("mem://raw/processed/airbnb_ratings_new.csv")
    );
}

#[tokio::test]
async fn test_ingest_missing_named_object_is_not_found() {
    let storage = StorageProvider::memory("raw");
    storage
        .put("processed/other.csv", Bytes::from_static(b"x"))
        .await
        .unwrap();
    let crawler = FakeCrawler::default();
    let config = Config::default();

    let outcome = ingest::run(&storage, &crawler, &config.ingest, IngestRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::NotFound);
    assert_eq!(crawler.start_count(), 0);
}

#[tokio::test]
async fn test_ingest_running_crawler_is_an_alternate_outcome() {
    let storage = StorageProvider::memory("raw");
    storage
        .put("processed/airbnb_ratings_new.csv", Bytes::from_static(b"x"))
        .await
        .unwrap();
    let crawler = FakeCrawler {
        running: true,
        ..Default::default()
    };
    let config = Config::default();

    let outcome = ingest::run(&storage, &crawler, &config.ingest, IngestRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::AlreadyRunning);
    assert!(outcome.is_success());
}

// ---------------------------------------------------------------- etl

#[tokio::test]
async fn test_etl_reports_job_run_id() {
    let config = Config::default();
    let outcome = etl::run(&FakeEtl, &config.etl).await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.details["job_run_id"], json!("jr_0123456789"));
}

// ---------------------------------------------------------------- query

#[tokio::test(start_paused = true)]
async fn test_query_copies_result_to_fixed_key() {
    let results = StorageProvider::memory("results");
    results
        .put("athena/raw-1.csv", Bytes::from_static(b"city,price\nParis,90\n"))
        .await
        .unwrap();
    let engine = FakeEngine::scripted(vec![
        FakeEngine::running(),
        FakeEngine::running(),
        FakeEngine::succeeded("s3://results/athena/raw-1.csv"),
    ]);
    let config = Config::default();

    let outcome = query::run(
        &engine,
        &results,
        &config.query,
        QueryVariant::MlExport,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.details["key"], json!("ml_data.csv"));
    assert_eq!(outcome.details["polls"], json!(3));

    let copied = results.get("ml_data.csv").await.unwrap();
    assert_eq!(&copied[..], b"city,price\nParis,90\n");
}

#[tokio::test(start_paused = true)]
async fn test_query_sql_pins_result_to_the_requested_key() {
    let results = StorageProvider::memory("results");
    results
        .put("athena/raw-2.csv", Bytes::from_static(b"n\n42\n"))
        .await
        .unwrap();
    let engine = FakeEngine::scripted(vec![
        FakeEngine::running(),
        FakeEngine::succeeded("s3://results/athena/raw-2.csv"),
    ]);
    let config = Config::default();

    let outcome = query::run_sql(
        &engine,
        &results,
        &config.query,
        "SELECT COUNT(*) AS n FROM processed",
        "counts.csv",
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert!(results.exists("counts.csv").await.unwrap());
}

#[tokio::test]
async fn test_query_failure_state_is_a_failed_outcome() {
    let results = StorageProvider::memory("results");
    let engine = FakeEngine::scripted(vec![QueryStatus {
        class: StatusClass::Failed,
        state: "FAILED".to_string(),
        output_location: None,
        reason: Some("SYNTAX_ERROR".to_string()),
    }]);
    let config = Config::default();

    let outcome = query::run(
        &engine,
        &results,
        &config.query,
        QueryVariant::PropertyInsights,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.details["reason"], json!("SYNTAX_ERROR"));
    assert!(!results.exists("property_insights.csv").await.unwrap());
}

#[tokio::test]
async fn test_query_result_in_foreign_bucket_is_rejected() {
    let results = StorageProvider::memory("results");
    let engine = FakeEngine::scripted(vec![FakeEngine::succeeded("s3://elsewhere/raw.csv")]);
    let config = Config::default();

    let outcome = query::run(
        &engine,
        &results,
        &config.query,
        QueryVariant::PriceRange,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.message.contains("Unexpected query result location"));
}

#[tokio::test(start_paused = true)]
async fn test_query_poll_limit_is_enforced() {
    let results = StorageProvider::memory("results");
    let engine = FakeEngine::scripted(vec![FakeEngine::running()]);
    let mut config = Config::default();
    config.query.max_polls = Some(3);

    let outcome = query::run(
        &engine,
        &results,
        &config.query,
        QueryVariant::MlExport,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.message.contains("3 status checks"));
}

#[tokio::test]
async fn test_query_cancellation_stops_the_wait() {
    let results = StorageProvider::memory("results");
    let engine = FakeEngine::scripted(vec![FakeEngine::running()]);
    let config = Config::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = query::run(
        &engine,
        &results,
        &config.query,
        QueryVariant::MlExport,
        &cancel,
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.message.contains("Cancelled"));
}

// ---------------------------------------------------------------- train

#[tokio::test(start_paused = true)]
async fn test_train_success_crawls_model_output_and_notifies() {
    let jobs = FakeJobs::scripted(vec![
        FakeJobs::running(),
        FakeJobs::running(),
        FakeJobs::completed(),
    ]);
    let crawler = FakeCrawler::default();
    let notifier = FakeNotifier::default();
    let mut config = Config::default();
    config.training.model_crawler = Some("model_crawler".to_string());
    config.training.notify_on_completion = true;
    config.notify.topic_arn = "arn:fake:sns:query_result".to_string();

    let outcome = train::run(
        &jobs,
        &crawler,
        &notifier,
        &config.training,
        &config.notify,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(crawler.start_count(), 1);
    assert_eq!(notifier.published.lock().unwrap().len(), 1);

    let created = jobs.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert!(created[0].name.starts_with("ml-process-job-"));
    assert_eq!(created[0].input_url, "s3://myresult-sc171/ml_data.csv");
}

#[tokio::test(start_paused = true)]
async fn test_train_failure_carries_the_reason() {
    let jobs = FakeJobs::scripted(vec![
        FakeJobs::running(),
        FakeJobs::failed("AlgorithmError: exit code 1"),
    ]);
    let crawler = FakeCrawler::default();
    let notifier = FakeNotifier::default();
    let config = Config::default();

    let outcome = train::run(
        &jobs,
        &crawler,
        &notifier,
        &config.training,
        &config.notify,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.details["reason"], json!("AlgorithmError: exit code 1"));
    assert_eq!(crawler.start_count(), 0);
    // notify_on_completion defaults to off
    assert!(notifier.published.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_train_failure_notification_carries_the_reason() {
    let jobs = FakeJobs::scripted(vec![
        FakeJobs::running(),
        FakeJobs::failed("AlgorithmError: exit code 1"),
    ]);
    let crawler = FakeCrawler::default();
    let notifier = FakeNotifier::default();
    let mut config = Config::default();
    config.training.notify_on_completion = true;
    config.notify.topic_arn = "arn:fake:sns:query_result".to_string();

    let outcome = train::run(
        &jobs,
        &crawler,
        &notifier,
        &config.training,
        &config.notify,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    let published = notifier.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert!(published[0].2.contains("failed"));
    assert!(published[0].2.contains("AlgorithmError: exit code 1"));
}

// ---------------------------------------------------------------- provision

#[tokio::test]
async fn test_provision_database_is_idempotent() {
    let infra = FakeInfra::with_network();
    let config = Config::default();

    let first = provision::database(&infra, &config.database).await;
    let second = provision::database(&infra, &config.database).await;

    assert_eq!(first.status, OutcomeStatus::Ok);
    assert_eq!(second.status, OutcomeStatus::AlreadyExists);
    assert!(second.is_success());
}

#[tokio::test]
async fn test_provision_target_group_is_idempotent() {
    let infra = FakeInfra::with_network();
    let config = Config::default();

    let first = provision::target_group(&infra, &config.serving).await;
    let second = provision::target_group(&infra, &config.serving).await;

    assert_eq!(first.status, OutcomeStatus::Ok);
    assert!(first.details["target_group_arn"]
        .as_str()
        .unwrap()
        .contains("ml-tg-sc171"));
    assert_eq!(second.status, OutcomeStatus::AlreadyExists);
}

#[tokio::test]
async fn test_provision_target_group_without_default_vpc_fails() {
    let infra = FakeInfra::default();
    let config = Config::default();

    let outcome = provision::target_group(&infra, &config.serving).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.message.contains("No default VPC"));
}

#[tokio::test]
async fn test_provision_load_balancer_wires_listener_to_target_group() {
    let infra = FakeInfra::with_network();
    let config = Config::default();

    provision::target_group(&infra, &config.serving).await;
    let outcome = provision::load_balancer(&infra, &config.serving).await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(
        outcome.details["dns_name"],
        json!("alm-ml-sc171.elb.fake.local")
    );
    assert_eq!(outcome.details["listener_arn"], json!("arn:fake:listener/1"));
}

#[tokio::test]
async fn test_provision_load_balancer_requires_the_target_group() {
    let infra = FakeInfra::with_network();
    let config = Config::default();

    let outcome = provision::load_balancer(&infra, &config.serving).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.message.contains("not found"));
}

#[tokio::test]
async fn test_provision_asg_uses_default_subnets_when_none_given() {
    let infra = FakeInfra::with_network();
    let config = Config::default();

    let outcome =
        provision::auto_scaling_group(&infra, &config.serving, AsgRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.details["subnet_ids"], json!("subnet-a,subnet-b"));

    let again =
        provision::auto_scaling_group(&infra, &config.serving, AsgRequest::default()).await;
    assert_eq!(again.status, OutcomeStatus::AlreadyExists);
}

#[tokio::test]
async fn test_provision_asg_without_subnets_fails() {
    let infra = FakeInfra {
        vpc: Some("vpc-1".to_string()),
        ..Default::default()
    };
    let config = Config::default();

    let outcome =
        provision::auto_scaling_group(&infra, &config.serving, AsgRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.message.contains("No default subnets"));
}

// ---------------------------------------------------------------- load

#[tokio::test]
async fn test_load_inserts_every_data_row() {
    let infra = FakeInfra::with_network().with_db_instance("myresult-db");
    let store = FakeStore::default();
    let storage = StorageProvider::memory("results");
    storage
        .put(
            "property_insights.csv",
            Bytes::from_static(
                b"property_type,number_of_listings\nApartment,120\nHouse,45\n",
            ),
        )
        .await
        .unwrap();
    let config = Config::default();

    let outcome = load::run(
        &infra,
        &store,
        &storage,
        &config.database,
        &config.query,
        LoadTarget::Insights,
        LoadRequest::default(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.details["rows_loaded"], json!(2));
    assert_eq!(outcome.details["endpoint"], json!("myresult-db.fake.local"));

    let loads = store.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    let (host, database, table, header, rows) = &loads[0];
    assert_eq!(host, "myresult-db.fake.local");
    assert_eq!(database, "myresult");
    assert_eq!(table, "property_insights");
    assert_eq!(header, &vec!["property_type".to_string(), "number_of_listings".to_string()]);
    assert_eq!(*rows, 2);

    let databases = store.databases.lock().unwrap();
    assert_eq!(databases.len(), 1);
}

#[tokio::test]
async fn test_load_price_range_creates_the_missing_instance() {
    let infra = FakeInfra::with_network();
    let store = FakeStore::default();
    let storage = StorageProvider::memory("results");
    storage
        .put(
            "price_range.csv",
            Bytes::from_static(b"price_tier,number_of_listings\nBudget (Under $50),30\n"),
        )
        .await
        .unwrap();
    let config = Config::default();

    let outcome = load::run(
        &infra,
        &store,
        &storage,
        &config.database,
        &config.query,
        LoadTarget::PriceRange,
        LoadRequest::default(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert!(infra
        .db_instances
        .lock()
        .unwrap()
        .contains_key("myresult-db"));

    let loads = store.loads.lock().unwrap();
    assert_eq!(loads[0].2, "price_range");
}

#[tokio::test]
async fn test_load_insights_does_not_create_the_instance() {
    let infra = FakeInfra::with_network();
    let store = FakeStore::default();
    let storage = StorageProvider::memory("results");
    let config = Config::default();

    let outcome = load::run(
        &infra,
        &store,
        &storage,
        &config.database,
        &config.query,
        LoadTarget::Insights,
        LoadRequest::default(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.message.contains("no endpoint"));
    assert!(infra.db_instances.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_load_missing_object_is_a_failed_outcome() {
    let infra = FakeInfra::with_network().with_db_instance("myresult-db");
    let store = FakeStore::default();
    let storage = StorageProvider::memory("results");
    let config = Config::default();

    let outcome = load::run(
        &infra,
        &store,
        &storage,
        &config.database,
        &config.query,
        LoadTarget::Insights,
        LoadRequest::default(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(store.loads.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------- check

#[tokio::test]
async fn test_check_header_only_object_is_empty() {
    let storage = StorageProvider::memory("results");
    storage
        .put("property_insights.csv", Bytes::from_static(b"a,b,c\n"))
        .await
        .unwrap();
    let config = Config::default();

    let outcome = check::run(&storage, &config.query, CheckRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.details["csv_is_empty"], json!(true));
}

#[tokio::test]
async fn test_check_single_data_row_is_not_empty() {
    let storage = StorageProvider::memory("results");
    storage
        .put(
            "property_insights.csv",
            Bytes::from_static(b"property_type,number_of_listings\nApartment,120\n"),
        )
        .await
        .unwrap();
    let config = Config::default();

    let outcome = check::run(&storage, &config.query, CheckRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.details["csv_is_empty"], json!(false));
}

#[tokio::test]
async fn test_check_missing_object_is_not_found_and_empty() {
    let storage = StorageProvider::memory("results");
    let config = Config::default();

    let outcome = check::run(&storage, &config.query, CheckRequest::default()).await;

    assert_eq!(outcome.status, OutcomeStatus::NotFound);
    assert_eq!(outcome.details["csv_is_empty"], json!(true));
}

// ---------------------------------------------------------------- notify

#[tokio::test]
async fn test_notify_publishes_the_fixed_result_location() {
    let notifier = FakeNotifier::default();
    let mut config = Config::default();
    config.notify.topic_arn = "arn:fake:sns:query_result".to_string();

    let outcome = notify::run(&notifier, &config.notify, &config.storage, &config.query)
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    let published = notifier.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert!(published[0]
        .2
        .contains("s3://myresult-sc171/price_range.csv"));
}

#[tokio::test]
async fn test_notify_propagates_publish_errors() {
    let notifier = FakeNotifier {
        fail: true,
        ..Default::default()
    };
    let config = Config::default();

    let err = notify::run(&notifier, &config.notify, &config.storage, &config.query)
        .await
        .unwrap_err();

    assert!(err.chain().contains("topic gone"));
}
