use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use pactum_core::adapters::CONTRACT_ID_VAR;
use pactum_core::domain::{
    ContractId, ProcessInstanceId, ProviderOffer, StatusGroup, TopicKind, TypedValue, Variables,
    WorkerId,
};
use pactum_core::impls::{EngineRestClient, InMemoryContractStore, InMemoryEngine, PgContractStore};
use pactum_core::ports::{ContractStore, TaskSource};
use pactum_core::telemetry::{self, LogFormat};
use pactum_core::{
    EngineConfig, RetryPolicy, StorageConfig, WorkerBuilder, WorkerConfig, WorkerGroup, WorkerLoop,
};

#[derive(Debug, Parser)]
#[command(name = "pactum", version, about = "External-task workers for the contract process")]
struct Cli {
    /// text | json
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the engine and persist contracts until Ctrl-C.
    Run(RunArgs),

    /// Print contracts of one status group as JSON.
    List {
        /// submitted | approved | rejected
        status: StatusGroup,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Print contract counts per status group as JSON.
    Stats {
        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Run all three workers against an in-memory engine and store.
    Demo,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// create | approve | reject (or their topic names)
    #[arg(required = true, num_args = 1..)]
    kinds: Vec<TopicKind>,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    storage: StorageArgs,

    #[command(flatten)]
    worker: WorkerArgs,
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// e.g. http://camunda:8080/engine-rest
    #[arg(long, env = "ENGINE_REST")]
    engine_rest: String,

    #[arg(long, env = "CAMUNDA_USER", default_value = "demo")]
    camunda_user: String,

    #[arg(long, env = "CAMUNDA_PASS", default_value = "demo", hide_env_values = true)]
    camunda_pass: String,
}

impl EngineArgs {
    fn to_config(&self) -> EngineConfig {
        EngineConfig::new(self.engine_rest.clone())
            .with_credentials(self.camunda_user.clone(), self.camunda_pass.clone())
    }
}

#[derive(Debug, Args)]
struct StorageArgs {
    /// 指定があれば DB_* より優先
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "DB_HOST", default_value = "postgres")]
    db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    db_port: u16,

    #[arg(long, env = "DB_NAME", default_value = "camunda")]
    db_name: String,

    #[arg(long, env = "DB_USER", default_value = "camunda")]
    db_user: String,

    #[arg(long, env = "DB_PASSWORD", default_value = "camunda", hide_env_values = true)]
    db_password: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    db_max_connections: u32,
}

impl StorageArgs {
    fn to_config(&self) -> StorageConfig {
        StorageConfig {
            url: self.database_url.clone(),
            host: self.db_host.clone(),
            port: self.db_port,
            database: self.db_name.clone(),
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            max_connections: self.db_max_connections,
            ..StorageConfig::default()
        }
    }

    async fn connect(&self) -> Result<PgContractStore> {
        let config = self.to_config();
        config.validate()?;
        let store = PgContractStore::connect(&config)
            .await
            .context("failed to connect to the contract database")?;
        store
            .health_check()
            .await
            .context("contract database health check failed")?;
        Ok(store)
    }
}

#[derive(Debug, Args)]
struct WorkerArgs {
    /// Only valid with a single kind.
    #[arg(long, env = "TOPIC_NAME")]
    topic_name: Option<String>,

    /// Only valid with a single kind.
    #[arg(long, env = "WORKER_ID")]
    worker_id: Option<String>,

    #[arg(long, env = "LOCK_DURATION_MS", default_value_t = 60_000)]
    lock_duration_ms: u64,

    #[arg(long, env = "MAX_TASKS", default_value_t = 5)]
    max_tasks: u32,

    #[arg(long, env = "POLL_SLEEP_SEC", default_value_t = 2.0)]
    poll_sleep_sec: f64,

    #[arg(long, env = "LOOP_ERROR_BACKOFF_SEC", default_value_t = 5.0)]
    loop_error_backoff_sec: f64,

    /// Defaults to 80% of the lock duration.
    #[arg(long, env = "TASK_DEADLINE_MS")]
    task_deadline_ms: Option<u64>,

    #[arg(long, env = "WORKER_CONCURRENCY", default_value_t = 1)]
    worker_concurrency: usize,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    #[arg(long, env = "RETRY_TIMEOUT_MS", default_value_t = 60_000)]
    retry_timeout_ms: u64,
}

impl WorkerArgs {
    fn to_config(&self, kind: TopicKind, single: bool) -> Result<WorkerConfig> {
        if !single && (self.topic_name.is_some() || self.worker_id.is_some()) {
            bail!("TOPIC_NAME and WORKER_ID can only be set when running a single worker kind");
        }

        let defaults = WorkerConfig::for_kind(kind);
        let config = WorkerConfig {
            kind,
            topic: self.topic_name.clone().unwrap_or(defaults.topic),
            worker_id: self
                .worker_id
                .clone()
                .map(WorkerId::new)
                .unwrap_or(defaults.worker_id),
            max_tasks: self.max_tasks,
            lock_duration: Duration::from_millis(self.lock_duration_ms),
            poll_interval: Duration::try_from_secs_f64(self.poll_sleep_sec)
                .context("invalid POLL_SLEEP_SEC")?,
            loop_error_backoff: Duration::try_from_secs_f64(self.loop_error_backoff_sec)
                .context("invalid LOOP_ERROR_BACKOFF_SEC")?,
            task_deadline: self.task_deadline_ms.map(Duration::from_millis),
            concurrency: self.worker_concurrency,
            retry: RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_timeout_ms)),
        };
        config
            .validate()
            .with_context(|| format!("invalid configuration for the {kind} worker"))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::List { status, storage } => {
            let store = storage.connect().await?;
            let rows = store.list(status).await.context("failed to list contracts")?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            store.close().await;
            Ok(())
        }
        Command::Stats { storage } => {
            let store = storage.connect().await?;
            let counts = store.counts().await.context("failed to count contracts")?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            store.close().await;
            Ok(())
        }
        Command::Demo => demo().await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut kinds: Vec<TopicKind> = Vec::with_capacity(args.kinds.len());
    for kind in &args.kinds {
        if !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }
    let single = kinds.len() == 1;

    let engine = args.engine.to_config();
    engine.validate()?;
    let source: Arc<dyn TaskSource> =
        Arc::new(EngineRestClient::new(&engine).context("failed to build the engine client")?);
    let store = args.storage.connect().await?;
    let shared: Arc<dyn ContractStore> = Arc::new(store.clone());

    let mut workers = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let config = args.worker.to_config(kind, single)?;
        let worker = WorkerBuilder::new(config)
            .task_source(Arc::clone(&source))
            .store(Arc::clone(&shared))
            .build()?;
        workers.push(worker);
    }

    info!(engine = ?engine, workers = workers.len(), "starting workers");
    let group = WorkerGroup::spawn(workers);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested, finishing in-flight tasks");

    let stats = group.shutdown_and_join().await;
    for (topic, snapshot) in stats {
        info!(topic = %topic, stats = ?snapshot, "final counters");
    }
    store.close().await;
    Ok(())
}

/// create → offer → approve / reject を in-memory で一周させる。
async fn demo() -> Result<()> {
    let engine = InMemoryEngine::new();
    let store = InMemoryContractStore::new();

    let workers = TopicKind::ALL
        .into_iter()
        .map(|kind| demo_worker(kind, &engine, &store))
        .collect::<Result<Vec<_>>>()?;
    let group = WorkerGroup::spawn(workers);

    let drafts = [("demo-1", "Website redesign", "12000"), ("demo-2", "Data migration", "")];
    for (pi, title, budget) in drafts {
        let vars = Variables::new()
            .with("contractTitle", TypedValue::string(title))
            .with("contractType", TypedValue::string("Service"))
            .with("budget", TypedValue::string(budget));
        engine
            .publish_for(TopicKind::Create.default_topic(), pi, vars)
            .await;
    }
    wait_until_drained(&engine, TopicKind::Create).await?;

    let approved = demo_contract_id(&engine, "demo-1").await?;
    store
        .record_offer(
            approved,
            &ProviderOffer {
                providers_budget: Some(11_500),
                providers_comment: Some("can start next month".into()),
                meet_requirement: Some("yes".into()),
                providers_name: Some("Acme Consulting".into()),
            },
        )
        .await?;

    let review = |decision: &str| {
        Variables::new()
            .with("legalcomment", TypedValue::string("checked by legal"))
            .with("approvaldecision", TypedValue::string(decision))
    };
    engine
        .publish_for(
            TopicKind::Approve.default_topic(),
            "demo-1",
            review("approved")
                .with("employeeName", TypedValue::string("Jane Doe"))
                .with("finalPrice", TypedValue::double(11_500.0))
                .with("signeddate", TypedValue::string("2024-05-01")),
        )
        .await;
    engine
        .publish_for(TopicKind::Reject.default_topic(), "demo-2", review("rejected"))
        .await;
    wait_until_drained(&engine, TopicKind::Approve).await?;
    wait_until_drained(&engine, TopicKind::Reject).await?;

    group.shutdown_and_join().await;

    for group in StatusGroup::ALL {
        let rows = store.list(group).await?;
        println!("{group:?}: {}", serde_json::to_string_pretty(&rows)?);
    }
    println!("counts: {}", serde_json::to_string(&store.counts().await?)?);
    Ok(())
}

fn demo_worker(
    kind: TopicKind,
    engine: &InMemoryEngine,
    store: &InMemoryContractStore,
) -> Result<WorkerLoop> {
    let config = WorkerConfig {
        poll_interval: Duration::from_millis(50),
        ..WorkerConfig::for_kind(kind)
    };
    Ok(WorkerBuilder::new(config)
        .task_source(Arc::new(engine.clone()))
        .store(Arc::new(store.clone()))
        .build()?)
}

async fn wait_until_drained(engine: &InMemoryEngine, kind: TopicKind) -> Result<()> {
    let topic = kind.default_topic();
    tokio::time::timeout(Duration::from_secs(10), async {
        while engine.open_tasks(topic).await > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .with_context(|| format!("tasks on {topic} were not processed in time"))
}

async fn demo_contract_id(engine: &InMemoryEngine, process: &str) -> Result<ContractId> {
    let vars = engine
        .process_variables(&ProcessInstanceId::new(process))
        .await
        .with_context(|| format!("unknown process instance {process}"))?;
    vars.contract_id(CONTRACT_ID_VAR)?
        .with_context(|| format!("{process} has no {CONTRACT_ID_VAR} yet"))
}
