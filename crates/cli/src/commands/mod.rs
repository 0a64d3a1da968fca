pub mod config;
pub mod doctor;
pub mod forget;
pub mod migrate;
pub mod normalize;
pub mod patterns;
pub mod record_shot;
pub mod suggest;

use std::future::Future;
use std::sync::Arc;

use caddie_agent::{EventRecorder, MissPatternMemory};
use caddie_core::config::{AppConfig, LoadOptions};
use caddie_db::repositories::{SqlMissPatternRepository, SqlSessionRepository, SqlShotRepository};
use caddie_db::{connect_from_config, migrations, DbPool};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_inner(command, message.into(), None)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Value) -> Self {
        Self::success_inner(command, message.into(), Some(data))
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn success_inner(command: &str, message: String, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

/// Error class, message and exit code of a failed step.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) fn failure(command: &str, (error_class, message, exit_code): Failure) -> CommandResult {
    CommandResult::failure(command, error_class, message, exit_code)
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })
}

/// Runs `future` to completion on a fresh current-thread runtime.
pub(crate) fn block_on<F, T>(command: &str, future: F) -> Result<T, CommandResult>
where
    F: Future<Output = Result<T, Failure>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;
    runtime.block_on(future).map_err(|failed| failure(command, failed))
}

/// SQLite-backed memory services for one command invocation.
pub(crate) struct MemoryStore {
    pub pool: DbPool,
    pub memory: Arc<MissPatternMemory>,
    pub recorder: EventRecorder,
}

impl MemoryStore {
    /// Connects and applies pending migrations.
    pub(crate) async fn open(config: &AppConfig) -> Result<Self, Failure> {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let shots = Arc::new(SqlShotRepository::with_retention_days(
            pool.clone(),
            config.memory.shot_retention_days,
        ));
        let patterns = Arc::new(SqlMissPatternRepository::new(pool.clone()));
        let memory = Arc::new(
            MissPatternMemory::from_config(shots, patterns, &config.memory)
                .map_err(|error| ("config_validation", error.to_string(), 2u8))?,
        );
        let recorder =
            EventRecorder::new(memory.clone(), Arc::new(SqlSessionRepository::new(pool.clone())));

        Ok(Self { pool, memory, recorder })
    }

    pub(crate) async fn close(self) {
        self.pool.close().await;
    }
}

pub(crate) fn memory_failure(error: impl ToString) -> Failure {
    ("memory", error.to_string(), 6)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
