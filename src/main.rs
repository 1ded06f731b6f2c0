//! table-stampede CLI - serve the upload API or run one-off uploads.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use table_stampede::config::AppConfig;
use table_stampede::error::AppError;
use table_stampede::render::render_status;
use table_stampede::salesforce::SessionContext;
use table_stampede::source::{self, PostgresConnector};
use table_stampede::state::AppState;
use table_stampede::storage::{Database, DatabaseTaskStore, TaskState, TaskStore, UploadTask};
use table_stampede::tasks::UploadRequest;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "table-stampede")]
#[command(about = "Bulk-load database tables into Salesforce objects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Source database connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,
}

#[derive(clap::Args)]
struct OrgArgs {
    /// Salesforce access token
    #[arg(long, env = "SF_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Salesforce instance host or URL
    #[arg(long, env = "SF_INSTANCE_URL")]
    instance_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,

    /// List uploadable tables of the source database
    Tables {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Upload one table and wait for the result
    Upload {
        /// Table to upload, as schema.table
        table: String,

        /// Destination object (defaults to the configured naming rule)
        #[arg(long)]
        object: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        org: OrgArgs,
    },

    /// Print the status of a stored upload task
    Status {
        task_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e.describe());
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,h2=warn,tower_http=warn,sqlx=warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn run() -> Result<ExitCode, AppError> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging();

    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve => {
            let addr = config.bind_addr;
            let state = AppState::init(config).await?;
            state.runner.recover_interrupted().await?;
            let sweeps = CancellationToken::new();
            let recovery = state.runner.spawn_recovery(sweeps.clone());
            let served = table_stampede::server::serve(Arc::new(state), addr).await;
            sweeps.cancel();
            if let Err(e) = recovery.await {
                warn!("[CLI] Recovery sweep ended abnormally: {}", e);
            }
            served?;
        }

        Commands::Tables { source: args } => {
            let connection_string = SecretString::from(args.database_url);
            let tables = source::discover_tables(&PostgresConnector::new(), &connection_string).await?;
            for table in tables {
                println!("{}", table);
            }
        }

        Commands::Upload {
            table,
            object,
            source: args,
            org,
        } => {
            let session = SessionContext::new(SecretString::from(org.access_token), &org.instance_url)
                .map_err(|e| AppError::Config(format!("Invalid Salesforce session: {}", e)))?;
            let poll = config.poll_interval;
            let state = AppState::init(config).await?;

            let request = UploadRequest {
                table,
                connection_string: SecretString::from(args.database_url),
                object,
            };
            let task_id = state.runner.submit(session, request).await?;
            eprintln!("Task {} queued", task_id);

            let task = tokio::select! {
                task = state.runner.wait_for_task(&task_id, poll) => task?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("[CLI] Interrupted, cancelling upload");
                    state.runner.cancel(&task_id).await?;
                    state.runner.wait_for_task(&task_id, poll).await?
                }
            };
            return print_task(&task);
        }

        Commands::Status { task_id } => {
            let store = DatabaseTaskStore::new(Database::init(config.db_path).await?);
            let task = store
                .get_task(&task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Upload task {}", task_id)))?;
            return print_task(&task);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_task(task: &UploadTask) -> Result<ExitCode, AppError> {
    let payload = render_status(Some(task));
    let json = serde_json::to_string_pretty(&payload)
        .map_err(|e| AppError::Internal(format!("Failed to serialize status: {}", e)))?;
    println!("{}", json);

    info!("[CLI] Task finished as {}", task.state.as_str());
    Ok(match task.state {
        TaskState::Failed => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
