use anyhow::Context;
use clap::{Parser, Subcommand};
use question_sync::dispatcher::{Dispatcher, WorkerPool};
use question_sync::kafka::{BrokerConnection, DeadLetterPublisher};
use question_sync::search::{ensure_collection, CollectionSchema, TypesenseClient};
use question_sync::{Config, DomainEvent, EventPublisher, IndexSynchronizer, KafkaEventPublisher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "question-sync")]
#[command(about = "Keeps the question search index in step with question events", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", global = true)]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs", global = true)]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume question events and apply them to the search index
    Sync,
    /// Create the search collection if it doesn't exist yet
    BootstrapIndex,
    /// Publish one event read from a JSON file, e.g. to replay a missed one
    Publish {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting question-sync");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e).context("invalid configuration");
        }
    };

    info!(
        kafka_brokers = ?config.kafka.brokers,
        kafka_topic = %config.kafka.topic,
        kafka_dead_letter_topic = %config.kafka.dead_letter_topic,
        kafka_group = %config.kafka.group_id,
        search_url = %config.search.url,
        search_collection = %config.search.collection,
        workers = config.consumer.workers,
        "Configuration summary"
    );

    let outcome = match args.command {
        Command::Sync => run_sync(&config).await,
        Command::BootstrapIndex => {
            let search = TypesenseClient::new(&config.search)?;
            bootstrap_index(&config, &search).await
        }
        Command::Publish { file } => publish_file(&config, &file).await,
    };

    if let Err(e) = &outcome {
        error!("Fatal: {:#}", e);
    }
    outcome
}

async fn run_sync(config: &Config) -> anyhow::Result<()> {
    let connection = BrokerConnection::establish(&config.kafka)
        .await
        .context("connecting to the message broker")?;

    let search = Arc::new(TypesenseClient::new(&config.search)?);
    bootstrap_index(config, search.as_ref()).await?;

    let consumer = Arc::new(connection.subscribe()?);
    let dispatcher = Arc::new(Dispatcher::new(
        IndexSynchronizer::new(search, config.search.collection.clone()),
        config.consumer.redelivery(),
    ));
    let dead_letters = Arc::new(DeadLetterPublisher::new(
        connection.producer(),
        config.kafka.dead_letter_topic.clone(),
    ));
    let pool = WorkerPool::spawn(
        config.consumer.workers,
        config.consumer.lane_capacity,
        dispatcher,
        consumer.clone(),
        dead_letters,
    );

    info!(
        topic = %consumer.topic(),
        workers = config.consumer.workers,
        "Consuming question events"
    );
    let outcome = consumer.run(pool, shutdown_signal()).await;
    let stats = close_after(outcome, move || connection.close())?;
    info!(
        applied = stats.applied,
        skipped = stats.skipped,
        dead_lettered = stats.dead_lettered,
        unsettled = stats.unsettled,
        "Consumer stopped"
    );
    Ok(())
}

/// Runs `close` whatever `outcome` is, so queued dead letters are flushed
/// even when the consumer failed. The consumer's error takes precedence.
fn close_after<T>(
    outcome: question_sync::Result<T>,
    close: impl FnOnce() -> question_sync::Result<()>,
) -> anyhow::Result<T> {
    let closed = close();
    let value = outcome?;
    closed?;
    Ok(value)
}

async fn bootstrap_index(config: &Config, search: &TypesenseClient) -> anyhow::Result<()> {
    let schema = CollectionSchema::questions(&config.search.collection);
    let outcome = ensure_collection(
        search,
        &schema,
        config.search.bootstrap_timeout(),
        config.search.bootstrap_poll_interval(),
    )
    .await
    .context("bootstrapping the search collection")?;

    info!(?outcome, collection = %schema.name, "Search index ready");
    Ok(())
}

async fn publish_file(config: &Config, file: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let event: DomainEvent = serde_json::from_slice(&raw)
        .with_context(|| format!("{} does not hold a question event", file.display()))?;

    let connection = BrokerConnection::establish(&config.kafka)
        .await
        .context("connecting to the message broker")?;
    KafkaEventPublisher::for_connection(&connection)
        .publish(&event)
        .await?;
    info!(
        event_type = %event.kind(),
        question_id = %event.question_id(),
        "Event published"
    );

    connection.close()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("question_sync=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("question_sync=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use question_sync::Error;
    use std::cell::Cell;

    #[test]
    fn test_connection_closed_when_consumer_fails() {
        let closed = Cell::new(false);

        let result: anyhow::Result<()> = close_after(Err(Error::Shutdown), || {
            closed.set(true);
            Ok(())
        });

        assert!(closed.get());
        let err = result.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Shutdown)));
    }

    #[test]
    fn test_close_error_reported_after_clean_run() {
        let result = close_after(Ok(7), || Err(Error::InvalidConfig("flush".to_string())));
        assert!(result.is_err());

        assert_eq!(close_after(Ok(7), || Ok(())).unwrap(), 7);
    }
}
