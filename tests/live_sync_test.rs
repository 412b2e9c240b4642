mod common;

use common::get_test_config;
use question_sync::dispatcher::{Dispatcher, WorkerPool};
use question_sync::kafka::{BrokerConnection, DeadLetterPublisher};
use question_sync::questions::{InMemoryQuestionRepository, QuestionService};
use question_sync::search::{
    ensure_collection, BootstrapOutcome, CollectionSchema, SearchClient, TypesenseClient,
};
use question_sync::{IndexSynchronizer, KafkaEventPublisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::info;

#[tokio::test]
#[ignore] // Needs Kafka and Typesense. Run with: cargo test --test live_sync_test -- --ignored
async fn test_question_flows_from_service_to_typesense() {
    tracing_subscriber::fmt()
        .with_env_filter("question_sync=debug,rdkafka=info")
        .try_init()
        .ok();

    let config = get_test_config();
    let search = Arc::new(TypesenseClient::new(&config.search).unwrap());
    let schema = CollectionSchema::questions(&config.search.collection);

    let outcome = ensure_collection(
        search.as_ref(),
        &schema,
        config.search.bootstrap_timeout(),
        config.search.bootstrap_poll_interval(),
    )
    .await
    .unwrap();
    info!(?outcome, "Collection ready");

    // Bootstrapping again finds the collection in place.
    let again = ensure_collection(
        search.as_ref(),
        &schema,
        config.search.bootstrap_timeout(),
        config.search.bootstrap_poll_interval(),
    )
    .await
    .unwrap();
    assert_eq!(again, BootstrapOutcome::AlreadyExists);

    let connection = BrokerConnection::establish(&config.kafka).await.unwrap();
    let consumer = Arc::new(connection.subscribe().unwrap());
    let dispatcher = Arc::new(Dispatcher::new(
        IndexSynchronizer::new(search.clone(), config.search.collection.clone()),
        config.consumer.redelivery(),
    ));
    let pool = WorkerPool::spawn(
        config.consumer.workers,
        config.consumer.lane_capacity,
        dispatcher,
        consumer.clone(),
        Arc::new(DeadLetterPublisher::new(
            connection.producer(),
            config.kafka.dead_letter_topic.clone(),
        )),
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let consumer_handle = {
        let consumer = consumer.clone();
        tokio::spawn(async move {
            consumer
                .run(pool, async move {
                    stopped.await.ok();
                })
                .await
        })
    };

    let questions = QuestionService::new(
        Arc::new(InMemoryQuestionRepository::new()),
        Arc::new(KafkaEventPublisher::for_connection(&connection)),
    );
    let q = questions
        .create_question("Live question", "<p>live <em>body</em></p>", vec!["kafka".to_string()])
        .await
        .unwrap();
    let a = questions.add_answer(&q.id, "an answer").await.unwrap();
    questions.accept_answer(&q.id, &a.id).await.unwrap();

    let mut synced = None;
    let start = tokio::time::Instant::now();
    while start.elapsed() < Duration::from_secs(30) {
        if let Ok(doc) = search
            .retrieve_document(&config.search.collection, &q.id)
            .await
        {
            if doc.has_accepted_answer {
                synced = Some(doc);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    let doc = synced.expect("document never reached the index");
    assert_eq!(doc.content, "live body");
    assert_eq!(doc.answer_count, 1);

    questions.delete_question(&q.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    stop.send(()).ok();
    let stats = consumer_handle.await.unwrap().unwrap();
    assert_eq!(stats.dead_lettered, 0);
    assert!(search
        .retrieve_document(&config.search.collection, &q.id)
        .await
        .is_err());

    connection.close().unwrap();
}
