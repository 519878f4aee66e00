//! End-to-end pipeline test: orchestrator emits a `BatchGenerate` envelope,
//! the queue processor dispatches it to the batch-generate handler, and the
//! exit-create events the handler defers are in turn fed back through the
//! same processor until the publisher runs dry.

use std::sync::Arc;

use uuid::Uuid;

use world_core::config::Config;
use world_core::direction::Direction;
use world_core::dlq::InMemoryDeadLetterRepository;
use world_core::envelope::EventType;
use world_core::handlers::batch_generate::BatchGenerateHandler;
use world_core::handlers::exit_create::ExitCreateHandler;
use world_core::orchestration::{AreaGenerationOrchestrator, AreaGenerationRequest, GenerationMode};
use world_core::processor::{HandlerRegistry, ProcessOutcome, QueueProcessor};
use world_core::publisher::memory::InMemoryPublisher;
use world_core::publisher::Publisher;
use world_core::repository::{
    InMemoryLayerRepository, InMemoryLocationRepository, InMemoryProcessedEventRepository, InMemoryRealmRepository, Location,
    LocationRepository, RealmRepository,
};
use world_core::telemetry::RecordingTelemetry;

fn anchor(id: Uuid) -> Location {
    Location {
        id,
        name: "Town Square".to_string(),
        description: "The center of town.".to_string(),
        terrain: Some("open-plain".to_string()),
        tags: Default::default(),
        exits: Vec::new(),
        exit_availability: Default::default(),
        version: 1,
    }
}

/// Drains every envelope currently sitting in `publisher` through
/// `processor`, repeating until a pass produces no new publications — the
/// batch-generate handler defers its exit-creation work as further events
/// rather than calling the location repository directly, so one full run
/// spans more than one processor dispatch.
async fn drain(processor: &QueueProcessor, publisher: &InMemoryPublisher) -> Vec<ProcessOutcome> {
    let mut outcomes = Vec::new();
    let mut processed_through = 0usize;
    loop {
        let published = publisher.published().await;
        if published.len() == processed_through {
            break;
        }
        for envelope in &published[processed_through..] {
            let raw = serde_json::to_string(envelope).unwrap();
            outcomes.push(processor.process_message(&raw).await.unwrap());
        }
        processed_through = published.len();
    }
    outcomes
}

struct Harness {
    location_repo: Arc<InMemoryLocationRepository>,
    publisher: Arc<InMemoryPublisher>,
    telemetry: Arc<RecordingTelemetry>,
    processor: QueueProcessor,
    orchestrator: AreaGenerationOrchestrator,
}

fn build_harness() -> Harness {
    let location_repo = Arc::new(InMemoryLocationRepository::new());
    let layer_repo = Arc::new(InMemoryLayerRepository::new());
    let realm_repo: Arc<dyn RealmRepository> = Arc::new(InMemoryRealmRepository::new());
    let publisher = Arc::new(InMemoryPublisher::new());
    let telemetry = Arc::new(RecordingTelemetry::new());

    let location_repo_trait: Arc<dyn LocationRepository> = location_repo.clone();
    let publisher_trait: Arc<dyn Publisher> = publisher.clone();

    let mut registry = HandlerRegistry::new();
    registry.register(
        EventType::WorldLocationBatchGenerate,
        Arc::new(BatchGenerateHandler::new(
            location_repo_trait.clone(),
            layer_repo,
            publisher_trait.clone(),
            telemetry.clone(),
        )),
    );
    registry.register(EventType::WorldExitCreate, Arc::new(ExitCreateHandler::new(location_repo_trait.clone())));

    let processor = QueueProcessor::new(
        Arc::new(InMemoryProcessedEventRepository::new()),
        Arc::new(InMemoryDeadLetterRepository::new()),
        registry,
        telemetry.clone(),
    );

    let orchestrator = AreaGenerationOrchestrator::new(location_repo_trait, realm_repo, publisher_trait, telemetry.clone(), Config::default());

    Harness {
        location_repo,
        publisher,
        telemetry,
        processor,
        orchestrator,
    }
}

#[tokio::test]
async fn orchestrator_to_batch_generate_to_exit_create_round_trip() {
    let harness = build_harness();
    let anchor_id = Uuid::new_v4();
    harness.location_repo.upsert(anchor(anchor_id)).await.unwrap();

    harness
        .orchestrator
        .generate(AreaGenerationRequest {
            anchor_location_id: Some(anchor_id),
            arrival_direction: Direction::South,
            batch_size: 4,
            mode: GenerationMode::Auto,
            realm_hints: None,
            realm_key: None,
            idempotency_key: None,
            correlation_id: None,
        })
        .await
        .unwrap();

    let outcomes = drain(&harness.processor, &harness.publisher).await;

    // One BatchGenerate dispatch plus one ExitCreate dispatch per stub
    // (north/east/west — arriving from the south).
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| *o == ProcessOutcome::Processed));

    let anchor_after = harness.location_repo.get(anchor_id).await.unwrap().unwrap();
    assert_eq!(anchor_after.exits.len(), 3);
    for direction in [Direction::North, Direction::East, Direction::West] {
        let exit = anchor_after.exit_toward(direction).expect("exit applied by the exit-create handler");
        let neighbor = harness.location_repo.get(exit.to).await.unwrap().unwrap();
        assert!(neighbor.exit_toward(direction.opposite()).is_some());
    }

    assert_eq!(harness.telemetry.events_named("World.AreaGeneration.Completed").len(), 1);
    assert_eq!(harness.telemetry.events_named("World.BatchGeneration.Completed").len(), 1);
    assert_eq!(harness.telemetry.events_named("World.Event.Processed").len(), 4);
}

#[tokio::test]
async fn redelivering_the_batch_generate_envelope_is_a_no_op_second_time() {
    let harness = build_harness();
    let anchor_id = Uuid::new_v4();
    harness.location_repo.upsert(anchor(anchor_id)).await.unwrap();

    let request = AreaGenerationRequest {
        anchor_location_id: Some(anchor_id),
        arrival_direction: Direction::South,
        batch_size: 4,
        mode: GenerationMode::Auto,
        realm_hints: None,
        realm_key: None,
        idempotency_key: Some("fixed-area-gen-key".to_string()),
        correlation_id: None,
    };

    harness.orchestrator.generate(request.clone()).await.unwrap();
    drain(&harness.processor, &harness.publisher).await;
    let exits_after_first_run = harness.location_repo.get(anchor_id).await.unwrap().unwrap().exits.len();

    // Same idempotency key: the processor must recognize the BatchGenerate
    // envelope as a duplicate and never re-dispatch it, so no new stubs or
    // exits appear.
    harness.orchestrator.generate(request).await.unwrap();
    let outcomes = drain(&harness.processor, &harness.publisher).await;

    assert_eq!(outcomes, vec![ProcessOutcome::Duplicate]);
    let exits_after_second_run = harness.location_repo.get(anchor_id).await.unwrap().unwrap().exits.len();
    assert_eq!(exits_after_first_run, exits_after_second_run);
}
