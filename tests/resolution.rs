//! Resolution and batch processing against the in-process register

mod helpers;

use std::sync::Arc;
use uuid::Uuid;

use charity_enrich::database::{EnrichmentStore, NewResolution};
use charity_enrich::error::ResolutionError;
use charity_enrich::models::{BatchStatus, EntityType, ResolutionStatus};
use charity_enrich::resolution::{BatchProcessor, EntityResolver, ProcessOptions};
use helpers::{pending, FakeRegistry, InMemoryStore};

fn registry() -> FakeRegistry {
    FakeRegistry::new()
        .with_charity("202918", "OXFAM", &["Jane Smith"])
        .with_charity("220949", "British Red Cross", &[])
        .with_charity("1100001", "Red Cross Society of Wales", &[])
}

fn resolver(store: &Arc<InMemoryStore>, registry: FakeRegistry) -> EntityResolver {
    EntityResolver::new(store.clone(), registry.into_arc())
}

#[tokio::test]
async fn test_known_number_is_looked_up_directly() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Some trading name", 1);
    entity.charity_number = Some("202918".into());
    store.put(entity.clone());

    resolver(&store, registry())
        .resolve_entity(&mut entity)
        .await
        .unwrap();

    let saved = store.entity(entity.id);
    assert_eq!(saved.resolution_status, ResolutionStatus::Matched);
    assert_eq!(saved.resolution_method.as_deref(), Some("direct_lookup"));
    assert_eq!(saved.resolution_confidence, Some(1.0));
    assert_eq!(saved.resolved_name.as_deref(), Some("OXFAM"));
    assert_eq!(saved.entity_type, EntityType::Charity);
    assert_eq!(saved.trustee_names(), vec!["Jane Smith".to_string()]);
}

#[tokio::test]
async fn test_number_in_name_is_extracted() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Oxfam GB (reg. 202918)", 1);
    store.put(entity.clone());

    resolver(&store, registry())
        .resolve_entity(&mut entity)
        .await
        .unwrap();

    let saved = store.entity(entity.id);
    assert_eq!(saved.resolution_status, ResolutionStatus::Matched);
    assert_eq!(saved.resolution_method.as_deref(), Some("number_extraction"));
    assert_eq!(saved.resolution_confidence, Some(0.95));
    assert_eq!(saved.charity_number.as_deref(), Some("202918"));
}

#[tokio::test]
async fn test_near_exact_name_is_committed() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Oxfam Limited", 1);
    store.put(entity.clone());

    resolver(&store, registry())
        .resolve_entity(&mut entity)
        .await
        .unwrap();

    let saved = store.entity(entity.id);
    assert_eq!(saved.resolution_status, ResolutionStatus::Matched);
    assert_eq!(saved.resolution_method.as_deref(), Some("exact_match"));

    let candidates = store.resolutions(entity.id);
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].is_selected);
    assert_eq!(candidates[0].match_method, "fuzzy_search");
}

#[tokio::test]
async fn test_ambiguous_name_goes_to_review() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Red Cross", 1);
    store.put(entity.clone());

    resolver(&store, registry())
        .resolve_entity(&mut entity)
        .await
        .unwrap();

    let saved = store.entity(entity.id);
    assert_eq!(saved.resolution_status, ResolutionStatus::MultipleMatches);
    assert!(saved.charity_number.is_none());

    let candidates = store.resolutions(entity.id);
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|c| !c.is_selected));
    let best = candidates
        .iter()
        .map(|c| c.confidence_score)
        .fold(0.0, f64::max);
    assert_eq!(saved.resolution_confidence, Some(best));
    assert!(best < 0.95);
}

#[tokio::test]
async fn test_unknown_name_is_no_match() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Zzyzx Widget Works", 1);
    store.put(entity.clone());

    resolver(&store, registry())
        .resolve_entity(&mut entity)
        .await
        .unwrap();

    let saved = store.entity(entity.id);
    assert_eq!(saved.resolution_status, ResolutionStatus::NoMatch);
    assert_eq!(saved.resolution_confidence, Some(0.0));
    assert!(store.resolutions(entity.id).is_empty());
}

#[tokio::test]
async fn test_register_outage_degrades_to_no_match() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Oxfam", 1);
    store.put(entity.clone());

    let mut registry = registry();
    registry.fail_searches = true;
    resolver(&store, registry)
        .resolve_entity(&mut entity)
        .await
        .unwrap();

    assert_eq!(store.entity(entity.id).resolution_status, ResolutionStatus::NoMatch);
}

#[tokio::test]
async fn test_confirm_candidate_and_reject() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Red Cross", 1);
    store.put(entity.clone());
    let resolver = resolver(&store, registry());
    resolver.resolve_entity(&mut entity).await.unwrap();

    let chosen = store
        .resolutions(entity.id)
        .into_iter()
        .find(|c| c.charity_number.as_deref() == Some("220949"))
        .unwrap();

    let confirmed = resolver
        .confirm_resolution(entity.id, Some(chosen.id), None)
        .await
        .unwrap();
    assert_eq!(confirmed.resolution_status, ResolutionStatus::Confirmed);
    assert_eq!(confirmed.resolution_method.as_deref(), Some("manual_confirm"));
    assert_eq!(confirmed.charity_number.as_deref(), Some("220949"));
    assert!(store
        .resolutions(entity.id)
        .iter()
        .all(|c| c.is_selected == (c.id == chosen.id)));

    let rejected = resolver
        .confirm_resolution(entity.id, None, None)
        .await
        .unwrap();
    assert_eq!(rejected.resolution_status, ResolutionStatus::Rejected);
}

#[tokio::test]
async fn test_confirm_errors() {
    let store = InMemoryStore::new();
    let entity = pending(Uuid::new_v4(), "Oxfam", 1);
    store.put(entity.clone());
    let resolver = resolver(&store, registry());

    let missing_candidate = resolver
        .confirm_resolution(entity.id, Some(Uuid::new_v4()), None)
        .await;
    assert!(matches!(missing_candidate, Err(ResolutionError::CandidateNotFound(_))));

    let unknown_charity = resolver
        .confirm_resolution(entity.id, None, Some("999999".into()))
        .await;
    assert!(matches!(unknown_charity, Err(ResolutionError::CharityNotFound(_))));

    let missing_entity = resolver.confirm_resolution(Uuid::new_v4(), None, None).await;
    assert!(matches!(missing_entity, Err(ResolutionError::EntityNotFound(_))));
}

#[tokio::test]
async fn test_re_resolve_replaces_candidates() {
    let store = InMemoryStore::new();
    let mut entity = pending(Uuid::new_v4(), "Red Cross", 1);
    store.put(entity.clone());
    let resolver = resolver(&store, registry());
    resolver.resolve_entity(&mut entity).await.unwrap();
    assert_eq!(store.resolutions(entity.id).len(), 2);

    let again = resolver.re_resolve(entity.id).await.unwrap();
    assert_eq!(again.resolution_status, ResolutionStatus::MultipleMatches);
    assert_eq!(store.resolutions(entity.id).len(), 2);
}

#[tokio::test]
async fn test_process_batch_counts_outcomes() {
    let store = InMemoryStore::new();
    let batch_id = Uuid::new_v4();
    for (row, name) in ["Oxfam", "Red Cross", "Zzyzx Widget Works", "British Red Cross"]
        .iter()
        .enumerate()
    {
        store.put(pending(batch_id, name, row as i32 + 1));
    }

    let processor = BatchProcessor::new(store.clone(), registry().into_arc());
    let progress = processor
        .process_batch(batch_id, ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(progress.processed, 4);
    assert_eq!(progress.matched, 2);
    assert_eq!(progress.failed, 0);

    let (status, recorded, _) = store.batch(batch_id).unwrap();
    assert_eq!(status, BatchStatus::Completed);
    assert_eq!(recorded, Some(progress));
    assert!(store.pending_entities(batch_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reprocessing_rejected_entity_keeps_one_candidate_set() {
    let store = InMemoryStore::new();
    let batch_id = Uuid::new_v4();
    let mut entity = pending(batch_id, "Red Cross", 1);
    store.put(entity.clone());
    let registry = registry().into_arc();

    EntityResolver::new(store.clone(), registry.clone())
        .resolve_entity(&mut entity)
        .await
        .unwrap();
    assert_eq!(store.resolutions(entity.id).len(), 2);

    let rejected = EntityResolver::new(store.clone(), registry.clone())
        .confirm_resolution(entity.id, None, None)
        .await
        .unwrap();
    assert_eq!(rejected.resolution_status, ResolutionStatus::Rejected);

    // What a reprocess does to rejected rows before running the batch again
    let mut reset = store.entity(entity.id);
    reset.resolution_status = ResolutionStatus::Pending;
    store.put(reset);

    BatchProcessor::new(store.clone(), registry)
        .process_batch(batch_id, ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(
        store.entity(entity.id).resolution_status,
        ResolutionStatus::MultipleMatches
    );
    assert_eq!(store.resolutions(entity.id).len(), 2);
}

#[tokio::test]
async fn test_confirm_selects_only_the_chosen_row() {
    let store = InMemoryStore::new();
    let entity = pending(Uuid::new_v4(), "Oxfam shop", 1);
    store.put(entity.clone());

    let candidate = |name: &str| NewResolution {
        charity_number: Some("202918".into()),
        company_number: None,
        candidate_name: name.into(),
        candidate_data: None,
        confidence_score: 0.8,
        match_method: "fuzzy_search".into(),
    };
    let rows = store
        .add_resolutions(entity.id, &[candidate("OXFAM"), candidate("OXFAM GB")])
        .await
        .unwrap();

    resolver(&store, registry())
        .confirm_resolution(entity.id, Some(rows[1].id), None)
        .await
        .unwrap();

    let selected: Vec<_> = store
        .resolutions(entity.id)
        .into_iter()
        .filter(|r| r.is_selected)
        .map(|r| r.id)
        .collect();
    assert_eq!(selected, vec![rows[1].id]);

    // A hand-entered number is not one of the candidates
    resolver(&store, registry())
        .confirm_resolution(entity.id, None, Some("220949".into()))
        .await
        .unwrap();
    assert!(store.resolutions(entity.id).iter().all(|r| !r.is_selected));
}
