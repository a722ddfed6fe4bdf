//! Ownership discovery against the in-process register

mod helpers;

use std::sync::Arc;
use uuid::Uuid;

use charity_enrich::models::{Entity, EntityType};
use charity_enrich::ownership::{Direction, OwnershipBuilder};
use charity_enrich::resolution::EntityResolver;
use helpers::{pending, FakeRegistry, InMemoryStore};

const PARENT: &str = "1000001";
const CHILD: &str = "1000002";
const GRANDCHILD: &str = "1000003";

/// Parent -> (subsidiary, Child -> Grandchild -> back to Parent)
fn registry() -> Arc<FakeRegistry> {
    Arc::new(
        FakeRegistry::new()
            .with_charity(PARENT, "PARENT CHARITY", &["CHILD CHARITY", "A. Person"])
            .with_subsidiary(PARENT, "Parent Trading Ltd", "01234567")
            .with_charity(CHILD, "CHILD CHARITY", &["GRANDCHILD CHARITY"])
            .with_charity(GRANDCHILD, "GRANDCHILD CHARITY", &["PARENT CHARITY"]),
    )
}

/// A resolved level-0 entity for the parent charity
async fn resolved_root(store: &Arc<InMemoryStore>, registry: &Arc<FakeRegistry>) -> Entity {
    let mut root = pending(Uuid::new_v4(), "Parent Charity", 1);
    root.charity_number = Some(PARENT.into());
    store.put(root.clone());
    EntityResolver::new(store.clone(), registry.clone())
        .resolve_entity(&mut root)
        .await
        .unwrap();
    root
}

fn builder(store: &Arc<InMemoryStore>, registry: &Arc<FakeRegistry>) -> OwnershipBuilder {
    OwnershipBuilder::new(store.clone(), registry.clone())
}

#[tokio::test]
async fn test_downward_tree_follows_subsidiaries_and_trustees() {
    let store = InMemoryStore::new();
    let registry = registry();
    let root = resolved_root(&store, &registry).await;

    let tree = builder(&store, &registry)
        .build_tree_for_entity(root.id, 3, Direction::Down)
        .await
        .unwrap();

    assert_eq!(tree.root.id, root.id);
    assert!(tree.parents.is_empty());
    assert_eq!(tree.children.len(), 2);

    let subsidiary = &tree.children[0];
    assert_eq!(subsidiary.relationship, "subsidiary");
    assert_eq!(subsidiary.entity.entity_type, EntityType::Company);
    assert_eq!(subsidiary.entity.company_number.as_deref(), Some("01234567"));
    assert_eq!(subsidiary.entity.level, 1);

    let child = &tree.children[1];
    assert_eq!(child.relationship, "trustee_charity");
    assert_eq!(child.entity.charity_number.as_deref(), Some(CHILD));
    assert_eq!(child.children.len(), 1);

    // The grandchild names the parent as trustee; the cycle stops there
    let grandchild = &child.children[0];
    assert_eq!(grandchild.entity.charity_number.as_deref(), Some(GRANDCHILD));
    assert_eq!(grandchild.entity.level, 2);
    assert!(grandchild.children.is_empty());

    assert_eq!(tree.total_entities, 4);
    assert!(tree.max_depth_reached <= 3);

    let saved_root = store.entity(root.id);
    assert!(saved_root
        .enriched_data
        .as_ref()
        .and_then(|d| d.get("ownership_tree"))
        .is_some());

    let links = store.ownerships();
    assert_eq!(links.len(), 3);
    assert!(links.iter().all(|l| l.verified && l.source == "charity_commission"));
}

#[tokio::test]
async fn test_depth_limit_stops_recursion() {
    let store = InMemoryStore::new();
    let registry = registry();
    let root = resolved_root(&store, &registry).await;

    let tree = builder(&store, &registry)
        .build_tree_for_entity(root.id, 1, Direction::Down)
        .await
        .unwrap();

    assert_eq!(tree.children.len(), 2);
    assert!(tree.children.iter().all(|c| c.children.is_empty()));
    assert_eq!(tree.total_entities, 3);
    assert_eq!(tree.max_depth_reached, 1);
    assert!(store.entities_named("GRANDCHILD CHARITY").is_empty());
}

#[tokio::test]
async fn test_rebuilding_reuses_discovered_entities() {
    let store = InMemoryStore::new();
    let registry = registry();
    let root = resolved_root(&store, &registry).await;
    let builder = builder(&store, &registry);

    builder
        .build_tree_for_entity(root.id, 3, Direction::Down)
        .await
        .unwrap();
    let entities = store.entity_count();
    let links = store.ownerships().len();

    let again = builder
        .build_tree_for_entity(root.id, 3, Direction::Down)
        .await
        .unwrap();

    assert_eq!(again.total_entities, 4);
    assert_eq!(store.entity_count(), entities);
    assert_eq!(store.ownerships().len(), links);
}

#[tokio::test]
async fn test_upward_walk_and_chain() {
    let store = InMemoryStore::new();
    let registry = registry();
    let root = resolved_root(&store, &registry).await;
    let builder = builder(&store, &registry);

    builder
        .build_tree_for_entity(root.id, 3, Direction::Down)
        .await
        .unwrap();
    let grandchild = store.entities_named("GRANDCHILD CHARITY").remove(0);

    let tree = builder
        .build_tree_for_entity(grandchild.id, 3, Direction::Up)
        .await
        .unwrap();
    assert!(tree.children.is_empty());
    assert_eq!(tree.parents.len(), 1);
    assert_eq!(tree.parents[0].entity.charity_number.as_deref(), Some(CHILD));
    assert_eq!(tree.parents[0].parents[0].entity.id, root.id);

    let chain = builder.get_ownership_chain(grandchild.id).await.unwrap();
    let numbers: Vec<_> = chain
        .iter()
        .map(|e| e.charity_number.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(numbers, vec![PARENT, CHILD]);
}

#[tokio::test]
async fn test_batch_build_covers_resolved_roots_only() {
    let store = InMemoryStore::new();
    let registry = registry();
    let root = resolved_root(&store, &registry).await;
    store.put(pending(root.batch_id, "Still pending", 2));

    let summary = builder(&store, &registry)
        .build_trees_for_batch(root.batch_id, 3)
        .await
        .unwrap();

    assert_eq!(summary.trees_built, 1);
    assert_eq!(summary.total_related_entities, 3);
}
