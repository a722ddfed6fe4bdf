//! Recursive ownership discovery
//!
//! Downward: register subsidiaries and charities whose name matches a
//! trustee. Upward: ownership links already stored for the entity. Both
//! walks stop below `max_depth` and never revisit a charity number, company
//! number or entity.

use anyhow::{anyhow, Result};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::tree::{count_nodes, BatchTreeSummary, Direction, OwnershipTree, TreeNode};
use crate::charity_commission::RegistrySource;
use crate::database::{EnrichmentStore, NewOwnership};
use crate::models::{Entity, EntityType, ResolutionStatus};
use crate::resolution::apply_match;

pub const RELATION_SUBSIDIARY: &str = "subsidiary";
pub const RELATION_TRUSTEE_CHARITY: &str = "trustee_charity";
pub const SOURCE_CHARITY_COMMISSION: &str = "charity_commission";
pub const METHOD_SUBSIDIARY_DISCOVERY: &str = "subsidiary_discovery";
pub const METHOD_RELATED_DISCOVERY: &str = "related_discovery";

const TRUSTEE_SEARCH_PAGE_SIZE: u32 = 3;

/// Identifiers already placed in the tree being built
#[derive(Debug, Default)]
struct Visited {
    charities: HashSet<String>,
    companies: HashSet<String>,
    entities: HashSet<Uuid>,
}

impl Visited {
    fn seeded(root: &Entity) -> Self {
        let mut visited = Self::default();
        visited.entities.insert(root.id);
        if let Some(n) = &root.charity_number {
            visited.charities.insert(n.clone());
        }
        if let Some(n) = &root.company_number {
            visited.companies.insert(n.clone());
        }
        visited
    }
}

type Level = (Vec<TreeNode>, u32);

pub struct OwnershipBuilder {
    store: Arc<dyn EnrichmentStore>,
    registry: Arc<dyn RegistrySource>,
}

impl OwnershipBuilder {
    pub fn new(store: Arc<dyn EnrichmentStore>, registry: Arc<dyn RegistrySource>) -> Self {
        Self { store, registry }
    }

    /// Build, persist and return the tree around `entity_id`
    pub async fn build_tree_for_entity(
        &self,
        entity_id: Uuid,
        max_depth: u32,
        direction: Direction,
    ) -> Result<OwnershipTree> {
        let mut root = self
            .store
            .get_entity(entity_id)
            .await?
            .ok_or_else(|| anyhow!("Entity {} not found", entity_id))?;

        let mut visited = Visited::seeded(&root);
        let mut tree = OwnershipTree {
            root: (&root).into(),
            children: Vec::new(),
            parents: Vec::new(),
            total_entities: 1,
            max_depth_reached: 0,
        };

        if direction.walks_down() && root.charity_number.is_some() {
            let (children, depth) = self.walk_down(&root, 1, max_depth, &mut visited).await?;
            tree.total_entities += count_nodes(&children);
            tree.max_depth_reached = tree.max_depth_reached.max(depth);
            tree.children = children;
        }

        if direction.walks_up() {
            let (parents, depth) = self.walk_up(&root, 1, max_depth, &mut visited).await?;
            tree.total_entities += count_nodes(&parents);
            tree.max_depth_reached = tree.max_depth_reached.max(depth);
            tree.parents = parents;
        }

        root.set_enriched("ownership_tree", serde_json::to_value(&tree)?);
        self.store.save_entity(&root).await?;

        info!(
            entity_id = %entity_id,
            direction = %direction,
            total_entities = tree.total_entities,
            max_depth_reached = tree.max_depth_reached,
            "Built ownership tree"
        );
        Ok(tree)
    }

    fn walk_down<'a>(
        &'a self,
        parent: &'a Entity,
        depth: u32,
        max_depth: u32,
        visited: &'a mut Visited,
    ) -> BoxFuture<'a, Result<Level>> {
        async move {
            if depth > max_depth {
                return Ok((Vec::new(), depth - 1));
            }

            let mut children = Vec::new();
            let mut reached = depth;

            if let Some(charity_number) = parent.charity_number.as_deref() {
                match self.registry.get_charity_subsidiaries(charity_number).await {
                    Ok(subsidiaries) => {
                        for sub in subsidiaries {
                            if let Some(number) = &sub.company_number {
                                if !visited.companies.insert(number.clone()) {
                                    continue;
                                }
                            }

                            let child = self
                                .subsidiary_entity(parent, &sub.name, sub.company_number.as_deref(), depth)
                                .await?;
                            visited.entities.insert(child.id);
                            self.link(
                                parent,
                                &child,
                                RELATION_SUBSIDIARY,
                                format!("Subsidiary of {}", parent.display_name()),
                            )
                            .await?;

                            let mut node = TreeNode::new(&child, RELATION_SUBSIDIARY);
                            if child.charity_number.is_some() {
                                let (grandchildren, d) =
                                    self.walk_down(&child, depth + 1, max_depth, visited).await?;
                                node.children = grandchildren;
                                reached = reached.max(d);
                            }
                            children.push(node);
                        }
                    }
                    Err(e) => {
                        error!(charity_number = charity_number, error = %e, "Error getting subsidiaries");
                    }
                }
            }

            for trustee in parent.trustee_names() {
                match self.trustee_charity(parent, &trustee, depth, visited).await {
                    Ok(Some(related)) => {
                        self.link(
                            parent,
                            &related,
                            RELATION_TRUSTEE_CHARITY,
                            format!("Trustee: {}", trustee),
                        )
                        .await?;

                        let mut node = TreeNode::new(&related, RELATION_TRUSTEE_CHARITY);
                        let (grandchildren, d) =
                            self.walk_down(&related, depth + 1, max_depth, visited).await?;
                        node.children = grandchildren;
                        reached = reached.max(d);
                        children.push(node);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(trustee = %trustee, error = %e, "Error checking trustee charity");
                    }
                }
            }

            Ok((children, reached))
        }
        .boxed()
    }

    fn walk_up<'a>(
        &'a self,
        child: &'a Entity,
        depth: u32,
        max_depth: u32,
        visited: &'a mut Visited,
    ) -> BoxFuture<'a, Result<Level>> {
        async move {
            if depth > max_depth {
                return Ok((Vec::new(), depth - 1));
            }

            let mut parents = Vec::new();
            let mut reached = depth;

            for link in self.store.owners_of(child.id).await? {
                if !visited.entities.insert(link.owner_id) {
                    continue;
                }
                let Some(owner) = self.store.get_entity(link.owner_id).await? else {
                    continue;
                };

                let mut node = TreeNode::new(&owner, link.ownership_type.clone());
                let (grandparents, d) = self.walk_up(&owner, depth + 1, max_depth, visited).await?;
                node.parents = grandparents;
                reached = reached.max(d);
                parents.push(node);
            }

            Ok((parents, reached))
        }
        .boxed()
    }

    /// Existing batch entity with this company number, or a new company row
    async fn subsidiary_entity(
        &self,
        parent: &Entity,
        name: &str,
        company_number: Option<&str>,
        level: u32,
    ) -> Result<Entity> {
        if let Some(number) = company_number {
            if let Some(existing) = self
                .store
                .find_by_company_number(parent.batch_id, number)
                .await?
            {
                return Ok(existing);
            }
        }

        let mut entity = Entity::new_pending(parent.batch_id, name, None, None);
        entity.entity_type = EntityType::Company;
        entity.resolved_name = Some(name.to_string());
        entity.company_number = company_number.map(str::to_string);
        entity.parent_entity_id = Some(parent.id);
        entity.ownership_level = level as i32;
        entity.resolution_status = ResolutionStatus::Matched;
        entity.resolution_confidence = Some(1.0);
        entity.resolution_method = Some(METHOD_SUBSIDIARY_DISCOVERY.to_string());
        entity.resolved_at = Some(chrono::Utc::now());

        self.store.insert_entity(&entity).await?;
        Ok(entity)
    }

    /// Charity registered under exactly the trustee's name, if any
    async fn trustee_charity(
        &self,
        parent: &Entity,
        trustee: &str,
        level: u32,
        visited: &mut Visited,
    ) -> Result<Option<Entity>> {
        let hits = self
            .registry
            .search_charities(trustee, TRUSTEE_SEARCH_PAGE_SIZE)
            .await?;

        for hit in hits {
            if visited.charities.contains(&hit.charity_number)
                || parent.charity_number.as_deref() == Some(hit.charity_number.as_str())
            {
                continue;
            }
            if !hit.name.eq_ignore_ascii_case(trustee) {
                continue;
            }

            visited.charities.insert(hit.charity_number.clone());

            if let Some(existing) = self
                .store
                .find_by_charity_number(parent.batch_id, &hit.charity_number)
                .await?
            {
                if !visited.entities.insert(existing.id) {
                    return Ok(None);
                }
                return Ok(Some(existing));
            }

            let Some(details) = self
                .registry
                .get_full_charity_details(&hit.charity_number)
                .await?
            else {
                return Ok(None);
            };

            let mut entity = Entity::new_pending(parent.batch_id, hit.name.clone(), None, None);
            apply_match(&mut entity, &details, 1.0, METHOD_RELATED_DISCOVERY);
            entity.parent_entity_id = Some(parent.id);
            entity.ownership_level = level as i32;

            self.store.insert_entity(&entity).await?;
            visited.entities.insert(entity.id);
            return Ok(Some(entity));
        }

        Ok(None)
    }

    async fn link(
        &self,
        owner: &Entity,
        owned: &Entity,
        ownership_type: &str,
        description: String,
    ) -> Result<()> {
        self.store
            .upsert_ownership(&NewOwnership {
                owner_id: owner.id,
                owned_id: owned.id,
                ownership_type: ownership_type.to_string(),
                ownership_percentage: None,
                relationship_description: Some(description),
                source: SOURCE_CHARITY_COMMISSION.to_string(),
                verified: true,
            })
            .await
    }

    /// Downward trees for every resolved level-0 entity of a batch.
    ///
    /// Per-entity failures are logged and skipped.
    pub async fn build_trees_for_batch(
        &self,
        batch_id: Uuid,
        max_depth: u32,
    ) -> Result<BatchTreeSummary> {
        let mut summary = BatchTreeSummary {
            batch_id,
            ..BatchTreeSummary::default()
        };

        for entity in self.store.resolved_root_entities(batch_id).await? {
            match self
                .build_tree_for_entity(entity.id, max_depth, Direction::Down)
                .await
            {
                Ok(tree) => {
                    summary.trees_built += 1;
                    summary.total_related_entities += tree.total_entities - 1;
                }
                Err(e) => {
                    error!(entity_id = %entity.id, error = %e, "Error building tree");
                }
            }
        }

        Ok(summary)
    }

    /// Ancestors of `entity_id` through `parent_entity_id`, root first
    pub async fn get_ownership_chain(&self, entity_id: Uuid) -> Result<Vec<Entity>> {
        let entity = self
            .store
            .get_entity(entity_id)
            .await?
            .ok_or_else(|| anyhow!("Entity {} not found", entity_id))?;

        let mut seen = HashSet::from([entity.id]);
        let mut chain = Vec::new();
        let mut next = entity.parent_entity_id;

        while let Some(parent_id) = next {
            if !seen.insert(parent_id) {
                warn!(entity_id = %entity_id, parent_id = %parent_id, "Cycle in parent chain");
                break;
            }
            let Some(parent) = self.store.get_entity(parent_id).await? else {
                break;
            };
            next = parent.parent_entity_id;
            chain.push(parent);
        }

        chain.reverse();
        Ok(chain)
    }
}
