//! Ownership tree shapes returned by the API and stored in `enriched_data`

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{text_enum, Entity, EntityType};

text_enum! {
    /// Which side of the root to walk
    Direction, "direction" {
        Up => "up",
        Down => "down",
        Both => "both",
    }
}

impl Direction {
    pub fn walks_down(&self) -> bool {
        matches!(self, Direction::Down | Direction::Both)
    }

    pub fn walks_up(&self) -> bool {
        matches!(self, Direction::Up | Direction::Both)
    }
}

/// Summary of one entity inside a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: Uuid,
    pub name: String,
    pub original_name: String,
    pub entity_type: EntityType,
    pub charity_number: Option<String>,
    pub company_number: Option<String>,
    pub status: Option<String>,
    pub level: i32,
    pub income: Option<f64>,
    pub expenditure: Option<f64>,
}

impl From<&Entity> for EntityNode {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            name: entity.display_name().to_string(),
            original_name: entity.original_name.clone(),
            entity_type: entity.entity_type,
            charity_number: entity.charity_number.clone(),
            company_number: entity.company_number.clone(),
            status: entity.charity_status.clone(),
            level: entity.ownership_level,
            income: entity.latest_income,
            expenditure: entity.latest_expenditure,
        }
    }
}

/// A related entity plus its own subtree.
///
/// Downward nodes carry `children`, upward nodes carry `parents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub entity: EntityNode,
    pub relationship: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(entity: &Entity, relationship: impl Into<String>) -> Self {
        Self {
            entity: EntityNode::from(entity),
            relationship: relationship.into(),
            children: Vec::new(),
            parents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipTree {
    pub root: EntityNode,
    pub children: Vec<TreeNode>,
    pub parents: Vec<TreeNode>,
    pub total_entities: usize,
    pub max_depth_reached: u32,
}

/// Nodes in `nodes` and every subtree below them
pub fn count_nodes(nodes: &[TreeNode]) -> usize {
    nodes
        .iter()
        .map(|n| 1 + count_nodes(&n.children) + count_nodes(&n.parents))
        .sum()
}

/// Result of building trees for every resolved root of a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchTreeSummary {
    pub batch_id: Uuid,
    pub trees_built: usize,
    pub total_related_entities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str) -> TreeNode {
        let entity = Entity::new_pending(Uuid::new_v4(), name, None, None);
        TreeNode::new(&entity, "subsidiary")
    }

    #[test]
    fn test_count_nodes_recurses() {
        let mut a = node("A");
        let mut b = node("B");
        b.children.push(node("C"));
        a.children.push(b);
        a.parents.push(node("P"));
        assert_eq!(count_nodes(&[a, node("D")]), 5);
        assert_eq!(count_nodes(&[]), 0);
    }

    #[test]
    fn test_leaf_omits_empty_lists() {
        let value = serde_json::to_value(node("Leaf")).unwrap();
        assert_eq!(value["relationship"], json!("subsidiary"));
        assert_eq!(value["entity"]["name"], json!("Leaf"));
        assert_eq!(value["entity"]["entity_type"], json!("unknown"));
        assert!(value.get("children").is_none());
        assert!(value.get("parents").is_none());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("UP".parse::<Direction>().unwrap(), Direction::Up);
        assert!(Direction::Both.walks_up() && Direction::Both.walks_down());
        assert!(!Direction::Down.walks_up());
        assert!("sideways".parse::<Direction>().is_err());
    }
}
