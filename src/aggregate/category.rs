//! Category tree
//!
//! Categories live in an arena keyed by id. A category stores only its
//! parent's id; children are always computed from those parent links, so the
//! two directions of the relationship cannot drift apart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{CategoryId, DomainError};

use super::Aggregate;

/// A node of the category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    id: Option<CategoryId>,
    name: String,
    parent: Option<CategoryId>,
}

impl Category {
    /// Create a standalone (root) category
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent: None,
        }
    }

    /// Rebuild a category from stored state
    pub fn from_db_state(id: CategoryId, name: String, parent: Option<CategoryId>) -> Self {
        Self {
            id: Some(id),
            name,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_id(&self) -> Option<CategoryId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

impl Aggregate for Category {
    type Id = CategoryId;

    fn aggregate_type() -> &'static str {
        "Category"
    }

    fn id(&self) -> Option<CategoryId> {
        self.id
    }

    fn assign_id(&mut self, id: CategoryId) {
        self.id = Some(id);
    }
}

/// Arena of saved categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: BTreeMap<CategoryId, Category>,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from stored categories, validating every parent link.
    pub fn from_categories(
        categories: impl IntoIterator<Item = Category>,
    ) -> Result<Self, DomainError> {
        let mut tree = Self::new();
        let mut pending: Vec<(CategoryId, CategoryId)> = Vec::new();

        for mut category in categories {
            let id = category
                .id
                .ok_or_else(|| DomainError::validation("category", "has not been saved"))?;
            if let Some(parent) = category.parent.take() {
                pending.push((parent, id));
            }
            tree.nodes.insert(id, category);
        }

        for (parent, child) in pending {
            tree.attach(parent, child)?;
        }

        Ok(tree)
    }

    /// Insert or replace a saved category.
    ///
    /// A parent link carried by the category is validated like [`attach`].
    ///
    /// [`attach`]: CategoryTree::attach
    pub fn insert(&mut self, category: Category) -> Result<CategoryId, DomainError> {
        let id = category
            .id
            .ok_or_else(|| DomainError::validation("category", "has not been saved"))?;

        if let Some(parent) = category.parent {
            self.check_attachable(parent, id)?;
        }

        self.nodes.insert(id, category);
        Ok(id)
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.nodes.values()
    }

    /// Attach `child` under `parent`.
    ///
    /// Fails with [`DomainError::Cycle`] if `parent` is `child` or one of its
    /// descendants. Re-attaching to the current parent is a no-op.
    pub fn attach(&mut self, parent: CategoryId, child: CategoryId) -> Result<(), DomainError> {
        if !self.nodes.contains_key(&child) {
            return Err(DomainError::not_found("Category", child));
        }
        self.check_attachable(parent, child)?;

        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    /// Make `child` a root category again.
    pub fn detach(&mut self, child: CategoryId) -> Result<(), DomainError> {
        let node = self
            .nodes
            .get_mut(&child)
            .ok_or_else(|| DomainError::not_found("Category", child))?;
        node.parent = None;
        Ok(())
    }

    pub fn parent(&self, id: CategoryId) -> Option<&Category> {
        self.nodes
            .get(&id)
            .and_then(|node| node.parent)
            .and_then(|parent| self.nodes.get(&parent))
    }

    /// Direct children of `id`, in id order.
    pub fn children(&self, id: CategoryId) -> Vec<&Category> {
        self.nodes
            .values()
            .filter(|node| node.parent == Some(id))
            .collect()
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut ancestors = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|node| node.parent);

        // Bounded by the node count; parent links are acyclic by construction.
        while let Some(parent) = current {
            if ancestors.len() >= self.nodes.len() {
                break;
            }
            ancestors.push(parent);
            current = self.nodes.get(&parent).and_then(|node| node.parent);
        }
        ancestors
    }

    /// Check if `ancestor` lies on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: CategoryId, id: CategoryId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    pub fn roots(&self) -> Vec<&Category> {
        self.nodes.values().filter(|node| node.is_root()).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        self.nodes.values().find(|node| node.name == name)
    }

    pub fn find_all_by_name(&self, name: &str) -> Vec<&Category> {
        self.nodes.values().filter(|node| node.name == name).collect()
    }

    /// Direct children of every category called `name`.
    ///
    /// Empty when no category has that name.
    pub fn find_all_by_parent_name(&self, name: &str) -> Vec<&Category> {
        self.nodes
            .values()
            .filter(|node| {
                node.parent
                    .and_then(|parent| self.nodes.get(&parent))
                    .is_some_and(|parent| parent.name == name)
            })
            .collect()
    }

    /// Remove a category. Rejected while it still has children.
    pub fn remove(&mut self, id: CategoryId) -> Result<Category, DomainError> {
        if !self.nodes.contains_key(&id) {
            return Err(DomainError::not_found("Category", id));
        }
        if self.nodes.values().any(|node| node.parent == Some(id)) {
            return Err(DomainError::CategoryHasChildren(id));
        }
        self.nodes
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("Category", id))
    }

    fn check_attachable(&self, parent: CategoryId, child: CategoryId) -> Result<(), DomainError> {
        if !self.nodes.contains_key(&parent) {
            return Err(DomainError::not_found("Category", parent));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(DomainError::Cycle { parent, child });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(tree: &mut CategoryTree, id: i64, name: &str) -> CategoryId {
        let mut category = Category::new(name);
        category.assign_id(CategoryId::new(id));
        tree.insert(category).unwrap()
    }

    fn toy_tree() -> (CategoryTree, [CategoryId; 5]) {
        let mut tree = CategoryTree::new();
        let toy = saved(&mut tree, 1, "toy");
        let car = saved(&mut tree, 2, "car");
        let doll = saved(&mut tree, 3, "doll");
        let tayo = saved(&mut tree, 4, "tayo");
        let poly = saved(&mut tree, 5, "poly");

        tree.attach(toy, car).unwrap();
        tree.attach(toy, doll).unwrap();
        tree.attach(car, tayo).unwrap();
        tree.attach(car, poly).unwrap();

        (tree, [toy, car, doll, tayo, poly])
    }

    #[test]
    fn test_children_are_derived_from_parent_links() {
        let (tree, [toy, car, doll, tayo, poly]) = toy_tree();

        let children: Vec<_> = tree.children(toy).iter().filter_map(|c| c.id()).collect();
        assert_eq!(children, vec![car, doll]);

        let children: Vec<_> = tree.children(car).iter().filter_map(|c| c.id()).collect();
        assert_eq!(children, vec![tayo, poly]);

        assert!(tree.children(poly).is_empty());
        assert_eq!(tree.parent(tayo).map(|c| c.name()), Some("car"));
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut tree = CategoryTree::new();
        let a = saved(&mut tree, 1, "a");
        let b = saved(&mut tree, 2, "b");

        tree.attach(a, b).unwrap();

        let result = tree.attach(b, a);
        assert_eq!(result, Err(DomainError::Cycle { parent: b, child: a }));
    }

    #[test]
    fn test_attach_rejects_descendant_parent() {
        let (mut tree, [toy, _, _, tayo, _]) = toy_tree();

        assert!(matches!(tree.attach(tayo, toy), Err(DomainError::Cycle { .. })));
        assert!(tree.get(toy).unwrap().is_root());
    }

    #[test]
    fn test_attach_to_self_rejected() {
        let mut tree = CategoryTree::new();
        let a = saved(&mut tree, 1, "a");

        assert!(matches!(tree.attach(a, a), Err(DomainError::Cycle { .. })));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (mut tree, [toy, car, ..]) = toy_tree();

        tree.attach(toy, car).unwrap();
        assert_eq!(tree.children(toy).len(), 2);
        assert_eq!(tree.get(car).unwrap().parent_id(), Some(toy));
    }

    #[test]
    fn test_reattach_moves_child() {
        let (mut tree, [_, car, doll, tayo, _]) = toy_tree();

        tree.attach(doll, tayo).unwrap();

        assert_eq!(tree.children(car).len(), 1);
        assert_eq!(tree.children(doll).len(), 1);
        assert_eq!(tree.ancestors(tayo).len(), 2);
    }

    #[test]
    fn test_attach_unknown_category() {
        let (mut tree, [toy, ..]) = toy_tree();

        assert!(matches!(
            tree.attach(toy, CategoryId::new(99)),
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            tree.attach(CategoryId::new(99), toy),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_all_by_parent_name() {
        let (tree, _) = toy_tree();

        let names: Vec<_> = tree
            .find_all_by_parent_name("car")
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(names, vec!["tayo", "poly"]);

        assert!(tree.find_all_by_parent_name("missing").is_empty());
    }

    #[test]
    fn test_find_by_name() {
        let (tree, [_, car, ..]) = toy_tree();

        assert_eq!(tree.find_by_name("car").and_then(|c| c.id()), Some(car));
        assert!(tree.find_by_name("boat").is_none());
    }

    #[test]
    fn test_remove_rejects_parent_with_children() {
        let (mut tree, [toy, car, _, tayo, poly]) = toy_tree();

        assert_eq!(tree.remove(car), Err(DomainError::CategoryHasChildren(car)));

        tree.remove(tayo).unwrap();
        tree.remove(poly).unwrap();
        tree.remove(car).unwrap();

        assert_eq!(tree.children(toy).len(), 1);
    }

    #[test]
    fn test_detach_makes_root() {
        let (mut tree, [toy, car, ..]) = toy_tree();

        tree.detach(car).unwrap();

        assert!(tree.get(car).unwrap().is_root());
        assert_eq!(tree.children(toy).len(), 1);
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn test_from_categories_validates_links() {
        let categories = vec![
            Category::from_db_state(CategoryId::new(1), "a".into(), Some(CategoryId::new(2))),
            Category::from_db_state(CategoryId::new(2), "b".into(), Some(CategoryId::new(1))),
        ];

        assert!(matches!(
            CategoryTree::from_categories(categories),
            Err(DomainError::Cycle { .. })
        ));

        let categories = vec![
            Category::from_db_state(CategoryId::new(2), "child".into(), Some(CategoryId::new(1))),
            Category::from_db_state(CategoryId::new(1), "root".into(), None),
        ];
        let tree = CategoryTree::from_categories(categories).unwrap();
        assert_eq!(tree.children(CategoryId::new(1)).len(), 1);
    }

    #[test]
    fn test_insert_unsaved_rejected() {
        let mut tree = CategoryTree::new();
        assert!(matches!(
            tree.insert(Category::new("draft")),
            Err(DomainError::Validation { .. })
        ));
    }
}
