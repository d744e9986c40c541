//! The identifier registry and node arena.

use std::collections::{HashMap, HashSet};

use tablemesh_core::error::SyncError;
use tablemesh_core::event::{Catalog, CatalogEntry, ObjectUpdate};
use tablemesh_core::identifier::Identifier;
use tracing::{debug, warn};

use crate::kind::NodeKind;
use crate::node::{Lifecycle, Node, NodeTree};
use crate::schema::ApplyReport;

/// A change the store recorded for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectChange {
    /// The node's fields or position changed, or it was registered.
    Updated(Identifier),
    /// The node was destroyed.
    Deleted(Identifier),
}

/// Why a remote update was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The identifier belongs to a destroyed node.
    Destroyed,
    /// No kind is known under the update's alias name.
    UnknownAlias(String),
    /// The local node has a different alias name.
    KindMismatch {
        /// Alias of the local replica.
        local: &'static str,
        /// Alias carried by the update.
        remote: String,
    },
}

/// Result of applying a remote update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The node did not exist and was instantiated from the update.
    Created(ApplyReport),
    /// An existing replica was overwritten.
    Updated(ApplyReport),
    /// Nothing changed.
    Ignored(IgnoreReason),
}

/// Owns every live node of one peer and resolves identifiers to them.
///
/// Lookups never fail loudly: unknown or destroyed identifiers yield `None`.
/// Local mutations are recorded as [`ObjectChange`]s, to be drained with
/// [`take_changes`](Self::take_changes) and broadcast; remote applications
/// are not recorded, so they never echo back into the mesh.
#[derive(Debug)]
pub struct ObjectStore<K> {
    nodes: HashMap<Identifier, Node<K>>,
    order: Vec<Identifier>,
    tombstones: HashSet<Identifier>,
    waiting: HashMap<Identifier, Vec<Identifier>>,
    changes: Vec<ObjectChange>,
}

impl<K: NodeKind> Default for ObjectStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: NodeKind> ObjectStore<K> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            tombstones: HashSet::new(),
            waiting: HashMap::new(),
            changes: Vec::new(),
        }
    }

    // --- registry ---

    /// The live node registered under `identifier`.
    #[must_use]
    pub fn get(&self, identifier: &Identifier) -> Option<&Node<K>> {
        self.nodes.get(identifier)
    }

    /// Mutable access to a live node. Call [`update`](Self::update) after
    /// changing its fields.
    pub fn get_mut(&mut self, identifier: &Identifier) -> Option<&mut Node<K>> {
        self.nodes.get_mut(identifier)
    }

    /// True if a live node is registered under `identifier`.
    #[must_use]
    pub fn is_live(&self, identifier: &Identifier) -> bool {
        self.nodes.contains_key(identifier)
    }

    /// Lifecycle of the node behind `identifier`, as far as this store
    /// knows. Identifiers it has never seen are `Unregistered`.
    #[must_use]
    pub fn lifecycle(&self, identifier: &Identifier) -> Lifecycle {
        if self.nodes.contains_key(identifier) {
            Lifecycle::Live
        } else if self.tombstones.contains(identifier) {
            Lifecycle::Destroyed
        } else {
            Lifecycle::Unregistered
        }
    }

    /// Every live node with the given alias name, in registration order.
    #[must_use]
    pub fn get_objects(&self, alias_name: &str) -> Vec<&Node<K>> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.alias_name() == alias_name)
            .collect()
    }

    /// Every live identifier, in registration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.order.iter()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no node is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registers a single unattached node as a root.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::DuplicateIdentifier` if the identifier is live
    /// and `SyncError::ObjectDestroyed` if it was destroyed before.
    pub fn register(&mut self, node: Node<K>) -> Result<Identifier, SyncError> {
        self.insert_tree(NodeTree::new(node), None)
    }

    /// Registers every node of `tree` and attaches its root under `parent`
    /// (or leaves it a root). All-or-nothing: on error nothing is inserted.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` if `parent` is not live, and the
    /// errors of [`register`](Self::register) for any node in the tree.
    pub fn insert_tree(
        &mut self,
        tree: NodeTree<K>,
        parent: Option<&Identifier>,
    ) -> Result<Identifier, SyncError> {
        if let Some(parent) = parent {
            self.require_live(parent)?;
        }
        let mut seen = HashSet::new();
        let mut conflict = None;
        tree.walk(&mut |node| {
            if conflict.is_some() {
                return;
            }
            let id = &node.identifier;
            if self.tombstones.contains(id) {
                conflict = Some(SyncError::ObjectDestroyed(id.clone()));
            } else if self.nodes.contains_key(id) || !seen.insert(id.clone()) {
                conflict = Some(SyncError::DuplicateIdentifier(id.clone()));
            }
        });
        if let Some(error) = conflict {
            return Err(error);
        }

        let root = tree.identifier().clone();
        self.insert_subtree(tree, None);
        if let Some(parent) = parent {
            self.link(parent, &root, None)?;
        }
        Ok(root)
    }

    fn insert_subtree(&mut self, tree: NodeTree<K>, parent: Option<&Identifier>) {
        let NodeTree { mut node, children } = tree;
        let id = node.identifier.clone();
        node.parent = parent.cloned();
        node.children = children.iter().map(|c| c.identifier().clone()).collect();
        node.lifecycle = Lifecycle::Live;
        node.kind.refresh();
        debug!(identifier = %id, alias = node.alias_name(), "registered object");
        self.nodes.insert(id.clone(), node);
        self.order.push(id.clone());
        self.changes.push(ObjectChange::Updated(id.clone()));
        for child in children {
            self.insert_subtree(child, Some(&id));
        }
    }

    /// Removes a single node from the registry and tombstones its
    /// identifier. The node is detached from its parent; its children are
    /// left behind as roots. Use [`destroy`](Self::destroy) to remove a
    /// whole subtree.
    pub fn unregister(&mut self, identifier: &Identifier) -> Option<Node<K>> {
        let mut node = self.nodes.remove(identifier)?;
        self.order.retain(|id| id != identifier);
        self.tombstones.insert(identifier.clone());

        if let Some(parent) = &node.parent {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.children.retain(|id| id != identifier);
            }
        }
        for child in &node.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
        if let Some((pending, _)) = &node.pending_parent {
            if let Some(list) = self.waiting.get_mut(pending) {
                list.retain(|id| id != identifier);
            }
        }
        if let Some(orphans) = self.waiting.remove(identifier) {
            for orphan in orphans {
                if let Some(orphan) = self.nodes.get_mut(&orphan) {
                    orphan.pending_parent = None;
                }
            }
        }

        node.parent = None;
        node.children.clear();
        node.lifecycle = Lifecycle::Destroyed;
        debug!(identifier = %identifier, "unregistered object");
        Some(node)
    }

    // --- tree structure ---

    /// Moves `child` to the end of `parent`'s children, detaching it from
    /// its previous parent.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` if either node is not live and
    /// `SyncError::HierarchyCycle` if `parent` is `child` or lies below it.
    pub fn append_child(
        &mut self,
        parent: &Identifier,
        child: &Identifier,
    ) -> Result<(), SyncError> {
        self.link(parent, child, None)?;
        self.changes.push(ObjectChange::Updated(child.clone()));
        Ok(())
    }

    /// Moves `child` in front of `reference` among `parent`'s children.
    /// If `reference` is not a child of `parent`, appends instead.
    ///
    /// # Errors
    ///
    /// Same as [`append_child`](Self::append_child).
    pub fn insert_before(
        &mut self,
        parent: &Identifier,
        child: &Identifier,
        reference: &Identifier,
    ) -> Result<(), SyncError> {
        if child == reference {
            self.require_live(parent)?;
            self.require_live(child)?;
            return Ok(());
        }
        let position = self
            .get(parent)
            .and_then(|p| p.children.iter().position(|id| id == reference));
        let position = match (position, self.position_in_parent(child, parent)) {
            (Some(reference_at), Some(child_at)) if child_at < reference_at => {
                Some(reference_at - 1)
            }
            (position, _) => position,
        };
        self.link(parent, child, position)?;
        self.changes.push(ObjectChange::Updated(child.clone()));
        Ok(())
    }

    /// Detaches `child` from `parent`, leaving it a live root.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` if `child` is not a child of
    /// `parent`.
    pub fn remove_child(&mut self, parent: &Identifier, child: &Identifier) -> Result<(), SyncError> {
        if self.get(child).and_then(Node::parent) != Some(parent) {
            return Err(SyncError::ObjectNotFound(child.clone()));
        }
        self.detach(child);
        self.changes.push(ObjectChange::Updated(child.clone()));
        Ok(())
    }

    /// True iff `node` is reachable from `ancestor` through children links.
    /// A node does not contain itself.
    #[must_use]
    pub fn contains(&self, ancestor: &Identifier, node: &Identifier) -> bool {
        let mut current = self.get(node).and_then(Node::parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(Node::parent);
        }
        false
    }

    /// The parent node of `identifier`.
    #[must_use]
    pub fn parent_of(&self, identifier: &Identifier) -> Option<&Node<K>> {
        self.get(self.get(identifier)?.parent()?)
    }

    /// Child nodes of `identifier`, in order.
    #[must_use]
    pub fn children_of(&self, identifier: &Identifier) -> Vec<&Node<K>> {
        self.get(identifier)
            .map(|node| node.children.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Identifiers of every node below `identifier`, in pre-order.
    #[must_use]
    pub fn descendants(&self, identifier: &Identifier) -> Vec<Identifier> {
        let mut out = Vec::new();
        let mut stack: Vec<&Identifier> = match self.get(identifier) {
            Some(node) => node.children.iter().rev().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                out.push(id.clone());
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    fn position_in_parent(&self, child: &Identifier, parent: &Identifier) -> Option<usize> {
        let node = self.get(child)?;
        if node.parent.as_ref() != Some(parent) {
            return None;
        }
        self.get(parent)?.children.iter().position(|id| id == child)
    }

    fn require_live(&self, identifier: &Identifier) -> Result<(), SyncError> {
        match self.lifecycle(identifier) {
            Lifecycle::Live => Ok(()),
            Lifecycle::Destroyed => Err(SyncError::ObjectDestroyed(identifier.clone())),
            Lifecycle::Unregistered => Err(SyncError::ObjectNotFound(identifier.clone())),
        }
    }

    /// Attaches `child` under `parent` at `position` (clamped; `None`
    /// appends). Does not record a change.
    fn link(
        &mut self,
        parent: &Identifier,
        child: &Identifier,
        position: Option<usize>,
    ) -> Result<(), SyncError> {
        self.require_live(parent)?;
        self.require_live(child)?;
        if parent == child || self.contains(child, parent) {
            return Err(SyncError::HierarchyCycle {
                parent: parent.clone(),
                child: child.clone(),
            });
        }

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent.clone());
            if let Some((pending, _)) = node.pending_parent.take() {
                if let Some(list) = self.waiting.get_mut(&pending) {
                    list.retain(|id| id != child);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            let at = position.map_or(node.children.len(), |p| p.min(node.children.len()));
            node.children.insert(at, child.clone());
        }
        Ok(())
    }

    fn detach(&mut self, child: &Identifier) {
        let Some(parent) = self.nodes.get_mut(child).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|id| id != child);
        }
    }

    // --- lifecycle ---

    /// Marks the node dirty, recomputes its derived state, and records an
    /// update notice. Safe to call when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the node
    /// is not live.
    pub fn update(&mut self, identifier: &Identifier) -> Result<(), SyncError> {
        self.require_live(identifier)?;
        if let Some(node) = self.nodes.get_mut(identifier) {
            node.kind.refresh();
            node.version += 1;
            node.dirty = true;
        }
        self.changes.push(ObjectChange::Updated(identifier.clone()));
        Ok(())
    }

    /// Destroys the node and its whole subtree, unregistering every
    /// descendant. Returns the destroyed identifiers, root first.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the node
    /// is not live.
    pub fn destroy(&mut self, identifier: &Identifier) -> Result<Vec<Identifier>, SyncError> {
        self.require_live(identifier)?;
        let removed = self.remove_subtree(identifier);
        self.changes
            .extend(removed.iter().cloned().map(ObjectChange::Deleted));
        Ok(removed)
    }

    fn remove_subtree(&mut self, identifier: &Identifier) -> Vec<Identifier> {
        let mut removed = vec![identifier.clone()];
        removed.extend(self.descendants(identifier));
        self.detach(identifier);
        for id in removed.iter().rev() {
            self.unregister(id);
        }
        removed
    }

    /// Deep-copies the subtree under `identifier` with fresh identifiers.
    /// The copy is not registered; insert it with
    /// [`insert_tree`](Self::insert_tree).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the node
    /// is not live.
    pub fn clone_subtree(&self, identifier: &Identifier) -> Result<NodeTree<K>, SyncError> {
        self.require_live(identifier)?;
        Ok(self.clone_recursive(identifier))
    }

    fn clone_recursive(&self, identifier: &Identifier) -> NodeTree<K> {
        let node = &self.nodes[identifier];
        let mut tree = NodeTree::new(Node::new(node.kind.clone()));
        for child in &node.children {
            if self.nodes.contains_key(child) {
                tree.push_child(self.clone_recursive(child));
            }
        }
        tree
    }

    /// Drains the recorded changes, coalescing repeated updates of the
    /// same node and dropping updates of nodes that were destroyed.
    pub fn take_changes(&mut self) -> Vec<ObjectChange> {
        let raw = std::mem::take(&mut self.changes);
        let deleted: HashSet<Identifier> = raw
            .iter()
            .filter_map(|change| match change {
                ObjectChange::Deleted(id) => Some(id.clone()),
                ObjectChange::Updated(_) => None,
            })
            .collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for change in raw {
            match change {
                ObjectChange::Updated(id) => {
                    if deleted.contains(&id) || !seen.insert(id.clone()) {
                        continue;
                    }
                    if let Some(node) = self.nodes.get_mut(&id) {
                        node.dirty = false;
                    }
                    out.push(ObjectChange::Updated(id));
                }
                ObjectChange::Deleted(id) => out.push(ObjectChange::Deleted(id)),
            }
        }
        out
    }

    /// True if changes are waiting to be drained.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    // --- replication ---

    /// Builds the update notice describing the node's current state.
    #[must_use]
    pub fn snapshot(&self, identifier: &Identifier) -> Option<ObjectUpdate> {
        let node = self.get(identifier)?;
        let (parent_identifier, index) = match (&node.parent, &node.pending_parent) {
            (Some(parent), _) => (
                Some(parent.clone()),
                self.position_in_parent(identifier, parent).unwrap_or(0),
            ),
            (None, Some((pending, index))) => (Some(pending.clone()), *index),
            (None, None) => (None, 0),
        };
        Some(ObjectUpdate {
            identifier: identifier.clone(),
            alias_name: node.alias_name().to_owned(),
            parent_identifier,
            index,
            version: node.version,
            sync_data: node.kind.sync_fields(),
        })
    }

    /// Identifier and version of every live node, in registration order.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        Catalog {
            entries: self
                .order
                .iter()
                .filter_map(|id| self.nodes.get(id))
                .map(|node| CatalogEntry {
                    identifier: node.identifier.clone(),
                    version: node.version,
                })
                .collect(),
        }
    }

    /// True if a catalogue entry announces state this replica lacks.
    #[must_use]
    pub fn is_behind(&self, entry: &CatalogEntry) -> bool {
        if self.tombstones.contains(&entry.identifier) {
            return false;
        }
        self.get(&entry.identifier)
            .is_none_or(|node| node.version < entry.version)
    }

    /// Applies a received update: overwrites the fields of the local
    /// replica (instantiating it if unknown) and moves it to the announced
    /// parent. Undecodable fields are skipped, never the whole update.
    /// Nothing is recorded for broadcast.
    pub fn apply_update(&mut self, update: &ObjectUpdate) -> ApplyOutcome {
        let id = &update.identifier;
        if self.tombstones.contains(id) {
            warn!(identifier = %id, "ignored update for destroyed object");
            return ApplyOutcome::Ignored(IgnoreReason::Destroyed);
        }
        let parent_destroyed = update
            .parent_identifier
            .as_ref()
            .is_some_and(|parent| self.tombstones.contains(parent));
        if parent_destroyed && !self.nodes.contains_key(id) {
            warn!(identifier = %id, "ignored update under destroyed parent");
            self.tombstones.insert(id.clone());
            return ApplyOutcome::Ignored(IgnoreReason::Destroyed);
        }

        let created = if let Some(node) = self.nodes.get_mut(id) {
            if node.alias_name() != update.alias_name {
                warn!(
                    identifier = %id,
                    local = node.alias_name(),
                    remote = %update.alias_name,
                    "ignored update with mismatched alias"
                );
                return ApplyOutcome::Ignored(IgnoreReason::KindMismatch {
                    local: node.alias_name(),
                    remote: update.alias_name.clone(),
                });
            }
            false
        } else {
            let Some(kind) = K::instantiate(&update.alias_name) else {
                warn!(identifier = %id, alias = %update.alias_name, "ignored update for unknown alias");
                return ApplyOutcome::Ignored(IgnoreReason::UnknownAlias(update.alias_name.clone()));
            };
            let mut node = Node::with_identifier(id.clone(), kind);
            node.lifecycle = Lifecycle::Live;
            self.nodes.insert(id.clone(), node);
            self.order.push(id.clone());
            debug!(identifier = %id, alias = %update.alias_name, "instantiated remote object");
            true
        };

        let report = match self.nodes.get_mut(id) {
            Some(node) => {
                let report = node.kind.apply_sync_fields(&update.sync_data);
                node.kind.refresh();
                node.version = update.version;
                node.dirty = false;
                report
            }
            None => ApplyReport::default(),
        };

        self.reconcile_parent(id, update.parent_identifier.as_ref(), update.index);
        if created {
            self.adopt_waiting(id);
            ApplyOutcome::Created(report)
        } else {
            ApplyOutcome::Updated(report)
        }
    }

    fn reconcile_parent(&mut self, id: &Identifier, parent: Option<&Identifier>, index: usize) {
        match parent {
            None => {
                self.detach(id);
                self.clear_pending(id);
            }
            Some(parent) if self.nodes.contains_key(parent) => {
                if self.position_in_parent(id, parent) == Some(index) {
                    return;
                }
                if let Err(error) = self.link(parent, id, Some(index)) {
                    warn!(identifier = %id, parent = %parent, %error, "refused remote reparent");
                }
            }
            Some(parent) => {
                if self.tombstones.contains(parent) {
                    warn!(identifier = %id, parent = %parent, "remote parent already destroyed");
                    return;
                }
                self.detach(id);
                self.clear_pending(id);
                if let Some(node) = self.nodes.get_mut(id) {
                    node.pending_parent = Some((parent.clone(), index));
                }
                self.waiting.entry(parent.clone()).or_default().push(id.clone());
                debug!(identifier = %id, parent = %parent, "waiting for parent");
            }
        }
    }

    fn clear_pending(&mut self, id: &Identifier) {
        let Some((pending, _)) = self.nodes.get_mut(id).and_then(|n| n.pending_parent.take())
        else {
            return;
        };
        if let Some(list) = self.waiting.get_mut(&pending) {
            list.retain(|waiting| waiting != id);
        }
    }

    fn adopt_waiting(&mut self, parent: &Identifier) {
        let Some(orphans) = self.waiting.remove(parent) else {
            return;
        };
        let mut placements: Vec<(usize, Identifier)> = orphans
            .into_iter()
            .filter_map(|id| {
                let node = self.nodes.get(&id)?;
                match &node.pending_parent {
                    Some((pending, index)) if pending == parent => Some((*index, id)),
                    _ => None,
                }
            })
            .collect();
        placements.sort_by_key(|(index, _)| *index);
        for (index, id) in placements {
            if let Err(error) = self.link(parent, &id, Some(index)) {
                warn!(identifier = %id, parent = %parent, %error, "could not adopt orphan");
            }
        }
    }

    /// Applies a received deletion: destroys the subtree if present and
    /// tombstones the identifier either way, so a late update cannot bring
    /// it back. Orphans waiting for an unknown identifier are destroyed
    /// with it. Nothing is recorded for broadcast.
    pub fn apply_delete(&mut self, identifier: &Identifier) -> Vec<Identifier> {
        if self.nodes.contains_key(identifier) {
            return self.remove_subtree(identifier);
        }
        self.tombstones.insert(identifier.clone());
        let mut removed = Vec::new();
        for orphan in self.waiting.remove(identifier).unwrap_or_default() {
            if self.nodes.contains_key(&orphan) {
                removed.extend(self.remove_subtree(&orphan));
            }
        }
        debug!(identifier = %identifier, orphans = removed.len(), "delete for unknown object");
        removed
    }
}
