//! Synchronizable nodes and detached node trees.

use tablemesh_core::identifier::Identifier;

use crate::kind::NodeKind;

/// Lifecycle state of a node.
///
/// `Unregistered -> Live -> Destroyed`; `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed but not yet inserted into a store.
    Unregistered,
    /// Registered and reachable by identifier.
    Live,
    /// Removed from the store; the identifier can never be live again.
    Destroyed,
}

/// The unit of replication.
///
/// Parent and children are identifiers resolved through the owning store;
/// a node never holds another node directly.
#[derive(Debug, Clone)]
pub struct Node<K> {
    pub(crate) identifier: Identifier,
    pub(crate) kind: K,
    pub(crate) parent: Option<Identifier>,
    pub(crate) children: Vec<Identifier>,
    /// Parent announced by a remote update that has not arrived yet, with
    /// the requested position.
    pub(crate) pending_parent: Option<(Identifier, usize)>,
    pub(crate) version: u64,
    pub(crate) dirty: bool,
    pub(crate) lifecycle: Lifecycle,
}

impl<K: NodeKind> Node<K> {
    /// Creates an unregistered node with a fresh identifier.
    #[must_use]
    pub fn new(kind: K) -> Self {
        Self::with_identifier(Identifier::generate(), kind)
    }

    /// Creates an unregistered node with a caller-chosen identifier.
    #[must_use]
    pub fn with_identifier(identifier: Identifier, kind: K) -> Self {
        Self {
            identifier,
            kind,
            parent: None,
            children: Vec::new(),
            pending_parent: None,
            version: 0,
            dirty: false,
            lifecycle: Lifecycle::Unregistered,
        }
    }

    /// The node's identifier.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The node kind's alias name.
    #[must_use]
    pub fn alias_name(&self) -> &'static str {
        self.kind.alias_name()
    }

    /// The node's kind and synchronized fields.
    #[must_use]
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Mutable access to the synchronized fields. Call
    /// [`ObjectStore::update`](crate::store::ObjectStore::update) afterwards
    /// so the change is broadcast.
    pub fn kind_mut(&mut self) -> &mut K {
        &mut self.kind
    }

    /// The parent's identifier, if the node is attached.
    #[must_use]
    pub fn parent(&self) -> Option<&Identifier> {
        self.parent.as_ref()
    }

    /// Children identifiers, in order.
    #[must_use]
    pub fn children(&self) -> &[Identifier] {
        &self.children
    }

    /// Number of updates applied to this replica.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True between a local `update()` and the broadcast of that update.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The node's lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

/// A node together with its not-yet-registered descendants.
///
/// Produced by factories, by `clone_subtree` and by the XML parser, and
/// turned into live nodes by
/// [`ObjectStore::insert_tree`](crate::store::ObjectStore::insert_tree).
#[derive(Debug, Clone)]
pub struct NodeTree<K> {
    /// The subtree root.
    pub node: Node<K>,
    /// Subtrees of the root's children, in order.
    pub children: Vec<NodeTree<K>>,
}

impl<K: NodeKind> NodeTree<K> {
    /// Wraps a single node.
    #[must_use]
    pub fn new(node: Node<K>) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Builder-style append.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<NodeTree<K>>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Appends a child subtree.
    pub fn push_child(&mut self, child: impl Into<NodeTree<K>>) {
        self.children.push(child.into());
    }

    /// The root's identifier.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.node.identifier
    }

    /// Finds a direct child subtree by data element name.
    pub fn child_element_mut(&mut self, name: &str) -> Option<&mut NodeTree<K>> {
        self.children.iter_mut().find(|child| {
            child
                .node
                .kind
                .as_data_element()
                .is_some_and(|element| element.name == name)
        })
    }

    /// Visits every node in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node<K>)) {
        visit(&self.node);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Total number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(NodeTree::len).sum::<usize>()
    }

    /// Always false; a tree has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl<K: NodeKind> From<Node<K>> for NodeTree<K> {
    fn from(node: Node<K>) -> Self {
        Self::new(node)
    }
}
