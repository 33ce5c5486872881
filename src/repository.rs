//! In-memory hierarchical content repository.
//!
//! The [`Repository`] is shared and concurrency-safe. Every consumer works
//! through its own [`Session`], which buffers transient changes in an overlay
//! and publishes them atomically on [`Session::save`]. Observation listeners
//! receive the change events of each commit after it has become visible.
//!
//! Child lists are merged on commit: a session only publishes the children it
//! added or removed, so concurrent sessions adding below the same parent keep
//! each other's nodes reachable.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::errors::{RepositoryError, SchemaError};
use crate::nodetypes::{Declarations, NodeTypeRegistry};
use crate::resource_util::{child_path, name, normalize, parent_path};

const ROOT_PATH: &str = "/";
const ROOT_TYPE: &str = "rep:root";
const MIXIN_PROPERTY: &str = "jcr:mixinTypes";

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
    Strings(Vec<String>),
    Long(i64),
    Boolean(bool),
}

impl PropertyValue {
    /// Returns the value if this is a single string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns all string values (one for single-valued strings).
    pub fn strings(&self) -> Vec<&str> {
        match self {
            PropertyValue::String(s) => vec![s.as_str()],
            PropertyValue::Strings(values) => values.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(v) => Some(*v),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(v) => Some(*v),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::Strings(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Long(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

/// Stored state of a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeState {
    primary_type: String,
    mixins: Vec<String>,
    properties: BTreeMap<String, PropertyValue>,
    /// Child names in insertion order
    children: Vec<String>,
}

impl NodeState {
    fn new(primary_type: &str) -> Self {
        Self {
            primary_type: primary_type.to_string(),
            mixins: Vec::new(),
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }
}

/// A handle on a node, identified by its absolute path.
///
/// Handles are cheap to clone and carry no state; all reads and writes go
/// through a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    path: String,
}

impl Node {
    fn at(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        name(&self.path)
    }
}

/// A change published by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    NodeAdded { path: String },
    NodeRemoved { path: String },
    PropertyChanged { path: String, name: String },
}

impl ChangeEvent {
    pub fn path(&self) -> &str {
        match self {
            ChangeEvent::NodeAdded { path }
            | ChangeEvent::NodeRemoved { path }
            | ChangeEvent::PropertyChanged { path, .. } => path,
        }
    }
}

/// Receives the change events of every commit.
///
/// Listeners are called synchronously on the committing thread, after the
/// commit is visible to all sessions and with no node lock held. Commits are
/// serialized, so every listener sees batches in commit order. A listener
/// must not save a session itself.
pub trait ObservationListener: Send + Sync {
    fn on_change(&self, events: &[ChangeEvent]);
}

/// Identifies a registered listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The shared content repository.
pub struct Repository {
    nodes: RwLock<BTreeMap<String, NodeState>>,
    node_types: RwLock<NodeTypeRegistry>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ObservationListener>)>>,
    /// Held from apply through dispatch
    commit_lock: Mutex<()>,
    next_listener: AtomicU64,
    revision: AtomicU64,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("nodes", &self.nodes.read().len())
            .field("revision", &self.revision())
            .finish()
    }
}

impl Repository {
    /// Creates an empty repository holding only the root node.
    pub fn new() -> Arc<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_PATH.to_string(), NodeState::new(ROOT_TYPE));
        Arc::new(Self {
            nodes: RwLock::new(nodes),
            node_types: RwLock::new(NodeTypeRegistry::with_builtins()),
            listeners: RwLock::new(Vec::new()),
            commit_lock: Mutex::new(()),
            next_listener: AtomicU64::new(1),
            revision: AtomicU64::new(0),
        })
    }

    /// Opens a new session on this repository.
    pub fn login(self: &Arc<Self>) -> Session {
        Session {
            repository: Arc::clone(self),
            overlay: BTreeMap::new(),
            base_children: BTreeMap::new(),
            pending_events: Vec::new(),
            commits: 0,
            live: true,
        }
    }

    /// Number of commits applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Number of persisted nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn register_node_types(
        &self,
        declarations: Declarations,
    ) -> Result<Vec<String>, SchemaError> {
        self.node_types.write().register(declarations)
    }

    /// Returns true if `type_name` is `candidate` or one of its subtypes.
    pub fn is_node_type(&self, type_name: &str, candidate: &str) -> bool {
        self.node_types.read().is_node_type(type_name, candidate)
    }

    pub fn add_listener(&self, listener: Arc<dyn ObservationListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn persisted(&self, path: &str) -> Option<NodeState> {
        self.nodes.read().get(path).cloned()
    }

    fn persisted_descendants(&self, path: &str) -> Vec<String> {
        let prefix = child_path(path, "");
        self.nodes
            .read()
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Publishes a session overlay. Child lists of nodes the session copied
    /// from persisted state are merged with the current persisted lists;
    /// fails without changing anything if such a node was removed meanwhile.
    fn apply(
        &self,
        overlay: &mut BTreeMap<String, Option<NodeState>>,
        base_children: &BTreeMap<String, Vec<String>>,
    ) -> Result<(), RepositoryError> {
        let mut nodes = self.nodes.write();
        if let Some(path) = overlay.iter().find_map(|(path, state)| {
            let stale = state.is_some()
                && base_children.contains_key(path)
                && !nodes.contains_key(path);
            stale.then(|| path.clone())
        }) {
            return Err(RepositoryError::Conflict { path });
        }

        for (path, state) in std::mem::take(overlay) {
            match state {
                Some(mut state) => {
                    if let (Some(base), Some(current)) = (base_children.get(&path), nodes.get(&path))
                    {
                        state.children = merge_children(base, &state.children, &current.children);
                    }
                    nodes.insert(path, state);
                }
                None => {
                    nodes.remove(&path);
                }
            }
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn dispatch(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Arc<dyn ObservationListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener.on_change(events);
        }
    }
}

/// A transactional view on the repository.
///
/// Changes are kept in a transient overlay until [`Session::save`]. A session
/// is owned by one thread at a time; share the [`Repository`] instead.
pub struct Session {
    repository: Arc<Repository>,
    /// Transiently modified nodes; `None` marks a removal
    overlay: BTreeMap<String, Option<NodeState>>,
    /// Persisted child lists at the time a node was copied into the overlay
    base_children: BTreeMap<String, Vec<String>>,
    pending_events: Vec<ChangeEvent>,
    commits: usize,
    live: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pending", &self.overlay.len())
            .field("commits", &self.commits)
            .field("live", &self.live)
            .finish()
    }
}

impl Session {
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Number of successful `save` calls on this session.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.overlay.is_empty()
    }

    pub fn root_node(&self) -> Result<Node, RepositoryError> {
        self.ensure_live()?;
        Ok(Node::at(ROOT_PATH))
    }

    /// Returns the node at an absolute path.
    pub fn get_node(&self, path: &str) -> Result<Node, RepositoryError> {
        let path = self.absolute(path)?;
        if self.state(&path)?.is_none() {
            return Err(RepositoryError::PathNotFound { path });
        }
        Ok(Node::at(path))
    }

    pub fn node_exists(&self, path: &str) -> Result<bool, RepositoryError> {
        let path = self.absolute(path)?;
        Ok(self.state(&path)?.is_some())
    }

    /// Adds a child node with the given primary type.
    pub fn add_node(
        &mut self,
        parent: &Node,
        rel_name: &str,
        primary_type: &str,
    ) -> Result<Node, RepositoryError> {
        self.ensure_live()?;
        validate_name(rel_name)?;
        {
            let types = self.repository.node_types.read();
            let definition =
                types
                    .get(primary_type)
                    .ok_or_else(|| RepositoryError::NoSuchNodeType {
                        name: primary_type.to_string(),
                    })?;
            if definition.mixin {
                return Err(RepositoryError::MixinAsPrimary {
                    name: primary_type.to_string(),
                });
            }
        }

        let path = child_path(parent.path(), rel_name);
        if self.state(&path)?.is_some() {
            return Err(RepositoryError::ItemExists { path });
        }

        let parent_state = self.state_mut(parent.path())?;
        parent_state.children.push(rel_name.to_string());
        // a node removed and added again in this session replaces the old one
        self.base_children.remove(&path);
        self.overlay
            .insert(path.clone(), Some(NodeState::new(primary_type)));
        self.pending_events
            .push(ChangeEvent::NodeAdded { path: path.clone() });
        Ok(Node::at(path))
    }

    /// Adds a mixin type to a node. Adding a mixin twice is a no-op.
    pub fn add_mixin(&mut self, node: &Node, mixin: &str) -> Result<(), RepositoryError> {
        self.ensure_live()?;
        match self.repository.node_types.read().get(mixin) {
            None => {
                return Err(RepositoryError::NoSuchNodeType {
                    name: mixin.to_string(),
                });
            }
            Some(definition) if !definition.mixin => {
                return Err(RepositoryError::NotAMixin {
                    name: mixin.to_string(),
                });
            }
            Some(_) => {}
        }

        let state = self.state_mut(node.path())?;
        if state.mixins.iter().any(|m| m == mixin) {
            return Ok(());
        }
        state.mixins.push(mixin.to_string());
        self.pending_events.push(ChangeEvent::PropertyChanged {
            path: node.path().to_string(),
            name: MIXIN_PROPERTY.to_string(),
        });
        Ok(())
    }

    pub fn set_property(
        &mut self,
        node: &Node,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), RepositoryError> {
        self.ensure_live()?;
        if name.is_empty() {
            return Err(RepositoryError::InvalidName {
                name: name.to_string(),
            });
        }
        let state = self.state_mut(node.path())?;
        state.properties.insert(name.to_string(), value.into());
        self.pending_events.push(ChangeEvent::PropertyChanged {
            path: node.path().to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn property(
        &self,
        node: &Node,
        name: &str,
    ) -> Result<Option<PropertyValue>, RepositoryError> {
        Ok(self.require(node.path())?.properties.get(name).cloned())
    }

    pub fn primary_type(&self, node: &Node) -> Result<String, RepositoryError> {
        Ok(self.require(node.path())?.primary_type)
    }

    pub fn mixins(&self, node: &Node) -> Result<Vec<String>, RepositoryError> {
        Ok(self.require(node.path())?.mixins)
    }

    /// Returns true if the node's primary type or one of its mixins is `type_name`
    /// or inherits from it.
    pub fn is_node_type(&self, node: &Node, type_name: &str) -> Result<bool, RepositoryError> {
        let state = self.require(node.path())?;
        Ok(std::iter::once(&state.primary_type)
            .chain(state.mixins.iter())
            .any(|t| self.repository.is_node_type(t, type_name)))
    }

    /// Children in insertion order.
    pub fn children(&self, node: &Node) -> Result<Vec<Node>, RepositoryError> {
        let state = self.require(node.path())?;
        Ok(state
            .children
            .iter()
            .map(|child| Node::at(child_path(node.path(), child)))
            .collect())
    }

    /// All descendants in pre-order, excluding the node itself.
    pub fn descendants(&self, node: &Node) -> Result<Vec<Node>, RepositoryError> {
        let mut result = Vec::new();
        let mut stack: Vec<Node> = self.children(node)?.into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            stack.extend(self.children(&current)?.into_iter().rev());
            result.push(current);
        }
        Ok(result)
    }

    /// Number of nodes below `node`.
    pub fn descendant_count(&self, node: &Node) -> Result<usize, RepositoryError> {
        let mut count = 0;
        let mut stack = vec![node.clone()];
        while let Some(current) = stack.pop() {
            let children = self.children(&current)?;
            count += children.len();
            stack.extend(children);
        }
        Ok(count)
    }

    /// Removes a node and its subtree.
    pub fn remove(&mut self, node: &Node) -> Result<(), RepositoryError> {
        self.ensure_live()?;
        let path = node.path().to_string();
        if path == ROOT_PATH {
            return Err(RepositoryError::RootRemoval);
        }
        self.require(&path)?;

        let mut doomed: Vec<String> = self.repository.persisted_descendants(&path);
        let prefix = child_path(&path, "");
        doomed.extend(
            self.overlay
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .filter(|(_, state)| state.is_some())
                .map(|(key, _)| key.clone()),
        );
        doomed.sort();
        doomed.dedup();
        doomed.retain(|p| !matches!(self.overlay.get(p), Some(None)));

        if let Some(parent) = parent_path(&path) {
            let leaf = name(&path).to_string();
            let parent_state = self.state_mut(&parent)?;
            parent_state.children.retain(|child| *child != leaf);
        }

        // deepest first, so listeners see children go before parents
        for removed in doomed.iter().rev().chain(std::iter::once(&path)) {
            self.overlay.insert(removed.clone(), None);
            self.pending_events.push(ChangeEvent::NodeRemoved {
                path: removed.clone(),
            });
        }
        Ok(())
    }

    /// Commits all transient changes.
    ///
    /// On [`RepositoryError::Conflict`] nothing is published and the transient
    /// changes are kept; `refresh` discards them.
    pub fn save(&mut self) -> Result<(), RepositoryError> {
        self.ensure_live()?;
        let repository = Arc::clone(&self.repository);
        let _commit = repository.commit_lock.lock();
        repository.apply(&mut self.overlay, &self.base_children)?;

        self.base_children.clear();
        let events = std::mem::take(&mut self.pending_events);
        self.commits += 1;
        tracing::debug!("Session commit #{}: {} events", self.commits, events.len());
        repository.dispatch(&events);
        Ok(())
    }

    /// Discards all transient changes.
    pub fn refresh(&mut self) {
        self.overlay.clear();
        self.base_children.clear();
        self.pending_events.clear();
    }

    /// Discards transient changes and closes the session.
    pub fn logout(&mut self) {
        self.refresh();
        self.live = false;
    }

    fn ensure_live(&self) -> Result<(), RepositoryError> {
        if self.live {
            Ok(())
        } else {
            Err(RepositoryError::SessionClosed)
        }
    }

    fn absolute(&self, path: &str) -> Result<String, RepositoryError> {
        self.ensure_live()?;
        if !path.starts_with('/') {
            return Err(RepositoryError::InvalidPath {
                path: path.to_string(),
            });
        }
        normalize(path).ok_or_else(|| RepositoryError::InvalidPath {
            path: path.to_string(),
        })
    }

    fn state(&self, path: &str) -> Result<Option<NodeState>, RepositoryError> {
        self.ensure_live()?;
        match self.overlay.get(path) {
            Some(state) => Ok(state.clone()),
            None => Ok(self.repository.persisted(path)),
        }
    }

    fn require(&self, path: &str) -> Result<NodeState, RepositoryError> {
        self.state(path)?
            .ok_or_else(|| RepositoryError::PathNotFound {
                path: path.to_string(),
            })
    }

    /// Returns the transient copy of a node, copying it from persisted state
    /// on first modification.
    fn state_mut(&mut self, path: &str) -> Result<&mut NodeState, RepositoryError> {
        if !self.overlay.contains_key(path) {
            let persisted =
                self.repository
                    .persisted(path)
                    .ok_or_else(|| RepositoryError::PathNotFound {
                        path: path.to_string(),
                    })?;
            self.base_children
                .insert(path.to_string(), persisted.children.clone());
            self.overlay.insert(path.to_string(), Some(persisted));
        }
        match self.overlay.get_mut(path) {
            Some(Some(state)) => Ok(state),
            _ => Err(RepositoryError::PathNotFound {
                path: path.to_string(),
            }),
        }
    }
}

/// Replays the children a session added to or removed from `base` onto the
/// `current` persisted list.
fn merge_children(base: &[String], ours: &[String], current: &[String]) -> Vec<String> {
    let base: HashSet<&str> = base.iter().map(String::as_str).collect();
    let ours_set: HashSet<&str> = ours.iter().map(String::as_str).collect();

    let mut merged: Vec<String> = current
        .iter()
        .filter(|child| !base.contains(child.as_str()) || ours_set.contains(child.as_str()))
        .cloned()
        .collect();
    let mut present: HashSet<String> = merged.iter().cloned().collect();
    for child in ours {
        if !base.contains(child.as_str()) && present.insert(child.clone()) {
            merged.push(child.clone());
        }
    }
    merged
}

fn validate_name(rel_name: &str) -> Result<(), RepositoryError> {
    let invalid = rel_name.is_empty()
        || rel_name == "."
        || rel_name == ".."
        || rel_name
            .chars()
            .any(|c| matches!(c, '/' | '[' | ']' | '*' | '|'));
    if invalid {
        return Err(RepositoryError::InvalidName {
            name: rel_name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{NT_UNSTRUCTURED, NT_VANITY_PATH, PN_VANITY_PATH};
    use crate::nodetypes::{NodeTypeDeclaration, register_declaration};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<ChangeEvent>>>,
    }

    impl ObservationListener for Recorder {
        fn on_change(&self, events: &[ChangeEvent]) {
            self.batches.lock().unwrap().push(events.to_vec());
        }
    }

    fn session_with_vanity_types() -> Session {
        let repository = Repository::new();
        let session = repository.login();
        register_declaration(&session, NodeTypeDeclaration::VanityPath).unwrap();
        session
    }

    #[test]
    fn test_add_node_visible_in_session_before_save() {
        let repository = Repository::new();
        let mut session = repository.login();
        let other = repository.login();
        let root = session.root_node().unwrap();

        session.add_node(&root, "content", NT_UNSTRUCTURED).unwrap();

        assert!(session.node_exists("/content").unwrap());
        assert!(!other.node_exists("/content").unwrap());

        session.save().unwrap();
        assert!(other.node_exists("/content").unwrap());
        assert_eq!(session.commit_count(), 1);
        assert_eq!(repository.revision(), 1);
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        let parent = session.add_node(&root, "p", NT_UNSTRUCTURED).unwrap();
        for name in ["z", "a", "m"] {
            session.add_node(&parent, name, NT_UNSTRUCTURED).unwrap();
        }
        session.save().unwrap();
        session.add_node(&parent, "b", NT_UNSTRUCTURED).unwrap();

        let names: Vec<String> = session
            .children(&parent)
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["z", "a", "m", "b"]);
    }

    #[test]
    fn test_add_node_rejects_duplicates_and_bad_names() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        session.add_node(&root, "x", NT_UNSTRUCTURED).unwrap();

        assert!(matches!(
            session.add_node(&root, "x", NT_UNSTRUCTURED),
            Err(RepositoryError::ItemExists { .. })
        ));
        assert!(matches!(
            session.add_node(&root, "a/b", NT_UNSTRUCTURED),
            Err(RepositoryError::InvalidName { .. })
        ));
        assert!(matches!(
            session.add_node(&root, "y", "nt:doesNotExist"),
            Err(RepositoryError::NoSuchNodeType { .. })
        ));
        let missing = Node::at("/missing");
        assert!(matches!(
            session.add_node(&missing, "y", NT_UNSTRUCTURED),
            Err(RepositoryError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_mixin_rules() {
        let mut session = session_with_vanity_types();
        let root = session.root_node().unwrap();

        assert!(matches!(
            session.add_node(&root, "v", NT_VANITY_PATH),
            Err(RepositoryError::MixinAsPrimary { .. })
        ));

        let node = session.add_node(&root, "v", NT_UNSTRUCTURED).unwrap();
        assert!(matches!(
            session.add_mixin(&node, NT_UNSTRUCTURED),
            Err(RepositoryError::NotAMixin { .. })
        ));
        session.add_mixin(&node, NT_VANITY_PATH).unwrap();
        session.add_mixin(&node, NT_VANITY_PATH).unwrap();
        assert_eq!(session.mixins(&node).unwrap(), vec![NT_VANITY_PATH]);
        assert!(session.is_node_type(&node, NT_VANITY_PATH).unwrap());
        assert!(session.is_node_type(&node, "nt:base").unwrap());
    }

    #[test]
    fn test_properties_round_trip_through_commit() {
        let mut session = session_with_vanity_types();
        let root = session.root_node().unwrap();
        let node = session.add_node(&root, "v", NT_UNSTRUCTURED).unwrap();
        session.set_property(&node, PN_VANITY_PATH, "alias").unwrap();
        session.set_property(&node, "count", 3i64).unwrap();
        session.save().unwrap();

        let reader = session.repository().login();
        let node = reader.get_node("/v").unwrap();
        assert_eq!(
            reader.property(&node, PN_VANITY_PATH).unwrap(),
            Some(PropertyValue::from("alias"))
        );
        assert_eq!(
            reader.property(&node, "count").unwrap().and_then(|v| v.as_long()),
            Some(3)
        );
        assert_eq!(reader.property(&node, "missing").unwrap(), None);
    }

    #[test]
    fn test_remove_subtree() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        let a = session.add_node(&root, "a", NT_UNSTRUCTURED).unwrap();
        let b = session.add_node(&a, "b", NT_UNSTRUCTURED).unwrap();
        session.add_node(&b, "c", NT_UNSTRUCTURED).unwrap();
        session.add_node(&root, "ab", NT_UNSTRUCTURED).unwrap();
        session.save().unwrap();
        // transient child added after the commit must go too
        session.add_node(&a, "d", NT_UNSTRUCTURED).unwrap();

        session.remove(&a).unwrap();
        session.save().unwrap();

        assert!(!session.node_exists("/a").unwrap());
        assert!(!session.node_exists("/a/b/c").unwrap());
        assert!(!session.node_exists("/a/d").unwrap());
        assert!(session.node_exists("/ab").unwrap());
        assert_eq!(repository.node_count(), 2);
        assert_eq!(session.children(&root).unwrap(), vec![Node::at("/ab")]);
    }

    #[test]
    fn test_remove_missing_and_root_fail() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        assert!(matches!(
            session.remove(&root),
            Err(RepositoryError::RootRemoval)
        ));
        assert!(matches!(
            session.remove(&Node::at("/nope")),
            Err(RepositoryError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_descendants_pre_order() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        let a = session.add_node(&root, "a", NT_UNSTRUCTURED).unwrap();
        session.add_node(&a, "b0", NT_UNSTRUCTURED).unwrap();
        session.add_node(&a, "b1", NT_UNSTRUCTURED).unwrap();
        session.add_node(&root, "c", NT_UNSTRUCTURED).unwrap();

        let paths: Vec<String> = session
            .descendants(&root)
            .unwrap()
            .iter()
            .map(|n| n.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/a", "/a/b0", "/a/b1", "/c"]);
        assert_eq!(session.descendant_count(&root).unwrap(), 4);
        assert_eq!(session.descendant_count(&a).unwrap(), 2);
    }

    #[test]
    fn test_listeners_receive_events_after_commit() {
        let repository = Repository::new();
        let recorder = Arc::new(Recorder::default());
        let id = repository.add_listener(recorder.clone());
        let mut session = repository.login();
        let root = session.root_node().unwrap();

        let node = session.add_node(&root, "a", NT_UNSTRUCTURED).unwrap();
        session.set_property(&node, "p", "v").unwrap();
        assert!(recorder.batches.lock().unwrap().is_empty());
        session.save().unwrap();

        // empty commit dispatches nothing
        session.save().unwrap();

        {
            let batches = recorder.batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            assert_eq!(
                batches[0],
                vec![
                    ChangeEvent::NodeAdded {
                        path: "/a".to_string()
                    },
                    ChangeEvent::PropertyChanged {
                        path: "/a".to_string(),
                        name: "p".to_string()
                    },
                ]
            );
        }
        assert_eq!(session.commit_count(), 2);

        assert!(repository.remove_listener(id));
        assert!(!repository.remove_listener(id));
        session.remove(&node).unwrap();
        session.save().unwrap();
        assert_eq!(recorder.batches.lock().unwrap().len(), 1);
    }

    fn child_names(session: &Session, path: &str) -> Vec<String> {
        let node = session.get_node(path).unwrap();
        session
            .children(&node)
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect()
    }

    #[test]
    fn test_concurrent_sessions_keep_each_others_children() {
        let repository = Repository::new();
        let mut a = repository.login();
        let mut b = repository.login();
        let root = a.root_node().unwrap();

        a.add_node(&root, "from_a", NT_UNSTRUCTURED).unwrap();
        b.add_node(&root, "from_b", NT_UNSTRUCTURED).unwrap();
        b.save().unwrap();
        a.save().unwrap();

        let reader = repository.login();
        assert_eq!(child_names(&reader, "/"), vec!["from_b", "from_a"]);
        let paths: Vec<String> = reader
            .descendants(&root)
            .unwrap()
            .iter()
            .map(|n| n.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/from_b", "/from_a"]);
    }

    #[test]
    fn test_concurrent_removal_and_addition_merge() {
        let repository = Repository::new();
        let mut setup = repository.login();
        let root = setup.root_node().unwrap();
        let parent = setup.add_node(&root, "p", NT_UNSTRUCTURED).unwrap();
        setup.add_node(&parent, "old", NT_UNSTRUCTURED).unwrap();
        setup.save().unwrap();

        let mut a = repository.login();
        let mut b = repository.login();
        let old = a.get_node("/p/old").unwrap();
        a.remove(&old).unwrap();
        b.add_node(&parent, "new", NT_UNSTRUCTURED).unwrap();
        b.save().unwrap();
        a.save().unwrap();

        let reader = repository.login();
        assert_eq!(child_names(&reader, "/p"), vec!["new"]);
        assert!(!reader.node_exists("/p/old").unwrap());
    }

    #[test]
    fn test_save_below_concurrently_removed_node_conflicts() {
        let repository = Repository::new();
        let mut setup = repository.login();
        let root = setup.root_node().unwrap();
        setup.add_node(&root, "p", NT_UNSTRUCTURED).unwrap();
        setup.save().unwrap();
        let revision = repository.revision();

        let mut a = repository.login();
        let mut b = repository.login();
        let parent = a.get_node("/p").unwrap();
        a.add_node(&parent, "child", NT_UNSTRUCTURED).unwrap();
        b.remove(&parent).unwrap();
        b.save().unwrap();

        assert!(matches!(
            a.save(),
            Err(RepositoryError::Conflict { path }) if path == "/p"
        ));
        assert_eq!(repository.revision(), revision + 1);
        assert!(!repository.login().node_exists("/p/child").unwrap());
        assert!(a.has_pending_changes());
        assert_eq!(a.commit_count(), 0);

        a.refresh();
        a.save().unwrap();
    }

    #[test]
    fn test_readd_after_remove_replaces_node() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        let a = session.add_node(&root, "a", NT_UNSTRUCTURED).unwrap();
        session.add_node(&a, "b", NT_UNSTRUCTURED).unwrap();
        session.save().unwrap();

        session.add_node(&a, "c", NT_UNSTRUCTURED).unwrap();
        session.remove(&a).unwrap();
        let a = session.add_node(&root, "a", NT_UNSTRUCTURED).unwrap();
        session.save().unwrap();

        assert!(session.children(&a).unwrap().is_empty());
        assert_eq!(repository.node_count(), 2);
    }

    #[test]
    fn test_merge_children() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            merge_children(&names(&["x"]), &names(&["x", "a"]), &names(&["x", "b"])),
            names(&["x", "b", "a"])
        );
        assert_eq!(
            merge_children(&names(&["x", "y"]), &names(&["y"]), &names(&["x", "y", "b"])),
            names(&["y", "b"])
        );
        // a child already published by someone else is not duplicated
        assert_eq!(
            merge_children(&names(&[]), &names(&["a"]), &names(&["a"])),
            names(&["a"])
        );
    }

    #[test]
    fn test_listeners_see_commits_in_order() {
        let repository = Repository::new();
        let recorder = Arc::new(Recorder::default());
        repository.add_listener(recorder.clone());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let repository = Arc::clone(&repository);
                std::thread::spawn(move || {
                    let mut session = repository.login();
                    let root = session.root_node().unwrap();
                    for i in 0..25 {
                        session
                            .add_node(&root, &format!("t{t}_{i}"), NT_UNSTRUCTURED)
                            .unwrap();
                        session.save().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reader = repository.login();
        let root = reader.root_node().unwrap();
        let published: Vec<String> = recorder
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|event| event.path().to_string())
            .collect();
        let listed: Vec<String> = reader
            .children(&root)
            .unwrap()
            .iter()
            .map(|n| n.path().to_string())
            .collect();
        assert_eq!(listed.len(), 100);
        assert_eq!(published, listed);
    }

    #[test]
    fn test_refresh_discards_changes() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        session.add_node(&root, "a", NT_UNSTRUCTURED).unwrap();
        assert!(session.has_pending_changes());
        session.refresh();
        assert!(!session.has_pending_changes());
        assert!(!session.node_exists("/a").unwrap());
    }

    #[test]
    fn test_logout_closes_session() {
        let repository = Repository::new();
        let mut session = repository.login();
        session.logout();
        assert!(!session.is_live());
        assert!(matches!(
            session.root_node(),
            Err(RepositoryError::SessionClosed)
        ));
        assert!(matches!(session.save(), Err(RepositoryError::SessionClosed)));
    }

    #[test]
    fn test_get_node_normalizes_and_requires_absolute() {
        let repository = Repository::new();
        let mut session = repository.login();
        let root = session.root_node().unwrap();
        session.add_node(&root, "a", NT_UNSTRUCTURED).unwrap();
        assert_eq!(session.get_node("//a/./").unwrap().path(), "/a");
        assert!(matches!(
            session.get_node("a"),
            Err(RepositoryError::InvalidPath { .. })
        ));
    }
}
