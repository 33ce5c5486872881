//! Index of vanity paths for fast alias lookup.
//!
//! Maps every normalized vanity path to the node(s) declaring it, and keeps
//! the reverse mapping so a node's aliases can be dropped when it changes or
//! disappears. Both maps are papaya concurrent maps: lookups never block
//! while the observation listener applies a commit.

use papaya::HashMap;

use crate::constants::{
    DEFAULT_REDIRECT_STATUS, NT_VANITY_PATH, PN_REDIRECT, PN_REDIRECT_STATUS, PN_VANITY_PATH,
};
use crate::errors::RepositoryError;
use crate::repository::{Node, Session};
use crate::resource_util::normalize;

const PN_VANITY_ORDER: &str = "sling:vanityOrder";

/// A node reachable through a vanity path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanityTarget {
    pub node_path: String,
    /// Answer with an external redirect instead of the node itself
    pub redirect: bool,
    pub status: i64,
    /// Higher order wins when several nodes claim the same alias
    pub order: i64,
}

pub struct VanityIndex {
    /// alias path -> targets, best first
    by_alias: HashMap<String, Vec<VanityTarget>>,
    /// node path -> alias paths declared by that node
    by_node: HashMap<String, Vec<String>>,
}

impl Default for VanityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VanityIndex {
    pub fn new() -> Self {
        Self {
            by_alias: HashMap::new(),
            by_node: HashMap::new(),
        }
    }

    /// Builds the index from every node visible to `session`.
    pub fn build(session: &Session) -> Result<Self, RepositoryError> {
        let index = Self::new();
        index.rebuild(session)?;
        Ok(index)
    }

    /// Clears the index and scans the whole repository again.
    pub fn rebuild(&self, session: &Session) -> Result<usize, RepositoryError> {
        self.clear();
        let root = session.root_node()?;
        let mut indexed = 0;
        for node in session.descendants(&root)? {
            indexed += self.index_node(session, node.path())?;
        }
        tracing::debug!(
            "Vanity index built: {} aliases from {} nodes",
            self.alias_count(),
            self.node_count()
        );
        Ok(indexed)
    }

    /// Normalizes a vanity property value into an absolute lookup key.
    pub fn alias_key(value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let absolute = if value.starts_with('/') {
            value.to_string()
        } else {
            format!("/{value}")
        };
        normalize(&absolute).filter(|key| key != "/")
    }

    /// Re-reads a node and replaces its aliases. Returns the number of aliases
    /// now indexed for it (zero when the node is gone or has no vanity mixin).
    pub fn index_node(&self, session: &Session, path: &str) -> Result<usize, RepositoryError> {
        self.remove_node(path);

        let node = match session.get_node(path) {
            Ok(node) => node,
            Err(RepositoryError::PathNotFound { .. }) => return Ok(0),
            Err(e) => return Err(e),
        };
        if !session.is_node_type(&node, NT_VANITY_PATH)? {
            return Ok(0);
        }

        let target = read_target(session, &node)?;
        let keys: Vec<String> = match session.property(&node, PN_VANITY_PATH)? {
            Some(value) => value
                .strings()
                .into_iter()
                .filter_map(Self::alias_key)
                .collect(),
            None => Vec::new(),
        };
        if keys.is_empty() {
            return Ok(0);
        }

        let by_alias = self.by_alias.pin();
        for key in &keys {
            let mut targets = by_alias.get(key).cloned().unwrap_or_default();
            targets.push(target.clone());
            // stable: earlier registrations win among equal orders
            targets.sort_by(|a, b| b.order.cmp(&a.order));
            by_alias.insert(key.clone(), targets);
        }
        let count = keys.len();
        self.by_node.pin().insert(path.to_string(), keys);
        Ok(count)
    }

    /// Drops every alias declared by the node at `path`.
    pub fn remove_node(&self, path: &str) {
        let Some(keys) = self.by_node.pin().remove(path).cloned() else {
            return;
        };
        let by_alias = self.by_alias.pin();
        for key in keys {
            let Some(targets) = by_alias.get(&key) else {
                continue;
            };
            let remaining: Vec<VanityTarget> = targets
                .iter()
                .filter(|t| t.node_path != path)
                .cloned()
                .collect();
            if remaining.is_empty() {
                by_alias.remove(&key);
            } else {
                by_alias.insert(key, remaining);
            }
        }
    }

    /// Returns the winning target for an alias path.
    pub fn lookup(&self, alias_path: &str) -> Option<VanityTarget> {
        self.by_alias
            .pin()
            .get(alias_path)
            .and_then(|targets| targets.first().cloned())
    }

    pub fn contains(&self, alias_path: &str) -> bool {
        self.by_alias.pin().get(alias_path).is_some()
    }

    /// Number of distinct alias paths.
    pub fn alias_count(&self) -> usize {
        self.by_alias.pin().len()
    }

    /// Number of nodes contributing at least one alias.
    pub fn node_count(&self) -> usize {
        self.by_node.pin().len()
    }

    pub fn clear(&self) {
        self.by_alias.pin().clear();
        self.by_node.pin().clear();
    }
}

fn read_target(session: &Session, node: &Node) -> Result<VanityTarget, RepositoryError> {
    let redirect = session
        .property(node, PN_REDIRECT)?
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let status = session
        .property(node, PN_REDIRECT_STATUS)?
        .and_then(|v| v.as_long())
        .unwrap_or(DEFAULT_REDIRECT_STATUS);
    let order = session
        .property(node, PN_VANITY_ORDER)?
        .and_then(|v| v.as_long())
        .unwrap_or(0);
    Ok(VanityTarget {
        node_path: node.path().to_string(),
        redirect,
        status,
        order,
    })
}
