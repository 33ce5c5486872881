//! Resource resolution against the content repository.
//!
//! [`VanityResourceResolver`] resolves a request path in this order:
//!
//! 1. Normalize (relative paths are taken from the root)
//! 2. Mapping entries from `/etc/map` → possibly rewritten path
//! 3. Vanity index, with the full path and then without selectors/extension
//! 4. Repository nodes, trying shorter prefixes at `.` boundaries of the last segment
//! 5. Nothing matches → a non-existing resource (never `None`)
//!
//! The vanity index and mapping entries are built eagerly when the resolver is
//! created and follow later commits through an observation listener.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::constants::{MAP_ROOT_PATH, RESOURCE_TYPE_NON_EXISTING};
use crate::errors::{RepositoryError, ResolverError};
use crate::map_entries::MapEntries;
use crate::repository::{ChangeEvent, ListenerId, ObservationListener, Repository, Session};
use crate::request::ResolveRequest;
use crate::resource_util::{is_same_or_descendant, normalize};
use crate::vanity_index::VanityIndex;

const PN_RESOURCE_TYPE: &str = "sling:resourceType";

/// What a resolved path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// An existing content node
    Node,
    /// A vanity path configured as an external redirect
    Redirect { target: String, status: i64 },
    /// Nothing matched the requested path
    NonExisting,
}

/// The result of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    path: String,
    resource_type: String,
    /// Selectors, extension and suffix left over after the node path
    path_info: Option<String>,
    kind: ResourceKind,
}

impl Resource {
    fn node(path: &str, resource_type: String, path_info: &str) -> Self {
        Self {
            path: path.to_string(),
            resource_type,
            path_info: (!path_info.is_empty()).then(|| path_info.to_string()),
            kind: ResourceKind::Node,
        }
    }

    fn redirect(path: &str, target: &str, status: i64) -> Self {
        Self {
            path: path.to_string(),
            resource_type: "sling:redirect".to_string(),
            path_info: None,
            kind: ResourceKind::Redirect {
                target: target.to_string(),
                status,
            },
        }
    }

    fn non_existing(path: &str) -> Self {
        Self {
            path: path.to_string(),
            resource_type: RESOURCE_TYPE_NON_EXISTING.to_string(),
            path_info: None,
            kind: ResourceKind::NonExisting,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn is_non_existing(&self) -> bool {
        self.kind == ResourceKind::NonExisting
    }
}

/// Maps request paths to resources.
///
/// `Ok(None)` is allowed by the contract but signals a broken resolver;
/// a well-behaved implementation answers a miss with a non-existing resource.
pub trait ResourceResolver: Send + Sync {
    fn resolve(
        &self,
        request: &ResolveRequest,
        path: &str,
    ) -> Result<Option<Resource>, ResolverError>;

    /// Releases the resolver's session and cached state. Idempotent.
    fn close(&self);

    fn is_live(&self) -> bool;
}

struct ResolverState {
    session: RwLock<Option<Session>>,
    /// Serializes the initial scan with listener updates
    updates: Mutex<()>,
    vanity: VanityIndex,
    map_entries: RwLock<MapEntries>,
}

impl ResolverState {
    fn apply_events(&self, events: &[ChangeEvent]) {
        let _update = self.updates.lock();
        let guard = self.session.read();
        let Some(session) = guard.as_ref() else {
            return;
        };

        let touched: BTreeSet<&str> = events.iter().map(ChangeEvent::path).collect();
        let mut mapping_changed = false;
        for path in touched {
            if let Err(e) = self.vanity.index_node(session, path) {
                tracing::warn!("Failed to index vanity paths of {}: {}", path, e);
            }
            mapping_changed |= is_same_or_descendant(path, MAP_ROOT_PATH)
                || is_same_or_descendant(MAP_ROOT_PATH, path);
        }

        if mapping_changed {
            match MapEntries::load(session) {
                Ok(entries) => *self.map_entries.write() = entries,
                Err(e) => tracing::warn!("Keeping previous mapping entries: {}", e),
            }
        }
    }
}

/// Keeps the resolver's caches in step with repository commits.
struct IndexListener {
    state: Weak<ResolverState>,
}

impl ObservationListener for IndexListener {
    fn on_change(&self, events: &[ChangeEvent]) {
        if let Some(state) = self.state.upgrade() {
            state.apply_events(events);
        }
    }
}

/// Resolver honoring vanity paths and `/etc/map` mappings.
pub struct VanityResourceResolver {
    repository: Arc<Repository>,
    state: Arc<ResolverState>,
    listener: Mutex<Option<ListenerId>>,
}

impl VanityResourceResolver {
    /// Opens a resolver session and eagerly builds the vanity index and
    /// mapping entries from the committed repository state.
    pub fn new(repository: &Arc<Repository>) -> Result<Self, ResolverError> {
        let state = Arc::new(ResolverState {
            session: RwLock::new(Some(repository.login())),
            updates: Mutex::new(()),
            vanity: VanityIndex::new(),
            map_entries: RwLock::new(MapEntries::default()),
        });

        // the session is live before the listener is added, so commits landing
        // during the scan are applied rather than dropped
        let listener = repository.add_listener(Arc::new(IndexListener {
            state: Arc::downgrade(&state),
        }));
        let resolver = Self {
            repository: Arc::clone(repository),
            state,
            listener: Mutex::new(Some(listener)),
        };

        {
            let _update = resolver.state.updates.lock();
            let guard = resolver.state.session.read();
            let session = guard.as_ref().ok_or(ResolverError::Closed)?;
            resolver.state.vanity.rebuild(session)?;
            let entries = MapEntries::load(session)?;
            *resolver.state.map_entries.write() = entries;
        }

        tracing::info!(
            "Resolver ready: {} vanity paths, {} mapping entries",
            resolver.vanity_count(),
            resolver.map_entry_count()
        );
        Ok(resolver)
    }

    pub fn vanity_count(&self) -> usize {
        self.state.vanity.alias_count()
    }

    pub fn map_entry_count(&self) -> usize {
        self.state.map_entries.read().len()
    }

    fn resolve_vanity(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<Option<Resource>, RepositoryError> {
        let (base, suffix) = split_extension(path);
        let mut candidates = vec![(path, "")];
        if !suffix.is_empty() {
            candidates.push((base, suffix));
        }
        for (candidate, rest) in candidates {
            let Some(target) = self.state.vanity.lookup(candidate) else {
                continue;
            };
            if target.redirect {
                return Ok(Some(Resource::redirect(
                    path,
                    &target.node_path,
                    target.status,
                )));
            }
            let target_path = format!("{}{}", target.node_path, rest);
            if let Some(resource) = resolve_content(session, &target_path)? {
                return Ok(Some(resource));
            }
        }
        Ok(None)
    }
}

impl ResourceResolver for VanityResourceResolver {
    fn resolve(
        &self,
        request: &ResolveRequest,
        path: &str,
    ) -> Result<Option<Resource>, ResolverError> {
        let guard = self.state.session.read();
        let session = guard.as_ref().ok_or(ResolverError::Closed)?;

        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let Some(normalized) = normalize(&absolute) else {
            return Ok(Some(Resource::non_existing(path)));
        };

        let mapped = self.state.map_entries.read().map(request, &normalized);

        if let Some(resource) = self.resolve_vanity(session, &mapped)? {
            tracing::trace!("{} resolved through vanity path", mapped);
            return Ok(Some(resource));
        }
        if let Some(resource) = resolve_content(session, &mapped)? {
            return Ok(Some(resource));
        }
        tracing::trace!("{} resolved to nothing", mapped);
        Ok(Some(Resource::non_existing(&mapped)))
    }

    fn close(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.repository.remove_listener(id);
        }
        if let Some(mut session) = self.state.session.write().take() {
            session.logout();
            self.state.vanity.clear();
            *self.state.map_entries.write() = MapEntries::default();
            tracing::debug!("Resolver closed");
        }
    }

    fn is_live(&self) -> bool {
        self.state.session.read().is_some()
    }
}

impl Drop for VanityResourceResolver {
    fn drop(&mut self) {
        self.close();
    }
}

/// Splits the last segment at its first `.`: `/a/b.print.html` → (`/a/b`, `.print.html`).
fn split_extension(path: &str) -> (&str, &str) {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].find('.') {
        Some(dot) => path.split_at(segment_start + dot),
        None => (path, ""),
    }
}

/// Finds the node at `path`, or at the longest prefix ending before a `.`
/// in the last segment.
fn resolve_content(session: &Session, path: &str) -> Result<Option<Resource>, RepositoryError> {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let mut end = path.len();
    loop {
        let candidate = &path[..end];
        if (end > segment_start || path == "/") && session.node_exists(candidate)? {
            let node = session.get_node(candidate)?;
            let resource_type = match session
                .property(&node, PN_RESOURCE_TYPE)?
                .and_then(|v| v.as_str().map(str::to_string))
            {
                Some(resource_type) => resource_type,
                None => session.primary_type(&node)?,
            };
            return Ok(Some(Resource::node(candidate, resource_type, &path[end..])));
        }
        match path[segment_start..end].rfind('.') {
            Some(dot) => end = segment_start + dot,
            None => return Ok(None),
        }
    }
}
