//! URL mapping entries compiled from the `/etc/map` tree.
//!
//! Every mapping node at depth two or more below `/etc/map` yields one entry.
//! Its pattern is the chain of segment names from the scheme down, where a
//! `sling:match` property replaces the node name, e.g.
//! `/etc/map/http/localhost.80` becomes `^http/localhost.80/`.
//! Requests are matched as `{scheme}/{host}.{port}{path}`.

use regex::Regex;

use crate::constants::{MAP_ROOT_PATH, NT_MAPPING, PN_INTERNAL_REDIRECT, PN_MATCH};
use crate::errors::ResolverError;
use crate::repository::{Node, Session};
use crate::request::ResolveRequest;
use crate::resource_util::{child_path, normalize};

#[derive(Debug, Clone)]
pub struct MapEntry {
    pattern: Regex,
    /// Node the entry was compiled from
    node_path: String,
    internal_redirect: Option<String>,
}

impl MapEntry {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    pub fn internal_redirect(&self) -> Option<&str> {
        self.internal_redirect.as_deref()
    }

    /// Rewrites `key` if the entry matches it.
    fn apply(&self, key: &str) -> Option<String> {
        let found = self.pattern.find(key)?;
        let rest = &key[found.end()..];
        let rewritten = match &self.internal_redirect {
            Some(target) => child_path(target, rest),
            None => format!("/{rest}"),
        };
        normalize(&rewritten)
    }
}

/// Ordered mapping entries, longest pattern first.
#[derive(Debug, Clone, Default)]
pub struct MapEntries {
    entries: Vec<MapEntry>,
}

impl MapEntries {
    /// Compiles the entries below `/etc/map`. An absent map root yields no entries.
    pub fn load(session: &Session) -> Result<Self, ResolverError> {
        if !session.node_exists(MAP_ROOT_PATH)? {
            return Ok(Self::default());
        }
        let map_root = session.get_node(MAP_ROOT_PATH)?;
        let mut entries = Vec::new();
        let mut stack: Vec<(Node, Vec<String>)> = session
            .children(&map_root)?
            .into_iter()
            .map(|child| (child, Vec::new()))
            .collect();

        while let Some((node, mut segments)) = stack.pop() {
            if !session.is_node_type(&node, NT_MAPPING)? {
                continue;
            }
            let segment = match session.property(&node, PN_MATCH)? {
                Some(value) => value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| node.name().to_string()),
                None => node.name().to_string(),
            };
            segments.push(segment);

            if segments.len() >= 2 {
                entries.push(compile(session, &node, &segments)?);
            }
            for child in session.children(&node)? {
                stack.push((child, segments.clone()));
            }
        }

        // longest pattern first so more specific entries win
        entries.sort_by(|a, b| {
            b.pattern
                .as_str()
                .len()
                .cmp(&a.pattern.as_str().len())
                .then_with(|| a.node_path.cmp(&b.node_path))
        });
        tracing::debug!("Loaded {} mapping entries", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Applies the first matching entry to a normalized absolute path.
    pub fn map(&self, request: &ResolveRequest, path: &str) -> String {
        let key = format!(
            "{}/{}.{}{}",
            request.scheme(),
            request.host(),
            request.port(),
            path
        );
        self.entries
            .iter()
            .find_map(|entry| entry.apply(&key))
            .unwrap_or_else(|| path.to_string())
    }
}

fn compile(session: &Session, node: &Node, segments: &[String]) -> Result<MapEntry, ResolverError> {
    let pattern = format!("^{}/", segments.join("/"));
    let regex = Regex::new(&pattern).map_err(|source| ResolverError::InvalidMapping {
        path: node.path().to_string(),
        pattern: pattern.clone(),
        source,
    })?;
    let internal_redirect = session
        .property(node, PN_INTERNAL_REDIRECT)?
        .and_then(|value| value.strings().first().map(|s| s.to_string()));
    Ok(MapEntry {
        pattern: regex,
        node_path: node.path().to_string(),
        internal_redirect,
    })
}
