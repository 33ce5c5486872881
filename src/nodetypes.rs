//! Node-type declarations and the type registry.
//!
//! Declarations use a subset of the compact node-type notation:
//!
//! ```text
//! <sling = 'http://sling.apache.org/jcr/sling/1.0'>
//! [sling:VanityPath] mixin
//!   - sling:vanityPath (string) multiple
//! [sling:Mapping] > nt:hierarchyNode, sling:MappingSpec
//!   + * (nt:base) = sling:Mapping version
//! ```
//!
//! The four declarations the benchmark needs are embedded at compile time and
//! exposed through [`NodeTypeDeclaration`].

use std::collections::{HashMap, HashSet};

use crate::errors::{RepositoryError, SchemaError};
use crate::repository::Session;

/// A property definition inside a node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: String,
    /// Lowercased value type, e.g. "string", "long", "undefined"
    pub required_type: String,
    pub multiple: bool,
    pub attributes: Vec<String>,
}

/// A child node definition inside a node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNodeDefinition {
    pub name: String,
    pub required_types: Vec<String>,
    pub default_type: Option<String>,
    pub attributes: Vec<String>,
}

/// A complete node type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeTypeDefinition {
    pub name: String,
    pub supertypes: Vec<String>,
    pub mixin: bool,
    pub orderable: bool,
    pub is_abstract: bool,
    pub properties: Vec<PropertyDefinition>,
    pub child_nodes: Vec<ChildNodeDefinition>,
}

impl NodeTypeDefinition {
    fn builtin(name: &str, supertypes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            supertypes: supertypes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// Parsed content of one declaration stream.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub namespaces: Vec<(String, String)>,
    pub types: Vec<NodeTypeDefinition>,
}

/// The declaration files registered before any content is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTypeDeclaration {
    Folder,
    Resource,
    VanityPath,
    Mapping,
}

impl NodeTypeDeclaration {
    /// Registration order used by the fixture.
    pub const ALL: [NodeTypeDeclaration; 4] = [
        NodeTypeDeclaration::Folder,
        NodeTypeDeclaration::Resource,
        NodeTypeDeclaration::VanityPath,
        NodeTypeDeclaration::Mapping,
    ];

    /// Resource name of the declaration.
    pub fn name(&self) -> &'static str {
        match self {
            NodeTypeDeclaration::Folder => "folder",
            NodeTypeDeclaration::Resource => "resource",
            NodeTypeDeclaration::VanityPath => "vanitypath",
            NodeTypeDeclaration::Mapping => "mapping",
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            NodeTypeDeclaration::Folder => include_str!("../nodetypes/folder.cnd"),
            NodeTypeDeclaration::Resource => include_str!("../nodetypes/resource.cnd"),
            NodeTypeDeclaration::VanityPath => include_str!("../nodetypes/vanitypath.cnd"),
            NodeTypeDeclaration::Mapping => include_str!("../nodetypes/mapping.cnd"),
        }
    }
}

/// Registers every type in `text` with the session's repository.
///
/// Returns the names of the types that were newly registered. Types that are
/// already registered with an identical definition are skipped.
pub fn register(
    session: &Session,
    source_name: &str,
    text: &str,
) -> Result<Vec<String>, SchemaError> {
    if !session.is_live() {
        return Err(RepositoryError::SessionClosed.into());
    }
    let declarations = parse(source_name, text)?;
    let registered = session.repository().register_node_types(declarations)?;
    tracing::debug!("Registered node types from {}: {:?}", source_name, registered);
    Ok(registered)
}

/// Registers one of the embedded declarations.
pub fn register_declaration(
    session: &Session,
    declaration: NodeTypeDeclaration,
) -> Result<Vec<String>, SchemaError> {
    register(session, declaration.name(), declaration.source())
}

const TYPE_ATTRIBUTES: &[&str] = &["mixin", "orderable", "abstract", "noquery", "query"];

/// Parses a declaration stream.
pub fn parse(source_name: &str, text: &str) -> Result<Declarations, SchemaError> {
    let mut declarations = Declarations::default();
    let mut current: Option<NodeTypeDefinition> = None;

    let error = |line: usize, message: String| SchemaError::Parse {
        source_name: source_name.to_string(),
        line,
        message,
    };

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if let Some(rest) = line.strip_prefix('<') {
            let inner = rest
                .strip_suffix('>')
                .ok_or_else(|| error(line_no, "expected '>' to close namespace".to_string()))?;
            let (prefix, uri) = inner
                .split_once('=')
                .ok_or_else(|| error(line_no, "expected '=' in namespace".to_string()))?;
            let prefix = prefix.trim();
            let uri = uri.trim().trim_matches('\'');
            if prefix.is_empty() || uri.is_empty() {
                return Err(error(line_no, "empty namespace prefix or uri".to_string()));
            }
            declarations
                .namespaces
                .push((prefix.to_string(), uri.to_string()));
        } else if let Some(rest) = line.strip_prefix('[') {
            let (name, tail) = rest
                .split_once(']')
                .ok_or_else(|| error(line_no, "expected ']' after type name".to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(error(line_no, "empty type name".to_string()));
            }
            if let Some(done) = current.take() {
                declarations.types.push(done);
            }
            let mut definition = NodeTypeDefinition {
                name: name.to_string(),
                ..Default::default()
            };

            let tail = tail.trim();
            let (has_supertypes, tail) = match tail.strip_prefix('>') {
                Some(t) => (true, t),
                None => (false, tail),
            };
            for token in tail
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
            {
                if apply_type_attribute(&mut definition, token) {
                    continue;
                }
                if !has_supertypes {
                    return Err(error(line_no, format!("unexpected token '{token}'")));
                }
                definition.supertypes.push(token.to_string());
            }
            if has_supertypes && definition.supertypes.is_empty() {
                return Err(error(line_no, "expected supertype after '>'".to_string()));
            }
            current = Some(definition);
        } else if let Some(rest) = line.strip_prefix('-') {
            let definition = current
                .as_mut()
                .ok_or_else(|| error(line_no, "property outside of a type".to_string()))?;
            let (name, required_type, attributes) = parse_item(rest)
                .ok_or_else(|| error(line_no, "malformed property definition".to_string()))?;
            definition.properties.push(PropertyDefinition {
                name,
                required_type: required_type.to_lowercase(),
                multiple: attributes.iter().any(|a| a == "multiple"),
                attributes,
            });
        } else if let Some(rest) = line.strip_prefix('+') {
            let definition = current
                .as_mut()
                .ok_or_else(|| error(line_no, "child node outside of a type".to_string()))?;
            let (name, required_types, mut attributes) = parse_item(rest)
                .ok_or_else(|| error(line_no, "malformed child node definition".to_string()))?;
            let default_type = match attributes.iter().position(|a| a == "=") {
                Some(pos) if pos + 1 < attributes.len() => {
                    let default = attributes.remove(pos + 1);
                    attributes.remove(pos);
                    Some(default)
                }
                Some(_) => return Err(error(line_no, "expected default type after '='".to_string())),
                None => None,
            };
            definition.child_nodes.push(ChildNodeDefinition {
                name,
                required_types: required_types
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
                default_type,
                attributes,
            });
        } else {
            let definition = current
                .as_mut()
                .ok_or_else(|| error(line_no, format!("unexpected line '{line}'")))?;
            for token in line.split_whitespace() {
                if !apply_type_attribute(definition, token) {
                    return Err(error(line_no, format!("unknown attribute '{token}'")));
                }
            }
        }
    }

    if let Some(done) = current.take() {
        declarations.types.push(done);
    }
    Ok(declarations)
}

fn apply_type_attribute(definition: &mut NodeTypeDefinition, token: &str) -> bool {
    if !TYPE_ATTRIBUTES.contains(&token) {
        return false;
    }
    match token {
        "mixin" => definition.mixin = true,
        "orderable" => definition.orderable = true,
        "abstract" => definition.is_abstract = true,
        _ => {}
    }
    true
}

/// Splits `name (type) attr attr...` into its parts.
fn parse_item(rest: &str) -> Option<(String, String, Vec<String>)> {
    let rest = rest.trim();
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    let name = rest[..open].trim();
    if name.is_empty() {
        return None;
    }
    let required = rest[open + 1..close].trim().to_string();
    let attributes = rest[close + 1..]
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    Some((name.to_string(), required, attributes))
}

fn prefix_of(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

/// Registered namespaces and node types of a repository.
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    namespaces: HashMap<String, String>,
    types: HashMap<String, NodeTypeDefinition>,
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl NodeTypeRegistry {
    /// Creates a registry holding the built-in namespaces and types.
    pub fn with_builtins() -> Self {
        let namespaces = [
            ("jcr", "http://www.jcp.org/jcr/1.0"),
            ("nt", "http://www.jcp.org/jcr/nt/1.0"),
            ("mix", "http://www.jcp.org/jcr/mix/1.0"),
            ("rep", "internal"),
        ]
        .into_iter()
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .collect();

        let mut base = NodeTypeDefinition::builtin("nt:base", &[]);
        base.is_abstract = true;
        let mut hierarchy = NodeTypeDefinition::builtin("nt:hierarchyNode", &["nt:base"]);
        hierarchy.is_abstract = true;
        let folder = NodeTypeDefinition::builtin("nt:folder", &["nt:hierarchyNode"]);
        let mut unstructured = NodeTypeDefinition::builtin("nt:unstructured", &["nt:base"]);
        unstructured.orderable = true;
        let mut root = NodeTypeDefinition::builtin("rep:root", &["nt:unstructured"]);
        root.orderable = true;
        let mut referenceable = NodeTypeDefinition::builtin("mix:referenceable", &[]);
        referenceable.mixin = true;

        let types = [base, hierarchy, folder, unstructured, root, referenceable]
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        Self { namespaces, types }
    }

    pub fn get(&self, name: &str) -> Option<&NodeTypeDefinition> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// Returns true if `type_name` is `candidate` or inherits from it.
    pub fn is_node_type(&self, type_name: &str, candidate: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![type_name];
        while let Some(name) = stack.pop() {
            if name == candidate {
                return true;
            }
            if !seen.insert(name) {
                continue;
            }
            if let Some(def) = self.types.get(name) {
                stack.extend(def.supertypes.iter().map(String::as_str));
            }
        }
        false
    }

    /// Validates and registers a declaration batch.
    ///
    /// The batch is checked completely before anything is registered, so a
    /// failing batch leaves the registry untouched.
    pub fn register(&mut self, declarations: Declarations) -> Result<Vec<String>, SchemaError> {
        let mut namespaces = self.namespaces.clone();
        for (prefix, uri) in &declarations.namespaces {
            match namespaces.get(prefix) {
                Some(existing) if existing != uri => {
                    return Err(SchemaError::NamespaceConflict {
                        prefix: prefix.clone(),
                        existing: existing.clone(),
                        uri: uri.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    namespaces.insert(prefix.clone(), uri.clone());
                }
            }
        }

        let batch: HashSet<&str> = declarations.types.iter().map(|t| t.name.as_str()).collect();
        let mut fresh = Vec::new();
        for definition in &declarations.types {
            if let Some(prefix) = prefix_of(&definition.name)
                && !namespaces.contains_key(prefix)
            {
                return Err(SchemaError::UnknownNamespace {
                    prefix: prefix.to_string(),
                    name: definition.name.clone(),
                });
            }
            for supertype in &definition.supertypes {
                if !self.types.contains_key(supertype) && !batch.contains(supertype.as_str()) {
                    return Err(SchemaError::UnknownSupertype {
                        name: definition.name.clone(),
                        supertype: supertype.clone(),
                    });
                }
            }
            match self.types.get(&definition.name) {
                Some(existing) if existing == definition => {}
                Some(_) => {
                    return Err(SchemaError::Conflict {
                        name: definition.name.clone(),
                    });
                }
                None => fresh.push(definition.clone()),
            }
        }

        self.namespaces = namespaces;
        let names = fresh.iter().map(|t| t.name.clone()).collect();
        for definition in fresh {
            self.types.insert(definition.name.clone(), definition);
        }
        Ok(names)
    }
}
