//! Common test utilities for integration tests.

// Each test binary includes this module but only uses a subset of functions.
#![allow(dead_code)]

use std::sync::Arc;

use vpb::constants::{NT_VANITY_PATH, PN_VANITY_PATH};
use vpb::{
    Node, Repository, ResolveNonExistingWithManyVanityPath, Session, VanityFixtureConfig,
    VanityTestHelper,
};

/// A fixture over a fresh repository, seeded for reproducible aliases.
pub struct TestBench {
    pub repository: Arc<Repository>,
    pub fixture: ResolveNonExistingWithManyVanityPath<VanityTestHelper>,
}

impl TestBench {
    pub fn new(node_count: usize, child_node_count: usize) -> Self {
        let repository = Repository::new();
        let config = VanityFixtureConfig::new(node_count, child_node_count).with_seed(0x5eed);
        let fixture = ResolveNonExistingWithManyVanityPath::with_vanity_resolver(&repository, config);
        Self {
            repository,
            fixture,
        }
    }

    /// Creates a bench and runs its setup.
    pub fn set_up(node_count: usize, child_node_count: usize) -> Self {
        let mut bench = Self::new(node_count, child_node_count);
        bench.fixture.set_up().expect("Fixture setup failed");
        bench
    }

    /// A fresh session on the committed state.
    pub fn reader(&self) -> Session {
        self.repository.login()
    }

    pub fn root_path(&self) -> String {
        self.fixture
            .root_path()
            .expect("Fixture has no root path")
            .to_string()
    }
}

/// All committed descendants of `path`, excluding `path` itself.
pub fn descendants(session: &Session, path: &str) -> Vec<Node> {
    let node = session.get_node(path).expect("Node not found");
    session.descendants(&node).expect("Failed to list descendants")
}

/// The vanity alias of a node, if it carries the mixin and the property.
pub fn vanity_alias(session: &Session, node: &Node) -> Option<String> {
    if !session
        .is_node_type(node, NT_VANITY_PATH)
        .expect("Failed to read node type")
    {
        return None;
    }
    session
        .property(node, PN_VANITY_PATH)
        .expect("Failed to read property")
        .and_then(|value| value.as_str().map(str::to_string))
}

/// Root-level nodes named `test<digits>`.
pub fn test_roots(session: &Session) -> Vec<String> {
    let root = session.root_node().expect("No root node");
    session
        .children(&root)
        .expect("Failed to list children")
        .into_iter()
        .map(|node| node.name().to_string())
        .filter(|name| {
            name.strip_prefix("test")
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        })
        .collect()
}
