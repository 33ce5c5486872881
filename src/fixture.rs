//! Benchmark fixture: resolve a non-existing path while the repository holds
//! a large population of vanity paths.
//!
//! Setup registers the node types, builds the `/etc/map` skeleton and a
//! two-level tree of `node_count × (1 + child_node_count)` vanity nodes below
//! `/test<millis>`, committing every [`COMMIT_INTERVAL`] outer iterations and
//! once at the end. The measured operation is a single resolution of
//! `/testNonExistingVanity.print.html`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::alias::AliasGenerator;
use crate::constants::{
    COMMIT_INTERVAL, MAP_ROOT_NAME, NON_EXISTING_NAME, NON_EXISTING_SUFFIX, NT_FOLDER, NT_MAPPING,
    NT_UNSTRUCTURED, NT_VANITY_PATH, PN_VANITY_PATH,
};
use crate::errors::{BenchError, RepositoryError};
use crate::helper::{TestHelper, VanityTestHelper};
use crate::nodetypes::{NodeTypeDeclaration, register_declaration};
use crate::repository::{Node, Repository, Session};
use crate::request::ResolveRequest;
use crate::resolver::{Resource, ResourceResolver};
use crate::resource_util::{normalize, parent_path};
use crate::runner::Benchmark;

/// Population shape of the fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VanityFixtureConfig {
    pub node_count: usize,
    pub child_node_count: usize,
    /// Fixed seed for reproducible aliases; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl VanityFixtureConfig {
    pub fn new(node_count: usize, child_node_count: usize) -> Self {
        Self {
            node_count,
            child_node_count,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Vanity nodes created below the root under test.
    pub fn expected_node_count(&self) -> usize {
        self.node_count * (1 + self.child_node_count)
    }

    /// Commits issued while populating: one per [`COMMIT_INTERVAL`] outer
    /// iterations (starting at the first) plus the final one.
    pub fn expected_commits(&self) -> usize {
        self.node_count.div_ceil(COMMIT_INTERVAL) + 1
    }
}

static LAST_ROOT_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Returns `test<millis>`, bumped so names never repeat within the process.
fn unique_root_name() -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let mut previous = LAST_ROOT_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(previous + 1);
        match LAST_ROOT_MILLIS.compare_exchange_weak(
            previous,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return format!("test{next}"),
            Err(actual) => previous = actual,
        }
    }
}

/// The path the measured operation resolves for a given root under test.
///
/// `/test1234` gives `/testNonExistingVanity.print.html`.
pub fn non_existing_target(root_path: &str) -> Option<String> {
    let parent = parent_path(root_path)?;
    normalize(&format!("{parent}/{NON_EXISTING_NAME}{NON_EXISTING_SUFFIX}"))
}

pub struct ResolveNonExistingWithManyVanityPath<H: TestHelper = VanityTestHelper> {
    helper: H,
    repository: Arc<Repository>,
    session: Session,
    config: VanityFixtureConfig,
    root_path: Option<String>,
    root_node: Option<Node>,
    map_root: Option<Node>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    aliases: Vec<String>,
    population_commits: usize,
}

impl ResolveNonExistingWithManyVanityPath<VanityTestHelper> {
    /// Fixture using the vanity-aware resolver.
    pub fn with_vanity_resolver(repository: &Arc<Repository>, config: VanityFixtureConfig) -> Self {
        Self::new(VanityTestHelper::new(), repository, config)
    }
}

impl<H: TestHelper> ResolveNonExistingWithManyVanityPath<H> {
    pub fn new(helper: H, repository: &Arc<Repository>, config: VanityFixtureConfig) -> Self {
        Self {
            helper,
            repository: Arc::clone(repository),
            session: repository.login(),
            config,
            root_path: None,
            root_node: None,
            map_root: None,
            resolver: None,
            aliases: Vec::new(),
            population_commits: 0,
        }
    }

    pub fn config(&self) -> &VanityFixtureConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn helper(&self) -> &H {
        &self.helper
    }

    /// `/test<millis>` once setup has started.
    pub fn root_path(&self) -> Option<&str> {
        self.root_path.as_deref()
    }

    /// Commits issued by the population phase of the last setup.
    pub fn commit_count(&self) -> usize {
        self.population_commits
    }

    /// Every alias assigned during the last setup, in creation order.
    pub fn generated_aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The path resolved by the measured operation.
    pub fn target_path(&self) -> Result<String, BenchError> {
        let root_path = self
            .root_path
            .as_deref()
            .ok_or_else(|| BenchError::Assertion("fixture has not been set up".to_string()))?;
        non_existing_target(root_path).ok_or_else(|| {
            BenchError::Assertion(format!("no parent path for root under test {root_path}"))
        })
    }

    /// Registers the four declarations the content relies on.
    pub fn register_node_types(&self) -> Result<(), BenchError> {
        for declaration in NodeTypeDeclaration::ALL {
            register_declaration(&self.session, declaration)?;
        }
        Ok(())
    }

    /// Creates the `/etc/map` skeleton. Transient only; nothing is committed.
    pub fn build_mapping_tree(&mut self) -> Result<Node, RepositoryError> {
        let root = self.session.root_node()?;
        let etc = self.session.add_node(&root, MAP_ROOT_NAME, NT_FOLDER)?;
        // track the subtree before filling it so teardown can remove a partial tree
        self.map_root = Some(etc.clone());

        let map = self.session.add_node(&etc, "map", NT_MAPPING)?;
        let http = self.session.add_node(&map, "http", NT_MAPPING)?;
        self.session.add_node(&http, "localhost.80", NT_MAPPING)?;
        let https = self.session.add_node(&map, "https", NT_MAPPING)?;
        self.session.add_node(&https, "localhost.443", NT_MAPPING)?;
        Ok(etc)
    }

    /// Creates `a{j}` and `a{j}/b{k}` vanity nodes below `root`.
    ///
    /// Commits whenever `j` is a multiple of [`COMMIT_INTERVAL`], then once
    /// more at the end.
    pub fn populate(
        &mut self,
        root: &Node,
        generator: &mut AliasGenerator,
    ) -> Result<(), RepositoryError> {
        let commits_before = self.session.commit_count();
        self.aliases.reserve(self.config.expected_node_count());

        for j in 0..self.config.node_count {
            let content = self
                .session
                .add_node(root, &format!("a{j}"), NT_UNSTRUCTURED)?;
            self.tag(&content, generator)?;

            for k in 0..self.config.child_node_count {
                let child = self
                    .session
                    .add_node(&content, &format!("b{k}"), NT_UNSTRUCTURED)?;
                self.tag(&child, generator)?;
            }

            if j % COMMIT_INTERVAL == 0 {
                self.session.save()?;
            }
        }
        self.session.save()?;

        self.population_commits = self.session.commit_count() - commits_before;
        tracing::debug!(
            "Populated {} vanity nodes in {} commits",
            self.aliases.len(),
            self.population_commits
        );
        Ok(())
    }

    fn tag(&mut self, node: &Node, generator: &mut AliasGenerator) -> Result<(), RepositoryError> {
        let alias = generator.next_alias();
        self.session.add_mixin(node, NT_VANITY_PATH)?;
        self.session
            .set_property(node, PN_VANITY_PATH, alias.as_str())?;
        self.aliases.push(alias);
        Ok(())
    }

    /// Builds the whole fixture and binds the resolver.
    pub fn set_up(&mut self) -> Result<(), BenchError> {
        self.register_node_types()?;

        let root_name = unique_root_name();
        let root_path = format!("/{root_name}");
        self.root_path = Some(root_path.clone());
        let repository_root = self.session.root_node()?;
        let root_node = self
            .session
            .add_node(&repository_root, &root_name, NT_UNSTRUCTURED)?;
        self.root_node = Some(root_node.clone());

        self.build_mapping_tree()?;

        let mut generator = AliasGenerator::from_seed_option(self.config.seed);
        self.aliases.clear();
        self.populate(&root_node, &mut generator)?;
        tracing::info!(
            "Fixture {} ready: {} vanity nodes, {} commits",
            root_path,
            self.aliases.len(),
            self.population_commits
        );

        self.helper
            .init(&root_path, &self.session, &self.repository)?;
        self.resolver = Some(self.helper.resource_resolver()?);
        Ok(())
    }

    /// The measured operation: one resolution of the non-existing target.
    pub fn resolve_non_existing(&self) -> Result<Resource, BenchError> {
        let path = self.target_path()?;
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| BenchError::Assertion("no resource resolver bound".to_string()))?;
        let request = ResolveRequest::new(path.as_str());
        resolver
            .resolve(&request, &path)?
            .ok_or_else(|| BenchError::Assertion(format!("resolve({path}) returned no resource")))
    }

    /// Disposes the resolver and removes both subtrees.
    ///
    /// Every step runs even when an earlier one fails; the first failure is
    /// returned after the rest have been attempted.
    pub fn tear_down(&mut self) -> Result<(), BenchError> {
        let mut first_error: Option<BenchError> = None;
        let mut record = |step: &str, error: BenchError| {
            tracing::warn!("Teardown step '{}' failed: {}", step, error);
            if first_error.is_none() {
                first_error = Some(error);
            }
        };

        self.resolver = None;
        if let Err(e) = self.helper.dispose() {
            record("dispose", e.into());
        }

        // handles are kept until the removal is committed, so a later
        // teardown can retry
        let mut gone = Vec::new();
        for (step, node) in [
            ("remove root", self.root_node.clone()),
            ("remove map root", self.map_root.clone()),
        ] {
            let Some(node) = node else { continue };
            match self.session.node_exists(node.path()) {
                Ok(true) => match self.session.remove(&node) {
                    Ok(()) => gone.push(node),
                    Err(e) => record(step, e.into()),
                },
                Ok(false) => gone.push(node),
                Err(e) => record(step, e.into()),
            }
        }

        match self.session.save() {
            Ok(()) => {
                for slot in [&mut self.root_node, &mut self.map_root] {
                    if slot.as_ref().is_some_and(|node| gone.contains(node)) {
                        *slot = None;
                    }
                }
            }
            Err(e) => {
                self.session.refresh();
                record("save", e.into());
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl<H: TestHelper> Benchmark for ResolveNonExistingWithManyVanityPath<H> {
    fn name(&self) -> String {
        format!(
            "ResolveNonExistingWithManyVanityPath({}x{})",
            self.config.node_count, self.config.child_node_count
        )
    }

    fn before_suite(&mut self) -> Result<(), BenchError> {
        self.set_up()
    }

    fn run_test(&mut self) -> Result<(), BenchError> {
        self.resolve_non_existing().map(|_| ())
    }

    fn after_suite(&mut self) -> Result<(), BenchError> {
        self.tear_down()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResolverError;

    #[test]
    fn test_non_existing_target() {
        assert_eq!(
            non_existing_target("/test9999").as_deref(),
            Some("/testNonExistingVanity.print.html")
        );
        assert_eq!(
            non_existing_target("/a/test1").as_deref(),
            Some("/a/testNonExistingVanity.print.html")
        );
        assert_eq!(non_existing_target("/"), None);
    }

    #[test]
    fn test_expected_commits() {
        assert_eq!(VanityFixtureConfig::new(0, 0).expected_commits(), 1);
        assert_eq!(VanityFixtureConfig::new(1, 0).expected_commits(), 2);
        assert_eq!(VanityFixtureConfig::new(10, 5).expected_commits(), 2);
        assert_eq!(VanityFixtureConfig::new(11, 5).expected_commits(), 3);
        assert_eq!(VanityFixtureConfig::new(100, 10).expected_commits(), 11);
    }

    #[test]
    fn test_unique_root_names_increase() {
        let first: i64 = unique_root_name()["test".len()..].parse().unwrap();
        let second: i64 = unique_root_name()["test".len()..].parse().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_mapping_tree_is_transient() {
        let repository = Repository::new();
        let mut fixture = ResolveNonExistingWithManyVanityPath::with_vanity_resolver(
            &repository,
            VanityFixtureConfig::new(0, 0),
        );
        fixture.register_node_types().unwrap();
        fixture.build_mapping_tree().unwrap();

        assert!(fixture.session().node_exists("/etc/map/https/localhost.443").unwrap());
        assert_eq!(fixture.session().commit_count(), 0);
        assert!(!repository.login().node_exists("/etc").unwrap());
    }

    #[test]
    fn test_target_path_requires_setup() {
        let repository = Repository::new();
        let fixture = ResolveNonExistingWithManyVanityPath::with_vanity_resolver(
            &repository,
            VanityFixtureConfig::new(1, 1),
        );
        assert!(matches!(fixture.target_path(), Err(BenchError::Assertion(_))));
    }

    struct NullResolver;

    impl ResourceResolver for NullResolver {
        fn resolve(
            &self,
            _request: &ResolveRequest,
            _path: &str,
        ) -> Result<Option<Resource>, ResolverError> {
            Ok(None)
        }

        fn close(&self) {}

        fn is_live(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct NullHelper {
        disposed: usize,
    }

    impl TestHelper for NullHelper {
        fn init(
            &mut self,
            _root_path: &str,
            _session: &Session,
            _repository: &Arc<Repository>,
        ) -> Result<(), ResolverError> {
            Ok(())
        }

        fn resource_resolver(&self) -> Result<Arc<dyn ResourceResolver>, ResolverError> {
            Ok(Arc::new(NullResolver))
        }

        fn dispose(&mut self) -> Result<(), ResolverError> {
            self.disposed += 1;
            Ok(())
        }
    }

    #[test]
    fn test_missing_resource_is_an_assertion_failure() {
        let repository = Repository::new();
        let mut fixture = ResolveNonExistingWithManyVanityPath::new(
            NullHelper::default(),
            &repository,
            VanityFixtureConfig::new(2, 1),
        );
        fixture.set_up().unwrap();

        let err = fixture.resolve_non_existing().unwrap_err();
        assert!(matches!(err, BenchError::Assertion(_)));

        fixture.tear_down().unwrap();
        assert_eq!(fixture.helper().disposed, 1);
    }

    #[derive(Default)]
    struct FailingDisposeHelper;

    impl TestHelper for FailingDisposeHelper {
        fn init(
            &mut self,
            _root_path: &str,
            _session: &Session,
            _repository: &Arc<Repository>,
        ) -> Result<(), ResolverError> {
            Ok(())
        }

        fn resource_resolver(&self) -> Result<Arc<dyn ResourceResolver>, ResolverError> {
            Ok(Arc::new(NullResolver))
        }

        fn dispose(&mut self) -> Result<(), ResolverError> {
            Err(ResolverError::Closed)
        }
    }

    #[test]
    fn test_teardown_continues_after_failed_dispose() {
        let repository = Repository::new();
        let mut fixture = ResolveNonExistingWithManyVanityPath::new(
            FailingDisposeHelper,
            &repository,
            VanityFixtureConfig::new(3, 2),
        );
        fixture.set_up().unwrap();
        let root_path = fixture.root_path().unwrap().to_string();

        let err = fixture.tear_down().unwrap_err();
        assert!(matches!(err, BenchError::Resolver(ResolverError::Closed)));

        let reader = repository.login();
        assert!(!reader.node_exists(&root_path).unwrap());
        assert!(!reader.node_exists("/etc").unwrap());
    }

    #[test]
    fn test_failed_teardown_can_be_retried() {
        let repository = Repository::new();
        let mut fixture = ResolveNonExistingWithManyVanityPath::new(
            NullHelper::default(),
            &repository,
            VanityFixtureConfig::new(2, 1),
        );
        fixture.set_up().unwrap();
        let root_path = fixture.root_path().unwrap().to_string();

        let mut other = repository.login();
        let root = other.root_node().unwrap();
        let scratch = other.add_node(&root, "scratch", NT_UNSTRUCTURED).unwrap();
        other.save().unwrap();

        // a pending change below a node another session removes makes the
        // teardown commit fail
        let stale = fixture.session.get_node("/scratch").unwrap();
        fixture
            .session
            .add_node(&stale, "pending", NT_UNSTRUCTURED)
            .unwrap();
        other.remove(&scratch).unwrap();
        other.save().unwrap();

        let err = fixture.tear_down().unwrap_err();
        assert!(matches!(
            err,
            BenchError::Repository(RepositoryError::Conflict { .. })
        ));
        let reader = repository.login();
        assert!(reader.node_exists(&root_path).unwrap());
        assert!(reader.node_exists("/etc").unwrap());

        fixture.tear_down().unwrap();
        let reader = repository.login();
        assert!(!reader.node_exists(&root_path).unwrap());
        assert!(!reader.node_exists("/etc").unwrap());
        assert_eq!(fixture.helper().disposed, 2);
    }
}
