//! vpb - vanity path benchmark
//!
//! Measures how long a resource resolver takes to answer a request for a
//! path that exists nowhere, while the repository carries a large population
//! of vanity paths and a URL mapping tree.

pub mod alias;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod fixture;
pub mod helper;
pub mod map_entries;
pub mod nodetypes;
pub mod repository;
pub mod request;
pub mod resolver;
pub mod resource_util;
pub mod runner;
pub mod vanity_index;

pub use alias::AliasGenerator;
pub use config::{BenchConfig, OutputFormat};
pub use errors::{BenchError, ConfigError, RepositoryError, ResolverError, SchemaError};
pub use fixture::{ResolveNonExistingWithManyVanityPath, VanityFixtureConfig};
pub use helper::{TestHelper, VanityTestHelper};
pub use repository::{Node, Repository, Session};
pub use request::ResolveRequest;
pub use resolver::{Resource, ResourceKind, ResourceResolver, VanityResourceResolver};
pub use runner::{Benchmark, Report, RunOptions};
