//! Centralized error types for the vanity path benchmark.
//!
//! Each collaborator (schema registry, repository, resolver, configuration)
//! has its own typed error; `BenchError` is what the runner sees.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),
}

/// Errors raised while registering node-type declarations.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Declaration '{source_name}' line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("Unknown namespace prefix '{prefix}' in '{name}'")]
    UnknownNamespace { prefix: String, name: String },

    #[error("Namespace prefix '{prefix}' already bound to '{existing}', cannot rebind to '{uri}'")]
    NamespaceConflict {
        prefix: String,
        existing: String,
        uri: String,
    },

    #[error("Type '{name}' declares unknown supertype '{supertype}'")]
    UnknownSupertype { name: String, supertype: String },

    #[error("Type '{name}' conflicts with an incompatible registered definition")]
    Conflict { name: String },

    #[error("Repository error during registration: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors raised by the content repository and its sessions.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Node already exists: {path}")]
    ItemExists { path: String },

    #[error("Invalid node name '{name}'")]
    InvalidName { name: String },

    #[error("Invalid path '{path}'")]
    InvalidPath { path: String },

    #[error("Unknown node type '{name}'")]
    NoSuchNodeType { name: String },

    #[error("'{name}' is a mixin and cannot be used as primary type")]
    MixinAsPrimary { name: String },

    #[error("'{name}' is not a mixin type")]
    NotAMixin { name: String },

    #[error("The root node cannot be removed")]
    RootRemoval,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Node was removed by a concurrent commit: {path}")]
    Conflict { path: String },
}

/// Errors raised by resource resolution.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Resource resolver is closed")]
    Closed,

    #[error("Test helper has not been initialized")]
    NotInitialized,

    #[error("Invalid mapping pattern '{pattern}' at {path}")]
    InvalidMapping {
        path: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors related to configuration loading and parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration parsing failed")]
    ParseFailed(Box<figment::Error>),

    #[error("Configuration file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Invalid iterations: {value}. Must be greater than 0")]
    InvalidIterations { value: usize },

    #[error("Invalid output format: {value}. Expected 'text' or 'json'")]
    InvalidOutput { value: String },
}
