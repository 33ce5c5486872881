//! Shared constants used across multiple modules.

/// Mixin type marking a node as carrying vanity paths.
pub const NT_VANITY_PATH: &str = "sling:VanityPath";

/// Property holding the vanity path value(s) of a node.
pub const PN_VANITY_PATH: &str = "sling:vanityPath";

/// Boolean property turning a vanity path into an external redirect.
pub const PN_REDIRECT: &str = "sling:redirect";

/// Status code used for a vanity redirect.
pub const PN_REDIRECT_STATUS: &str = "sling:redirectStatus";

/// Mapping property replacing the node name as the match pattern.
pub const PN_MATCH: &str = "sling:match";

/// Mapping property rewriting the matched prefix to a content path.
pub const PN_INTERNAL_REDIRECT: &str = "sling:internalRedirect";

/// Redirect status when `sling:redirectStatus` is absent.
pub const DEFAULT_REDIRECT_STATUS: i64 = 302;

pub const NT_UNSTRUCTURED: &str = "nt:unstructured";
pub const NT_FOLDER: &str = "nt:folder";
pub const NT_MAPPING: &str = "sling:Mapping";

/// Resource type reported for paths that resolve to nothing.
pub const RESOURCE_TYPE_NON_EXISTING: &str = "sling:nonexisting";

/// Name of the mapping root below the repository root.
pub const MAP_ROOT_NAME: &str = "etc";

/// Absolute path of the mapping configuration.
pub const MAP_ROOT_PATH: &str = "/etc/map";

/// The vanity population commits every this many outer iterations.
pub const COMMIT_INTERVAL: usize = 10;

/// Bits of randomness drawn for every generated alias.
pub const ALIAS_BITS: u32 = 130;

/// Resource name probed by the measured operation. Never a generated alias.
pub const NON_EXISTING_NAME: &str = "testNonExistingVanity";

/// Selector and extension appended to the probed name.
pub const NON_EXISTING_SUFFIX: &str = ".print.html";
