//! Security policy for tool execution: filesystem allowlists, outbound URL
//! vetting and query screening. Every check returns a [`SecurityDecision`]
//! whose denials carry a [`DenyReason`].

pub mod decision;
pub mod path_policy;
pub mod permissions;
pub mod query_guard;
pub mod url_policy;

pub use decision::{DenyReason, PolicyViolation, SecurityDecision};
pub use path_policy::{canonicalize_lenient, PathAccess, PathPolicy};
pub use permissions::{check_admissible, AddPathOutcome, AllowedPathInfo, AllowedPaths, PermissionError};
pub use query_guard::QueryGuard;
pub use url_policy::{domain_matches, is_non_public, UrlPolicy};
