//! Actor resolution for the command-line surface.
//!
//! Every transition is attributed to a concrete actor. The engine never
//! invents one, so each calling layer resolves identity itself: the web
//! layer reads request headers, and the CLI resolves from flags with an
//! environment fallback.

use flow_core::types::Actor;

pub const DEFAULT_CLI_ROLE: &str = "operator";

/// Resolve the actor for a CLI invocation.
///
/// Explicit flags win; otherwise the id falls back to `$USER` (or
/// `"local"` when unset) and the role to `operator`.
pub fn resolve_cli_actor(id: Option<String>, role: Option<String>) -> Actor {
    let id = id
        .filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var("USER").ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "local".to_string());
    let role = role
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLI_ROLE.to_string());
    Actor::new(id, role)
}
