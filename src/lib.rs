// Toolgate - Library Root
//
// All modules exported here for use by the binary and tests.

pub mod config;
pub mod dispatch;
pub mod mcp;
pub mod metrics;
pub mod ratelimit;
pub mod registry;
pub mod security;

// ============================================================================
// BUILT-IN TOOLS - 7 domain modules, 22 tools
// ============================================================================

pub mod tools;
