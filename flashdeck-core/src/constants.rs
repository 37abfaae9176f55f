//! Constants for flashdeck
//!
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// CACHE RETENTION
// ============================================================================

/// Default time an abandoned entity survives in the cache (5 minutes)
pub const DEFAULT_CACHE_TIME_MS: u64 = 300_000;

/// Upper bound for the cache time and the sweep interval (one year)
pub const MAX_RETENTION_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Environment variable overriding the default cache time
pub const ENV_CACHE_TIME_MS: &str = "FLASHDECK_CACHE_TIME_MS";

/// Environment variable overriding the sweep interval
pub const ENV_SWEEP_INTERVAL_MS: &str = "FLASHDECK_SWEEP_INTERVAL_MS";

// ============================================================================
// LEASEES
// ============================================================================

/// Leasee name used for session-scoped claims (current user identity)
pub const SESSION_LEASEE: &str = "session";

// ============================================================================
// COLLECTIONS
// ============================================================================

pub const DECKS_COLLECTION: &str = "decks";
pub const CARDS_COLLECTION: &str = "cards";
pub const USERS_COLLECTION: &str = "users";
pub const SEARCH_COLLECTION: &str = "search";
