//! Flashdeck Core - Entity Keys and Documents
//!
//! Pure data structures shared by the cache layer and its consumers: entity
//! keys and their canonical hashes, retention configuration, the error
//! taxonomy, a clock abstraction, and the flashcard documents.
//! This crate contains no cache logic.

use chrono::{DateTime, Utc};

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod key;
pub mod model;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, Retention};
pub use error::{ConfigError, FbaseError, FbaseResult, StoreError, StoreErrorKind};
pub use key::{canonicalize, EntityKey, HashedKey, KeySegment, ValidKey};
pub use model::{paths, Card, Deck, DeckRole, UserProfile};
