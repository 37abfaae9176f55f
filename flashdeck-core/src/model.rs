//! Flashcard documents and the paths that address them.

use crate::constants::{CARDS_COLLECTION, DECKS_COLLECTION, SEARCH_COLLECTION, USERS_COLLECTION};
use crate::key::{EntityKey, KeySegment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Access level a user holds on a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeckRole {
    Viewer,
    Editor,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner: String,
    /// Shared access, keyed by user id. The owner is implicit.
    #[serde(default)]
    pub roles: BTreeMap<String, DeckRole>,
    #[serde(default)]
    pub public: bool,
    /// Card ids in study order.
    #[serde(default)]
    pub card_order: Vec<String>,
}

impl Deck {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            owner: owner.into(),
            roles: BTreeMap::new(),
            public: false,
            card_order: Vec::new(),
        }
    }

    pub fn role_of(&self, uid: &str) -> Option<DeckRole> {
        if uid == self.owner {
            return Some(DeckRole::Owner);
        }
        self.roles.get(uid).copied()
    }

    pub fn can_edit(&self, uid: &str) -> bool {
        self.role_of(uid).is_some_and(|role| role >= DeckRole::Editor)
    }

    pub fn can_view(&self, uid: &str) -> bool {
        self.public || self.role_of(uid).is_some()
    }

    /// Grant `role` to `uid`. Ownership is not transferable this way.
    pub fn share(&mut self, uid: impl Into<String>, role: DeckRole) -> bool {
        let uid = uid.into();
        if uid == self.owner || role == DeckRole::Owner {
            return false;
        }
        self.roles.insert(uid, role);
        true
    }

    /// Remove a shared role. The owner cannot be revoked.
    pub fn revoke(&mut self, uid: &str) -> bool {
        uid != self.owner && self.roles.remove(uid).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Serialized rich text.
    pub prompt: String,
    /// Serialized rich text.
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Path builders. `None` ids produce keys that are not ready yet.
pub mod paths {
    use super::*;

    pub fn deck<S: Into<String>>(deck_id: Option<S>) -> EntityKey {
        EntityKey::from([DECKS_COLLECTION]).with(deck_id)
    }

    pub fn deck_cards<S: Into<String>>(deck_id: Option<S>) -> EntityKey {
        deck(deck_id).with(CARDS_COLLECTION)
    }

    pub fn card<S: Into<String>, T: Into<String>>(deck_id: Option<S>, card_id: Option<T>) -> EntityKey {
        deck_cards(deck_id).with(card_id)
    }

    pub fn user<S: Into<String>>(uid: Option<S>) -> EntityKey {
        EntityKey::from([USERS_COLLECTION]).with(uid)
    }

    /// A library search; the filter is part of the key.
    pub fn deck_search(filter: serde_json::Value) -> EntityKey {
        EntityKey::from([SEARCH_COLLECTION, DECKS_COLLECTION]).with(KeySegment::Filter(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roles() {
        let mut deck = Deck::new("Biology", "alice");
        assert_eq!(deck.role_of("alice"), Some(DeckRole::Owner));
        assert!(!deck.can_view("bob"));

        assert!(deck.share("bob", DeckRole::Viewer));
        assert!(deck.can_view("bob"));
        assert!(!deck.can_edit("bob"));

        assert!(deck.share("bob", DeckRole::Editor));
        assert!(deck.can_edit("bob"));

        assert!(!deck.share("alice", DeckRole::Viewer));
        assert!(!deck.share("carol", DeckRole::Owner));
        assert!(!deck.revoke("alice"));
        assert!(deck.revoke("bob"));
        assert!(!deck.revoke("bob"));
    }

    #[test]
    fn test_public_deck_viewable() {
        let mut deck = Deck::new("Spanish", "alice");
        deck.public = true;
        assert!(deck.can_view("anyone"));
        assert!(!deck.can_edit("anyone"));
    }

    #[test]
    fn test_deck_json_shape() {
        let mut deck = Deck::new("Foo", "alice");
        deck.share("bob", DeckRole::Editor);
        let value = serde_json::to_value(&deck).unwrap();
        assert_eq!(value["roles"]["bob"], json!("editor"));
        assert_eq!(value["cardOrder"], json!([]));

        let back: Deck = serde_json::from_value(json!({"name": "Foo", "owner": "alice"})).unwrap();
        assert!(back.roles.is_empty());
    }

    #[test]
    fn test_paths() {
        let key = paths::card(Some("d1"), Some("c9")).validate().unwrap();
        assert_eq!(key.path(), "decks/d1/cards/c9");
        assert!(paths::deck(None::<String>).validate().is_none());
        assert!(paths::card(Some("d1"), None::<String>).validate().is_none());
        assert_eq!(
            paths::user(Some("u1")).validate().unwrap().path(),
            "users/u1"
        );
    }

    #[test]
    fn test_search_key_is_order_independent() {
        let a = paths::deck_search(json!({"text": "cells", "public": true}));
        let b = paths::deck_search(json!({"public": true, "text": "cells"}));
        assert_eq!(a.validate().unwrap().hash(), b.validate().unwrap().hash());
    }
}
