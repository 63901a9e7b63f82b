//! Card catalog entities
//!
//! Registers the animestars card tables with the filter registry: cards,
//! per-collection user summaries and stats, decks (cards grouped by anime)
//! and users.

use crate::data::filters::{
    EntityMetadata, FilterError, JoinDescriptor, JoinPredicate, MetadataRegistry, ValueKind,
};

// =============================================================================
// Entity Codes
// =============================================================================

pub const CARD: &str = "card";
pub const SUMMARY_CARD_USERS: &str = "summary_card_users";
pub const CARD_USERS_STATS: &str = "card_users_stats";
pub const DECK: &str = "deck";
pub const ANIMESTARS_USER: &str = "animestars_user";

// =============================================================================
// Enumerations
// =============================================================================

/// Card ranks, rarest first
pub const CARD_RANKS: [&str; 7] = ["ASS", "S", "A", "B", "C", "D", "E"];

/// User collections a card can be listed in
pub const CARD_COLLECTIONS: [&str; 3] = ["TRADE", "NEED", "OWNED"];

/// Lock state of a summary row
pub const SUMMARY_CARD_STATES: [&str; 2] = ["LOCKED", "UNLOCKED"];

pub fn card_rank() -> ValueKind {
    ValueKind::enumeration(CARD_RANKS)
}

pub fn card_collection() -> ValueKind {
    ValueKind::enumeration(CARD_COLLECTIONS)
}

pub fn summary_card_state() -> ValueKind {
    ValueKind::enumeration(SUMMARY_CARD_STATES)
}

fn timestamped(metadata: EntityMetadata) -> EntityMetadata {
    metadata
        .field("created_at", ValueKind::DateTime)
        .field("updated_at", ValueKind::DateTime)
}

fn card() -> EntityMetadata {
    timestamped(
        EntityMetadata::new(CARD, "animestars_cards")
            .primary_key(&["id"])
            .field("id", ValueKind::Uuid)
            .field("card_id", ValueKind::Integer)
            .field("name", ValueKind::Text)
            .field("rank", card_rank())
            .field("anime_name", ValueKind::Text)
            .field("anime_link", ValueKind::Text)
            .field("author", ValueKind::Text)
            .field("image", ValueKind::Text)
            .field("mp4", ValueKind::Text)
            .field("webm", ValueKind::Text),
    )
    .join(JoinDescriptor::many(
        "summary",
        SUMMARY_CARD_USERS,
        JoinPredicate::on("card_id", "card_id"),
    ))
    .join(JoinDescriptor::many(
        "stats",
        CARD_USERS_STATS,
        JoinPredicate::on("card_id", "card_id"),
    ))
    .join(JoinDescriptor::one(
        "author_user",
        ANIMESTARS_USER,
        JoinPredicate::on("author", "username"),
    ))
}

fn summary_card_users() -> EntityMetadata {
    timestamped(
        EntityMetadata::new(SUMMARY_CARD_USERS, "animestars_summary_card_users")
            .primary_key(&["id"])
            .field("id", ValueKind::Uuid)
            .field("card_id", ValueKind::Integer)
            .field("collection", card_collection())
            .field("state", summary_card_state())
            .field("count", ValueKind::Integer),
    )
    .join(JoinDescriptor::one(
        "card",
        CARD,
        JoinPredicate::on("card_id", "card_id"),
    ))
}

fn card_users_stats() -> EntityMetadata {
    timestamped(
        EntityMetadata::new(CARD_USERS_STATS, "animestars_card_users_stats")
            .primary_key(&["id"])
            .field("id", ValueKind::Uuid)
            .field("card_id", ValueKind::Integer)
            .field("collection", card_collection())
            .field("count", ValueKind::Integer),
    )
    .join(JoinDescriptor::one(
        "card",
        CARD,
        JoinPredicate::on("card_id", "card_id"),
    ))
}

/// Decks are a view over cards grouped by anime
fn deck() -> EntityMetadata {
    EntityMetadata::new(DECK, "animestars_card_deck")
        .primary_key(&["anime_link"])
        .field("anime_link", ValueKind::Text)
        .field("anime_name", ValueKind::Text)
        .field("card_count", ValueKind::Integer)
        .join(JoinDescriptor::many(
            "cards",
            CARD,
            JoinPredicate::on("anime_link", "anime_link"),
        ))
}

fn animestars_user() -> EntityMetadata {
    EntityMetadata::new(ANIMESTARS_USER, "animestars_users")
        .primary_key(&["username"])
        .field("username", ValueKind::Text)
        .join(JoinDescriptor::many(
            "cards",
            CARD,
            JoinPredicate::on("username", "author"),
        ))
}

/// Register every catalog entity into `registry`
pub fn register_catalog(registry: &mut MetadataRegistry) -> Result<(), FilterError> {
    for metadata in [
        card(),
        summary_card_users(),
        card_users_stats(),
        deck(),
        animestars_user(),
    ] {
        registry.register(metadata)?;
    }
    Ok(())
}

/// A validated registry holding only the catalog entities
pub fn catalog_registry() -> Result<MetadataRegistry, FilterError> {
    let mut registry = MetadataRegistry::new();
    register_catalog(&mut registry)?;
    registry.validate()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filters::Cardinality;

    #[test]
    fn test_catalog_registers_all_entities() {
        let registry = catalog_registry().unwrap();
        let codes: Vec<&str> = registry
            .entities()
            .map(|e| e.entity_code.as_str())
            .collect();
        assert_eq!(
            codes,
            vec![
                ANIMESTARS_USER,
                CARD,
                CARD_USERS_STATS,
                DECK,
                SUMMARY_CARD_USERS
            ]
        );
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let mut registry = catalog_registry().unwrap();
        assert_eq!(
            register_catalog(&mut registry),
            Err(FilterError::DuplicateEntity(CARD.to_string()))
        );
    }

    #[test]
    fn test_card_relations() {
        let registry = catalog_registry().unwrap();
        let summary = registry.lookup_join(CARD, "summary").unwrap();
        assert_eq!(summary.cardinality, Cardinality::Many);
        assert_eq!(summary.target_entity, SUMMARY_CARD_USERS);
        let author = registry.lookup_join(CARD, "author_user").unwrap();
        assert_eq!(author.cardinality, Cardinality::One);
        assert_eq!(
            author.predicate.pairs,
            vec![("author".to_string(), "username".to_string())]
        );
    }

    #[test]
    fn test_state_only_on_summary() {
        let registry = catalog_registry().unwrap();
        let with_state: Vec<&str> = registry
            .entities()
            .filter(|e| e.has_key("state"))
            .map(|e| e.entity_code.as_str())
            .collect();
        assert_eq!(with_state, vec![SUMMARY_CARD_USERS]);
    }

    #[test]
    fn test_collection_enum_values() {
        let registry = catalog_registry().unwrap();
        let field = registry
            .lookup_field(CARD_USERS_STATS, "collection")
            .unwrap();
        assert_eq!(field.value_kind, card_collection());
        assert!(matches!(
            registry.lookup_field(CARD, "collection"),
            Err(FilterError::UnknownField { .. })
        ));
    }
}
