//! Domain entities exposed to the filter engine
//!
//! - `catalog` - Animestars card catalog (cards, summaries, stats, decks, users)

pub mod catalog;

pub use catalog::{catalog_registry, register_catalog};
