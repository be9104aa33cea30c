//! Core domain types for deckmix.

pub mod command;
pub mod deck;

pub use command::Command;
pub use deck::DeckId;
