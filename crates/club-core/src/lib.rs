// Core data model for the club exporter: normalization, storage, export text
// and the messages the extension contexts exchange.

pub mod export;
pub mod normalize;
pub mod player;
pub mod protocol;
pub mod store;

pub use normalize::normalize;
pub use player::{EvolutionAttributes, PlayerRecord};
pub use store::PlayerStore;
