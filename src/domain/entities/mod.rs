//! Domain entities - the generic record and its typed facades

mod army;
mod character;
mod envelope;
mod faction;
mod record;
mod typed;
mod world;

pub use army::Army;
pub use character::Character;
pub use envelope::Envelope;
pub use faction::Faction;
pub use record::EntityRecord;
pub use typed::TypedEntity;
pub use world::World;
