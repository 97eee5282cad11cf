//! Value objects - Immutable objects defined by their attributes

mod field_value;
mod ids;
mod page;
mod tenant;

pub use field_value::FieldValue;
pub use ids::*;
pub use page::Page;
pub use tenant::Tenant;
