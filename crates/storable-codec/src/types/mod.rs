//! Property values, descriptors and state.
//!
//! These are the types exchanged with the schema-introspection layer: an ordered
//! [`PropertySchema`], the [`Value`]s flowing through the codecs, and the
//! [`PropertyStates`] bitmap consulted by serial encoding.

mod property;
mod state;
mod value;

pub use property::{
    Adapter, Direction, LogicalType, PropertyDescriptor, PropertySchema, PropertySchemaBuilder,
};
pub use state::{PropertyState, PropertyStates, STATES_PER_BYTE, STATES_PER_WORD};
pub use value::{LobLocator, Value};
