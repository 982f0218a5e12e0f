//! Variable store, typing, and `${...}` reference resolution
//!
//! Variables come from four sources, weakest first: predefined layout
//! variables, `bootstrap.properties`, `server.env`, and `<variable>`
//! declarations collected across the configuration graph. The store is
//! ephemeral: build one per resolution request and discard it.

mod resolver;
mod store;
mod types;

pub use resolver::{
    OperandError, Resolution, UndefinedRef, contains_reference, referenced_names, resolve,
};
pub use store::{DocumentLocation, LocalStore, PREDEFINED_VARS, VariableLookup, VariableStore};
pub use types::VariableType;
