mod location;
mod scope;
mod symbol;

pub use location::{Location, Rank};
pub use scope::Scope;
pub use symbol::{ParseError, Symbol, SymbolName};
