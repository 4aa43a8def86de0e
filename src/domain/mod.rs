//! Domain layer - Price feed value types.
//!
//! Pure data: symbols, the symbol mapping, ticks and cached prices.
//! No I/O and no async here (hexagonal architecture inner ring).

pub mod price;
pub mod symbol;

pub use price::{PriceTick, PriceUpdate, Provider};
pub use symbol::{InternalSymbol, ProviderSymbol, SymbolMap};
