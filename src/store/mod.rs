//! Store Module
//!
//! Generic cache engine that mirrors one resource prefix of the backing
//! store in memory and keeps it reconciled through a watch.

mod codec;
mod generic;
mod list;
mod options;
mod registry;
mod stats;
mod validate;


// Re-export public types
pub use codec::ObjectCodec;
pub use generic::{GenericStore, StoreState};
pub use list::{paginate, Comparator, Formatter, ListInput, ListOutput, Predicate};
pub use options::{Clock, KeyFunc, StoreOptions, DEFAULT_INIT_TIMEOUT};
pub use registry::{ManagedStore, ReinitHandle, ReinitRegistry, StoreHub};
pub use stats::{StoreStats, StoreStatsSnapshot};
pub use validate::{StockCheck, Validator};

// == Public Constants ==
/// Separator between the base path and the logical key
pub const PATH_SEPARATOR: char = '/';
