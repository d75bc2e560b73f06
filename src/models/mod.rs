pub mod attribute;
pub mod listing;

pub use attribute::*;
pub use listing::*;
