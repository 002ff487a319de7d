// HTTP routes
pub mod analysis;
pub mod health;
pub mod records;
pub mod tasks;

pub use analysis::*;
pub use health::*;
pub use records::*;
pub use tasks::*;
