pub mod config_manager;
pub mod error;
pub mod records;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use records::*;
pub use types::*;
