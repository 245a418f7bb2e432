pub mod dependencies;
pub mod semester;
pub mod tables;
pub mod types;

pub use dependencies::*;
pub use semester::*;
pub use tables::*;
pub use types::*;
