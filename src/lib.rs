pub mod config;
pub mod error;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod process;
pub mod store;
