pub mod error;
pub mod param;
pub mod schedulers;
pub mod transforms;
pub mod utils;
pub mod visualize;
