pub mod cache;
pub mod error;
pub mod filter;
pub mod fs;
pub mod metadata;
pub mod operations;
pub mod time;
