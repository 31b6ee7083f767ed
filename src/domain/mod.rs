pub mod media;
pub mod tree;
