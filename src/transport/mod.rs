/// Local filesystem transport.
pub mod fs;

pub use fs::{FileSystem, LocalFileSystem};
