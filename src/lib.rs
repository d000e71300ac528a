pub mod cli;
pub mod format;
pub mod image;
pub mod layout;
pub mod linker;
pub mod segment;
pub mod writer;

pub use linker::run;
