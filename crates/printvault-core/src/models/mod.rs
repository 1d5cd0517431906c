pub mod collection;
pub mod file;
pub mod job;
pub mod slicer;
pub mod source;
pub mod tag;
