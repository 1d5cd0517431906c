pub mod hasher;
pub mod ingest;
pub mod organize;
pub mod scan;
