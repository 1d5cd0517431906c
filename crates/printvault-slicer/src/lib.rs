pub mod cleanup;
pub mod profiles;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod transfer;
