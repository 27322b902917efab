pub mod convert;
pub mod error;
pub mod job;
pub mod params;
pub mod process;
pub mod progress;
pub mod retry;
pub mod scope;
pub mod status;
pub mod terminal;
pub mod types;
