pub mod config;
pub mod legacy;
pub mod record;

pub use config::{Config, DataPaths, IdrSettings};
pub use legacy::LegacyRecord;
pub use record::RecordState;
