pub mod history;
pub mod idr;
pub mod schema;
pub mod tags;
pub mod users;

pub use history::HistoryIndex;
pub use idr::{IdrClient, IdrError};
pub use schema::RecordValidator;
pub use tags::TagMap;
pub use users::UserMap;
