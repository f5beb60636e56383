mod admin;
mod query;
mod types;

pub use admin::get_search_status;
pub use query::{list_documents, search};
