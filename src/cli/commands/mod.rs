mod config;
mod delete;
mod get;
mod insert;
mod search;
mod status;

pub use config::ConfigCommand;
pub use delete::DeleteArgs;
pub use get::GetArgs;
pub use insert::InsertArgs;
pub use search::SearchArgs;

pub use config::handle_config;
pub use delete::handle_delete;
pub use get::handle_get;
pub use insert::handle_insert;
pub use search::handle_search;
pub use status::handle_status;
