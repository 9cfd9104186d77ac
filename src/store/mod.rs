mod actions;
mod schema;
mod store;
mod users;

pub use actions::*;
pub use schema::*;
pub use store::*;
pub use users::*;
