mod channel;
mod events;
mod sqlite;
mod store;

pub use channel::*;
pub use events::*;
pub use sqlite::*;
pub use store::*;
