pub mod config;
pub mod error;
pub mod events;
pub mod ports;
pub mod types;

pub use config::EzraConfig;
pub use error::{EzraError, Result};
pub use events::SessionEvent;
pub use ports::{FileSource, InMemoryNotesStore, NotesStore, StaticFileSource};
pub use types::*;
