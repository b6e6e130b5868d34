mod config;
mod events;
mod fetch;
mod source;
mod transport;
mod util;

pub use config::*;
pub use events::*;
pub use fetch::*;
pub use source::*;
pub use transport::*;
pub use util::*;
