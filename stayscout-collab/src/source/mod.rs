mod airbnb;

pub use airbnb::*;
