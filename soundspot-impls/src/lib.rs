mod backends;

pub use backends::*;
