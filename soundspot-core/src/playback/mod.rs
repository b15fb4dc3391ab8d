mod backend;
mod session;

#[cfg(test)]
mod testing;

pub use backend::*;
pub use session::*;
