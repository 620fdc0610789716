pub mod artifact;
pub mod core;
pub mod io;
pub mod vault;
pub mod watchers;
