pub mod error;
pub mod graph;
pub mod user;

pub use error::KinshipError;
pub use graph::{IdPolicy, UserGraph};
pub use user::{NewUser, User};
