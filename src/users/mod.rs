pub mod service;

pub use service::{AuthError, UserService};
