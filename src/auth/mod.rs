pub mod authentication;
pub mod context;
pub mod password;
pub mod permissions;
pub mod token;
pub mod user;

pub use authentication::*;
pub use context::*;
pub use password::*;
pub use permissions::*;
pub use token::*;
pub use user::*;
