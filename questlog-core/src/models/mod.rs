mod session;
mod task;
mod user;

pub use session::*;
pub use task::*;
pub use user::*;
