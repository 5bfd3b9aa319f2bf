pub mod conversation;
pub mod like;
pub mod message;
pub mod presence;
pub mod user;

pub use conversation::*;
pub use like::*;
pub use message::*;
pub use presence::*;
pub use user::*;
