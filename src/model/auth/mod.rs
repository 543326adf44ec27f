mod credential;
mod registry;
mod role;
mod session;

pub use credential::{HmacSha256, IdentityHash, IdentityHasher};
pub use registry::{SessionId, SessionRegistry};
pub use role::Role;
pub use session::{SessionState, Stage, Subject, SESSION_COOKIE};
