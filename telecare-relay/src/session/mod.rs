mod registry;
mod session;

pub use registry::{JoinError, SessionRegistry};
pub use session::{Participant, Session};
