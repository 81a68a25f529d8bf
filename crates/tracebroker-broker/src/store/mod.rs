pub mod registry;
pub mod session;

pub use registry::{AttachOutcome, AuthFn, SessionStore, StoreConfig};
pub use session::{PeerHandle, SessionState};
