//! Session lifecycle
//!
//! [`SessionLock`] arbitrates between concurrent invocations and
//! [`SessionCoordinator`] drives one invocation from start to shutdown.

mod coordinator;
mod lock;

pub use coordinator::{SessionCoordinator, SessionDirective};
pub use lock::{ExclusiveClaim, SessionLock, SharedClaim, StartupGuard};
