//! The relay ("bouncer") role.

mod coordinator;

pub use coordinator::{RelayCoordinator, RelayEvent};
