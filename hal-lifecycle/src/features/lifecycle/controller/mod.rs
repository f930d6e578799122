pub mod host;
pub mod server;
pub mod server_group;

pub use host::HostActions;
pub use server::ServerActions;
pub use server_group::ServerGroupActions;

use hal_core::Message;
use tracing::warn;

use crate::shared::error::LifecycleError;
use crate::shared::events::EventBus;

/// Tell the user why an action did not start.
fn refuse(events: &EventBus, error: LifecycleError) -> LifecycleError {
    warn!(error = %error, "Lifecycle action refused");
    let text = match &error {
        LifecycleError::Precondition(text)
        | LifecycleError::Unsupported(text)
        | LifecycleError::InvalidRequest(text) => text.clone(),
        other => other.to_string(),
    };
    events.message(Message::warning(text));
    error
}
