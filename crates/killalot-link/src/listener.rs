use killalot_protocol::DecodeListener;

use crate::error::LinkError;

/// Application callbacks for a link.
///
/// Decode callbacks come from [`DecodeListener`]. All callbacks are invoked
/// with the listener's mutex held, so they never run concurrently; calling
/// back into the same [`crate::TransportManager`] from a callback deadlocks.
pub trait LinkListener: DecodeListener + Send + 'static {
    /// The transport is connected and the pumps are about to start.
    fn on_connect_success(&mut self) {}

    /// A connection attempt failed.
    fn on_connect_failure(&mut self, _error: LinkError) {}

    /// The connector needs an OS-mediated step (e.g. enabling a radio)
    /// before it can connect.
    fn on_intent_request(&mut self, _intent: &str) {}

    /// A transport failure; the link disconnects right after.
    fn on_link_error(&mut self, _error: LinkError) {}

    /// A connected link was torn down.
    fn on_disconnect(&mut self) {}
}
