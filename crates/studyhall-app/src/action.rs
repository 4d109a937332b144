//! Application side-effects and intents.
//!
//! [`AppAction`] is what the [`crate::App`] state machine asks the runtime to
//! do. [`TransportCommand`] is what the [`crate::Bridge`] asks the driver to
//! do with the socket.

use studyhall_core::TransportRequest;
use studyhall_proto::Frame;

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the view.
    Render,

    /// Quit the application.
    Quit,

    /// Connect to the session's group.
    Connect,

    /// Leave the group.
    Disconnect,

    /// Load the group's chat history.
    FetchHistory,

    /// Publish a chat message.
    SendChat {
        /// Message text, already trimmed.
        content: String,
    },

    /// Announce a video call to the group.
    StartCall,

    /// Open the shared video-call room.
    OpenCall {
        /// Call room URL.
        url: String,
    },
}

/// Socket work for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Open a WebSocket, replacing any previous one.
    Open(TransportRequest),

    /// Send a STOMP frame.
    Send(Frame),

    /// Send a heart-beat.
    Heartbeat,

    /// Close the current socket.
    Close,
}
