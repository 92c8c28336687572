use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::channel::{ChannelDeps, ChannelOptions, RoomChannel};
use crate::room::RoomId;
use crate::session::SessionManager;

/// Shows one room at a time.
///
/// All channels opened here share one epoch, so switching rooms retires the
/// previous channel before the next one starts, and anything the old room
/// still had in flight is discarded.
pub struct RoomView {
    session: Arc<SessionManager>,
    deps: ChannelDeps,
    options: ChannelOptions,
    epoch: Arc<AtomicU64>,
    current: Option<RoomChannel>,
}

impl RoomView {
    pub fn new(session: Arc<SessionManager>, deps: ChannelDeps, options: ChannelOptions) -> Self {
        Self {
            session,
            deps,
            options,
            epoch: Arc::new(AtomicU64::new(0)),
            current: None,
        }
    }

    /// Show `room_id` with the session's current credential.
    ///
    /// The live channel is kept if it is for the same room and credential and
    /// has not ended. Otherwise it is closed and a new one is opened.
    pub fn show(&mut self, room_id: impl Into<RoomId>) -> &RoomChannel {
        let room_id = room_id.into();
        let credential = self.session.credential();

        let reusable = self.current.as_ref().is_some_and(|channel| {
            channel.room_id() == &room_id
                && channel.credential() == credential.as_ref()
                && !channel.status().is_terminal()
        });

        match self.current.take() {
            Some(channel) if reusable => self.current.insert(channel),
            previous => {
                if let Some(mut previous) = previous {
                    tracing::debug!(from = %previous.room_id(), to = %room_id, "Switching room");
                    previous.close();
                }
                let channel = RoomChannel::open_in_epoch(
                    &self.deps,
                    room_id,
                    credential,
                    self.options.clone(),
                    self.epoch.clone(),
                );
                self.current.insert(channel)
            }
        }
    }

    /// Re-show the current room, picking up a session change or reopening a
    /// channel that has closed or failed.
    pub fn refresh(&mut self) -> Option<&RoomChannel> {
        let room_id = self.current.as_ref()?.room_id().clone();
        Some(self.show(room_id))
    }

    /// Close the current channel, if any.
    pub fn hide(&mut self) {
        if let Some(mut channel) = self.current.take() {
            channel.close();
        }
    }

    pub fn current(&self) -> Option<&RoomChannel> {
        self.current.as_ref()
    }
}
