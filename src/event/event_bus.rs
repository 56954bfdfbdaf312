// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event bus shared by all controllers of a registry.

use tokio::sync::broadcast;

use super::BridgeEvent;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcasts [`BridgeEvent`]s to any number of subscribers.
///
/// Subscribers that fall more than the channel capacity behind receive
/// `RecvError::Lagged` and lose the oldest events. Publishing never blocks
/// and never fails, so controllers are not affected by slow observers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Creates a bus with the default capacity (256 events).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event; dropped silently when nobody listens.
    pub fn publish(&self, event: BridgeEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
