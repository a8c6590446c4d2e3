//! Delivery coordination: persist first, then try a live push.
//!
//! The mailbox write is the only step that can fail a send. Once the row
//! exists the message is safe; the live push is an optimization that, on
//! success, lets the row be purged immediately.

use ripple_realtime::event::SocketEvent;
use ripple_realtime::hub::HubHandle;
use tracing::{debug, instrument, warn};

use crate::mailbox::{MailboxError, Message, MessageCreate, MessageMailbox};

/// Where a message ended up after the send call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pushed to the receiver's live connection; the mailbox row is purged.
    DeliveredLive,
    /// Receiver unreachable; the row stays parked for a later pull.
    Parked,
}

#[derive(Clone)]
pub struct DeliveryCoordinator {
    mailbox: MessageMailbox,
    hub: HubHandle,
}

impl DeliveryCoordinator {
    pub fn new(mailbox: MessageMailbox, hub: HubHandle) -> Self {
        Self { mailbox, hub }
    }

    /// Persist the message and attempt a live push to its receiver.
    ///
    /// The returned message is valid whatever the outcome: once the
    /// mailbox accepted it, the send has succeeded for the sender.
    #[instrument(skip(self, create), fields(sender = create.sender_id, receiver = create.receiver_id))]
    pub async fn send(
        &self,
        create: MessageCreate,
    ) -> Result<(Message, DeliveryOutcome), MailboxError> {
        let message = self.mailbox.create(create).await?;

        let frame = match SocketEvent::message(&message).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, message_id = message.id, "event encoding failed, message parked");
                return Ok((message, DeliveryOutcome::Parked));
            }
        };

        let delivered = match self.hub.direct_send(message.receiver_id, frame).await {
            Ok(outcome) => outcome.is_delivered(),
            Err(e) => {
                warn!(error = %e, message_id = message.id, "hub unavailable, message parked");
                false
            }
        };
        if !delivered {
            debug!(message_id = message.id, "receiver offline, message parked");
            return Ok((message, DeliveryOutcome::Parked));
        }

        // The frame is already on the receiver's queue; failing to purge
        // the row means at worst a duplicate on the next pull, not a
        // failed send.
        if let Err(e) = self.mailbox.delete(message.id).await {
            warn!(error = %e, message_id = message.id, "failed to purge live-delivered message");
        }

        Ok((message, DeliveryOutcome::DeliveredLive))
    }
}
