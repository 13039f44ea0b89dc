//! Broadcast channel carrying forwarder events to any number of subscribers.

use forwarder_types::ForwarderEvent;
use tokio::sync::broadcast;

/// Event bus shared by the engine and its observers.
///
/// Publishing never blocks. Subscribers that fall more than `capacity`
/// events behind observe a lag error and skip ahead.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ForwarderEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes `event` to current subscribers.
	///
	/// Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: ForwarderEvent,
	) -> Result<(), broadcast::error::SendError<ForwarderEvent>> {
		self.sender.send(event).map(|_| ())
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ForwarderEvent> {
		self.sender.subscribe()
	}
}
