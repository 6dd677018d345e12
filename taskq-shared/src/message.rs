/// Raw payload bytes threaded through a pipeline.
pub type Payload = Vec<u8>;

/// A single item popped from the work queue.
///
/// Only the channel it came from and its opaque payload are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: Payload,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consume the message, keeping only its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}
