// Message types shared by the pools, the send channel and the node

/// What a message carries.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Cleared slot; never observed by a consumer.
    #[default]
    None = 0,
    /// User payload bound for the transport.
    Data = 1,
    /// Out-of-band event for the consumer itself (close, shutdown, ...).
    Control = 2,
}

/// A pooled message: a kind tag plus a reusable payload buffer.
///
/// The buffer is reserved once when the pool is built. Clearing keeps the
/// capacity, so refilling a slot does not allocate unless a payload outgrows
/// every earlier one.
#[derive(Clone, Debug, Default)]
pub struct Message {
    pub(crate) kind: Kind,
    pub(crate) payload: Vec<u8>,
}

impl Message {
    pub fn with_capacity(size: usize) -> Self {
        Self {
            kind: Kind::None,
            payload: Vec::with_capacity(size),
        }
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Replace the contents with `data`.
    pub fn fill(&mut self, kind: Kind, data: &[u8]) {
        self.kind = kind;
        self.payload.clear();
        self.payload.extend_from_slice(data);
    }

    pub fn clear(&mut self) {
        self.kind = Kind::None;
        self.payload.clear();
    }
}

/// Handle to one message slot of a [`MessagePool`](crate::MQ::pool::MessagePool).
///
/// `index` addresses the arena; `generation` changes every time the slot is
/// released, so a handle kept past its release is detected as expired.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub index: u32,
    pub generation: u32,
}
