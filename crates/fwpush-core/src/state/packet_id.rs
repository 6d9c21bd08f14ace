//! Packet identifier allocation.

use std::fmt;
use std::num::NonZeroU16;

/// Non-zero 16-bit packet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(NonZeroU16);

impl PacketId {
    pub fn get(self) -> u16 {
        self.0.get()
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wrapping packet identifier counter owned by one session.
///
/// Identifiers run 1, 2, ..., 65535, 1, ...; zero is never issued.
#[derive(Debug, Default, Clone)]
pub struct PacketIdAllocator {
    last: Option<NonZeroU16>,
}

impl PacketIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a counter whose last issued identifier was `last` (0 = none yet).
    #[cfg(test)]
    pub(crate) fn resume_after(last: u16) -> Self {
        Self {
            last: NonZeroU16::new(last),
        }
    }

    pub fn next_id(&mut self) -> PacketId {
        let next = self
            .last
            .and_then(|id| id.checked_add(1))
            .unwrap_or(NonZeroU16::MIN);
        self.last = Some(next);
        PacketId(next)
    }
}
