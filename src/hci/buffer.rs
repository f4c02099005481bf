use std::fmt::{Debug, Formatter};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ensure;
use crate::hci::{Error, Opcode};

/// Opcode (2 bytes) followed by the parameter length (1 byte)
/// ([Vol 4] Part E, Section 5.4.1).
pub const CMD_HDR: usize = 3;
pub const MAX_PARAMS_LEN: usize = u8::MAX as usize;

/// Scheduling class of a command buffer.
///
/// Control commands (reset, disconnect, ...) use [`Priority::High`] so that
/// they can still get a buffer while bulk traffic has exhausted the pool.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    #[default]
    Low,
    High,
}

impl Priority {
    pub(crate) const COUNT: usize = 2;

    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::High => 1,
        }
    }

    #[inline]
    pub(crate) const fn other(self) -> Self {
        match self {
            Priority::Low => Priority::High,
            Priority::High => Priority::Low,
        }
    }
}

/// Identifies the pool slot a buffer was handed out from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct BufferTag {
    pub pool: u64,
    pub slot: usize,
    pub generation: u32,
}

/// Byte buffer holding one framed HCI command packet.
///
/// Buffers usually come from a [`BufferPool`](crate::hci::pool::BufferPool);
/// a buffer created with [`CommandBuffer::new`] belongs to no pool.
#[derive(Clone)]
pub struct CommandBuffer {
    data: BytesMut,
    priority: Priority,
    opcode: Option<Opcode>,
    pub(crate) tag: Option<BufferTag>,
}

impl CommandBuffer {

    pub fn new(priority: Priority) -> Self {
        Self::with_capacity(priority, CMD_HDR + MAX_PARAMS_LEN)
    }

    pub(crate) fn with_capacity(priority: Priority, capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            priority,
            opcode: None,
            tag: None,
        }
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[inline]
    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// The opcode this buffer was prepared for, if any.
    #[inline]
    pub fn opcode(&self) -> Option<Opcode> {
        self.opcode
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub(crate) fn reserve(&mut self, capacity: usize) {
        if self.data.capacity() < capacity {
            self.data.reserve(capacity - self.data.len());
        }
    }

    /// Discards the content and forgets the opcode.
    pub fn clear(&mut self) {
        self.data.clear();
        self.opcode = None;
    }

    /// Starts a new command packet for `opcode`; parameters are appended with [`Self::params_mut`].
    pub fn begin(&mut self, opcode: Opcode) -> &mut Self {
        self.data.clear();
        self.data.put_slice(&opcode.to_le_bytes());
        self.data.put_u8(0); // Final length is set in finish()
        self.opcode = Some(opcode);
        self
    }

    /// Writer for the command parameters. Everything written here ends up after the header.
    pub fn params_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    /// Parameter bytes written so far.
    pub fn params(&self) -> &[u8] {
        self.data.get(CMD_HDR..).unwrap_or_default()
    }

    /// Number of parameter bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len().saturating_sub(CMD_HDR)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the parameter length into the header and returns the complete packet.
    pub fn finish(&mut self) -> Result<&[u8], Error> {
        ensure!(self.opcode.is_some() && self.data.len() >= CMD_HDR,
            Error::InvalidArgument("command buffer has no header"));
        let payload_len = u8::try_from(self.len()).map_err(|_| Error::PayloadTooLarge)?;
        self.data[CMD_HDR - 1] = payload_len;
        Ok(&self.data)
    }

}

impl Debug for CommandBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("opcode", &self.opcode)
            .field("priority", &self.priority)
            .field("params", &self.params())
            .finish()
    }
}

/// Cursor over the parameters of a received event.
#[derive(Default, Clone, Eq, PartialEq)]
pub struct ReceiveBuffer {
    data: Bytes,
}

impl ReceiveBuffer {

    pub fn from_payload(data: Bytes) -> Self {
        Self { data }
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        ensure!(self.data.has_remaining(), Error::Malformed);
        Ok(self.data.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        ensure!(self.data.remaining() >= 2, Error::Malformed);
        Ok(self.data.get_u16_le())
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        ensure!(self.data.remaining() >= N, Error::Malformed);
        let mut array = [0u8; N];
        self.data.copy_to_slice(&mut array);
        Ok(array)
    }

    pub fn bytes(&mut self, len: usize) -> Result<Bytes, Error> {
        ensure!(self.data.remaining() >= len, Error::Malformed);
        Ok(self.data.split_to(len))
    }

    /// Fails if there are unread bytes left.
    pub fn finish(&self) -> Result<(), Error> {
        ensure!(self.data.is_empty(), Error::Malformed);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}
