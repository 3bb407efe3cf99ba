use thiserror::Error;

/// Failures of the zero-copy socket and its frame arena.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XskError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Frame arena allocation failed: {0}")]
    ArenaAllocation(String),

    #[error("UMEM registration failed: {0}")]
    UmemCreate(String),

    #[error("AF_XDP socket creation failed: {0}")]
    SocketCreate(String),

    #[error("TX ring full")]
    RingFull,

    #[error("Frame {index} is {state}, operation not permitted")]
    InvalidFrame { index: u32, state: &'static str },

    #[error("Frame access out of bounds: offset {offset} + len {len} > frame size {frame_size}")]
    FrameOutOfBounds {
        offset: usize,
        len: usize,
        frame_size: usize,
    },

    #[error("Socket is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),
}

impl XskError {
    /// True for conditions the event loop absorbs (retry or drop) instead of aborting.
    pub fn is_transient(&self) -> bool {
        matches!(self, XskError::RingFull)
    }
}

/// Failures of the DNS wire codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid label: {0:?}")]
    InvalidLabel(String),

    #[error("Domain name too long: {0} bytes")]
    NameTooLong(usize),

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Message too short: {0} bytes")]
    TooShort(usize),

    #[error("Upstream reported failure (RCODE {rcode})")]
    UpstreamError { rcode: u8 },

    #[error("Malformed message: {0}")]
    Malformed(&'static str),
}
