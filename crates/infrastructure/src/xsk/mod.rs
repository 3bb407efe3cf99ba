//! AF_XDP socket: UMEM frame arena, the four shared rings, and per-frame
//! ownership tracking.

pub mod arena;
pub mod frame;
mod ring;
pub mod socket;
pub mod stats;
pub(crate) mod sys;

#[cfg(test)]
pub(crate) mod loopback;

pub use arena::FrameArena;
pub use frame::{FrameCounts, FrameHandle, FrameState, RxFrame};
pub use socket::{RxBatch, TxRejected, XskSocket};
pub use stats::XskStats;
