use std::fmt;

use whack_domain::XskError;

/// Where a frame currently lives. Every frame is in exactly one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Free,
    InFillQueue,
    OwnedByKernelRx,
    OwnedByApp,
    QueuedForTx,
    InCompletionQueue,
}

impl FrameState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameState::Free => "free",
            FrameState::InFillQueue => "in_fill_queue",
            FrameState::OwnedByKernelRx => "owned_by_kernel_rx",
            FrameState::OwnedByApp => "owned_by_app",
            FrameState::QueuedForTx => "queued_for_tx",
            FrameState::InCompletionQueue => "in_completion_queue",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exclusive ownership of one frame by the application.
///
/// Not `Clone`: a handle is consumed by `recycle` or `transmit`, so a frame
/// cannot be handed back to the kernel twice.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameHandle {
    index: u32,
}

impl FrameHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self { index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// A received frame: the handle plus where the packet sits inside it.
#[derive(Debug)]
pub struct RxFrame {
    pub handle: FrameHandle,
    pub offset: usize,
    pub len: usize,
}

/// Number of frames in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounts {
    pub free: u32,
    pub in_fill_queue: u32,
    pub owned_by_kernel_rx: u32,
    pub owned_by_app: u32,
    pub queued_for_tx: u32,
    pub in_completion_queue: u32,
}

impl FrameCounts {
    pub fn total(&self) -> u32 {
        self.free
            + self.in_fill_queue
            + self.owned_by_kernel_rx
            + self.owned_by_app
            + self.queued_for_tx
            + self.in_completion_queue
    }
}

/// Per-frame state table with a stack of free indices.
#[derive(Debug)]
pub(crate) struct FrameTracker {
    states: Vec<FrameState>,
    counts: [u32; 6],
    free: Vec<u32>,
}

impl FrameTracker {
    pub fn new(num_frames: u32) -> Self {
        let mut counts = [0; 6];
        counts[FrameState::Free.slot()] = num_frames;
        Self {
            states: vec![FrameState::Free; num_frames as usize],
            counts,
            // Popped from the back, so frame 0 goes out first.
            free: (0..num_frames).rev().collect(),
        }
    }

    pub fn state(&self, index: u32) -> Option<FrameState> {
        self.states.get(index as usize).copied()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Moves `index` to `to` if it is currently in one of `from`.
    ///
    /// `Free` frames leave only through [`Self::take_free`].
    pub fn transition(
        &mut self,
        index: u32,
        from: &[FrameState],
        to: FrameState,
    ) -> Result<FrameState, XskError> {
        let current = self.state(index).ok_or(XskError::InvalidFrame {
            index,
            state: "out_of_range",
        })?;
        if current == FrameState::Free || !from.contains(&current) {
            return Err(XskError::InvalidFrame {
                index,
                state: current.as_str(),
            });
        }
        self.set(index, current, to);
        Ok(current)
    }

    /// Pops a free frame and moves it to `to`.
    pub fn take_free(&mut self, to: FrameState) -> Option<u32> {
        let index = self.free.pop()?;
        self.set(index, FrameState::Free, to);
        Some(index)
    }

    fn set(&mut self, index: u32, from: FrameState, to: FrameState) {
        self.states[index as usize] = to;
        self.counts[from.slot()] -= 1;
        self.counts[to.slot()] += 1;
        if to == FrameState::Free {
            self.free.push(index);
        }
    }

    pub fn count(&self, state: FrameState) -> u32 {
        self.counts[state.slot()]
    }

    pub fn counts(&self) -> FrameCounts {
        FrameCounts {
            free: self.count(FrameState::Free),
            in_fill_queue: self.count(FrameState::InFillQueue),
            owned_by_kernel_rx: self.count(FrameState::OwnedByKernelRx),
            owned_by_app: self.count(FrameState::OwnedByApp),
            queued_for_tx: self.count(FrameState::QueuedForTx),
            in_completion_queue: self.count(FrameState::InCompletionQueue),
        }
    }
}
