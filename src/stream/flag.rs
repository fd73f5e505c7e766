//! Edge-triggered boolean with read-and-clear semantics.

/// A one-shot event flag.
///
/// `raise` arms the flag; `take` reads and clears it, so each raised
/// episode is observed by exactly one reader. Re-raising before the flag
/// is taken coalesces into a single observation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFlag {
    raised: bool,
}

impl EdgeFlag {
    /// Arm the flag.
    pub fn raise(&mut self) {
        self.raised = true;
    }

    /// Read and clear the flag.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.raised)
    }

    /// Peek without clearing.
    pub fn is_raised(&self) -> bool {
        self.raised
    }
}
