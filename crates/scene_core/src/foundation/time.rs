//! Frame counting
//!
//! The scene core is frame-stepped. Hierarchy facets stamp themselves with
//! the current frame so a parent shared by several dirty children is
//! rebuilt once per frame.

/// Monotonic frame counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameClock {
    frame: u64,
}

impl FrameClock {
    /// Create a clock at frame zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current frame number
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Step to the next frame and return its number
    pub fn advance(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_advances() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.frame(), 0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(clock.frame(), 2);
    }
}
