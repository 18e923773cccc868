//! Block-range planning. Pure: no I/O, no clock.

/// A contiguous block range `[from, to]` planned for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: u64,
    pub to: u64,
}

impl Window {
    /// Number of blocks covered; never zero by construction.
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }
}

/// Plan the next scan window for a chain.
///
/// The window starts right after the cursor and is capped both by
/// `max_block_range` and by the chain head. Returns `None` when the chain
/// is fully caught up (idle). The cursor only advances after the window
/// commits, so consecutive plans never rescan.
pub fn plan_window(last_processed_block: u64, latest_block: u64, max_block_range: u64) -> Option<Window> {
    let from = last_processed_block.checked_add(1)?;
    let to = std::cmp::min(
        from.saturating_add(max_block_range.saturating_sub(1)),
        latest_block,
    );

    if from > to {
        return None;
    }

    Some(Window { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caught_up_is_idle() {
        assert_eq!(plan_window(100, 100, 1_000), None);
        assert_eq!(plan_window(150, 100, 1_000), None);
    }

    #[test]
    fn test_one_block_behind_yields_single_block_window() {
        let w = plan_window(99, 100, 1_000).unwrap();
        assert_eq!(w, Window { from: 100, to: 100 });
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_window_capped_by_max_range() {
        let w = plan_window(0, 10_000, 1_000).unwrap();
        assert_eq!(w.from, 1);
        assert_eq!(w.to, 1_000);
        assert_eq!(w.len(), 1_000);
    }

    #[test]
    fn test_window_capped_by_chain_head() {
        // Fresh chain: cursor = starting_block - 1, head inside the range.
        let w = plan_window(69_999_999, 70_000_500, 1_000).unwrap();
        assert_eq!(w.from, 70_000_000);
        assert_eq!(w.to, 70_000_500);
        assert_eq!(w.len(), 501);
    }

    #[test]
    fn test_consecutive_windows_never_rescan() {
        let mut cursor = 0u64;
        let latest = 3_500u64;
        let mut previous_to = 0u64;

        while let Some(w) = plan_window(cursor, latest, 1_000) {
            assert_eq!(w.from, previous_to + 1);
            assert!(w.len() <= 1_000);
            assert!(w.to <= latest);
            previous_to = w.to;
            cursor = w.to;
        }

        assert_eq!(cursor, latest);
    }

    #[test]
    fn test_cursor_at_u64_max_is_idle() {
        assert_eq!(plan_window(u64::MAX, u64::MAX, 1_000), None);
    }
}
