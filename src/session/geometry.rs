//! Terminal geometry tracking
//!
//! Renderers report their size on every layout pass. Only real changes are
//! forwarded as window-change requests.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TerminalGeometry {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

#[derive(Default)]
pub struct TerminalSizeTracker {
    last: Mutex<Option<TerminalGeometry>>,
}

impl TerminalSizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reported size. Returns the new geometry when it differs from
    /// the stored one; zero-sized reports are ignored.
    pub fn report(&self, cols: u16, rows: u16) -> Option<TerminalGeometry> {
        if cols == 0 || rows == 0 {
            warn!("Ignoring invalid terminal size {}x{}", cols, rows);
            return None;
        }

        let geometry = TerminalGeometry { cols, rows };
        let mut last = self.last.lock();
        if *last == Some(geometry) {
            return None;
        }
        debug!("Terminal geometry now {}x{}", cols, rows);
        *last = Some(geometry);
        Some(geometry)
    }

    /// Size to request when opening a PTY
    pub fn current(&self) -> TerminalGeometry {
        self.last.lock().unwrap_or_default()
    }
}
