//! Recent-block window anchoring approval freshness.
//!
//! Every signed request embeds the hash of a recently sealed block; replays
//! age out of the window after `LOOK_BACK_LENGTH` further blocks.

use std::collections::VecDeque;

use crate::constants::LOOK_BACK_LENGTH;

/// Hashes of the most recently sealed blocks, oldest first.
#[derive(Debug, Clone, Default)]
pub struct BlockWindow {
    height: u64,
    recent: VecDeque<[u8; 32]>,
}

impl BlockWindow {
    pub fn new() -> Self {
        BlockWindow::default()
    }

    /// Record the hash of the block sealed at the next height.
    pub fn seal(&mut self, hash: [u8; 32]) {
        self.height += 1;
        self.recent.push_back(hash);
        while self.recent.len() > LOOK_BACK_LENGTH {
            self.recent.pop_front();
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// True when `hash` identifies a block inside the look-back window.
    pub fn is_recent(&self, hash: &[u8; 32]) -> bool {
        self.recent.iter().any(|recent| recent == hash)
    }

    pub(crate) fn recent_hashes(&self) -> impl Iterator<Item = &[u8; 32]> {
        self.recent.iter()
    }

    pub(crate) fn restore(height: u64, recent: Vec<[u8; 32]>) -> Self {
        let mut window = BlockWindow { height, recent: recent.into() };
        while window.recent.len() > LOOK_BACK_LENGTH {
            window.recent.pop_front();
        }
        window
    }
}
