//! Splits one multi-animal recording into two per-subject files.
//!
//! All channels start on the left. Channels can be moved between the sides
//! or excluded from both; on save each side becomes its own EDF file next
//! to the source.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{RatatError, Result};
use crate::paths::split_path;
use crate::recording::Recording;

pub const DEFAULT_LEFT_SUFFIX: &str = "_1";
pub const DEFAULT_RIGHT_SUFFIX: &str = "_2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

pub struct ChannelSplitter {
    source: PathBuf,
    recording: Recording,
    left: Vec<String>,
    right: Vec<String>,
}

impl ChannelSplitter {
    pub fn open<P: AsRef<Path>>(source: P) -> Result<Self> {
        let recording = Recording::load(source.as_ref())?;
        Ok(Self::new(source, recording))
    }

    pub fn new<P: AsRef<Path>>(source: P, recording: Recording) -> Self {
        ChannelSplitter {
            source: source.as_ref().to_path_buf(),
            left: recording.ch_names().to_vec(),
            right: Vec::new(),
            recording,
        }
    }

    pub fn left(&self) -> &[String] {
        &self.left
    }

    pub fn right(&self) -> &[String] {
        &self.right
    }

    pub fn side(&self, side: Side) -> &[String] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Channels on neither side.
    pub fn excluded(&self) -> Vec<&str> {
        self.recording
            .ch_names()
            .iter()
            .filter(|c| !self.left.contains(c) && !self.right.contains(c))
            .map(String::as_str)
            .collect()
    }

    /// Keeps the first `len / 2` left channels and appends the rest to
    /// the right side, in order.
    pub fn auto_split_even(&mut self) {
        let tail = self.left.split_off(self.left.len() / 2);
        self.right.extend(tail);
        debug_assert!(self.is_disjoint());
    }

    /// Moves `selected` from one side to the other. Every selected name has
    /// to be on `from`; the destination keeps its order and the moved
    /// channels are appended in the order given.
    pub fn move_channels<S: AsRef<str>>(&mut self, selected: &[S], from: Side, to: Side) -> Result<()> {
        let source = self.side(from);
        let missing = selected.iter().map(|s| s.as_ref()).find(|&s: &&str| !source.iter().any(|c| c == s));
        if let Some(missing) = missing {
            return Err(RatatError::InvalidSelection(format!("{missing} is not on the {from:?} side")));
        }
        if from == to {
            return Ok(());
        }

        let moved: Vec<String> = selected.iter().map(|s| s.as_ref().to_string()).collect();
        let (src, dst) = match from {
            Side::Left => (&mut self.left, &mut self.right),
            Side::Right => (&mut self.right, &mut self.left),
        };
        src.retain(|c| !moved.contains(c));
        for name in moved {
            if !dst.contains(&name) {
                dst.push(name);
            }
        }
        Ok(())
    }

    /// Takes channels off both sides.
    pub fn exclude<S: AsRef<str>>(&mut self, names: &[S]) {
        let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.left.retain(|c| !names.contains(&c.as_str()));
        self.right.retain(|c| !names.contains(&c.as_str()));
    }

    fn is_disjoint(&self) -> bool {
        self.left.iter().all(|c| !self.right.contains(c))
    }

    /// Target paths for the two suffixes, rejected when they coincide.
    /// Creates nothing beyond the source directory.
    pub fn output_paths(&self, left_suffix: &str, right_suffix: &str) -> Result<(PathBuf, PathBuf)> {
        let left = split_path(&self.source, left_suffix)?;
        let right = split_path(&self.source, right_suffix)?;
        if left == right {
            return Err(RatatError::NameCollision(left));
        }
        Ok((left, right))
    }

    /// Writes `<stem><left_suffix>.edf` and `<stem><right_suffix>.edf`,
    /// each holding only its side's channels, overwriting existing files.
    ///
    /// # Errors
    ///
    /// `NameCollision` and `InvalidSelection` (an empty side) are raised
    /// before anything is written. When the left file was written but the
    /// right one failed, `PartialExport` names both paths; the left file is
    /// left in place.
    pub fn save(&self, left_suffix: &str, right_suffix: &str) -> Result<(PathBuf, PathBuf)> {
        let (left_path, right_path) = self.output_paths(left_suffix, right_suffix)?;
        if self.left.is_empty() || self.right.is_empty() {
            return Err(RatatError::InvalidSelection(
                "both sides need at least one channel".to_string(),
            ));
        }

        let left = self.recording.pick_channels(&self.left)?;
        let right = self.recording.pick_channels(&self.right)?;

        left.export(&left_path, true)?;
        if let Err(e) = right.export(&right_path, true) {
            warn!(written = %left_path.display(), failed = %right_path.display(), "split export incomplete");
            return Err(RatatError::PartialExport {
                written: left_path,
                failed: right_path,
                reason: e.to_string(),
            });
        }

        info!(left = %left_path.display(), right = %right_path.display(), "created split files");
        Ok((left_path, right_path))
    }
}
