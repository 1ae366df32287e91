//! Fixed-capacity per-instance transform buffers.

use glam::Mat4;
use std::ops::{Index, Range};

/// The four instanced draws of a clipmap frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKind {
    RingBlock,
    RingFixUp,
    InteriorTrim,
    InteriorBlock,
}

impl InstanceKind {
    pub const ALL: [InstanceKind; 4] = [
        InstanceKind::RingBlock,
        InstanceKind::RingFixUp,
        InstanceKind::InteriorTrim,
        InstanceKind::InteriorBlock,
    ];

    /// Slots needed for `levels` clipmap levels.
    pub fn capacity(self, levels: u32) -> usize {
        let rings = levels.saturating_sub(1) as usize;
        match self {
            InstanceKind::RingBlock => 12 * rings,
            InstanceKind::RingFixUp => 4 * rings,
            InstanceKind::InteriorTrim => 2 * rings,
            InstanceKind::InteriorBlock => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InstanceKind::RingBlock => "ring blocks",
            InstanceKind::RingFixUp => "ring fix-ups",
            InstanceKind::InteriorTrim => "interior trims",
            InstanceKind::InteriorBlock => "interior block",
        }
    }
}

/// Transforms written in place every frame; never reallocated.
///
/// Writes extend a dirty range so the backend only flushes modified slots.
/// `render_count` limits how many leading slots are drawn.
#[derive(Debug, Clone)]
pub struct InstanceBuffer {
    kind: InstanceKind,
    transforms: Vec<Mat4>,
    render_count: usize,
    dirty: Option<Range<usize>>,
}

impl InstanceBuffer {
    pub fn new(kind: InstanceKind, capacity: usize) -> Self {
        Self {
            kind,
            transforms: vec![Mat4::IDENTITY; capacity],
            render_count: 0,
            // Freshly allocated storage must be uploaded once.
            dirty: (capacity > 0).then_some(0..capacity),
        }
    }

    pub fn kind(&self) -> InstanceKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.transforms.len()
    }

    pub fn render_count(&self) -> usize {
        self.render_count
    }

    /// Clamped to capacity.
    pub fn set_render_count(&mut self, count: usize) {
        self.render_count = count.min(self.transforms.len());
    }

    pub fn set(&mut self, slot: usize, transform: Mat4) {
        self.transforms[slot] = transform;
        self.dirty = Some(match self.dirty.take() {
            Some(r) => r.start.min(slot)..r.end.max(slot + 1),
            None => slot..slot + 1,
        });
    }

    pub fn as_slice(&self) -> &[Mat4] {
        &self.transforms
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Returns and clears the modified slot range.
    pub fn take_dirty(&mut self) -> Option<Range<usize>> {
        self.dirty.take()
    }
}

impl Index<usize> for InstanceBuffer {
    type Output = Mat4;

    fn index(&self, slot: usize) -> &Mat4 {
        &self.transforms[slot]
    }
}
