//! Fixed attachment table of a pass

use crate::backend::{AttachmentSlot, TextureHandle};

/// One optional texture per [`AttachmentSlot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentTable {
    slots: [Option<TextureHandle>; AttachmentSlot::COUNT],
}

impl AttachmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a texture into a slot, returning whatever occupied it
    pub fn attach(
        &mut self,
        slot: AttachmentSlot,
        texture: TextureHandle,
    ) -> Option<TextureHandle> {
        self.slots[slot.index()].replace(texture)
    }

    /// Empty every slot holding `texture`, returning how many were cleared
    pub fn detach(&mut self, texture: TextureHandle) -> usize {
        let mut cleared = 0;
        for slot in self.slots.iter_mut() {
            if *slot == Some(texture) {
                *slot = None;
                cleared += 1;
            }
        }
        cleared
    }

    pub fn clear_slot(&mut self, slot: AttachmentSlot) -> Option<TextureHandle> {
        self.slots[slot.index()].take()
    }

    pub fn get(&self, slot: AttachmentSlot) -> Option<TextureHandle> {
        self.slots[slot.index()]
    }

    /// Every slot with its content, occupied or not
    pub fn entries(&self) -> impl Iterator<Item = (AttachmentSlot, Option<TextureHandle>)> + '_ {
        AttachmentSlot::ALL
            .iter()
            .map(|slot| (*slot, self.slots[slot.index()]))
    }

    /// Occupied slots
    pub fn occupied(&self) -> impl Iterator<Item = (AttachmentSlot, TextureHandle)> + '_ {
        self.entries()
            .filter_map(|(slot, texture)| texture.map(|texture| (slot, texture)))
    }

    /// Occupied colour slots below `limit`, in slot order
    pub fn color_slots(&self, limit: u32) -> Vec<AttachmentSlot> {
        self.occupied()
            .filter_map(|(slot, _)| slot.color_index().filter(|i| *i < limit).map(|_| slot))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
