//! Three-layer stacking order.
//!
//! Each screen keeps its frame handles in three ordered lists: always on
//! top, normal and always at bottom, each ordered front (topmost) to back.
//! Raise and lower only ever move a handle within the list it is already
//! in; moving between layers is a separate, explicit operation.

use std::collections::VecDeque;

use crate::registry::Handle;
use crate::window::Layer;

/// Where a handle lands when it enters a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Front,
    Back,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stacking {
    on_top: VecDeque<Handle>,
    normal: VecDeque<Handle>,
    at_bottom: VecDeque<Handle>,
}

impl Stacking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, layer: Layer) -> &VecDeque<Handle> {
        match layer {
            Layer::OnTop => &self.on_top,
            Layer::Normal => &self.normal,
            Layer::AtBottom => &self.at_bottom,
        }
    }

    fn list_mut(&mut self, layer: Layer) -> &mut VecDeque<Handle> {
        match layer {
            Layer::OnTop => &mut self.on_top,
            Layer::Normal => &mut self.normal,
            Layer::AtBottom => &mut self.at_bottom,
        }
    }

    /// The layer currently holding `handle`.
    pub fn layer_of(&self, handle: Handle) -> Option<Layer> {
        [Layer::OnTop, Layer::Normal, Layer::AtBottom]
            .into_iter()
            .find(|&l| self.list(l).contains(&handle))
    }

    /// How many times `handle` appears across all layers.
    pub fn occurrences(&self, handle: Handle) -> usize {
        self.iter().filter(|&h| h == handle).count()
    }

    /// Add a new handle to `layer`. A handle already stacked elsewhere is
    /// moved.
    pub fn insert(&mut self, handle: Handle, layer: Layer, at: Position) {
        self.remove(handle);
        let list = self.list_mut(layer);
        match at {
            Position::Front => list.push_front(handle),
            Position::Back => list.push_back(handle),
        }
    }

    /// Remove `handle` from whichever layer holds it.
    pub fn remove(&mut self, handle: Handle) -> Option<Layer> {
        let layer = self.layer_of(handle)?;
        self.list_mut(layer).retain(|&h| h != handle);
        Some(layer)
    }

    fn move_within(&mut self, handle: Handle, at: Position) -> bool {
        let Some(layer) = self.layer_of(handle) else {
            return false;
        };
        self.insert(handle, layer, at);
        true
    }

    /// Move `handle` to the front of its own layer.
    pub fn raise(&mut self, handle: Handle) -> bool {
        self.move_within(handle, Position::Front)
    }

    /// Move `handle` to the back of its own layer.
    pub fn lower(&mut self, handle: Handle) -> bool {
        self.move_within(handle, Position::Back)
    }

    /// Raise `owner`, then bring each transient to the front of its own
    /// layer in list order, so the last one ends up topmost.
    pub fn raise_group(&mut self, owner: Handle, transients: &[Handle]) -> bool {
        if !self.raise(owner) {
            return false;
        }
        for &t in transients {
            self.raise(t);
        }
        true
    }

    /// Transfer `handle` into `layer`. Returns false for unknown handles.
    pub fn set_layer(&mut self, handle: Handle, layer: Layer, at: Position) -> bool {
        if self.layer_of(handle).is_none() {
            return false;
        }
        self.insert(handle, layer, at);
        true
    }

    /// All stacked handles, topmost first.
    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.on_top
            .iter()
            .chain(self.normal.iter())
            .chain(self.at_bottom.iter())
            .copied()
    }

    /// Physical stacking order: the pinned handles (screen edge strips)
    /// first, then the three layers.
    pub fn order(&self, pinned: &[Handle]) -> Vec<Handle> {
        pinned
            .iter()
            .copied()
            .filter(|h| !h.is_none())
            .chain(self.iter())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.on_top.len() + self.normal.len() + self.at_bottom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn h(n: u32) -> Handle {
        Handle(n)
    }

    fn stack(on_top: &[u32], normal: &[u32], at_bottom: &[u32]) -> Stacking {
        let mut s = Stacking::new();
        for (layer, list) in [
            (Layer::OnTop, on_top),
            (Layer::Normal, normal),
            (Layer::AtBottom, at_bottom),
        ] {
            for &n in list {
                s.insert(h(n), layer, Position::Back);
            }
        }
        s
    }

    #[test]
    fn test_raise_stays_in_layer() {
        let mut s = stack(&[1], &[2, 3, 4], &[5]);
        assert!(s.raise(h(4)));
        assert_eq!(s.order(&[]), vec![h(1), h(4), h(2), h(3), h(5)]);
        assert!(s.raise(h(5)));
        assert_eq!(s.layer_of(h(5)), Some(Layer::AtBottom));
        assert!(!s.raise(h(9)));
    }

    #[test]
    fn test_lower_stays_in_layer() {
        let mut s = stack(&[1, 6], &[2, 3], &[5]);
        s.lower(h(1));
        s.lower(h(2));
        assert_eq!(s.order(&[]), vec![h(6), h(1), h(3), h(2), h(5)]);
    }

    #[test]
    fn test_raise_group_puts_last_transient_on_top() {
        let mut s = stack(&[], &[2, 3, 4, 10, 11], &[]);
        s.raise_group(h(4), &[h(10), h(11)]);
        assert_eq!(s.order(&[]), vec![h(11), h(10), h(4), h(2), h(3)]);
    }

    #[test]
    fn test_raise_group_respects_transient_layer() {
        let mut s = stack(&[10], &[2, 4], &[]);
        s.raise_group(h(4), &[h(10)]);
        assert_eq!(s.layer_of(h(10)), Some(Layer::OnTop));
        assert_eq!(s.order(&[]), vec![h(10), h(4), h(2)]);
    }

    #[test]
    fn test_set_layer_moves_between_lists() {
        let mut s = stack(&[], &[2, 3], &[]);
        assert!(s.set_layer(h(3), Layer::OnTop, Position::Back));
        assert_eq!(s.layer_of(h(3)), Some(Layer::OnTop));
        assert_eq!(s.occurrences(h(3)), 1);
        assert!(!s.set_layer(h(8), Layer::OnTop, Position::Back));
    }

    #[test]
    fn test_order_pins_edges_and_is_idempotent() {
        let s = stack(&[1], &[2], &[3]);
        let edges = [h(100), Handle::NONE, h(101)];
        let first = s.order(&edges);
        assert_eq!(first, vec![h(100), h(101), h(1), h(2), h(3)]);
        assert_eq!(first, s.order(&edges));
    }
}
