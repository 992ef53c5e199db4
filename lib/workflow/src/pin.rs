//! Input and output pins, and the item data buffered on an input pin.
//!
//! Pins are addressed by index. A connection joins output pin `n` of one
//! node to input pin `m` of another; several connections may feed the same
//! input pin, each contributing one segment of data.

use crate::item::Item;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use weft_core::NodeId;

/// An input pin declared by a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPin {
    pub name: String,
    /// A required pin must carry data before the node can run.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl InputPin {
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// An output pin declared by a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPin {
    pub name: String,
}

impl OutputPin {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The node run and output an array of items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub node_id: NodeId,
    pub run_index: usize,
    pub output_index: usize,
}

/// The exact upstream item an input item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemOrigin {
    pub node_id: NodeId,
    pub run_index: usize,
    pub output_index: usize,
    pub item_index: usize,
}

/// One array of items buffered on a pin.
///
/// `source` is `None` for items delivered by the host.
#[derive(Debug, Clone)]
pub struct PinSegment {
    pub source: Option<SourceRef>,
    pub items: Arc<[Item]>,
}

/// Everything buffered on one input pin, in arrival order.
///
/// Items are shared read-only with every other consumer of the same output.
#[derive(Debug, Clone, Default)]
pub struct PinData {
    segments: Vec<PinSegment>,
}

impl PinData {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Builds pin data from a single host-provided array.
    #[must_use]
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut data = Self::new();
        data.push(None, items.into());
        data
    }

    /// Appends an array. Empty arrays are not buffered.
    pub fn push(&mut self, source: Option<SourceRef>, items: Arc<[Item]>) {
        if !items.is_empty() {
            self.segments.push(PinSegment { source, items });
        }
    }

    /// True when no item set is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of items across all segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.items.len()).sum()
    }

    #[must_use]
    pub fn segments(&self) -> &[PinSegment] {
        &self.segments
    }

    /// Iterates over all items, segment by segment.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.segments.iter().flat_map(|segment| segment.items.iter())
    }

    /// Returns the item at a flat index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Item> {
        let (segment, offset) = self.locate(index)?;
        segment.items.get(offset)
    }

    /// Returns where the item at a flat index came from, if it came from a node.
    #[must_use]
    pub fn origin(&self, index: usize) -> Option<ItemOrigin> {
        let (segment, offset) = self.locate(index)?;
        let source = segment.source?;
        Some(ItemOrigin {
            node_id: source.node_id,
            run_index: source.run_index,
            output_index: source.output_index,
            item_index: offset,
        })
    }

    /// Clones all items into one vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Item> {
        self.items().cloned().collect()
    }

    fn locate(&self, mut index: usize) -> Option<(&PinSegment, usize)> {
        for segment in &self.segments {
            if index < segment.items.len() {
                return Some((segment, index));
            }
            index -= segment.items.len();
        }
        None
    }
}
