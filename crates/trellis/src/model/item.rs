//! Item identity, capability flags, and item kinds.
//!
//! Every item in a [`crate::model::FlexibleListController`] carries a caller
//! payload, a set of [`ItemFlags`], and an [`ItemKind`]. The kind replaces an
//! inheritance hierarchy: instead of subclassing a base item type, callers
//! tag each item as plain, expandable, or a header, and all behavior
//! dispatches on an exhaustive `match`.

use serde::{Deserialize, Serialize};

/// Stable identity of an item, independent of its current position.
///
/// IDs are allocated once per inserted item and never reused within a
/// process. Positions shift as items come and go; IDs do not.
pub type ItemId = u64;

/// Per-item capability flags.
///
/// Flags gate what the surrounding UI may do with an item; the containers in
/// this crate consult `hidden` (filtering) and `selectable` directly and
/// carry the rest for the view layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFlags {
    /// Item can be selected.
    pub selectable: bool,
    /// Item is enabled (can interact).
    pub enabled: bool,
    /// Item is excluded from the visible sequence.
    pub hidden: bool,
    /// Item can be dragged.
    pub draggable: bool,
    /// Item can be swiped.
    pub swipeable: bool,
}

impl ItemFlags {
    /// Creates flags with all defaults (selectable and enabled only).
    pub fn new() -> Self {
        Self {
            selectable: true,
            enabled: true,
            ..Default::default()
        }
    }

    /// Creates flags for a disabled item.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Sets the selectable flag.
    pub fn with_selectable(mut self, selectable: bool) -> Self {
        self.selectable = selectable;
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the hidden flag.
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Sets the draggable flag.
    pub fn with_draggable(mut self, draggable: bool) -> Self {
        self.draggable = draggable;
        self
    }

    /// Sets the swipeable flag.
    pub fn with_swipeable(mut self, swipeable: bool) -> Self {
        self.swipeable = swipeable;
        self
    }
}

/// The structural role of an item.
///
/// `Expandable` items may own children and carry their own expansion state;
/// collapsing a parent hides its children without discarding nested state.
/// `Header` items group the items linked to them; removing a header unlinks
/// its group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// An ordinary leaf item.
    Plain,
    /// An item that can own children and be expanded or collapsed.
    Expandable {
        /// Whether the children are currently shown.
        expanded: bool,
    },
    /// A section header other items can link to.
    Header,
}

impl Default for ItemKind {
    fn default() -> Self {
        Self::Plain
    }
}

impl ItemKind {
    /// Creates a collapsed expandable kind.
    pub fn expandable() -> Self {
        Self::Expandable { expanded: false }
    }

    /// Whether this kind may own children.
    pub fn is_expandable(&self) -> bool {
        matches!(self, Self::Expandable { .. })
    }

    /// Whether this is a section header.
    pub fn is_header(&self) -> bool {
        matches!(self, Self::Header)
    }

    /// Whether the children are currently shown.
    ///
    /// Always `false` for non-expandable kinds.
    pub fn is_expanded(&self) -> bool {
        match self {
            Self::Expandable { expanded } => *expanded,
            Self::Plain | Self::Header => false,
        }
    }
}
