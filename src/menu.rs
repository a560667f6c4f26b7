//! The room context menu.
//!
//! The targeted room only exists while the menu is open.  Every way of
//! leaving the menu (dismissal, taking an action) clears it, so an action can
//! never run against a room targeted by an earlier opening.

use crate::RoomId;

/// What the user picked from the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Rename the targeted room.
    Rename(RoomId),
    /// Delete the targeted room.
    Delete(RoomId),
}

/// Why the menu closed without an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    /// A click landed outside the menu.
    OutsideClick,
    /// The user pressed escape.
    Escape,
    /// The targeted room disappeared from the list.
    RoomGone,
}

/// Context menu state.
#[derive(Debug, Clone, Default)]
pub struct ContextMenu {
    target: Option<RoomId>,
}

impl ContextMenu {
    /// Creates a closed menu.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the menu on a room, replacing any previous target.
    pub fn open(&mut self, room: RoomId) {
        self.target = Some(room);
    }

    /// The room the open menu targets.
    pub fn target(&self) -> Option<&RoomId> {
        self.target.as_ref()
    }

    /// Returns true while the menu is open.
    pub fn is_open(&self) -> bool {
        self.target.is_some()
    }

    /// Close the menu without acting.
    pub fn dismiss(&mut self, reason: Dismissal) {
        if let Some(target) = self.target.take() {
            tracing::trace!(room = %target, ?reason, "context menu dismissed");
        }
    }

    /// Close the menu by choosing "rename".  `None` if the menu was closed.
    pub fn rename(&mut self) -> Option<MenuAction> {
        self.target.take().map(MenuAction::Rename)
    }

    /// Close the menu by choosing "delete".  `None` if the menu was closed.
    pub fn delete(&mut self) -> Option<MenuAction> {
        self.target.take().map(MenuAction::Delete)
    }
}
