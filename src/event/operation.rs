// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dispatched storage operations and their event names.

/// Emitted after adapter options changed.
pub const OPTION_EVENT: &str = "option";

/// Emitted when an option change produced a different capabilities snapshot.
pub const CAPABILITIES_CHANGED_EVENT: &str = "capabilities.changed";

/// Every operation an adapter routes through its event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetItem,
    GetItems,
    HasItem,
    HasItems,
    GetMetadata,
    GetMetadatas,
    SetItem,
    SetItems,
    AddItem,
    AddItems,
    ReplaceItem,
    ReplaceItems,
    CheckAndSetItem,
    TouchItem,
    TouchItems,
    RemoveItem,
    RemoveItems,
    IncrementItem,
    IncrementItems,
    DecrementItem,
    DecrementItems,
    GetCapabilities,
}

impl Operation {
    pub const ALL: [Operation; 22] = [
        Operation::GetItem,
        Operation::GetItems,
        Operation::HasItem,
        Operation::HasItems,
        Operation::GetMetadata,
        Operation::GetMetadatas,
        Operation::SetItem,
        Operation::SetItems,
        Operation::AddItem,
        Operation::AddItems,
        Operation::ReplaceItem,
        Operation::ReplaceItems,
        Operation::CheckAndSetItem,
        Operation::TouchItem,
        Operation::TouchItems,
        Operation::RemoveItem,
        Operation::RemoveItems,
        Operation::IncrementItem,
        Operation::IncrementItems,
        Operation::DecrementItem,
        Operation::DecrementItems,
        Operation::GetCapabilities,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetItem => "get_item",
            Self::GetItems => "get_items",
            Self::HasItem => "has_item",
            Self::HasItems => "has_items",
            Self::GetMetadata => "get_metadata",
            Self::GetMetadatas => "get_metadatas",
            Self::SetItem => "set_item",
            Self::SetItems => "set_items",
            Self::AddItem => "add_item",
            Self::AddItems => "add_items",
            Self::ReplaceItem => "replace_item",
            Self::ReplaceItems => "replace_items",
            Self::CheckAndSetItem => "check_and_set_item",
            Self::TouchItem => "touch_item",
            Self::TouchItems => "touch_items",
            Self::RemoveItem => "remove_item",
            Self::RemoveItems => "remove_items",
            Self::IncrementItem => "increment_item",
            Self::IncrementItems => "increment_items",
            Self::DecrementItem => "decrement_item",
            Self::DecrementItems => "decrement_items",
            Self::GetCapabilities => "get_capabilities",
        }
    }

    /// `<op>.pre`
    #[must_use]
    pub fn pre(&self) -> String {
        format!("{}.pre", self.as_str())
    }

    /// `<op>.post`
    #[must_use]
    pub fn post(&self) -> String {
        format!("{}.post", self.as_str())
    }

    /// `<op>.exception`
    #[must_use]
    pub fn exception(&self) -> String {
        format!("{}.exception", self.as_str())
    }

    /// Operations that read without changing stored state.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::GetItem
                | Self::GetItems
                | Self::HasItem
                | Self::HasItems
                | Self::GetMetadata
                | Self::GetMetadatas
        )
    }

    /// Operations that change stored state.
    #[must_use]
    pub fn is_write(&self) -> bool {
        !self.is_read() && *self != Self::GetCapabilities
    }

    /// Writes that carry a value to store (subject to datatype rules).
    #[must_use]
    pub fn carries_value(&self) -> bool {
        matches!(
            self,
            Self::SetItem
                | Self::SetItems
                | Self::AddItem
                | Self::AddItems
                | Self::ReplaceItem
                | Self::ReplaceItems
                | Self::CheckAndSetItem
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
