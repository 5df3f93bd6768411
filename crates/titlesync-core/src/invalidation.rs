//! Cross-process change descriptors.
//!
//! A message only says *what kind* of change happened to *which holder*; it
//! never carries the new state. Receivers discard their local copy and reload
//! through the cache tiers.
//!
//! Wire format (UTF-8): `<action>:<holder>:<payload>`, e.g.
//! `title-add:7c9e6679-7425-40de-944b-e07fc1f90ae7:&cHero`.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::holder::HolderId;

/// Payload used by `title-select` when the selection was cleared.
pub const NO_SELECTION_PAYLOAD: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationAction {
    TitleAdd,
    TitleRemove,
    TitleSelect,
    /// Sent by a newer peer; still evicts the holder's collection.
    Other(String),
}

impl InvalidationAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TitleAdd => "title-add",
            Self::TitleRemove => "title-remove",
            Self::TitleSelect => "title-select",
            Self::Other(action) => action,
        }
    }
}

impl fmt::Display for InvalidationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for InvalidationAction {
    fn from(s: &str) -> Self {
        match s {
            "title-add" => Self::TitleAdd,
            "title-remove" => Self::TitleRemove,
            "title-select" => Self::TitleSelect,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A parsed `<action>:<holder>:<payload>` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationMessage {
    pub action: InvalidationAction,
    pub holder: HolderId,
    /// Title text for add/remove/select, [`NO_SELECTION_PAYLOAD`] for a
    /// cleared selection. May itself contain `:`.
    pub payload: String,
}

impl InvalidationMessage {
    pub fn title_added(holder: HolderId, title: &str) -> Self {
        Self {
            action: InvalidationAction::TitleAdd,
            holder,
            payload: title.to_string(),
        }
    }

    pub fn title_removed(holder: HolderId, title: &str) -> Self {
        Self {
            action: InvalidationAction::TitleRemove,
            holder,
            payload: title.to_string(),
        }
    }

    pub fn title_selected(holder: HolderId, title: Option<&str>) -> Self {
        Self {
            action: InvalidationAction::TitleSelect,
            holder,
            payload: title.unwrap_or(NO_SELECTION_PAYLOAD).to_string(),
        }
    }

    /// Whether receivers must also drop their cached selection.
    pub fn affects_selection(&self) -> bool {
        self.action == InvalidationAction::TitleSelect
    }
}

impl fmt::Display for InvalidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.action, self.holder, self.payload)
    }
}

impl FromStr for InvalidationMessage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let action = parts.next().filter(|a| !a.is_empty());
        let holder = parts.next();

        match (action, holder) {
            (Some(action), Some(holder)) => Ok(Self {
                action: InvalidationAction::from(action),
                holder: holder.parse()?,
                payload: parts.next().unwrap_or_default().to_string(),
            }),
            _ => Err(CoreError::invalid_message(s)),
        }
    }
}
