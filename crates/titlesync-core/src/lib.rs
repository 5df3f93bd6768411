//! Domain types shared by every titlesync crate.
//!
//! - [`HolderId`]: stable identity of a title holder (player)
//! - [`TitleRecord`] / [`TitleCollection`]: owned titles of one holder
//! - [`format`]: color markup translation for displaying a selected title
//! - [`invalidation`]: the `<action>:<holder>:<payload>` change descriptor
//!   broadcast between processes

pub mod error;
pub mod format;
pub mod holder;
pub mod invalidation;
pub mod time;
pub mod title;

pub use error::{CoreError, Result};
pub use format::{format_selected_title, format_title_prefix};
pub use holder::HolderId;
pub use invalidation::{InvalidationAction, InvalidationMessage};
pub use time::now_millis;
pub use title::{MAX_TITLES, TitleCollection, TitleRecord};
