//! Display formatting for a selected title.
//!
//! Titles carry two kinds of markup:
//! - legacy codes: `&` followed by a color or style character (`&c`, `&l`, `&r`)
//! - hex colors: `#RRGGBB`, optionally written as `&#RRGGBB`
//!
//! Both are translated into the client's native `§` escape sequences. A hex
//! color becomes the extended-color marker `§x` followed by one `§<digit>`
//! segment per hex digit.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Native color escape character.
pub const COLOR_CHAR: char = '§';

/// Sequence that resets all colors and styles.
pub const RESET: &str = "§r";

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&?#([A-Fa-f0-9]{6})").expect("hex color pattern is valid")
});

static LEGACY_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&([0-9A-Fa-fK-Ok-oRrXx])").expect("legacy code pattern is valid")
});

/// Formats a selected title for display.
///
/// Returns an empty string when nothing is selected, so callers can splice
/// the result into chat or name tags without rendering empty brackets.
/// No separator follows the closing bracket; use [`format_title_prefix`]
/// when the title goes directly in front of a name.
///
/// ```
/// use titlesync_core::format_selected_title;
///
/// assert_eq!(format_selected_title(None), "");
/// assert_eq!(format_selected_title(Some("&cHero")), "[§cHero§r]");
/// ```
pub fn format_selected_title(title: Option<&str>) -> String {
    match title {
        Some(title) if !title.is_empty() => format!("[{}{RESET}]", colorize(title)),
        _ => String::new(),
    }
}

/// Like [`format_selected_title`], followed by a single space.
///
/// ```
/// use titlesync_core::format_title_prefix;
///
/// assert_eq!(format_title_prefix(Some("&cHero")) + "Steve", "[§cHero§r] Steve");
/// assert_eq!(format_title_prefix(None) + "Steve", "Steve");
/// ```
pub fn format_title_prefix(title: Option<&str>) -> String {
    let mut formatted = format_selected_title(title);
    if !formatted.is_empty() {
        formatted.push(' ');
    }
    formatted
}

/// Translates color markup without adding brackets.
pub fn colorize(text: &str) -> String {
    let hex = HEX_COLOR.replace_all(text, |caps: &Captures<'_>| {
        let mut out = String::with_capacity(2 + 6 * 3);
        out.push(COLOR_CHAR);
        out.push('x');
        for digit in caps[1].chars() {
            out.push(COLOR_CHAR);
            out.push(digit);
        }
        out
    });

    LEGACY_CODE
        .replace_all(&hex, |caps: &Captures<'_>| {
            format!("{COLOR_CHAR}{}", caps[1].to_ascii_lowercase())
        })
        .into_owned()
}

/// Removes all markup, leaving the plain title text.
pub fn strip_markup(text: &str) -> String {
    let without_hex = HEX_COLOR.replace_all(text, "");
    LEGACY_CODE.replace_all(&without_hex, "").into_owned()
}
