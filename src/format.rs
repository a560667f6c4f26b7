//! Text-to-markup transform for assistant replies.
//!
//! Three substitutions, applied in order: fenced code blocks, inline code,
//! then line breaks.  Nothing is escaped; untrusted text that must not be
//! interpreted as markup is rendered as literal text by the view instead.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(.*?)```").expect("valid regex"));
static RE_INLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));

/// Convert reply text into display markup.
///
/// Line breaks are substituted everywhere, including inside `<pre>` regions,
/// so a fenced block spanning several lines contains `<br>` separators.
///
/// ```
/// use roomchat::format::format;
///
/// assert_eq!(format("`x`"), "<code>x</code>");
/// assert_eq!(format("a\nb"), "a<br>b");
/// assert_eq!(format("```code```"), "<pre>code</pre>");
/// ```
pub fn format(text: &str) -> String {
    let text = RE_FENCE.replace_all(text, "<pre>${1}</pre>");
    let text = RE_INLINE.replace_all(&text, "<code>${1}</code>");
    text.replace('\n', "<br>")
}
