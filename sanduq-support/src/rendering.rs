//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format token paths, resolution stacks,
//! type names and "did you mean" suggestions.

/// Renders a path of tokens as a readable string.
///
/// # Examples
/// ```
/// use sanduq_support::rendering::render_chain;
///
/// let chain = vec!["Logger", "ConsoleLogger", "Logger"];
/// assert_eq!(render_chain(&chain), "Logger → ConsoleLogger → Logger");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// One line of a rendered resolution stack.
#[derive(Debug)]
pub struct ChainEntry {
    /// Display name of the token
    pub type_name: String,
    /// Scope the frame was resolved in (e.g., "Container", "Resolution")
    pub scope: String,
    /// Optional: extra note shown after the name
    pub source_name: Option<String>,
}

/// Renders a resolution stack top-down, one frame per line, with scopes.
///
/// ```text
///   [Container ] Database
///                ↓
///   [Transient ] UserRepository
///                ↓
///   [cycle     ] Database
/// ```
pub fn render_chain_vertical(entries: &[ChainEntry]) -> String {
    let width = entries.iter().map(|e| e.scope.len()).max().unwrap_or(0);
    let mut out = String::new();

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str(&" ".repeat(width + 5));
            out.push_str("↓\n");
        }

        out.push_str(&format!("  [{:<width$}] {}", entry.scope, entry.type_name));
        if let Some(ref note) = entry.source_name {
            out.push_str(&format!("  ({note})"));
        }
        out.push('\n');
    }

    out
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use sanduq_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("my_app::services::Wizard"), "Wizard");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
///     "Arc<dyn Logger>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut segment = String::new();
    let mut chars = full_name.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Picks registered token names close to the requested one.
///
/// Substring matches on the shortened names rank first, then names
/// sharing a prefix of at least three characters.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter_map(|&name| {
            let short = shorten_type_name(name).to_lowercase();
            if short == wanted {
                return None;
            }
            if short.contains(&wanted) || wanted.contains(&short) {
                return Some((name, 100));
            }

            let common = short
                .chars()
                .zip(wanted.chars())
                .take_while(|(a, b)| a == b)
                .count();
            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| shorten_type_name(name))
        .collect()
}
