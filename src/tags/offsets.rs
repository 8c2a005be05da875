//! Map a text selection back to character offsets within a block
//!
//! The rendered block is split into text nodes (highlight spans break it up).
//! A selection is reported as positions inside those nodes; walking the nodes in
//! order turns them into offsets within the block's full text. When that fails,
//! the selected text is searched for in the block instead.

use tracing::debug;

/// Position inside the `node`-th text node of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePoint {
    pub node: usize,
    /// Character offset within the node
    pub offset: usize,
}

/// A selection as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionInput {
    /// Text nodes under the block element, in document order, plus the selection
    /// endpoints (in either direction)
    Nodes {
        nodes: Vec<String>,
        anchor: NodePoint,
        focus: NodePoint,
    },
    /// Only the selected text is known
    Text(String),
}

/// Selected text and, when known, its `[start, end)` character offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub text: String,
    pub range: Option<(usize, usize)>,
}

/// Byte index of the `char_index`-th character, or the text length past the end
pub(crate) fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(i, _)| i)
}

/// Substring by character offsets
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> &str {
    &text[byte_index(text, start)..byte_index(text, end.max(start))]
}

/// Character offset of the first occurrence of `needle`
fn find_chars(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte| haystack[..byte].chars().count())
}

fn absolute_offset(nodes: &[String], point: NodePoint) -> Option<usize> {
    let node = nodes.get(point.node)?;
    if point.offset > node.chars().count() {
        return None;
    }
    let before: usize = nodes[..point.node].iter().map(|n| n.chars().count()).sum();
    Some(before + point.offset)
}

fn walk_nodes(
    block_text: &str,
    nodes: &[String],
    anchor: NodePoint,
    focus: NodePoint,
) -> Option<(usize, usize)> {
    if nodes.concat() != block_text {
        return None;
    }
    let a = absolute_offset(nodes, anchor)?;
    let b = absolute_offset(nodes, focus)?;
    Some((a.min(b), a.max(b)))
}

/// Selected text carried by the node endpoints, even if the nodes no longer match
fn node_text(nodes: &[String], anchor: NodePoint, focus: NodePoint) -> Option<String> {
    let joined = nodes.concat();
    let a = absolute_offset(nodes, anchor)?;
    let b = absolute_offset(nodes, focus)?;
    Some(char_slice(&joined, a.min(b), a.max(b)).to_string())
}

fn search(block_text: &str, selected: &str) -> Option<ResolvedSelection> {
    let trimmed = selected.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = find_chars(block_text, trimmed)?;
    Some(ResolvedSelection {
        text: trimmed.to_string(),
        range: Some((start, start + trimmed.chars().count())),
    })
}

/// Resolve a selection against `block_text`. Returns `None` for empty selections
/// and text that does not occur in the block.
pub fn resolve_selection(block_text: &str, input: &SelectionInput) -> Option<ResolvedSelection> {
    match input {
        SelectionInput::Nodes {
            nodes,
            anchor,
            focus,
        } => {
            if let Some((start, end)) = walk_nodes(block_text, nodes, *anchor, *focus) {
                if start == end {
                    return None;
                }
                return Some(ResolvedSelection {
                    text: char_slice(block_text, start, end).to_string(),
                    range: Some((start, end)),
                });
            }
            debug!("Offset walk failed, falling back to substring search");
            let selected = node_text(nodes, *anchor, *focus)?;
            search(block_text, &selected)
        }
        SelectionInput::Text(selected) => search(block_text, selected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_walks_across_nodes() {
        let text = "Check the tire pressure daily";
        let input = SelectionInput::Nodes {
            nodes: nodes(&["Check ", "the tire", " pressure daily"]),
            anchor: NodePoint { node: 1, offset: 0 },
            focus: NodePoint { node: 1, offset: 8 },
        };
        let resolved = resolve_selection(text, &input).unwrap();
        assert_eq!(resolved.text, "the tire");
        assert_eq!(resolved.range, Some((6, 14)));
    }

    #[test]
    fn test_backwards_selection_spanning_nodes() {
        let text = "one two three";
        let input = SelectionInput::Nodes {
            nodes: nodes(&["one ", "two", " three"]),
            anchor: NodePoint { node: 2, offset: 3 },
            focus: NodePoint { node: 0, offset: 2 },
        };
        let resolved = resolve_selection(text, &input).unwrap();
        assert_eq!(resolved.text, "e two th");
        assert_eq!(resolved.range, Some((2, 10)));
    }

    #[test]
    fn test_offsets_count_characters() {
        let text = "café crème brûlée";
        let input = SelectionInput::Nodes {
            nodes: nodes(&[text]),
            anchor: NodePoint { node: 0, offset: 5 },
            focus: NodePoint { node: 0, offset: 10 },
        };
        let resolved = resolve_selection(text, &input).unwrap();
        assert_eq!(resolved.text, "crème");
        assert_eq!(resolved.range, Some((5, 10)));
    }

    #[test]
    fn test_falls_back_when_nodes_are_stale() {
        let text = "we rotate the tires monthly";
        let input = SelectionInput::Nodes {
            nodes: nodes(&["rotate ", "the tires"]),
            anchor: NodePoint { node: 1, offset: 0 },
            focus: NodePoint { node: 1, offset: 9 },
        };
        let resolved = resolve_selection(text, &input).unwrap();
        assert_eq!(resolved.text, "the tires");
        assert_eq!(resolved.range, Some((10, 19)));
    }

    #[test]
    fn test_text_selection_search() {
        let resolved =
            resolve_selection("brakes and tires", &SelectionInput::Text(" tires ".into())).unwrap();
        assert_eq!(resolved.text, "tires");
        assert_eq!(resolved.range, Some((11, 16)));
    }

    #[test]
    fn test_empty_or_foreign_selection() {
        let collapsed = SelectionInput::Nodes {
            nodes: nodes(&["abc"]),
            anchor: NodePoint { node: 0, offset: 1 },
            focus: NodePoint { node: 0, offset: 1 },
        };
        assert!(resolve_selection("abc", &collapsed).is_none());
        assert!(resolve_selection("abc", &SelectionInput::Text("   ".into())).is_none());
        assert!(resolve_selection("abc", &SelectionInput::Text("xyz".into())).is_none());
    }

    #[test]
    fn test_char_slice() {
        assert_eq!(char_slice("brûlée", 2, 4), "ûl");
        assert_eq!(char_slice("abc", 1, 10), "bc");
        assert_eq!(char_slice("abc", 2, 1), "");
    }
}
