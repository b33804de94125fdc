//! Fixed-width label fields inside opaque nodes.

/// A byte range holding a node's label
///
/// Nodes are opaque to the heap file, so the caller says where the label
/// lives. Labels are compared after trailing NUL padding is trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelField {
    pub offset: usize,
    pub len: usize,
}

impl LabelField {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// The label bytes of a node, or `None` if the node ends before the field
    pub fn extract<'n>(&self, node: &'n [u8]) -> Option<&'n [u8]> {
        if self.offset >= node.len() && self.len > 0 {
            return None;
        }
        let end = self.offset.saturating_add(self.len).min(node.len());
        let raw = node.get(self.offset..end)?;
        let trimmed = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Some(&raw[..trimmed])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_trims_padding() {
        let field = LabelField::new(4, 8);
        let node = b"\x00\x00\x00\x01Person\x00\x00rest";
        assert_eq!(field.extract(node), Some(&b"Person"[..]));
    }

    #[test]
    fn test_extract_truncated_field() {
        let field = LabelField::new(2, 10);
        assert_eq!(field.extract(b"abcd"), Some(&b"cd"[..]));
        assert_eq!(field.extract(b"ab"), None);
    }

    #[test]
    fn test_all_padding_is_empty_label() {
        let field = LabelField::new(0, 4);
        assert_eq!(field.extract(&[0, 0, 0, 0, 9]), Some(&b""[..]));
    }
}
