//! Page tree traversal
//!
//! Flattens the `Root -> Pages -> Kids` tree into a rendering-ordered list
//! of pages, propagating the inherited `MediaBox` down to the leaves.

use super::objects::{PdfObject, Value};
use super::{ParseError, ParseResult};
use std::collections::HashSet;

/// One page leaf with its effective media box.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    pub oid: u32,
    /// Own or inherited `MediaBox`, `None` when absent all the way up.
    pub media_box: Option<[f64; 4]>,
}

/// Walk the page tree rooted at the `/Pages` node `pages_oid`.
///
/// `lookup` resolves one oid to its object; the walk itself stays agnostic
/// of where objects come from (original buffer or overlay).
pub fn collect_pages<F>(pages_oid: u32, lookup: &mut F) -> ParseResult<Vec<PageInfo>>
where
    F: FnMut(u32) -> ParseResult<Option<PdfObject>>,
{
    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    walk(pages_oid, None, lookup, &mut visited, &mut pages)?;
    Ok(pages)
}

fn walk<F>(
    oid: u32,
    inherited_box: Option<[f64; 4]>,
    lookup: &mut F,
    visited: &mut HashSet<u32>,
    out: &mut Vec<PageInfo>,
) -> ParseResult<()>
where
    F: FnMut(u32) -> ParseResult<Option<PdfObject>>,
{
    if !visited.insert(oid) {
        return Err(ParseError::PageTreeInvalid(format!(
            "cycle through object {oid}"
        )));
    }

    let node = lookup(oid)?
        .ok_or_else(|| ParseError::PageTreeInvalid(format!("missing tree node {oid}")))?;

    let media_box = media_box_of(&node.value).or(inherited_box);

    match node.value.get("Type").and_then(Value::as_name) {
        Some("Pages") => {
            let kids = node
                .value
                .get("Kids")
                .map(|k| k.list_references())
                .unwrap_or_default();
            for (kid_oid, _) in kids {
                walk(kid_oid, media_box, lookup, visited, out)?;
            }
            Ok(())
        }
        Some("Page") => {
            out.push(PageInfo { oid, media_box });
            Ok(())
        }
        other => Err(ParseError::PageTreeInvalid(format!(
            "node {oid} has type {other:?}, expected /Pages or /Page"
        ))),
    }
}

fn media_box_of(value: &Value) -> Option<[f64; 4]> {
    let items = value.get("MediaBox")?.as_list()?;
    if items.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = item.as_float()?;
    }
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn obj(oid: u32, text: &[u8]) -> PdfObject {
        let mut lexer = crate::parser::Lexer::new(text);
        PdfObject::new(oid, Value::parse(&mut lexer).unwrap())
    }

    fn lookup_in(
        map: HashMap<u32, PdfObject>,
    ) -> impl FnMut(u32) -> ParseResult<Option<PdfObject>> {
        move |oid| Ok(map.get(&oid).cloned())
    }

    #[test]
    fn test_media_box_inheritance() {
        let mut map = HashMap::new();
        map.insert(
            2,
            obj(2, b"<< /Type /Pages /Kids [3 0 R 4 0 R] /MediaBox [0 0 612 792] >>"),
        );
        map.insert(3, obj(3, b"<< /Type /Page >>"));
        map.insert(4, obj(4, b"<< /Type /Page /MediaBox [0 0 100 200] >>"));

        let pages = collect_pages(2, &mut lookup_in(map)).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].oid, 3);
        assert_eq!(pages[0].media_box, Some([0.0, 0.0, 612.0, 792.0]));
        assert_eq!(pages[1].media_box, Some([0.0, 0.0, 100.0, 200.0]));
    }

    #[test]
    fn test_nested_pages_order() {
        let mut map = HashMap::new();
        map.insert(1, obj(1, b"<< /Type /Pages /Kids [2 0 R 5 0 R] >>"));
        map.insert(2, obj(2, b"<< /Type /Pages /Kids [3 0 R 4 0 R] >>"));
        map.insert(3, obj(3, b"<< /Type /Page >>"));
        map.insert(4, obj(4, b"<< /Type /Page >>"));
        map.insert(5, obj(5, b"<< /Type /Page >>"));

        let pages = collect_pages(1, &mut lookup_in(map)).unwrap();
        let order: Vec<u32> = pages.iter().map(|p| p.oid).collect();
        assert_eq!(order, vec![3, 4, 5]);
    }

    #[test]
    fn test_foreign_node_type_is_error() {
        let mut map = HashMap::new();
        map.insert(1, obj(1, b"<< /Type /Pages /Kids [2 0 R] >>"));
        map.insert(2, obj(2, b"<< /Type /Font >>"));
        let err = collect_pages(1, &mut lookup_in(map)).unwrap_err();
        assert!(matches!(err, ParseError::PageTreeInvalid(_)));
    }

    #[test]
    fn test_cycle_detected() {
        let mut map = HashMap::new();
        map.insert(1, obj(1, b"<< /Type /Pages /Kids [1 0 R] >>"));
        let err = collect_pages(1, &mut lookup_in(map)).unwrap_err();
        assert!(matches!(err, ParseError::PageTreeInvalid(_)));
    }
}
