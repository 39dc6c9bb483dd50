//! Stream-form xref writing
//!
//! Packs xref entries into the fixed `W = [1, 4, 1]` record layout: one
//! type byte, a 4-byte big-endian offset-or-stream-oid, and one byte of
//! generation-or-sub-index. The stream stays uncompressed so previously
//! computed offsets remain byte-stable.

use crate::parser::objects::PdfObject;
use crate::parser::xref::XrefEntry;
use crate::parser::Value;
use indexmap::IndexMap;
use std::collections::BTreeMap;

const WIDTHS: [usize; 3] = [1, 4, 1];

/// Build the indirect `/Type /XRef` object covering `entries`.
///
/// `trailer` supplies the trailer keys (`Root`, `Info`, `Prev`, `Size`)
/// which the stream dictionary doubles as.
pub fn build_xref_stream_object(
    oid: u32,
    entries: &BTreeMap<u32, XrefEntry>,
    trailer: IndexMap<String, Value>,
) -> PdfObject {
    let mut data = Vec::with_capacity(entries.len() * WIDTHS.iter().sum::<usize>());
    for entry in entries.values() {
        match *entry {
            XrefEntry::Free => {
                data.push(0);
                write_be(&mut data, 0, WIDTHS[1]);
                data.push(0);
            }
            XrefEntry::Offset(offset) => {
                data.push(1);
                write_be(&mut data, offset, WIDTHS[1]);
                data.push(0);
            }
            XrefEntry::InObjectStream { stream_oid, index } => {
                data.push(2);
                write_be(&mut data, stream_oid as u64, WIDTHS[1]);
                data.push(index as u8);
            }
        }
    }

    let mut dict = IndexMap::new();
    dict.insert("Type".to_string(), Value::Name("XRef".to_string()));
    dict.insert(
        "W".to_string(),
        Value::List(WIDTHS.iter().map(|&w| Value::integer(w as i64)).collect()),
    );
    dict.insert("Index".to_string(), Value::List(index_runs(entries)));
    for (key, value) in trailer {
        // On a stream-xref chain the carried trailer is the previous xref
        // stream's own dictionary; its structural keys describe the old
        // records and must not shadow the ones computed above.
        if !matches!(
            key.as_str(),
            "Type" | "W" | "Index" | "Filter" | "DecodeParms" | "Length"
        ) {
            dict.insert(key, value);
        }
    }
    dict.insert("Length".to_string(), Value::integer(data.len() as i64));

    PdfObject::with_stream(oid, Value::Dictionary(dict), data)
}

/// Group sorted oids into `start count` pairs of maximal consecutive runs.
fn index_runs(entries: &BTreeMap<u32, XrefEntry>) -> Vec<Value> {
    let oids: Vec<u32> = entries.keys().copied().collect();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < oids.len() {
        let mut j = i;
        while j + 1 < oids.len() && oids[j + 1] == oids[j] + 1 {
            j += 1;
        }
        runs.push(Value::integer(oids[i] as i64));
        runs.push(Value::integer((j - i + 1) as i64));
        i = j + 1;
    }
    runs
}

fn write_be(out: &mut Vec<u8>, value: u64, width: usize) {
    for i in (0..width).rev() {
        out.push((value >> (i * 8)) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xref_stream;

    fn build(entries: BTreeMap<u32, XrefEntry>) -> PdfObject {
        let mut trailer = IndexMap::new();
        trailer.insert(
            "Size".to_string(),
            Value::integer(entries.keys().max().map(|&n| n as i64 + 1).unwrap_or(0)),
        );
        build_xref_stream_object(20, &entries, trailer)
    }

    #[test]
    fn test_record_layout() {
        let entries = BTreeMap::from([
            (0, XrefEntry::Free),
            (
                1,
                XrefEntry::InObjectStream {
                    stream_oid: 5,
                    index: 3,
                },
            ),
        ]);
        let object = build(entries);
        let data = object.stream.as_ref().unwrap();
        assert_eq!(data.len(), 12);
        assert_eq!(&data[0..6], &[0, 0, 0, 0, 0, 0]);
        assert_eq!(&data[6..12], &[2, 0, 0, 0, 5, 3]);
    }

    #[test]
    fn test_index_runs_with_gap() {
        let entries = BTreeMap::from([
            (1, XrefEntry::Offset(10)),
            (2, XrefEntry::Offset(20)),
            (9, XrefEntry::Offset(90)),
        ]);
        let object = build(entries);
        let index = object.value.get("Index").unwrap();
        let ints: Vec<i64> = index
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(ints, vec![1, 2, 9, 1]);
    }

    #[test]
    fn test_stale_chain_keys_not_carried() {
        // A trailer taken from a previous xref stream carries that stream's
        // own structural keys; they must not survive into the new dict.
        let mut trailer = IndexMap::new();
        trailer.insert("Type".to_string(), Value::Name("XRef".to_string()));
        trailer.insert(
            "W".to_string(),
            Value::List(vec![
                Value::integer(1),
                Value::integer(2),
                Value::integer(1),
            ]),
        );
        trailer.insert(
            "Index".to_string(),
            Value::List(vec![Value::integer(5), Value::integer(2)]),
        );
        trailer.insert("Filter".to_string(), Value::Name("FlateDecode".to_string()));
        trailer.insert("Length".to_string(), Value::integer(99));
        trailer.insert("Root".to_string(), Value::reference(1, 0));
        trailer.insert("Size".to_string(), Value::integer(21));

        let entries = BTreeMap::from([(3, XrefEntry::Offset(77)), (20, XrefEntry::Offset(500))]);
        let object = build_xref_stream_object(20, &entries, trailer);

        let w: Vec<i64> = object
            .value
            .get("W")
            .unwrap()
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(w, vec![1, 4, 1]);
        let index: Vec<i64> = object
            .value
            .get("Index")
            .unwrap()
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(index, vec![3, 1, 20, 1]);
        assert!(object.value.get("Filter").is_none());
        assert_eq!(object.value.get("Length").unwrap().as_int(), Some(12));
        assert_eq!(object.value.get("Root").unwrap().as_reference(), Some((1, 0)));
        assert_eq!(object.value.get("Size").unwrap().as_int(), Some(21));
    }

    #[test]
    fn test_written_stream_decodes_back() {
        let entries = BTreeMap::from([
            (0, XrefEntry::Free),
            (1, XrefEntry::Offset(4242)),
            (
                2,
                XrefEntry::InObjectStream {
                    stream_oid: 1,
                    index: 0,
                },
            ),
        ]);
        let object = build(entries.clone());
        let decoded = xref_stream::decode_entries(
            &object.value,
            object.stream.as_ref().unwrap(),
            0,
        )
        .unwrap();
        // The oid 0 free head is dropped on decode.
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], (1, XrefEntry::Offset(4242)));
        assert_eq!(
            decoded[1],
            (
                2,
                XrefEntry::InObjectStream {
                    stream_oid: 1,
                    index: 0
                }
            )
        );
    }
}
