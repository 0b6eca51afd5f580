use std::convert::TryFrom;

use crate::{
    bson::{oid::ObjectId, Bson, Document},
    error::{Error, Result},
};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

pub(crate) fn replacement_document_check(replacement: &Document) -> Result<()> {
    match first_key(replacement) {
        Some(s) if s.starts_with('$') => Err(Error::invalid_argument(
            "replace document must have first key not starting with '$'",
        )),
        _ => Ok(()),
    }
}

pub(crate) fn update_document_check(update: &Document) -> Result<()> {
    match first_key(update) {
        Some(s) if s.starts_with('$') => Ok(()),
        _ => Err(Error::invalid_argument(
            "update document must have first key starting with '$'",
        )),
    }
}

/// Returns the `_id` of the document, generating and prepending an `ObjectId` if it has none.
pub(crate) fn get_or_prepend_id_field(doc: &mut Document) -> Bson {
    match doc.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            let mut new_doc = Document::new();
            new_doc.insert("_id", id.clone());
            new_doc.extend(std::mem::take(doc));
            *doc = new_doc;
            id
        }
    }
}

/// The size in bytes of the document once serialized to BSON.
pub(crate) fn doc_size_bytes(doc: &Document) -> Result<usize> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes)?;
    Ok(bytes.len())
}

/// The size in bytes of the provided document in an array at the given index, accounting for
/// the element type byte, the decimal key and its null terminator.
pub(crate) fn array_entry_size_bytes(index: usize, doc_len: usize) -> usize {
    1 + num_decimal_digits(index) + 1 + doc_len
}

fn num_decimal_digits(mut n: usize) -> usize {
    let mut digits = 0;

    loop {
        n /= 10;
        digits += 1;

        if n == 0 {
            return digits;
        }
    }
}

#[cfg(test)]
mod test {
    use crate::bson::{doc, Bson};

    use super::{
        array_entry_size_bytes,
        doc_size_bytes,
        get_or_prepend_id_field,
        num_decimal_digits,
        replacement_document_check,
        update_document_check,
    };

    #[test]
    fn num_digits() {
        assert_eq!(num_decimal_digits(0), 1);
        assert_eq!(num_decimal_digits(1), 1);
        assert_eq!(num_decimal_digits(10), 2);
        assert_eq!(num_decimal_digits(15), 2);
        assert_eq!(num_decimal_digits(100), 3);
        assert_eq!(num_decimal_digits(125), 3);
    }

    #[test]
    fn entry_size() {
        assert_eq!(array_entry_size_bytes(0, 5), 8);
        assert_eq!(array_entry_size_bytes(12, 5), 9);
    }

    #[test]
    fn empty_doc_size() {
        assert_eq!(doc_size_bytes(&doc! {}).unwrap(), 5);
        // int32 element: type byte + "x\0" + 4 bytes.
        assert_eq!(doc_size_bytes(&doc! { "x": 1 }).unwrap(), 12);
    }

    #[test]
    fn id_is_prepended_when_missing() {
        let mut doc = doc! { "x": 1 };
        let id = get_or_prepend_id_field(&mut doc);

        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(doc.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(doc.get("_id"), Some(&id));

        let mut doc = doc! { "x": 1, "_id": 5 };
        assert_eq!(get_or_prepend_id_field(&mut doc), Bson::Int32(5));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn update_and_replacement_checks() {
        assert!(update_document_check(&doc! { "$set": { "x": 1 } }).is_ok());
        assert!(update_document_check(&doc! { "x": 1 }).is_err());
        assert!(update_document_check(&doc! {}).is_err());

        assert!(replacement_document_check(&doc! { "x": 1 }).is_ok());
        assert!(replacement_document_check(&doc! {}).is_ok());
        assert!(replacement_document_check(&doc! { "$set": { "x": 1 } }).is_err());
    }
}
