//! Dotted field path access on BSON documents (`"address.city"`).

use bson::{Bson, Document};

pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(inner) => get_path(inner, rest),
            _ => None,
        },
    }
}

/// Sets a value, creating intermediate documents. Fails when an intermediate field exists
/// but is not a document.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<(), String> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(format!("cannot create field '{rest}' in non-document field '{head}'")),
            }
        }
    }
}

pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => remove_path(inner, rest),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn reads_writes_and_removes_nested_fields() {
        let mut document = doc! { "name": "A", "address": { "city": "Oslo" } };

        assert_eq!(get_path(&document, "address.city"), Some(&Bson::String("Oslo".into())));
        assert_eq!(get_path(&document, "name.first"), None);

        set_path(&mut document, "address.zip", "0150".into()).unwrap();
        set_path(&mut document, "meta.tags.primary", "x".into()).unwrap();
        assert_eq!(get_path(&document, "address.zip"), Some(&Bson::String("0150".into())));
        assert_eq!(get_path(&document, "meta.tags.primary"), Some(&Bson::String("x".into())));

        assert!(set_path(&mut document, "name.first", "B".into()).is_err());

        assert_eq!(remove_path(&mut document, "address.city"), Some(Bson::String("Oslo".into())));
        assert_eq!(get_path(&document, "address.city"), None);
    }
}
