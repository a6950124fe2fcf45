use mongodb::error::{Error, ErrorKind, WriteFailure};

use dochandle_core::error::{DriverError, DriverErrorKind};

const DUPLICATE_KEY: i32 = 11000;

/// Classifies a MongoDB error into a [`DriverErrorKind`].
pub(crate) fn classify(error: &Error) -> DriverErrorKind {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => DriverErrorKind::DuplicateKey,
        ErrorKind::Write(WriteFailure::WriteConcernError(_)) => DriverErrorKind::WriteConcern,
        ErrorKind::Write(_) => DriverErrorKind::Validation,
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY => DriverErrorKind::DuplicateKey,
        ErrorKind::InsertMany(e) => match &e.write_errors {
            Some(errors) => first_write_error(errors.iter().map(|e| (e.index, e.code))).0,
            None if e.write_concern_error.is_some() => DriverErrorKind::WriteConcern,
            None => DriverErrorKind::Other,
        },
        ErrorKind::InvalidArgument { .. } => DriverErrorKind::Validation,
        ErrorKind::ServerSelection { .. } | ErrorKind::Authentication { .. } | ErrorKind::DnsResolve { .. } => {
            DriverErrorKind::Connection
        }
        ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } => DriverErrorKind::Network,
        _ => DriverErrorKind::Other,
    }
}

/// For an ordered bulk insert, the lowest failing index is the number of documents that were
/// persisted before it. The kind follows the error at that index.
fn first_write_error(errors: impl Iterator<Item = (usize, i32)>) -> (DriverErrorKind, Option<usize>) {
    match errors.min_by_key(|(index, _)| *index) {
        Some((index, DUPLICATE_KEY)) => (DriverErrorKind::DuplicateKey, Some(index)),
        Some((index, _)) => (DriverErrorKind::Validation, Some(index)),
        None => (DriverErrorKind::Other, None),
    }
}

/// How many documents an ordered `insert_many` persisted before failing, when known.
fn inserted_before_failure(error: &Error) -> Option<usize> {
    match error.kind.as_ref() {
        ErrorKind::InsertMany(e) => e
            .write_errors
            .as_ref()
            .and_then(|errors| first_write_error(errors.iter().map(|e| (e.index, e.code))).1),
        _ => None,
    }
}

pub(crate) fn driver_error(error: Error) -> DriverError {
    let mapped = DriverError::new(classify(&error), error.to_string());

    match inserted_before_failure(&error) {
        Some(inserted) => mapped.with_inserted(inserted),
        None => mapped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failing_index_counts_the_persisted_prefix() {
        let (kind, inserted) = first_write_error([(4, 121), (2, DUPLICATE_KEY)].into_iter());

        assert_eq!(kind, DriverErrorKind::DuplicateKey);
        assert_eq!(inserted, Some(2));
    }

    #[test]
    fn other_write_codes_are_validation_failures() {
        assert_eq!(
            first_write_error([(0, 121)].into_iter()),
            (DriverErrorKind::Validation, Some(0))
        );
        assert_eq!(first_write_error(std::iter::empty()), (DriverErrorKind::Other, None));
    }

    #[test]
    fn errors_outside_bulk_inserts_carry_no_count() {
        let error = Error::from(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        let mapped = driver_error(error);

        assert_eq!(mapped.kind, DriverErrorKind::Network);
        assert_eq!(mapped.inserted, None);
    }
}
