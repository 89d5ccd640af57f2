//! Parsing of `source:destination` transfer specifications.

use tracing::debug;

use crate::core::models::TransferItem;
use crate::error::AppError;

/// Parse one `src:dst` specification.
///
/// Both paths ending in `/` is a recursive directory transfer, neither ending
/// in `/` is a single file. Mixing the two is rejected.
pub fn parse_transfer_spec(spec: &str) -> Result<TransferItem, AppError> {
    let invalid = || AppError::InvalidTransferSpecification {
        spec: spec.to_string(),
    };

    let (src, dst) = spec.split_once(':').ok_or_else(invalid)?;
    if src.is_empty() || dst.is_empty() {
        return Err(invalid());
    }

    match (src.ends_with('/'), dst.ends_with('/')) {
        (true, true) => {
            debug!(source = src, destination = dst, "Transfer directory");
            Ok(TransferItem {
                source_path: src.to_string(),
                destination_path: dst.to_string(),
                recursive: true,
            })
        }
        (false, false) => {
            debug!(source = src, destination = dst, "Transfer file");
            Ok(TransferItem {
                source_path: src.to_string(),
                destination_path: dst.to_string(),
                recursive: false,
            })
        }
        _ => Err(invalid()),
    }
}

/// Parse every specification, failing on the first malformed one.
pub fn parse_transfer_specs<S: AsRef<str>>(specs: &[S]) -> Result<Vec<TransferItem>, AppError> {
    specs
        .iter()
        .map(|spec| parse_transfer_spec(spec.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_pair_is_recursive() {
        let item = parse_transfer_spec("/a/:/b/").unwrap();
        assert!(item.recursive);
        assert_eq!(item.source_path, "/a/");
        assert_eq!(item.destination_path, "/b/");
    }

    #[test]
    fn file_pair_is_not_recursive() {
        let item = parse_transfer_spec("/a:/b").unwrap();
        assert!(!item.recursive);
    }

    #[test]
    fn mixed_pair_is_rejected() {
        for spec in ["/a/:/b", "/a:/b/"] {
            let err = parse_transfer_spec(spec).unwrap_err();
            assert!(matches!(err, AppError::InvalidTransferSpecification { .. }));
        }
    }

    #[test]
    fn missing_separator_or_side_is_rejected() {
        for spec in ["/a", ":/b", "/a:", ""] {
            assert!(parse_transfer_spec(spec).is_err(), "{spec} should be rejected");
        }
    }

    #[test]
    fn home_relative_paths_pass_through() {
        let item = parse_transfer_spec("~/src/:~/dst/").unwrap();
        assert_eq!(item.source_path, "~/src/");
        assert!(item.recursive);
    }

    #[test]
    fn one_bad_spec_fails_the_batch() {
        let specs = ["/a:/b", "/c/:/d"];
        assert!(parse_transfer_specs(&specs).is_err());
    }
}
