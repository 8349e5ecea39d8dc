use std::fmt;

use snafu::{ResultExt, Snafu};

/// Errors for patch construction and application.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum PatchError {
    #[snafu(display(
        "search pattern is {search_len} bytes but replacement is {replace_len}"
    ))]
    SizeMismatch {
        search_len: usize,
        replace_len: usize,
    },

    #[snafu(display("invalid hex pattern"))]
    InvalidHex { source: hex::FromHexError },

    #[snafu(display("search pattern is empty"))]
    EmptyPattern,

    #[snafu(display("pattern not found"))]
    NotFound,

    #[snafu(display("pattern is ambiguous, found at {} sites: {}", matches.len(), DisplayMatches(matches)))]
    Ambiguous { matches: Vec<MatchSite> },

    #[snafu(display("match index {index} out of range ({count} matches)"))]
    IndexOutOfRange { index: usize, count: usize },

    #[snafu(display("partition '{name}' not found"))]
    PartitionNotFound { name: String },
}

type Result<T, E = PatchError> = std::result::Result<T, E>;

/// One occurrence of a search pattern within an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSite {
    /// Name of the partition holding the match.
    pub partition: String,
    /// Offset of the match within the partition payload.
    pub offset: usize,
    /// Absolute offset of the match within the image.
    pub image_offset: usize,
}

impl fmt::Display for MatchSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+0x{:X} (image offset 0x{:X})",
            self.partition, self.offset, self.image_offset
        )
    }
}

struct DisplayMatches<'a>(&'a [MatchSite]);

impl fmt::Display for DisplayMatches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, site) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{site}")?;
        }
        Ok(())
    }
}

/// An exact-length byte replacement.
///
/// The replacement must be the same length as the search pattern: partitions
/// are packed back to back, so growing or shrinking a payload would shift
/// every region that follows.
#[derive(Debug, Clone)]
#[must_use]
pub struct Patch {
    search: Vec<u8>,
    replace: Vec<u8>,
}

impl Patch {
    /// Creates a patch from raw byte patterns.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::EmptyPattern`] for an empty search pattern and
    /// [`PatchError::SizeMismatch`] if the lengths differ.
    pub fn new(search: impl Into<Vec<u8>>, replace: impl Into<Vec<u8>>) -> Result<Self> {
        let search = search.into();
        let replace = replace.into();

        snafu::ensure!(!search.is_empty(), EmptyPatternSnafu);
        snafu::ensure!(
            search.len() == replace.len(),
            SizeMismatchSnafu {
                search_len: search.len(),
                replace_len: replace.len(),
            }
        );

        Ok(Self { search, replace })
    }

    /// Creates a patch from hex-encoded patterns, e.g. `"30b583b002ab"`.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::InvalidHex`] if either string is not even-length
    /// hexadecimal, plus the errors of [`Patch::new()`].
    pub fn from_hex(search: &str, replace: &str) -> Result<Self> {
        let search = hex::decode(search).context(InvalidHexSnafu)?;
        let replace = hex::decode(replace).context(InvalidHexSnafu)?;
        Self::new(search, replace)
    }

    /// Returns the search pattern.
    #[must_use]
    pub fn search(&self) -> &[u8] {
        &self.search
    }

    /// Returns the replacement pattern.
    #[must_use]
    pub fn replace(&self) -> &[u8] {
        &self.replace
    }

    /// Returns every offset in `data` where the search pattern occurs.
    ///
    /// Overlapping occurrences count as distinct matches; every start offset
    /// is scanned.
    pub(crate) fn scan<'a>(&'a self, data: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        let needle = self.search.as_slice();
        data.windows(needle.len())
            .enumerate()
            .filter(move |(_, window)| *window == needle)
            .map(|(offset, _)| offset)
    }

    /// Writes the replacement over the payload bytes at `offset`.
    ///
    /// The caller has already verified the match, so this cannot grow the
    /// buffer.
    pub(crate) fn write_at(&self, data: &mut [u8], offset: usize) {
        data[offset..offset + self.replace.len()].copy_from_slice(&self.replace);
    }
}

/// Picks the single match to apply from a candidate list, returning its
/// position within the list.
///
/// Without an index the match must be unique; with one, it selects among the
/// candidates in image offset order.
pub(crate) fn select_match(matches: &[MatchSite], index: Option<usize>) -> Result<usize> {
    match index {
        None => match matches.len() {
            0 => NotFoundSnafu.fail(),
            1 => Ok(0),
            _ => AmbiguousSnafu {
                matches: matches.to_vec(),
            }
            .fail(),
        },
        Some(index) => {
            snafu::ensure!(!matches.is_empty(), NotFoundSnafu);
            snafu::ensure!(
                index < matches.len(),
                IndexOutOfRangeSnafu {
                    index,
                    count: matches.len(),
                }
            );
            Ok(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unequal_lengths() {
        match Patch::new(vec![1, 2, 3], vec![1, 2]) {
            Err(PatchError::SizeMismatch {
                search_len,
                replace_len,
            }) => {
                assert_eq!(search_len, 3);
                assert_eq!(replace_len, 2);
            }
            other => panic!("expected SizeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_pattern() {
        assert!(matches!(
            Patch::new(vec![], vec![]),
            Err(PatchError::EmptyPattern)
        ));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(matches!(
            Patch::from_hex("30b5", "zz07"),
            Err(PatchError::InvalidHex { .. })
        ));
        // Odd-length strings are not decodable either.
        assert!(matches!(
            Patch::from_hex("30b58", "00207"),
            Err(PatchError::InvalidHex { .. })
        ));
    }

    #[test]
    fn decodes_hex_patterns() {
        let patch = Patch::from_hex("30b583b002ab", "002070470000").unwrap();
        assert_eq!(patch.search(), &[0x30, 0xB5, 0x83, 0xB0, 0x02, 0xAB]);
        assert_eq!(patch.replace(), &[0x00, 0x20, 0x70, 0x47, 0x00, 0x00]);
    }

    #[test]
    fn scan_counts_overlapping_occurrences() {
        let patch = Patch::new(vec![0xAA, 0xAA], vec![0x00, 0x00]).unwrap();
        let hits: Vec<usize> = patch.scan(&[0xAA, 0xAA, 0xAA, 0xAA]).collect();
        assert_eq!(hits, vec![0, 1, 2]);
    }

    #[test]
    fn select_requires_unique_match() {
        let site = |offset| MatchSite {
            partition: "lk".into(),
            offset,
            image_offset: 0x200 + offset,
        };

        assert!(matches!(select_match(&[], None), Err(PatchError::NotFound)));
        assert_eq!(select_match(&[site(4)], None).unwrap(), 0);

        match select_match(&[site(4), site(9)], None) {
            Err(PatchError::Ambiguous { matches }) => {
                assert_eq!(matches, vec![site(4), site(9)]);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }

        assert_eq!(select_match(&[site(4), site(9)], Some(1)).unwrap(), 1);
        assert!(matches!(
            select_match(&[site(4)], Some(3)),
            Err(PatchError::IndexOutOfRange { index: 3, count: 1 })
        ));
    }
}
