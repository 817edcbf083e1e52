//! The fixed index files and the streaming package-index parser.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{Error, Result};
use crate::filter::Filters;

/// The three well-known metadata files describing the whole repository.
pub const AUTHOR_INDEX: &str = "authors/01mailrc.txt.gz";
pub const PACKAGE_INDEX: &str = "modules/02packages.details.txt.gz";
pub const MODULE_INDEX: &str = "modules/03modlist.data.gz";

pub const FIXED_INDICES: [&str; 3] = [AUTHOR_INDEX, PACKAGE_INDEX, MODULE_INDEX];

/// The filename the package index must declare about itself in its
/// `File:` header. Anything else means a corrupt or truncated download.
const PACKAGE_INDEX_SELF: &str = "02packages.details.txt";

/// One `(module, version, archive path)` triple from the package index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub module: String,
    /// Declared version, or the literal `undef` for unversioned modules.
    pub version: String,
    /// Archive path relative to `authors/id/`.
    pub path: String,
}

/// Streaming reader over the gzipped package index.
///
/// One pass, lazy: lines are decompressed and split as the iterator is
/// driven, never collected. [`PackageIndex::open`] consumes the header
/// block (consecutive non-blank lines up to the first blank line) and
/// validates the self-identification, so iteration starts at the first
/// data line.
#[derive(Debug)]
pub struct PackageIndex {
    lines: Lines<BufReader<GzDecoder<File>>>,
    path: PathBuf,
}

impl PackageIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::IndexOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = BufReader::new(GzDecoder::new(file)).lines();

        let mut declares_itself = false;
        loop {
            let line = match lines.next() {
                // Stream ended inside the header: fall through to the
                // self-identification failure below.
                None => break,
                Some(Err(source)) => {
                    return Err(Error::IndexRead {
                        path: path.to_path_buf(),
                        source,
                    });
                }
                Some(Ok(line)) => line,
            };
            if line.trim().is_empty() {
                break;
            }
            if let Some(value) = line.strip_prefix("File:") {
                declares_itself = value.trim() == PACKAGE_INDEX_SELF;
            }
        }
        if !declares_itself {
            return Err(Error::IndexHeader {
                path: path.to_path_buf(),
                expected: PACKAGE_INDEX_SELF,
            });
        }

        Ok(Self {
            lines,
            path: path.to_path_buf(),
        })
    }
}

impl Iterator for PackageIndex {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(source) => {
                return Some(Err(Error::IndexRead {
                    path: self.path.clone(),
                    source,
                }));
            }
        };

        let mut fields = line.split_whitespace().map(str::to_string);
        let entry = match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(module), Some(version), Some(path), None) => IndexEntry {
                module,
                version,
                path,
            },
            _ => return Some(Err(Error::IndexLine(line.clone()))),
        };
        Some(Ok(entry))
    }
}

/// Build the deduplicated, lexicographically sorted set of archive paths
/// to mirror.
///
/// Multiple modules routinely share one archive; the set collapses them.
/// The sorted order makes runs reproducible for a given index, whatever
/// order the index listed its lines in.
pub fn mirror_list<I>(entries: I, filters: &Filters) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = Result<IndexEntry>>,
{
    let mut wanted = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        if filters.skip(&entry.module, &entry.path) {
            continue;
        }
        wanted.insert(format!("authors/id/{}", entry.path));
    }
    Ok(wanted)
}
