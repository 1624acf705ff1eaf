use std::collections::BTreeMap;
use std::collections::btree_map;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// One entry of an asset listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read-only source of element definition files.
///
/// Implemented over a filesystem directory by [`DirSource`]; tests and
/// embedders can provide their own.
pub trait AssetSource: Send + Sync {
    /// Human-readable location, used in log messages.
    fn location(&self) -> String;

    /// List the entries at the root of the source.
    fn list(&self) -> io::Result<Vec<AssetEntry>>;

    /// Read the full contents of the file named `name`.
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// Element definitions read from a directory on disk.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl AssetSource for DirSource {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn list(&self) -> io::Result<Vec<AssetEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        location = %self.dir.display(),
                        "Skipping unreadable directory entry: {e}"
                    );
                    continue;
                }
            };
            // file_type() does not follow symlinks; a link to a directory is
            // skipped later when reading it fails.
            let is_dir = match entry.file_type() {
                Ok(file_type) => file_type.is_dir(),
                Err(e) => {
                    tracing::warn!(
                        location = %self.dir.display(),
                        file = %entry.file_name().to_string_lossy(),
                        "Skipping entry with unknown file type: {e}"
                    );
                    continue;
                }
            };
            entries.push(AssetEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        Ok(entries)
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.dir.join(name))
    }
}

/// Element name → element source text.
///
/// Built once at startup and never mutated afterwards; share it behind an
/// `Arc`. Keys are kept sorted so the encoded payload is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ElementTable(BTreeMap<String, String>);

impl ElementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file in `dir` as an element definition.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        load_elements(&DirSource::new(dir.as_ref()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ElementTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Strip the suffix after the final `.` (dot included).
///
/// `my-header.mjs` → `my-header`, `a.b.c` → `a.b`, `README` → `README`.
pub fn element_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => file_name,
    }
}

/// Build an [`ElementTable`] from every regular file in `source`.
///
/// Never fails: an unreadable listing yields an empty table and an
/// unreadable file is skipped. Both are logged.
pub fn load_elements(source: &dyn AssetSource) -> ElementTable {
    let location = source.location();
    let mut entries = match source.list() {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(location, "Failed to read elements directory: {e}");
            return ElementTable::new();
        }
    };
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = BTreeMap::new();
    for entry in entries.into_iter().filter(|e| !e.is_dir) {
        let content = match source.read(&entry.name) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(location, file = entry.name, "Failed to read element file: {e}");
                continue;
            }
        };

        let name = element_name(&entry.name).to_string();
        let text = match String::from_utf8(content) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = entry.name, "Element file is not valid UTF-8, replacing invalid bytes");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        if table.insert(name.clone(), text).is_some() {
            tracing::warn!(element = name, file = entry.name, "Duplicate element name, later file wins");
        }
    }

    tracing::info!(location, count = table.len(), "Elements loaded");
    ElementTable(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// In-memory source whose reads can be made to fail per file.
    struct MemSource {
        files: Vec<(&'static str, Result<&'static str, ()>)>,
        dirs: Vec<&'static str>,
        fail_listing: bool,
    }

    impl AssetSource for MemSource {
        fn location(&self) -> String {
            "memory".into()
        }

        fn list(&self) -> io::Result<Vec<AssetEntry>> {
            if self.fail_listing {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            let files = self.files.iter().map(|(name, _)| AssetEntry {
                name: name.to_string(),
                is_dir: false,
            });
            let dirs = self.dirs.iter().map(|name| AssetEntry {
                name: name.to_string(),
                is_dir: true,
            });
            Ok(files.chain(dirs).collect())
        }

        fn read(&self, name: &str) -> io::Result<Vec<u8>> {
            match self.files.iter().find(|(n, _)| *n == name) {
                Some((_, Ok(body))) => Ok(body.as_bytes().to_vec()),
                Some((_, Err(()))) => Err(io::Error::other("read failed")),
                None => Err(io::Error::from(io::ErrorKind::NotFound)),
            }
        }
    }

    #[test]
    fn element_name_strips_final_extension() {
        assert_eq!(element_name("my-header.mjs"), "my-header");
        assert_eq!(element_name("my-header.html"), "my-header");
        assert_eq!(element_name("a.b.c"), "a.b");
        assert_eq!(element_name("README"), "README");
        assert_eq!(element_name("trailing."), "trailing");
    }

    #[test]
    fn loads_files_and_skips_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("my-header.mjs"), "export default function MyHeader() {}").unwrap();
        fs::write(dir.path().join("my-footer.html"), "<footer><slot></slot></footer>").unwrap();
        fs::write(dir.path().join("plain"), "raw").unwrap();
        fs::create_dir(dir.path().join("nested.d")).unwrap();
        fs::write(dir.path().join("nested.d").join("inner.mjs"), "ignored").unwrap();

        let table = ElementTable::from_dir(dir.path());

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get("my-header"),
            Some("export default function MyHeader() {}")
        );
        assert_eq!(table.get("my-footer"), Some("<footer><slot></slot></footer>"));
        assert_eq!(table.get("plain"), Some("raw"));
        assert!(!table.contains("nested"));
        assert!(!table.contains("inner"));
    }

    #[cfg(unix)]
    #[test]
    fn broken_entry_does_not_discard_the_listing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a-ok.mjs"), "a").unwrap();
        fs::write(dir.path().join("z-ok.mjs"), "z").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("m-dangling.mjs")).unwrap();

        let entries = DirSource::new(dir.path()).list().unwrap();
        assert_eq!(entries.len(), 3);

        let table = ElementTable::from_dir(dir.path());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a-ok"), Some("a"));
        assert_eq!(table.get("z-ok"), Some("z"));
    }

    #[test]
    fn contents_are_stored_verbatim() {
        let dir = tempdir().unwrap();
        let body = "  <style>a > b { color: red }</style>\r\n&amp;\n";
        fs::write(dir.path().join("x-raw.html"), body).unwrap();

        let table = ElementTable::from_dir(dir.path());
        assert_eq!(table.get("x-raw"), Some(body));
    }

    #[test]
    fn missing_directory_yields_empty_table() {
        let dir = tempdir().unwrap();
        let table = ElementTable::from_dir(dir.path().join("does-not-exist"));
        assert!(table.is_empty());
    }

    #[test]
    fn listing_failure_yields_empty_table() {
        let source = MemSource {
            files: vec![("a.mjs", Ok("a"))],
            dirs: vec![],
            fail_listing: true,
        };
        assert!(load_elements(&source).is_empty());
    }

    #[test]
    fn unreadable_file_is_skipped_others_load() {
        let source = MemSource {
            files: vec![
                ("good-one.mjs", Ok("one")),
                ("broken.mjs", Err(())),
                ("good-two.mjs", Ok("two")),
            ],
            dirs: vec!["subdir"],
            fail_listing: false,
        };

        let table = load_elements(&source);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("good-one"), Some("one"));
        assert_eq!(table.get("good-two"), Some("two"));
        assert!(!table.contains("broken"));
        assert!(!table.contains("subdir"));
    }

    #[test]
    fn duplicate_names_resolve_to_last_file_by_name() {
        let source = MemSource {
            files: vec![("card.mjs", Ok("module")), ("card.html", Ok("template"))],
            dirs: vec![],
            fail_listing: false,
        };

        let table = load_elements(&source);
        assert_eq!(table.len(), 1);
        // "card.mjs" sorts after "card.html"
        assert_eq!(table.get("card"), Some("module"));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bin.mjs"), [b'o', b'k', 0xff]).unwrap();

        let table = ElementTable::from_dir(dir.path());
        assert_eq!(table.get("bin"), Some("ok\u{fffd}"));
    }

    #[test]
    fn collects_from_pairs() {
        let table: ElementTable = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
