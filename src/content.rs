//! Content Index: the bijection between `ObjectID` and filesystem path, and
//! the container-listing engine that walks the served directory tree
//! (spec §3, §4.1).

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::SystemTime,
};

use crate::error::ContentError;

pub type ObjectId = u32;

pub const ROOT_ID: ObjectId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Container,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpnpClass {
    VideoItem,
    MusicTrack,
    Photo,
}

impl UpnpClass {
    pub fn as_str(self) -> &'static str {
        match self {
            UpnpClass::VideoItem => "object.item.videoItem",
            UpnpClass::MusicTrack => "object.item.audioItem.musicTrack",
            UpnpClass::Photo => "object.item.imageItem.photo",
        }
    }
}

/// The unit traded between the Content Index and the DIDL-Lite encoder
/// (spec §3 "ContentObject").
#[derive(Debug, Clone)]
pub struct ContentObject {
    pub id: ObjectId,
    pub parent_id: ObjectId,
    pub title: String,
    pub kind: Kind,
    pub item: Option<ItemInfo>,
    pub child_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ItemInfo {
    pub mime_type: &'static str,
    pub upnp_class: UpnpClass,
    pub size: u64,
    pub last_modified: SystemTime,
}

/// Extension -> (MIME type, UPnP class) lookup table (spec §3, authoritative
/// for both the encoder and the HTTP server).
fn classify_extension(ext: &str) -> Option<(&'static str, UpnpClass)> {
    let ext = ext.to_ascii_lowercase();
    Some(match ext.as_str() {
        "mp4" | "m4v" | "mov" => ("video/mp4", UpnpClass::VideoItem),
        "mkv" => ("video/x-matroska", UpnpClass::VideoItem),
        "avi" => ("video/x-msvideo", UpnpClass::VideoItem),
        "webm" => ("video/webm", UpnpClass::VideoItem),
        "ts" | "m2ts" => ("video/mp2t", UpnpClass::VideoItem),
        "mp3" => ("audio/mpeg", UpnpClass::MusicTrack),
        "flac" => ("audio/flac", UpnpClass::MusicTrack),
        "wav" => ("audio/wav", UpnpClass::MusicTrack),
        "aac" | "m4a" => ("audio/mp4", UpnpClass::MusicTrack),
        "ogg" => ("audio/ogg", UpnpClass::MusicTrack),
        "jpg" | "jpeg" => ("image/jpeg", UpnpClass::Photo),
        "png" => ("image/png", UpnpClass::Photo),
        "gif" => ("image/gif", UpnpClass::Photo),
        _ => return None,
    })
}

/// A resolved entry: either the served root still exists, a bound path that
/// has since vanished ("gone", spec §3 Lifecycle), or an unknown id.
pub enum Resolved {
    Path(PathBuf),
    Gone,
}

struct IdTables {
    /// ObjectID -> absolute filesystem path. Once inserted, an entry is never
    /// removed for the process lifetime (spec §3 invariant i).
    by_id: HashMap<ObjectId, PathBuf>,
    /// absolute filesystem path -> ObjectID, the reverse of `by_id`.
    by_path: HashMap<PathBuf, ObjectId>,
    next_id: ObjectId,
}

/// Maps the served directory subtree to a dense integer `ObjectID` space and
/// answers lookup/list/classify queries (spec §4.1).
///
/// ID assignment is single-writer (spec §4.1, §5): the whole table lives
/// behind one mutex, which also guards lookups — the expected traffic here is
/// occasional directory listings, not a hot path that would benefit from a
/// reader-preferring lock.
pub struct ContentIndex {
    root: PathBuf,
    tables: Mutex<IdTables>,
}

impl ContentIndex {
    pub fn new(root: PathBuf) -> Self {
        let mut by_id = HashMap::new();
        let mut by_path = HashMap::new();
        by_id.insert(ROOT_ID, root.clone());
        by_path.insert(root.clone(), ROOT_ID);

        Self {
            root,
            tables: Mutex::new(IdTables {
                by_id,
                by_path,
                next_id: ROOT_ID + 1,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `lookup(id) -> path | NotFound` (spec §4.1). Once an id has been
    /// returned, its path mapping is stable even if the file has since
    /// disappeared — callers distinguish that case with [`Self::resolve`].
    pub fn lookup(&self, id: ObjectId) -> Result<PathBuf, ContentError> {
        let tables = self.tables.lock().unwrap();
        tables.by_id.get(&id).cloned().ok_or(ContentError::NotFound)
    }

    /// Like [`Self::lookup`], but distinguishes a bound id whose file has
    /// since vanished from the filesystem ("gone", spec §3 Lifecycle) from an
    /// id that was never assigned.
    pub fn resolve(&self, id: ObjectId) -> Result<Resolved, ContentError> {
        let path = self.lookup(id)?;
        if path.exists() {
            Ok(Resolved::Path(path))
        } else {
            Ok(Resolved::Gone)
        }
    }

    fn parent_id_of(&self, path: &Path) -> Option<ObjectId> {
        let tables = self.tables.lock().unwrap();
        path.parent().and_then(|p| tables.by_path.get(p).copied())
    }

    /// `classify(path) -> ContentObject` (spec §4.1). Returns `None` for
    /// hidden files and files whose extension is not in the MIME table —
    /// both are elided from container listings.
    fn classify(&self, id: ObjectId, parent_id: ObjectId, path: &Path) -> Option<ContentObject> {
        let title = path.file_name()?.to_string_lossy().into_owned();
        if title.starts_with('.') {
            return None;
        }

        let metadata = path.metadata().ok()?;
        if metadata.is_dir() {
            return Some(ContentObject {
                id,
                parent_id,
                title,
                kind: Kind::Container,
                item: None,
                child_count: None,
            });
        }

        let ext = path.extension()?.to_string_lossy();
        let (mime_type, upnp_class) = classify_extension(&ext)?;
        Some(ContentObject {
            id,
            parent_id,
            title,
            kind: Kind::Item,
            item: Some(ItemInfo {
                mime_type,
                upnp_class,
                size: metadata.len(),
                last_modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            }),
            child_count: None,
        })
    }

    /// Assigns (or reuses) an ObjectID for `path`, which must be a direct
    /// child of an already-known directory. Serialized behind the table
    /// mutex (spec §4.1 "ID assignment is single-writer").
    fn id_for_child(&self, path: &Path) -> ObjectId {
        let mut tables = self.tables.lock().unwrap();
        if let Some(id) = tables.by_path.get(path) {
            return *id;
        }
        let id = tables.next_id;
        tables.next_id += 1;
        tables.by_id.insert(id, path.to_path_buf());
        tables.by_path.insert(path.to_path_buf(), id);
        id
    }

    /// Builds the full, sorted child list of a directory without paging.
    /// Shared by [`Self::list`] and [`Self::metadata`].
    fn children_of(&self, dir: &Path, parent_id: ObjectId) -> std::io::Result<Vec<ContentObject>> {
        let mut entries: Vec<(PathBuf, ContentObject)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let id = self.id_for_child(&path);
            if let Some(obj) = self.classify(id, parent_id, &path) {
                entries.push((path, obj));
            }
        }

        // Containers before items, then case-insensitive lexicographic by
        // title (spec §4.1 "Ordering"), deterministic within one snapshot.
        entries.sort_by(|(_, a), (_, b)| {
            let kind_order = |k: Kind| matches!(k, Kind::Item) as u8;
            kind_order(a.kind)
                .cmp(&kind_order(b.kind))
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });

        let mut out = Vec::with_capacity(entries.len());
        for (path, mut obj) in entries {
            if obj.kind == Kind::Container {
                obj.child_count = self.count_children(&path);
            }
            out.push(obj);
        }

        Ok(out)
    }

    /// Shallow child count for a container, ignoring hidden/unclassified
    /// entries, without recursing into grandchildren.
    fn count_children(&self, dir: &Path) -> Option<usize> {
        let entries = std::fs::read_dir(dir).ok()?;
        Some(
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let path = e.path();
                    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                    else {
                        return false;
                    };
                    if name.starts_with('.') {
                        return false;
                    }
                    path.is_dir()
                        || path
                            .extension()
                            .and_then(|e| e.to_str())
                            .and_then(classify_extension)
                            .is_some()
                })
                .count(),
        )
    }

    /// `list(id, offset, limit) -> (children, total) | NotContainer | NotFound`
    /// (spec §4.1). `limit == 0` means "all" (spec §4.3 `RequestedCount`).
    pub fn list(
        &self,
        id: ObjectId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<ContentObject>, usize), ContentError> {
        let path = self.lookup(id)?;
        if !path.is_dir() {
            return Err(ContentError::NotContainer);
        }

        let all = self
            .children_of(&path, id)
            .map_err(|_| ContentError::NotFound)?;
        let total = all.len();
        let window = if limit == 0 {
            all.into_iter().skip(offset).collect()
        } else {
            all.into_iter().skip(offset).take(limit).collect()
        };
        Ok((window, total))
    }

    /// `BrowseMetadata` support (spec §4.2): a single `ContentObject`
    /// describing `id` itself, with `parentId == u32::MAX` standing in for
    /// "-1" when `id` is the root (spec §4.2 "Root metadata must report
    /// parentID = -1").
    pub fn metadata(&self, id: ObjectId) -> Result<ContentObject, ContentError> {
        let path = self.lookup(id)?;
        if id == ROOT_ID {
            let child_count = self.children_of(&path, ROOT_ID).map(|c| c.len()).ok();
            return Ok(ContentObject {
                id: ROOT_ID,
                parent_id: u32::MAX,
                title: self.root_title(),
                kind: Kind::Container,
                item: None,
                child_count,
            });
        }

        let parent_id = self.parent_id_of(&path).ok_or(ContentError::NotFound)?;
        self.classify(id, parent_id, &path)
            .ok_or(ContentError::NotFound)
    }

    fn root_title(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn make_tree() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mp4"), [0u8; 10]).unwrap();
        fs::write(dir.path().join("b.txt"), b"not media").unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();
        fs::write(dir.path().join("photos").join("x.jpg"), b"jpeg-bytes").unwrap();
        fs::write(dir.path().join(".hidden.mp3"), b"hidden").unwrap();
        dir
    }

    #[test]
    fn root_browse_lists_containers_before_items_and_hides_unknown_and_dotfiles() {
        let dir = make_tree();
        let index = ContentIndex::new(dir.path().to_path_buf());
        let (children, total) = index.list(ROOT_ID, 0, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(children[0].title, "photos");
        assert_eq!(children[0].kind, Kind::Container);
        assert_eq!(children[1].title, "a.mp4");
        assert_eq!(children[1].kind, Kind::Item);
        let item = children[1].item.as_ref().unwrap();
        assert_eq!(item.mime_type, "video/mp4");
        assert_eq!(item.size, 10);
    }

    #[test]
    fn paged_list_reports_total_ignoring_window() {
        let dir = tempdir().unwrap();
        for i in 0..250 {
            fs::write(dir.path().join(format!("track{i:03}.mp3")), b"x").unwrap();
        }
        let index = ContentIndex::new(dir.path().to_path_buf());
        let (page, total) = index.list(ROOT_ID, 100, 50).unwrap();
        assert_eq!(total, 250);
        assert_eq!(page.len(), 50);
        assert_eq!(page[0].title, "track100.mp3");
        assert_eq!(page[49].title, "track149.mp3");
    }

    #[test]
    fn ids_are_stable_across_repeated_lists() {
        let dir = make_tree();
        let index = ContentIndex::new(dir.path().to_path_buf());
        let (first, _) = index.list(ROOT_ID, 0, 0).unwrap();
        let (second, _) = index.list(ROOT_ID, 0, 0).unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[1].id, second[1].id);
    }

    #[test]
    fn lookup_of_vanished_file_resolves_gone() {
        let dir = make_tree();
        let index = ContentIndex::new(dir.path().to_path_buf());
        let (children, _) = index.list(ROOT_ID, 0, 0).unwrap();
        let item_id = children[1].id;
        fs::remove_file(dir.path().join("a.mp4")).unwrap();
        match index.resolve(item_id).unwrap() {
            Resolved::Gone => {}
            Resolved::Path(_) => panic!("expected Gone"),
        }
        // the id is still bound, just unreachable.
        assert!(index.lookup(item_id).is_ok());
    }

    #[test]
    fn root_metadata_reports_parent_sentinel() {
        let dir = make_tree();
        let index = ContentIndex::new(dir.path().to_path_buf());
        let root = index.metadata(ROOT_ID).unwrap();
        assert_eq!(root.parent_id, u32::MAX);
        assert_eq!(root.kind, Kind::Container);
    }

    #[test]
    fn listing_a_file_id_is_not_container() {
        let dir = make_tree();
        let index = ContentIndex::new(dir.path().to_path_buf());
        let (children, _) = index.list(ROOT_ID, 0, 0).unwrap();
        let file_id = children[1].id;
        assert_eq!(index.list(file_id, 0, 0).unwrap_err(), ContentError::NotContainer);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let dir = make_tree();
        let index = ContentIndex::new(dir.path().to_path_buf());
        assert_eq!(index.list(9999, 0, 0).unwrap_err(), ContentError::NotFound);
    }
}
