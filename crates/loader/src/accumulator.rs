use debarchive_storage::models::{ContentRecord, DirectoryRecord, ObjectId, ObjectSet};
use std::collections::{BTreeMap, HashSet};

/// Contents and directories pending submission, deduplicated across a run.
///
/// The pending maps are emptied by every flush, but the seen sets live as
/// long as the accumulator: an id is never queued twice in one run, even
/// after the object it names has been flushed.
#[derive(Debug, Default)]
pub struct ObjectAccumulator {
    contents: BTreeMap<ObjectId, ContentRecord>,
    directories: BTreeMap<ObjectId, DirectoryRecord>,
    content_seen: HashSet<ObjectId>,
    directory_seen: HashSet<ObjectId>,
}

impl ObjectAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every object of `objects` whose id hasn't been seen yet.
    ///
    /// The first record seen for an id wins.
    pub fn merge_dedup(&mut self, objects: ObjectSet) {
        for content in objects.contents {
            if self.content_seen.insert(content.id.clone()) {
                self.contents.insert(content.id.clone(), content);
            }
        }
        for directory in objects.directories {
            if self.directory_seen.insert(directory.id.clone()) {
                self.directories.insert(directory.id.clone(), directory);
            }
        }
    }

    pub fn contents(&self) -> impl Iterator<Item = &ContentRecord> {
        self.contents.values()
    }

    pub fn directories(&self) -> impl Iterator<Item = &DirectoryRecord> {
        self.directories.values()
    }

    pub fn content(&self, id: &ObjectId) -> Option<&ContentRecord> {
        self.contents.get(id)
    }

    pub fn content_count(&self) -> usize {
        self.contents.len()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty() && self.directories.is_empty()
    }

    /// Cumulative length of pending contents no longer than `max_length_one`.
    pub fn eligible_length(&self, max_length_one: u64) -> u64 {
        self.contents.values().map(|c| c.length).filter(|&length| length <= max_length_one).sum()
    }

    pub fn content_seen(&self, id: &ObjectId) -> bool {
        self.content_seen.contains(id)
    }

    pub fn directory_seen(&self, id: &ObjectId) -> bool {
        self.directory_seen.contains(id)
    }

    /// Drain pending directories, leaving the seen sets untouched.
    pub(crate) fn take_directories(&mut self) -> Vec<DirectoryRecord> {
        std::mem::take(&mut self.directories).into_values().collect()
    }

    /// Drain pending contents, leaving the seen sets untouched.
    pub(crate) fn take_contents(&mut self) -> BTreeMap<ObjectId, ContentRecord> {
        std::mem::take(&mut self.contents)
    }
}

/// Keep only the first object of each id within a single package.
///
/// Directory order is preserved, so the root directory stays last.
pub fn dedup_within(objects: ObjectSet) -> ObjectSet {
    let mut seen = HashSet::new();
    let contents = objects.contents.into_iter().filter(|c| seen.insert(c.id.clone())).collect();
    let mut seen = HashSet::new();
    let directories = objects.directories.into_iter().filter(|d| seen.insert(d.id.clone())).collect();
    ObjectSet { root: objects.root, contents, directories }
}
