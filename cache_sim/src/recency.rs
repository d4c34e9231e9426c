//! Usage order of the tags resident in one set.
//!
//! Tags form a doubly linked list threaded through a slot vector, oldest at
//! `head` and newest at `tail`. A tag -> slot index keeps `touch` and `remove`
//! O(1); freed slots are recycled by later insertions.

use std::collections::HashMap;

use crate::common::Tag;

struct Node {
    tag: Tag,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
pub struct RecencyTracker {
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<Tag, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl RecencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// marks `tag` as most recently used, inserting it if absent.
    pub fn touch(&mut self, tag: Tag) {
        match self.index.get(&tag) {
            Some(&slot) => {
                if self.tail != Some(slot) {
                    self.unlink(slot);
                    self.push_back(slot);
                }
            }
            None => {
                let node = Node {
                    tag,
                    prev: None,
                    next: None,
                };
                let slot = match self.free.pop() {
                    Some(slot) => {
                        self.nodes[slot] = node;
                        slot
                    }
                    None => {
                        self.nodes.push(node);
                        self.nodes.len() - 1
                    }
                };
                self.index.insert(tag, slot);
                self.push_back(slot);
            }
        }
    }

    /// least recently used tag, left in place. `None` iff empty.
    pub fn eviction_candidate(&self) -> Option<Tag> {
        self.head.map(|slot| self.nodes[slot].tag)
    }

    pub fn remove(&mut self, tag: Tag) {
        if let Some(slot) = self.index.remove(&tag) {
            self.unlink(slot);
            self.free.push(slot);
        }
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.index.contains_key(&tag)
    }

    /// tags from least to most recently used.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tracker: self,
            cursor: self.head,
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = &self.nodes[slot];
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[slot];
        node.prev = None;
        node.next = None;
    }

    fn push_back(&mut self, slot: usize) {
        self.nodes[slot].prev = self.tail;
        self.nodes[slot].next = None;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }
}

pub struct Iter<'a> {
    tracker: &'a RecencyTracker,
    cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = Tag;

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.tracker.nodes[self.cursor?];
        self.cursor = node.next;
        Some(node.tag)
    }
}

impl<'a> IntoIterator for &'a RecencyTracker {
    type Item = Tag;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
