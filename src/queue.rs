//! Expiry-ordered timer queue with O(1) lookup and removal by name.
//!
//! A [`TimerQueue`] owns a set of named entries, each with an absolute
//! expiry reading and an enabled flag. Entries live in a slab; a hash map
//! keys them by name and an intrusive doubly-linked list threads the
//! *enabled* entries in ascending expiry order (wraparound-safe, FIFO on
//! ties). The slab index acts as a stable handle, so unlinking an entry is
//! O(1) while sorted insertion walks the list.
//!
//! Disabled entries (drained, or armed with a negative timeout) stay in the
//! map and can be re-armed in place with [`TimerQueue::change`]; only
//! [`TimerQueue::remove`] destroys an entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::clock::{TickClock, Ticks};
use crate::error::{WatchdogError, WatchdogResult};

struct Node {
    name: String,
    expiry: Ticks,
    linked: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered collection of named, independently timed entries.
pub struct TimerQueue {
    clock: Arc<dyn TickClock>,
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    active: usize,
}

impl TimerQueue {
    /// Create an empty queue reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn TickClock>) -> Self {
        Self {
            clock,
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            active: 0,
        }
    }

    /// Insert a new entry expiring `timeout_ms` from now.
    ///
    /// A negative timeout inserts the entry disabled; zero arms it to expire
    /// at the current reading, so it is picked up by the very next drain.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::DuplicateEntry`] if the name is already
    /// present, with no state change.
    pub fn add(&mut self, name: &str, timeout_ms: i32) -> WatchdogResult<()> {
        if self.index.contains_key(name) {
            return Err(WatchdogError::duplicate_entry(name));
        }
        let idx = self.alloc(name);
        self.index.insert(name.to_owned(), idx);
        self.arm(idx, timeout_ms);
        Ok(())
    }

    /// Re-arm an existing entry with a new timeout from now.
    ///
    /// Unlinks the entry if currently enabled, then applies the same timeout
    /// interpretation as [`TimerQueue::add`]. The map entry is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::UnknownEntry`] if the name is absent.
    pub fn change(&mut self, name: &str, timeout_ms: i32) -> WatchdogResult<()> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| WatchdogError::unknown_entry(name))?;
        if self.nodes[idx].linked {
            self.unlink(idx);
        }
        self.arm(idx, timeout_ms);
        Ok(())
    }

    /// Destroy an entry entirely. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(idx) = self.index.remove(name) else {
            return false;
        };
        if self.nodes[idx].linked {
            self.unlink(idx);
        }
        self.nodes[idx].name.clear();
        self.free.push(idx);
        true
    }

    /// Whether an entry with this name exists, enabled or not.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of entries in the map, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of enabled entries in the ordered sequence.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active
    }

    /// Milliseconds until the earliest enabled entry expires.
    ///
    /// Negative or zero when that entry is already due. `None` when no entry
    /// is enabled.
    #[must_use]
    pub fn next_expiry_offset(&self) -> Option<i32> {
        let head = self.head?;
        Some(self.nodes[head].expiry.offset_from(self.clock.now()))
    }

    /// Drain every entry due at the current reading.
    ///
    /// Returns a one-shot iterator yielding due entry names in ascending
    /// expiry order (insertion order on ties). Each yielded entry is
    /// unlinked and left disabled in the map. "Now" is sampled once, when
    /// this method is called.
    pub fn expunge_expired(&mut self) -> ExpiredEntries<'_> {
        let now = self.clock.now();
        ExpiredEntries { queue: self, now }
    }

    /// Remove every entry, enabled or not.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.active = 0;
    }

    fn alloc(&mut self, name: &str) -> usize {
        if let Some(idx) = self.free.pop() {
            let node = &mut self.nodes[idx];
            node.name.clear();
            node.name.push_str(name);
            node.linked = false;
            node.prev = None;
            node.next = None;
            idx
        } else {
            self.nodes.push(Node {
                name: name.to_owned(),
                expiry: Ticks::new(0),
                linked: false,
                prev: None,
                next: None,
            });
            self.nodes.len() - 1
        }
    }

    fn arm(&mut self, idx: usize, timeout_ms: i32) {
        if timeout_ms < 0 {
            return;
        }
        self.nodes[idx].expiry = self.clock.now().advanced_by(timeout_ms);
        self.link_sorted(idx);
    }

    /// Link `idx` before the first node strictly later than its expiry.
    /// Equal expiries keep insertion order.
    fn link_sorted(&mut self, idx: usize) {
        let expiry = self.nodes[idx].expiry;

        // Common case: re-armed entries land at or past the tail.
        if let Some(tail) = self.tail
            && self.nodes[tail].expiry.offset_from(expiry) <= 0
        {
            self.nodes[idx].prev = Some(tail);
            self.nodes[idx].next = None;
            self.nodes[tail].next = Some(idx);
            self.tail = Some(idx);
            self.nodes[idx].linked = true;
            self.active += 1;
            return;
        }

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(c) = cursor {
            if self.nodes[c].expiry.offset_from(expiry) > 0 {
                break;
            }
            prev = Some(c);
            cursor = self.nodes[c].next;
        }

        self.nodes[idx].prev = prev;
        self.nodes[idx].next = cursor;
        match prev {
            Some(p) => self.nodes[p].next = Some(idx),
            None => self.head = Some(idx),
        }
        match cursor {
            Some(c) => self.nodes[c].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.nodes[idx].linked = true;
        self.active += 1;
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[idx];
        node.prev = None;
        node.next = None;
        node.linked = false;
        self.active -= 1;
    }
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("len", &self.index.len())
            .field("active", &self.active)
            .finish()
    }
}

/// One-shot draining iterator returned by [`TimerQueue::expunge_expired`].
pub struct ExpiredEntries<'a> {
    queue: &'a mut TimerQueue,
    now: Ticks,
}

impl Iterator for ExpiredEntries<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let head = self.queue.head?;
        if !self.queue.nodes[head].expiry.is_due_at(self.now) {
            return None;
        }
        self.queue.unlink(head);
        Some(self.queue.nodes[head].name.clone())
    }
}

impl fmt::Debug for ExpiredEntries<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiredEntries")
            .field("now", &self.now)
            .finish()
    }
}
