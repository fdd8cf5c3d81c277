use core::fmt;

/// Sentinel index meaning "no neighbour".
const NIL: usize = usize::MAX;

/// A stable reference to a node in a [`List`].
///
/// Handles carry the generation of the slot they were issued for. Once the
/// node is removed the slot's generation advances, so a stale handle is
/// rejected instead of aliasing whatever value reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Handle {
    index: usize,
    generation: u32,
}

/// A slot in the arena backing the list.
///
/// Vacant slots keep their generation and sit on the free list.
struct Node<T> {
    /// The stored value, `None` while the slot is vacant.
    val: Option<T>,
    /// Index of the neighbour closer to the front.
    prev: usize,
    /// Index of the neighbour closer to the back.
    next: usize,
    /// Incremented every time the slot is vacated.
    generation: u32,
}

/// A doubly linked list stored in a single arena.
///
/// The front holds the most recently attached value, the back the oldest.
/// All structural operations are O(1): nodes are linked by index, and freed
/// slots are recycled through a free list.
///
/// # Examples
///
/// ```ignore
/// let mut list = List::new();
/// let a = list.add(10);
/// let _b = list.add(20);
///
/// list.move_to_front(a);
/// assert_eq!(list.remove_last(), Some(20));
/// ```
pub(crate) struct List<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> List<T> {
    /// Creates an empty list.
    pub(crate) fn new() -> Self {
        List {
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Returns the number of values in the list.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the list holds no values.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_live(&self, handle: Handle) -> bool {
        self.nodes
            .get(handle.index)
            .is_some_and(|n| n.generation == handle.generation && n.val.is_some())
    }

    /// Unlinks `index` from its neighbours. The slot stays occupied.
    fn detach(&mut self, index: usize) {
        let (prev, next) = {
            let node = &self.nodes[index];
            (node.prev, node.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        let node = &mut self.nodes[index];
        node.prev = NIL;
        node.next = NIL;
    }

    /// Links a detached slot in at the front.
    fn attach_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[index];
            node.prev = NIL;
            node.next = old_head;
        }
        if old_head == NIL {
            self.tail = index;
        } else {
            self.nodes[old_head].prev = index;
        }
        self.head = index;
    }

    /// Vacates a detached slot and hands back its value.
    fn release(&mut self, index: usize) -> Option<T> {
        let node = &mut self.nodes[index];
        let val = node.val.take()?;
        node.generation = node.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(val)
    }

    /// Adds a value at the front of the list and returns its handle.
    pub(crate) fn add(&mut self, val: T) -> Handle {
        let index = match self.free.pop() {
            Some(index) => {
                self.nodes[index].val = Some(val);
                index
            }
            None => {
                self.nodes.push(Node {
                    val: Some(val),
                    prev: NIL,
                    next: NIL,
                    generation: 0,
                });
                self.nodes.len() - 1
            }
        };
        self.attach_front(index);
        self.len += 1;
        Handle {
            index,
            generation: self.nodes[index].generation,
        }
    }

    /// Moves the node behind `handle` to the front.
    ///
    /// Returns `false` if the handle is stale.
    pub(crate) fn move_to_front(&mut self, handle: Handle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        if self.head != handle.index {
            self.detach(handle.index);
            self.attach_front(handle.index);
        }
        true
    }

    /// Removes the node behind `handle` and returns its value.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        if !self.is_live(handle) {
            return None;
        }
        self.detach(handle.index);
        self.release(handle.index)
    }

    /// Removes the back (least recently attached) value.
    pub(crate) fn remove_last(&mut self) -> Option<T> {
        if self.tail == NIL {
            return None;
        }
        let index = self.tail;
        self.detach(index);
        self.release(index)
    }

    /// Returns the value at the back without removing it.
    pub(crate) fn peek_last(&self) -> Option<&T> {
        if self.tail == NIL {
            return None;
        }
        self.nodes[self.tail].val.as_ref()
    }

    /// Returns a reference to the value behind `handle`.
    pub(crate) fn get(&self, handle: Handle) -> Option<&T> {
        if !self.is_live(handle) {
            return None;
        }
        self.nodes[handle.index].val.as_ref()
    }

    /// Returns a mutable reference to the value behind `handle`.
    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if !self.is_live(handle) {
            return None;
        }
        self.nodes[handle.index].val.as_mut()
    }

    /// Iterates from front (most recent) to back.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Front-to-back iterator over a [`List`].
pub(crate) struct Iter<'a, T> {
    list: &'a List<T>,
    cursor: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.cursor == NIL {
            return None;
        }
        let node = &self.list.nodes[self.cursor];
        self.cursor = node.next;
        self.remaining -= 1;
        node.val.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
