//! Fixed-capacity circular queue.
//!
//! Full and empty are told apart purely by head/tail adjacency: `head == tail`
//! is empty, `head + 1 == tail` (mod capacity) is full. One slot is therefore
//! always left unused, so a ring of `N` slots holds at most `N - 1` items.

#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write.
    head: usize,
    /// Oldest unread slot.
    tail: usize,
}

impl<T> RingBuffer<T> {
    /// A ring with `slots` slots. Fewer than two slots are rounded up to two.
    pub fn with_slots(slots: usize) -> Self {
        let slots = slots.max(2);
        Self {
            slots: std::iter::repeat_with(|| None).take(slots).collect(),
            head: 0,
            tail: 0,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.advance(self.head) == self.tail
    }

    /// Number of unread items, derived from head/tail.
    pub fn len(&self) -> usize {
        (self.head + self.slots.len() - self.tail) % self.slots.len()
    }

    /// Append at head. A full ring hands the item back untouched.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        match self.slots.get_mut(self.head) {
            Some(slot) => *slot = Some(item),
            None => return Err(item),
        }
        self.head = self.advance(self.head);
        Ok(())
    }

    /// Remove the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots.get_mut(self.tail).and_then(Option::take);
        self.tail = self.advance(self.tail);
        item
    }

    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots.get(self.tail).and_then(Option::as_ref)
    }

    /// Drop every unread item and reset both indices.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn eight_slots_hold_seven_items() {
        let mut ring = RingBuffer::with_slots(8);
        for i in 0..7 {
            assert!(ring.push(i).is_ok());
        }
        assert!(ring.is_full());
        assert_eq!(ring.push(99), Err(99));
        assert_eq!(ring.len(), 7);
        assert_eq!(ring.peek(), Some(&0));

        assert_eq!(ring.pop(), Some(0));
        assert!(ring.push(7).is_ok());
        assert_eq!(ring.push(8), Err(8));

        let drained: Vec<_> = std::iter::from_fn(|| ring.pop()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(ring.is_empty());
    }

    #[test]
    fn never_full_and_empty_at_once_across_wraparound() {
        let mut ring = RingBuffer::with_slots(4);
        let mut next = 0;
        let mut expected = std::collections::VecDeque::new();
        // Deterministic mixed sequence of pushes and pops spanning many wraps.
        for step in 0..200 {
            assert!(!(ring.is_full() && ring.is_empty()));
            if step % 3 == 2 {
                assert_eq!(ring.pop(), expected.pop_front());
            } else if ring.push(next).is_ok() {
                expected.push_back(next);
                next += 1;
            } else {
                assert_eq!(expected.len(), 3);
            }
            assert_eq!(ring.len(), expected.len());
        }
    }

    #[test]
    fn clear_resets_indices() {
        let mut ring = RingBuffer::with_slots(3);
        ring.push("a").unwrap();
        ring.push("b").unwrap();
        ring.pop();
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
        ring.push("c").unwrap();
        ring.push("d").unwrap();
        assert!(ring.is_full());
    }

    #[test]
    fn tiny_ring_is_rounded_up() {
        let mut ring = RingBuffer::with_slots(0);
        assert_eq!(ring.slots(), 2);
        assert!(ring.push(1).is_ok());
        assert!(ring.push(2).is_err());
    }
}
