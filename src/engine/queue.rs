/// Queue kept sorted on insertion: descending priority first, then FIFO among
/// equal priorities.
///
/// Priorities and elements live in two parallel vectors of equal length so
/// that dispatch can walk the elements without touching the priorities.
#[derive(Debug, Clone)]
pub struct SortedPriorityQueue<P, E> {
    priorities: Vec<P>,
    elements: Vec<E>,
}

impl<P: Ord, E> SortedPriorityQueue<P, E> {
    pub fn new() -> Self {
        Self {
            priorities: Vec::new(),
            elements: Vec::new(),
        }
    }

    /// Inserts after every element whose priority is >= `priority` and before
    /// the first one with a strictly lower priority.
    pub fn enqueue(&mut self, priority: P, element: E) -> &mut Self {
        let index = self.priorities.partition_point(|p| *p >= priority);
        self.priorities.insert(index, priority);
        self.elements.insert(index, element);
        self
    }

    /// Removes the front element (highest priority, oldest).
    pub fn dequeue(&mut self) -> Option<E> {
        if self.elements.is_empty() {
            return None;
        }
        self.priorities.remove(0);
        Some(self.elements.remove(0))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.elements.iter()
    }

    pub fn priorities(&self) -> &[P] {
        &self.priorities
    }

    pub fn as_slice(&self) -> &[E] {
        &self.elements
    }
}

impl<P: Ord, E> Default for SortedPriorityQueue<P, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, P: Ord, E> IntoIterator for &'a SortedPriorityQueue<P, E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
