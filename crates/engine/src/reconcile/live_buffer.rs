/// Bounded newest-first buffer of push-sourced items
#[derive(Debug, Clone)]
pub struct LiveBuffer<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> LiveBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Prepend, evicting the oldest entries past capacity
    pub fn push(&mut self, item: T) {
        self.items.insert(0, item);
        self.items.truncate(self.capacity);
    }

    /// Newest first
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
