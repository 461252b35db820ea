use std::sync::Arc;

/// An immutable last-in-first-out sequence with structural sharing.
///
/// Every operation that "changes" the stack returns a new `PersistentStack`
/// and leaves the original untouched; copies share their tail through [`Arc`]
/// cons cells, so [`Clone`] and [`push`](PersistentStack::push) are O(1).
/// Because no instance is ever mutated, concurrent asynchronous branches that
/// diverge from a common stack each evolve independently without locks; a
/// sibling can never observe another sibling's pushed frames.
///
/// This is the backing structure for the transaction context; see
/// [`crate::context`].
pub struct PersistentStack<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
}

struct Node<T> {
    item: T,
    next: Option<Arc<Node<T>>>,
}

impl<T> PersistentStack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Returns a new stack with `item` on top. The receiver is unaffected.
    pub fn push(&self, item: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                item,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Returns the top item and a new stack without it, or `None` when empty.
    /// The receiver is unaffected.
    pub fn pop(&self) -> Option<(T, Self)>
    where
        T: Clone,
    {
        self.head.as_ref().map(|node| {
            (
                node.item.clone(),
                Self {
                    head: node.next.clone(),
                    len: self.len - 1,
                },
            )
        })
    }

    /// Returns a reference to the top item, or `None` when empty.
    pub fn peek(&self) -> Option<&T> {
        self.head.as_deref().map(|node| &node.item)
    }

    /// Number of items on the stack.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterates from the top of the stack downwards.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            node: self.head.as_deref(),
        }
    }
}

impl<T> Clone for PersistentStack<T> {
    // Manual impl: the derived one would require T: Clone, but sharing the
    // head Arc is all a copy needs.
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for PersistentStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PersistentStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over a stack, top first.
pub struct Iter<'a, T> {
    node: Option<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(&node.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_leaves_original_unchanged() {
        let empty: PersistentStack<u32> = PersistentStack::new();
        let one = empty.push(1);
        let two = one.push(2);

        assert!(empty.is_empty());
        assert_eq!(empty.peek(), None);
        assert_eq!(one.len(), 1);
        assert_eq!(one.peek(), Some(&1));
        assert_eq!(two.len(), 2);
        assert_eq!(two.peek(), Some(&2));
    }

    #[test]
    fn pop_returns_top_and_shorter_stack() {
        let stack = PersistentStack::new().push("a").push("b");
        let (top, rest) = stack.pop().unwrap();

        assert_eq!(top, "b");
        assert_eq!(rest.peek(), Some(&"a"));
        // The popped-from stack still sees both items.
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek(), Some(&"b"));
    }

    #[test]
    fn pop_on_empty_is_none() {
        let stack: PersistentStack<u8> = PersistentStack::new();
        assert!(stack.pop().is_none());
    }

    #[test]
    fn diverging_copies_do_not_interfere() {
        let base = PersistentStack::new().push(0);
        let left = base.push(1);
        let right = base.push(2);

        assert_eq!(left.iter().copied().collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(right.iter().copied().collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(base.len(), 1);
    }

    #[test]
    fn iter_walks_top_down() {
        let stack = PersistentStack::new().push(1).push(2).push(3);
        assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
    }
}
