//! Order-statistic treap.
//!
//! Nodes live in a `Slab` arena and link to each other by slab key, so
//! rotations rewrite a handful of index fields and no ownership cycle exists
//! between parents and children.
//!
//! Invariants after every mutation:
//! - BST order under the user comparator (equal elements go right)
//! - heap order on priorities (a parent's priority is never larger than a child's)
//! - `size == 1 + size(left) + size(right)` for every node

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slab::Slab;

/// Stable reference to an inserted element
///
/// Valid from `insert` until the matching `erase`; the arena may recycle the
/// slot afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

#[derive(Debug)]
struct Node<T> {
    value: T,
    priority: f64,
    size: usize,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

/// Randomized balanced BST with rank queries
pub struct Treap<T, F> {
    nodes: Slab<Node<T>>,
    root: Option<usize>,
    lt: F,
    rng: StdRng,
}

impl<T: fmt::Debug, F> fmt::Debug for Treap<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Treap")
            .field("size", &self.size())
            .field("root", &self.root)
            .finish()
    }
}

impl<T, F> Treap<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    /// Create an empty treap with OS-seeded priorities
    pub fn new(lt: F) -> Self {
        Self::with_rng(lt, StdRng::from_os_rng())
    }

    /// Create an empty treap with reproducible priorities
    pub fn with_seed(lt: F, seed: u64) -> Self {
        Self::with_rng(lt, StdRng::seed_from_u64(seed))
    }

    fn with_rng(lt: F, rng: StdRng) -> Self {
        Self {
            nodes: Slab::new(),
            root: None,
            lt,
            rng,
        }
    }

    /// Number of stored elements
    #[inline]
    pub fn size(&self) -> usize {
        self.root.map_or(0, |r| self.nodes[r].size)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert a value, returning its handle
    pub fn insert(&mut self, value: T) -> Handle {
        let priority = self.rng.random::<f64>();
        let key = self.nodes.insert(Node {
            value,
            priority,
            size: 1,
            parent: None,
            left: None,
            right: None,
        });

        let Some(mut cur) = self.root else {
            self.root = Some(key);
            return Handle(key);
        };

        // Descend to a free child slot
        loop {
            let go_left = (self.lt)(&self.nodes[key].value, &self.nodes[cur].value);
            let next = if go_left {
                self.nodes[cur].left
            } else {
                self.nodes[cur].right
            };
            match next {
                Some(child) => cur = child,
                None => {
                    if go_left {
                        self.nodes[cur].left = Some(key);
                    } else {
                        self.nodes[cur].right = Some(key);
                    }
                    self.nodes[key].parent = Some(cur);
                    break;
                }
            }
        }
        self.fix_size_to_top(Some(cur));

        // Restore heap order
        while let Some(parent) = self.nodes[key].parent {
            if self.nodes[key].priority >= self.nodes[parent].priority {
                break;
            }
            if self.nodes[parent].left == Some(key) {
                self.rotate_right(parent);
            } else {
                self.rotate_left(parent);
            }
        }

        Handle(key)
    }

    /// Remove the element behind `handle` and return it
    ///
    /// # Panics
    /// If the handle was already erased.
    pub fn erase(&mut self, handle: Handle) -> T {
        let key = handle.0;
        loop {
            let node = &self.nodes[key];
            match (node.left, node.right) {
                (Some(l), Some(r)) => {
                    // Sink the node below the child with the smaller priority
                    if self.nodes[l].priority < self.nodes[r].priority {
                        self.rotate_right(key);
                    } else {
                        self.rotate_left(key);
                    }
                }
                (child, None) | (None, child) => {
                    let parent = node.parent;
                    self.replace_child(parent, key, child);
                    if let Some(c) = child {
                        self.nodes[c].parent = parent;
                    }
                    self.fix_size_to_top(parent);
                    return self.nodes.remove(key).value;
                }
            }
        }
    }

    /// Element of rank `k` (0-indexed) under the comparator
    ///
    /// # Panics
    /// If `k >= self.size()`; that is a usage error.
    pub fn kth(&self, k: usize) -> &T {
        assert!(
            k < self.size(),
            "kth({k}) out of range for treap of size {}",
            self.size()
        );
        let mut k = k;
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = &self.nodes[n];
            let left_size = self.size_of(node.left);
            if k == left_size {
                return &node.value;
            }
            if k < left_size {
                cur = node.left;
            } else {
                k -= left_size + 1;
                cur = node.right;
            }
        }
        unreachable!("subtree sizes are inconsistent")
    }

    /// Value behind a live handle
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.nodes.get(handle.0).map(|n| &n.value)
    }

    /// All values in comparator order
    pub fn in_order(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.size());
        let mut stack = Vec::new();
        let mut cur = self.root;
        while cur.is_some() || !stack.is_empty() {
            while let Some(n) = cur {
                stack.push(n);
                cur = self.nodes[n].left;
            }
            if let Some(n) = stack.pop() {
                out.push(&self.nodes[n].value);
                cur = self.nodes[n].right;
            }
        }
        out
    }

    /// Recompute every structural invariant from the leaves up
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(r) = self.root {
            if self.nodes[r].parent.is_some() {
                return Err(format!("root {r} has a parent"));
            }
            let counted = self.check_subtree(r)?;
            if counted != self.nodes.len() {
                return Err(format!(
                    "{} nodes reachable, {} allocated",
                    counted,
                    self.nodes.len()
                ));
            }
        } else if !self.nodes.is_empty() {
            return Err("empty root with allocated nodes".to_string());
        }
        Ok(())
    }

    fn check_subtree(&self, n: usize) -> Result<usize, String> {
        let node = &self.nodes[n];
        let mut size = 1;
        for (child, is_left) in [(node.left, true), (node.right, false)] {
            let Some(c) = child else { continue };
            let child_node = &self.nodes[c];
            if child_node.parent != Some(n) {
                return Err(format!("node {c} does not point back to parent {n}"));
            }
            if child_node.priority < node.priority {
                return Err(format!("heap order broken between {n} and {c}"));
            }
            let misplaced = if is_left {
                (self.lt)(&node.value, &child_node.value)
            } else {
                (self.lt)(&child_node.value, &node.value)
            };
            if misplaced {
                return Err(format!("BST order broken between {n} and {c}"));
            }
            size += self.check_subtree(c)?;
        }
        if size != node.size {
            return Err(format!("node {n} stores size {} but has {size}", node.size));
        }
        Ok(size)
    }

    #[inline]
    fn size_of(&self, n: Option<usize>) -> usize {
        n.map_or(0, |n| self.nodes[n].size)
    }

    #[inline]
    fn update_size(&mut self, n: usize) {
        let node = &self.nodes[n];
        let size = 1 + self.size_of(node.left) + self.size_of(node.right);
        self.nodes[n].size = size;
    }

    fn fix_size_to_top(&mut self, mut cur: Option<usize>) {
        while let Some(n) = cur {
            self.update_size(n);
            cur = self.nodes[n].parent;
        }
    }

    /// Point `parent`'s link (or the root) that held `old` at `new`
    fn replace_child(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                if self.nodes[p].left == Some(old) {
                    self.nodes[p].left = new;
                } else {
                    self.nodes[p].right = new;
                }
            }
        }
    }

    /// Lift `n`'s left child into `n`'s place
    fn rotate_right(&mut self, n: usize) {
        let Some(x) = self.nodes[n].left else { return };
        let inner = self.nodes[x].right;
        let parent = self.nodes[n].parent;

        self.nodes[n].left = inner;
        if let Some(i) = inner {
            self.nodes[i].parent = Some(n);
        }
        self.replace_child(parent, n, Some(x));
        self.nodes[x].parent = parent;
        self.nodes[x].right = Some(n);
        self.nodes[n].parent = Some(x);

        self.update_size(n);
        self.update_size(x);
    }

    /// Lift `n`'s right child into `n`'s place
    fn rotate_left(&mut self, n: usize) {
        let Some(x) = self.nodes[n].right else { return };
        let inner = self.nodes[x].left;
        let parent = self.nodes[n].parent;

        self.nodes[n].right = inner;
        if let Some(i) = inner {
            self.nodes[i].parent = Some(n);
        }
        self.replace_child(parent, n, Some(x));
        self.nodes[x].parent = parent;
        self.nodes[x].left = Some(n);
        self.nodes[n].parent = Some(x);

        self.update_size(n);
        self.update_size(x);
    }
}
