//! codec/graph — index-based object references.
//!
//! Shared and cyclic structure is never expressed by aliasing. Nodes live in
//! an `ObjectGraph<T>` arena and point at each other through `ObjRef`
//! indices. On the wire the arena becomes the document's reference table.
//!
//! Forward declaration: `reserve()` hands out a reference before the node
//! exists, `fill()` supplies it later. Encoding fails while any reserved node
//! is still unfilled.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);

impl ObjRef {
    pub const fn new(index: u32) -> Self {
        ObjRef(index)
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGraph<T> {
    nodes: Vec<Option<T>>,
}

impl<T> Default for ObjectGraph<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> ObjectGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(n),
        }
    }

    #[inline]
    fn next_ref(&self) -> ObjRef {
        ObjRef(self.nodes.len() as u32)
    }

    pub fn add(&mut self, node: T) -> ObjRef {
        let r = self.next_ref();
        self.nodes.push(Some(node));
        r
    }

    /// Forward-declare a node.
    pub fn reserve(&mut self) -> ObjRef {
        let r = self.next_ref();
        self.nodes.push(None);
        r
    }

    /// Supply a reserved node. Returns the node back if `r` is out of range or
    /// already filled.
    pub fn fill(&mut self, r: ObjRef, node: T) -> Result<(), T> {
        match self.nodes.get_mut(r.0 as usize) {
            Some(slot @ None) => {
                *slot = Some(node);
                Ok(())
            }
            _ => Err(node),
        }
    }

    pub fn get(&self, r: ObjRef) -> Option<&T> {
        self.nodes.get(r.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut T> {
        self.nodes.get_mut(r.0 as usize).and_then(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First reserved-but-unfilled reference, if any.
    pub fn first_unfilled(&self) -> Option<ObjRef> {
        self.nodes
            .iter()
            .position(Option::is_none)
            .map(|i| ObjRef(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &T)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (ObjRef(i as u32), n)))
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = Option<&T>> {
        self.nodes.iter().map(Option::as_ref)
    }

    pub(crate) fn from_nodes(nodes: Vec<T>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Some).collect(),
        }
    }
}
