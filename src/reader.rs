use crate::geom::MassPoint;
use crate::region::{Cursor, Region, RegionId};
use crate::region::{
    LEAF_SIZE, NODE_HEADER_SIZE, TAG_CHUNK_FORWARD, TAG_EMPTY, TAG_LEAF, TAG_NODE,
    TAG_REGION_FORWARD,
};

/// A decoded view of one packed node, forwarding markers already
/// resolved. A `Node`'s first child cursor points just past its header;
/// the other three are the stored random-access cursors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeView {
    Empty,
    Leaf {
        x: f64,
        y: f64,
        mass: f64,
    },
    Node {
        x: f64,
        y: f64,
        mass: f64,
        elems: i64,
        children: [Cursor; 4],
    },
}

/// The output of one build: every region it produced, addressable by the
/// region ids embedded in cursors, plus the root. Immutable once
/// assembled; reads are race-free.
#[derive(Debug)]
pub struct PackedTree {
    regions: Vec<Region>,
    root: Cursor,
}

impl PackedTree {
    /// Assemble a tree from the regions of a finished build. Ids must be
    /// dense starting at zero; a hole means a region went missing.
    pub(crate) fn new(mut regions: Vec<Region>, root: Cursor) -> crate::Result<PackedTree> {
        regions.sort_by_key(|r| r.id());
        for (i, r) in regions.iter().enumerate() {
            if r.id() as usize != i {
                return Err(format!("packed tree: missing region {}", i).into());
            }
        }
        Ok(PackedTree { regions, root })
    }

    pub fn root(&self) -> Cursor {
        self.root
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn region(&self, id: RegionId) -> crate::Result<&Region> {
        self.regions
            .get(id as usize)
            .ok_or_else(|| format!("read: no region {}", id).into())
    }

    /// Chase chunk and region continuations until a concrete tag. Both
    /// mean the same thing to a reader: the node actually starts at the
    /// cursor stored after the tag.
    pub fn resolve(&self, mut cur: Cursor) -> crate::Result<(u8, Cursor)> {
        loop {
            let region = self.region(cur.region())?;
            let tag = region
                .tag_at(cur.offset())
                .ok_or_else(|| format!("read: cursor past region {} end", cur.region()))?;
            match tag {
                TAG_CHUNK_FORWARD | TAG_REGION_FORWARD => {
                    cur = region
                        .read_cursor_at(cur.offset() + 1)
                        .ok_or("read: truncated continuation")?;
                }
                _ => return Ok((tag, cur)),
            }
        }
    }

    pub fn node(&self, cur: Cursor) -> crate::Result<NodeView> {
        let (tag, cur) = self.resolve(cur)?;
        let region = self.region(cur.region())?;
        let at = cur.offset();
        let field = |k: u64| {
            region
                .read_f64_at(at + 1 + 8 * k)
                .ok_or_else(|| crate::Error::from("read: truncated node"))
        };
        match tag {
            TAG_EMPTY => Ok(NodeView::Empty),
            TAG_LEAF => Ok(NodeView::Leaf {
                x: field(0)?,
                y: field(1)?,
                mass: field(2)?,
            }),
            TAG_NODE => {
                let jump = |k: u64| {
                    region
                        .read_cursor_at(at + 1 + 8 * k)
                        .ok_or_else(|| crate::Error::from("read: truncated node"))
                };
                Ok(NodeView::Node {
                    x: field(3)?,
                    y: field(4)?,
                    mass: field(5)?,
                    elems: region
                        .read_i64_at(at + 49)
                        .ok_or("read: truncated node")?,
                    children: [
                        cur.bump(NODE_HEADER_SIZE as u64),
                        jump(0)?,
                        jump(1)?,
                        jump(2)?,
                    ],
                })
            }
            t => Err(format!("read: unknown tag: {}", t).into()),
        }
    }

    /// Subtree body count without descending: Empty and Leaf answer
    /// directly, a Node answers from its stored count.
    pub fn total_elems(&self, cur: Cursor) -> crate::Result<i64> {
        match self.node(cur)? {
            NodeView::Empty => Ok(0),
            NodeView::Leaf { .. } => Ok(1),
            NodeView::Node { elems, .. } => Ok(elems),
        }
    }

    /// Pre-order walk in stream order: a node, then its four children
    /// contiguously, crossing continuations as they come. Returns the
    /// first cursor after the subtree, which is where the next sibling
    /// lives. This is the traversal a sequential reader of the raw stream
    /// performs; it exercises every forwarding marker in the tree.
    pub fn walk<F>(&self, cur: Cursor, visit: &mut F) -> crate::Result<Cursor>
    where
        F: FnMut(&NodeView),
    {
        let (_, cur) = self.resolve(cur)?;
        let node = self.node(cur)?;
        visit(&node);
        match node {
            NodeView::Empty => Ok(cur.bump(1)),
            NodeView::Leaf { .. } => Ok(cur.bump(LEAF_SIZE as u64)),
            NodeView::Node { .. } => {
                let mut child = cur.bump(NODE_HEADER_SIZE as u64);
                for _ in 0..4 {
                    child = self.walk(child, visit)?;
                }
                Ok(child)
            }
        }
    }

    /// Collect the leaves of a subtree in stream order.
    pub fn collect_masspoints(&self, cur: Cursor) -> crate::Result<Vec<MassPoint>> {
        let mut out = Vec::new();
        self.walk(cur, &mut |node| {
            if let NodeView::Leaf { x, y, mass } = *node {
                out.push(MassPoint::new(x, y, mass));
            }
        })?;
        Ok(out)
    }
}
