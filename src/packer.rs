use crate::geom::{BoundingBox, MassPoint};
use crate::reader::PackedTree;
use crate::region::{Cursor, RegionWriter};
use crate::region::{NODE_HEADER_SIZE, NODE_HEADROOM, TAG_EMPTY, TAG_LEAF, TAG_NODE};

/// One packed subtree: where it starts, the first byte after it, and how
/// many bodies it holds.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub start: Cursor,
    pub end: Cursor,
    pub elems: i64,
}

/// Serialize the quad-tree over `mpts` pre-order at the writer's current
/// position. Child 1 of a node follows its header contiguously; children
/// 2..4 are reachable both through the header cursors and by walking the
/// stream. The returned span's `end` is the first byte after child 4.
pub fn pack_tree(w: &mut RegionWriter, bbox: &BoundingBox, mpts: &[MassPoint]) -> Span {
    // Hard requirement before any tag write; covers the node header and
    // the forwarding marker a parallel parent may plant at our tail.
    w.reserve(NODE_HEADROOM);

    let start = w.position();
    match mpts.len() {
        0 => {
            w.put_tag(TAG_EMPTY);
            Span {
                start,
                end: w.position(),
                elems: 0,
            }
        }
        1 => {
            let c = MassPoint::centroid(mpts);
            w.put_tag(TAG_LEAF);
            w.put_f64(c.x);
            w.put_f64(c.y);
            w.put_f64(c.mass);
            Span {
                start,
                end: w.position(),
                elems: 1,
            }
        }
        _ => {
            let c = MassPoint::centroid(mpts);
            w.put_tag(TAG_NODE);
            w.skip(NODE_HEADER_SIZE - 1);

            let quads = bbox.quadrants();
            let s1 = pack_tree(w, &quads[0], &quads[0].masspoints_in(mpts));
            let s2 = pack_tree(w, &quads[1], &quads[1].masspoints_in(mpts));
            let s3 = pack_tree(w, &quads[2], &quads[2].masspoints_in(mpts));
            let s4 = pack_tree(w, &quads[3], &quads[3].masspoints_in(mpts));

            // Backpatch the header now that the children's starts are
            // known. Sequential builds never leave the header's region,
            // so the writer itself can patch.
            let total = s1.elems + s2.elems + s3.elems + s4.elems;
            let mut at = start.offset() + 1;
            for s in &[&s2, &s3, &s4] {
                w.put_cursor_at(at, s.start);
                at += 8;
            }
            w.put_f64_at(at, c.x);
            w.put_f64_at(at + 8, c.y);
            w.put_f64_at(at + 16, c.mass);
            w.put_i64_at(at + 24, total);

            Span {
                start,
                end: s4.end,
                elems: total,
            }
        }
    }
}

/// Pack a whole tree sequentially into a single fresh region.
pub fn pack_sequential(
    bbox: &BoundingBox,
    mpts: &[MassPoint],
    capacity: usize,
) -> crate::Result<PackedTree> {
    let mut w = RegionWriter::begin(0, capacity);
    let span = pack_tree(&mut w, bbox, mpts);
    PackedTree::new(vec![w.finish()], span.start)
}
