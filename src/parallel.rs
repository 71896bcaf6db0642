/*
   Parallel tree packing over a work-stealing pool.

   The packed format wants siblings 1..4 laid out back to back, but a
   stolen sibling runs concurrently with its predecessor, so nobody knows
   where the predecessor will end while the successor picks its output
   position. The co-region protocol keeps the stream readable anyway:

     - fork sibling i inline and expose the ladder for siblings i+1..4 to
       theft;
     - sibling i publishes its finished writer into a handoff slot as its
       last act, so the ladder finding the slot filled proves the sibling
       already finished: it takes the writer and the cursor threads
       through exactly as in the sequential packer;
     - an empty slot means the ladder was stolen and is racing sibling i.
       It opens a writer on a freshly allocated region, and after the
       join the forker plants a tag-90 at sibling i's tail pointing at
       the fresh region's start.

   Either way the start of sibling i+1 is reachable from the end of
   sibling i, and the header cursors point at logical starts regardless of
   which region they landed in.
*/

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::geom::{BoundingBox, MassPoint};
use crate::packer::{pack_tree, Span};
use crate::reader::PackedTree;
use crate::region::{
    Cursor, Region, RegionId, RegionWriter, NODE_HEADER_SIZE, NODE_HEADROOM, TAG_NODE,
};

/// Hands out region-numbered writers during one build. Ids are dense, so
/// the finished regions assemble into a directly indexable table.
pub struct RegionAlloc {
    next: AtomicU32,
    capacity: usize,
}

impl RegionAlloc {
    pub fn new(capacity: usize) -> RegionAlloc {
        RegionAlloc {
            next: AtomicU32::new(0),
            capacity,
        }
    }

    pub fn fresh(&self) -> crate::Result<RegionWriter> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if id > u32::from(RegionId::max_value()) {
            return Err("region allocation failed: cursor region id space exhausted".into());
        }
        Ok(RegionWriter::begin(id as RegionId, self.capacity))
    }
}

/// Everything a subtree build hands back: the writer its last child left
/// off in, every region the subtree sealed along the way, and the span.
/// The region a build started in is always among the writer and the
/// sealed list, which is what lets parents backpatch node headers without
/// sharing buffers across workers.
type Build = (RegionWriter, Vec<Region>, Span);

pub fn pack_tree_par(
    mut w: RegionWriter,
    bbox: &BoundingBox,
    mpts: Vec<MassPoint>,
    cutoff: usize,
    alloc: &RegionAlloc,
) -> crate::Result<Build> {
    if mpts.len() < cutoff.max(2) {
        let span = pack_tree(&mut w, bbox, &mpts);
        return Ok((w, Vec::new(), span));
    }

    w.reserve(NODE_HEADROOM);
    let c = MassPoint::centroid(&mpts);
    let start = w.position();
    w.put_tag(TAG_NODE);
    w.skip(NODE_HEADER_SIZE - 1);

    let kids: Vec<(BoundingBox, Vec<MassPoint>)> = bbox
        .quadrants()
        .iter()
        .map(|q| (*q, q.masspoints_in(&mpts)))
        .collect();
    let (mut w, mut sealed, spans) = pack_quadrants(w, kids, cutoff, alloc)?;

    let total = spans[0].elems + spans[1].elems + spans[2].elems + spans[3].elems;
    let header = region_by_id(&mut w, &mut sealed, start.region())
        .ok_or("packer: node header region lost during join")?;
    let mut at = start.offset() + 1;
    for s in &spans[1..] {
        header.put_cursor_at(at, s.start);
        at += 8;
    }
    header.put_f64_at(at, c.x);
    header.put_f64_at(at + 8, c.y);
    header.put_f64_at(at + 16, c.mass);
    header.put_i64_at(at + 24, total);

    let span = Span {
        start,
        end: spans[3].end,
        elems: total,
    };
    Ok((w, sealed, span))
}

/// Pack the remaining quadrants of one node, first inline and the rest
/// behind a `rayon::join`, detecting theft through the handoff slot the
/// first sibling fills when it finishes.
fn pack_quadrants(
    w: RegionWriter,
    mut kids: Vec<(BoundingBox, Vec<MassPoint>)>,
    cutoff: usize,
    alloc: &RegionAlloc,
) -> crate::Result<(RegionWriter, Vec<Region>, Vec<Span>)> {
    let (bbox, mpts) = kids.remove(0);
    if kids.is_empty() {
        let (w, sealed, span) = pack_tree_par(w, &bbox, mpts, cutoff, alloc)?;
        return Ok((w, sealed, vec![span]));
    }

    let handoff: Mutex<Option<(RegionWriter, Vec<Region>)>> = Mutex::new(None);

    let (head, tail) = rayon::join(
        || -> crate::Result<Span> {
            let (w1, sealed1, span) = pack_tree_par(w, &bbox, mpts, cutoff, alloc)?;
            *handoff.lock().unwrap() = Some((w1, sealed1));
            Ok(span)
        },
        || -> crate::Result<(RegionWriter, Vec<Region>, Vec<Span>, Option<Cursor>)> {
            // The slot is the was-stolen signal. It is filled only once
            // the sibling has finished, which on an unstolen ladder has
            // always happened; a worker-index probe is not sound here
            // because a worker blocked in a deeper join can pop this
            // ladder off its own deque while the sibling is still live
            // further down its stack.
            let taken = handoff.lock().unwrap().take();
            match taken {
                Some((w1, sealed1)) => {
                    // Sibling done: thread its cursor straight through.
                    let (w, mut sealed, spans) = pack_quadrants(w1, kids, cutoff, alloc)?;
                    sealed.extend(sealed1);
                    Ok((w, sealed, spans, None))
                }
                None => {
                    // Stolen: the sibling is still running somewhere
                    // else. Continue in a fresh region and report its
                    // start so the forker can stitch the stream back
                    // together.
                    let fresh = alloc.fresh()?;
                    let target = fresh.position();
                    debug!(region = target.region(), "continuation stolen, fresh region");
                    let (w, sealed, spans) = pack_quadrants(fresh, kids, cutoff, alloc)?;
                    Ok((w, sealed, spans, Some(target)))
                }
            }
        },
    );

    let head_span = head?;
    let (mut w, mut sealed, mut spans, forwarded) = tail?;
    if let Some((w1, sealed1)) = handoff.into_inner().unwrap() {
        sealed.push(w1.finish());
        sealed.extend(sealed1);
    }
    if let Some(target) = forwarded {
        let tail_region = region_by_id(&mut w, &mut sealed, head_span.end.region())
            .ok_or("packer: sibling tail region lost during join")?;
        tail_region.mark_region_forward(head_span.end.offset(), target);
    }
    spans.insert(0, head_span);
    Ok((w, sealed, spans))
}

fn region_by_id<'a>(
    w: &'a mut RegionWriter,
    sealed: &'a mut Vec<Region>,
    id: RegionId,
) -> Option<&'a mut Region> {
    if w.region_id() == id {
        return Some(w.region_mut());
    }
    sealed.iter_mut().find(|r| r.id() == id)
}

/// Pack a whole tree with the fork-join packer. Subtrees below `cutoff`
/// bodies go through the sequential packer unchanged, so on a single
/// worker the output is byte for byte the sequential encoding.
pub fn pack_parallel(
    bbox: &BoundingBox,
    mpts: &[MassPoint],
    capacity: usize,
    cutoff: usize,
) -> crate::Result<PackedTree> {
    let alloc = RegionAlloc::new(capacity);
    let root = alloc.fresh()?;
    let (w, mut sealed, span) = pack_tree_par(root, bbox, mpts.to_vec(), cutoff, &alloc)?;
    sealed.push(w.finish());
    debug!(regions = sealed.len(), elems = span.elems, "packed tree");
    PackedTree::new(sealed, span.start)
}
