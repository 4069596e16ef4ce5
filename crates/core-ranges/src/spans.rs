//! Flattening range-set stacks into non-overlapping segments, and comparing
//! two stacks restricted to the regions an edit touched.

use core_state::ChangeDesc;

use crate::{RangeSet, RangeValue};

/// Consumer of the flattened segment stream produced by [`spans`].
pub trait SpanIterator<V: RangeValue> {
    /// A segment `[from, to)` covered by the given active (non-point) ranges,
    /// ordered by layer precedence.
    fn span(&mut self, from: usize, to: usize, active: &[V]);

    /// A point range `[from, to)` (clipped to the iterated window), with the
    /// non-point ranges active around it.
    fn point(&mut self, from: usize, to: usize, value: &V, active: &[V]);
}

/// One element of a flattened window.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Seg<V> {
    Span { from: usize, to: usize, active: Vec<V> },
    Point { from: usize, to: usize, value: V, active: Vec<V> },
}

/// Flatten `sets` over `[from, to)` into an ordered segment list.
///
/// Point ranges whose width is at least `min_point_size` occlude the segments
/// they cover; smaller points are ignored. Overlapping points are emitted in
/// `(from, start_side)` order, the occluded region extending to the furthest
/// point end seen.
pub(crate) fn flatten_window<V: RangeValue>(
    sets: &[&RangeSet<V>],
    from: usize,
    to: usize,
    min_point_size: isize,
) -> Vec<Seg<V>> {
    // Collect the ranges overlapping the window, in stream order.
    let mut points: Vec<(usize, usize, V)> = Vec::new();
    let mut opens: Vec<(usize, usize, V)> = Vec::new();
    for set in sets {
        for (rf, rt, value) in set.iter_from(from) {
            if rf >= to && !(rf == to && rf == rt) {
                break;
            }
            if rt < from {
                continue;
            }
            if value.point() {
                if (rt - rf) as isize >= min_point_size {
                    points.push((rf, rt, value.clone()));
                }
            } else {
                opens.push((rf, rt, value.clone()));
            }
        }
    }
    points.sort_by(|a, b| (a.0, a.2.start_side()).cmp(&(b.0, b.2.start_side())));

    // Sweep boundaries.
    let mut cuts: Vec<usize> = vec![from, to];
    for &(f, t, _) in opens.iter() {
        cuts.push(f.clamp(from, to));
        cuts.push(t.clamp(from, to));
    }
    for &(f, t, _) in points.iter() {
        cuts.push(f.clamp(from, to));
        cuts.push(t.clamp(from, to));
    }
    cuts.sort_unstable();
    cuts.dedup();

    let active_at = |pos: usize, end: usize| -> Vec<V> {
        opens
            .iter()
            .filter(|(f, t, _)| *f <= pos && *t >= end && *t > pos)
            .map(|(_, _, v)| v.clone())
            .collect()
    };

    let mut out = Vec::new();
    let mut point_idx = 0;
    let mut covered_to = from;
    for window in cuts.windows(2) {
        let (seg_from, seg_to) = (window[0], window[1]);
        // Emit points starting at this boundary.
        while point_idx < points.len() && points[point_idx].0.clamp(from, to) <= seg_from {
            let (pf, pt, value) = &points[point_idx];
            let clip_from = (*pf).clamp(from, to);
            let clip_to = (*pt).clamp(from, to);
            out.push(Seg::Point {
                from: clip_from,
                to: clip_to,
                value: value.clone(),
                active: active_at(clip_from, clip_from.max(clip_to)),
            });
            covered_to = covered_to.max(clip_to);
            point_idx += 1;
        }
        if seg_from >= seg_to {
            continue;
        }
        // Segments under a point are occluded.
        let visible_from = seg_from.max(covered_to);
        if visible_from >= seg_to {
            continue;
        }
        out.push(Seg::Span {
            from: visible_from,
            to: seg_to,
            active: active_at(visible_from, seg_to),
        });
    }
    // Points that start exactly at the window end.
    while point_idx < points.len() {
        let (pf, pt, value) = &points[point_idx];
        let clip_from = (*pf).clamp(from, to);
        let clip_to = (*pt).clamp(from, to);
        out.push(Seg::Point {
            from: clip_from,
            to: clip_to,
            value: value.clone(),
            active: active_at(clip_from, clip_from.max(clip_to)),
        });
        point_idx += 1;
    }
    out
}

/// Flatten a stack of sets over `[from, to)` into `iterator`.
pub fn spans<V: RangeValue>(
    sets: &[&RangeSet<V>],
    from: usize,
    to: usize,
    iterator: &mut dyn SpanIterator<V>,
    min_point_size: isize,
) {
    for seg in flatten_window(sets, from, to, min_point_size) {
        match seg {
            Seg::Span { from, to, active } => iterator.span(from, to, &active),
            Seg::Point {
                from,
                to,
                value,
                active,
            } => iterator.point(from, to, &value, &active),
        }
    }
}

/// Consumer of the differences reported by [`compare`]. Positions are in the
/// new document's coordinate space.
pub trait RangeComparator<V: RangeValue> {
    fn compare_range(&mut self, from: usize, to: usize, active_a: &[V], active_b: &[V]);

    fn compare_point(
        &mut self,
        from: usize,
        to: usize,
        point_a: Option<&V>,
        point_b: Option<&V>,
    );
}

/// Compare two range-set stacks around a document edit, reporting differing
/// segments to `comparator`. Only the regions the edit left in place are
/// compared (changed regions are assumed different by construction).
///
/// At coincident positions, a point on either side wins over span handling:
/// the difference is reported through `compare_point`, never `compare_range`.
pub fn compare<V: RangeValue>(
    old_sets: &[&RangeSet<V>],
    new_sets: &[&RangeSet<V>],
    text_diff: &ChangeDesc,
    comparator: &mut dyn RangeComparator<V>,
    min_point_size: isize,
) {
    let mut gaps: Vec<(usize, usize, usize)> = text_diff.iter_gaps().collect();
    if gaps.is_empty() && text_diff.is_empty() {
        gaps.push((0, 0, text_diff.len()));
    }
    for (pos_a, pos_b, len) in gaps {
        compare_window(
            old_sets,
            new_sets,
            pos_a,
            pos_b,
            len,
            comparator,
            min_point_size,
        );
    }
}

fn compare_window<V: RangeValue>(
    old_sets: &[&RangeSet<V>],
    new_sets: &[&RangeSet<V>],
    pos_a: usize,
    pos_b: usize,
    len: usize,
    comparator: &mut dyn RangeComparator<V>,
    min_point_size: isize,
) {
    let old = flatten_window(old_sets, pos_a, pos_a + len, min_point_size);
    let new = flatten_window(new_sets, pos_b, pos_b + len, min_point_size);

    // Normalize both windows to offsets relative to the window start.
    let rel = |segs: Vec<Seg<V>>, base: usize| -> Vec<Seg<V>> {
        segs.into_iter()
            .map(|seg| match seg {
                Seg::Span { from, to, active } => Seg::Span {
                    from: from - base,
                    to: to - base,
                    active,
                },
                Seg::Point {
                    from,
                    to,
                    value,
                    active,
                } => Seg::Point {
                    from: from - base,
                    to: to - base,
                    value,
                    active,
                },
            })
            .collect()
    };
    let old = rel(old, pos_a);
    let new = rel(new, pos_b);

    // Points on either side are compared point-wise by position.
    let old_points: Vec<&Seg<V>> = old.iter().filter(|s| matches!(s, Seg::Point { .. })).collect();
    let new_points: Vec<&Seg<V>> = new.iter().filter(|s| matches!(s, Seg::Point { .. })).collect();
    let mut i = 0;
    let mut j = 0;
    while i < old_points.len() || j < new_points.len() {
        let key = |seg: &&Seg<V>| match seg {
            Seg::Point { from, .. } => *from,
            Seg::Span { .. } => unreachable!(),
        };
        let (of, nf) = (
            old_points.get(i).map(key),
            new_points.get(j).map(key),
        );
        match (of, nf) {
            (Some(a), Some(b)) if a == b => {
                let (Seg::Point { from, to, value: va, .. }, Seg::Point { value: vb, to: tb, .. }) =
                    (old_points[i], new_points[j])
                else {
                    unreachable!()
                };
                if va != vb || to != tb {
                    comparator.compare_point(
                        pos_b + from,
                        pos_b + *to.max(tb),
                        Some(va),
                        Some(vb),
                    );
                }
                i += 1;
                j += 1;
            }
            (Some(_), None) => {
                let Seg::Point { from, to, value, .. } = old_points[i] else {
                    unreachable!()
                };
                comparator.compare_point(pos_b + from, pos_b + to, Some(value), None);
                i += 1;
            }
            (Some(a), b) if a < b.expect("checked") => {
                let Seg::Point { from, to, value, .. } = old_points[i] else {
                    unreachable!()
                };
                comparator.compare_point(pos_b + from, pos_b + to, Some(value), None);
                i += 1;
            }
            (_, Some(_)) => {
                let Seg::Point { from, to, value, .. } = new_points[j] else {
                    unreachable!()
                };
                comparator.compare_point(pos_b + from, pos_b + to, None, Some(value));
                j += 1;
            }
            (None, None) => break,
        }
    }

    // Compare span coverage over the union of boundaries, skipping positions
    // occluded by a point on either side.
    let mut cuts: Vec<usize> = vec![0, len];
    let mut occluded: Vec<(usize, usize)> = Vec::new();
    for seg in old.iter().chain(new.iter()) {
        match seg {
            Seg::Span { from, to, .. } => {
                cuts.push(*from);
                cuts.push(*to);
            }
            Seg::Point { from, to, .. } => {
                cuts.push(*from);
                cuts.push(*to);
                occluded.push((*from, *to));
            }
        }
    }
    cuts.sort_unstable();
    cuts.dedup();
    let active_in = |segs: &[Seg<V>], from: usize, to: usize| -> Option<Vec<V>> {
        for seg in segs {
            if let Seg::Span {
                from: sf,
                to: st,
                active,
            } = seg
                && *sf <= from
                && *st >= to
            {
                return Some(active.clone());
            }
        }
        None
    };
    for window in cuts.windows(2) {
        let (seg_from, seg_to) = (window[0], window[1]);
        if seg_from >= seg_to {
            continue;
        }
        if occluded
            .iter()
            .any(|&(f, t)| f <= seg_from && t >= seg_to && f != t)
        {
            continue;
        }
        let a = active_in(&old, seg_from, seg_to).unwrap_or_default();
        let b = active_in(&new, seg_from, seg_to).unwrap_or_default();
        if a != b {
            comparator.compare_range(pos_b + seg_from, pos_b + seg_to, &a, &b);
        }
    }
}
