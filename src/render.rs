//! Overlap-aware rendering of groups onto a document.
//!
//! Every line is split into maximal segments over which the sorted set of
//! covering group ids is constant. A segment covered by one group gets that
//! group's color slot; a segment covered by several gets the multi-overlap
//! treatment. Slot 0 is the shared default for groups that overlap nothing
//! on the line; overlapping groups get slots 1, 2, ... in the order they are
//! first met scanning left to right.
//!
//! Anchors mark the segment holding the first character of each group's
//! source span and of each of its target spans. Connectors join a source
//! anchor to every target anchor of the same group.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::file::Document;
use crate::span::{LineRun, Span};
use crate::store::{Group, GroupId, Side};

/// Number of distinct single-group colors the viewer styles
pub const PALETTE_SIZE: usize = 6;

/// Visual treatment of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "slot", rename_all = "snake_case")]
pub enum SegmentStyle {
    /// Not covered by any group
    Plain,
    /// Covered by exactly one group, colored with this slot
    Slot(usize),
    /// Covered by more than one group
    MultiOverlap,
}

/// A maximal run of a line with one covering group set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// First column (0-indexed, characters of visible text)
    pub start: usize,
    /// Column after the last
    pub end: usize,
    pub text: String,
    /// Sorted ids of the groups covering this segment
    pub groups: Vec<GroupId>,
    pub style: SegmentStyle,
    /// Anchor ids attached to this segment
    pub anchors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedLine {
    /// 1-indexed line number
    pub number: usize,
    pub segments: Vec<Segment>,
}

/// One rendered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pane {
    pub side: Side,
    pub name: String,
    pub lines: Vec<RenderedLine>,
}

impl Pane {
    /// Ids of every anchor placed in this pane
    pub fn anchors(&self) -> BTreeSet<&str> {
        self.lines
            .iter()
            .flat_map(|line| &line.segments)
            .flat_map(|segment| &segment.anchors)
            .map(String::as_str)
            .collect()
    }

    /// Segment carrying the given anchor
    pub fn segment_for_anchor(&self, anchor: &str) -> Option<(usize, &Segment)> {
        self.lines.iter().find_map(|line| {
            line.segments
                .iter()
                .find(|segment| segment.anchors.iter().any(|a| a == anchor))
                .map(|segment| (line.number, segment))
        })
    }
}

/// A link between two anchors of the same group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Connector {
    pub group: GroupId,
    pub from: String,
    pub to: String,
}

/// Both panes and the connectors between them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub source: Pane,
    pub target: Pane,
    pub connectors: Vec<Connector>,
}

/// Anchor id for a group's span on one side
///
/// Source spans use `g{id}-src`; the `k`-th target span uses `g{id}-tgt{k}`.
pub fn anchor_id(group: GroupId, side: Side, index: usize) -> String {
    match side {
        Side::Source => format!("g{}-src", group),
        Side::Target => format!("g{}-tgt{}", group, index),
    }
}

/// A run of one group on one line, plus the anchor it carries if it is
/// the first run of its span
struct Cover {
    group: GroupId,
    run: LineRun,
    anchor: Option<String>,
}

/// Partition one line of text given the runs touching it
pub fn partition_line(number: usize, text: &str, covers: &[(GroupId, LineRun)]) -> RenderedLine {
    let anchored: Vec<Cover> = covers
        .iter()
        .map(|(group, run)| Cover {
            group: *group,
            run: *run,
            anchor: None,
        })
        .collect();
    partition(number, text, &anchored)
}

fn partition(number: usize, text: &str, covers: &[Cover]) -> RenderedLine {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    // Per-character sorted id sets; runs past the end of the line are clamped
    let mut cover: Vec<BTreeSet<GroupId>> = vec![BTreeSet::new(); n];
    for c in covers {
        let start = c.run.start.min(n);
        let end = c.run.end().min(n);
        for ids in &mut cover[start..end] {
            ids.insert(c.group);
        }
    }

    let mut slots: HashMap<GroupId, usize> = HashMap::new();
    let overlapping: BTreeSet<GroupId> = cover
        .iter()
        .filter(|ids| ids.len() > 1)
        .flat_map(|ids| ids.iter().copied())
        .collect();
    for ids in &cover {
        for id in ids {
            if overlapping.contains(id) && !slots.contains_key(id) {
                let next = slots.len() + 1;
                slots.insert(*id, next);
            }
        }
    }

    let mut segments = Vec::new();
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && cover[j] == cover[i] {
            j += 1;
        }

        let groups: Vec<GroupId> = cover[i].iter().copied().collect();
        let style = match groups.as_slice() {
            [] => SegmentStyle::Plain,
            [only] => SegmentStyle::Slot(slots.get(only).copied().unwrap_or(0)),
            _ => SegmentStyle::MultiOverlap,
        };
        segments.push(Segment {
            start: i,
            end: j,
            text: chars[i..j].iter().collect(),
            groups,
            style,
            anchors: Vec::new(),
        });
        i = j;
    }

    for c in covers {
        let Some(anchor) = &c.anchor else { continue };
        if let Some(segment) = segments
            .iter_mut()
            .find(|s| s.start <= c.run.start && c.run.start < s.end && s.groups.contains(&c.group))
        {
            segment.anchors.push(anchor.clone());
        }
    }

    RenderedLine { number, segments }
}

/// Render one document with the spans the groups place on it
pub fn render_pane(doc: &Document, groups: &[Group], side: Side) -> Pane {
    let mut by_line: HashMap<usize, Vec<Cover>> = HashMap::new();
    for group in groups {
        for (index, span) in group.spans_on(side).iter().enumerate() {
            for (k, run) in span.runs(doc).into_iter().enumerate() {
                by_line.entry(run.line).or_default().push(Cover {
                    group: group.id,
                    run,
                    anchor: (k == 0).then(|| anchor_id(group.id, side, index)),
                });
            }
        }
    }

    let lines = (1..=doc.line_count())
        .map(|number| {
            let text = doc.visible_line(number).unwrap_or_default();
            let covers = by_line.get(&number).map(Vec::as_slice).unwrap_or(&[]);
            partition(number, &text, covers)
        })
        .collect();

    Pane {
        side,
        name: doc.display_name(),
        lines,
    }
}

/// Connectors for every group whose anchors were placed on both panes
pub fn connectors(groups: &[Group], source: &Pane, target: &Pane) -> Vec<Connector> {
    let source_anchors = source.anchors();
    let target_anchors = target.anchors();

    let mut out = Vec::new();
    for group in groups {
        let from = anchor_id(group.id, Side::Source, 0);
        if !source_anchors.contains(from.as_str()) {
            continue;
        }
        for index in 0..group.target_spans().len() {
            let to = anchor_id(group.id, Side::Target, index);
            if target_anchors.contains(to.as_str()) {
                out.push(Connector {
                    group: group.id,
                    from: from.clone(),
                    to,
                });
            }
        }
    }
    out
}

/// Render both documents and connect them
pub fn render_pair(source: &Document, target: &Document, groups: &[Group]) -> Rendered {
    let source_pane = render_pane(source, groups, Side::Source);
    let target_pane = render_pane(target, groups, Side::Target);
    let connectors = connectors(groups, &source_pane, &target_pane);

    Rendered {
        source: source_pane,
        target: target_pane,
        connectors,
    }
}

/// Text a span covers, clamped to its lines, lines joined with `\n`
pub fn span_text(doc: &Document, span: &Span) -> String {
    span.runs(doc)
        .iter()
        .map(|run| {
            doc.visible_line(run.line)
                .map(|line| line.chars().skip(run.start).take(run.len).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A target location as shown in a tooltip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetDetail {
    pub line: usize,
    pub text: String,
}

/// Everything the tooltip shows for a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDetail {
    pub id: GroupId,
    pub label: String,
    pub description: String,
    pub source_text: String,
    pub targets: Vec<TargetDetail>,
}

pub fn describe(group: &Group, source: &Document, target: &Document) -> GroupDetail {
    GroupDetail {
        id: group.id,
        label: group.label.clone(),
        description: group.description.clone(),
        source_text: span_text(source, &group.source),
        targets: group
            .target_spans()
            .iter()
            .filter_map(|span| {
                let pos = span.first_position()?;
                (!pos.is_sentinel()).then(|| TargetDetail {
                    line: pos.line,
                    text: span_text(target, span),
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(line: usize, start: usize, len: usize) -> LineRun {
        LineRun { line, start, len }
    }

    fn sets(line: &RenderedLine) -> Vec<(Vec<GroupId>, usize, usize)> {
        line.segments
            .iter()
            .map(|s| (s.groups.clone(), s.start, s.end))
            .collect()
    }

    #[test]
    fn test_overlap_partition_example() {
        let (a, b) = (0, 1);
        let line = partition_line(1, "0123456789", &[(a, run(1, 0, 5)), (b, run(1, 3, 5))]);

        assert_eq!(
            sets(&line),
            vec![
                (vec![a], 0, 3),
                (vec![a, b], 3, 5),
                (vec![b], 5, 8),
                (vec![], 8, 10),
            ]
        );
        let styles: Vec<SegmentStyle> = line.segments.iter().map(|s| s.style).collect();
        assert_eq!(
            styles,
            vec![
                SegmentStyle::Slot(1),
                SegmentStyle::MultiOverlap,
                SegmentStyle::Slot(2),
                SegmentStyle::Plain,
            ]
        );
    }

    #[test]
    fn test_non_overlapping_groups_share_default_slot() {
        let line = partition_line(1, "aaaa bbbb", &[(7, run(1, 0, 4)), (3, run(1, 5, 4))]);

        let styles: Vec<SegmentStyle> = line.segments.iter().map(|s| s.style).collect();
        assert_eq!(
            styles,
            vec![SegmentStyle::Slot(0), SegmentStyle::Plain, SegmentStyle::Slot(0)]
        );
    }

    #[test]
    fn test_slots_follow_first_encounter_not_id_order() {
        // Group 9 starts first, so it gets slot 1 even though 2 < 9
        let line = partition_line(1, "abcdefgh", &[(2, run(1, 2, 4)), (9, run(1, 0, 4))]);

        assert_eq!(line.segments[0].style, SegmentStyle::Slot(1));
        assert_eq!(line.segments[2].style, SegmentStyle::Slot(2));
    }

    #[test]
    fn test_runs_clamped_to_line() {
        let line = partition_line(1, "abc", &[(0, run(1, 1, 50)), (1, run(1, 10, 2))]);

        assert_eq!(sets(&line), vec![(vec![], 0, 1), (vec![0], 1, 3)]);
    }

    #[test]
    fn test_oversized_length_clamped_to_line() {
        let line = partition_line(1, "abc", &[(0, run(1, 2, usize::MAX)), (1, run(1, usize::MAX, 1))]);

        assert_eq!(sets(&line), vec![(vec![], 0, 2), (vec![0], 2, 3)]);
    }

    #[test]
    fn test_oversized_length_renders_pair() {
        let source = Document::from_text("a.py", "abc\n");
        let target = Document::from_text("b.txt", "xyz\n");
        let group = Group::parse(0, "1:1", "18446744073709551615", "1:0", "2", "huge", "").unwrap();
        let rendered = render_pair(&source, &target, &[group]);

        assert_eq!(sets(&rendered.source.lines[0]), vec![(vec![], 0, 1), (vec![0], 1, 3)]);
        assert_eq!(rendered.connectors.len(), 1);
    }

    #[test]
    fn test_range_past_last_line_stops_at_document_end() {
        let target = Document::from_text("b.txt", "only line\n");
        let group = Group::parse(0, "1:0", "1", "1:5-50000000000:0", "", "far", "").unwrap();
        let pane = render_pane(&target, &[group], Side::Target);

        assert_eq!(sets(&pane.lines[0]), vec![(vec![], 0, 5), (vec![0], 5, 9)]);
    }

    #[test]
    fn test_zero_length_span_does_not_borrow_anchor() {
        let source = Document::from_text("a.py", "abcdef\n");
        let target = Document::from_text("b.txt", "xyz\n");
        let groups = vec![
            Group::parse(0, "1:0", "6", "1:0", "3", "whole", "").unwrap(),
            Group::parse(1, "1:2", "0", "1:0", "3", "empty", "").unwrap(),
        ];
        let rendered = render_pair(&source, &target, &groups);

        assert_eq!(rendered.source.lines[0].segments[0].anchors, vec!["g0-src"]);
        assert!(rendered.connectors.iter().all(|c| c.group == 0));
    }

    #[test]
    fn test_identical_spans_form_one_multi_segment() {
        let line = partition_line(1, "same", &[(0, run(1, 0, 4)), (1, run(1, 0, 4))]);

        assert_eq!(line.segments.len(), 1);
        assert_eq!(line.segments[0].style, SegmentStyle::MultiOverlap);
        assert_eq!(line.segments[0].groups, vec![0, 1]);
    }

    #[test]
    fn test_render_pair_anchors_and_connectors() {
        let source = Document::from_text("a.py", "question = 'hi'\n");
        let target = Document::from_text("b.txt", "User:\n  hi there\nhi\n");
        let group = Group::parse(0, "1:12", "2", "2:2, 3:0", "2,2", "hi", "greeting").unwrap();
        let rendered = render_pair(&source, &target, &[group]);

        assert_eq!(
            rendered.connectors,
            vec![
                Connector { group: 0, from: "g0-src".into(), to: "g0-tgt0".into() },
                Connector { group: 0, from: "g0-src".into(), to: "g0-tgt1".into() },
            ]
        );
        let (line, segment) = rendered.target.segment_for_anchor("g0-tgt0").unwrap();
        assert_eq!(line, 2);
        assert_eq!(segment.text, "hi");
        assert_eq!(rendered.source.segment_for_anchor("g0-src").unwrap().1.text, "hi");
    }

    #[test]
    fn test_range_expands_per_line_with_single_anchor() {
        let source = Document::from_text("a.py", "x\n");
        let target = Document::from_text("b.txt", "first line\nsecond\nthird\n");
        let group = Group::parse(4, "1:0", "1", "1:6-3:2", "", "block", "").unwrap();
        let pane = render_pane(&target, &[group], Side::Target);

        assert_eq!(sets(&pane.lines[0]), vec![(vec![], 0, 6), (vec![4], 6, 10)]);
        assert_eq!(sets(&pane.lines[1]), vec![(vec![4], 0, 6)]);
        assert_eq!(sets(&pane.lines[2]), vec![(vec![4], 0, 2), (vec![], 2, 5)]);
        assert_eq!(pane.anchors().into_iter().collect::<Vec<_>>(), vec!["g4-tgt0"]);
        assert_eq!(pane.lines[0].segments[1].anchors, vec!["g4-tgt0"]);
    }

    #[test]
    fn test_missing_anchor_drops_connector() {
        let source = Document::from_text("a.py", "abc\n");
        let target = Document::from_text("b.txt", "xyz\n");
        // Target points past the end of the document
        let group = Group::parse(0, "1:0", "3", "5:0", "3", "gone", "").unwrap();
        let rendered = render_pair(&source, &target, &[group]);

        assert!(rendered.connectors.is_empty());
        assert!(rendered.source.anchors().contains("g0-src"));
    }

    #[test]
    fn test_describe_group() {
        let source = Document::from_text("a.py", "ask('why')\n");
        let target = Document::from_text("b.txt", "Q: why\nA: because\n");
        let group = Group::parse(1, "1:5", "3", "1:3", "", "why", "the question").unwrap();
        let detail = describe(&group, &source, &target);

        assert_eq!(detail.source_text, "why");
        assert_eq!(detail.targets, vec![TargetDetail { line: 1, text: "why".into() }]);
    }
}
