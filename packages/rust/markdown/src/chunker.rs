//! Boundary-aware chunking of converted Markdown.
//!
//! Chunks are bounded by a character budget and break only at segment
//! boundaries (headings, paragraphs, list items, whole tables). A table
//! is atomic: a chunk never ends between a table's rows. A heading is
//! kept with the content that follows it when possible. Each chunk
//! records its byte range into the source Markdown for citation.

use sourcebank_shared::Chunk;

/// Kind of a renderable Markdown segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Heading,
    Paragraph,
    ListItem,
    /// A complete pipe table (header, separator, and all rows).
    Table,
}

/// One renderable unit of the Markdown output, with its byte range.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Byte offset of the segment's first byte in the Markdown text.
    pub start: usize,
    /// Byte offset one past the segment's last byte.
    pub end: usize,
}

/// Group segments into chunks within `max_chars` (measured in chars,
/// not bytes, so multi-byte Norwegian text budgets correctly).
///
/// A single segment larger than the budget becomes its own oversized
/// chunk rather than being split mid-table or mid-paragraph.
pub fn chunk_segments(markdown: &str, segments: &[Segment], max_chars: usize) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    if segments.is_empty() {
        return chunks;
    }

    let char_len =
        |seg: &Segment| -> usize { markdown[seg.start..seg.end].chars().count() };

    // Current chunk: inclusive range of segment indices.
    let mut group_start: usize = 0;
    let mut group_chars: usize = 0;

    let close = |chunks: &mut Vec<Chunk>, from: usize, to: usize| {
        let start = segments[from].start;
        let end = segments[to].end;
        chunks.push(Chunk {
            index: chunks.len(),
            text: markdown[start..end].to_string(),
            char_start: start,
            char_end: end,
        });
    };

    for (i, seg) in segments.iter().enumerate() {
        let len = char_len(seg);

        if i > group_start || group_chars > 0 {
            // Would adding this segment burst the budget?
            if group_chars + len > max_chars && i > group_start {
                // Keep a trailing heading with the content that follows
                // it: pull it out of the closing chunk when it is not
                // the chunk's only segment.
                let mut split_at = i;
                if segments[i - 1].kind == SegmentKind::Heading && i - 1 > group_start {
                    split_at = i - 1;
                }
                close(&mut chunks, group_start, split_at - 1);
                group_start = split_at;
                group_chars = (split_at..i).map(|j| char_len(&segments[j])).sum();
            }
        }

        group_chars += len;
    }

    close(&mut chunks, group_start, segments.len() - 1);
    chunks
}
