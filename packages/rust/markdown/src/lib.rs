//! Deterministic block-to-Markdown conversion and semantic chunking.
//!
//! Conversion maps typed content blocks to Markdown syntax: heading
//! level N becomes N leading `#`, list items become bulleted/numbered
//! lines with indentation matching their depth, contiguous table rows
//! become one pipe table with a separator row derived from the header.
//! Conversion and chunking are pure functions of their input: identical
//! extracted content always yields byte-identical Markdown and
//! identical chunk boundaries, which is what makes retries and caching
//! safe.

mod chunker;

use tracing::{debug, instrument};

use sourcebank_shared::{
    Chunk, ContentBlock, ConversionError, ExtractedContent, MarkdownConfig, Result,
};

pub use chunker::{Segment, SegmentKind, chunk_segments};

/// Result of converting extracted content.
#[derive(Debug, Clone)]
pub struct Converted {
    /// The final Markdown text.
    pub markdown: String,
    /// Ordered retrieval chunks with byte-range provenance.
    pub chunks: Vec<Chunk>,
}

/// Convert extracted content to Markdown and chunk it.
#[instrument(skip_all, fields(blocks = extracted.blocks.len()))]
pub fn convert(extracted: &ExtractedContent, config: &MarkdownConfig) -> Result<Converted> {
    let (markdown, segments) = render_blocks(&extracted.blocks, extracted.title.as_deref())?;
    let chunks = chunk_segments(&markdown, &segments, config.max_chunk_chars);

    debug!(
        markdown_len = markdown.len(),
        chunks = chunks.len(),
        "conversion complete"
    );

    Ok(Converted { markdown, chunks })
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render blocks to Markdown, returning the text plus the segment table
/// (one entry per renderable unit, with byte ranges) used by the chunker.
pub fn render_blocks(
    blocks: &[ContentBlock],
    title: Option<&str>,
) -> Result<(String, Vec<Segment>)> {
    if blocks.is_empty() {
        return Err(ConversionError::NoBlocks.into());
    }

    // Renderable units: each heading/paragraph/list item is one unit; a
    // contiguous run of table rows is a single atomic unit.
    let mut units: Vec<(SegmentKind, String)> = Vec::new();

    // The page title leads as an H1 unless the content already starts
    // with one.
    if let Some(title) = title {
        let starts_with_h1 = matches!(blocks.first(), Some(ContentBlock::Heading { level: 1, .. }));
        if !starts_with_h1 && !title.is_empty() {
            units.push((SegmentKind::Heading, format!("# {title}")));
        }
    }

    // Ordered-list numbering: one counter per depth, reset by any
    // non-list block or by a shallower item.
    let mut counters: Vec<usize> = Vec::new();
    let mut table_rows_buf: Vec<Vec<String>> = Vec::new();

    let mut i = 0;
    while i < blocks.len() {
        match &blocks[i] {
            ContentBlock::TableRow { .. } => {
                // Collect the contiguous run of rows into one table.
                table_rows_buf.clear();
                while let Some(ContentBlock::TableRow { cells }) = blocks.get(i) {
                    table_rows_buf.push(cells.clone());
                    i += 1;
                }
                let rows: Vec<&[String]> = table_rows_buf.iter().map(|r| r.as_slice()).collect();
                units.push((SegmentKind::Table, render_table(&rows)?));
                counters.clear();
                continue;
            }
            ContentBlock::Heading { level, text } => {
                let hashes = "#".repeat((*level).clamp(1, 6) as usize);
                units.push((SegmentKind::Heading, format!("{hashes} {text}")));
                counters.clear();
            }
            ContentBlock::Paragraph { text } => {
                units.push((SegmentKind::Paragraph, text.clone()));
                counters.clear();
            }
            ContentBlock::ListItem {
                depth,
                ordered,
                text,
            } => {
                let depth = *depth as usize;
                counters.truncate(depth + 1);
                while counters.len() <= depth {
                    counters.push(0);
                }
                let indent = "  ".repeat(depth);
                let line = if *ordered {
                    counters[depth] += 1;
                    format!("{indent}{}. {text}", counters[depth])
                } else {
                    counters[depth] = 0;
                    format!("{indent}- {text}")
                };
                units.push((SegmentKind::ListItem, line));
            }
        }
        i += 1;
    }

    // Join units: list items within a run are separated by a single
    // newline, everything else by a blank line.
    let mut markdown = String::new();
    let mut segments: Vec<Segment> = Vec::new();

    for (idx, (kind, text)) in units.iter().enumerate() {
        if idx > 0 {
            let prev_kind = units[idx - 1].0;
            if prev_kind == SegmentKind::ListItem && *kind == SegmentKind::ListItem {
                markdown.push('\n');
            } else {
                markdown.push_str("\n\n");
            }
        }
        let start = markdown.len();
        markdown.push_str(text);
        segments.push(Segment {
            kind: *kind,
            start,
            end: markdown.len(),
        });
    }

    Ok((markdown, segments))
}

/// Render one table: the first row is the header, the separator row is
/// derived from the header's column count, and every row must agree
/// with that count.
fn render_table(rows: &[&[String]]) -> Result<String> {
    let header = rows[0];
    let columns = header.len();

    for (row_idx, row) in rows.iter().enumerate().skip(1) {
        if row.len() != columns {
            return Err(ConversionError::TableShape {
                row: row_idx,
                expected: columns,
                found: row.len(),
            }
            .into());
        }
    }

    let mut out = String::new();
    push_row(&mut out, header);
    out.push('\n');
    out.push_str("| ");
    out.push_str(&vec!["---"; columns].join(" | "));
    out.push_str(" |");
    for row in &rows[1..] {
        out.push('\n');
        push_row(&mut out, row);
    }
    Ok(out)
}

fn push_row(out: &mut String, cells: &[String]) {
    out.push_str("| ");
    let escaped: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
    out.push_str(&escaped.join(" | "));
    out.push_str(" |");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sourcebank_shared::UrlId;

    fn extracted(blocks: Vec<ContentBlock>, title: Option<&str>) -> ExtractedContent {
        ExtractedContent {
            id: 1,
            url_id: UrlId::new(),
            raw_content_version: 1,
            blocks,
            title: title.map(str::to_string),
            author: None,
            published_date: None,
            structure_score: 1.0,
            strategy_used: "generic".into(),
            extracted_at: Utc::now(),
        }
    }

    fn config() -> MarkdownConfig {
        MarkdownConfig {
            max_chunk_chars: 2000,
        }
    }

    fn heading(level: u8, text: &str) -> ContentBlock {
        ContentBlock::Heading {
            level,
            text: text.into(),
        }
    }

    fn para(text: &str) -> ContentBlock {
        ContentBlock::Paragraph { text: text.into() }
    }

    fn item(depth: u8, ordered: bool, text: &str) -> ContentBlock {
        ContentBlock::ListItem {
            depth,
            ordered,
            text: text.into(),
        }
    }

    fn row(cells: &[&str]) -> ContentBlock {
        ContentBlock::TableRow {
            cells: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn heading_levels_map_to_hashes() {
        let content = extracted(
            vec![heading(1, "Demens"), heading(3, "Utredning"), para("Tekst her.")],
            None,
        );
        let result = convert(&content, &config()).unwrap();
        assert!(result.markdown.starts_with("# Demens\n\n### Utredning\n\nTekst her."));
    }

    #[test]
    fn title_leads_when_no_h1() {
        let content = extracted(vec![para("Brødtekst.")], Some("Sidetittel"));
        let result = convert(&content, &config()).unwrap();
        assert!(result.markdown.starts_with("# Sidetittel\n\nBrødtekst."));
    }

    #[test]
    fn title_not_duplicated_when_h1_present() {
        let content = extracted(vec![heading(1, "Sidetittel"), para("Tekst.")], Some("Sidetittel"));
        let result = convert(&content, &config()).unwrap();
        assert_eq!(result.markdown.matches("# Sidetittel").count(), 1);
    }

    #[test]
    fn nested_lists_preserve_depth_and_numbering() {
        let content = extracted(
            vec![
                item(0, true, "Første"),
                item(1, false, "Underpunkt a"),
                item(1, false, "Underpunkt b"),
                item(0, true, "Andre"),
            ],
            None,
        );
        let result = convert(&content, &config()).unwrap();
        assert_eq!(
            result.markdown,
            "1. Første\n  - Underpunkt a\n  - Underpunkt b\n2. Andre"
        );
    }

    #[test]
    fn ordered_numbering_resets_after_interruption() {
        let content = extracted(
            vec![
                item(0, true, "En"),
                item(0, true, "To"),
                para("Mellomtekst."),
                item(0, true, "Ny liste"),
            ],
            None,
        );
        let result = convert(&content, &config()).unwrap();
        assert!(result.markdown.contains("1. En\n2. To"));
        assert!(result.markdown.contains("1. Ny liste"));
        assert!(!result.markdown.contains("3. Ny liste"));
    }

    #[test]
    fn three_column_table_renders_header_separator_and_rows() {
        let content = extracted(
            vec![
                row(&["Medisin", "Dose", "Frekvens"]),
                row(&["Donepezil", "5 mg", "daglig"]),
                row(&["Memantin", "10 mg", "to ganger daglig"]),
            ],
            None,
        );
        let result = convert(&content, &config()).unwrap();
        assert_eq!(
            result.markdown,
            "| Medisin | Dose | Frekvens |\n\
             | --- | --- | --- |\n\
             | Donepezil | 5 mg | daglig |\n\
             | Memantin | 10 mg | to ganger daglig |"
        );
    }

    #[test]
    fn ragged_table_fails_with_table_shape() {
        let content = extracted(
            vec![
                row(&["A", "B", "C"]),
                row(&["1", "2"]),
            ],
            None,
        );
        let err = convert(&content, &config()).unwrap_err();
        assert!(err.to_string().contains("row 1 has 2 cells, header has 3"));
    }

    #[test]
    fn pipes_in_cells_are_escaped() {
        let content = extracted(vec![row(&["a|b", "c"]), row(&["d", "e"])], None);
        let result = convert(&content, &config()).unwrap();
        assert!(result.markdown.contains("| a\\|b | c |"));
    }

    #[test]
    fn empty_blocks_error() {
        let content = extracted(vec![], None);
        let err = convert(&content, &config()).unwrap_err();
        assert!(err.to_string().contains("no blocks"));
    }

    #[test]
    fn conversion_is_deterministic() {
        let content = extracted(
            vec![
                heading(1, "Tittel"),
                para("Avsnitt en."),
                item(0, false, "Punkt"),
                row(&["K", "V"]),
                row(&["x", "y"]),
            ],
            Some("Tittel"),
        );
        let a = convert(&content, &config()).unwrap();
        let b = convert(&content, &config()).unwrap();
        assert_eq!(a.markdown, b.markdown);
        assert_eq!(a.chunks, b.chunks);
    }

    #[test]
    fn chunk_ranges_slice_back_to_text() {
        let paragraphs: Vec<ContentBlock> = (0..30)
            .map(|i| para(&format!("Avsnitt nummer {i} med en del tekst om demensomsorg i kommunen.")))
            .collect();
        let content = extracted(paragraphs, Some("Langt dokument"));
        let result = convert(
            &content,
            &MarkdownConfig {
                max_chunk_chars: 300,
            },
        )
        .unwrap();

        assert!(result.chunks.len() > 1);
        for chunk in &result.chunks {
            assert_eq!(&result.markdown[chunk.char_start..chunk.char_end], chunk.text);
        }
        // Chunks are ordered, non-overlapping, and cover the document.
        assert_eq!(result.chunks[0].char_start, 0);
        for pair in result.chunks.windows(2) {
            assert!(pair[0].char_end < pair[1].char_start);
        }
        assert_eq!(
            result.chunks.last().unwrap().char_end,
            result.markdown.len()
        );
    }
}
