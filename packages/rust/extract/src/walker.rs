//! DOM walking: boilerplate exclusion, content-root selection, and the
//! typed block walk.
//!
//! Extraction never mutates the parsed document. Boilerplate removal is
//! an exclusion set of node ids collected up front; the walk and all
//! text collection skip excluded subtrees.

use std::collections::HashSet;
use std::sync::LazyLock;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use sourcebank_shared::ContentBlock;

use crate::rules::{StrategyRules, collapse_ws};

/// Structural elements counted for the structure score.
static STRUCTURAL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6, li, tr").expect("valid selector"));

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));

static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));

static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Fallback candidates scanned by the density heuristic.
static CANDIDATE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div, section, article, main").expect("valid selector"));

/// Maximum link-to-text ratio for a density candidate to count as content.
const MAX_LINK_RATIO: f64 = 0.5;

// ---------------------------------------------------------------------------
// Exclusion & counting
// ---------------------------------------------------------------------------

/// Collect the node ids of every element matching a boilerplate selector.
/// Skipping a node during the walk skips its whole subtree.
pub fn collect_excluded(doc: &Html, rules: &StrategyRules) -> HashSet<NodeId> {
    let mut excluded = HashSet::new();
    for selector in &rules.boilerplate_selectors {
        for el in doc.select(selector) {
            excluded.insert(el.id());
        }
    }
    excluded
}

/// Count structural elements (headings, list items, table rows) in the
/// raw DOM, before any stripping. The denominator of the structure score.
pub fn count_structural(doc: &Html) -> usize {
    doc.select(&STRUCTURAL_SEL).count()
}

/// Structure score: structural blocks retained ÷ structural elements
/// detected pre-stripping, clamped to [0,1]. A page with no structural
/// elements scores 1.0 — nothing was lost.
pub fn structure_score(detected: usize, blocks: &[ContentBlock]) -> f64 {
    if detected == 0 {
        return 1.0;
    }
    let retained = blocks.iter().filter(|b| b.is_structural()).count();
    (retained as f64 / detected as f64).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Content root selection
// ---------------------------------------------------------------------------

/// Pick the main-content container.
///
/// Configured content selectors are tried in order; when none match, the
/// density heuristic picks the candidate with the most text whose
/// link-to-text ratio stays below 0.5 — boilerplate-heavy regions are
/// link-dense, article bodies are not. Falls back to `<body>`.
pub fn select_content_root<'a>(
    doc: &'a Html,
    rules: &StrategyRules,
    excluded: &HashSet<NodeId>,
) -> Option<ElementRef<'a>> {
    for selector in &rules.content_selectors {
        if let Some(el) = doc.select(selector).find(|el| !excluded.contains(&el.id())) {
            return Some(el);
        }
    }

    let mut best: Option<(ElementRef<'a>, usize)> = None;
    for el in doc.select(&CANDIDATE_SEL) {
        if excluded.contains(&el.id()) {
            continue;
        }
        let text_len = text_of(el, excluded).chars().count();
        if text_len == 0 {
            continue;
        }
        let link_len: usize = el
            .select(&LINK_SEL)
            .map(|a| text_of(a, excluded).chars().count())
            .sum();
        if (link_len as f64) / (text_len as f64) > MAX_LINK_RATIO {
            continue;
        }
        if best.map(|(_, len)| text_len > len).unwrap_or(true) {
            best = Some((el, text_len));
        }
    }

    best.map(|(el, _)| el)
        .or_else(|| doc.select(&BODY_SEL).next())
}

// ---------------------------------------------------------------------------
// Block walk
// ---------------------------------------------------------------------------

/// Walk a content subtree in document order, emitting typed blocks.
pub fn walk_blocks(
    root: ElementRef<'_>,
    excluded: &HashSet<NodeId>,
    rules: &StrategyRules,
) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    walk_container(root, excluded, rules, &mut blocks);
    blocks
}

fn walk_container(
    el: ElementRef<'_>,
    excluded: &HashSet<NodeId>,
    rules: &StrategyRules,
    out: &mut Vec<ContentBlock>,
) {
    for child in el.children() {
        let Some(cel) = ElementRef::wrap(child) else {
            continue;
        };
        if excluded.contains(&cel.id()) {
            continue;
        }
        let name = cel.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name.as_bytes()[1] - b'0';
                let text = rules.strip_text_boilerplate(&text_of(cel, excluded));
                if !text.is_empty() {
                    out.push(ContentBlock::Heading { level, text });
                }
            }
            "p" => {
                let text = rules.strip_text_boilerplate(&text_of(cel, excluded));
                if !text.is_empty() {
                    out.push(ContentBlock::Paragraph { text });
                }
            }
            "ul" => walk_list(cel, 0, false, excluded, rules, out),
            "ol" => walk_list(cel, 0, true, excluded, rules, out),
            "table" => walk_table(cel, excluded, rules, out),
            "script" | "style" | "noscript" | "template" => {}
            _ => walk_container(cel, excluded, rules, out),
        }
    }
}

/// Walk one `<ul>`/`<ol>`, recursing into lists nested inside items with
/// an incremented depth so nesting is preserved exactly.
fn walk_list(
    list: ElementRef<'_>,
    depth: u8,
    ordered: bool,
    excluded: &HashSet<NodeId>,
    rules: &StrategyRules,
    out: &mut Vec<ContentBlock>,
) {
    for child in list.children() {
        let Some(li) = ElementRef::wrap(child) else {
            continue;
        };
        if li.value().name() != "li" || excluded.contains(&li.id()) {
            continue;
        }

        let text = rules.strip_text_boilerplate(&item_text(li, excluded));
        if !text.is_empty() {
            out.push(ContentBlock::ListItem {
                depth,
                ordered,
                text,
            });
        }

        for sub in li.children() {
            let Some(sel) = ElementRef::wrap(sub) else {
                continue;
            };
            if excluded.contains(&sel.id()) {
                continue;
            }
            match sel.value().name() {
                "ul" => walk_list(sel, depth + 1, false, excluded, rules, out),
                "ol" => walk_list(sel, depth + 1, true, excluded, rules, out),
                _ => {}
            }
        }
    }
}

fn walk_table(
    table: ElementRef<'_>,
    excluded: &HashSet<NodeId>,
    rules: &StrategyRules,
    out: &mut Vec<ContentBlock>,
) {
    for tr in table.select(&TR_SEL) {
        if excluded.contains(&tr.id()) {
            continue;
        }
        let cells: Vec<String> = tr
            .select(&CELL_SEL)
            .filter(|c| !excluded.contains(&c.id()))
            .map(|c| rules.strip_text_boilerplate(&text_of(c, excluded)))
            .collect();
        if !cells.is_empty() {
            out.push(ContentBlock::TableRow { cells });
        }
    }
}

// ---------------------------------------------------------------------------
// Text collection
// ---------------------------------------------------------------------------

/// Collect the visible text of a subtree, skipping excluded nodes and
/// non-content elements, with whitespace collapsed.
pub fn text_of(el: ElementRef<'_>, excluded: &HashSet<NodeId>) -> String {
    let mut buf = String::new();
    gather_text(el, excluded, false, &mut buf);
    collapse_ws(&buf)
}

/// Like [`text_of`] but excluding nested lists — the text of a list item
/// itself, with its sublists emitted as their own blocks.
fn item_text(el: ElementRef<'_>, excluded: &HashSet<NodeId>) -> String {
    let mut buf = String::new();
    gather_text(el, excluded, true, &mut buf);
    collapse_ws(&buf)
}

fn gather_text(
    el: ElementRef<'_>,
    excluded: &HashSet<NodeId>,
    skip_lists: bool,
    buf: &mut String,
) {
    for child in el.children() {
        if let Some(cel) = ElementRef::wrap(child) {
            if excluded.contains(&cel.id()) {
                continue;
            }
            let name = cel.value().name();
            if matches!(name, "script" | "style" | "noscript" | "template") {
                continue;
            }
            if skip_lists && matches!(name, "ul" | "ol") {
                continue;
            }
            gather_text(cel, excluded, skip_lists, buf);
        } else if let Some(text) = child.value().as_text() {
            buf.push_str(text);
            buf.push(' ');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::base_rules;

    fn blocks_of(html: &str) -> Vec<ContentBlock> {
        let doc = Html::parse_document(html);
        let rules = base_rules();
        let excluded = collect_excluded(&doc, &rules);
        let root = select_content_root(&doc, &rules, &excluded).expect("content root");
        walk_blocks(root, &excluded, &rules)
    }

    #[test]
    fn emits_headings_and_paragraphs_in_order() {
        let blocks = blocks_of(
            "<html><body><main><h1>Demens</h1><p>Hva er demens?</p><h2>Symptomer</h2><p>Vanlige symptomer.</p></main></body></html>",
        );
        assert_eq!(
            blocks,
            vec![
                ContentBlock::Heading {
                    level: 1,
                    text: "Demens".into()
                },
                ContentBlock::Paragraph {
                    text: "Hva er demens?".into()
                },
                ContentBlock::Heading {
                    level: 2,
                    text: "Symptomer".into()
                },
                ContentBlock::Paragraph {
                    text: "Vanlige symptomer.".into()
                },
            ]
        );
    }

    #[test]
    fn nested_lists_preserve_depth_and_order_flags() {
        let blocks = blocks_of(
            "<html><body><main><ul>\
             <li>Outer one<ol><li>Inner first</li><li>Inner second</li></ol></li>\
             <li>Outer two</li>\
             </ul></main></body></html>",
        );
        assert_eq!(
            blocks,
            vec![
                ContentBlock::ListItem {
                    depth: 0,
                    ordered: false,
                    text: "Outer one".into()
                },
                ContentBlock::ListItem {
                    depth: 1,
                    ordered: true,
                    text: "Inner first".into()
                },
                ContentBlock::ListItem {
                    depth: 1,
                    ordered: true,
                    text: "Inner second".into()
                },
                ContentBlock::ListItem {
                    depth: 0,
                    ordered: false,
                    text: "Outer two".into()
                },
            ]
        );
    }

    #[test]
    fn tables_emit_rows_with_cells() {
        let blocks = blocks_of(
            "<html><body><main><table>\
             <tr><th>Medisin</th><th>Dose</th></tr>\
             <tr><td>Donepezil</td><td>5 mg</td></tr>\
             </table></main></body></html>",
        );
        assert_eq!(
            blocks,
            vec![
                ContentBlock::TableRow {
                    cells: vec!["Medisin".into(), "Dose".into()]
                },
                ContentBlock::TableRow {
                    cells: vec!["Donepezil".into(), "5 mg".into()]
                },
            ]
        );
    }

    #[test]
    fn boilerplate_subtrees_are_skipped() {
        let blocks = blocks_of(
            "<html><body>\
             <nav><ul><li>Home</li><li>About</li></ul></nav>\
             <main><h1>Content</h1><p>Body text.</p></main>\
             <footer><p>Copyright 2024</p></footer>\
             </body></html>",
        );
        assert!(!blocks.iter().any(|b| match b {
            ContentBlock::Paragraph { text } => text.contains("Copyright"),
            ContentBlock::ListItem { text, .. } => text == "Home",
            _ => false,
        }));
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn density_fallback_picks_text_heavy_low_link_region() {
        // No <main>/<article>: the link farm must lose to the article div.
        let long = "Dette er en lang artikkel om demensomsorg. ".repeat(5);
        let html = format!(
            "<html><body>\
             <div class=\"links\"><a href=\"/a\">En lenke</a> <a href=\"/b\">To lenker</a> <a href=\"/c\">Tre lenker</a></div>\
             <div class=\"story\"><p>{long}</p></div>\
             </body></html>"
        );
        let blocks = blocks_of(&html);
        assert!(matches!(
            &blocks[0],
            ContentBlock::Paragraph { text } if text.contains("demensomsorg")
        ));
    }

    #[test]
    fn structure_score_bounds() {
        let doc = Html::parse_document(
            "<html><body><main><h1>T</h1><ul><li>a</li><li>b</li></ul></main></body></html>",
        );
        let detected = count_structural(&doc);
        assert_eq!(detected, 3);

        let rules = base_rules();
        let excluded = collect_excluded(&doc, &rules);
        let root = select_content_root(&doc, &rules, &excluded).unwrap();
        let blocks = walk_blocks(root, &excluded, &rules);
        let score = structure_score(detected, &blocks);
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn structure_score_penalizes_loss() {
        // Two of four structural elements live in stripped chrome.
        let doc = Html::parse_document(
            "<html><body>\
             <nav><ul><li>x</li><li>y</li></ul></nav>\
             <main><h1>T</h1><ul><li>kept</li></ul></main>\
             </body></html>",
        );
        let detected = count_structural(&doc);
        assert_eq!(detected, 4);

        let rules = base_rules();
        let excluded = collect_excluded(&doc, &rules);
        let root = select_content_root(&doc, &rules, &excluded).unwrap();
        let blocks = walk_blocks(root, &excluded, &rules);
        assert!((structure_score(detected, &blocks) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn structure_score_is_one_when_nothing_detected() {
        assert!((structure_score(0, &[]) - 1.0).abs() < f64::EPSILON);
    }
}
