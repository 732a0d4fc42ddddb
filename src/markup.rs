//! A small inline-markup layout for composite text items.
//!
//! The markup is parsed as an HTML fragment. `<b>`/`<strong>`, `<i>`/`<em>`,
//! `<u>`/`<ins>` and headings change the run style, `<br>` breaks the line
//! and block elements (`<p>`, `<div>`, `<li>`, ...) start a new paragraph.
//! Any other element contributes its text content unstyled. Words flow left
//! to right inside the item's padded bounds and wrap at the right edge;
//! lines that start below the bottom edge are dropped.

use crate::error::Result;
use crate::page::{LayoutContext, MarkupLayout, PageItem, TextItem};
use crate::style::{
    Borders, FontStyle, FontWeight, GradientType, Padding, StyleInfo, TextDecoration,
};
use crate::types::{Color, Rect};
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use log::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Emphasis {
    bold: bool,
    italic: bool,
    underline: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Word(String, Emphasis),
    Space,
    LineBreak,
    ParagraphBreak,
}

/// How an element affects the runs inside it.
enum ElementRole {
    Inline(Emphasis),
    Block(Emphasis),
    LineBreak,
    Hidden,
}

fn element_role(tag: &str, outer: Emphasis) -> ElementRole {
    let mut emphasis = outer;
    match tag {
        "b" | "strong" => emphasis.bold = true,
        "i" | "em" => emphasis.italic = true,
        "u" | "ins" => emphasis.underline = true,
        "br" => return ElementRole::LineBreak,
        "head" | "script" | "style" | "title" | "template" => return ElementRole::Hidden,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            emphasis.bold = true;
            return ElementRole::Block(emphasis);
        }
        "p" | "div" | "li" | "ul" | "ol" | "blockquote" | "table" | "tr" => {
            return ElementRole::Block(emphasis);
        }
        _ => {}
    }
    ElementRole::Inline(emphasis)
}

/// Markup layout for basic inline HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleMarkup;

impl MarkupLayout for SimpleMarkup {
    fn layout(
        &self,
        markup: &str,
        bounds: Rect,
        style: &StyleInfo,
        ctx: &LayoutContext<'_>,
    ) -> Result<Vec<PageItem>> {
        let events = collect_events(markup);
        Ok(flow(&events, bounds, style, ctx))
    }
}

fn collect_events(markup: &str) -> Vec<Event> {
    let document = kuchiki::parse_html().one(markup);
    let mut events = Vec::new();
    walk(&document, Emphasis::default(), &mut events);
    while matches!(events.last(), Some(Event::Space | Event::ParagraphBreak)) {
        events.pop();
    }
    events
}

fn walk(node: &NodeRef, emphasis: Emphasis, events: &mut Vec<Event>) {
    match node.data() {
        NodeData::Text(text) => push_text(&text.borrow(), emphasis, events),
        NodeData::Element(el) => {
            let tag = el.name.local.as_ref().to_ascii_lowercase();
            match element_role(&tag, emphasis) {
                ElementRole::Hidden => {}
                ElementRole::LineBreak => events.push(Event::LineBreak),
                ElementRole::Inline(inner) => {
                    for child in node.children() {
                        walk(&child, inner, events);
                    }
                }
                ElementRole::Block(inner) => {
                    paragraph_break(events);
                    for child in node.children() {
                        walk(&child, inner, events);
                    }
                    paragraph_break(events);
                }
            }
        }
        NodeData::Document(_) | NodeData::DocumentFragment => {
            for child in node.children() {
                walk(&child, emphasis, events);
            }
        }
        _ => {}
    }
}

fn push_text(text: &str, emphasis: Emphasis, events: &mut Vec<Event>) {
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() && ch != '\u{a0}' {
            flush_word(&mut word, emphasis, events);
            push_space(events);
        } else {
            word.push(ch);
        }
    }
    flush_word(&mut word, emphasis, events);
}

fn flush_word(word: &mut String, emphasis: Emphasis, events: &mut Vec<Event>) {
    if !word.is_empty() {
        events.push(Event::Word(std::mem::take(word), emphasis));
    }
}

fn push_space(events: &mut Vec<Event>) {
    if matches!(events.last(), Some(Event::Word(..))) {
        events.push(Event::Space);
    }
}

/// Never leading, never doubled.
fn paragraph_break(events: &mut Vec<Event>) {
    if matches!(events.last(), Some(Event::Space)) {
        events.pop();
    }
    if matches!(events.last(), None | Some(Event::ParagraphBreak)) {
        return;
    }
    events.push(Event::ParagraphBreak);
}

/// Style for one child run: the composite's text attributes with its box
/// decoration removed, so the composite's border is not repeated per word.
fn run_style(base: &StyleInfo, emphasis: Emphasis) -> StyleInfo {
    let mut style = StyleInfo {
        borders: Borders::default(),
        background_color: Color::EMPTY,
        gradient_type: GradientType::None,
        gradient_end_color: Color::EMPTY,
        background_image: None,
        padding: Padding::default(),
        ..base.clone()
    };
    if emphasis.bold {
        style.font_weight = FontWeight::Bold;
    }
    if emphasis.italic {
        style.font_style = FontStyle::Italic;
    }
    if emphasis.underline {
        style.text_decoration = TextDecoration::Underline;
    }
    style
}

struct Flow<'c, 'f> {
    ctx: &'c LayoutContext<'f>,
    area: Rect,
    x: f32,
    y: f32,
    line_height: f32,
    items: Vec<PageItem>,
}

impl Flow<'_, '_> {
    fn new_line(&mut self, fallback_height: f32) {
        let advance = if self.line_height > 0.0 {
            self.line_height
        } else {
            fallback_height
        };
        self.y += advance;
        self.x = self.area.x;
        self.line_height = 0.0;
    }

    fn fits_vertically(&self) -> bool {
        self.y < self.area.bottom()
    }
}

fn flow(events: &[Event], bounds: Rect, base: &StyleInfo, ctx: &LayoutContext<'_>) -> Vec<PageItem> {
    let pad = base.padding;
    let area = Rect::new(
        bounds.x + pad.left,
        bounds.y + pad.top,
        (bounds.width - pad.left - pad.right).max(0.0),
        (bounds.height - pad.top - pad.bottom).max(0.0),
    );
    let base_height = ctx.line_height(base);
    let mut flow = Flow {
        ctx,
        area,
        x: area.x,
        y: area.y,
        line_height: 0.0,
        items: Vec::new(),
    };
    let mut pending_space = 0.0f32;

    for event in events {
        match event {
            Event::Space => {
                if flow.x > area.x {
                    pending_space = flow.ctx.measure_text(" ", base);
                }
            }
            Event::LineBreak => {
                flow.new_line(base_height);
                pending_space = 0.0;
            }
            Event::ParagraphBreak => {
                if flow.x > area.x {
                    flow.new_line(base_height);
                }
                flow.y += base_height * 0.5;
                pending_space = 0.0;
            }
            Event::Word(word, emphasis) => {
                let style = run_style(base, *emphasis);
                let width = flow.ctx.measure_text(word, &style);
                let height = flow.ctx.line_height(&style);
                let mut x = flow.x + pending_space;
                if x > area.x && x + width > area.right() {
                    flow.new_line(base_height);
                    x = flow.x;
                }
                pending_space = 0.0;
                if !flow.fits_vertically() {
                    trace!("markup overflow, dropping {word:?}");
                    continue;
                }
                let mut item = TextItem::new(Rect::new(x, flow.y, width, height), word.clone(), style);
                item.no_clip = true;
                flow.items.push(item.into());
                flow.x = x + width;
                flow.line_height = flow.line_height.max(height);
            }
        }
    }
    flow.items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontRegistry;

    fn layout(markup: &str, bounds: Rect) -> Result<Vec<TextItem>> {
        let fonts = FontRegistry::new();
        let ctx = LayoutContext {
            fonts: &fonts,
            default_family: "Arial",
        };
        let items = SimpleMarkup.layout(markup, bounds, &StyleInfo::default(), &ctx)?;
        Ok(items
            .into_iter()
            .map(|item| match item {
                PageItem::Text(text) => text,
                other => panic!("unexpected child {}", other.kind_name()),
            })
            .collect())
    }

    #[test]
    fn emphasis_tags_change_run_style() {
        let items = layout("<b>Bold</b> <i>slanted</i> <u>under</u> plain", Rect::new(0.0, 0.0, 1000.0, 100.0)).unwrap();
        let words: Vec<_> = items.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, ["Bold", "slanted", "under", "plain"]);
        assert_eq!(items[0].style.font_weight, FontWeight::Bold);
        assert_eq!(items[1].style.font_style, FontStyle::Italic);
        assert_eq!(items[2].style.text_decoration, TextDecoration::Underline);
        assert_eq!(items[3].style.font_weight, FontWeight::Normal);
        assert!(items.iter().all(|t| t.no_clip));
        assert!(items.windows(2).all(|w| w[0].bounds.x < w[1].bounds.x));
    }

    #[test]
    fn line_break_and_paragraph_move_down() {
        let items = layout("one<br>two<p>three</p>", Rect::new(10.0, 20.0, 500.0, 200.0)).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].bounds.x, 10.0);
        assert_eq!(items[1].bounds.x, 10.0);
        assert!(items[1].bounds.y > items[0].bounds.y);
        let line = items[1].bounds.y - items[0].bounds.y;
        assert!(items[2].bounds.y - items[1].bounds.y > line);
    }

    #[test]
    fn words_wrap_at_right_edge() {
        let items = layout("aaaa bbbb cccc dddd", Rect::new(0.0, 0.0, 30.0, 500.0)).unwrap();
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|t| t.bounds.x == 0.0));
        assert!(items.windows(2).all(|w| w[1].bounds.y > w[0].bounds.y));
    }

    #[test]
    fn lines_past_the_bottom_are_dropped() {
        let items = layout("a<br>b<br>c<br>d", Rect::new(0.0, 0.0, 100.0, 15.0)).unwrap();
        assert!(!items.is_empty());
        assert!(items.len() < 4);
    }

    #[test]
    fn entities_decode() {
        let items = layout("Fish&amp;Chips &lt;3 &#65;&#x42;", Rect::new(0.0, 0.0, 1000.0, 50.0)).unwrap();
        let words: Vec<_> = items.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, ["Fish&Chips", "<3", "AB"]);
    }

    #[test]
    fn unknown_elements_fall_through_to_text() {
        let bounds = Rect::new(0.0, 0.0, 1000.0, 100.0);
        let items = layout(r#"<span>x</span> <font color="red">y</font><table><tr><td>z</td></tr></table>"#, bounds).unwrap();
        let words: Vec<_> = items.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, ["x", "y", "z"]);
        assert!(items.iter().all(|t| t.style.font_weight == FontWeight::Normal));
        assert!(items[2].bounds.y > items[1].bounds.y);
    }

    #[test]
    fn unclosed_and_crossed_tags_still_lay_out() {
        let bounds = Rect::new(0.0, 0.0, 1000.0, 100.0);
        let items = layout("<b>never closed", bounds).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|t| t.style.font_weight == FontWeight::Bold));

        let items = layout("<i>crossed</b> tail", bounds).unwrap();
        let words: Vec<_> = items.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, ["crossed", "tail"]);
        assert_eq!(items[0].style.font_style, FontStyle::Italic);
    }

    #[test]
    fn script_and_style_are_not_drawn() {
        let bounds = Rect::new(0.0, 0.0, 1000.0, 100.0);
        let items = layout("<style>p { color: red }</style>shown<script>hidden()</script>", bounds).unwrap();
        let words: Vec<_> = items.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, ["shown"]);
    }

    #[test]
    fn blocks_separate_paragraphs_once() {
        let events = collect_events("<div><p>a</p></div><p></p><p>b</p>");
        let a = Event::Word("a".into(), Emphasis::default());
        let b = Event::Word("b".into(), Emphasis::default());
        assert_eq!(events, [a, Event::ParagraphBreak, b]);
    }

    #[test]
    fn children_drop_box_decoration() {
        let mut base = StyleInfo::default();
        base.background_color = Color::rgb(200, 0, 0);
        base.padding = Padding::all(4.0);
        let style = run_style(&base, Emphasis::default());
        assert!(style.background_color.is_empty());
        assert_eq!(style.padding, Padding::default());
        assert_eq!(style.font_family, base.font_family);
    }
}
