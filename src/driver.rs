//! Hooks a report driver calls while walking a report, and the TIFF
//! session that answers them.
//!
//! The protocol is asynchronous because other renderers stream data while a
//! report is walked. Raster output does all of its work in
//! [`RenderDriver::run_pages`]; every other hook resolves immediately.

use crate::TiffRenderer;
use crate::document::RasterDocument;
use crate::error::{RenderError, Result};
use crate::page::{Page, TextItem};
use futures::future::{BoxFuture, FutureExt, ready};
use log::trace;
use std::io::Write;

/// Structural report regions announced through
/// [`RenderDriver::region_start`] / [`RenderDriver::region_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Body,
    PageHeader,
    PageFooter,
    Table,
    List,
    Matrix,
    Rectangle,
    Grouping,
    Subreport,
    Chart,
}

pub trait RenderDriver {
    fn start(&mut self) -> BoxFuture<'_, Result<()>>;

    fn end(&mut self) -> BoxFuture<'_, Result<()>>;

    fn region_start(&mut self, region: Region) -> BoxFuture<'_, Result<()>>;

    fn region_end(&mut self, region: Region) -> BoxFuture<'_, Result<()>>;

    /// Announces a text box while the report is laid out. Nothing is drawn
    /// here; the same text reaches the raster through the page passed to
    /// `run_pages`.
    fn textbox<'a>(&'a mut self, item: &'a TextItem) -> BoxFuture<'a, Result<()>>;

    /// Paints and emits a run of finished pages, in order. This is where
    /// every item is drawn, including text already announced by `textbox`.
    fn run_pages<'a>(&'a mut self, pages: &'a [Page]) -> BoxFuture<'a, Result<()>>;

    /// Whether the driver must paginate before calling `run_pages`.
    fn is_paging_needed(&self) -> BoxFuture<'_, bool>;
}

enum SessionState<W: Write> {
    Idle(W),
    Open(RasterDocument<W>),
    Finished(W),
    /// Transient while ownership of the sink moves between states, and the
    /// resting state after a failure.
    Poisoned,
}

/// One TIFF being produced by a [`TiffRenderer`].
///
/// Pages may arrive over several `run_pages` calls; the first page opens the
/// document and `end` finalizes it.
pub struct TiffSession<'r, W: Write + Send> {
    renderer: &'r TiffRenderer,
    state: SessionState<W>,
    open_regions: Vec<Region>,
    pages: usize,
}

impl<'r, W: Write + Send> TiffSession<'r, W> {
    pub fn new(renderer: &'r TiffRenderer, sink: W) -> Self {
        Self {
            renderer,
            state: SessionState::Idle(sink),
            open_regions: Vec::new(),
            pages: 0,
        }
    }

    pub fn pages_written(&self) -> usize {
        self.pages
    }

    /// The sink, once `end` has finalized the document.
    pub fn into_sink(self) -> Option<W> {
        match self.state {
            SessionState::Finished(sink) => Some(sink),
            _ => None,
        }
    }

    fn emit_pages(&mut self, pages: &[Page]) -> Result<()> {
        for frame in self.renderer.paint_frames(pages)? {
            self.state = match std::mem::replace(&mut self.state, SessionState::Poisoned) {
                SessionState::Idle(sink) => {
                    SessionState::Open(RasterDocument::open(sink, frame, self.renderer.document_options())?)
                }
                SessionState::Open(mut document) => {
                    document.append(frame)?;
                    SessionState::Open(document)
                }
                SessionState::Finished(_) | SessionState::Poisoned => {
                    return Err(RenderError::InvalidConfiguration(
                        "pages supplied after the session ended".to_string(),
                    ));
                }
            };
            self.pages += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.state = match std::mem::replace(&mut self.state, SessionState::Poisoned) {
            SessionState::Open(document) => SessionState::Finished(document.finalize()?),
            SessionState::Idle(_) => return Err(RenderError::EmptyDocument),
            SessionState::Finished(sink) => SessionState::Finished(sink),
            SessionState::Poisoned => {
                return Err(RenderError::InvalidConfiguration(
                    "session failed earlier".to_string(),
                ));
            }
        };
        if !self.open_regions.is_empty() {
            trace!("session ended with unclosed regions {:?}", self.open_regions);
        }
        Ok(())
    }
}

impl<W: Write + Send> RenderDriver for TiffSession<'_, W> {
    fn start(&mut self) -> BoxFuture<'_, Result<()>> {
        trace!("tiff session start");
        ready(Ok(())).boxed()
    }

    fn end(&mut self) -> BoxFuture<'_, Result<()>> {
        ready(self.finish()).boxed()
    }

    fn region_start(&mut self, region: Region) -> BoxFuture<'_, Result<()>> {
        trace!("region start {region:?}");
        self.open_regions.push(region);
        ready(Ok(())).boxed()
    }

    fn region_end(&mut self, region: Region) -> BoxFuture<'_, Result<()>> {
        trace!("region end {region:?}");
        if let Some(pos) = self.open_regions.iter().rposition(|r| *r == region) {
            self.open_regions.truncate(pos);
        }
        ready(Ok(())).boxed()
    }

    fn textbox<'a>(&'a mut self, item: &'a TextItem) -> BoxFuture<'a, Result<()>> {
        trace!("textbox at {:?}", item.bounds);
        ready(Ok(())).boxed()
    }

    fn run_pages<'a>(&'a mut self, pages: &'a [Page]) -> BoxFuture<'a, Result<()>> {
        ready(self.emit_pages(pages)).boxed()
    }

    fn is_paging_needed(&self) -> BoxFuture<'_, bool> {
        ready(true).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageSize;
    use futures::executor::block_on;

    fn small_page() -> Page {
        Page::new(PageSize::from_inches(0.1, 0.1))
    }

    #[test]
    fn pages_across_several_runs_form_one_document() {
        let renderer = TiffRenderer::builder().build().unwrap();
        let mut session = TiffSession::new(&renderer, Vec::new());
        block_on(async {
            session.start().await.unwrap();
            session.region_start(Region::Body).await.unwrap();
            session.run_pages(&[small_page(), small_page()]).await.unwrap();
            session.run_pages(&[small_page()]).await.unwrap();
            session.region_end(Region::Body).await.unwrap();
            session.end().await.unwrap();
        });
        assert_eq!(session.pages_written(), 3);
        let bytes = session.into_sink().unwrap();
        assert_eq!(&bytes[..4], b"II*\0");
    }

    #[test]
    fn ending_without_pages_is_an_error() {
        let renderer = TiffRenderer::builder().build().unwrap();
        let mut session = TiffSession::new(&renderer, Vec::new());
        let result = block_on(session.end());
        assert!(matches!(result, Err(RenderError::EmptyDocument)));
        assert!(session.into_sink().is_none());
    }

    #[test]
    fn pages_after_end_are_rejected() {
        let renderer = TiffRenderer::builder().build().unwrap();
        let mut session = TiffSession::new(&renderer, Vec::new());
        block_on(session.run_pages(&[small_page()])).unwrap();
        block_on(session.end()).unwrap();
        let result = block_on(session.run_pages(&[small_page()]));
        assert!(matches!(result, Err(RenderError::InvalidConfiguration(_))));
    }

    #[test]
    fn textbox_content_is_drawn_by_its_page() {
        use crate::page::PageItem;
        use crate::style::StyleInfo;
        use crate::types::Rect;

        let renderer = TiffRenderer::builder().build().unwrap();
        let mut session = TiffSession::new(&renderer, Vec::new());
        let text = TextItem::new(Rect::new(0.0, 0.0, 5.0, 5.0), "x", StyleInfo::default());
        block_on(session.textbox(&text)).unwrap();
        assert_eq!(session.pages_written(), 0);

        let mut page = small_page();
        page.push(PageItem::Text(text));
        block_on(session.run_pages(&[page])).unwrap();
        assert_eq!(session.pages_written(), 1);
    }

    #[test]
    fn structural_hooks_resolve_immediately() {
        let renderer = TiffRenderer::builder().build().unwrap();
        let mut session = TiffSession::new(&renderer, Vec::new());
        assert!(block_on(session.is_paging_needed()));
        for region in [Region::PageHeader, Region::Table, Region::Chart] {
            assert!(block_on(session.region_start(region)).is_ok());
        }
        assert!(block_on(session.region_end(Region::Table)).is_ok());
        assert_eq!(session.open_regions, vec![Region::PageHeader]);
    }
}
