//! Document routing contract.
//!
//! An upstream producer yields documents in arrival order; consumers see them
//! through [`DocumentSink::process`], which normalizes alternate wire forms
//! (a single `event` becomes a one-row `event_page`) and dispatches through a
//! single `match` over the closed set of kinds. Consumers implement only the
//! per-kind methods they care about; the defaults are no-ops.

use tracing::trace;

use crate::document::{
    DatumPageDoc, DescriptorDoc, Document, EventPageDoc, ResourceDoc, StartDoc, StopDoc,
};
use crate::error::Result;

/// A consumer of a canonicalized document stream.
pub trait DocumentSink {
    /// Run start.
    fn start(&mut self, _doc: &StartDoc) -> Result<()> {
        Ok(())
    }

    /// Stream schema declaration.
    fn descriptor(&mut self, _doc: &DescriptorDoc) -> Result<()> {
        Ok(())
    }

    /// Batched measurements (single events arrive here as one-row pages).
    fn event_page(&mut self, _doc: &EventPageDoc) -> Result<()> {
        Ok(())
    }

    /// External data location.
    fn resource(&mut self, _doc: &ResourceDoc) -> Result<()> {
        Ok(())
    }

    /// Pointers into a resource.
    fn datum_page(&mut self, _doc: &DatumPageDoc) -> Result<()> {
        Ok(())
    }

    /// Run stop.
    fn stop(&mut self, _doc: &StopDoc) -> Result<()> {
        Ok(())
    }

    /// Normalize and dispatch one document.
    fn process(&mut self, doc: &Document) -> Result<()> {
        trace!(kind = doc.kind(), "routing document");
        match doc {
            Document::Start(d) => self.start(d),
            Document::Descriptor(d) => self.descriptor(d),
            Document::Event(d) => self.event_page(&d.clone().into_page()),
            Document::EventPage(d) => self.event_page(d),
            Document::Resource(d) => self.resource(d),
            Document::DatumPage(d) => self.datum_page(d),
            Document::Stop(d) => self.stop(d),
        }
    }
}
