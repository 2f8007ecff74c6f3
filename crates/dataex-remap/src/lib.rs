//! `dataex-remap`
//!
//! Provenance rewriting for externally stored data. For every resource in a
//! run's stream the [`Remapper`] mints a shadow resource, and for every datum
//! a shadow datum id, so that a derived per-frame field (the acquisition
//! timestamp) becomes retrievable through the same addressing scheme as the
//! frames it annotates. Original records are never mutated: the remapper
//! forwards rewritten clones to its downstream sink, shadow documents first.
//!
//! Mapping tables are owned by one `Remapper` per run and die with it; there
//! is no process-wide state.

use std::collections::HashMap;

use dataex_core::{
    Column, DatumPageDoc, DescriptorDoc, Document, DocumentSink, EventPageDoc, ExportError,
    ResourceDoc, Result, StartDoc, StopDoc,
};
use tracing::debug;
use uuid::Uuid;

/// Kind tag stamped onto shadow resources, marking them as derived
/// per-frame-timestamp resources.
pub const DERIVED_TIMESTAMP_SPEC: &str = "AD_HDF5_TS";

/// Rewrites resource/datum provenance for one run and forwards the document
/// stream (originals plus shadows) to a downstream sink.
#[derive(Debug)]
pub struct Remapper<S: DocumentSink> {
    image_field: String,
    shadow_field: String,
    resource_uids: HashMap<String, String>,
    datum_ids: HashMap<String, String>,
    downstream: S,
}

impl<S: DocumentSink> Remapper<S> {
    /// Track `image_field`, annotating events with `shadow_field`, and hand
    /// every produced document to `downstream`.
    pub fn new(image_field: &str, shadow_field: &str, downstream: S) -> Self {
        Self {
            image_field: image_field.to_string(),
            shadow_field: shadow_field.to_string(),
            resource_uids: HashMap::new(),
            datum_ids: HashMap::new(),
            downstream,
        }
    }

    /// Shadow uid minted for an original resource uid, if any.
    pub fn shadow_resource_uid(&self, uid: &str) -> Option<&str> {
        self.resource_uids.get(uid).map(String::as_str)
    }

    /// Shadow datum id minted for an original datum id, if any.
    pub fn shadow_datum_id(&self, datum_id: &str) -> Option<&str> {
        self.datum_ids.get(datum_id).map(String::as_str)
    }

    /// Borrow the downstream sink.
    pub fn downstream(&self) -> &S {
        &self.downstream
    }

    /// Consume the remapper, returning its downstream sink.
    pub fn into_downstream(self) -> S {
        self.downstream
    }
}

impl<S: DocumentSink> DocumentSink for Remapper<S> {
    fn start(&mut self, doc: &StartDoc) -> Result<()> {
        self.downstream.process(&Document::Start(doc.clone()))
    }

    fn descriptor(&mut self, doc: &DescriptorDoc) -> Result<()> {
        // Declare the shadow field alongside the tracked one: same key, with
        // the shape reduced to its leading (per-frame) dimension.
        let mut copy = doc.clone();
        if let Some(mut shadow_key) = copy.data_keys.get(&self.image_field).cloned() {
            shadow_key.shape.truncate(1);
            copy.data_keys.insert(self.shadow_field.clone(), shadow_key);
        }
        self.downstream.process(&Document::Descriptor(copy))
    }

    fn resource(&mut self, doc: &ResourceDoc) -> Result<()> {
        if doc.uid.is_empty() {
            return Err(ExportError::MalformedResource {
                reason: "resource document lacks a uid".to_string(),
            });
        }
        if self.resource_uids.contains_key(&doc.uid) {
            return Err(ExportError::sequencing(format!(
                "resource '{}' remapped twice",
                doc.uid,
            )));
        }
        let shadow_uid = Uuid::new_v4().to_string();
        debug!(original = %doc.uid, shadow = %shadow_uid, "minted shadow resource");
        self.resource_uids.insert(doc.uid.clone(), shadow_uid.clone());

        let mut copy = doc.clone();
        copy.uid = shadow_uid;
        copy.spec = DERIVED_TIMESTAMP_SPEC.to_string();
        self.downstream.process(&Document::Resource(copy))?;
        self.downstream.process(&Document::Resource(doc.clone()))
    }

    fn datum_page(&mut self, doc: &DatumPageDoc) -> Result<()> {
        let shadow_res = self
            .resource_uids
            .get(&doc.resource)
            .cloned()
            .ok_or_else(|| ExportError::UnknownResource {
                uid: doc.resource.clone(),
            })?;

        // Shadow ids are re-indexed by position within this batch; only the
        // datum_id entries change, per the output contract.
        let mut copy = doc.clone();
        for (index, datum_id) in doc.datum_id.iter().enumerate() {
            let shadow_id = format!("{shadow_res}/{index}");
            self.datum_ids.insert(datum_id.clone(), shadow_id.clone());
            copy.datum_id[index] = shadow_id;
        }
        self.downstream.process(&Document::DatumPage(copy))?;
        self.downstream.process(&Document::DatumPage(doc.clone()))
    }

    fn event_page(&mut self, doc: &EventPageDoc) -> Result<()> {
        let mut copy = doc.clone();
        if let Some(Column::Refs(ids)) = doc.data.get(&self.image_field) {
            let shadow_ids = ids
                .iter()
                .map(|id| {
                    self.datum_ids
                        .get(id)
                        .cloned()
                        .ok_or_else(|| ExportError::UnknownDatum {
                            datum_id: id.clone(),
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let rows = shadow_ids.len();
            copy.data
                .insert(self.shadow_field.clone(), Column::Refs(shadow_ids));
            if let Some(filled) = copy.filled.as_mut() {
                // The shadow field's external data has not been fetched yet.
                filled.insert(self.shadow_field.clone(), vec![false; rows]);
            }
        }
        self.downstream.process(&Document::EventPage(copy))
    }

    fn stop(&mut self, doc: &StopDoc) -> Result<()> {
        self.downstream.process(&Document::Stop(doc.clone()))
    }
}
