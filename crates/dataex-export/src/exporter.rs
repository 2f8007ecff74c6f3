//! The structured exporter.
//!
//! Consumes one run's document stream in arrival order and incrementally
//! builds the Data-Exchange container: run metadata at start, array
//! allocation at the first primary descriptor, dark-frame extraction and
//! append-with-growth during event pages, then white-frame extraction,
//! tail trimming, and monitor alignment at stop.
//!
//! Lifecycle per run: Idle -> Open -> Closed. Closed is terminal; delivering
//! further documents is a sequencing fault. Abandoning the stream before
//! `stop` leaves the output structurally incomplete (un-trimmed, unaligned)
//! and the artifact must be discarded by the caller.

use std::mem;

use dataex_core::{
    Column, DescriptorDoc, DocumentSink, Document, EventPageDoc, ExportError, Frame, Result,
    StartDoc, StopDoc,
};
use dataex_storage::{
    ArraySink, Artifacts, Manager, MultiFileManager, OpenMode, StructuredFile,
};
use strfmt::strfmt;
use tracing::{debug, info};

use crate::align::resample_linear;
use crate::classify::{StreamClassifier, StreamRole};
use crate::config::ExportConfig;

const DATA_PATH: &str = "/exchange/data";
const DARK_PATH: &str = "/exchange/data_dark";
const WHITE_PATH: &str = "/exchange/data_white";
const THETA_PATH: &str = "/exchange/theta";

/// Placeholder names referenced by a `{field}`-style template.
///
/// Doubled braces escape; a `:`/`!` inside a placeholder starts a format
/// spec and is not part of the field name.
fn template_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            if chars.peek() == Some(&'{') {
                chars.next();
                continue;
            }
            let mut body = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                body.push(c);
            }
            let name = body.split([':', '!']).next().unwrap_or("");
            if !name.is_empty() {
                names.push(name.to_string());
            }
        } else if c == '}' && chars.peek() == Some(&'}') {
            chars.next();
        }
    }
    names
}

/// Render the filename template against the start document's fields.
fn render_filename(template: &str, start: &StartDoc) -> Result<String> {
    let fields = start.template_fields();
    for name in template_placeholders(template) {
        if !fields.contains_key(&name) {
            return Err(ExportError::TemplateFieldMissing { field: name });
        }
    }
    let prefix = strfmt(template, &fields)
        .map_err(|e| ExportError::sequencing(format!("invalid filename template: {e}")))?;
    Ok(format!("{prefix}.json"))
}

/// Per-run mutable state, live between `start` and `stop`.
#[derive(Debug)]
struct OpenRun {
    run_uid: String,
    chunk: usize,
    sink: ArraySink,
    classifier: StreamClassifier,
    primary_seen: bool,
    primary_batches: u64,
    baseline_recorded: bool,
    /// Per-frame acquisition timestamps for the primary image field,
    /// index-aligned with the main array's rows.
    frame_times: Vec<f64>,
    monitor_times: Vec<f64>,
    monitor_values: Vec<f64>,
}

#[derive(Debug)]
enum RunState {
    Idle,
    Open(Box<OpenRun>),
    Closed,
}

/// Document-driven Data-Exchange serializer for one run.
#[derive(Debug)]
pub struct Exporter<M: Manager> {
    manager: M,
    config: ExportConfig,
    state: RunState,
}

impl Exporter<MultiFileManager> {
    /// Exporter writing files under `directory`.
    pub fn to_directory(directory: impl Into<std::path::PathBuf>, config: ExportConfig) -> Self {
        Self::new(MultiFileManager::new(directory), config)
    }
}

impl<M: Manager> Exporter<M> {
    /// Exporter writing through an explicit manager.
    pub fn new(manager: M, config: ExportConfig) -> Self {
        Self {
            manager,
            config,
            state: RunState::Idle,
        }
    }

    /// Everything produced so far, keyed by artifact label.
    pub fn artifacts(&self) -> &Artifacts {
        self.manager.artifacts()
    }

    /// Release the manager's resources.
    pub fn close(&mut self) -> Result<()> {
        self.manager.close()
    }

    fn scalar_at(page: &EventPageDoc, field: &str, index: usize) -> Result<f64> {
        match page.data.get(field) {
            Some(Column::Scalars(values)) => values.get(index).copied().ok_or_else(|| {
                ExportError::sequencing(format!("event page has no row {index} for field '{field}'"))
            }),
            Some(_) => Err(ExportError::sequencing(format!(
                "field '{field}' is not scalar"
            ))),
            None => Err(ExportError::sequencing(format!(
                "event page missing field '{field}'"
            ))),
        }
    }

    fn handle_baseline(run: &mut OpenRun, config: &ExportConfig, doc: &EventPageDoc) -> Result<()> {
        // First batch wins; later baseline batches are ignored.
        if run.baseline_recorded || doc.is_empty() {
            return Ok(());
        }
        let fields = &config.baseline_fields;
        let x = Self::scalar_at(doc, &fields.x, 0)?;
        let y = Self::scalar_at(doc, &fields.y, 0)?;
        let z = Self::scalar_at(doc, &fields.z, 0)?;
        let r = Self::scalar_at(doc, &fields.r, 0)?;
        run.sink.write_scalar("x_ini", x);
        run.sink.write_scalar("y_ini", y);
        run.sink.write_scalar("z_ini", z);
        run.sink.write_scalar("r_ini", r);
        run.baseline_recorded = true;
        debug!(x, y, z, r, "recorded baseline snapshot");
        Ok(())
    }

    fn handle_primary(run: &mut OpenRun, config: &ExportConfig, doc: &EventPageDoc) -> Result<()> {
        let frames = match doc.data.get(&config.image_field) {
            Some(Column::Frames(frames)) => frames,
            Some(_) => {
                return Err(ExportError::sequencing(format!(
                    "primary image field '{}' is not materialized frames",
                    config.image_field,
                )))
            }
            None => {
                return Err(ExportError::sequencing(format!(
                    "primary event page missing image field '{}'",
                    config.image_field,
                )))
            }
        };
        let times = doc.timestamps.get(&config.image_field).ok_or_else(|| {
            ExportError::sequencing(format!(
                "primary event page missing timestamps for '{}'",
                config.image_field,
            ))
        })?;
        if times.len() != frames.len() {
            return Err(ExportError::sequencing(format!(
                "primary page carries {} frames but {} timestamps",
                frames.len(),
                times.len(),
            )));
        }

        if run.primary_batches == 0 {
            // Frame 0 of the very first batch is the dark reference: averaged
            // (trivially, over one frame) into data_dark, not appended.
            let dark = frames.first().ok_or_else(|| {
                ExportError::sequencing("first primary event page is empty")
            })?;
            run.sink.write_frame(DARK_PATH, dark)?;
            run.sink.append_frames(DATA_PATH, &frames[1..])?;
            run.frame_times.extend_from_slice(&times[1..]);
            debug!(frames = frames.len() - 1, "first primary batch appended after dark extraction");
        } else {
            run.sink.append_frames(DATA_PATH, frames)?;
            run.frame_times.extend_from_slice(times);
        }
        run.primary_batches += 1;
        Ok(())
    }

    fn handle_monitor(run: &mut OpenRun, config: &ExportConfig, doc: &EventPageDoc) -> Result<()> {
        let values = match doc.data.get(&config.monitor_field) {
            Some(Column::Scalars(values)) => values,
            Some(_) => {
                return Err(ExportError::sequencing(format!(
                    "monitor field '{}' is not scalar",
                    config.monitor_field,
                )))
            }
            None => {
                return Err(ExportError::sequencing(format!(
                    "monitor event page missing field '{}'",
                    config.monitor_field,
                )))
            }
        };
        // Monitors without a per-field timestamp column fall back to the
        // event time column.
        let times = doc
            .timestamps
            .get(&config.monitor_field)
            .unwrap_or(&doc.time);
        if times.len() != values.len() {
            return Err(ExportError::sequencing(format!(
                "monitor page carries {} values but {} timestamps",
                values.len(),
                times.len(),
            )));
        }
        run.monitor_times.extend_from_slice(times);
        run.monitor_values.extend_from_slice(values);
        Ok(())
    }
}

impl<M: Manager> DocumentSink for Exporter<M> {
    fn start(&mut self, doc: &StartDoc) -> Result<()> {
        if !matches!(self.state, RunState::Idle) {
            return Err(ExportError::sequencing(
                "start received while a run is open or closed",
            ));
        }
        if doc.chunk_size == 0 {
            return Err(ExportError::sequencing("start document has chunk_size 0"));
        }
        let energy = doc.energy().ok_or_else(|| {
            ExportError::sequencing("start document carries neither x_eng nor x_ray_energy")
        })?;
        let filename = render_filename(&self.config.file_template, doc)?;
        let handle = self
            .manager
            .open("stream_data", &filename, OpenMode::CreateNew)?;
        let mut sink = ArraySink::new(StructuredFile::new(handle));

        sink.write_scalar("note", doc.note.as_str());
        sink.write_scalar("uid", doc.uid.as_str());
        sink.write_scalar("scan_id", doc.scan_id);
        sink.write_scalar("scan_time", doc.scan_time);
        sink.write_scalar("X_eng", energy);

        info!(run_uid = %doc.uid, file = %filename, chunk = doc.chunk_size, "run started");
        self.state = RunState::Open(Box::new(OpenRun {
            run_uid: doc.uid.clone(),
            chunk: doc.chunk_size,
            sink,
            classifier: StreamClassifier::new(&self.config),
            primary_seen: false,
            primary_batches: 0,
            baseline_recorded: false,
            frame_times: Vec::new(),
            monitor_times: Vec::new(),
            monitor_values: Vec::new(),
        }));
        Ok(())
    }

    fn descriptor(&mut self, doc: &DescriptorDoc) -> Result<()> {
        let Self { state, config, .. } = self;
        let run = match state {
            RunState::Open(run) => run,
            _ => {
                return Err(ExportError::sequencing(
                    "descriptor received outside an open run",
                ))
            }
        };
        let role = run.classifier.classify(doc);
        if role == StreamRole::Primary && !run.primary_seen {
            let key = doc.data_keys.get(&config.image_field).ok_or_else(|| {
                ExportError::sequencing(format!(
                    "primary descriptor missing tracked image field '{}'",
                    config.image_field,
                ))
            })?;
            if key.shape.len() < 2 {
                return Err(ExportError::sequencing(format!(
                    "image field '{}' declares shape {:?}, need at least two dimensions",
                    config.image_field, key.shape,
                )));
            }
            let (height, width) = (key.shape[0], key.shape[1]);
            run.sink.create_main(DATA_PATH, height, width, run.chunk)?;
            run.sink.create_aux(DARK_PATH, height, width);
            run.sink.create_aux(WHITE_PATH, height, width);
            run.primary_seen = true;
        }
        Ok(())
    }

    fn event_page(&mut self, doc: &EventPageDoc) -> Result<()> {
        let Self { state, config, .. } = self;
        let run = match state {
            RunState::Open(run) => run,
            _ => {
                return Err(ExportError::sequencing(
                    "event page received outside an open run",
                ))
            }
        };
        match run.classifier.role_of(&doc.descriptor) {
            Some(StreamRole::Baseline) => Self::handle_baseline(run, config, doc),
            Some(StreamRole::Primary) => Self::handle_primary(run, config, doc),
            Some(StreamRole::Monitor) => Self::handle_monitor(run, config, doc),
            // Unrecognized streams are stored in the role map but inert.
            Some(StreamRole::Other) | None => Ok(()),
        }
    }

    fn stop(&mut self, doc: &StopDoc) -> Result<()> {
        let state = mem::replace(&mut self.state, RunState::Closed);
        let run = match state {
            RunState::Open(run) => run,
            other => {
                self.state = other;
                return Err(ExportError::sequencing(
                    "stop received outside an open run",
                ));
            }
        };
        let mut run = *run;
        if !run.primary_seen {
            return Err(ExportError::sequencing(
                "stop received with no primary descriptor seen",
            ));
        }

        // White reference: average of the final chunk. It overwrites the
        // dark average recorded from the first frame; the final idle chunk
        // approximates the true dark level better than the opening frame.
        let tail = run.sink.last_chunk(DATA_PATH)?;
        let white = Frame::mean(&tail).ok_or_else(|| {
            ExportError::sequencing("no frames available for the white reference")
        })?;
        run.sink.write_frame(WHITE_PATH, &white)?;
        run.sink.write_frame(DARK_PATH, &white)?;

        let total = run.sink.frame_count(DATA_PATH);
        if run.frame_times.len() != total {
            return Err(ExportError::sequencing(format!(
                "timestamp buffer holds {} entries for {} frames",
                run.frame_times.len(),
                total,
            )));
        }
        let trim = self.config.trailing_trim_frames;
        run.sink.trim_tail(DATA_PATH, trim)?;
        run.frame_times.truncate(total - trim);

        // Align the sparse monitor series onto the trimmed frame-timestamp
        // grid. Runs without a monitor stream simply have no theta.
        if !run.monitor_times.is_empty() {
            let theta = resample_linear(&run.frame_times, &run.monitor_times, &run.monitor_values)?;
            run.sink.write_array1(THETA_PATH, theta);
        }

        run.sink.close()?;
        info!(
            run_uid = %run.run_uid,
            stop_uid = %doc.uid,
            frames = total - trim,
            "run finalized"
        );
        Ok(())
    }
}

/// Drive a full document stream through an exporter and return the produced
/// artifacts.
pub fn export<I, M>(docs: I, manager: M, config: ExportConfig) -> Result<Artifacts>
where
    I: IntoIterator<Item = Document>,
    M: Manager,
{
    let mut exporter = Exporter::new(manager, config);
    for doc in docs {
        exporter.process(&doc)?;
    }
    exporter.close()?;
    Ok(exporter.artifacts().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataex_storage::MemoryManager;

    #[test]
    fn placeholders_are_extracted_with_escapes() {
        assert_eq!(
            template_placeholders("{uid}-{scan_id}-"),
            vec!["uid".to_string(), "scan_id".to_string()],
        );
        assert_eq!(
            template_placeholders("{{literal}}-{note}"),
            vec!["note".to_string()],
        );
        assert!(template_placeholders("plain").is_empty());
    }

    #[test]
    fn missing_template_field_names_the_field() {
        let start = StartDoc::new("r1", 5);
        let err = render_filename("{proposal_id}-", &start).unwrap_err();
        match err {
            ExportError::TemplateFieldMissing { field } => assert_eq!(field, "proposal_id"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rendered_filename_substitutes_start_fields() {
        let start = StartDoc::new("r1", 5).with_scan_id(7);
        let name = render_filename("{uid}-{scan_id}-", &start).unwrap();
        assert_eq!(name, "r1-7-.json");
    }

    #[test]
    fn documents_before_start_are_sequencing_faults() {
        let mut exporter = Exporter::new(MemoryManager::new(), ExportConfig::default());
        let desc = DescriptorDoc::new("d1", "r1", "primary");
        assert!(matches!(
            exporter.descriptor(&desc),
            Err(ExportError::Sequencing { .. }),
        ));
    }

    #[test]
    fn start_requires_an_energy_field() {
        let mut exporter = Exporter::new(MemoryManager::new(), ExportConfig::default());
        let start = StartDoc::new("r1", 5); // no x_eng, no x_ray_energy
        assert!(matches!(
            exporter.start(&start),
            Err(ExportError::Sequencing { .. }),
        ));
    }

    #[test]
    fn double_start_is_rejected() {
        let mut exporter = Exporter::new(MemoryManager::new(), ExportConfig::default());
        let start = StartDoc::new("r1", 5).with_energy(8.0);
        exporter.start(&start).unwrap();
        assert!(exporter.start(&start).is_err());
    }
}
