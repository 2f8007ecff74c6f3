//! Document model for the experiment stream.
//!
//! A run is one acquisition session described by a time-ordered stream of
//! self-describing documents:
//!
//! ```text
//! Start (1)
//!    ├── Descriptor (1+, one per data stream)
//!    │       └── Event / EventPage (N, measurements)
//!    ├── Resource (0+, external data locations)
//!    │       └── DatumPage (pointers into a resource)
//! Stop (1)
//! ```
//!
//! The set of document kinds is closed: [`Document`] is a tagged union and
//! every consumer dispatches through a single `match`, so an unhandled kind
//! is a compile error rather than a silently ignored string.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// One column of an event page: per-event values for a single field.
///
/// Serialized untagged so the wire form stays a plain array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    /// Scalar values, one per event.
    Scalars(Vec<f64>),
    /// Detector frames, one per event (materialized external data).
    Frames(Vec<Frame>),
    /// Datum-id references, one per event (external data not yet fetched).
    Refs(Vec<String>),
}

impl Column {
    /// Number of events covered by this column.
    pub fn len(&self) -> usize {
        match self {
            Column::Scalars(v) => v.len(),
            Column::Frames(v) => v.len(),
            Column::Refs(v) => v.len(),
        }
    }

    /// True when the column holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single value within a non-batched event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// A scalar measurement.
    Scalar(f64),
    /// A detector frame.
    Frame(Frame),
    /// A datum-id reference.
    Ref(String),
}

impl CellValue {
    fn into_column(self) -> Column {
        match self {
            CellValue::Scalar(v) => Column::Scalars(vec![v]),
            CellValue::Frame(f) => Column::Frames(vec![f]),
            CellValue::Ref(r) => Column::Refs(vec![r]),
        }
    }
}

/// Run-start document: run identity plus acquisition metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartDoc {
    /// Unique run identifier (this IS the run uid).
    pub uid: String,
    /// Wall-clock start time, seconds since the epoch.
    pub time: f64,
    /// Human-facing sequential scan number.
    pub scan_id: i64,
    /// Acquisition start time as recorded by the instrument.
    pub scan_time: f64,
    /// Operator note.
    pub note: String,
    /// Frames per detector batch; also the dataset chunking hint.
    pub chunk_size: usize,
    /// X-ray energy (preferred field).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_eng: Option<f64>,
    /// X-ray energy (legacy field, used when `x_eng` is absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_ray_energy: Option<f64>,
    /// Arbitrary user metadata, available to filename templates.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl StartDoc {
    /// Create a start document with the fields every run must carry.
    pub fn new(uid: &str, chunk_size: usize) -> Self {
        Self {
            uid: uid.to_string(),
            time: 0.0,
            scan_id: 0,
            scan_time: 0.0,
            note: String::new(),
            chunk_size,
            x_eng: None,
            x_ray_energy: None,
            extra: HashMap::new(),
        }
    }

    /// Builder: set the scan id.
    pub fn with_scan_id(mut self, scan_id: i64) -> Self {
        self.scan_id = scan_id;
        self
    }

    /// Builder: set the operator note.
    pub fn with_note(mut self, note: &str) -> Self {
        self.note = note.to_string();
        self
    }

    /// Builder: set the x-ray energy.
    pub fn with_energy(mut self, x_eng: f64) -> Self {
        self.x_eng = Some(x_eng);
        self
    }

    /// Builder: attach arbitrary user metadata.
    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }

    /// X-ray energy, preferring `x_eng` and falling back to the legacy
    /// `x_ray_energy` field.
    pub fn energy(&self) -> Option<f64> {
        self.x_eng.or(self.x_ray_energy)
    }

    /// Look up a field by name, typed fields first, then `extra`.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "uid" => Some(self.uid.clone()),
            "time" => Some(self.time.to_string()),
            "scan_id" => Some(self.scan_id.to_string()),
            "scan_time" => Some(self.scan_time.to_string()),
            "note" => Some(self.note.clone()),
            "chunk_size" => Some(self.chunk_size.to_string()),
            _ => self.extra.get(name).cloned(),
        }
    }

    /// All template-visible fields as display strings.
    pub fn template_fields(&self) -> HashMap<String, String> {
        let mut fields = self.extra.clone();
        for name in ["uid", "time", "scan_id", "scan_time", "note", "chunk_size"] {
            if let Some(value) = self.field(name) {
                fields.insert(name.to_string(), value);
            }
        }
        fields
    }
}

/// Schema for one field of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataKey {
    /// Data kind: "number", "integer", "string", "array".
    pub dtype: String,
    /// Shape for arrays; empty for scalars.
    pub shape: Vec<usize>,
    /// Producing device.
    pub source: String,
    /// Physical units.
    #[serde(default)]
    pub units: String,
}

impl DataKey {
    /// A scalar number field.
    pub fn scalar(source: &str, units: &str) -> Self {
        Self {
            dtype: "number".to_string(),
            shape: vec![],
            source: source.to_string(),
            units: units.to_string(),
        }
    }

    /// An array field of the given shape.
    pub fn array(source: &str, shape: Vec<usize>) -> Self {
        Self {
            dtype: "array".to_string(),
            shape,
            source: source.to_string(),
            units: String::new(),
        }
    }
}

/// Stream-schema descriptor: declares a named stream and its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorDoc {
    /// Descriptor identifier, unique within the run.
    pub uid: String,
    /// Owning run.
    pub run_uid: String,
    /// Stream name ("primary", "baseline", a monitor name, ...).
    pub name: String,
    /// Field name -> schema.
    pub data_keys: HashMap<String, DataKey>,
    /// Wall-clock time.
    pub time: f64,
}

impl DescriptorDoc {
    /// Create a descriptor for the named stream.
    pub fn new(uid: &str, run_uid: &str, name: &str) -> Self {
        Self {
            uid: uid.to_string(),
            run_uid: run_uid.to_string(),
            name: name.to_string(),
            data_keys: HashMap::new(),
            time: 0.0,
        }
    }

    /// Builder: declare a field.
    pub fn with_data_key(mut self, name: &str, key: DataKey) -> Self {
        self.data_keys.insert(name.to_string(), key);
        self
    }
}

/// Canonical batched event form: an ordered, fixed-length-per-field
/// collection of data points belonging to one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPageDoc {
    /// Back-reference to the owning stream's descriptor uid.
    pub descriptor: String,
    /// Per-event sequence numbers.
    pub seq_num: Vec<u64>,
    /// Per-event wall-clock times.
    pub time: Vec<f64>,
    /// Field name -> per-event values.
    pub data: HashMap<String, Column>,
    /// Field name -> per-event acquisition timestamps.
    #[serde(default)]
    pub timestamps: HashMap<String, Vec<f64>>,
    /// Materialization state per field, when tracked: `false` marks a
    /// reference whose external data has not been fetched yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled: Option<HashMap<String, Vec<bool>>>,
}

impl EventPageDoc {
    /// An empty page for the given stream.
    pub fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            seq_num: Vec::new(),
            time: Vec::new(),
            data: HashMap::new(),
            timestamps: HashMap::new(),
            filled: None,
        }
    }

    /// Number of events in the page.
    pub fn len(&self) -> usize {
        self.seq_num.len()
    }

    /// True when the page carries no events.
    pub fn is_empty(&self) -> bool {
        self.seq_num.is_empty()
    }

    /// Builder: set a field's column and its per-event timestamps.
    pub fn with_column(mut self, field: &str, column: Column, timestamps: Vec<f64>) -> Self {
        self.data.insert(field.to_string(), column);
        self.timestamps.insert(field.to_string(), timestamps);
        self
    }

    /// Builder: set the per-event sequence numbers and times.
    pub fn with_index(mut self, seq_num: Vec<u64>, time: Vec<f64>) -> Self {
        self.seq_num = seq_num;
        self.time = time;
        self
    }
}

/// Non-batched event form. Normalized into a one-row [`EventPageDoc`] before
/// any core component sees it; exists only to honor the router contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDoc {
    /// Back-reference to the owning stream's descriptor uid.
    pub descriptor: String,
    /// Sequence number within the stream.
    pub seq_num: u64,
    /// Wall-clock time.
    pub time: f64,
    /// Field name -> value.
    pub data: HashMap<String, CellValue>,
    /// Field name -> acquisition timestamp.
    #[serde(default)]
    pub timestamps: HashMap<String, f64>,
    /// Materialization state per field, when tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled: Option<HashMap<String, bool>>,
}

impl EventDoc {
    /// Normalize into the canonical one-row batched form.
    pub fn into_page(self) -> EventPageDoc {
        let data = self
            .data
            .into_iter()
            .map(|(k, v)| (k, v.into_column()))
            .collect();
        let timestamps = self
            .timestamps
            .into_iter()
            .map(|(k, v)| (k, vec![v]))
            .collect();
        let filled = self
            .filled
            .map(|m| m.into_iter().map(|(k, v)| (k, vec![v])).collect());
        EventPageDoc {
            descriptor: self.descriptor,
            seq_num: vec![self.seq_num],
            time: vec![self.time],
            data,
            timestamps,
            filled,
        }
    }
}

/// External data-location descriptor. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDoc {
    /// Opaque resource identifier.
    pub uid: String,
    /// Kind tag naming the handler able to read this resource.
    pub spec: String,
    /// Mount-point-like root of the resource location.
    #[serde(default)]
    pub root: String,
    /// Location below `root`.
    #[serde(default)]
    pub resource_path: String,
    /// Handler parameters.
    #[serde(default)]
    pub resource_kwargs: serde_json::Map<String, serde_json::Value>,
    /// Owning run.
    #[serde(default)]
    pub run_uid: String,
}

impl ResourceDoc {
    /// Create a resource with the given identity and kind tag.
    pub fn new(uid: &str, spec: &str) -> Self {
        Self {
            uid: uid.to_string(),
            spec: spec.to_string(),
            root: String::new(),
            resource_path: String::new(),
            resource_kwargs: serde_json::Map::new(),
            run_uid: String::new(),
        }
    }
}

/// A batch of pointer records into one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatumPageDoc {
    /// Owning resource uid.
    pub resource: String,
    /// Composite datum ids, conventionally `<resource_uid>/<index>`.
    pub datum_id: Vec<String>,
    /// Per-datum handler parameters.
    #[serde(default)]
    pub datum_kwargs: HashMap<String, Vec<serde_json::Value>>,
}

impl DatumPageDoc {
    /// Create a datum page referencing `resource`.
    pub fn new(resource: &str, datum_id: Vec<String>) -> Self {
        Self {
            resource: resource.to_string(),
            datum_id,
            datum_kwargs: HashMap::new(),
        }
    }
}

/// Run-stop document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDoc {
    /// Stop document uid.
    pub uid: String,
    /// Owning run.
    pub run_uid: String,
    /// Wall-clock stop time.
    pub time: f64,
    /// "success", "abort" or "fail".
    pub exit_status: String,
    /// Total events emitted during the run.
    #[serde(default)]
    pub num_events: u64,
}

impl StopDoc {
    /// A successful stop for `run_uid`.
    pub fn success(uid: &str, run_uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            run_uid: run_uid.to_string(),
            time: 0.0,
            exit_status: "success".to_string(),
            num_events: 0,
        }
    }
}

/// The closed set of document kinds, tagged for wire compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    /// Run start.
    Start(StartDoc),
    /// Stream schema.
    Descriptor(DescriptorDoc),
    /// Single measurement (normalized to a one-row page before dispatch).
    Event(EventDoc),
    /// Batched measurements.
    EventPage(EventPageDoc),
    /// External data location.
    Resource(ResourceDoc),
    /// Pointers into a resource.
    DatumPage(DatumPageDoc),
    /// Run stop.
    Stop(StopDoc),
}

impl Document {
    /// Wire name of the document kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Start(_) => "start",
            Document::Descriptor(_) => "descriptor",
            Document::Event(_) => "event",
            Document::EventPage(_) => "event_page",
            Document::Resource(_) => "resource",
            Document::DatumPage(_) => "datum_page",
            Document::Stop(_) => "stop",
        }
    }
}
