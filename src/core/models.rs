use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of the job attributes used as the manual-activation mailbox.
pub const ENDPOINT_ACTIVATION_REQUIRED: &str = "ENDPOINT_ACTIVATION_REQUIRED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivationStatus {
    Active,
    AutoActivatable,
    NeedsManual,
}

#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    /// Identifier as given by the operator (after bookmark resolution).
    pub id: String,
    /// Identifier the service uses internally; feeds the web activation URL.
    pub internal_id: String,
    pub display_name: Option<String>,
    pub status: ActivationStatus,
    pub expires_in: Option<Duration>,
    /// Full document returned by the service, kept for `info`.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl Endpoint {
    pub fn is_active(&self) -> bool {
        self.status == ActivationStatus::Active
    }
}

/// Ordered from least to most strict; a stricter level implies the looser ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SyncLevel {
    Exists,
    Size,
    Mtime,
    #[default]
    Checksum,
}

impl SyncLevel {
    /// Numeric level understood by the transfer API.
    pub fn api_level(self) -> u8 {
        match self {
            Self::Exists => 0,
            Self::Size => 1,
            Self::Mtime => 2,
            Self::Checksum => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferItem {
    pub source_path: String,
    pub destination_path: String,
    pub recursive: bool,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source_endpoint: String,
    pub destination_endpoint: String,
    pub items: Vec<TransferItem>,
    pub label: Option<String>,
    pub sync_level: SyncLevel,
    pub preserve_timestamps: bool,
    pub verify_checksums: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
}

impl TaskState {
    pub fn from_api(status: &str) -> Self {
        match status {
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "INACTIVE" => Self::TimedOut,
            _ => Self::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    pub label: Option<String>,
    /// Display names of the endpoints, when the service reports them.
    pub source: Option<String>,
    pub destination: Option<String>,
    /// Submission time as reported by the service.
    pub requested_at: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, state: TaskState) -> Self {
        Self {
            id: id.into(),
            state,
            label: None,
            source: None,
            destination: None,
            requested_at: None,
        }
    }
}

/// One entry of a directory listing on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub permissions: Option<String>,
}

impl DirEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            last_modified: None,
            permissions: None,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
            size: 0,
            last_modified: None,
            permissions: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Done,
    NotDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoActivation {
    Activated,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    /// Any answer other than a confirmed cancellation, with the service's code.
    NotCanceled { code: String, message: String },
}

/// Scheduler job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId {
    pub cluster: u64,
    pub proc: u64,
}

impl JobId {
    pub fn new(cluster: u64, proc: u64) -> Self {
        Self { cluster, proc }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.cluster, self.proc)
    }
}

/// Typed value of a job attribute.
///
/// `Undefined` is an explicit value, distinct from the attribute never having
/// been set, although both read back as `Undefined`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    #[default]
    Undefined,
    String(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// Unevaluated expression text, kept verbatim.
    Expression(String),
}

impl AttrValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(r) => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Render as a ClassAd expression suitable for `condor_qedit`.
    pub fn to_classad(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => r.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Expression(e) => e.clone(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Undefined,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::String(s.clone()),
            other => Self::Expression(other.to_string()),
        }
    }
}

/// Scheduler hold/run state, as reported by `JobStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Idle,
    Running,
    Removed,
    Completed,
    Held,
    TransferringOutput,
    Suspended,
    Unknown,
}

impl JobStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Idle,
            2 => Self::Running,
            3 => Self::Removed,
            4 => Self::Completed,
            5 => Self::Held,
            6 => Self::TransferringOutput,
            7 => Self::Suspended,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Idle => 1,
            Self::Running => 2,
            Self::Removed => 3,
            Self::Completed => 4,
            Self::Held => 5,
            Self::TransferringOutput => 6,
            Self::Suspended => 7,
            Self::Unknown => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Removed => "REMOVED",
            Self::Completed => "COMPLETED",
            Self::Held => "HELD",
            Self::TransferringOutput => "TRANSFERRING_OUTPUT",
            Self::Suspended => "SUSPENDED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Snapshot of one scheduler job record.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl JobRecord {
    pub fn new(id: JobId) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("ClusterId".to_string(), AttrValue::Integer(id.cluster as i64));
        attributes.insert("ProcId".to_string(), AttrValue::Integer(id.proc as i64));
        Self { id, attributes }
    }

    /// Value of `key`, `Undefined` when absent.
    pub fn attribute(&self, key: &str) -> &AttrValue {
        static UNDEFINED: AttrValue = AttrValue::Undefined;
        self.attributes.get(key).unwrap_or(&UNDEFINED)
    }

    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.attributes.insert(key.into(), value);
    }

    pub fn status(&self) -> JobStatus {
        self.attribute("JobStatus")
            .as_i64()
            .map(JobStatus::from_code)
            .unwrap_or(JobStatus::Unknown)
    }

    pub fn is_held(&self) -> bool {
        self.status() == JobStatus::Held
    }

    pub fn hold_reason(&self) -> Option<&str> {
        self.attribute("HoldReason").as_str()
    }

    pub fn batch_name(&self) -> Option<&str> {
        self.attribute("JobBatchName").as_str()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        epoch(self.attribute("QDate"))
    }

    pub fn status_changed_at(&self) -> Option<DateTime<Utc>> {
        epoch(self.attribute("EnteredCurrentStatus"))
    }

    /// Manual-activation mailbox entries still pending, as `(key, endpoint)`.
    pub fn pending_activations(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .filter(|(key, _)| activation_index(key).is_some())
            .filter_map(|(key, value)| match value {
                AttrValue::String(endpoint) => Some((key.clone(), endpoint.clone())),
                _ => None,
            })
            .collect()
    }
}

fn epoch(value: &AttrValue) -> Option<DateTime<Utc>> {
    value.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Name of the mailbox attribute with the given index.
pub fn activation_key(index: u32) -> String {
    format!("{ENDPOINT_ACTIVATION_REQUIRED}_{index}")
}

/// Index of a mailbox attribute name, `None` for any other attribute.
pub fn activation_index(key: &str) -> Option<u32> {
    key.strip_prefix(ENDPOINT_ACTIVATION_REQUIRED)?
        .strip_prefix('_')?
        .parse()
        .ok()
}
