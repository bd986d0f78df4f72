//! Compact identifier stored in a transport task's description.
//!
//! # Design
//! A transport only keeps an opaque string per task. The façade writes
//! `kind`, the correlation id and an optional auxiliary value (download file
//! name or upload file path) into that string, joined by [`SEPARATOR`], so
//! intent can be recovered from a bare task handle, including handles the
//! transport recreated after a process restart.
//!
//! Decoding never fails loudly. Foreign or malformed descriptions simply
//! yield `None`.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Joins the identifier fields. Never occurs in a UUID and is not expected in file names.
pub const SEPARATOR: &str = "###task-separator###";

/// The kind of transport task a resource maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Data,
    Download,
    Upload,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Data => "data",
            TaskKind::Download => "download",
            TaskKind::Upload => "upload",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(TaskKind::Data),
            "download" => Ok(TaskKind::Download),
            "upload" => Ok(TaskKind::Upload),
            _ => Err(()),
        }
    }
}

/// `{kind, correlation id, auxiliary}` recovered from a task description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskIdentifier {
    pub kind: TaskKind,
    pub id: Uuid,
    pub auxiliary: Option<String>,
}

impl TaskIdentifier {
    pub fn new(kind: TaskKind, id: Uuid, auxiliary: Option<String>) -> Self {
        Self { kind, id, auxiliary }
    }

    /// Serialize into a task description.
    pub fn encode(&self) -> String {
        let id = self.id.to_string();
        let mut fields = vec![self.kind.as_str(), id.as_str()];
        if let Some(auxiliary) = &self.auxiliary {
            fields.push(auxiliary.as_str());
        }
        fields.join(SEPARATOR)
    }

    /// Parse a task description.
    ///
    /// Needs at least two fields with a known kind and a valid UUID. A third
    /// field becomes the auxiliary value; when there are more than three the
    /// auxiliary is treated as absent.
    pub fn decode(description: &str) -> Option<Self> {
        let fields: Vec<&str> = description.split(SEPARATOR).collect();
        if fields.len() < 2 {
            return None;
        }
        let kind = fields[0].parse().ok()?;
        let id = Uuid::parse_str(fields[1]).ok()?;
        let auxiliary = match fields.as_slice() {
            [_, _, auxiliary] => Some((*auxiliary).to_string()),
            _ => None,
        };
        Some(Self { kind, id, auxiliary })
    }

    /// `decode` for transports whose description may be unset.
    pub fn from_description(description: Option<&str>) -> Option<Self> {
        description.and_then(Self::decode)
    }
}

impl fmt::Display for TaskIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
