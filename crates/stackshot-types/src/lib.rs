use facet::Facet;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    EmptyField(&'static str),
    FrameIndexOutOfOrder { expected: u32, found: u32 },
    MoreFramesThanCaptured { frames: u64, max_frames: u64 },
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "{field} must be non-empty"),
            Self::FrameIndexOutOfOrder { expected, found } => {
                write!(f, "frame index out of order: expected {expected}, found {found}")
            }
            Self::MoreFramesThanCaptured { frames, max_frames } => write!(
                f,
                "record holds {frames} frames but only {max_frames} were captured"
            ),
        }
    }
}

impl Error for InvariantError {}

#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct SignalRecord {
    pub number: i32,
    pub name: Option<String>,
    pub code: i32,
    pub fault_address: Option<u64>,
}

/// One frame of a trace, flattened for storage or transport.
///
/// A resolved frame carries `function` (and usually `file`/`line`); an
/// unresolved one carries `unresolved_reason`. `raw` is always the platform's
/// own description of the address.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub index: u32,
    pub address: u64,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub module: Option<String>,
    pub raw: Option<String>,
    pub unresolved_reason: Option<String>,
}

impl FrameRecord {
    pub fn is_resolved(&self) -> bool {
        self.unresolved_reason.is_none()
    }
}

#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub max_frames: u64,
    pub signal: Option<SignalRecord>,
    pub frames: Vec<FrameRecord>,
}

impl TraceRecord {
    pub fn new(
        max_frames: u64,
        signal: Option<SignalRecord>,
        frames: Vec<FrameRecord>,
    ) -> Result<Self, InvariantError> {
        if frames.len() as u64 > max_frames {
            return Err(InvariantError::MoreFramesThanCaptured {
                frames: frames.len() as u64,
                max_frames,
            });
        }
        for (expected, frame) in frames.iter().enumerate() {
            let expected = expected as u32;
            if frame.index != expected {
                return Err(InvariantError::FrameIndexOutOfOrder {
                    expected,
                    found: frame.index,
                });
            }
            if frame.function.as_deref() == Some("") {
                return Err(InvariantError::EmptyField("function"));
            }
        }
        Ok(Self {
            max_frames,
            signal,
            frames,
        })
    }

    pub fn to_json(&self) -> Result<String, String> {
        facet_json::to_string(self).map_err(|e| format!("encode trace record: {e}"))
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let record: Self = facet_json::from_slice(json.as_bytes())
            .map_err(|e| format!("decode trace record: {e}"))?;
        Self::new(record.max_frames, record.signal, record.frames)
            .map_err(|e| format!("decode trace record: {e}"))
    }
}
