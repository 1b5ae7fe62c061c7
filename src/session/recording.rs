use super::*;
use std::time::{SystemTime, UNIX_EPOCH};

/// Recording granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum RecordLevel {
    /// Disable recording.
    Off,
    /// Record requests and outcomes without reply bodies.
    RequestsOnly,
    /// Record requests and full reply documents.
    #[default]
    Full,
}

/// How one recorded exchange ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExchangeOutcome {
    Reply {
        #[serde(default)]
        xml: Option<String>,
    },
    Error {
        message: String,
    },
}

/// A single recorded RPC round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RpcExchange {
    pub ts_ms: u128,
    pub hostname: String,
    pub request: RpcRequest,
    pub outcome: ExchangeOutcome,
}

/// Options for normalizing JSONL recordings into stable fixtures.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Keep exchanges that ended in an error.
    pub keep_errors: bool,
    /// Zero out timestamps after sorting.
    pub strip_timestamps: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            keep_errors: false,
            strip_timestamps: true,
        }
    }
}

/// In-memory exchange recorder.
#[derive(Debug, Clone)]
pub struct RpcRecorder {
    level: RecordLevel,
    entries: Arc<Mutex<Vec<RpcExchange>>>,
}

impl RpcRecorder {
    pub fn new(level: RecordLevel) -> Self {
        Self {
            level,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn level(&self) -> RecordLevel {
        self.level
    }

    /// Records the outcome of `request`, honoring the recording level.
    pub fn record(
        &self,
        hostname: &str,
        request: &RpcRequest,
        result: &Result<Document, RpcError>,
    ) -> Result<(), RpcError> {
        let outcome = match (self.level, result) {
            (RecordLevel::Off, _) => return Ok(()),
            (_, Err(err)) => ExchangeOutcome::Error {
                message: err.to_string(),
            },
            (RecordLevel::RequestsOnly, Ok(_)) => ExchangeOutcome::Reply { xml: None },
            (RecordLevel::Full, Ok(doc)) => ExchangeOutcome::Reply {
                xml: Some(doc.to_xml()?),
            },
        };
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| RpcError::Internal(format!("record lock error: {e}")))?;
        guard.push(RpcExchange {
            ts_ms: now_ms(),
            hostname: hostname.to_string(),
            request: request.clone(),
            outcome,
        });
        Ok(())
    }

    /// Snapshot all records.
    pub fn entries(&self) -> Result<Vec<RpcExchange>, RpcError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| RpcError::Internal(format!("record lock error: {e}")))?;
        Ok(guard.clone())
    }

    pub fn clear(&self) -> Result<(), RpcError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| RpcError::Internal(format!("record lock error: {e}")))?;
        guard.clear();
        Ok(())
    }

    /// Export records as JSONL.
    pub fn to_jsonl(&self) -> Result<String, RpcError> {
        let entries = self.entries()?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry)
                .map_err(|e| RpcError::Internal(format!("record encode error: {e}")))?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Restore a recorder from JSONL lines.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, RpcError> {
        let mut parsed = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: RpcExchange = serde_json::from_str(line)
                .map_err(|e| RpcError::Internal(format!("record decode error: {e}")))?;
            parsed.push(entry);
        }
        Ok(Self {
            level: RecordLevel::Full,
            entries: Arc::new(Mutex::new(parsed)),
        })
    }

    /// Normalize a JSONL recording into a stable fixture.
    ///
    /// Exchanges are ordered by timestamp (ties keep file order) before
    /// filtering.
    pub fn normalize_jsonl(jsonl: &str, options: NormalizeOptions) -> Result<String, RpcError> {
        let mut indexed = Self::from_jsonl(jsonl)?
            .entries()?
            .into_iter()
            .enumerate()
            .collect::<Vec<(usize, RpcExchange)>>();
        indexed
            .sort_by(|(idx_a, a), (idx_b, b)| a.ts_ms.cmp(&b.ts_ms).then_with(|| idx_a.cmp(idx_b)));

        let filtered = indexed
            .into_iter()
            .filter_map(|(_, mut entry)| {
                if !options.keep_errors && matches!(entry.outcome, ExchangeOutcome::Error { .. }) {
                    return None;
                }
                if options.strip_timestamps {
                    entry.ts_ms = 0;
                }
                Some(entry)
            })
            .collect::<Vec<_>>();

        let normalized = RpcRecorder {
            level: RecordLevel::Full,
            entries: Arc::new(Mutex::new(filtered)),
        };
        normalized.to_jsonl()
    }
}

impl Default for RpcRecorder {
    fn default() -> Self {
        Self::new(RecordLevel::Full)
    }
}

/// Session wrapper that records every exchange of the inner session.
///
/// Results pass through untouched; a failure to record is logged and
/// otherwise ignored.
#[derive(Debug)]
pub struct RecordingSession<S> {
    inner: S,
    recorder: RpcRecorder,
}

impl<S: Session> RecordingSession<S> {
    pub fn new(inner: S, recorder: RpcRecorder) -> Self {
        Self { inner, recorder }
    }

    pub fn recorder(&self) -> &RpcRecorder {
        &self.recorder
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Session> Session for RecordingSession<S> {
    fn hostname(&self) -> &str {
        self.inner.hostname()
    }

    fn execute(&self, request: &RpcRequest) -> Result<Document, RpcError> {
        let result = self.inner.execute(request);
        if let Err(e) = self.recorder.record(self.inner.hostname(), request, &result) {
            debug!("{} failed to record {}: {}", self.hostname(), request.tag(), e);
        }
        result
    }
}

/// Offline session replaying recorded exchanges in order.
///
/// Each request consumes the next exchange with the same RPC name (dashes
/// and underscores are interchangeable) and equal arguments. Recorded
/// errors are replayed as transport errors.
#[derive(Debug)]
pub struct RpcReplayer {
    hostname: String,
    entries: Vec<RpcExchange>,
    cursor: Mutex<usize>,
}

impl RpcReplayer {
    /// Build a replayer from a recorder snapshot.
    pub fn from_recorder(recorder: &RpcRecorder) -> Result<Self, RpcError> {
        let entries = recorder.entries()?;
        let hostname = entries
            .first()
            .map(|e| e.hostname.clone())
            .unwrap_or_default();
        Ok(Self {
            hostname,
            entries,
            cursor: Mutex::new(0),
        })
    }

    pub fn from_jsonl(jsonl: &str) -> Result<Self, RpcError> {
        Self::from_recorder(&RpcRecorder::from_jsonl(jsonl)?)
    }

    /// Exchanges not yet consumed.
    pub fn remaining(&self) -> Result<usize, RpcError> {
        let cursor = self
            .cursor
            .lock()
            .map_err(|e| RpcError::Internal(format!("replay lock error: {e}")))?;
        Ok(self.entries.len().saturating_sub(*cursor))
    }
}

impl Session for RpcReplayer {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn execute(&self, request: &RpcRequest) -> Result<Document, RpcError> {
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|e| RpcError::Internal(format!("replay lock error: {e}")))?;

        while *cursor < self.entries.len() {
            let entry = &self.entries[*cursor];
            *cursor += 1;
            if entry.request.tag() != request.tag() || entry.request.args != request.args {
                continue;
            }
            debug!("{} replaying {}", self.hostname, request.tag());
            return match &entry.outcome {
                ExchangeOutcome::Reply { xml: Some(xml) } => Ok(Document::parse(xml)?),
                ExchangeOutcome::Reply { xml: None } => Err(RpcError::ReplayMismatch(format!(
                    "exchange for '{}' was recorded without a reply body",
                    request.tag()
                ))),
                ExchangeOutcome::Error { message } => Err(RpcError::Transport(message.clone())),
            };
        }

        Err(RpcError::ReplayMismatch(format!(
            "no replayable exchange found for rpc '{}'",
            request.tag()
        )))
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOISY_FIXTURE: &str = r#"{"ts_ms":9,"hostname":"vsrx","request":{"rpc":"get-config","args":{}},"outcome":{"kind":"error","message":"timeout"}}
{"ts_ms":2,"hostname":"vsrx","request":{"rpc":"get-software-information","args":{}},"outcome":{"kind":"reply","xml":"<software-information/>"}}
{"ts_ms":1,"hostname":"vsrx","request":{"rpc":"get-interface-information","args":{"terse":true}},"outcome":{"kind":"reply","xml":"<interface-information/>"}}
"#;

    fn request(rpc: &str) -> RpcRequest {
        RpcRequest::new(rpc, RpcArgs::new())
    }

    #[test]
    fn recording_session_passes_results_through() {
        let inner = StaticSession::new("vsrx").with_reply("get-config", "<configuration/>");
        let session = RecordingSession::new(inner, RpcRecorder::default());

        let doc = session.execute(&request("get-config")).expect("reply");
        assert_eq!(doc.root().name(), "configuration");
        let err = session
            .execute(&request("get-route-information"))
            .expect_err("no reply configured");
        assert!(matches!(err, RpcError::Rpc { .. }));

        let entries = session.recorder().entries().expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].hostname, "vsrx");
        assert_eq!(
            entries[0].outcome,
            ExchangeOutcome::Reply {
                xml: Some("<configuration/>".to_string())
            }
        );
        assert!(matches!(entries[1].outcome, ExchangeOutcome::Error { .. }));
    }

    #[test]
    fn requests_only_level_drops_bodies() {
        let inner = StaticSession::new("vsrx").with_reply("get-config", "<configuration/>");
        let session = RecordingSession::new(inner, RpcRecorder::new(RecordLevel::RequestsOnly));
        session.execute(&request("get-config")).expect("reply");

        let entries = session.recorder().entries().expect("entries");
        assert_eq!(entries[0].outcome, ExchangeOutcome::Reply { xml: None });

        let replayer = RpcReplayer::from_recorder(session.recorder()).expect("replayer");
        let err = replayer
            .execute(&request("get-config"))
            .expect_err("body missing");
        assert!(matches!(err, RpcError::ReplayMismatch(_)));
    }

    #[test]
    fn off_level_records_nothing() {
        let recorder = RpcRecorder::new(RecordLevel::Off);
        recorder
            .record("vsrx", &request("get-config"), &Err(RpcError::Transport("x".into())))
            .expect("record");
        assert!(recorder.entries().expect("entries").is_empty());
    }

    #[test]
    fn jsonl_roundtrip_and_clear() {
        let recorder = RpcRecorder::default();
        let doc = Document::parse("<configuration/>").expect("parse");
        recorder
            .record("vsrx", &request("get-config"), &Ok(doc))
            .expect("record");

        let restored = RpcRecorder::from_jsonl(&recorder.to_jsonl().expect("encode"))
            .expect("decode");
        assert_eq!(
            restored.entries().expect("entries"),
            recorder.entries().expect("entries")
        );

        recorder.clear().expect("clear");
        assert!(recorder.entries().expect("entries").is_empty());
    }

    #[test]
    fn replayer_matches_name_and_args_in_order() {
        let replayer = RpcReplayer::from_jsonl(NOISY_FIXTURE).expect("load");
        assert_eq!(replayer.hostname(), "vsrx");

        // args differ from the recording
        let err = replayer
            .execute(&request("get_interface_information"))
            .expect_err("args mismatch");
        assert!(matches!(err, RpcError::ReplayMismatch(_)));
    }

    #[test]
    fn replayer_replays_recorded_errors() {
        let replayer = RpcReplayer::from_jsonl(NOISY_FIXTURE).expect("load");
        let err = replayer.execute(&request("get-config")).expect_err("recorded error");
        assert!(matches!(err, RpcError::Transport(ref m) if m == "timeout"));

        let doc = replayer
            .execute(&request("get_software_information"))
            .expect("recorded reply");
        assert_eq!(doc.root().name(), "software-information");
        assert_eq!(replayer.remaining().expect("remaining"), 1);
    }

    #[test]
    fn normalize_sorts_and_filters_errors() {
        let normalized =
            RpcRecorder::normalize_jsonl(NOISY_FIXTURE, NormalizeOptions::default())
                .expect("normalize");
        let entries = RpcRecorder::from_jsonl(&normalized)
            .expect("decode")
            .entries()
            .expect("entries");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request.rpc, "get-interface-information");
        assert_eq!(entries[1].request.rpc, "get-software-information");
        assert!(entries.iter().all(|e| e.ts_ms == 0));
    }

    #[test]
    fn normalize_can_keep_errors_and_timestamps() {
        let options = NormalizeOptions {
            keep_errors: true,
            strip_timestamps: false,
        };
        let normalized = RpcRecorder::normalize_jsonl(NOISY_FIXTURE, options).expect("normalize");
        let entries = RpcRecorder::from_jsonl(&normalized)
            .expect("decode")
            .entries()
            .expect("entries");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].ts_ms, 9);
    }
}
