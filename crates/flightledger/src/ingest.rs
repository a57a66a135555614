//! The ingest boundary.
//!
//! A [`TelemetrySource`] yields [`FlightEvent`]s from some transport. The
//! [`Ingestor`] keeps one [`FlightSession`] per plane, records telemetry as
//! it arrives, and archives each flight when it lands or loses signal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchivedFile, Archiver};
use crate::classify::{Classifier, FlightSession, Squawk};
use crate::error::{Error, Result};
use crate::ledger::{Action, LedgerEntry, NO_EVIDENCE, SYSTEM_ACTOR};
use crate::recording::validate_plane_id;

/// One signal from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightEvent {
    /// A telemetry point carrying the current squawk.
    Telemetry {
        /// Reporting plane.
        plane_id: String,
        /// Squawk at the time of the report.
        squawk: Squawk,
        /// The full payload as received.
        payload: Value,
    },
    /// The plane reported a safe landing. Ends the session.
    Landed {
        /// Reporting plane.
        plane_id: String,
    },
    /// The transport lost the plane. Ends the session.
    SignalLost {
        /// Plane that went silent.
        plane_id: String,
    },
}

impl FlightEvent {
    /// Parse one JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed JSON or
    /// [`Error::InvalidEvent`] for a well-formed but unusable event.
    pub fn parse(line: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(line)?)
    }

    /// Interpret a JSON object, tagged by its `type` field.
    ///
    /// A missing `type` means telemetry. A missing `squawk` means 1200; a
    /// numeric squawk is read as its four-digit form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] or [`Error::InvalidSquawk`].
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = &value else {
            return Err(Error::InvalidEvent("event is not a JSON object".to_string()));
        };

        let plane_id = match map.get("plane_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(Error::InvalidEvent("missing plane_id".to_string())),
        };

        let kind = match map.get("type") {
            None => "telemetry",
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => {
                return Err(Error::InvalidEvent(format!("bad event type {other}")));
            }
        };

        match kind {
            "telemetry" => {
                let squawk = match map.get("squawk") {
                    None | Some(Value::Null) => Squawk::VFR,
                    Some(Value::String(code)) => Squawk::parse(code)?,
                    Some(Value::Number(n)) => match n.as_u64() {
                        Some(code) => Squawk::parse(&format!("{code:04}"))?,
                        None => return Err(Error::InvalidSquawk(n.to_string())),
                    },
                    Some(other) => return Err(Error::InvalidSquawk(other.to_string())),
                };
                Ok(Self::Telemetry {
                    plane_id,
                    squawk,
                    payload: value,
                })
            }
            "landed" => Ok(Self::Landed { plane_id }),
            "signal_lost" => Ok(Self::SignalLost { plane_id }),
            other => Err(Error::InvalidEvent(format!("unknown event type {other:?}"))),
        }
    }

    /// The plane the event concerns.
    #[must_use]
    pub fn plane_id(&self) -> &str {
        match self {
            Self::Telemetry { plane_id, .. }
            | Self::Landed { plane_id }
            | Self::SignalLost { plane_id } => plane_id,
        }
    }
}

/// A stream of flight events.
#[async_trait]
pub trait TelemetrySource: Send {
    /// The next event, or `None` once the source is exhausted.
    ///
    /// An `Err` item reports one bad event; the source may still yield more.
    async fn next_event(&mut self) -> Option<Result<FlightEvent>>;
}

/// Events as JSON lines from any buffered reader: stdin, a file replay, a
/// socket.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    /// Read events from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R> fmt::Debug for JsonLinesSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSource")
            .field("line_no", &self.line_no)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TelemetrySource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> Option<Result<FlightEvent>> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    self.line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(FlightEvent::parse(&line).map_err(|e| {
                        debug!("Bad event on line {}: {e}", self.line_no);
                        e
                    }));
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Events pushed by an in-process transport over a channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<FlightEvent>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<FlightEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl TelemetrySource for ChannelSource {
    async fn next_event(&mut self) -> Option<Result<FlightEvent>> {
        self.rx.recv().await.map(Ok)
    }
}

/// What an ingest run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    /// Events read from the source.
    pub events: usize,
    /// Events that could not be applied.
    pub rejected: usize,
    /// Flights filed during the run.
    pub archived: Vec<ArchivedFile>,
}

/// Drives flight sessions from a stream of events.
#[derive(Debug)]
pub struct Ingestor {
    archiver: Arc<Archiver>,
    classifier: Classifier,
    sessions: HashMap<String, FlightSession>,
}

impl Ingestor {
    /// Create an ingestor filing flights through `archiver`.
    #[must_use]
    pub fn new(archiver: Arc<Archiver>, classifier: Classifier) -> Self {
        Self {
            archiver,
            classifier,
            sessions: HashMap::new(),
        }
    }

    /// Number of flights currently in the air.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Record `SYSTEM_STARTUP`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerWrite`] if it could not be recorded.
    pub fn start(&self) -> Result<LedgerEntry> {
        let entry = self.archiver.ledger().append(
            Action::SystemStartup,
            NO_EVIDENCE,
            SYSTEM_ACTOR,
            NO_EVIDENCE,
            Some("Server Booted"),
        )?;
        info!("Ingest started");
        Ok(entry)
    }

    /// Apply one event. Returns the archived file when the event ended a
    /// flight that had a recording.
    ///
    /// # Errors
    ///
    /// Returns any error from recording or archiving. On an archiving error
    /// the session is dropped and its recording stays in the live cache.
    pub fn handle(&mut self, event: FlightEvent) -> Result<Option<ArchivedFile>> {
        validate_plane_id(event.plane_id())?;

        match event {
            FlightEvent::Telemetry {
                plane_id,
                squawk,
                payload,
            } => {
                self.archiver.record_telemetry(&plane_id, &payload)?;
                let classifier = &self.classifier;
                self.sessions
                    .entry(plane_id)
                    .or_insert_with_key(|id| classifier.session(id.clone()))
                    .on_squawk(squawk);
                Ok(None)
            }
            FlightEvent::Landed { plane_id } => {
                let Some(mut session) = self.sessions.remove(&plane_id) else {
                    warn!("Landing reported for unknown flight {plane_id}");
                    return Ok(None);
                };
                session.on_landed();
                self.archiver.archive(&mut session)
            }
            FlightEvent::SignalLost { plane_id } => {
                let Some(mut session) = self.sessions.remove(&plane_id) else {
                    warn!("Signal loss reported for unknown flight {plane_id}");
                    return Ok(None);
                };
                session.on_disconnect();
                self.archiver.archive(&mut session)
            }
        }
    }

    /// Archive every flight still in the air as having lost signal.
    ///
    /// # Errors
    ///
    /// Stops at the first [`Error::LedgerWrite`]. Other per-flight errors are
    /// logged and the flight is skipped.
    pub fn shutdown(&mut self) -> Result<Vec<ArchivedFile>> {
        let mut archived = Vec::new();
        let mut plane_ids: Vec<String> = self.sessions.keys().cloned().collect();
        plane_ids.sort_unstable();

        for plane_id in plane_ids {
            let Some(mut session) = self.sessions.remove(&plane_id) else {
                continue;
            };
            session.on_disconnect();
            match self.archiver.archive(&mut session) {
                Ok(Some(file)) => archived.push(file),
                Ok(None) => {}
                Err(e) if e.is_ledger_write() => return Err(e),
                Err(e) => error!("Could not archive {plane_id} at shutdown: {e}"),
            }
        }
        Ok(archived)
    }

    /// Consume `source` to exhaustion, then archive open flights.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerWrite`] as soon as the ledger stops accepting
    /// entries. Bad events are counted as rejected and skipped.
    pub async fn run<S>(&mut self, source: &mut S) -> Result<IngestSummary>
    where
        S: TelemetrySource + ?Sized,
    {
        self.start()?;
        let mut summary = IngestSummary::default();

        while let Some(next) = source.next_event().await {
            summary.events += 1;
            match next.and_then(|event| self.handle(event)) {
                Ok(Some(file)) => summary.archived.push(file),
                Ok(None) => {}
                Err(e) if e.is_ledger_write() => {
                    error!("Ledger unavailable, stopping ingest: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!("Rejected event: {e}");
                    summary.rejected += 1;
                }
            }
        }

        let open = self.active_sessions();
        if open > 0 {
            info!("Source exhausted with {open} flights open, archiving as signal lost");
        }
        summary.archived.extend(self.shutdown()?);
        info!(
            "Ingest finished: {} events, {} rejected, {} archived",
            summary.events,
            summary.rejected,
            summary.archived.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveLayout;
    use crate::classify::Category;
    use crate::ledger::{ChainWriter, LedgerStore, MemoryStore};
    use crate::logging::init_test_logging;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        ingestor: Ingestor,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let ledger = ChainWriter::open(Box::new(Arc::clone(&store))).unwrap();
        let archiver = Archiver::new(ArchiveLayout::new(dir.path()), Arc::new(ledger)).unwrap();
        Fixture {
            _dir: dir,
            ingestor: Ingestor::new(Arc::new(archiver), Classifier::default()),
            store,
        }
    }

    fn categories(summary: &IngestSummary) -> Vec<(String, Category)> {
        let mut out: Vec<_> = summary
            .archived
            .iter()
            .map(|f| {
                let stem = f.reference.filename.trim_end_matches(".jsonl");
                let plane = stem.rsplit('_').next().unwrap_or_default().to_string();
                (plane, f.reference.category)
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_parse_events() {
        let event = FlightEvent::parse(r#"{"type":"telemetry","plane_id":"N1","squawk":"7700","alt":10}"#)
            .unwrap();
        let FlightEvent::Telemetry {
            plane_id,
            squawk,
            payload,
        } = event
        else {
            panic!("expected telemetry");
        };
        assert_eq!(plane_id, "N1");
        assert_eq!(squawk, Squawk::EMERGENCY);
        assert_eq!(payload["alt"], 10);

        assert_eq!(
            FlightEvent::parse(r#"{"type":"landed","plane_id":"N1"}"#).unwrap(),
            FlightEvent::Landed {
                plane_id: "N1".to_string()
            }
        );
        assert_eq!(
            FlightEvent::parse(r#"{"type":"signal_lost","plane_id":"N1"}"#).unwrap(),
            FlightEvent::SignalLost {
                plane_id: "N1".to_string()
            }
        );
    }

    #[test]
    fn test_parse_squawk_defaults_and_numbers() {
        let event = FlightEvent::parse(r#"{"plane_id":"N1","alt":1}"#).unwrap();
        assert!(matches!(event, FlightEvent::Telemetry { squawk, .. } if squawk == Squawk::VFR));

        let event = FlightEvent::parse(r#"{"plane_id":"N1","squawk":7500}"#).unwrap();
        assert!(matches!(event, FlightEvent::Telemetry { squawk, .. } if squawk == Squawk::HIJACK));

        let event = FlightEvent::parse(r#"{"plane_id":"N1","squawk":33}"#).unwrap();
        assert!(matches!(event, FlightEvent::Telemetry { squawk, .. } if squawk.to_string() == "0033"));
    }

    #[test]
    fn test_parse_rejects_bad_events() {
        for line in [
            r#"[1,2]"#,
            r#"{"type":"telemetry"}"#,
            r#"{"type":"teleport","plane_id":"N1"}"#,
            r#"{"plane_id":"N1","squawk":"9999"}"#,
            r#"{"plane_id":"N1","squawk":true}"#,
            "not json",
        ] {
            assert!(FlightEvent::parse(line).is_err(), "{line} should be rejected");
        }
    }

    #[test]
    fn test_handle_rejects_unsafe_plane_id() {
        let mut f = fixture();
        let event = FlightEvent::parse(r#"{"plane_id":"../../etc","squawk":"1200"}"#).unwrap();
        assert!(matches!(
            f.ingestor.handle(event),
            Err(Error::InvalidPlaneId(_))
        ));
        assert!(f.store.records().unwrap().is_empty());
    }

    #[test]
    fn test_landing_unknown_flight_is_ignored() {
        let mut f = fixture();
        let event = FlightEvent::Landed {
            plane_id: "N0".to_string(),
        };
        assert!(f.ingestor.handle(event).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_classifies_and_archives() {
        let mut f = fixture();
        let input = [
            r#"{"type":"telemetry","plane_id":"EMG","squawk":"1200"}"#,
            r#"{"type":"telemetry","plane_id":"STD","squawk":"1200"}"#,
            r#"{"type":"telemetry","plane_id":"EMG","squawk":"7700"}"#,
            r#"{"type":"telemetry","plane_id":"CRS","squawk":"7700"}"#,
            "",
            r#"{"type":"telemetry","plane_id":"EMG","squawk":"1200"}"#,
            r#"{"type":"landed","plane_id":"EMG"}"#,
            r#"{"type":"signal_lost","plane_id":"CRS"}"#,
            r#"{"type":"landed","plane_id":"STD"}"#,
            r#"{"bogus":true}"#,
        ]
        .join("\n");

        let mut source = JsonLinesSource::new(input.as_bytes());
        let summary = f.ingestor.run(&mut source).await.unwrap();

        assert_eq!(summary.events, 9);
        assert_eq!(summary.rejected, 1);
        assert_eq!(
            categories(&summary),
            vec![
                ("CRS".to_string(), Category::Crash),
                ("EMG".to_string(), Category::Emergency7700),
                ("STD".to_string(), Category::Standard),
            ]
        );
        assert_eq!(f.ingestor.active_sessions(), 0);

        let first = LedgerEntry::from_record(&f.store.records().unwrap()[0]).unwrap();
        assert_eq!(first.action, Action::SystemStartup);
        assert_eq!(first.details.as_deref(), Some("Server Booted"));
        assert!(f.ingestor.archiver.ledger().audit().is_ok());
    }

    #[tokio::test]
    async fn test_run_archives_open_flights_as_lost() {
        let mut f = fixture();
        let (tx, mut source) = ChannelSource::new(8);

        tx.send(FlightEvent::parse(r#"{"plane_id":"OPEN1","squawk":"7600"}"#).unwrap())
            .await
            .unwrap();
        tx.send(FlightEvent::parse(r#"{"plane_id":"OPEN2","squawk":"1200"}"#).unwrap())
            .await
            .unwrap();
        drop(tx);

        let summary = f.ingestor.run(&mut source).await.unwrap();
        assert_eq!(summary.events, 2);
        let got: Vec<Category> = summary.archived.iter().map(|a| a.reference.category).collect();
        assert_eq!(got, vec![Category::Crash, Category::Standard]);
    }

    #[tokio::test]
    async fn test_run_stops_on_ledger_failure() {
        let mut f = fixture();
        let (tx, mut source) = ChannelSource::new(8);
        tx.send(FlightEvent::parse(r#"{"plane_id":"N1"}"#).unwrap())
            .await
            .unwrap();
        drop(tx);

        f.store.fail_writes(true);
        let err = f.ingestor.run(&mut source).await.unwrap_err();
        assert!(err.is_ledger_write());
    }

    #[tokio::test]
    async fn test_dyn_source() {
        let mut f = fixture();
        let input = r#"{"plane_id":"D1"}"#.to_string() + "\n" + r#"{"type":"landed","plane_id":"D1"}"#;
        let mut source: Box<dyn TelemetrySource> =
            Box::new(JsonLinesSource::new(std::io::Cursor::new(input.into_bytes())));
        let summary = f.ingestor.run(source.as_mut()).await.unwrap();
        assert_eq!(summary.archived.len(), 1);
        assert_eq!(summary.archived[0].entries.len(), 2);
    }
}
