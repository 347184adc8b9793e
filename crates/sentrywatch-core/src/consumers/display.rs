//! Terminal display consumer: redraws a status table in place, one row per
//! `{hostname, service}` pair. Grounded on `consumers/gui/gui.go`; uses
//! `crossterm` in place of Go's `goterm` for cursor control and color.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use crossterm::cursor::MoveTo;
use crossterm::style::{Color, PrintStyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;
use std::io::Write as _;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::consumer::{ClassifiedResult, Consumer, QueueRuntime, DEFAULT_QUEUE_CAPACITY};
use crate::error::ConsumerError;
use crate::severity::Severity;

fn row_key(result: &ClassifiedResult) -> String {
    format!("{}#{}", result.hostname, result.checker.service_name())
}

fn severity_label(severity: Severity) -> crossterm::style::StyledContent<&'static str> {
    match severity {
        Severity::Ok => "  OK  ".on(Color::Green).with(Color::Black),
        Severity::Warning => " WARN ".on(Color::Yellow).with(Color::Black),
        Severity::Critical => " CRIT ".on(Color::Red).with(Color::White),
        Severity::Unknown => " UNKN ".on(Color::Grey).with(Color::Black),
    }
}

fn draw(out: &mut impl std::io::Write, rows: &BTreeMap<String, ClassifiedResult>) -> std::io::Result<()> {
    out.queue(Clear(ClearType::All))?;
    out.queue(MoveTo(0, 0))?;

    for (line, result) in rows.values().enumerate() {
        out.queue(MoveTo(0, line as u16))?;
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(
            out,
            "{:<20} {:<30} {:<30} ",
            now, result.hostname, result.checker.service_name()
        )?;
        out.queue(PrintStyledContent(severity_label(result.severity)))?;
        write!(out, " {}", result.message)?;
    }

    out.flush()
}

pub struct DisplayConsumer {
    runtime: QueueRuntime<ClassifiedResult>,
}

impl DisplayConsumer {
    pub fn new() -> Self {
        let rows: Arc<AsyncMutex<BTreeMap<String, ClassifiedResult>>> = Arc::new(AsyncMutex::new(BTreeMap::new()));

        let runtime = QueueRuntime::spawn(
            DEFAULT_QUEUE_CAPACITY,
            1,
            move |result: ClassifiedResult, error_tx: tokio::sync::mpsc::Sender<ConsumerError>, _cancel: CancellationToken| {
                let rows = rows.clone();
                async move {
                    let mut rows = rows.lock().await;
                    rows.insert(row_key(&result), result);
                    if let Err(err) = draw(&mut std::io::stdout(), &rows) {
                        warn!("consumer: display redraw failed: {err}");
                        let _ = error_tx.send(ConsumerError::Delivery(err.to_string())).await;
                    }
                }
            },
        );

        Self { runtime }
    }
}

impl Default for DisplayConsumer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Consumer for DisplayConsumer {
    fn name(&self) -> &str {
        "display"
    }

    async fn submit(&self, result: ClassifiedResult, deadline: Duration) -> Result<(), ConsumerError> {
        self.runtime.submit(result, deadline).await
    }

    async fn next_error(&self) -> Option<ConsumerError> {
        self.runtime.next_error().await
    }

    async fn shutdown(&self) {
        self.runtime.shutdown().await;
    }
}
