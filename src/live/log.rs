use std::pin::Pin;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use futures::Stream;
use tokio::sync::watch;

use crate::models::{LogLine, LogStream};

/// Observable length of a log plus whether it has been frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogProgress {
    pub len: usize,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Line(LogLine),
    /// The job reached a terminal state; no further lines will follow.
    End,
    /// Subscriber fell too far behind the live log and was dropped.
    Lagged { backlog: usize },
}

pub type LogEventStream = Pin<Box<dyn Stream<Item = LogEvent> + Send>>;

/// A job's merged log. Appends come from the job's runner only; readers
/// never block it.
pub struct JobLog {
    lines: RwLock<Vec<LogLine>>,
    progress: watch::Sender<LogProgress>,
}

impl Default for JobLog {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLog {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(LogProgress::default());
        Self { lines: RwLock::new(Vec::new()), progress }
    }

    /// Rebuild a frozen log from persisted lines.
    pub fn from_lines(lines: Vec<LogLine>) -> Self {
        let len = lines.len();
        let (progress, _) = watch::channel(LogProgress { len, closed: true });
        Self { lines: RwLock::new(lines), progress }
    }

    /// Append one line and wake subscribers. Returns `None` once closed.
    pub fn append(&self, tool: &str, stream: LogStream, text: impl Into<String>) -> Option<LogLine> {
        let mut lines = self.lines.write().unwrap_or_else(|e| e.into_inner());
        if self.progress.borrow().closed {
            return None;
        }
        let line = LogLine {
            seq: lines.len() as u64,
            ts: Utc::now(),
            tool: tool.to_string(),
            stream,
            text: text.into(),
        };
        lines.push(line.clone());
        let len = lines.len();
        self.progress.send_replace(LogProgress { len, closed: false });
        Some(line)
    }

    /// Freeze the log. Subscribers drain what is left and then end.
    pub fn close(&self) {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        self.progress.send_replace(LogProgress { len: lines.len(), closed: true });
    }

    pub fn is_closed(&self) -> bool {
        self.progress.borrow().closed
    }

    pub fn len(&self) -> usize {
        self.progress.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Lines in `[from, to)`, clamped to what exists.
    pub fn range(&self, from: usize, to: usize) -> Vec<LogLine> {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        let to = to.min(lines.len());
        if from >= to {
            return Vec::new();
        }
        lines[from..to].to_vec()
    }

    /// Replay every line so far, then follow new ones until the log closes.
    ///
    /// Lines that already existed at subscription time never count towards
    /// `lag_limit`; only the live backlog does. A limit of 0 disables it.
    pub fn subscribe(self: &Arc<Self>, lag_limit: usize) -> LogEventStream {
        let log = Arc::clone(self);
        let mut progress = self.progress.subscribe();
        let live_from = self.len();

        Box::pin(async_stream::stream! {
            let mut cursor = 0usize;
            loop {
                let current = *progress.borrow_and_update();
                if cursor < current.len {
                    let backlog = current.len.saturating_sub(cursor.max(live_from));
                    if lag_limit > 0 && backlog > lag_limit {
                        yield LogEvent::Lagged { backlog };
                        return;
                    }
                    for line in log.range(cursor, current.len) {
                        yield LogEvent::Line(line);
                    }
                    cursor = current.len;
                }
                if current.closed {
                    yield LogEvent::End;
                    return;
                }
                if progress.changed().await.is_err() {
                    for line in log.range(cursor, usize::MAX) {
                        yield LogEvent::Line(line);
                    }
                    yield LogEvent::End;
                    return;
                }
            }
        })
    }
}

/// Stream for a job that finished before this process saw it live.
pub fn replay(lines: Vec<LogLine>) -> LogEventStream {
    let events = lines
        .into_iter()
        .map(LogEvent::Line)
        .chain(std::iter::once(LogEvent::End));
    Box::pin(futures::stream::iter(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    async fn collect(stream: LogEventStream) -> Vec<LogEvent> {
        tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
            .await
            .expect("stream should end")
    }

    fn texts(events: &[LogEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                LogEvent::Line(l) => Some(l.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_full_history_and_end() {
        let log = Arc::new(JobLog::new());
        log.append("nmap", LogStream::Stdout, "a");
        log.append("nuclei", LogStream::Stdout, "b");
        log.close();
        assert!(log.append("nmap", LogStream::Stdout, "late").is_none());

        let events = collect(log.subscribe(100)).await;
        assert_eq!(texts(&events), vec!["a", "b"]);
        assert_eq!(events.last(), Some(&LogEvent::End));
    }

    #[tokio::test]
    async fn test_concurrent_subscribers_see_same_order() {
        let log = Arc::new(JobLog::new());
        log.append("lantern", LogStream::System, "start");
        let first = tokio::spawn(collect(log.subscribe(0)));
        let second = tokio::spawn(collect(log.subscribe(0)));

        let producer = Arc::clone(&log);
        tokio::spawn(async move {
            for i in 0..200 {
                let tool = if i % 2 == 0 { "nmap" } else { "nuclei" };
                producer.append(tool, LogStream::Stdout, format!("line {}", i));
                if i % 25 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            producer.close();
        })
        .await
        .unwrap();

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(a, b);
        assert_eq!(texts(&a).len(), 201);
        let seqs: Vec<u64> = a
            .iter()
            .filter_map(|e| match e {
                LogEvent::Line(l) => Some(l.seq),
                _ => None,
            })
            .collect();
        assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[tokio::test]
    async fn test_history_does_not_count_as_lag() {
        let log = Arc::new(JobLog::new());
        for i in 0..50 {
            log.append("nmap", LogStream::Stdout, format!("{}", i));
        }
        let stream = log.subscribe(5);
        log.close();
        let events = collect(stream).await;
        assert_eq!(texts(&events).len(), 50);
        assert_eq!(events.last(), Some(&LogEvent::End));
    }

    #[tokio::test]
    async fn test_slow_subscriber_dropped() {
        let log = Arc::new(JobLog::new());
        let stream = log.subscribe(3);
        for i in 0..10 {
            log.append("nmap", LogStream::Stdout, format!("{}", i));
        }
        let events = collect(stream).await;
        assert_eq!(events, vec![LogEvent::Lagged { backlog: 10 }]);
        // the producer is unaffected
        assert_eq!(log.len(), 10);
    }

    #[tokio::test]
    async fn test_replay_matches_live() {
        let log = Arc::new(JobLog::new());
        log.append("nmap", LogStream::Stdout, "x");
        log.append("nmap", LogStream::Stderr, "y");
        log.close();
        let live = collect(log.subscribe(0)).await;
        let stored = collect(replay(log.snapshot())).await;
        assert_eq!(live, stored);
    }
}
