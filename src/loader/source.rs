//! Streaming reader for the comma-separated source files
//!
//! Files are read on a blocking worker and handed over one row at a time
//! through a bounded channel. The channel size caps how far the reader can
//! run ahead of the store writes.

use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::LoadError;
use crate::store::is_addressable_id;

/// A record built from one fixed-position source row
pub trait SourceRow: Sized + Send + 'static {
    /// Minimum number of columns a row must have
    const FIELDS: usize;

    fn from_record(record: &StringRecord, line: u64) -> Self;

    fn id(&self) -> &str;
}

pub struct RowStream<R> {
    rx: mpsc::Receiver<Result<R, LoadError>>,
    reader: JoinHandle<()>,
    path: PathBuf,
}

impl<R: SourceRow> RowStream<R> {
    /// Next row, or `None` once the reader has stopped
    pub async fn next(&mut self) -> Option<Result<R, LoadError>> {
        self.rx.recv().await
    }

    /// Wait for the reader to exit. Fails if it died without reporting.
    pub async fn finish(self) -> Result<(), LoadError> {
        drop(self.rx);
        self.reader
            .await
            .map_err(|_| LoadError::ReaderStopped { path: self.path })
    }
}

/// Start streaming rows of `path`.
pub fn stream_rows<R: SourceRow>(path: PathBuf, queue_size: usize) -> RowStream<R> {
    let (tx, rx) = mpsc::channel(queue_size.max(1));
    let reader_path = path.clone();
    let reader = tokio::task::spawn_blocking(move || read_rows::<R>(&reader_path, &tx));

    RowStream { rx, reader, path }
}

fn read_rows<R: SourceRow>(path: &Path, tx: &mpsc::Sender<Result<R, LoadError>>) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(source) => {
            let _ = tx.blocking_send(Err(LoadError::Open {
                path: path.to_path_buf(),
                source,
            }));
            return;
        }
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(BufReader::new(file));

    let mut rows = 0u64;
    for result in reader.records() {
        let item = parse_row::<R>(path, result);
        let failed = item.is_err();
        // A closed channel means the consumer gave up; stop reading.
        if tx.blocking_send(item).is_err() || failed {
            return;
        }
        rows += 1;
    }

    debug!(path = %path.display(), rows = rows, "Reached end of source file");
}

fn parse_row<R: SourceRow>(
    path: &Path,
    result: Result<StringRecord, csv::Error>,
) -> Result<R, LoadError> {
    let record = result.map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        line: source.position().map(|p| p.line()).unwrap_or(0),
        source,
    })?;
    let line = record.position().map(|p| p.line()).unwrap_or(0);

    if record.len() < R::FIELDS {
        return Err(LoadError::MissingFields {
            path: path.to_path_buf(),
            line,
            expected: R::FIELDS,
            found: record.len(),
        });
    }

    let row = R::from_record(&record, line);
    if row.id().is_empty() {
        return Err(LoadError::EmptyId {
            path: path.to_path_buf(),
            line,
        });
    }
    if !is_addressable_id(row.id()) {
        return Err(LoadError::UnaddressableId {
            path: path.to_path_buf(),
            line,
            id: row.id().to_string(),
        });
    }
    Ok(row)
}
