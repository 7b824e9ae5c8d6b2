use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    sync::Mutex,
};

use tracing::warn;

use crate::{
    error::{IoError, SimresResult},
    executor::{KpiRow, SampledSeries},
};

/// Destination for streamed replica results.
///
/// Implementations must be safe to call from several workers at once and
/// append-only: a row, once written, survives a process crash uncorrupted.
/// Rows may arrive in any replica order; readers sort.
pub trait ReplicaSink: Send + Sync {
    fn append_kpis(&self, row: &KpiRow) -> SimresResult<()>;

    fn append_timeseries(&self, series: &SampledSeries) -> SimresResult<()>;
}

/// Sink that discards everything. Useful when only the in-memory
/// [`ScenarioResult`](crate::executor::ScenarioResult) is wanted.
#[derive(Debug, Default)]
pub struct NullSink;

impl ReplicaSink for NullSink {
    fn append_kpis(&self, _row: &KpiRow) -> SimresResult<()> {
        Ok(())
    }

    fn append_timeseries(&self, _series: &SampledSeries) -> SimresResult<()> {
        Ok(())
    }
}

/// In-memory sink for tests and small interactive runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<KpiRow>>,
    series: Mutex<Vec<SampledSeries>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<KpiRow> {
        lock_ignoring_poison(&self.rows).clone()
    }

    pub fn series(&self) -> Vec<SampledSeries> {
        lock_ignoring_poison(&self.series).clone()
    }
}

impl ReplicaSink for MemorySink {
    fn append_kpis(&self, row: &KpiRow) -> SimresResult<()> {
        lock_ignoring_poison(&self.rows).push(row.clone());
        Ok(())
    }

    fn append_timeseries(&self, series: &SampledSeries) -> SimresResult<()> {
        lock_ignoring_poison(&self.series).push(series.clone());
        Ok(())
    }
}

/// Durable sink writing one JSON document per line.
///
/// Files are opened in append mode and flushed after every row, so an
/// interrupted experiment leaves at most one truncated trailing line, which
/// [`read_kpi_rows`] skips on reload. KPI rows and sampled time series go to
/// separate files.
#[derive(Debug)]
pub struct JsonlSink {
    kpis: Mutex<BufWriter<File>>,
    timeseries: Option<Mutex<BufWriter<File>>>,
}

impl JsonlSink {
    /// Opens (creating if needed) the KPI file and, optionally, the sampled
    /// time-series file.
    pub fn create(
        kpi_path: impl AsRef<Path>,
        timeseries_path: Option<&Path>,
    ) -> SimresResult<Self> {
        Ok(Self {
            kpis: Mutex::new(open_append(kpi_path.as_ref())?),
            timeseries: timeseries_path
                .map(|p| Ok::<_, crate::error::SimresError>(Mutex::new(open_append(p)?)))
                .transpose()?,
        })
    }

    fn write_line<T: serde::Serialize>(
        writer: &Mutex<BufWriter<File>>,
        value: &T,
    ) -> SimresResult<()> {
        let line = serde_json::to_string(value).map_err(IoError::Json)?;
        let mut guard = lock_ignoring_poison(writer);
        writeln!(guard, "{line}").map_err(IoError::Io)?;
        // Flush per row: a crash never loses acknowledged rows.
        guard.flush().map_err(IoError::Io)?;
        Ok(())
    }
}

impl ReplicaSink for JsonlSink {
    fn append_kpis(&self, row: &KpiRow) -> SimresResult<()> {
        Self::write_line(&self.kpis, row)
    }

    fn append_timeseries(&self, series: &SampledSeries) -> SimresResult<()> {
        match &self.timeseries {
            Some(writer) => Self::write_line(writer, series),
            None => Ok(()),
        }
    }
}

/// Reads every intact KPI row from a JSONL sink file.
///
/// Unparseable lines (e.g. a row truncated by a crash) are skipped with a
/// warning instead of failing the whole reload.
pub fn read_kpi_rows(path: impl AsRef<Path>) -> SimresResult<Vec<KpiRow>> {
    let file = File::open(path.as_ref())
        .map_err(|e| IoError::ReaderCreation(format!("{}: {e}", path.as_ref().display())))?;

    let mut rows = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(IoError::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<KpiRow>(&line) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(line = line_no + 1, error = %e, "Skipping corrupt sink row"),
        }
    }
    Ok(rows)
}

fn open_append(path: &Path) -> SimresResult<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| IoError::WriterCreation(format!("{}: {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

pub(crate) fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
