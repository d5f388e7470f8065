//! In-memory results store.
//!
//! One [`Series`] per (run, element, attribute), each behind its own lock so
//! the run loop can append while readers query. Readers always observe a
//! whole-record prefix of the series.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hn_core::{Attribute, ElementKey, RunId};
use tracing::{debug, info};

use crate::types::{Point, RunStats, SeriesRecord, TimeRange};
use crate::{ResultsError, ResultsResult};

pub type SeriesKey = (ElementKey, Attribute);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Number of samples a run of `duration_s` stepped every `step_s` produces.
pub fn capacity_for(duration_s: i64, step_s: i64) -> usize {
    if duration_s <= 0 || step_s <= 0 {
        return 1;
    }
    ((duration_s as u64).div_ceil(step_s as u64) + 1) as usize
}

#[derive(Debug)]
struct Series {
    points: RwLock<Vec<Point>>,
}

impl Series {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            points: RwLock::new(Vec::with_capacity(capacity)),
        }
    }

    /// Index window of points inside `range`, bounded by the current length.
    fn window(&self, range: TimeRange) -> (usize, usize) {
        let points = read(&self.points);
        let start = points.partition_point(|p| p.time_s < range.start_s);
        let end = points.partition_point(|p| p.time_s <= range.end_s);
        (start, end.max(start))
    }
}

#[derive(Debug)]
struct RunSeries {
    run_id: RunId,
    series: BTreeMap<SeriesKey, Arc<Series>>,
    /// Appends hold the read side, `finalize` takes the write side.
    finalized: RwLock<bool>,
}

impl RunSeries {
    fn series(&self, key: &ElementKey, attribute: Attribute) -> ResultsResult<&Arc<Series>> {
        self.series
            .get(&(key.clone(), attribute))
            .ok_or_else(|| ResultsError::UnknownSeries {
                run_id: self.run_id,
                key: key.clone(),
                attribute,
            })
    }
}

/// Append handle for one run, obtained once and reused by the run loop.
#[derive(Debug, Clone)]
pub struct RunWriter {
    run: Arc<RunSeries>,
}

impl RunWriter {
    pub fn run_id(&self) -> RunId {
        self.run.run_id
    }

    pub fn append(
        &self,
        key: &ElementKey,
        attribute: Attribute,
        time_s: i64,
        value: f64,
    ) -> ResultsResult<()> {
        let finalized = read(&self.run.finalized);
        if *finalized {
            return Err(ResultsError::RunFinalized {
                run_id: self.run.run_id,
            });
        }
        let series = self.run.series(key, attribute)?;
        let mut points = write(&series.points);
        if let Some(last) = points.last()
            && time_s <= last.time_s
        {
            return Err(ResultsError::NonMonotonicTimestamp {
                key: key.clone(),
                attribute,
                last_s: last.time_s,
                time_s,
            });
        }
        points.push(Point { time_s, value });
        Ok(())
    }
}

/// A lazy, restartable view of one series within a time range.
///
/// Each call to [`SeriesQuery::iter`] starts over and sees every point
/// appended up to that moment.
#[derive(Debug, Clone)]
pub struct SeriesQuery {
    series: Arc<Series>,
    range: TimeRange,
}

impl SeriesQuery {
    pub fn iter(&self) -> SeriesIter {
        let (pos, end) = if self.range.is_empty() {
            (0, 0)
        } else {
            self.series.window(self.range)
        };
        SeriesIter {
            series: Arc::clone(&self.series),
            pos,
            end,
        }
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn count(&self) -> usize {
        let it = self.iter();
        it.end - it.pos
    }

    pub fn to_vec(&self) -> Vec<Point> {
        self.iter().collect()
    }
}

impl IntoIterator for &SeriesQuery {
    type Item = Point;
    type IntoIter = SeriesIter;

    fn into_iter(self) -> SeriesIter {
        self.iter()
    }
}

#[derive(Debug)]
pub struct SeriesIter {
    series: Arc<Series>,
    pos: usize,
    end: usize,
}

impl Iterator for SeriesIter {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.pos >= self.end {
            return None;
        }
        let point = read(&self.series.points).get(self.pos).copied();
        self.pos += 1;
        point
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SeriesIter {}

/// Results of every run not yet discarded.
#[derive(Debug, Default)]
pub struct ResultsStore {
    runs: RwLock<BTreeMap<RunId, Arc<RunSeries>>>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, run_id: RunId) -> ResultsResult<Arc<RunSeries>> {
        read(&self.runs)
            .get(&run_id)
            .cloned()
            .ok_or(ResultsError::UnknownRun { run_id })
    }

    /// Register empty series for every element × attribute pair.
    pub fn begin_run(
        &self,
        run_id: RunId,
        elements: &[ElementKey],
        attributes: &[Attribute],
        capacity: usize,
    ) -> ResultsResult<()> {
        let keys = elements
            .iter()
            .flat_map(|e| attributes.iter().map(move |a| (e.clone(), *a)));
        self.begin_run_with(run_id, keys, capacity)
    }

    /// Register empty series for an explicit key set.
    pub fn begin_run_with(
        &self,
        run_id: RunId,
        keys: impl IntoIterator<Item = SeriesKey>,
        capacity: usize,
    ) -> ResultsResult<()> {
        let series: BTreeMap<_, _> = keys
            .into_iter()
            .map(|k| (k, Arc::new(Series::with_capacity(capacity))))
            .collect();
        let mut runs = write(&self.runs);
        if runs.contains_key(&run_id) {
            return Err(ResultsError::RunExists { run_id });
        }
        info!(run_id = %run_id, series = series.len(), capacity, "results run registered");
        runs.insert(
            run_id,
            Arc::new(RunSeries {
                run_id,
                series,
                finalized: RwLock::new(false),
            }),
        );
        Ok(())
    }

    pub fn writer(&self, run_id: RunId) -> ResultsResult<RunWriter> {
        Ok(RunWriter {
            run: self.run(run_id)?,
        })
    }

    pub fn append(
        &self,
        run_id: RunId,
        key: &ElementKey,
        attribute: Attribute,
        time_s: i64,
        value: f64,
    ) -> ResultsResult<()> {
        self.writer(run_id)?.append(key, attribute, time_s, value)
    }

    pub fn query(
        &self,
        run_id: RunId,
        key: &ElementKey,
        attribute: Attribute,
        range: TimeRange,
    ) -> ResultsResult<SeriesQuery> {
        let run = self.run(run_id)?;
        let series = Arc::clone(run.series(key, attribute)?);
        Ok(SeriesQuery { series, range })
    }

    /// Mark the run immutable. Repeated calls are harmless.
    pub fn finalize(&self, run_id: RunId) -> ResultsResult<()> {
        let run = self.run(run_id)?;
        let mut finalized = write(&run.finalized);
        if !*finalized {
            *finalized = true;
            debug!(run_id = %run_id, "results run finalized");
        }
        Ok(())
    }

    pub fn is_finalized(&self, run_id: RunId) -> ResultsResult<bool> {
        let run = self.run(run_id)?;
        let finalized = *read(&run.finalized);
        Ok(finalized)
    }

    /// Drop every series of the run.
    pub fn discard(&self, run_id: RunId) -> ResultsResult<()> {
        match write(&self.runs).remove(&run_id) {
            Some(_) => {
                info!(run_id = %run_id, "results run discarded");
                Ok(())
            }
            None => Err(ResultsError::UnknownRun { run_id }),
        }
    }

    pub fn contains_run(&self, run_id: RunId) -> bool {
        read(&self.runs).contains_key(&run_id)
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        read(&self.runs).keys().copied().collect()
    }

    pub fn series_keys(&self, run_id: RunId) -> ResultsResult<Vec<SeriesKey>> {
        Ok(self.run(run_id)?.series.keys().cloned().collect())
    }

    pub fn stats(&self, run_id: RunId) -> ResultsResult<RunStats> {
        let run = self.run(run_id)?;
        let mut stats = RunStats {
            series: run.series.len(),
            finalized: *read(&run.finalized),
            ..RunStats::default()
        };
        for series in run.series.values() {
            let points = read(&series.points);
            stats.samples += points.len();
            if let Some(first) = points.first() {
                stats.first_time_s =
                    Some(stats.first_time_s.map_or(first.time_s, |t| t.min(first.time_s)));
            }
            if let Some(last) = points.last() {
                stats.last_time_s =
                    Some(stats.last_time_s.map_or(last.time_s, |t| t.max(last.time_s)));
            }
        }
        Ok(stats)
    }

    /// Copy every series of the run, in key order.
    pub fn export_run(&self, run_id: RunId) -> ResultsResult<Vec<SeriesRecord>> {
        let run = self.run(run_id)?;
        Ok(run
            .series
            .iter()
            .map(|((key, attribute), series)| SeriesRecord {
                key: key.clone(),
                attribute: *attribute,
                points: read(&series.points).clone(),
            })
            .collect())
    }

    /// Load archived series as a finalized run.
    pub fn import_run(&self, run_id: RunId, records: &[SeriesRecord]) -> ResultsResult<()> {
        let capacity = records.iter().map(|r| r.points.len()).max().unwrap_or(0);
        self.begin_run_with(
            run_id,
            records.iter().map(|r| (r.key.clone(), r.attribute)),
            capacity,
        )?;
        let writer = self.writer(run_id)?;
        let filled = records.iter().try_for_each(|r| {
            r.points
                .iter()
                .try_for_each(|p| writer.append(&r.key, r.attribute, p.time_s, p.value))
        });
        if let Err(err) = filled {
            write(&self.runs).remove(&run_id);
            return Err(err);
        }
        self.finalize(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_run(run_id: RunId) -> ResultsStore {
        let store = ResultsStore::new();
        store
            .begin_run(
                run_id,
                &[ElementKey::node("J1"), ElementKey::node("J2")],
                &[Attribute::Pressure, Attribute::Head],
                4,
            )
            .unwrap();
        store
    }

    #[test]
    fn begin_run_registers_cross_product() {
        let store = store_with_run(RunId(1));
        assert_eq!(store.series_keys(RunId(1)).unwrap().len(), 4);
        let q = store
            .query(RunId(1), &ElementKey::node("J2"), Attribute::Head, TimeRange::all())
            .unwrap();
        assert_eq!(q.count(), 0);
    }

    #[test]
    fn duplicate_run_is_rejected() {
        let store = store_with_run(RunId(1));
        let err = store.begin_run(RunId(1), &[], &[], 0).unwrap_err();
        assert!(matches!(err, ResultsError::RunExists { .. }));
    }

    #[test]
    fn unregistered_series_is_rejected() {
        let store = store_with_run(RunId(1));
        let err = store
            .append(RunId(1), &ElementKey::link("P1"), Attribute::Flow, 0, 1.0)
            .unwrap_err();
        assert!(matches!(err, ResultsError::UnknownSeries { .. }));

        let err = store
            .append(RunId(9), &ElementKey::node("J1"), Attribute::Head, 0, 1.0)
            .unwrap_err();
        assert!(matches!(err, ResultsError::UnknownRun { .. }));
    }

    #[test]
    fn timestamps_must_strictly_increase() {
        let store = store_with_run(RunId(1));
        let j1 = ElementKey::node("J1");
        store.append(RunId(1), &j1, Attribute::Head, 0, 1.0).unwrap();
        store.append(RunId(1), &j1, Attribute::Head, 10, 2.0).unwrap();

        for t in [10, 5] {
            let err = store
                .append(RunId(1), &j1, Attribute::Head, t, 3.0)
                .unwrap_err();
            assert!(matches!(
                err,
                ResultsError::NonMonotonicTimestamp { last_s: 10, .. }
            ));
        }
        // Other series keep their own clock.
        store.append(RunId(1), &j1, Attribute::Pressure, 0, 1.0).unwrap();
    }

    #[test]
    fn finalized_run_rejects_appends() {
        let store = store_with_run(RunId(1));
        store.finalize(RunId(1)).unwrap();
        store.finalize(RunId(1)).unwrap();
        let err = store
            .append(RunId(1), &ElementKey::node("J1"), Attribute::Head, 0, 1.0)
            .unwrap_err();
        assert!(matches!(err, ResultsError::RunFinalized { .. }));
        assert!(store.is_finalized(RunId(1)).unwrap());
    }

    #[test]
    fn query_is_bounded_by_range() {
        let store = store_with_run(RunId(1));
        let j1 = ElementKey::node("J1");
        for t in 0..10 {
            store
                .append(RunId(1), &j1, Attribute::Head, t * 100, t as f64)
                .unwrap();
        }
        let q = store
            .query(RunId(1), &j1, Attribute::Head, TimeRange::new(200, 500))
            .unwrap();
        let times: Vec<i64> = q.iter().map(|p| p.time_s).collect();
        assert_eq!(times, vec![200, 300, 400, 500]);

        let empty = store
            .query(RunId(1), &j1, Attribute::Head, TimeRange::new(500, 200))
            .unwrap();
        assert_eq!(empty.iter().count(), 0);
    }

    #[test]
    fn query_restarts_and_sees_new_points() {
        let store = store_with_run(RunId(1));
        let j1 = ElementKey::node("J1");
        store.append(RunId(1), &j1, Attribute::Head, 0, 1.0).unwrap();
        let q = store
            .query(RunId(1), &j1, Attribute::Head, TimeRange::all())
            .unwrap();

        let first = q.iter();
        store.append(RunId(1), &j1, Attribute::Head, 1, 2.0).unwrap();
        // An iterator in flight keeps the prefix it started with.
        assert_eq!(first.count(), 1);
        assert_eq!(q.iter().count(), 2);
        assert_eq!(q.iter().count(), 2);
    }

    #[test]
    fn discard_releases_the_run() {
        let store = store_with_run(RunId(1));
        store.discard(RunId(1)).unwrap();
        assert!(!store.contains_run(RunId(1)));
        assert!(matches!(
            store.discard(RunId(1)),
            Err(ResultsError::UnknownRun { .. })
        ));
    }

    #[test]
    fn capacity_covers_both_ends() {
        assert_eq!(capacity_for(86_400, 3600), 25);
        assert_eq!(capacity_for(5400, 3600), 3);
        assert_eq!(capacity_for(0, 3600), 1);
        assert_eq!(capacity_for(3600, -60), 1);
        assert_eq!(capacity_for(7, 2), 5);
    }
}
