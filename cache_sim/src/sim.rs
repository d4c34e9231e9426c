use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::{
    addr::Geometry,
    cache::{Cache, InvariantError, SetAccess},
    observer::{AccessEvent, NoopObserver, Observer, Outcome},
    trace::{TraceError, TraceRecord},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Observer(#[from] anyhow::Error),
}

/// counters of a run. only ever incremented.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct SimulationResult {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl SimulationResult {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }
    pub fn hit_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.,
            n => self.hits as f64 / n as f64,
        }
    }
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Hit => self.hits += 1,
            Outcome::Miss => self.misses += 1,
            Outcome::Eviction { .. } => {
                self.misses += 1;
                self.evictions += 1;
            }
        }
    }
}

impl fmt::Display for SimulationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}

/// drives a [`Cache`] with trace records, strictly in order.
pub struct Simulator<O> {
    cache: Cache,
    result: SimulationResult,
    observer: O,
    #[cfg(feature = "stat")]
    stat_builder: stat::SimStatBuilder,
}

pub struct SimOutput<O> {
    pub result: SimulationResult,
    pub cache: Cache,
    pub observer: O,
    #[cfg(feature = "stat")]
    stat: stat::SimStat,
}

impl<O: Observer> Simulator<O> {
    pub fn new(geometry: Geometry, observer: O) -> Self {
        Self {
            cache: Cache::new(geometry),
            result: Default::default(),
            observer,
            #[cfg(feature = "stat")]
            stat_builder: stat::SimStatBuilder::new(geometry.num_sets()),
        }
    }

    /// applies one record. `Modify` accesses the cache twice, `Instruction`
    /// and unknown records not at all.
    pub fn step(&mut self, record: &TraceRecord) -> Result<(), RuntimeError> {
        let accesses = record.kind.accesses();
        if accesses == 0 {
            log::debug!("skipping `{record}`");
            #[cfg(feature = "stat")]
            self.stat_builder.skip();
            return Ok(());
        }
        let (tag, set) = self.cache.geometry().decode(record.address);
        self.observer.begin_record(record)?;
        for _ in 0..accesses {
            let outcome = match self.cache.access(set, tag)? {
                SetAccess { hit: true, .. } => Outcome::Hit,
                SetAccess {
                    evicted: Some(victim),
                    ..
                } => Outcome::Eviction { victim },
                SetAccess { evicted: None, .. } => Outcome::Miss,
            };
            log::trace!("set {set}, tag {tag}: {outcome}");
            self.result.count(outcome);
            #[cfg(feature = "stat")]
            self.stat_builder.count(set, outcome);
            self.observer.on_access(&AccessEvent { set, tag, outcome })?;
        }
        self.observer.end_record(record)?;
        Ok(())
    }

    pub fn run<I>(self, records: I) -> Result<SimOutput<O>, RuntimeError>
    where
        I: IntoIterator<Item = TraceRecord>,
    {
        self.try_run(records.into_iter().map(Ok::<_, RuntimeError>))
    }

    /// like [`Self::run`], but the first error from `records` aborts the run.
    pub fn try_run<I, E>(mut self, records: I) -> Result<SimOutput<O>, RuntimeError>
    where
        I: IntoIterator<Item = Result<TraceRecord, E>>,
        E: Into<RuntimeError>,
    {
        for record in records {
            let record = record.map_err(Into::into)?;
            self.step(&record)?;
        }
        log::info!("finished simulation. {}", self.result);
        Ok(self.into_output())
    }

    pub fn result(&self) -> &SimulationResult {
        &self.result
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn into_output(self) -> SimOutput<O> {
        SimOutput {
            result: self.result,
            cache: self.cache,
            observer: self.observer,
            #[cfg(feature = "stat")]
            stat: self.stat_builder.finish(self.result),
        }
    }
}

/// runs `records` against a fresh cache of `geometry`.
pub fn simulate<I>(geometry: Geometry, records: I) -> Result<SimulationResult, RuntimeError>
where
    I: IntoIterator<Item = TraceRecord>,
{
    let output = Simulator::new(geometry, NoopObserver::new()).run(records)?;
    Ok(output.result)
}

#[cfg(feature = "stat")]
impl<O> SimOutput<O> {
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

#[cfg(feature = "stat")]
impl<O> AddStats for SimOutput<O> {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.stat.summary));
        buf.push(Box::new(self.stat.per_set.clone()));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use crate::{common::SetIndex, stat::*};

    use super::*;
    use std::time;

    pub struct SimStatBuilder {
        begin: time::Instant,
        skipped: u64,
        per_set: Vec<SimulationResult>,
    }

    impl SimStatBuilder {
        pub fn new(num_sets: usize) -> Self {
            Self {
                begin: time::Instant::now(),
                skipped: 0,
                per_set: vec![SimulationResult::default(); num_sets],
            }
        }
        pub fn skip(&mut self) {
            self.skipped += 1;
        }
        pub fn count(&mut self, set: SetIndex, outcome: Outcome) {
            if let Some(c) = self.per_set.get_mut(set.into_usize()) {
                c.count(outcome);
            }
        }
        pub fn finish(self, result: SimulationResult) -> SimStat {
            SimStat {
                summary: SummaryStat {
                    result,
                    skipped: self.skipped,
                    elapsed: self.begin.elapsed(),
                },
                per_set: SetStat {
                    per_set: self.per_set,
                },
            }
        }
    }

    pub struct SimStat {
        pub summary: SummaryStat,
        pub per_set: SetStat,
    }

    #[derive(Clone, Copy)]
    pub struct SummaryStat {
        result: SimulationResult,
        skipped: u64,
        elapsed: time::Duration,
    }

    impl Stat for SummaryStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ SummaryStat {
        fn header(&self) -> &'static str {
            "simulation summary"
        }
        fn width(&self) -> usize {
            39
        }
    }

    impl fmt::Display for &'_ SummaryStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let r = &self.result;
            let hit_pct = format!("{:.4}", 100. * r.hit_rate());
            let miss_pct = match r.accesses() {
                0 => format!("{:.4}", 0.),
                _ => format!("{:.4}", 100. * (1. - r.hit_rate())),
            };
            let ms = format!("{} ms", self.elapsed.as_millis());
            writeln!(f, "  elapsed total: {ms:>13}")?;
            writeln!(f, "       accesses: {:>13}", r.accesses())?;
            writeln!(f, "           hits: {:>10} ({:>8}%)", r.hits, hit_pct)?;
            writeln!(f, "         misses: {:>10} ({:>8}%)", r.misses, miss_pct)?;
            writeln!(f, "      evictions: {:>13}", r.evictions)?;
            write!(f, "        skipped: {:>13}", self.skipped)
        }
    }

    #[derive(Clone)]
    pub struct SetStat {
        per_set: Vec<SimulationResult>,
    }

    impl Stat for SetStat {
        fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
            Box::new(SetStatView::new(self, max_width))
        }
    }

    pub struct SetStatView<'a> {
        stat: &'a SetStat,
        chunk_size: usize,
    }

    impl<'a> SetStatView<'a> {
        pub fn new(stat: &'a SetStat, max_width: usize) -> Self {
            Self {
                stat,
                chunk_size: Self::chunk_size(max_width),
            }
        }
    }

    impl StatView for SetStatView<'_> {
        fn header(&self) -> &'static str {
            "per set (hit / miss / eviction)"
        }
        fn width(&self) -> usize {
            Self::width_by_chunk_size(self.chunk_size)
        }
    }

    impl Width for SetStatView<'_> {
        fn width_by_chunk_size(chunk_size: usize) -> usize {
            chunk_size * 34 + (chunk_size - 1) * 2 + 2
        }
    }

    impl fmt::Display for SetStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let cells: Vec<_> = self
                .stat
                .per_set
                .iter()
                .enumerate()
                .filter(|(_, r)| r.accesses() > 0)
                .map(|(i, r)| {
                    format!("{i:>6}: {:>8} {:>8} {:>8}", r.hits, r.misses, r.evictions)
                })
                .collect();
            if cells.is_empty() {
                return write!(f, "  no accesses");
            }
            let rows: Vec<_> = cells
                .chunks(self.chunk_size)
                .map(|chunk| format!("  {}", chunk.join(", ")))
                .collect();
            write!(f, "{}", rows.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{SetIndex, Tag},
        observer::{EventLog, VerboseObserver},
        trace::{TraceKind, TraceReader},
    };

    fn load(address: u64) -> TraceRecord {
        TraceRecord::new(TraceKind::Load, address)
    }

    fn result(hits: u64, misses: u64, evictions: u64) -> SimulationResult {
        SimulationResult {
            hits,
            misses,
            evictions,
        }
    }

    #[test]
    fn test_scenario_evictions() {
        let g = Geometry::new(0, 0, 2).unwrap();
        let trace = [load(10), load(20), load(30), load(10)];
        let mut log = EventLog::new();
        let r = Simulator::new(g, &mut log).run(trace).unwrap().result;
        assert_eq!(result(0, 4, 2), r);
        let victims: Vec<_> = log
            .events()
            .iter()
            .filter_map(|e| match e.outcome {
                Outcome::Eviction { victim } => Some(victim),
                _ => None,
            })
            .collect();
        assert_eq!(vec![Tag::new(10), Tag::new(20)], victims);
    }
    #[test]
    fn test_scenario_hits() {
        let g = Geometry::new(0, 0, 2).unwrap();
        let trace = [load(10), load(20), load(10), load(20)];
        assert_eq!(result(2, 2, 0), simulate(g, trace).unwrap());
    }
    #[test]
    fn test_scenario_modify() {
        let g = Geometry::new(0, 0, 1).unwrap();
        let trace = [TraceRecord::new(TraceKind::Modify, 10)];
        assert_eq!(result(1, 1, 0), simulate(g, trace).unwrap());
    }
    #[test]
    fn test_modify_second_access_hits() {
        let g = Geometry::new(2, 1, 1).unwrap();
        let trace: Vec<_> = (0..64u64)
            .map(|a| TraceRecord::new(TraceKind::Modify, a * 12))
            .collect();
        let mut log = EventLog::new();
        Simulator::new(g, &mut log).run(trace).unwrap();
        let events = log.events();
        assert_eq!(128, events.len());
        for pair in events.chunks(2) {
            assert_eq!(Outcome::Hit, pair[1].outcome);
            assert_eq!(pair[0].tag, pair[1].tag);
        }
    }
    #[test]
    fn test_instruction_and_unknown_are_skipped() {
        let g = Geometry::new(0, 0, 1).unwrap();
        let trace = [
            TraceRecord::new(TraceKind::Instruction, 1),
            TraceRecord::new(TraceKind::Other(b'X'), 2),
            TraceRecord::new(TraceKind::Store, 3),
        ];
        let mut log = EventLog::new();
        let r = Simulator::new(g, &mut log).run(trace).unwrap().result;
        assert_eq!(result(0, 1, 0), r);
        assert_eq!(1, log.events().len());
        assert_eq!(Tag::new(3), log.events()[0].tag);
    }
    #[test]
    fn test_conservation() {
        let g = Geometry::new(4, 2, 2).unwrap();
        let kinds = [
            TraceKind::Load,
            TraceKind::Store,
            TraceKind::Modify,
            TraceKind::Instruction,
        ];
        let trace: Vec<_> = (0..400u64)
            .map(|i| {
                let addr = i.wrapping_mul(0x9e37_79b9) % 0x400;
                TraceRecord::new(kinds[(i % 4) as usize], addr)
            })
            .collect();
        let expected: u64 = trace.iter().map(|r| r.kind.accesses() as u64).sum();
        let r = simulate(g, trace).unwrap();
        assert_eq!(expected, r.hits + r.misses);
        assert!(r.evictions <= r.misses);
    }
    #[test]
    fn test_eviction_gating() {
        let g = Geometry::new(0, 1, 2).unwrap();
        let trace: Vec<_> = [0u64, 2, 4, 1, 3, 0, 6, 5, 2, 2, 8, 7]
            .into_iter()
            .map(load)
            .collect();
        let mut log = EventLog::new();
        let mut sim = Simulator::new(g, &mut log);
        for record in &trace {
            let (tag, set) = g.decode(record.address);
            let s = &sim.cache().sets()[set.into_usize()];
            let full = s.num_valid() == g.lines_per_set();
            let resident = s.lines().iter().any(|l| l.valid && l.tag == tag);
            let before = sim.result().evictions;
            sim.step(record).unwrap();
            let evicted = sim.result().evictions > before;
            assert_eq!(full && !resident, evicted, "at {record}");
        }
    }
    #[test]
    fn test_sets_do_not_interfere() {
        let g = Geometry::new(0, 1, 1).unwrap();
        // even addresses go to set 0, odd ones to set 1
        let trace = [load(0), load(1), load(0), load(1)];
        let mut log = EventLog::new();
        let r = Simulator::new(g, &mut log).run(trace).unwrap().result;
        assert_eq!(result(2, 2, 0), r);
        assert_eq!(SetIndex::new(1), log.events()[1].set);
    }
    #[test]
    fn test_verbose_output() {
        let g = Geometry::new(4, 0, 1).unwrap();
        let text = " L 10,1\n M 20,1\nI 0,4\n S 18,1\n";
        let reader = TraceReader::new(text.as_bytes());
        let out = Simulator::new(g, VerboseObserver::new(Vec::new()))
            .try_run(reader)
            .unwrap();
        let printed = String::from_utf8(out.observer.into_inner()).unwrap();
        assert_eq!(
            "L 10,1 miss\nM 20,1 miss eviction hit\nS 18,1 miss eviction\n",
            printed
        );
        assert_eq!(result(1, 3, 2), out.result);
    }
    #[test]
    fn test_small_trace() {
        let text = " L 10,1\n M 20,1\n L 22,1\n S 18,1\n L 110,1\n L 210,1\n M 12,1\n";
        let run = |b, s, e| {
            let g = Geometry::new(b, s, e).unwrap();
            Simulator::new(g, NoopObserver::new())
                .try_run(TraceReader::new(text.as_bytes()))
                .unwrap()
                .result
        };
        assert_eq!(result(4, 5, 3), run(4, 4, 1));
        assert_eq!(result(4, 5, 2), run(4, 4, 2));
        assert_eq!(result(2, 7, 5), run(1, 1, 1));
    }
    #[test]
    fn test_trace_error_aborts() {
        let g = Geometry::new(0, 0, 1).unwrap();
        let text = " L 10,1\nbogus\n";
        let reader = TraceReader::new(text.as_bytes()).strict(true);
        let r = Simulator::new(g, NoopObserver::new()).try_run(reader);
        assert!(matches!(
            r,
            Err(RuntimeError::Trace(TraceError::Syntax { line: 2, .. }))
        ));
    }
    #[test]
    fn test_result_display_and_json() {
        let r = result(4, 5, 3);
        assert_eq!("hits:4 misses:5 evictions:3", r.to_string());
        assert_eq!(
            r#"{"hits":4,"misses":5,"evictions":3}"#,
            serde_json::to_string(&r).unwrap()
        );
        assert_eq!(0., SimulationResult::default().hit_rate());
        assert_eq!(0.5, result(1, 1, 0).hit_rate());
    }
    #[cfg(feature = "stat")]
    #[test]
    fn test_stat_views() {
        let g = Geometry::new(0, 1, 1).unwrap();
        let trace = [load(0), load(0), load(2), TraceRecord::new(TraceKind::Instruction, 0)];
        let out = Simulator::new(g, NoopObserver::new()).run(trace).unwrap();
        let s = out.collect_stat().view(120).to_string();
        assert!(s.contains("simulation summary:"));
        assert!(s.contains("        skipped:             1"));
        assert!(s.contains("           hits:          1 ( 33.3333%)"));
        assert!(s.contains("         misses:          2 ( 66.6667%)"));
        assert!(s.contains("     0:        1        2        1"));
        // set 1 was never accessed
        assert!(!s.contains("     1:"));
    }
}
