use std::{fmt, io::Write};

use anyhow::Result;

use crate::{
    common::{SetIndex, Tag},
    trace::TraceRecord,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Outcome {
    Hit,
    Miss,
    Eviction { victim: Tag },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Hit => write!(f, "hit"),
            Outcome::Miss => write!(f, "miss"),
            Outcome::Eviction { .. } => write!(f, "miss eviction"),
        }
    }
}

/// result of a single cache access.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AccessEvent {
    pub set: SetIndex,
    pub tag: Tag,
    pub outcome: Outcome,
}

/// receives what the simulator does, in order.
///
/// every record that touches the cache is bracketed by `begin_record` and
/// `end_record`; skipped records are not reported.
pub trait Observer {
    fn begin_record(&mut self, _record: &TraceRecord) -> Result<()> {
        Ok(())
    }
    fn on_access(&mut self, event: &AccessEvent) -> Result<()>;
    fn end_record(&mut self, _record: &TraceRecord) -> Result<()> {
        Ok(())
    }
}

impl<T: Observer + ?Sized> Observer for &mut T {
    fn begin_record(&mut self, record: &TraceRecord) -> Result<()> {
        (**self).begin_record(record)
    }
    fn on_access(&mut self, event: &AccessEvent) -> Result<()> {
        (**self).on_access(event)
    }
    fn end_record(&mut self, record: &TraceRecord) -> Result<()> {
        (**self).end_record(record)
    }
}

#[derive(Default)]
pub struct NoopObserver {}

impl NoopObserver {
    pub fn new() -> Self {
        Self {}
    }
}

impl Observer for NoopObserver {
    fn on_access(&mut self, _: &AccessEvent) -> Result<()> {
        Ok(())
    }
}

/// keeps every access event.
#[derive(Default)]
pub struct EventLog {
    events: Vec<AccessEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn events(&self) -> &[AccessEvent] {
        &self.events
    }
}

impl Observer for EventLog {
    fn on_access(&mut self, event: &AccessEvent) -> Result<()> {
        self.events.push(*event);
        Ok(())
    }
}

/// writes `L 10,1 miss eviction`-style lines, one per record.
pub struct VerboseObserver<W> {
    out: W,
}

impl<W: Write> VerboseObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Observer for VerboseObserver<W> {
    fn begin_record(&mut self, record: &TraceRecord) -> Result<()> {
        write!(self.out, "{record}")?;
        Ok(())
    }
    fn on_access(&mut self, event: &AccessEvent) -> Result<()> {
        write!(self.out, " {}", event.outcome)?;
        Ok(())
    }
    fn end_record(&mut self, _: &TraceRecord) -> Result<()> {
        writeln!(self.out)?;
        Ok(())
    }
}
