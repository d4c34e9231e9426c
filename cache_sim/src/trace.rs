use std::{
    fmt,
    io::{self, BufRead},
};

use nom::{
    bytes::complete::tag_no_case,
    character::complete::{char, hex_digit1, multispace0, satisfy, space0, space1, u32},
    combinator::{eof, map_res, opt},
    sequence::preceded,
    IResult,
};
use num_enum::FromPrimitive;
use thiserror::Error;

/// operation of a trace record, keyed by its op character.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
#[repr(u8)]
pub enum TraceKind {
    Instruction = 0x49, // 'I'
    Load = 0x4c,        // 'L'
    Store = 0x53,       // 'S'
    /// load followed by a store to the same address
    Modify = 0x4d, // 'M'
    #[num_enum(catch_all)]
    Other(u8),
}

impl TraceKind {
    pub fn op(self) -> char {
        match self {
            TraceKind::Instruction => 'I',
            TraceKind::Load => 'L',
            TraceKind::Store => 'S',
            TraceKind::Modify => 'M',
            TraceKind::Other(c) => c as char,
        }
    }
    /// number of cache accesses the record performs.
    pub fn accesses(self) -> usize {
        match self {
            TraceKind::Load | TraceKind::Store => 1,
            TraceKind::Modify => 2,
            TraceKind::Instruction | TraceKind::Other(_) => 0,
        }
    }
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TraceRecord {
    pub kind: TraceKind,
    pub address: u64,
    /// access width in bytes. carried for display only.
    pub size: u32,
}

impl TraceRecord {
    pub fn new(kind: TraceKind, address: u64) -> Self {
        Self {
            kind,
            address,
            size: 0,
        }
    }

    /// parses one `<op> <hex-address>[,<size>]` line. blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, nom::Err<nom::error::Error<&str>>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let (_, record) = read_record(line)?;
        Ok(Some(record))
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:x},{}", self.kind, self.address, self.size)
    }
}

fn read_address(input: &str) -> IResult<&str, u64> {
    let (input, _) = opt(tag_no_case("0x"))(input)?;
    map_res(hex_digit1, |s: &str| u64::from_str_radix(s, 16))(input)
}

fn read_record(input: &str) -> IResult<&str, TraceRecord> {
    let (input, _) = space0(input)?;
    let (input, op) = satisfy(|c| c.is_ascii_graphic())(input)?;
    let (input, _) = space1(input)?;
    let (input, address) = read_address(input)?;
    let (input, size) = opt(preceded(char(','), u32))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = eof(input)?;
    let record = TraceRecord {
        kind: TraceKind::from(op as u8),
        address,
        size: size.unwrap_or(0),
    };
    Ok((input, record))
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: malformed trace record `{content}`")]
    Syntax { line: usize, content: String },
}

/// lazily parses trace records from a line-oriented reader.
pub struct TraceReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
    strict: bool,
    malformed: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            strict: false,
            malformed: 0,
        }
    }
    /// yield malformed lines as errors instead of skipping them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
    /// number of malformed lines skipped so far.
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            match TraceRecord::parse(&line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    if self.strict {
                        return Some(Err(TraceError::Syntax {
                            line: self.line_no,
                            content: line,
                        }));
                    }
                    log::warn!("skipping line {}: `{line}` ({e})", self.line_no);
                    self.malformed += 1;
                }
            }
        }
    }
}
