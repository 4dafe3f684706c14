use crate::error::{IndexError, Result};
use crate::store::{IndexStore, Posting};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const MAX_BUCKET_EXPONENT: u32 = 30;

/// Range of bucket counts, as powers of two, that a flushed segment may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRange {
    min: u32,
    max: u32,
}

impl BucketRange {
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min > max || max > MAX_BUCKET_EXPONENT {
            return Err(IndexError::InvalidBucketRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Bucket count for a segment holding `terms` distinct terms.
    fn bucket_count(&self, terms: usize) -> u32 {
        let lower = 1u32 << self.min;
        let upper = 1u32 << self.max;
        let wanted = u32::try_from(terms.next_power_of_two()).unwrap_or(upper);
        wanted.clamp(lower, upper)
    }
}

#[derive(Serialize)]
struct SegmentEntry<'a> {
    bucket: u32,
    buckets: u32,
    term: &'a str,
    postings: &'a [Posting],
}

#[derive(Debug, Deserialize)]
struct SegmentRecord {
    bucket: u32,
    buckets: u32,
    term: String,
    postings: Vec<Posting>,
}

/// Bucket-hash word index backed by an append-only file.
///
/// Each flush appends one segment: every buffered term is hashed into one
/// of `buckets` buckets and written, bucket by bucket, as a JSON line.
pub struct BucketIndex {
    path: PathBuf,
    range: BucketRange,
    buffer: HashMap<String, Vec<Posting>>,
    buffered: usize,
}

impl BucketIndex {
    /// Open the index at `path`. The file is created lazily by the first flush.
    pub fn open(path: &Path, range: BucketRange) -> Self {
        debug!("Opening word index at {}", path.display());
        Self {
            path: path.to_path_buf(),
            range,
            buffer: HashMap::new(),
            buffered: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn range(&self) -> BucketRange {
        self.range
    }

    /// Durable postings for `term`, in flush order. Buffered postings are
    /// not visible until they are flushed.
    pub fn lookup(&self, term: &str) -> Result<Vec<Posting>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut found = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record: SegmentRecord = serde_json::from_str(&line)?;
            if record.bucket == bucket_of(term, record.buckets) && record.term == term {
                found.extend(record.postings);
            }
        }
        Ok(found)
    }

    /// Size of the on-disk file in bytes, zero when it does not exist yet.
    pub fn file_size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Buffered postings as one segment, sorted by bucket then term
    fn encode_segment(&self, buckets: u32) -> Result<Vec<u8>> {
        let mut entries: Vec<(u32, &String, &Vec<Posting>)> = self
            .buffer
            .iter()
            .map(|(term, postings)| (bucket_of(term, buckets), term, postings))
            .collect();
        entries.sort_unstable_by_key(|&(bucket, term, _)| (bucket, term));

        let mut segment = Vec::new();
        for (bucket, term, postings) in entries {
            serde_json::to_writer(
                &mut segment,
                &SegmentEntry {
                    bucket,
                    buckets,
                    term,
                    postings,
                },
            )?;
            segment.push(b'\n');
        }
        Ok(segment)
    }

    /// Append `segment` and sync it. A failed append is cut back off so the
    /// file only ever holds whole segments.
    fn append_segment(&self, segment: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let start = file.metadata()?.len();

        let written = file.write_all(segment).and_then(|()| file.sync_all());
        if let Err(err) = written {
            if let Err(truncate_err) = file.set_len(start) {
                warn!(
                    "Could not truncate {} after a failed flush: {truncate_err}",
                    self.path.display()
                );
            }
            return Err(err.into());
        }
        Ok(())
    }
}

impl IndexStore for BucketIndex {
    fn add(&mut self, term: &str, document_id: u64, service_id: u32, weight: u32) {
        self.buffer.entry(term.to_string()).or_default().push(Posting {
            document_id,
            service_id,
            weight,
        });
        self.buffered += 1;
    }

    fn flush(&mut self) -> Result<u64> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let terms = self.buffer.len();
        let buckets = self.range.bucket_count(terms);
        let segment = self.encode_segment(buckets)?;
        self.append_segment(&segment)?;

        let flushed = self.buffered as u64;
        self.buffer.clear();
        self.buffered = 0;
        debug!(
            "Flushed {flushed} postings for {terms} terms into {buckets} buckets at {}",
            self.path.display()
        );
        Ok(flushed)
    }

    fn pending(&self) -> usize {
        self.buffered
    }
}

// FNV-1a, stable across builds so segments written by one process can be
// read back by another.
fn bucket_of(term: &str, buckets: u32) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in term.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % buckets.max(1)
}
