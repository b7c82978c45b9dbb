use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng as _;
use rand::seq::SliceRandom as _;

use crate::error::{Error, Result};

/// One seed record: ordered `(field, value)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeederRecord {
    fields: Arc<[(Arc<str>, Arc<str>)]>,
}

impl FeederRecord {
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Arc<str>>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_ref() == field)
            .map(|(_, v)| v.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Arc<str>)> + '_ {
        self.fields.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum FeederStrategy {
    /// Wraps around; never exhausts.
    #[default]
    Circular,
    /// Each record once, in source order.
    Once,
    /// Uniformly random record per draw; never exhausts.
    Random,
    /// Each record once, in a random order fixed at construction.
    Shuffle,
}

/// Thread-safe record source shared by every virtual user of a run.
#[derive(Debug)]
pub struct Feeder {
    records: Arc<[FeederRecord]>,
    strategy: FeederStrategy,
    order: Option<Arc<[usize]>>,
    cursor: AtomicU64,
}

impl Feeder {
    pub fn from_records(strategy: FeederStrategy, records: Vec<FeederRecord>) -> Self {
        let order = (strategy == FeederStrategy::Shuffle).then(|| {
            let mut idx: Vec<usize> = (0..records.len()).collect();
            idx.shuffle(&mut rand::rng());
            Arc::from(idx)
        });

        Self {
            records: records.into(),
            strategy,
            order,
            cursor: AtomicU64::new(0),
        }
    }

    /// Reads CSV with a header row naming the fields.
    pub fn from_csv_reader<R: io::Read>(strategy: FeederStrategy, reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<Arc<str>> = rdr.headers()?.iter().map(Arc::from).collect();
        let mut records = Vec::new();
        for row in rdr.records() {
            let row = row?;
            records.push(FeederRecord::new(
                headers.iter().cloned().zip(row.iter().map(Arc::<str>::from)),
            ));
        }

        Ok(Self::from_records(strategy, records))
    }

    pub fn from_csv_path(strategy: FeederStrategy, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| Error::FeederIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(strategy, io::BufReader::new(file))
    }

    pub fn strategy(&self) -> FeederStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Draws the next record; `None` means the source is exhausted (or empty).
    pub fn next(&self) -> Option<FeederRecord> {
        let n = self.records.len();
        if n == 0 {
            return None;
        }

        let idx = match self.strategy {
            FeederStrategy::Circular => {
                let i = self.cursor.fetch_add(1, Ordering::Relaxed);
                (i % n as u64) as usize
            }
            FeederStrategy::Once => self.claim_once(n)?,
            FeederStrategy::Shuffle => {
                let i = self.claim_once(n)?;
                *self.order.as_ref()?.get(i)?
            }
            FeederStrategy::Random => random_index(n),
        };

        self.records.get(idx).cloned()
    }

    fn claim_once(&self, n: usize) -> Option<usize> {
        // Saturate instead of wrapping so an exhausted feeder stays exhausted.
        let i = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < n as u64).then_some(c + 1)
            })
            .ok()?;
        Some(i as usize)
    }
}

fn random_index(n: usize) -> usize {
    rand::rng().random_range(0..n)
}
