//! Sweep result sets and their serialization.
//!
//! Two shapes are persisted, both as JSON objects whose keys keep sweep order:
//! - one-dimensional sweeps map the swept value to a miss ratio: `{"256": 0.12, "512": 0.07}`;
//! - loop-order sweeps map an order name to `[M, N, ratio]` triples:
//!   `{"IJK": [[8, 8, 0.03], [8, 16, 0.05]]}`.
//!
//! One-dimensional sweeps may also be written as `key,value` CSV lines.

use crate::error::Result;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use statistical::{mean, standard_deviation};

use std::{
    fmt,
    fs::OpenOptions,
    io::{stdout, Write},
    marker::PhantomData,
    path::Path,
};

/// Ordered key-value records, serialized as a JSON object.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyed<K, V>(pub Vec<(K, V)>);

impl<K, V> Default for Keyed<K, V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K, V> Keyed<K, V> {
    pub fn push(&mut self, key: K, value: V) {
        self.0.push((key, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Keyed<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K: Serialize, V: Serialize> Serialize for Keyed<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct KeyedVisitor<K, V>(PhantomData<(K, V)>);

impl<'de, K: Deserialize<'de>, V: Deserialize<'de>> Visitor<'de> for KeyedVisitor<K, V> {
    type Value = Keyed<K, V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of sweep results")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry()? {
            entries.push(entry);
        }
        Ok(Keyed(entries))
    }
}

impl<'de, K: Deserialize<'de>, V: Deserialize<'de>> Deserialize<'de> for Keyed<K, V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(KeyedVisitor(PhantomData))
    }
}

/// One point of a loop-order surface, serialized as `[m, n, ratio]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfacePoint(pub usize, pub usize, pub f64);

/// Result of a one-dimensional sweep: swept value to miss ratio.
pub type LineSet = Keyed<usize, f64>;

/// Result of a loop-order sweep: order name to surface points.
pub type SurfaceSet = Keyed<String, Vec<SurfacePoint>>;

/// Output encoding of a one-dimensional sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Writes `key,value` lines.
pub fn write_csv(output: &mut dyn Write, results: &LineSet) -> Result<()> {
    for (key, ratio) in results.iter() {
        writeln!(output, "{key},{ratio}")?;
    }
    Ok(())
}

/// Writes `value` as a single line of JSON.
pub fn write_json<T: Serialize>(output: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *output, value)?;
    writeln!(output)?;
    Ok(())
}

/// Opens the output file, truncating it, or falls back to `stdout`.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(name) => Box::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(name)?,
        ),
        None => Box::new(stdout()),
    })
}

/// Summary statistics of one series of miss ratios.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesSummary {
    /// Series label: loop order name or swept parameter.
    name: String,
    /// Number of successful points.
    points: usize,
    /// Number of failed points.
    failures: usize,
    min: f64,
    max: f64,
    avg: f64,
    stddev: f64,
}

impl SeriesSummary {
    pub fn new(name: impl Into<String>, ratios: &[f64], failures: usize) -> Self {
        let min = ratios.iter().copied().fold(f64::INFINITY, f64::min);
        let max = ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (avg, stddev) = match ratios.len() {
            0 => (0.0, 0.0),
            1 => (ratios[0], 0.0),
            _ => {
                let avg = mean(ratios);
                (avg, standard_deviation(ratios, Some(avg)))
            }
        };

        Self {
            name: name.into(),
            points: ratios.len(),
            failures,
            min: if ratios.is_empty() { 0.0 } else { min },
            max: if ratios.is_empty() { 0.0 } else { max },
            avg,
            stddev,
        }
    }
}

impl fmt::Display for SeriesSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} points ({} failed), miss rate min {:.6} avg {:.6} max {:.6} stddev {:.6}",
            self.name, self.points, self.failures, self.min, self.avg, self.max, self.stddev,
        )
    }
}
