//! 3-D rendering of loop-order sweeps.
//!
//! Reads a [`SurfaceSet`] and draws every series as a surface over the `(M, N)` grid, miss
//! rate as height, all in one figure with a shared legend. Rendering relies on the
//! [`plotters`][1] crate with its SVG backend.
//!
//! A surface is made of one quadrilateral per grid cell. Cells with an unmeasured corner, such
//! as a failed sweep point, are left as holes rather than drawn at some made-up height.
//!
//! [1]: https://crates.io/crates/plotters

use crate::{
    error::{Result, SweepError},
    report::{SurfacePoint, SurfaceSet},
};

use plotters::prelude::*;

use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{stdin, BufReader, Read},
    path::Path,
};

/// Figure dimensions in pixels.
const FIGURE_SIZE: (u32, u32) = (1280, 960);

/// Loads a surface set from `input`, or from `stdin` when unspecified.
pub fn load(input: Option<&Path>) -> Result<SurfaceSet> {
    let reader: Box<dyn Read> = match input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(stdin().lock()),
    };
    Ok(serde_json::from_reader(reader)?)
}

/// Sorted, deduplicated axis values and a height lookup for one series.
struct Grid {
    ms: Vec<usize>,
    ns: Vec<usize>,
    heights: HashMap<(usize, usize), f64>,
}

/// Corners of one surface cell, as `(m, ratio, n)` chart coordinates.
type Quad = Vec<(f64, f64, f64)>;

impl Grid {
    fn new(points: &[SurfacePoint]) -> Self {
        let ms: BTreeSet<usize> = points.iter().map(|p| p.0).collect();
        let ns: BTreeSet<usize> = points.iter().map(|p| p.1).collect();
        Self {
            ms: ms.into_iter().collect(),
            ns: ns.into_iter().collect(),
            heights: points.iter().map(|p| ((p.0, p.1), p.2)).collect(),
        }
    }

    fn height(&self, m: usize, n: usize) -> Option<f64> {
        self.heights.get(&(m, n)).copied()
    }

    /// `(m, n)` pairs of the grid that have no measurement.
    fn missing(&self) -> Vec<(usize, usize)> {
        self.ms
            .iter()
            .flat_map(|&m| self.ns.iter().map(move |&n| (m, n)))
            .filter(|&(m, n)| self.height(m, n).is_none())
            .collect()
    }

    /// Cells whose four corners were all measured.
    fn quads(&self) -> Vec<Quad> {
        let mut quads = Vec::new();
        for ms in self.ms.windows(2) {
            for ns in self.ns.windows(2) {
                let corners = [(ms[0], ns[0]), (ms[1], ns[0]), (ms[1], ns[1]), (ms[0], ns[1])];
                let quad: Option<Quad> = corners
                    .iter()
                    .map(|&(m, n)| self.height(m, n).map(|r| (m as f64, r, n as f64)))
                    .collect();
                if let Some(quad) = quad {
                    quads.push(quad);
                }
            }
        }
        quads
    }
}

/// Axis bounds `(m, n, ratio)` covering every series, never degenerate.
fn bounds(set: &SurfaceSet) -> ((f64, f64), (f64, f64), (f64, f64)) {
    let points = set.iter().flat_map(|(_, points)| points.iter());
    let (mut m, mut n, mut r) = (
        (f64::INFINITY, f64::NEG_INFINITY),
        (f64::INFINITY, f64::NEG_INFINITY),
        (0.0_f64, f64::NEG_INFINITY),
    );
    for p in points {
        m = (m.0.min(p.0 as f64), m.1.max(p.0 as f64));
        n = (n.0.min(p.1 as f64), n.1.max(p.1 as f64));
        r = (r.0.min(p.2), r.1.max(p.2));
    }

    let widen = |(lo, hi): (f64, f64), fallback: f64| {
        if !lo.is_finite() || !hi.is_finite() {
            (0.0, fallback)
        } else if hi <= lo {
            (lo, lo + fallback)
        } else {
            (lo, hi)
        }
    };
    (widen(m, 1.0), widen(n, 1.0), widen(r, 1.0))
}

fn plot_err<E: std::fmt::Display>(e: E) -> SweepError {
    SweepError::Plot(e.to_string())
}

/// Renders every series of `set` as a 3-D surface into an SVG file at `output`.
pub fn render(set: &SurfaceSet, output: &Path) -> Result<()> {
    let root = SVGBackend::new(output, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let ((m_lo, m_hi), (n_lo, n_hi), (r_lo, r_hi)) = bounds(set);
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("D1 miss rate by loop order (x: M, z: N)", ("sans-serif", 30))
        .build_cartesian_3d(m_lo..m_hi, r_lo..r_hi, n_lo..n_hi)
        .map_err(plot_err)?;

    chart.with_projection(|mut pb| {
        pb.yaw = 0.5;
        pb.scale = 0.9;
        pb.into_matrix()
    });

    chart
        .configure_axes()
        .light_grid_style(BLACK.mix(0.15))
        .max_light_lines(3)
        .draw()
        .map_err(plot_err)?;

    for (idx, (name, points)) in set.iter().enumerate() {
        if points.is_empty() {
            log::warn!("series {name} has no points, skipping");
            continue;
        }
        let grid = Grid::new(points);
        let missing = grid.missing();
        if !missing.is_empty() {
            log::warn!(
                "series {name}: {} unmeasured (M, N) points left blank: {missing:?}",
                missing.len()
            );
        }
        let color = Palette99::pick(idx).mix(0.5);

        chart
            .draw_series(
                grid.quads()
                    .into_iter()
                    .map(|quad| Polygon::new(quad, color.filled())),
            )
            .map_err(plot_err)?
            .label(name.as_str())
            .legend(move |(x, y)| {
                Rectangle::new([(x + 5, y - 5), (x + 15, y + 5)], color.filled())
            });
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    log::info!("wrote {} series to {}", set.len(), output.display());
    Ok(())
}
