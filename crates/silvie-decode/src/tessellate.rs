//! Face tessellation.
//!
//! Polygon faces are handed to a [`TessellationEngine`], which reports
//! primitives through a [`TessellationSink`] the same way a GLU-style
//! tessellator does: `begin(mode)`, a run of `vertex(id)` calls, `end()`.
//! [`TriangleAssembler`] turns that event stream back into triangles.
//!
//! Every emitted triangle has its corners reversed relative to the order
//! the engine (or the face, for plain triangles) produced them. The
//! exported winding depends on this.

use glam::{DVec2, DVec3, Vec3};

use crate::error::{DecodeResult, GeometryError};
use crate::scene::{Face, FaceVertex};

/// A triangle of face vertices, already in export winding.
pub type Triangle = [FaceVertex; 3];

/// Primitive kinds an engine may emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrimitiveMode {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Receiver of tessellation events.
pub trait TessellationSink {
    fn begin(&mut self, mode: PrimitiveMode);
    /// `id` is a position in the contour passed to the engine.
    fn vertex(&mut self, id: usize);
    fn end(&mut self);
    fn error(&mut self, error: GeometryError);
}

/// Triangulates one closed contour under the odd winding rule.
///
/// Engines only report interior primitives; boundary-only output is never
/// requested. A successful call covers the polygon with `n - 2` triangles.
pub trait TessellationEngine {
    fn tessellate(&mut self, contour: &[DVec3], sink: &mut dyn TessellationSink);
}

/// Rebuilds triangles from begin/vertex/end events.
#[derive(Debug, Default)]
pub struct TriangleAssembler {
    mode: PrimitiveMode,
    previous: [usize; 2],
    pending: usize,
    odd: bool,
    triangles: Vec<[usize; 3]>,
    error: Option<GeometryError>,
}

impl TriangleAssembler {
    /// Forget everything assembled so far.
    pub fn reset(&mut self) {
        self.pending = 0;
        self.odd = false;
        self.triangles.clear();
        self.error = None;
    }

    /// Triangles assembled since the last reset, in engine order.
    #[must_use]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// The assembled triangles, or the first error the engine reported.
    pub fn finish(&self) -> Result<&[[usize; 3]], GeometryError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(&self.triangles),
        }
    }

    fn emit(&mut self, id: usize) {
        let [p0, p1] = self.previous;
        match self.mode {
            PrimitiveMode::Triangles => {
                self.triangles.push([p0, p1, id]);
                self.pending = 0;
            }
            PrimitiveMode::TriangleStrip => {
                self.triangles
                    .push(if self.odd { [p0, id, p1] } else { [p0, p1, id] });
                self.previous = [p1, id];
                self.odd = !self.odd;
            }
            PrimitiveMode::TriangleFan => {
                self.triangles.push([p0, p1, id]);
                self.previous[1] = id;
            }
        }
    }
}

impl TessellationSink for TriangleAssembler {
    fn begin(&mut self, mode: PrimitiveMode) {
        self.mode = mode;
        self.pending = 0;
        self.odd = false;
    }

    fn vertex(&mut self, id: usize) {
        if self.pending == 2 {
            self.emit(id);
        } else {
            self.previous[self.pending] = id;
            self.pending += 1;
        }
    }

    fn end(&mut self) {
        self.pending = 0;
    }

    fn error(&mut self, error: GeometryError) {
        self.error.get_or_insert(error);
    }
}

/// Turns faces into triangles, reusing its buffers across calls.
#[derive(Debug)]
pub struct Tessellator<E = EarClipper> {
    engine: E,
    contour: Vec<DVec3>,
    assembler: TriangleAssembler,
    triangles: Vec<Triangle>,
}

impl Default for Tessellator<EarClipper> {
    fn default() -> Self {
        Self::new(EarClipper::default())
    }
}

impl<E: TessellationEngine> Tessellator<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            contour: Vec::new(),
            assembler: TriangleAssembler::default(),
            triangles: Vec::new(),
        }
    }

    /// Triangulate `face`, whose vertices index into `positions`.
    ///
    /// Faces with fewer than three vertices yield nothing. Triangles pass
    /// through without touching the engine; larger polygons must come back
    /// as exactly `n - 2` triangles.
    pub fn tessellate_face(
        &mut self,
        face: &Face,
        positions: &[Vec3],
    ) -> DecodeResult<&[Triangle]> {
        self.triangles.clear();
        let vertices = face.vertices.as_slice();
        match vertices {
            [] | [_] | [_, _] => {}
            [a, b, c] => self.triangles.push([*c, *b, *a]),
            _ => {
                self.contour.clear();
                for vertex in vertices {
                    let index = usize::try_from(vertex.position).unwrap_or(usize::MAX);
                    let position = positions
                        .get(index)
                        .ok_or(GeometryError::VertexOutOfRange { index })?;
                    self.contour.push(position.as_dvec3());
                }

                self.assembler.reset();
                self.engine.tessellate(&self.contour, &mut self.assembler);
                let assembled = self.assembler.finish()?;

                let expected = vertices.len() - 2;
                if assembled.len() != expected {
                    return Err(GeometryError::TriangleCount {
                        emitted: assembled.len(),
                        expected,
                    }
                    .into());
                }
                for &[a, b, c] in assembled {
                    let corner = |id: usize| {
                        vertices
                            .get(id)
                            .copied()
                            .ok_or(GeometryError::VertexOutOfRange { index: id })
                    };
                    self.triangles.push([corner(c)?, corner(b)?, corner(a)?]);
                }
            }
        }
        Ok(&self.triangles)
    }
}

/// Ear-clipping tessellation engine.
///
/// The contour is projected onto the plane of its Newell normal. Convex
/// contours come out as a single fan; anything else is clipped ear by ear
/// and emitted as independent triangles. Orientation follows the input.
#[derive(Debug, Default)]
pub struct EarClipper {
    projected: Vec<DVec2>,
    remaining: Vec<usize>,
}

impl TessellationEngine for EarClipper {
    fn tessellate(&mut self, contour: &[DVec3], sink: &mut dyn TessellationSink) {
        if let Err(error) = self.triangulate(contour, sink) {
            sink.error(error);
        }
    }
}

impl EarClipper {
    fn triangulate(
        &mut self,
        contour: &[DVec3],
        sink: &mut dyn TessellationSink,
    ) -> Result<(), GeometryError> {
        let n = contour.len();
        if n < 3 {
            return Err(GeometryError::Degenerate);
        }

        let normal = newell_normal(contour);
        let abs = normal.abs();
        self.projected.clear();
        self.projected.extend(contour.iter().map(|p| {
            if abs.x >= abs.y && abs.x >= abs.z {
                DVec2::new(p.y, p.z)
            } else if abs.y >= abs.z {
                DVec2::new(p.z, p.x)
            } else {
                DVec2::new(p.x, p.y)
            }
        }));

        let (min, max) = self
            .projected
            .iter()
            .fold((DVec2::MAX, DVec2::MIN), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        let extent = (max - min).max_element();
        if !extent.is_finite() || extent <= 0.0 {
            return Err(GeometryError::Degenerate);
        }
        let tolerance = extent * extent * 1e-12;

        let area = signed_area(&self.projected);
        if area.abs() <= tolerance {
            return Err(GeometryError::Degenerate);
        }
        let orientation = area.signum();

        if is_convex(&self.projected, orientation, tolerance) {
            sink.begin(PrimitiveMode::TriangleFan);
            for id in 0..n {
                sink.vertex(id);
            }
            sink.end();
            return Ok(());
        }

        if is_self_intersecting(&self.projected) {
            return Err(GeometryError::SelfIntersecting);
        }

        self.remaining.clear();
        self.remaining.extend(0..n);
        sink.begin(PrimitiveMode::Triangles);
        while self.remaining.len() > 3 {
            let ear = self
                .find_ear(orientation, tolerance, false)
                .or_else(|| self.find_ear(orientation, tolerance, true))
                .ok_or(GeometryError::NoEar)?;
            let m = self.remaining.len();
            sink.vertex(self.remaining[(ear + m - 1) % m]);
            sink.vertex(self.remaining[ear]);
            sink.vertex(self.remaining[(ear + 1) % m]);
            self.remaining.remove(ear);
        }
        for &id in &self.remaining {
            sink.vertex(id);
        }
        sink.end();
        Ok(())
    }

    /// Position in `remaining` of a clippable ear tip. With `allow_flat`,
    /// collinear tips are accepted as a last resort.
    fn find_ear(&self, orientation: f64, tolerance: f64, allow_flat: bool) -> Option<usize> {
        let m = self.remaining.len();
        (0..m).find(|&i| {
            let ids = [
                self.remaining[(i + m - 1) % m],
                self.remaining[i],
                self.remaining[(i + 1) % m],
            ];
            let [a, b, c] = ids.map(|id| self.projected[id]);
            let turn = cross(b - a, c - b) * orientation;
            let convex = if allow_flat {
                turn >= -tolerance
            } else {
                turn > tolerance
            };
            convex
                && !self.remaining.iter().any(|&id| {
                    !ids.contains(&id)
                        && inside_triangle(self.projected[id], [a, b, c], orientation)
                })
        })
    }
}

fn newell_normal(points: &[DVec3]) -> DVec3 {
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .fold(DVec3::ZERO, |normal, (a, b)| {
            normal
                + DVec3::new(
                    (a.y - b.y) * (a.z + b.z),
                    (a.z - b.z) * (a.x + b.x),
                    (a.x - b.x) * (a.y + b.y),
                )
        })
}

fn cross(a: DVec2, b: DVec2) -> f64 {
    a.x * b.y - a.y * b.x
}

fn signed_area(points: &[DVec2]) -> f64 {
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| cross(*a, *b))
        .sum::<f64>()
        / 2.0
}

/// Every turn goes the same way and the boundary winds exactly once.
fn is_convex(points: &[DVec2], orientation: f64, tolerance: f64) -> bool {
    let n = points.len();
    let mut winding = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let (ab, bc) = (b - a, c - b);
        let turn = cross(ab, bc) * orientation;
        if turn < -tolerance {
            return false;
        }
        winding += cross(ab, bc).atan2(ab.dot(bc));
    }
    (winding.abs() - std::f64::consts::TAU).abs() < 0.5
}

fn is_self_intersecting(points: &[DVec2]) -> bool {
    let n = points.len();
    let edge = |i: usize| (points[i], points[(i + 1) % n]);
    (0..n).any(|i| {
        (i + 2..n).any(|j| {
            // Edges sharing a vertex are adjacent, not crossing.
            if i == 0 && j == n - 1 {
                return false;
            }
            let (a, b) = edge(i);
            let (c, d) = edge(j);
            let d1 = cross(b - a, c - a);
            let d2 = cross(b - a, d - a);
            let d3 = cross(d - c, a - c);
            let d4 = cross(d - c, b - c);
            d1 * d2 < 0.0 && d3 * d4 < 0.0
        })
    })
}

fn inside_triangle(p: DVec2, [a, b, c]: [DVec2; 3], orientation: f64) -> bool {
    cross(b - a, p - a) * orientation >= 0.0
        && cross(c - b, p - b) * orientation >= 0.0
        && cross(a - c, p - c) * orientation >= 0.0
}
