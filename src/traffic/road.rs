//! Road network model
//!
//! Immutable array of cubic Bezier segments. Each segment carries three lanes,
//! a speed range, an occupancy slot count and up to two outgoing links. The
//! network is validated once at load time and read-only afterwards.

use serde::{Deserialize, Serialize};

use crate::traffic::constants::grid::{LANES, SLOTS_PER_SEGMENT};
use crate::traffic::constants::half_length_in_curve_units;
use crate::traffic::constants::road::DEFAULT_VEHICLE_LENGTH;
use crate::util::vec3::Vec3;

/// Link value meaning "no successor"
pub const NO_LINK: i32 = -1;

/// Errors found while validating a segment table
#[derive(Debug, thiserror::Error)]
pub enum RoadError {
    #[error("segment {segment}: link {link} outside network of {len} segments")]
    LinkOutOfRange { segment: usize, link: i32, len: usize },
    #[error("segment {segment}: occupation limit {limit} not in 1..=16")]
    BadOccupationLimit { segment: usize, limit: usize },
    #[error("segment {segment}: arc length must be positive")]
    NonPositiveArcLength { segment: usize },
    #[error("segment {segment}: speed range {min}..{max} is inverted or negative")]
    BadSpeedRange { segment: usize, min: f32, max: f32 },
    #[error("segment {segment}: extra-link chance {chance} not in 0..=1")]
    BadExtraChance { segment: usize, chance: f32 },
    #[error("failed to parse road network: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lane and speed parameters shared by segments built from control points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    pub width: f32,
    pub height: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub occupation_limit: usize,
    pub vehicle_length: f32,
}

impl Default for SegmentProfile {
    fn default() -> Self {
        Self {
            width: 3.5,
            height: 0.0,
            min_speed: 8.0,
            max_speed: 16.0,
            occupation_limit: SLOTS_PER_SEGMENT,
            vehicle_length: DEFAULT_VEHICLE_LENGTH,
        }
    }
}

/// Spline evaluation at one curve parameter
#[derive(Debug, Clone, Copy)]
pub struct CurveSample {
    pub position: Vec3,
    /// First derivative divided by arc length (unit length on a uniform curve)
    pub tangent: Vec3,
    /// Second derivative divided by arc length squared
    pub curvature: Vec3,
}

/// One cubic stretch of road
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSegment {
    pub p0: Vec3,
    pub p1: Vec3,
    pub p2: Vec3,
    pub p3: Vec3,
    pub arc_length: f32,
    /// Lateral spacing between lane centres
    pub width: f32,
    /// Vertical offset of the lane group above the spline
    pub height: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Number of occupancy slots actually used (at most 16)
    pub occupation_limit: usize,
    /// Half a vehicle length in curve-parameter units
    pub vehicle_half_len: f32,
    pub link_next: i32,
    pub link_extra: i32,
    pub link_extra_chance: f32,
}

impl RoadSegment {
    /// Build a segment from Bezier control points, measuring arc length with
    /// a polyline of `path_segments` pieces
    pub fn bezier(points: [Vec3; 4], profile: &SegmentProfile, path_segments: usize) -> Self {
        let [p0, p1, p2, p3] = points;
        let arc_length = measure_arc_length(&points, path_segments);
        Self {
            p0,
            p1,
            p2,
            p3,
            arc_length,
            width: profile.width,
            height: profile.height,
            min_speed: profile.min_speed,
            max_speed: profile.max_speed,
            occupation_limit: profile.occupation_limit,
            vehicle_half_len: half_length_in_curve_units(profile.vehicle_length, arc_length),
            link_next: NO_LINK,
            link_extra: NO_LINK,
            link_extra_chance: 0.0,
        }
    }

    /// Build the segment running from `points[1]` to `points[2]` of a
    /// Catmull-Rom spline
    pub fn catmull_rom(points: [Vec3; 4], profile: &SegmentProfile, path_segments: usize) -> Self {
        let [a, b, c, d] = points;
        let bezier = [b, b + (c - a) * (1.0 / 6.0), c - (d - b) * (1.0 / 6.0), c];
        Self::bezier(bezier, profile, path_segments)
    }

    /// Straight segment between two points
    pub fn straight(start: Vec3, end: Vec3, profile: &SegmentProfile, path_segments: usize) -> Self {
        let third = (end - start) * (1.0 / 3.0);
        Self::bezier([start, start + third, end - third, end], profile, path_segments)
    }

    pub fn with_next(mut self, next: usize) -> Self {
        self.link_next = next as i32;
        self
    }

    pub fn with_extra(mut self, extra: usize, chance: f32) -> Self {
        self.link_extra = extra as i32;
        self.link_extra_chance = chance;
        self
    }

    #[inline]
    pub fn next(&self) -> Option<usize> {
        usize::try_from(self.link_next).ok()
    }

    #[inline]
    pub fn extra(&self) -> Option<usize> {
        usize::try_from(self.link_extra).ok()
    }

    #[inline]
    pub fn position(&self, t: f32) -> Vec3 {
        let u = 1.0 - t;
        self.p0 * (u * u * u)
            + self.p1 * (3.0 * u * u * t)
            + self.p2 * (3.0 * u * t * t)
            + self.p3 * (t * t * t)
    }

    /// Evaluate position, tangent and curvature at `t`
    pub fn sample(&self, t: f32) -> CurveSample {
        let u = 1.0 - t;
        let d1 = (self.p1 - self.p0) * (3.0 * u * u)
            + (self.p2 - self.p1) * (6.0 * u * t)
            + (self.p3 - self.p2) * (3.0 * t * t);
        let d2 = (self.p2 - self.p1 * 2.0 + self.p0) * (6.0 * u)
            + (self.p3 - self.p2 * 2.0 + self.p1) * (6.0 * t);
        let inv_len = if self.arc_length > 0.0 { 1.0 / self.arc_length } else { 0.0 };
        CurveSample {
            position: self.position(t),
            tangent: d1 * inv_len,
            curvature: d2 * (inv_len * inv_len),
        }
    }

    /// Lateral offset of `lane` from the spline, given the local right vector
    #[inline]
    pub fn lane_offset(&self, lane: usize, right: Vec3) -> Vec3 {
        let lane = lane.min(LANES - 1) as f32;
        right * ((lane - 1.0) * self.width) + Vec3::UP * self.height
    }

    /// Occupancy slot covering curve parameter `t`, clamped to the segment
    #[inline]
    pub fn slot_at(&self, t: f32) -> usize {
        let limit = self.occupation_limit.max(1);
        let slot = (t * limit as f32).floor();
        if slot <= 0.0 {
            0
        } else {
            (slot as usize).min(limit - 1)
        }
    }
}

/// Local right vector for a tangent direction
#[inline]
pub fn right_vector(tangent: Vec3) -> Vec3 {
    Vec3::UP.cross(tangent).normalize_or(Vec3::RIGHT)
}

fn measure_arc_length(points: &[Vec3; 4], path_segments: usize) -> f32 {
    let [p0, p1, p2, p3] = *points;
    let steps = path_segments.max(1);
    let eval = |t: f32| {
        let u = 1.0 - t;
        p0 * (u * u * u) + p1 * (3.0 * u * u * t) + p2 * (3.0 * u * t * t) + p3 * (t * t * t)
    };
    let mut length = 0.0;
    let mut prev = p0;
    for i in 1..=steps {
        let p = eval(i as f32 / steps as f32);
        length += prev.distance_to(p);
        prev = p;
    }
    length
}

/// Closed loop layout used by demos, tests and benchmarks
#[derive(Debug, Clone, Copy)]
pub struct RingLayout {
    pub segments: usize,
    pub radius: f32,
    /// Add an off-ramp after every n-th ring segment (0 disables ramps)
    pub ramp_every: usize,
    pub ramp_chance: f32,
    pub ramp_length: f32,
}

impl Default for RingLayout {
    fn default() -> Self {
        Self {
            segments: 32,
            radius: 400.0,
            ramp_every: 4,
            ramp_chance: 0.25,
            ramp_length: 60.0,
        }
    }
}

/// Validated, read-only segment table
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    segments: Vec<RoadSegment>,
}

impl RoadNetwork {
    /// Validate and wrap a segment table
    pub fn new(segments: Vec<RoadSegment>) -> Result<Self, RoadError> {
        let len = segments.len();
        for (i, seg) in segments.iter().enumerate() {
            if seg.occupation_limit == 0 || seg.occupation_limit > SLOTS_PER_SEGMENT {
                return Err(RoadError::BadOccupationLimit { segment: i, limit: seg.occupation_limit });
            }
            if !(seg.arc_length.is_finite() && seg.arc_length > 0.0) {
                return Err(RoadError::NonPositiveArcLength { segment: i });
            }
            if !(seg.min_speed >= 0.0 && seg.min_speed <= seg.max_speed) {
                return Err(RoadError::BadSpeedRange { segment: i, min: seg.min_speed, max: seg.max_speed });
            }
            if !(0.0..=1.0).contains(&seg.link_extra_chance) {
                return Err(RoadError::BadExtraChance { segment: i, chance: seg.link_extra_chance });
            }
            for link in [seg.link_next, seg.link_extra] {
                if link != NO_LINK && (link < 0 || link as usize >= len) {
                    return Err(RoadError::LinkOutOfRange { segment: i, link, len });
                }
            }
        }
        Ok(Self { segments })
    }

    /// Load a baked segment table from JSON
    pub fn from_json(json: &str) -> Result<Self, RoadError> {
        let segments: Vec<RoadSegment> = serde_json::from_str(json)?;
        Self::new(segments)
    }

    /// Build a closed loop in the XZ plane, optionally with terminal off-ramps
    pub fn ring(layout: RingLayout, profile: &SegmentProfile, path_segments: usize) -> Result<Self, RoadError> {
        let n = layout.segments.max(1);
        let step = std::f32::consts::TAU / n as f32;
        // Control-point distance for a circular arc approximation
        let k = 4.0 / 3.0 * (step / 4.0).tan() * layout.radius;
        let point = |a: f32| Vec3::new(a.cos(), 0.0, a.sin()) * layout.radius;
        let tangent = |a: f32| Vec3::new(-a.sin(), 0.0, a.cos());

        let mut segments = Vec::with_capacity(n + n / layout.ramp_every.max(1));
        for i in 0..n {
            let (a0, a1) = (i as f32 * step, (i + 1) as f32 * step);
            let (s, e) = (point(a0), point(a1));
            let seg = RoadSegment::bezier(
                [s, s + tangent(a0) * k, e - tangent(a1) * k, e],
                profile,
                path_segments,
            );
            segments.push(seg.with_next((i + 1) % n));
        }

        if layout.ramp_every > 0 {
            for i in (0..n).step_by(layout.ramp_every) {
                let a = (i + 1) as f32 * step;
                let start = point(a);
                let outward = Vec3::new(a.cos(), 0.0, a.sin());
                let end = start + (tangent(a) + outward).normalize() * layout.ramp_length;
                let ramp_index = segments.len() as i32;
                segments.push(RoadSegment::straight(start, end, profile, path_segments));
                segments[i].link_extra = ramp_index;
                segments[i].link_extra_chance = layout.ramp_chance;
            }
        }

        Self::new(segments)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&RoadSegment> {
        self.segments.get(index)
    }

    #[inline]
    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }
}

impl std::ops::Index<usize> for RoadNetwork {
    type Output = RoadSegment;

    fn index(&self, index: usize) -> &RoadSegment {
        &self.segments[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_x(length: f32) -> RoadSegment {
        RoadSegment::straight(Vec3::ZERO, Vec3::new(length, 0.0, 0.0), &SegmentProfile::default(), 32)
    }

    #[test]
    fn test_straight_arc_length() {
        let seg = straight_x(100.0);
        assert!((seg.arc_length - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_straight_tangent_is_unit() {
        let seg = straight_x(50.0);
        for t in [0.0, 0.25, 0.5, 0.9] {
            let s = seg.sample(t);
            assert!((s.tangent.length() - 1.0).abs() < 1e-4);
            assert!(s.curvature.length() < 1e-4);
        }
    }

    #[test]
    fn test_endpoints() {
        let seg = straight_x(10.0);
        assert!(seg.position(0.0).approx_eq(Vec3::ZERO, 1e-5));
        assert!(seg.position(1.0).approx_eq(Vec3::new(10.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_catmull_rom_passes_through_inner_points() {
        let pts = [
            Vec3::new(-10.0, 0.0, 0.0),
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 5.0),
            Vec3::new(20.0, 0.0, 5.0),
        ];
        let seg = RoadSegment::catmull_rom(pts, &SegmentProfile::default(), 64);
        assert!(seg.position(0.0).approx_eq(pts[1], 1e-5));
        assert!(seg.position(1.0).approx_eq(pts[2], 1e-5));
    }

    #[test]
    fn test_lane_offsets() {
        let seg = straight_x(10.0);
        let right = right_vector(seg.sample(0.5).tangent);
        // Travelling along +x with y up, right is -z
        assert!(right.approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
        assert!(seg.lane_offset(1, right).approx_eq(Vec3::ZERO, 1e-5));
        assert!(seg.lane_offset(0, right).approx_eq(right * -seg.width, 1e-5));
        // Out-of-range lanes clamp to the outer lane
        assert_eq!(seg.lane_offset(7, right), seg.lane_offset(2, right));
    }

    #[test]
    fn test_slot_at_clamps() {
        let seg = straight_x(10.0);
        assert_eq!(seg.slot_at(-0.5), 0);
        assert_eq!(seg.slot_at(0.0), 0);
        assert_eq!(seg.slot_at(0.5), 8);
        assert_eq!(seg.slot_at(1.0), 15);
        assert_eq!(seg.slot_at(3.0), 15);
    }

    #[test]
    fn test_links() {
        let seg = straight_x(10.0);
        assert_eq!(seg.next(), None);
        let seg = seg.with_next(3).with_extra(4, 0.5);
        assert_eq!(seg.next(), Some(3));
        assert_eq!(seg.extra(), Some(4));
    }

    #[test]
    fn test_network_rejects_bad_link() {
        let seg = straight_x(10.0).with_next(5);
        assert!(matches!(
            RoadNetwork::new(vec![seg]),
            Err(RoadError::LinkOutOfRange { segment: 0, link: 5, len: 1 })
        ));
    }

    #[test]
    fn test_network_rejects_oversized_grid() {
        let mut seg = straight_x(10.0);
        seg.occupation_limit = 17;
        assert!(matches!(RoadNetwork::new(vec![seg]), Err(RoadError::BadOccupationLimit { .. })));
    }

    #[test]
    fn test_network_rejects_inverted_speed() {
        let mut seg = straight_x(10.0);
        seg.min_speed = 20.0;
        seg.max_speed = 10.0;
        assert!(matches!(RoadNetwork::new(vec![seg]), Err(RoadError::BadSpeedRange { .. })));
    }

    #[test]
    fn test_empty_network_is_valid() {
        let network = RoadNetwork::new(Vec::new()).unwrap();
        assert!(network.is_empty());
    }

    #[test]
    fn test_ring_is_closed() {
        let layout = RingLayout { segments: 8, radius: 100.0, ramp_every: 0, ..Default::default() };
        let network = RoadNetwork::ring(layout, &SegmentProfile::default(), 32).unwrap();
        assert_eq!(network.len(), 8);
        for i in 0..8 {
            let next = network[i].next().unwrap();
            assert_eq!(next, (i + 1) % 8);
            assert!(network[i].p3.approx_eq(network[next].p0, 1e-3));
        }
        // Arc approximation: each piece is close to r * angle
        let expected = 100.0 * std::f32::consts::TAU / 8.0;
        assert!((network[0].arc_length - expected).abs() < 0.5);
    }

    #[test]
    fn test_ring_ramps_are_terminal_branches() {
        let layout = RingLayout { segments: 8, radius: 100.0, ramp_every: 4, ramp_chance: 0.3, ramp_length: 20.0 };
        let network = RoadNetwork::ring(layout, &SegmentProfile::default(), 32).unwrap();
        assert_eq!(network.len(), 10);
        let ramp = network[0].extra().unwrap();
        assert_eq!(network[0].next(), Some(1));
        assert!((network[0].link_extra_chance - 0.3).abs() < 1e-6);
        assert_eq!(network[ramp].next(), None);
        assert!(network[ramp].p0.approx_eq(network[0].p3, 1e-3));
    }

    #[test]
    fn test_json_round_trip() {
        let seg = straight_x(25.0);
        let json = serde_json::to_string(&vec![seg.clone()]).unwrap();
        let network = RoadNetwork::from_json(&json).unwrap();
        assert_eq!(network[0], seg);
        assert!(matches!(RoadNetwork::from_json("not json"), Err(RoadError::Json(_))));
    }
}
