use std::collections::{BTreeMap, HashMap};

use geo::{AffineOps, BooleanOps, Contains};
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};
use geojson::JsonObject;
use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::types::{Affine, Feature, LabeledRaster};

/// Pixel-corner lattice point, `(col, row)`.
type Vertex = (i64, i64);

/// Convert every 4-connected run of equal label values into a polygon feature.
///
/// Pixels equal to `ignore_label` never produce output. Each feature carries
/// its label value under `id`; geometries are mapped through `transform` and
/// then [repaired](repair).
pub fn vectorize(labels: &LabeledRaster, transform: &Affine, ignore_label: u32) -> Vec<Feature> {
    let regions = connected_components(labels, Connectivity::Four, Luma([ignore_label]));
    let region_count = regions.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    if region_count == 0 {
        return Vec::new();
    }

    let mut values = vec![0u32; region_count + 1];
    let mut edges: Vec<BTreeMap<Vertex, Vec<Vertex>>> = vec![BTreeMap::new(); region_count + 1];
    let (width, height) = regions.dimensions();
    let region_at = |x: i64, y: i64| -> u32 {
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            0
        } else {
            regions.get_pixel(x as u32, y as u32).0[0]
        }
    };

    // Directed boundary edges keep the region on the right (rows grow downwards).
    for (x, y, region) in regions.enumerate_pixels() {
        let region = region.0[0];
        if region == 0 {
            continue;
        }
        values[region as usize] = labels.get_pixel(x, y).0[0];
        let (x, y) = (x as i64, y as i64);
        let out = &mut edges[region as usize];
        if region_at(x, y - 1) != region {
            out.entry((x, y)).or_default().push((x + 1, y));
        }
        if region_at(x + 1, y) != region {
            out.entry((x + 1, y)).or_default().push((x + 1, y + 1));
        }
        if region_at(x, y + 1) != region {
            out.entry((x + 1, y + 1)).or_default().push((x, y + 1));
        }
        if region_at(x - 1, y) != region {
            out.entry((x, y + 1)).or_default().push((x, y));
        }
    }

    let geo_transform = transform.to_geo();
    let mut features = Vec::with_capacity(region_count);
    for (region, outgoing) in edges.into_iter().enumerate().skip(1) {
        let pixel_polygons = assemble_polygons(trace_rings(outgoing));
        let mapped = pixel_polygons.affine_transform(&geo_transform);
        let repaired = repair(&mapped);
        if repaired.0.is_empty() {
            tracing::debug!(region, "region collapsed to an empty geometry, skipping");
            continue;
        }

        let mut properties = JsonObject::new();
        properties.insert("id".to_string(), serde_json::Value::from(values[region]));
        features.push(Feature::from_polygons(repaired, properties));
    }
    features
}

/// Make a polygonal geometry valid by unioning it with nothing.
///
/// Touching rings and inverted holes are rebuilt into a valid
/// exterior/interior layout; valid input comes back unchanged up to ring
/// orientation and start point.
pub fn repair(polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    polygons.union(&MultiPolygon::new(Vec::new()))
}

/// Walk the boundary edges of one region into closed rings with no repeated vertex.
fn trace_rings(mut outgoing: BTreeMap<Vertex, Vec<Vertex>>) -> Vec<Vec<Vertex>> {
    let mut rings = Vec::new();

    loop {
        let Some(start) = outgoing
            .iter()
            .find(|(_, targets)| !targets.is_empty())
            .map(|(vertex, _)| *vertex)
        else {
            break;
        };

        let mut walk = vec![start];
        let mut current = start;
        let mut heading: Option<Vertex> = None;
        while let Some(targets) = outgoing.get_mut(&current).filter(|t| !t.is_empty()) {
            // Where two edges leave one corner the region touches itself
            // diagonally; turning right hugs the pixel we are walking around.
            let index = match heading {
                Some((dx, dy)) if targets.len() > 1 => targets
                    .iter()
                    .position(|&(tx, ty)| (tx - current.0, ty - current.1) == (-dy, dx))
                    .unwrap_or(0),
                _ => 0,
            };
            let next = targets.swap_remove(index);
            heading = Some((next.0 - current.0, next.1 - current.1));
            current = next;
            walk.push(next);
        }

        rings.extend(split_at_repeats(walk));
    }

    rings
}

/// Break a closed walk into simple closed rings wherever a vertex repeats.
fn split_at_repeats(walk: Vec<Vertex>) -> Vec<Vec<Vertex>> {
    let mut rings = Vec::new();
    let mut stack: Vec<Vertex> = Vec::with_capacity(walk.len());
    let mut position: HashMap<Vertex, usize> = HashMap::new();

    for vertex in walk {
        if let Some(&index) = position.get(&vertex) {
            let mut ring: Vec<Vertex> = stack.drain(index..).collect();
            for v in &ring {
                position.remove(v);
            }
            ring.push(vertex);
            if ring.len() >= 4 {
                rings.push(ring);
            }
        }
        position.insert(vertex, stack.len());
        stack.push(vertex);
    }

    rings
}

/// Drop vertices that sit on a straight run. Input and output are closed rings.
fn drop_collinear(ring: &[Vertex]) -> Vec<Vertex> {
    let open = &ring[..ring.len() - 1];
    let n = open.len();
    let mut kept: Vec<Vertex> = (0..n)
        .filter(|&i| {
            let prev = open[(i + n - 1) % n];
            let here = open[i];
            let next = open[(i + 1) % n];
            let cross = (here.0 - prev.0) * (next.1 - here.1) - (here.1 - prev.1) * (next.0 - here.0);
            cross != 0
        })
        .map(|i| open[i])
        .collect();
    if let Some(&first) = kept.first() {
        kept.push(first);
    }
    kept
}

/// Twice the signed area; positive for exteriors under the region-on-the-right walk.
fn signed_area2(ring: &[Vertex]) -> i64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum()
}

fn to_linestring(ring: &[Vertex]) -> LineString<f64> {
    LineString::new(
        ring.iter()
            .map(|&(x, y)| Coord { x: x as f64, y: y as f64 })
            .collect(),
    )
}

/// Sort rings into exteriors and holes and nest each hole in the exterior around it.
fn assemble_polygons(rings: Vec<Vec<Vertex>>) -> MultiPolygon<f64> {
    let mut exteriors: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    let mut holes: Vec<(LineString<f64>, Point<f64>)> = Vec::new();

    for ring in rings {
        let ring = drop_collinear(&ring);
        if ring.len() < 4 {
            continue;
        }
        if signed_area2(&ring) > 0 {
            exteriors.push((to_linestring(&ring), Vec::new()));
        } else {
            // The hole interior lies left of its first edge.
            let (a, b) = (ring[0], ring[1]);
            let (dx, dy) = ((b.0 - a.0).signum() as f64, (b.1 - a.1).signum() as f64);
            let probe = Point::new(
                (a.0 + b.0) as f64 / 2.0 + 0.5 * dy,
                (a.1 + b.1) as f64 / 2.0 - 0.5 * dx,
            );
            holes.push((to_linestring(&ring), probe));
        }
    }

    for (hole, probe) in holes {
        let owner = if exteriors.len() == 1 {
            Some(0)
        } else {
            exteriors
                .iter()
                .position(|(exterior, _)| Polygon::new(exterior.clone(), Vec::new()).contains(&probe))
        };
        match owner {
            Some(index) => exteriors[index].1.push(hole),
            None => tracing::debug!("dropping hole ring with no enclosing exterior"),
        }
    }

    MultiPolygon::new(
        exteriors
            .into_iter()
            .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect};
    use geo_types::Geometry;

    fn raster(width: u32, height: u32, blocks: &[(u32, u32, u32, u32, u32)]) -> LabeledRaster {
        let mut labels = LabeledRaster::new(width, height);
        for &(x0, y0, w, h, value) in blocks {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    labels.put_pixel(x, y, Luma([value]));
                }
            }
        }
        labels
    }

    fn area(feature: &Feature) -> f64 {
        feature.to_multi_polygon().unsigned_area()
    }

    #[test]
    fn single_block_becomes_one_square() {
        let labels = raster(10, 10, &[(3, 3, 3, 3, 5)]);
        let features = vectorize(&labels, &Affine::identity(), 0);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].property("id"), Some(&serde_json::json!(5)));
        assert!(matches!(features[0].geometry(), Geometry::Polygon(_)));
        assert!((area(&features[0]) - 9.0).abs() < 1e-9);

        let bounds = features[0].to_multi_polygon().bounding_rect().unwrap();
        assert_eq!(bounds.min(), Coord { x: 3.0, y: 3.0 });
        assert_eq!(bounds.max(), Coord { x: 6.0, y: 6.0 });
    }

    #[test]
    fn ignore_label_never_appears() {
        let labels = raster(12, 12, &[(0, 0, 12, 12, 7), (2, 2, 3, 3, 1), (7, 7, 2, 4, 2)]);
        for ignore in [0, 1, 7] {
            let features = vectorize(&labels, &Affine::identity(), ignore);
            assert!(
                features
                    .iter()
                    .all(|f| f.property("id") != Some(&serde_json::json!(ignore)))
            );
        }
    }

    #[test]
    fn same_value_in_separate_regions_gives_separate_features() {
        let labels = raster(10, 10, &[(0, 0, 2, 2, 3), (6, 6, 2, 2, 3)]);
        let features = vectorize(&labels, &Affine::identity(), 0);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.property("id") == Some(&serde_json::json!(3))));
    }

    #[test]
    fn ring_with_courtyard_keeps_its_hole() {
        let mut labels = raster(8, 8, &[(1, 1, 6, 6, 4)]);
        for y in 3..5 {
            for x in 3..5 {
                labels.put_pixel(x, y, Luma([0]));
            }
        }
        let features = vectorize(&labels, &Affine::identity(), 0);
        assert_eq!(features.len(), 1);
        let polygons = features[0].to_multi_polygon();
        assert_eq!(polygons.0.len(), 1);
        assert_eq!(polygons.0[0].interiors().len(), 1);
        assert!((area(&features[0]) - 32.0).abs() < 1e-9);
    }

    #[test]
    fn diagonal_pinch_is_repaired() {
        // X X X .
        // X . X .
        // X X . .
        // The enclosed pixel meets the outside background at one corner.
        let labels = raster(4, 4, &[(0, 0, 3, 1, 1), (0, 1, 1, 2, 1), (2, 1, 1, 1, 1), (1, 2, 1, 1, 1)]);
        let features = vectorize(&labels, &Affine::identity(), 0);
        assert_eq!(features.len(), 1);
        assert!((area(&features[0]) - 7.0).abs() < 1e-9, "area {}", area(&features[0]));
    }

    #[test]
    fn affine_maps_pixel_corners_to_map_coordinates() {
        let labels = raster(4, 4, &[(1, 1, 2, 1, 9)]);
        let transform = Affine::north_up(-66.0, 18.0, 0.5, 0.25);
        let features = vectorize(&labels, &transform, 0);
        assert_eq!(features.len(), 1);
        let bounds = features[0].to_multi_polygon().bounding_rect().unwrap();
        assert!((bounds.min().x - -65.5).abs() < 1e-12);
        assert!((bounds.max().x - -64.5).abs() < 1e-12);
        assert!((bounds.min().y - 17.5).abs() < 1e-12);
        assert!((bounds.max().y - 17.75).abs() < 1e-12);
        assert!((area(&features[0]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn empty_raster_yields_nothing() {
        let labels = LabeledRaster::new(6, 6);
        assert!(vectorize(&labels, &Affine::identity(), 0).is_empty());
    }

    #[test]
    fn split_at_repeats_separates_pinched_loops() {
        // figure-eight through (1, 1)
        let walk = vec![(0, 0), (1, 0), (1, 1), (2, 1), (2, 2), (1, 2), (1, 1), (0, 1), (0, 0)];
        let rings = split_at_repeats(walk);
        assert_eq!(rings.len(), 2);
        assert!(rings.iter().all(|r| r.first() == r.last() && r.len() == 5));
    }
}
