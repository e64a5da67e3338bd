//! Geometry reconstruction from KML geometry elements
//!
//! Degenerate shapes are downgraded rather than rejected: a line or ring
//! with a single position becomes a `Point`, a ring with two or three
//! positions becomes a `Line`, and a `MultiGeometry` with one member
//! collapses to that member. Only a `Polygon` without a usable outer
//! boundary is an error, and that error is recoverable: the caller skips
//! the element and keeps the feature.

use crate::coords::parse_coordinates;
use crate::decoder::ElementError;
use crate::vocab::{is_google_ext, is_kml_name, is_true};
use crate::xml::{StartTag, XmlCursor};
use gisstream_core::{
    Coord, Geometry, GeometryBag, GeometryProps, Line, LinearRing, Model, MultiPoint, Point,
    Polygon,
};
use log::{debug, warn};
use std::io::BufRead;

/// Element names that start a geometry
pub(crate) const GEOMETRY_TAGS: [&str; 6] = [
    "Point",
    "LineString",
    "LinearRing",
    "Polygon",
    "MultiGeometry",
    "Model",
];

/// `MultiGeometry` nesting deeper than this is skipped
const MAX_NESTING: usize = 32;

type Handled<T> = std::result::Result<T, ElementError>;

pub(crate) fn is_geometry_tag(name: &str) -> bool {
    GEOMETRY_TAGS.contains(&name)
}

#[derive(Default)]
struct CoordGroup {
    points: Vec<Coord>,
    props: GeometryProps,
    altitude_from_gx: bool,
}

impl CoordGroup {
    fn into_point(mut self) -> Option<Point> {
        if self.points.is_empty() {
            return None;
        }
        let coord = self.points.swap_remove(0);
        Some(Point {
            coord,
            props: self.props,
        })
    }

    fn into_line(self) -> Handled<Line> {
        let mut line = Line::new(self.points)?;
        line.props = self.props;
        Ok(line)
    }
}

/// Builds one geometry from the cursor. Borrowed from the decoder for the
/// duration of a single geometry element.
pub(crate) struct GeometryBuilder<'a, R: BufRead> {
    cursor: &'a mut XmlCursor<R>,
    altitude_dup_logged: &'a mut bool,
}

impl<'a, R: BufRead> GeometryBuilder<'a, R> {
    pub(crate) fn new(cursor: &'a mut XmlCursor<R>, altitude_dup_logged: &'a mut bool) -> Self {
        Self {
            cursor,
            altitude_dup_logged,
        }
    }

    /// Build the geometry opened by `tag`. `Ok(None)` means the element held
    /// nothing usable; the cursor is then past the element's end.
    pub(crate) fn build(&mut self, tag: &StartTag) -> Handled<Option<Geometry>> {
        self.build_nested(tag, 0)
    }

    fn build_nested(&mut self, tag: &StartTag, nesting: usize) -> Handled<Option<Geometry>> {
        match tag.local() {
            "Point" => self.point(tag),
            "LineString" => self.line_string(tag),
            "LinearRing" => self.linear_ring(tag),
            "Polygon" => self.polygon(tag),
            "MultiGeometry" => self.multi_geometry(tag, nesting),
            "Model" => self.model(tag).map(|m| Some(Geometry::Model(m))),
            other => {
                debug!("Not a geometry element: {other}");
                self.cursor.skip(tag)?;
                Ok(None)
            }
        }
    }

    fn point(&mut self, tag: &StartTag) -> Handled<Option<Geometry>> {
        let group = self.read_group(tag)?;
        let count = group.points.len();
        if count > 1 {
            debug!("Point has {count} coordinate tuples, using the first");
        }
        match group.into_point() {
            Some(point) => Ok(Some(Geometry::Point(point))),
            None => {
                debug!("Point has no coordinates");
                Ok(None)
            }
        }
    }

    fn line_string(&mut self, tag: &StartTag) -> Handled<Option<Geometry>> {
        let group = self.read_group(tag)?;
        match group.points.len() {
            0 => {
                debug!("LineString has no coordinates");
                Ok(None)
            }
            1 => {
                debug!("LineString has a single position, using a Point");
                Ok(group.into_point().map(Geometry::Point))
            }
            _ => Ok(Some(Geometry::Line(group.into_line()?))),
        }
    }

    fn linear_ring(&mut self, tag: &StartTag) -> Handled<Option<Geometry>> {
        let group = self.read_group(tag)?;
        Ok(Some(match group.points.len() {
            0 => {
                debug!("LinearRing has no coordinates");
                return Ok(None);
            }
            1 => {
                debug!("LinearRing has a single position, using a Point");
                return Ok(group.into_point().map(Geometry::Point));
            }
            n if n < LinearRing::MIN_POINTS => {
                debug!("LinearRing has only {n} positions, using a Line");
                Geometry::Line(group.into_line()?)
            }
            _ => {
                let mut ring = LinearRing::new(group.points)?;
                ring.props = group.props;
                Geometry::LinearRing(ring)
            }
        }))
    }

    fn polygon(&mut self, tag: &StartTag) -> Handled<Option<Geometry>> {
        let mut shared = CoordGroup::default();
        let mut outer: Option<LinearRing> = None;
        let mut inners = Vec::new();

        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            match child.local() {
                "outerBoundaryIs" => {
                    if outer.is_some() {
                        debug!("Polygon has more than one outerBoundaryIs, using the last");
                    }
                    let mut boundary = self.read_group(&child)?;
                    boundary.props.fill_missing(&shared.props);
                    match boundary.points.len() {
                        0 => {
                            return Err(ElementError::Recoverable(
                                "polygon outer boundary has no coordinates".to_string(),
                            ))
                        }
                        1 => {
                            debug!("Polygon outer boundary has a single position, using a Point");
                            self.cursor.skip(tag)?;
                            return Ok(boundary.into_point().map(Geometry::Point));
                        }
                        n if n < LinearRing::MIN_POINTS => {
                            debug!("Polygon outer boundary has only {n} positions, using a Line");
                            self.cursor.skip(tag)?;
                            return Ok(Some(Geometry::Line(boundary.into_line()?)));
                        }
                        _ => {
                            shared.props.fill_missing(&boundary.props);
                            outer = Some(LinearRing::new(boundary.points)?);
                        }
                    }
                }
                "innerBoundaryIs" => {
                    let boundary = self.read_group(&child)?;
                    let n = boundary.points.len();
                    if n >= LinearRing::MIN_POINTS {
                        inners.push(LinearRing::new(boundary.points)?);
                    } else {
                        debug!("Dropping inner boundary with {n} positions");
                    }
                }
                _ => self.geometry_attr(&child, &mut shared)?,
            }
        }

        let Some(outer) = outer else {
            return Err(ElementError::Recoverable(
                "polygon has no outer boundary".to_string(),
            ));
        };
        let mut polygon = Polygon::new(outer, inners);
        polygon.props = shared.props;
        Ok(Some(Geometry::Polygon(polygon)))
    }

    fn multi_geometry(&mut self, tag: &StartTag, nesting: usize) -> Handled<Option<Geometry>> {
        if nesting >= MAX_NESTING {
            warn!("MultiGeometry nested deeper than {MAX_NESTING} levels, skipping");
            self.cursor.skip(tag)?;
            return Ok(None);
        }
        let mut wrapper = CoordGroup::default();
        let mut members = Vec::new();

        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            if is_geometry_tag(child.local()) && is_kml_name(&child.name) {
                match self.build_nested(&child, nesting + 1) {
                    Ok(Some(geometry)) => members.push(geometry),
                    Ok(None) => {}
                    Err(ElementError::Recoverable(msg)) => {
                        warn!("Skipping invalid {} in MultiGeometry: {msg}", child.local());
                        self.cursor.skip(&child)?;
                    }
                    Err(fatal) => return Err(fatal),
                }
            } else {
                self.geometry_attr(&child, &mut wrapper)?;
            }
        }

        if members.is_empty() {
            debug!("MultiGeometry has no geometries");
            return Ok(None);
        }
        if members.len() == 1 {
            let mut only = members.swap_remove(0);
            only.props_mut().fill_missing(&wrapper.props);
            return Ok(Some(only));
        }
        if members.iter().all(|g| matches!(g, Geometry::Point(_))) {
            let points = members
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::Point(p) => Some(p),
                    _ => None,
                })
                .collect();
            return Ok(Some(Geometry::MultiPoint(MultiPoint {
                points,
                props: wrapper.props,
            })));
        }
        Ok(Some(Geometry::Bag(GeometryBag {
            geometries: members,
            props: wrapper.props,
        })))
    }

    fn model(&mut self, tag: &StartTag) -> Handled<Model> {
        let mut model = Model::default();
        let mut group = CoordGroup::default();
        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            match child.local() {
                "Location" => model.location = self.location(&child)?,
                "altitudeMode" => self.geometry_attr(&child, &mut group)?,
                _ => {}
            }
        }
        model.props = group.props;
        Ok(model)
    }

    fn location(&mut self, tag: &StartTag) -> Handled<Option<Coord>> {
        let (mut lon, mut lat, mut alt) = (None, None, None);
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            let target = match child.local() {
                "longitude" => &mut lon,
                "latitude" => &mut lat,
                "altitude" => &mut alt,
                _ => continue,
            };
            if let Some(text) = self.text(&child)? {
                match text.parse::<f64>() {
                    Ok(v) => *target = Some(v),
                    Err(_) => warn!("Invalid Model {} value: {text}", child.local()),
                }
            }
        }
        if lon.is_none() && lat.is_none() {
            return Ok(None);
        }
        match Coord::new(lon.unwrap_or(0.0), lat.unwrap_or(0.0), alt) {
            Ok(coord) => Ok(Some(coord)),
            Err(e) => {
                warn!("Invalid Model location: {e}");
                Ok(None)
            }
        }
    }

    /// Positions and metadata from every descendant of `tag`
    fn read_group(&mut self, tag: &StartTag) -> Handled<CoordGroup> {
        let mut group = CoordGroup::default();
        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            if child.local() == "coordinates" {
                let text = self.cursor.read_text(&child)?;
                let points = parse_coordinates(&text);
                if !points.is_empty() {
                    group.points = points;
                }
            } else {
                self.geometry_attr(&child, &mut group)?;
            }
        }
        Ok(group)
    }

    fn geometry_attr(&mut self, child: &StartTag, group: &mut CoordGroup) -> Handled<()> {
        match child.local() {
            "altitudeMode" => {
                let Some(mode) = self.text(child)? else {
                    return Ok(());
                };
                let gx = is_google_ext(&child.name);
                if group.props.altitude_mode.is_some() {
                    if gx || group.altitude_from_gx {
                        self.duplicate_altitude_mode();
                    }
                    if gx {
                        return Ok(());
                    }
                }
                group.props.altitude_mode = Some(mode);
                group.altitude_from_gx = gx;
            }
            "extrude" => {
                if let Some(v) = self.text(child)? {
                    group.props.extrude = Some(is_true(&v));
                }
            }
            "tessellate" => {
                if let Some(v) = self.text(child)? {
                    group.props.tessellate = Some(is_true(&v));
                }
            }
            "drawOrder" => {
                if !is_google_ext(&child.name) {
                    warn!("drawOrder on geometry is only valid in the gx namespace");
                    return Ok(());
                }
                if let Some(v) = self.text(child)? {
                    match v.parse::<i32>() {
                        Ok(order) => group.props.draw_order = Some(order),
                        Err(_) => warn!("Invalid gx:drawOrder value: {v}"),
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn duplicate_altitude_mode(&mut self) {
        if !*self.altitude_dup_logged {
            *self.altitude_dup_logged = true;
            debug!("Geometry has both altitudeMode and gx:altitudeMode, keeping the KML one");
        }
    }

    fn text(&mut self, tag: &StartTag) -> Handled<Option<String>> {
        let text = self.cursor.read_text(tag)?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}
