//! Vector export
//!
//! Turns segments, terminal basins and outlets into [`Feature`]s carrying
//! typed attributes. Reprojection and basin polygonization are delegated
//! to caller-supplied hooks; [`PixelOutline`] is the default polygonizer.
//! [`geojson`] serializes the result.

pub mod geojson;

use geo_types::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use streamnet_core::vector::{AttributeValue, Feature, FeatureCollection};
use streamnet_core::{Error, GeoTransform, Result};
use tracing::debug;

use crate::network::{Catchment, Network, SegmentId};

/// What each exported feature represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// One LineString per segment
    Segments,
    /// One polygon per terminal outlet basin
    Basins,
    /// One Point per terminal outlet
    Outlets,
    /// One Point per segment outlet
    SegmentOutlets,
}

impl ExportKind {
    fn per_terminal(self) -> bool {
        matches!(self, ExportKind::Basins | ExportKind::Outlets)
    }
}

/// A typed property column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(values) => values.len(),
            Column::Int(values) => values.len(),
            Column::Bool(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn value(&self, row: usize) -> AttributeValue {
        match self {
            Column::Float(values) => AttributeValue::Float(values[row]),
            Column::Int(values) => AttributeValue::Int(values[row]),
            Column::Bool(values) => AttributeValue::Bool(values[row]),
            Column::Text(values) => AttributeValue::String(values[row].clone()),
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Column::Float(values)
    }
}

impl From<Vec<i64>> for Column {
    fn from(values: Vec<i64>) -> Self {
        Column::Int(values)
    }
}

/// Counts above `i64::MAX` saturate
impl From<Vec<u64>> for Column {
    fn from(values: Vec<u64>) -> Self {
        Column::Int(
            values
                .into_iter()
                .map(|v| i64::try_from(v).unwrap_or(i64::MAX))
                .collect(),
        )
    }
}

impl From<Vec<bool>> for Column {
    fn from(values: Vec<bool>) -> Self {
        Column::Bool(values)
    }
}

impl From<Vec<String>> for Column {
    fn from(values: Vec<String>) -> Self {
        Column::Text(values)
    }
}

/// Named property columns, in insertion order.
///
/// Rows are either one per live segment (ID order) or, for basin and
/// outlet exports, one per terminal segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTable {
    columns: Vec<(String, Column)>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`PropertyTable::insert`]
    pub fn with(mut self, name: impl Into<String>, column: impl Into<Column>) -> Self {
        self.insert(name, column);
        self
    }

    /// Add a column, replacing any column of the same name
    pub fn insert(&mut self, name: impl Into<String>, column: impl Into<Column>) {
        let name = name.into();
        let column = column.into();
        match self.columns.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name, column)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, column)| column)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(name, column)| (name.as_str(), column))
    }
}

/// Reprojection of exported geometries from the flow grid's CRS
pub trait Reproject {
    fn reproject(&self, geometry: Geometry<f64>) -> Result<Geometry<f64>>;
}

/// Conversion of a catchment into a polygonal geometry
pub trait Polygonize {
    fn polygonize(&self, catchment: &Catchment, transform: &GeoTransform) -> Result<Geometry<f64>>;
}

/// Polygonizes a catchment as one rectangle per horizontal run of pixels
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelOutline;

impl Polygonize for PixelOutline {
    fn polygonize(&self, catchment: &Catchment, transform: &GeoTransform) -> Result<Geometry<f64>> {
        let mut polygons = Vec::new();
        let mut pixels = catchment.coords().peekable();
        while let Some((row, start)) = pixels.next() {
            let mut end = start;
            while let Some(&(r, c)) = pixels.peek() {
                if r != row || c != end + 1 {
                    break;
                }
                end = c;
                pixels.next();
            }
            let corners = [
                transform.pixel_corner(row, start),
                transform.pixel_corner(row, end + 1),
                transform.pixel_corner(row + 1, end + 1),
                transform.pixel_corner(row + 1, start),
                transform.pixel_corner(row, start),
            ];
            let ring: LineString<f64> = corners.iter().map(|&(x, y)| Coord { x, y }).collect();
            polygons.push(Polygon::new(ring, Vec::new()));
        }
        Ok(Geometry::MultiPolygon(MultiPolygon(polygons)))
    }
}

/// Hooks used by [`Network::features`]
#[derive(Clone, Copy, Default)]
pub struct ExportOptions<'a> {
    /// Applied to every geometry when set
    pub reproject: Option<&'a dyn Reproject>,
    /// Basin polygonizer. Default: [`PixelOutline`]
    pub polygonize: Option<&'a dyn Polygonize>,
}

impl Network {
    /// Build features of the given kind with `properties` attached.
    ///
    /// Every feature's ID is its segment ID. Segment features also carry
    /// `child_id` and `parent_ids`. For basins and outlets the table may
    /// hold one row per terminal or one row per segment, in which case
    /// the terminal rows are used.
    pub fn features(
        &self,
        kind: ExportKind,
        properties: &PropertyTable,
        options: &ExportOptions<'_>,
    ) -> Result<FeatureCollection> {
        let ids = if kind.per_terminal() {
            self.terminal_ids()
        } else {
            self.ids()
        };
        let rows = self.property_rows(kind, &ids, properties)?;

        let transform = *self.flow().transform();
        let center = |(row, col): (usize, usize)| {
            let (x, y) = transform.pixel_center(row, col);
            Coord { x, y }
        };
        let outline = PixelOutline;
        let polygonize = options.polygonize.unwrap_or(&outline);

        let mut collection = FeatureCollection::new();
        for (&id, &row) in ids.iter().zip(&rows) {
            let segment = self.segment(id)?;
            let geometry = match kind {
                ExportKind::Segments => {
                    let mut coords: Vec<Coord<f64>> = segment.coordinates().map(center).collect();
                    if coords.len() == 1 {
                        coords.push(coords[0]);
                    }
                    Geometry::LineString(LineString(coords))
                }
                ExportKind::Basins => {
                    let basin = self.basin(id)?;
                    polygonize.polygonize(&basin, &transform)?
                }
                ExportKind::Outlets | ExportKind::SegmentOutlets => {
                    Geometry::Point(Point(center(segment.outlet())))
                }
            };
            let geometry = match options.reproject {
                Some(reproject) => reproject.reproject(geometry)?,
                None => geometry,
            };

            let mut feature = Feature::new(geometry).with_id(i64::from(id.0));
            if kind == ExportKind::Segments {
                feature.set_property("child_id", self.child_attribute(id)?);
                feature.set_property("parent_ids", self.parents_attribute(id)?);
            }
            for (name, column) in properties.columns() {
                feature.set_property(name, column.value(row));
            }
            collection.push(feature);
        }

        debug!(?kind, features = collection.len(), "exported features");
        Ok(collection)
    }

    /// Table row for each exported ID
    fn property_rows(&self, kind: ExportKind, ids: &[SegmentId], properties: &PropertyTable) -> Result<Vec<usize>> {
        let segments = self.ids();
        let mut per_segment = false;
        for (name, column) in properties.columns() {
            if column.len() == ids.len() {
                continue;
            }
            if kind.per_terminal() && column.len() == segments.len() {
                per_segment = true;
                continue;
            }
            return Err(Error::PropertyLength {
                name: name.to_string(),
                expected: ids.len(),
                actual: column.len(),
            });
        }
        if !per_segment {
            return Ok((0..ids.len()).collect());
        }
        // Mixed tables are ambiguous; every column must be per segment
        if let Some((name, column)) = properties.columns().find(|(_, c)| c.len() != segments.len()) {
            return Err(Error::PropertyLength {
                name: name.to_string(),
                expected: segments.len(),
                actual: column.len(),
            });
        }
        Ok(ids
            .iter()
            .map(|id| segments.binary_search(id).unwrap_or_default())
            .collect())
    }

    fn child_attribute(&self, id: SegmentId) -> Result<AttributeValue> {
        Ok(match self.child(id)? {
            Some(child) => AttributeValue::from(child.0),
            None => AttributeValue::Null,
        })
    }

    fn parents_attribute(&self, id: SegmentId) -> Result<AttributeValue> {
        let parents: Vec<String> = self.parents(id)?.iter().map(ToString::to_string).collect();
        Ok(AttributeValue::String(parents.join(",")))
    }
}
