// Shape records built from CSV rows and their OME-schema JSON encoding.

use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Namespace used by OMERO's JSON marshalling for `@type` values.
pub const OME_SCHEMA: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// The shape kinds accepted in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Polygon,
    Ellipse,
    Line,
}

impl ShapeKind {
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Polygon => "polygon",
            ShapeKind::Ellipse => "ellipse",
            ShapeKind::Line => "line",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a `type` cell. Matching ignores case and surrounding whitespace;
/// the error carries the normalized value.
impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "rectangle" => Ok(ShapeKind::Rectangle),
            "polygon" => Ok(ShapeKind::Polygon),
            "ellipse" => Ok(ShapeKind::Ellipse),
            "line" => Ok(ShapeKind::Line),
            _ => Err(normalized),
        }
    }
}

/// Axis-aligned box anchored at its top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rectangle {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub z: Option<u32>,
    pub label: Option<String>,
}

/// Ellipse centered on `(x, y)`; `width` and `height` are its extents along
/// each axis and are sent as the OME radii.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ellipse {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub z: Option<u32>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    pub z: Option<u32>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub points: Vec<(i64, i64)>,
    pub z: Option<u32>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Rectangle(Rectangle),
    Polygon(Polygon),
    Ellipse(Ellipse),
    Line(Line),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Rectangle(_) => ShapeKind::Rectangle,
            Shape::Polygon(_) => ShapeKind::Polygon,
            Shape::Ellipse(_) => ShapeKind::Ellipse,
            Shape::Line(_) => ShapeKind::Line,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Shape::Rectangle(s) => s.label.as_deref(),
            Shape::Polygon(s) => s.label.as_deref(),
            Shape::Ellipse(s) => s.label.as_deref(),
            Shape::Line(s) => s.label.as_deref(),
        }
    }

    pub fn z(&self) -> Option<u32> {
        match self {
            Shape::Rectangle(s) => s.z,
            Shape::Polygon(s) => s.z,
            Shape::Ellipse(s) => s.z,
            Shape::Line(s) => s.z,
        }
    }

    /// Encode the shape the way OMERO's JSON marshalling expects it.
    pub fn to_omero_json(&self) -> Value {
        let mut obj = Map::new();
        let type_name = match self {
            Shape::Rectangle(_) => "Rectangle",
            Shape::Polygon(_) => "Polygon",
            Shape::Ellipse(_) => "Ellipse",
            Shape::Line(_) => "Line",
        };
        obj.insert("@type".into(), json!(format!("{OME_SCHEMA}#{type_name}")));

        match self {
            Shape::Rectangle(r) => {
                obj.insert("X".into(), json!(r.x as f64));
                obj.insert("Y".into(), json!(r.y as f64));
                obj.insert("Width".into(), json!(r.width as f64));
                obj.insert("Height".into(), json!(r.height as f64));
            }
            Shape::Ellipse(e) => {
                obj.insert("X".into(), json!(e.x as f64));
                obj.insert("Y".into(), json!(e.y as f64));
                obj.insert("RadiusX".into(), json!(e.width as f64));
                obj.insert("RadiusY".into(), json!(e.height as f64));
            }
            Shape::Line(l) => {
                obj.insert("X1".into(), json!(l.x1 as f64));
                obj.insert("Y1".into(), json!(l.y1 as f64));
                obj.insert("X2".into(), json!(l.x2 as f64));
                obj.insert("Y2".into(), json!(l.y2 as f64));
            }
            Shape::Polygon(p) => {
                obj.insert("Points".into(), json!(points_attribute(&p.points)));
            }
        }

        if let Some(label) = self.label() {
            obj.insert("Text".into(), json!(label));
        }
        if let Some(z) = self.z() {
            obj.insert("TheZ".into(), json!(z));
        }
        Value::Object(obj)
    }
}

/// OME `Points` attribute: `"x1,y1 x2,y2 ..."`.
fn points_attribute(points: &[(i64, i64)]) -> String {
    points
        .iter()
        .map(|(x, y)| format!("{x},{y}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the ROI object posted to the save endpoint: one ROI holding `shape`,
/// linked to the image with id `image_id`.
pub fn roi_payload(image_id: i64, shape: &Shape) -> Value {
    json!({
        "@type": format!("{OME_SCHEMA}#ROI"),
        "Image": {
            "@type": format!("{OME_SCHEMA}#Image"),
            "@id": image_id,
        },
        "shapes": [shape.to_omero_json()],
    })
}
