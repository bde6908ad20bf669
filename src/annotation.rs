//! Annotation record, create payload, sparse patch, and derived shape.

use serde::{Deserialize, Serialize};

use crate::{
    geometry,
    types::{AnnotationId, BBox, ClassId, ImageId, Segmentation},
};

/// A segmentation together with the bbox and area derived from it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Shape {
    /// Polygon rings.
    pub segmentation: Segmentation,
    /// Tight box over `segmentation`.
    pub bbox: BBox,
    /// Covered area of `segmentation`.
    pub area: f64,
}

impl Shape {
    /// Derives bbox and area from `segmentation`.
    pub fn from_segmentation(segmentation: Segmentation) -> Self {
        let bbox = geometry::bounding_box(&segmentation);
        let area = geometry::area(&segmentation);
        Self {
            segmentation,
            bbox,
            area,
        }
    }

    /// True when the shape covers nothing.
    pub fn is_empty(&self) -> bool {
        self.segmentation.is_empty()
    }
}

/// Fully materialized annotation as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Collaborator-assigned identifier.
    pub id: AnnotationId,
    /// Slice this annotation belongs to.
    pub image_id: ImageId,
    /// Class label.
    pub class_id: ClassId,
    /// Human-readable class name.
    pub class_name: String,
    /// Polygon rings.
    pub segmentation: Segmentation,
    /// Tight box over `segmentation`.
    pub bbox: BBox,
    /// Covered area of `segmentation`.
    pub area: f64,
    /// Creation time in milliseconds since epoch.
    #[serde(default)]
    pub created_at_ms: u64,
}

impl Annotation {
    /// Copy of the geometric part.
    pub fn shape(&self) -> Shape {
        Shape {
            segmentation: self.segmentation.clone(),
            bbox: self.bbox,
            area: self.area,
        }
    }

    /// Create payload that reproduces this annotation under a fresh id.
    pub fn to_draft(&self) -> AnnotationDraft {
        AnnotationDraft {
            class_id: self.class_id,
            class_name: self.class_name.clone(),
            segmentation: self.segmentation.clone(),
            bbox: self.bbox,
            area: self.area,
        }
    }

    /// Compares everything except identity and timestamps.
    pub fn same_content(&self, other: &Annotation) -> bool {
        self.image_id == other.image_id
            && self.class_id == other.class_id
            && self.class_name == other.class_name
            && self.segmentation == other.segmentation
            && self.bbox == other.bbox
            && self.area == other.area
    }
}

/// Create payload handed to the collaborator, which assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDraft {
    /// Class label.
    pub class_id: ClassId,
    /// Human-readable class name.
    pub class_name: String,
    /// Polygon rings.
    pub segmentation: Segmentation,
    /// Tight box over `segmentation`.
    pub bbox: BBox,
    /// Covered area of `segmentation`.
    pub area: f64,
}

impl AnnotationDraft {
    /// Draft whose bbox and area are derived from `shape`.
    pub fn from_shape(class_id: ClassId, class_name: impl Into<String>, shape: Shape) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            segmentation: shape.segmentation,
            bbox: shape.bbox,
            area: shape.area,
        }
    }

    /// Materializes the draft under `id`.
    pub fn into_annotation(self, id: AnnotationId, image_id: ImageId, created_at_ms: u64) -> Annotation {
        Annotation {
            id,
            image_id,
            class_id: self.class_id,
            class_name: self.class_name,
            segmentation: self.segmentation,
            bbox: self.bbox,
            area: self.area,
            created_at_ms,
        }
    }
}

/// Sparse patch where each `Some` field overwrites the annotation value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationPatch {
    /// Optional replacement for class id.
    pub class_id: Option<ClassId>,
    /// Optional replacement for class name.
    pub class_name: Option<String>,
    /// Optional replacement for segmentation.
    pub segmentation: Option<Segmentation>,
    /// Optional replacement for bbox.
    pub bbox: Option<BBox>,
    /// Optional replacement for area.
    pub area: Option<f64>,
}

impl AnnotationPatch {
    /// Patch that relabels an annotation.
    pub fn relabel(class_id: ClassId, class_name: impl Into<String>) -> Self {
        Self {
            class_id: Some(class_id),
            class_name: Some(class_name.into()),
            ..Self::default()
        }
    }

    /// Patch that replaces the geometry.
    pub fn with_shape(shape: Shape) -> Self {
        Self {
            segmentation: Some(shape.segmentation),
            bbox: Some(shape.bbox),
            area: Some(shape.area),
            ..Self::default()
        }
    }

    /// Patch that overwrites every mutable field with the values of `ann`.
    pub fn full(ann: &Annotation) -> Self {
        Self {
            class_id: Some(ann.class_id),
            class_name: Some(ann.class_name.clone()),
            segmentation: Some(ann.segmentation.clone()),
            bbox: Some(ann.bbox),
            area: Some(ann.area),
        }
    }

    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Derives bbox and area from the replacement segmentation. Without one,
    /// caller-supplied bbox and area are dropped: both only ever follow the
    /// shape.
    pub fn normalized(mut self) -> Self {
        match &self.segmentation {
            Some(seg) => {
                self.bbox = Some(geometry::bounding_box(seg));
                self.area = Some(geometry::area(seg));
            }
            None => {
                self.bbox = None;
                self.area = None;
            }
        }
        self
    }

    /// Captures an inverse patch for all fields present in `self`.
    pub fn capture_inverse_for(&self, ann: &Annotation) -> Self {
        Self {
            class_id: self.class_id.map(|_| ann.class_id),
            class_name: self.class_name.as_ref().map(|_| ann.class_name.clone()),
            segmentation: self
                .segmentation
                .as_ref()
                .map(|_| ann.segmentation.clone()),
            bbox: self.bbox.map(|_| ann.bbox),
            area: self.area.map(|_| ann.area),
        }
    }

    /// Applies this patch in place to `ann`.
    pub fn apply_to(&self, ann: &mut Annotation) {
        if let Some(v) = self.class_id {
            ann.class_id = v;
        }
        if let Some(v) = &self.class_name {
            ann.class_name = v.clone();
        }
        if let Some(v) = &self.segmentation {
            ann.segmentation = v.clone();
        }
        if let Some(v) = self.bbox {
            ann.bbox = v;
        }
        if let Some(v) = self.area {
            ann.area = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Annotation {
        AnnotationDraft::from_shape(
            1,
            "cell",
            Shape::from_segmentation(vec![vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]]),
        )
        .into_annotation("a1".to_string(), "slice-1".to_string(), 0)
    }

    #[test]
    fn shape_derives_bbox_and_area() {
        let ann = sample();
        assert_eq!(ann.bbox, BBox::new(0.0, 0.0, 10.0, 10.0));
        assert!((ann.area - 100.0).abs() < 1e-9);
    }

    #[test]
    fn inverse_patch_restores_previous_values() {
        let mut ann = sample();
        let before = ann.clone();
        let patch = AnnotationPatch::relabel(7, "nucleus");
        let inverse = patch.capture_inverse_for(&ann);
        patch.apply_to(&mut ann);
        assert_eq!(ann.class_name, "nucleus");
        inverse.apply_to(&mut ann);
        assert_eq!(ann, before);
    }

    #[test]
    fn normalized_patch_recomputes_geometry() {
        let patch = AnnotationPatch {
            segmentation: Some(vec![vec![0.0, 0.0, 4.0, 0.0, 4.0, 5.0, 0.0, 5.0]]),
            area: Some(999.0),
            ..AnnotationPatch::default()
        }
        .normalized();
        assert_eq!(patch.bbox, Some(BBox::new(0.0, 0.0, 4.0, 5.0)));
        assert!((patch.area.unwrap_or_default() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn normalized_patch_drops_geometry_without_a_shape() {
        let patch = AnnotationPatch {
            class_name: Some("nucleus".into()),
            bbox: Some(BBox::new(50.0, 50.0, 1.0, 1.0)),
            area: Some(5.0),
            ..AnnotationPatch::default()
        }
        .normalized();
        assert_eq!(patch.bbox, None);
        assert_eq!(patch.area, None);
        assert_eq!(patch.class_name.as_deref(), Some("nucleus"));
    }
}
