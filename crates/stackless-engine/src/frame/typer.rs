//! Frame type interning
//!
//! A frame type is identified by how many values of each storage class it
//! holds. Two capture sites with the same per-class counts share one frame
//! type and one save routine, whatever function they come from. Fields are
//! laid out grouped by class in canonical order, and within a class in the
//! order the values were presented.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::ir::StorageClass;

/// Frame type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameTypeId(pub u32);

impl FrameTypeId {
    /// The frame type with no payload
    pub const EMPTY: FrameTypeId = FrameTypeId(0);
    /// The frame type holding a single GC reference
    pub const SINGLE_REF: FrameTypeId = FrameTypeId(1);
}

impl std::fmt::Display for FrameTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame{}", self.0)
    }
}

/// Save routine identifier; one routine per frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveRoutineId(pub u32);

impl std::fmt::Display for SaveRoutineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "save{}", self.0)
    }
}

/// Canonical key of a frame type: field count per storage class
pub type FrameKey = [usize; StorageClass::COUNT];

/// A payload field of a frame type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameField {
    pub name: String,
    pub class: StorageClass,
}

/// Layout of a frame type's payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub id: FrameTypeId,
    pub key: FrameKey,
    pub fields: Vec<FrameField>,
}

impl FrameLayout {
    fn from_key(id: FrameTypeId, key: FrameKey) -> Self {
        let mut fields = Vec::new();
        for class in StorageClass::ALL {
            for n in 0..key[class.index()] {
                fields.push(FrameField {
                    name: format!("state_{}_{}", class.field_prefix(), n),
                    class,
                });
            }
        }
        Self { id, key, fields }
    }

    /// Storage class of every field, in field order
    pub fn classes(&self) -> Vec<StorageClass> {
        self.fields.iter().map(|f| f.class).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Name of the save routine generated for this layout
    pub fn save_routine_name(&self) -> String {
        let parts: Vec<String> = StorageClass::ALL
            .iter()
            .filter(|c| self.key[c.index()] > 0)
            .map(|c| format!("{}{}", c.field_prefix(), self.key[c.index()]))
            .collect();
        if parts.is_empty() {
            "save_state".to_string()
        } else {
            format!("save_state_{}", parts.join("_"))
        }
    }
}

impl std::fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        write!(f, "{} {{{}}}", self.id, fields.join(", "))
    }
}

/// Result of asking for the frame type of a list of captured values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCapture {
    pub frame_type: FrameTypeId,
    pub routine: SaveRoutineId,
    /// `order[field]` is the position, in the presented list, of the value
    /// stored in that field
    pub order: Vec<usize>,
}

impl FrameCapture {
    /// Reorder presented items into field order
    pub fn reorder<T: Clone>(&self, items: &[T]) -> Vec<T> {
        self.order.iter().map(|&i| items[i].clone()).collect()
    }
}

#[derive(Debug, Clone)]
struct LabelType {
    frame_type: FrameTypeId,
    classes: Vec<StorageClass>,
}

/// Interns frame types and keeps the frame type chosen for each explicit
/// resume point label
#[derive(Debug, Clone)]
pub struct FrameTyper {
    layouts: Vec<FrameLayout>,
    by_key: FxHashMap<FrameKey, FrameTypeId>,
    labels: FxHashMap<String, LabelType>,
}

impl Default for FrameTyper {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTyper {
    /// New typer with the builtin frame types pre-registered
    pub fn new() -> Self {
        let mut typer = Self {
            layouts: Vec::new(),
            by_key: FxHashMap::default(),
            labels: FxHashMap::default(),
        };
        let empty = typer.frame_type_for(&[]);
        let single_ref = typer.frame_type_for(&[StorageClass::Ref]);
        debug_assert_eq!(empty.frame_type, FrameTypeId::EMPTY);
        debug_assert_eq!(single_ref.frame_type, FrameTypeId::SINGLE_REF);
        typer
    }

    /// Frame type, field order and save routine for values of the given classes
    pub fn frame_type_for(&mut self, classes: &[StorageClass]) -> FrameCapture {
        let mut key: FrameKey = [0; StorageClass::COUNT];
        for class in classes {
            key[class.index()] += 1;
        }

        let frame_type = match self.by_key.get(&key) {
            Some(&id) => id,
            None => {
                let id = FrameTypeId(self.layouts.len() as u32);
                self.layouts.push(FrameLayout::from_key(id, key));
                self.by_key.insert(key, id);
                id
            }
        };

        let mut order: Vec<usize> = (0..classes.len()).collect();
        order.sort_by_key(|&i| classes[i]);

        FrameCapture {
            frame_type,
            routine: SaveRoutineId(frame_type.0),
            order,
        }
    }

    /// Register (or check) the frame type of an explicit resume point label.
    ///
    /// Both the resume point itself and every `resume_state_create` naming
    /// the label go through here, so they must agree on the class of every
    /// value position.
    pub fn ensure_type_for(
        &mut self,
        label: &str,
        classes: &[StorageClass],
    ) -> Result<FrameCapture, TransformError> {
        if let Some(existing) = self.labels.get(label) {
            if existing.classes != classes {
                return Err(TransformError::InconsistentFrameType {
                    label: label.to_string(),
                    existing: existing.classes.clone(),
                    requested: classes.to_vec(),
                });
            }
        }
        let capture = self.frame_type_for(classes);
        self.labels
            .entry(label.to_string())
            .or_insert_with(|| LabelType {
                frame_type: capture.frame_type,
                classes: classes.to_vec(),
            });
        Ok(capture)
    }

    /// Frame type registered for a label, if any
    pub fn label_type(&self, label: &str) -> Option<FrameTypeId> {
        self.labels.get(label).map(|l| l.frame_type)
    }

    pub fn layout(&self, id: FrameTypeId) -> Option<&FrameLayout> {
        self.layouts.get(id.0 as usize)
    }

    pub fn layouts(&self) -> &[FrameLayout] {
        &self.layouts
    }

    pub fn into_layouts(self) -> Vec<FrameLayout> {
        self.layouts
    }

    pub fn type_count(&self) -> usize {
        self.layouts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StorageClass::*;

    #[test]
    fn test_preregistered_types() {
        let typer = FrameTyper::new();
        assert_eq!(typer.type_count(), 2);
        assert!(typer.layout(FrameTypeId::EMPTY).unwrap().is_empty());
        assert_eq!(typer.layout(FrameTypeId::SINGLE_REF).unwrap().classes(), vec![Ref]);
    }

    #[test]
    fn test_interning_by_multiset() {
        let mut typer = FrameTyper::new();
        let a = typer.frame_type_for(&[Int, Ref, Float]);
        let b = typer.frame_type_for(&[Ref, Float, Int]);
        assert_eq!(a.frame_type, b.frame_type);
        assert_eq!(a.routine, b.routine);
        let c = typer.frame_type_for(&[Int, Int, Ref]);
        assert_ne!(a.frame_type, c.frame_type);
    }

    #[test]
    fn test_canonical_order_is_stable() {
        let mut typer = FrameTyper::new();
        let capture = typer.frame_type_for(&[Ref, Int, Float, Int]);
        assert_eq!(capture.order, vec![1, 3, 2, 0]);
        assert_eq!(capture.reorder(&["r", "i0", "f", "i1"]), vec!["i0", "i1", "f", "r"]);
    }

    #[test]
    fn test_field_names() {
        let mut typer = FrameTyper::new();
        let capture = typer.frame_type_for(&[Addr, Int, Int, Wide]);
        let layout = typer.layout(capture.frame_type).unwrap();
        let names: Vec<&str> = layout.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["state_long_0", "state_long_1", "state_longlong_0", "state_addr_0"]
        );
        assert_eq!(layout.save_routine_name(), "save_state_long2_longlong1_addr1");
    }

    #[test]
    fn test_ensure_type_for() {
        let mut typer = FrameTyper::new();
        let first = typer.ensure_type_for("resume_x", &[Int, Ref]).unwrap();
        let again = typer.ensure_type_for("resume_x", &[Int, Ref]).unwrap();
        assert_eq!(first, again);
        assert_eq!(typer.label_type("resume_x"), Some(first.frame_type));

        let err = typer.ensure_type_for("resume_x", &[Ref, Int]).unwrap_err();
        assert!(matches!(err, TransformError::InconsistentFrameType { .. }));
    }
}
