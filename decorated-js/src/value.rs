use crate::{GcObject, GcString, Heap};

/// A scripting-visible value.
///
/// This is the canonical value representation for property slots.
/// Heap-allocated values are represented using GC-managed handles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  /// An IEEE-754 double.
  Number(f64),
  /// A GC-managed string.
  String(GcString),
  /// A GC-managed object cell.
  Object(GcObject),
}

impl Value {
  /// `SameValue(x, y)`-style comparison.
  ///
  /// This differs from `==` for Numbers:
  /// - `NaN` is the same as `NaN`
  /// - `+0` and `-0` are distinct
  ///
  /// Strings compare by contents, objects by identity.
  pub fn same_value(self, other: Self, heap: &Heap) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) => true,
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => {
        if a.is_nan() && b.is_nan() {
          return true;
        }
        if a == 0.0 && b == 0.0 {
          // Distinguish +0 and -0.
          return a.to_bits() == b.to_bits();
        }
        a == b
      }
      (Value::String(a), Value::String(b)) => {
        let Ok(a) = heap.get_string(a) else {
          return false;
        };
        let Ok(b) = heap.get_string(b) else {
          return false;
        };
        a == b
      }
      (Value::Object(a), Value::Object(b)) => a == b,
      _ => false,
    }
  }
}

impl From<GcString> for Value {
  fn from(value: GcString) -> Self {
    Self::String(value)
  }
}

impl From<GcObject> for Value {
  fn from(value: GcObject) -> Self {
    Self::Object(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Self::Number(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Self::Bool(value)
  }
}
