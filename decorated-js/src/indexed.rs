use std::ops::Range;

use crate::{GcObject, Heap, Scope, Value, VmError};

/// Property flags reported for an own indexed element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexedFlags {
  pub enumerable: bool,
  pub writable: bool,
  pub configurable: bool,
}

/// Predicate selector for [`IndexedProtocol::check_all_own_indexed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexedCheck {
  /// Do all own indexed elements have `configurable == false`?
  NonConfigurable,
  /// Do all own indexed elements have `writable == false`?
  ReadOnly,
}

/// The indexed-element protocol of a cell kind: seven function references,
/// part of the kind's [`CellDescriptor`](crate::CellDescriptor) and shared by
/// all instances.
///
/// Kinds without their own indexed storage (including decorated objects)
/// inherit [`OBJECT_INDEXED`] unmodified.
#[derive(Clone, Copy)]
pub struct IndexedProtocol {
  /// The range of indexes the cell itself stores.
  pub own_indexed_range: fn(&Heap, GcObject) -> Result<Range<u32>, VmError>,
  /// Whether the cell itself stores an element at `index`.
  pub have_own_indexed: fn(&Heap, GcObject, u32) -> Result<bool, VmError>,
  /// Flags of the element at `index`, if present.
  pub own_indexed_flags: fn(&Heap, GcObject, u32) -> Result<Option<IndexedFlags>, VmError>,
  /// The element at `index`, if present.
  pub get_own_indexed: fn(&Heap, GcObject, u32) -> Result<Option<Value>, VmError>,
  /// Stores an element at `index`; `false` if the kind cannot.
  pub set_own_indexed: fn(&mut Scope<'_>, GcObject, u32, Value) -> Result<bool, VmError>,
  /// Deletes the element at `index`; `true` if absent afterwards.
  pub delete_own_indexed: fn(&mut Scope<'_>, GcObject, u32) -> Result<bool, VmError>,
  /// Checks a predicate against every own indexed element.
  pub check_all_own_indexed: fn(&Heap, GcObject, IndexedCheck) -> Result<bool, VmError>,
}

/// Base object behavior: ordinary cells own no indexed storage.
pub const OBJECT_INDEXED: IndexedProtocol = IndexedProtocol {
  own_indexed_range: object_own_indexed_range,
  have_own_indexed: object_have_own_indexed,
  own_indexed_flags: object_own_indexed_flags,
  get_own_indexed: object_get_own_indexed,
  set_own_indexed: object_set_own_indexed,
  delete_own_indexed: object_delete_own_indexed,
  check_all_own_indexed: object_check_all_own_indexed,
};

pub fn object_own_indexed_range(heap: &Heap, obj: GcObject) -> Result<Range<u32>, VmError> {
  heap.expect_object(obj)?;
  Ok(0..0)
}

pub fn object_have_own_indexed(heap: &Heap, obj: GcObject, _index: u32) -> Result<bool, VmError> {
  heap.expect_object(obj)?;
  Ok(false)
}

pub fn object_own_indexed_flags(
  heap: &Heap,
  obj: GcObject,
  _index: u32,
) -> Result<Option<IndexedFlags>, VmError> {
  heap.expect_object(obj)?;
  Ok(None)
}

pub fn object_get_own_indexed(
  heap: &Heap,
  obj: GcObject,
  _index: u32,
) -> Result<Option<Value>, VmError> {
  heap.expect_object(obj)?;
  Ok(None)
}

pub fn object_set_own_indexed(
  scope: &mut Scope<'_>,
  obj: GcObject,
  _index: u32,
  _value: Value,
) -> Result<bool, VmError> {
  scope.heap().expect_object(obj)?;
  Ok(false)
}

pub fn object_delete_own_indexed(
  scope: &mut Scope<'_>,
  obj: GcObject,
  _index: u32,
) -> Result<bool, VmError> {
  scope.heap().expect_object(obj)?;
  // Nothing stored, so the element is trivially absent.
  Ok(true)
}

pub fn object_check_all_own_indexed(
  heap: &Heap,
  obj: GcObject,
  _check: IndexedCheck,
) -> Result<bool, VmError> {
  heap.expect_object(obj)?;
  // Vacuously true over an empty range.
  Ok(true)
}

impl Heap {
  /// Dispatches [`IndexedProtocol::own_indexed_range`] for `obj`'s kind.
  pub fn own_indexed_range(&self, obj: GcObject) -> Result<Range<u32>, VmError> {
    (self.descriptor_of(obj)?.indexed.own_indexed_range)(self, obj)
  }

  /// Dispatches [`IndexedProtocol::have_own_indexed`] for `obj`'s kind.
  pub fn have_own_indexed(&self, obj: GcObject, index: u32) -> Result<bool, VmError> {
    (self.descriptor_of(obj)?.indexed.have_own_indexed)(self, obj, index)
  }

  /// Dispatches [`IndexedProtocol::own_indexed_flags`] for `obj`'s kind.
  pub fn own_indexed_flags(
    &self,
    obj: GcObject,
    index: u32,
  ) -> Result<Option<IndexedFlags>, VmError> {
    (self.descriptor_of(obj)?.indexed.own_indexed_flags)(self, obj, index)
  }

  /// Dispatches [`IndexedProtocol::get_own_indexed`] for `obj`'s kind.
  pub fn get_own_indexed(&self, obj: GcObject, index: u32) -> Result<Option<Value>, VmError> {
    (self.descriptor_of(obj)?.indexed.get_own_indexed)(self, obj, index)
  }

  /// Dispatches [`IndexedProtocol::check_all_own_indexed`] for `obj`'s kind.
  pub fn check_all_own_indexed(&self, obj: GcObject, check: IndexedCheck) -> Result<bool, VmError> {
    (self.descriptor_of(obj)?.indexed.check_all_own_indexed)(self, obj, check)
  }
}

impl<'a> Scope<'a> {
  /// Dispatches [`IndexedProtocol::set_own_indexed`] for `obj`'s kind.
  pub fn set_own_indexed(&mut self, obj: GcObject, index: u32, value: Value) -> Result<bool, VmError> {
    let f = self.heap().descriptor_of(obj)?.indexed.set_own_indexed;
    f(self, obj, index, value)
  }

  /// Dispatches [`IndexedProtocol::delete_own_indexed`] for `obj`'s kind.
  pub fn delete_own_indexed(&mut self, obj: GcObject, index: u32) -> Result<bool, VmError> {
    let f = self.heap().descriptor_of(obj)?.indexed.delete_own_indexed;
    f(self, obj, index)
  }
}
