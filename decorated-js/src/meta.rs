use crate::heap::ObjectCell;

/// Collects, for one cell, the count of leading slots the collector must
/// treat as managed references.
///
/// The builder is handed to a kind's
/// [`BuildMetaFn`](crate::kind::BuildMetaFn) during a collection pause.
/// Kinds declare their static overlap region first
/// ([`add_overlap_slots`](MetadataBuilder::add_overlap_slots), recomputed
/// from descriptor constants, never from per-instance state) and then
/// delegate to [`object_build_meta`] which declares the remaining
/// per-instance slots. The builder itself is two counters: building metadata
/// allocates nothing and has no side effects beyond describing shape, so it
/// is safe to run at any collection pause and idempotent across pauses.
#[derive(Default, Debug)]
pub struct MetadataBuilder {
  overlap: u32,
  values: u32,
}

impl MetadataBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declares `count` leading slots as kind-owned overlap references.
  pub fn add_overlap_slots(&mut self, count: u32) {
    self.overlap = self.overlap.saturating_add(count);
  }

  /// Declares `count` further reference slots after those already declared.
  pub fn add_value_slots(&mut self, count: u32) {
    self.values = self.values.saturating_add(count);
  }

  /// Overlap slots declared so far.
  pub fn overlap_slots(&self) -> u32 {
    self.overlap
  }

  /// Total reference slots declared so far (overlap + value slots).
  pub fn declared_slots(&self) -> u32 {
    self.overlap.saturating_add(self.values)
  }
}

/// Base scripting-object metadata builder.
///
/// Declares every instance slot not already claimed as overlap: reserved
/// anonymous slots and named-property slots alike are plain value slots the
/// collector must trace. Kinds layered on the base object call this last,
/// after declaring their own overlap region.
pub fn object_build_meta(cell: &ObjectCell, mb: &mut MetadataBuilder) {
  let total = cell.slots().len() as u32;
  mb.add_value_slots(total.saturating_sub(mb.declared_slots()));
}
