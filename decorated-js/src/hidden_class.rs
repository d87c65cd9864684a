use ahash::AHashMap;

use crate::GcObject;

/// Identifies a hidden class in a heap's class table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub(crate) struct HiddenClassId(pub(crate) u32);

/// A shared description of an object's slot layout: how many leading slots
/// are reserved (anonymous), and which names occupy the slots after them.
///
/// Classes are derived, never mutated in place (aside from their transition
/// cache): adding a named property moves the object to a child class with the
/// name appended.
#[derive(Debug)]
pub(crate) struct HiddenClass {
  /// Creation-time prototype, part of the root-class key only. The live
  /// prototype is stored on the cell; this handle is never traced, so a
  /// stale entry here is harmless (generation checks keep it from matching
  /// any later allocation).
  pub(crate) prototype: Option<GcObject>,
  /// Leading slots reserved at creation: overlap + anonymous + additional.
  pub(crate) reserved_slots: u32,
  /// Named-property slots in slot order; name `i` lives at slot
  /// `reserved_slots + i`.
  pub(crate) names: Vec<Box<str>>,
  transitions: AHashMap<Box<str>, HiddenClassId>,
}

impl HiddenClass {
  /// The slot index of a named property, if the class has it.
  pub(crate) fn name_slot(&self, name: &str) -> Option<usize> {
    self
      .names
      .iter()
      .position(|n| n.as_ref() == name)
      .map(|i| self.reserved_slots as usize + i)
  }

  /// Total slots an instance of this class carries.
  pub(crate) fn total_slots(&self) -> usize {
    self.reserved_slots as usize + self.names.len()
  }
}

/// The heap's hidden-class derivation table.
///
/// `class_for` is the black-box `classFor(prototype, slotCount)` consumed by
/// the creation protocol; `transition` derives the child class for a named
/// property addition. Both are lookup-or-derive and never invalidate
/// previously returned ids.
pub(crate) struct ClassTable {
  classes: Vec<HiddenClass>,
  root_classes: AHashMap<(Option<GcObject>, u32), HiddenClassId>,
}

impl ClassTable {
  pub(crate) fn new() -> Self {
    Self {
      classes: Vec::new(),
      root_classes: AHashMap::new(),
    }
  }

  pub(crate) fn get(&self, id: HiddenClassId) -> &HiddenClass {
    // Ids are only minted by this table.
    &self.classes[id.0 as usize]
  }

  /// Looks up or derives the root class for `(prototype, reserved_slots)`.
  pub(crate) fn class_for(
    &mut self,
    prototype: Option<GcObject>,
    reserved_slots: u32,
  ) -> HiddenClassId {
    if let Some(id) = self.root_classes.get(&(prototype, reserved_slots)) {
      return *id;
    }
    let id = self.push(HiddenClass {
      prototype,
      reserved_slots,
      names: Vec::new(),
      transitions: AHashMap::new(),
    });
    self.root_classes.insert((prototype, reserved_slots), id);
    id
  }

  /// Looks up or derives the child of `class` with `name` appended.
  pub(crate) fn transition(&mut self, class: HiddenClassId, name: &str) -> HiddenClassId {
    if let Some(id) = self.get(class).transitions.get(name) {
      return *id;
    }
    let parent = self.get(class);
    debug_assert!(parent.name_slot(name).is_none(), "transition on existing name");
    let mut names = Vec::with_capacity(parent.names.len() + 1);
    names.extend(parent.names.iter().cloned());
    names.push(Box::from(name));
    let child = HiddenClass {
      prototype: parent.prototype,
      reserved_slots: parent.reserved_slots,
      names,
      transitions: AHashMap::new(),
    };
    let id = self.push(child);
    self.classes[class.0 as usize]
      .transitions
      .insert(Box::from(name), id);
    id
  }

  fn push(&mut self, class: HiddenClass) -> HiddenClassId {
    let id = HiddenClassId(self.classes.len() as u32);
    self.classes.push(class);
    id
  }
}
