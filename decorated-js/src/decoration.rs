use std::any::Any;

/// Marker capability asserting that a type stores **no GC handles**.
///
/// A [`Decoration`] is never traced: the collector does not look inside it
/// for managed references, so a handle stored in one dangles as soon as the
/// referenced cell is collected. Any managed reference a payload needs must
/// live in the owning cell's property slots instead, which *are* traced.
///
/// # Safety
///
/// Implementers assert that the type contains no [`GcObject`](crate::GcObject),
/// [`GcString`](crate::GcString), [`Value`](crate::Value), or anything else
/// that refers into a [`Heap`](crate::Heap), directly or transitively.
pub unsafe trait HandleFree {}

unsafe impl HandleFree for () {}
unsafe impl HandleFree for bool {}
unsafe impl HandleFree for u8 {}
unsafe impl HandleFree for u16 {}
unsafe impl HandleFree for u32 {}
unsafe impl HandleFree for u64 {}
unsafe impl HandleFree for usize {}
unsafe impl HandleFree for i8 {}
unsafe impl HandleFree for i16 {}
unsafe impl HandleFree for i32 {}
unsafe impl HandleFree for i64 {}
unsafe impl HandleFree for isize {}
unsafe impl HandleFree for f32 {}
unsafe impl HandleFree for f64 {}
unsafe impl HandleFree for String {}
unsafe impl<T: HandleFree> HandleFree for Option<T> {}
unsafe impl<T: HandleFree> HandleFree for Box<T> {}
unsafe impl<T: HandleFree> HandleFree for Vec<T> {}

/// An externally-owned native payload attached to exactly one cell.
///
/// A decoration is constructed by the caller, transferred by unique ownership
/// into a cell at creation (or via
/// [`Heap::set_decoration`](crate::Heap::set_decoration)), and dropped exactly
/// once when the owning cell is finalized, replaced, or cleared. It is never
/// shared between cells.
///
/// The one required operation is [`external_size`](Decoration::external_size):
/// the payload's own native-heap footprint in bytes, fed to the collector's
/// growth heuristics as *external* memory (it does not count against the
/// managed-heap budget). Destruction is ordinary [`Drop`]; a payload's `Drop`
/// must not panic, since it runs inside the collector's sweep.
pub trait Decoration: HandleFree + Any {
  /// The decoration's own native-heap footprint in bytes.
  ///
  /// Must be side-effect-free and allocation-free; the collector may call it
  /// any number of times while the owning cell is alive, including during a
  /// collection pause. Advisory: moderate staleness is tolerated, systematic
  /// over/under-reporting skews collection frequency.
  fn external_size(&self) -> usize {
    core::mem::size_of_val(self)
  }
}

impl dyn Decoration {
  /// Returns `true` if the payload is a `T`.
  pub fn is<T: Decoration>(&self) -> bool {
    (self as &dyn Any).is::<T>()
  }

  /// Downcasts the payload to a concrete `T`.
  pub fn downcast_ref<T: Decoration>(&self) -> Option<&T> {
    (self as &dyn Any).downcast_ref::<T>()
  }

  /// Downcasts the payload to a concrete `T`, mutably.
  pub fn downcast_mut<T: Decoration>(&mut self) -> Option<&mut T> {
    (self as &mut dyn Any).downcast_mut::<T>()
  }
}
