//! Single-owner handle over a heap-allocated value.
//!
//! [`OwnedSlot`] holds at most one heap pointer and releases it exactly once:
//! on [`OwnedSlot::release`] or when the slot is dropped, whichever comes
//! first. The type is move-only. Duplicating a slot is rejected at compile
//! time:
//!
//! ```compile_fail
//! use eou_core::OwnedSlot;
//!
//! let a = OwnedSlot::new(42_i64);
//! let b = a.clone();
//! ```
//!
//! and a moved-from binding cannot be used again, so two bindings never own
//! the same address:
//!
//! ```compile_fail
//! use eou_core::OwnedSlot;
//!
//! let a = OwnedSlot::new(42_i64);
//! let b = a;
//! let c = a;
//! ```
//!
//! Slots that live in place (array elements, struct fields) are moved with
//! [`OwnedSlot::take`], which leaves the source empty so that its later
//! destruction is a no-op.
//!
//! [`SlotValue`] lets heap-owned and stack-borrowed storage share one
//! collection without the stack side ever reaching the release path.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::metrics::{OwnershipMetrics, global_metrics};

/// Move-only owner of a nullable heap pointer.
pub struct OwnedSlot<T> {
    value: Option<NonNull<T>>,
    _owns: PhantomData<T>,
}

impl<T> OwnedSlot<T> {
    /// An empty slot. No allocation.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            value: None,
            _owns: PhantomData,
        }
    }

    /// Move `value` to the heap and own it.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Take ownership of an existing heap value.
    #[must_use]
    pub fn from_box(value: Box<T>) -> Self {
        OwnershipMetrics::inc(&global_metrics().slots_acquired);
        Self {
            value: Some(NonNull::from(Box::leak(value))),
            _owns: PhantomData,
        }
    }

    /// Take ownership of `ptr`, which may be null. No allocation.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from `Box::<T>::into_raw` (or an equivalent
    /// global-allocator allocation with `T`'s layout holding an initialized
    /// `T`), and no other owner may release it afterwards. In particular,
    /// never hand a slot a pointer to stack storage: releasing it is
    /// undefined behavior. Use [`SlotValue::BorrowedStack`] for that.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            Some(value) => {
                OwnershipMetrics::inc(&global_metrics().slots_acquired);
                Self {
                    value: Some(value),
                    _owns: PhantomData,
                }
            }
            None => Self::empty(),
        }
    }

    /// Returns true if the slot holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// The held address, or null.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.value
            .map_or(ptr::null(), |value| value.as_ptr().cast_const())
    }

    /// The held address for writing, or null.
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.value.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Shared access to the held value.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the slot is the unique owner of a live, initialized `T`;
        // the borrow is tied to `&self`.
        self.value.map(|value| unsafe { value.as_ref() })
    }

    /// Exclusive access to the held value.
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: as in `get`, and `&mut self` rules out other borrows.
        self.value.map(|mut value| unsafe { value.as_mut() })
    }

    /// Move ownership out, leaving this slot empty.
    #[must_use = "dropping the returned slot releases the value immediately"]
    pub fn take(&mut self) -> Self {
        Self {
            value: self.value.take(),
            _owns: PhantomData,
        }
    }

    /// Put `other` in this slot and return the previous owner.
    #[must_use = "dropping the returned slot releases the previous value"]
    pub fn replace(&mut self, other: Self) -> Self {
        std::mem::replace(self, other)
    }

    /// Move-assign into `dest`: `dest`'s previous value is released, this
    /// slot's value moves into `dest`, and this slot is left empty.
    pub fn transfer_into(&mut self, dest: &mut Self) {
        *dest = self.take();
    }

    /// Release the held value, if any. Returns whether anything was released.
    ///
    /// Safe to call repeatedly; every call after the first is a no-op.
    pub fn release(&mut self) -> bool {
        let Some(value) = self.value.take() else {
            return false;
        };
        // SAFETY: `value` came from a `Box<T>` allocation (see `from_box` /
        // `from_raw`) and was just taken out of the slot, so this is its only
        // release.
        drop(unsafe { Box::from_raw(value.as_ptr()) });
        OwnershipMetrics::inc(&global_metrics().slots_released);
        true
    }

    /// Give up ownership as a `Box`.
    #[must_use]
    pub fn into_box(mut self) -> Option<Box<T>> {
        let value = self.value.take()?;
        OwnershipMetrics::inc(&global_metrics().slots_relinquished);
        // SAFETY: `value` came from a `Box<T>` and the slot no longer holds it.
        Some(unsafe { Box::from_raw(value.as_ptr()) })
    }

    /// Give up ownership as a raw pointer (null for an empty slot). The
    /// caller becomes responsible for releasing it exactly once.
    #[must_use]
    pub fn into_raw(mut self) -> *mut T {
        match self.value.take() {
            Some(value) => {
                OwnershipMetrics::inc(&global_metrics().slots_relinquished);
                value.as_ptr()
            }
            None => ptr::null_mut(),
        }
    }
}

impl<T> Drop for OwnedSlot<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Default for OwnedSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Box<T>> for OwnedSlot<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for OwnedSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedSlot")
            .field("addr", &self.as_ptr())
            .field("value", &self.get())
            .finish()
    }
}

/// Storage for one slot of a mixed collection.
///
/// Only the `OwnedHeap` variant has a release path; stack storage is borrowed
/// for `'a` and cannot outlive its scope.
#[derive(Debug)]
pub enum SlotValue<'a, T> {
    /// Heap value owned by the slot.
    OwnedHeap(OwnedSlot<T>),
    /// Stack value borrowed from the enclosing scope.
    BorrowedStack(&'a mut T),
}

impl<'a, T> SlotValue<'a, T> {
    /// Heap-allocate `value` and own it.
    #[must_use]
    pub fn heap(value: T) -> Self {
        Self::OwnedHeap(OwnedSlot::new(value))
    }

    /// Borrow stack storage.
    #[must_use]
    pub fn stack(value: &'a mut T) -> Self {
        Self::BorrowedStack(value)
    }

    #[must_use]
    pub fn is_heap(&self) -> bool {
        matches!(self, Self::OwnedHeap(_))
    }

    #[must_use]
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::OwnedHeap(slot) => slot.get(),
            Self::BorrowedStack(value) => Some(&**value),
        }
    }

    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::OwnedHeap(slot) => slot.get_mut(),
            Self::BorrowedStack(value) => Some(&mut **value),
        }
    }

    /// Address of the stored value (null for an empty heap slot).
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        match self {
            Self::OwnedHeap(slot) => slot.as_ptr(),
            Self::BorrowedStack(value) => ptr::from_ref::<T>(&**value),
        }
    }

    /// Release heap storage. Borrowed stack storage is never released, and
    /// this returns `false` for it.
    pub fn release(&mut self) -> bool {
        match self {
            Self::OwnedHeap(slot) => slot.release(),
            Self::BorrowedStack(_) => false,
        }
    }
}

impl<T> From<OwnedSlot<T>> for SlotValue<'_, T> {
    fn from(slot: OwnedSlot<T>) -> Self {
        Self::OwnedHeap(slot)
    }
}

impl<'a, T> From<&'a mut T> for SlotValue<'a, T> {
    fn from(value: &'a mut T) -> Self {
        Self::BorrowedStack(value)
    }
}
