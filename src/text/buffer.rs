use std::alloc::{self, Layout};
use std::cell::Cell;
use std::ptr::{self, NonNull};
use std::slice;

/// The heap record shared by every handle in one copy group: the byte storage plus a plain
/// (non-atomic) reference count.
///
/// Invariant: `refs` equals the number of live [`CowString`](super::CowString) handles pointing
/// at this record. The record is reached only through [`NonNull`] pointers held by handles;
/// [`SharedBuffer::release`] frees the storage and the record itself when the count hits zero.
///
/// A record with `refs == 1` is exclusive and may be mutated through
/// [`as_mut_slice`](SharedBuffer::as_mut_slice); a record with `refs > 1` is shared and must be
/// left alone until the writing handle detaches.
pub(crate) struct SharedBuffer {
    data: NonNull<u8>,
    len: usize,
    refs: Cell<usize>,
}

impl SharedBuffer {
    /// Allocates a record holding a private copy of `bytes`, with a count of 1, and returns the
    /// pointer the owning handle stores.
    ///
    /// # Panics
    /// Panics if the storage layout size exceeds [`isize::MAX`]. Allocation failure itself is
    /// fatal, via [`alloc::handle_alloc_error`].
    pub(crate) fn with_bytes(bytes: &[u8]) -> NonNull<SharedBuffer> {
        let record = Box::new(SharedBuffer {
            data: Self::make_storage(bytes),
            len: bytes.len(),
            refs: Cell::new(1),
        });

        #[cfg(test)]
        crate::util::alloc::record_alloc();

        Box::into_non_null(record)
    }

    /// Allocates storage for a copy of `bytes`, returning a dangling pointer for empty input.
    ///
    /// # Panics
    /// Panics if the memory layout size exceeds [`isize::MAX`].
    fn make_storage(bytes: &[u8]) -> NonNull<u8> {
        let layout = Self::make_layout(bytes.len());
        if layout.size() == 0 {
            return NonNull::dangling();
        }

        let data = NonNull::new(
            // SAFETY: Zero-sized layouts have been guarded against.
            unsafe { alloc::alloc(layout) }
        ).unwrap_or_else(|| alloc::handle_alloc_error(layout));

        // SAFETY: The destination is a fresh allocation spanning exactly bytes.len() bytes, so it
        // can't overlap the source and both ranges are valid for the full copy.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), data.as_ptr(), bytes.len());
        }

        data
    }

    /// A helper function to create a [`Layout`] for `len` bytes of storage.
    ///
    /// # Panics
    /// Panics if memory layout size exceeds [`isize::MAX`].
    fn make_layout(len: usize) -> Layout {
        Layout::array::<u8>(len).expect("Capacity overflow!")
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// The number of live handles pointing at this record.
    pub(crate) fn count(&self) -> usize {
        self.refs.get()
    }

    pub(crate) fn is_shared(&self) -> bool {
        self.refs.get() > 1
    }

    /// Registers one more handle pointing at this record.
    ///
    /// # Panics
    /// Panics if the count would overflow [`usize::MAX`].
    pub(crate) fn retain(&self) {
        self.refs.set(self.refs.get().strict_add(1));
    }

    /// Drops one counted reference. When the last reference goes, the storage and the record
    /// itself are freed; otherwise the record stays alive for the remaining sharers.
    ///
    /// The caller's pointer is dead after this call, either way.
    pub(crate) fn release(record: NonNull<SharedBuffer>) {
        // SAFETY: The caller holds a counted reference, so the record is still live.
        let refs = unsafe { record.as_ref() }.refs.get();
        debug_assert!(refs > 0);

        if refs > 1 {
            // SAFETY: As above; the shared reference is dropped before the record is touched
            // again.
            unsafe { record.as_ref() }.refs.set(refs - 1);
            return;
        }

        // SAFETY: The count has reached zero, so this was the last reference and nothing can
        // observe the record after this point. It was created by Box::into_non_null in
        // with_bytes, so reconstructing the Box to drop it is sound.
        let record = unsafe { Box::from_non_null(record) };

        let layout = Self::make_layout(record.len);
        if layout.size() != 0 {
            // SAFETY: data was allocated in the global allocator with this exact layout.
            // Zero-sized layouts were never allocated and are guarded against deallocation.
            unsafe {
                alloc::dealloc(record.data.as_ptr(), layout);
            }
        }

        #[cfg(test)]
        crate::util::alloc::record_free();
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: data refers to len initialized bytes (copied in at construction) and len can't
        // exceed isize::MAX. Nothing hands out mutable access while a shared borrow is live: the
        // only mutation path is as_mut_slice, which requires &mut.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// Mutable access to the stored bytes. Handles must only call this on an exclusive record,
    /// through their own `&mut self`, so the returned slice can't alias another handle's view.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        debug_assert!(!self.is_shared());

        // SAFETY: data refers to len initialized bytes and len can't exceed isize::MAX. The
        // mutable borrow of self covers the whole lifetime of the slice.
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}
