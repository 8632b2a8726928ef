//! Refcounted byte blocks: the storage unit shared between chains.
//!
//! A block is either *internal* (a single allocation holding the header and a
//! mutable arena) or *external* (the header plus a type-erased payload owning
//! the bytes). The header's second word is tagged: the high bit distinguishes
//! an external vtable pointer from an internal arena capacity.

use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use core::{
    any::TypeId,
    fmt, mem,
    mem::ManuallyDrop,
    ptr,
    ptr::NonNull,
    slice,
};

use crate::{
    chain::Options,
    external::{BlockSubstr, ExternalBytes},
    refcount::RefCount,
    utils::{panic_block_capacity_overflow, UnwrapChecked},
};

/// Blocks smaller than this are tiny and get merged with their neighbors.
pub(crate) const MIN_BLOCK_SIZE: usize = 16;
/// Default ceiling for freshly allocated block arenas.
pub(crate) const MAX_BLOCK_SIZE: usize = 64 << 10;
/// Fixed cost charged to an allocation when weighing copying against
/// rewriting a wasteful block.
pub(crate) const ALLOCATION_COST: usize = 256;
/// Data at most this long is copied instead of sharing block ownership.
pub(crate) const MAX_BYTES_TO_COPY: usize = 511;
/// Hard bound on an internal arena, leaving room for the header.
pub(crate) const MAX_BLOCK_CAPACITY: usize =
    isize::MAX as usize - mem::size_of::<BlockInner>();

const EXTERNAL_FLAG: usize = !(usize::MAX >> 1);
const VTABLE_SHIFT: usize = 1;

#[repr(C)]
pub(crate) struct BlockInner {
    refcount: RefCount,
    // External block: `EXTERNAL_FLAG | (vtable address >> VTABLE_SHIFT)`.
    // Internal block: the arena capacity (always below `EXTERNAL_FLAG`).
    vtable_or_capacity: usize,
    data: *const u8,
    size: usize,
}

// The payload follows the header in the same allocation.
#[repr(C)]
struct ExternalInner<P> {
    header: BlockInner,
    payload: P,
}

pub(crate) struct ExternalVTable {
    deallocate: unsafe fn(*mut BlockInner),
    payload: unsafe fn(*const BlockInner, TypeId) -> Option<NonNull<()>>,
    dump: unsafe fn(*const BlockInner, &mut fmt::Formatter<'_>) -> fmt::Result,
    owned_memory: unsafe fn(*const BlockInner) -> usize,
}

unsafe fn deallocate_external<P: ExternalBytes>(ptr: *mut BlockInner) {
    let inner = ptr.cast::<ExternalInner<P>>();
    unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*inner).payload)) };
    unsafe { dealloc(inner.cast(), Layout::new::<ExternalInner<P>>()) };
}

unsafe fn payload_external<P: ExternalBytes>(
    ptr: *const BlockInner,
    type_id: TypeId,
) -> Option<NonNull<()>> {
    if type_id != TypeId::of::<P>() {
        return None;
    }
    let inner = ptr.cast::<ExternalInner<P>>();
    Some(NonNull::from(unsafe { &(*inner).payload }).cast())
}

unsafe fn dump_external<P: ExternalBytes>(
    ptr: *const BlockInner,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    unsafe { &(*ptr.cast::<ExternalInner<P>>()).payload }.dump(f)
}

unsafe fn owned_memory_external<P: ExternalBytes>(ptr: *const BlockInner) -> usize {
    let payload = unsafe { &(*ptr.cast::<ExternalInner<P>>()).payload };
    mem::size_of::<ExternalInner<P>>() + payload.owned_memory()
}

fn vtable<P: ExternalBytes>() -> &'static ExternalVTable {
    &ExternalVTable {
        deallocate: deallocate_external::<P>,
        payload: payload_external::<P>,
        dump: dump_external::<P>,
        owned_memory: owned_memory_external::<P>,
    }
}

fn internal_layout(capacity: usize) -> Layout {
    let header = Layout::new::<BlockInner>();
    let (layout, _) = header
        .extend(Layout::array::<u8>(capacity).unwrap_or_else(|_| panic_block_capacity_overflow()))
        .unwrap_or_else(|_| panic_block_capacity_overflow());
    layout
}

const ARENA_OFFSET: usize = mem::size_of::<BlockInner>();

/// An owning handle on a refcounted block.
#[repr(transparent)]
pub(crate) struct Block {
    inner: NonNull<BlockInner>,
}

unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    pub(crate) fn new_internal(min_capacity: usize) -> Self {
        debug_assert!(min_capacity > 0, "zero block capacity");
        if min_capacity > MAX_BLOCK_CAPACITY {
            panic_block_capacity_overflow();
        }
        let layout = internal_layout(min_capacity);
        let ptr = unsafe { alloc(layout) };
        let Some(inner) = NonNull::new(ptr.cast::<BlockInner>()) else {
            handle_alloc_error(layout)
        };
        let arena_start = unsafe { ptr.add(ARENA_OFFSET) };
        unsafe {
            inner.as_ptr().write(BlockInner {
                refcount: RefCount::new(),
                vtable_or_capacity: min_capacity,
                data: arena_start,
                size: 0,
            });
        }
        Self { inner }
    }

    pub(crate) fn new_external<P: ExternalBytes>(payload: P) -> Self {
        let layout = Layout::new::<ExternalInner<P>>();
        let ptr = unsafe { alloc(layout) };
        let Some(inner) = NonNull::new(ptr.cast::<ExternalInner<P>>()) else {
            handle_alloc_error(layout)
        };
        let vtable_ptr = vtable::<P>() as *const ExternalVTable as usize;
        unsafe {
            inner.as_ptr().write(ExternalInner {
                header: BlockInner {
                    refcount: RefCount::new(),
                    vtable_or_capacity: EXTERNAL_FLAG | (vtable_ptr >> VTABLE_SHIFT),
                    data: ptr::null(),
                    size: 0,
                },
                payload,
            });
            let bytes = (*inner.as_ptr()).payload.as_bytes();
            let header = ptr::addr_of_mut!((*inner.as_ptr()).header);
            (*header).data = bytes.as_ptr();
            (*header).size = bytes.len();
        }
        Self {
            inner: inner.cast(),
        }
    }

    /// A view of `sub` (contained in `self`) sharing ownership with `self`.
    /// Substring blocks cite the original block, never another substring.
    pub(crate) fn substr(&self, sub_offset: usize, sub_len: usize) -> Self {
        debug_assert!(sub_offset + sub_len <= self.size());
        let data = unsafe { self.data().add(sub_offset) };
        let target = match self.payload::<BlockSubstr>() {
            Some(substr) => substr.target.clone(),
            None => self.clone(),
        };
        let mut block = Self::new_external(BlockSubstr { target });
        unsafe { block.set_window(data, sub_len) };
        block
    }

    fn inner(&self) -> &BlockInner {
        unsafe { self.inner.as_ref() }
    }

    /// # Safety
    ///
    /// The caller must be the unique owner, or the block freshly constructed.
    unsafe fn header_mut(&mut self) -> &mut BlockInner {
        unsafe { self.inner.as_mut() }
    }

    /// # Safety
    ///
    /// `data..data + size` must lie within the payload bytes, and the block
    /// must not be shared yet.
    pub(crate) unsafe fn set_window(&mut self, data: *const u8, size: usize) {
        let header = unsafe { self.header_mut() };
        header.data = data;
        header.size = size;
    }

    fn external_vtable(&self) -> Option<&'static ExternalVTable> {
        let word = self.inner().vtable_or_capacity;
        if word & EXTERNAL_FLAG == 0 {
            return None;
        }
        let addr = word << VTABLE_SHIFT;
        Some(unsafe { &*(addr as *const ExternalVTable) })
    }

    pub(crate) fn is_internal(&self) -> bool {
        self.inner().vtable_or_capacity & EXTERNAL_FLAG == 0
    }

    pub(crate) fn capacity(&self) -> usize {
        debug_assert!(self.is_internal());
        self.inner().vtable_or_capacity
    }

    fn data(&self) -> *const u8 {
        self.inner().data
    }

    pub(crate) fn size(&self) -> usize {
        self.inner().size
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data(), self.size()) }
    }

    pub(crate) fn has_unique_owner(&self) -> bool {
        self.inner().refcount.is_unique()
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.inner().refcount.get()
    }

    fn arena_start(&self) -> *mut u8 {
        debug_assert!(self.is_internal());
        unsafe { self.inner.as_ptr().cast::<u8>().add(ARENA_OFFSET) }
    }

    fn arena_end(&self) -> *mut u8 {
        unsafe { self.arena_start().add(self.capacity()) }
    }

    /// Free bytes before the live region; an empty block counts its whole
    /// arena on both sides.
    pub(crate) fn space_before(&self) -> usize {
        if self.is_empty() {
            self.capacity()
        } else {
            self.data() as usize - self.arena_start() as usize
        }
    }

    /// Free bytes after the live region; an empty block counts its whole
    /// arena on both sides.
    pub(crate) fn space_after(&self) -> usize {
        if self.is_empty() {
            self.capacity()
        } else {
            self.arena_end() as usize - unsafe { self.data().add(self.size()) } as usize
        }
    }

    fn raw_space_before(&self) -> usize {
        self.data() as usize - self.arena_start() as usize
    }

    fn raw_space_after(&self) -> usize {
        self.arena_end() as usize - unsafe { self.data().add(self.size()) } as usize
    }

    /// A block whose final size would stay below the merge threshold.
    /// External blocks are never tiny.
    pub(crate) fn tiny(&self, extra_size: usize) -> bool {
        if !self.is_internal() {
            debug_assert_eq!(extra_size, 0);
            return false;
        }
        debug_assert!(extra_size <= self.capacity() - self.size());
        self.size() + extra_size < MIN_BLOCK_SIZE
    }

    /// An internal block using less than half of its allocation, counting a
    /// fixed allocation cost. External blocks are never wasteful.
    pub(crate) fn wasteful(&self, extra_size: usize) -> bool {
        if !self.is_internal() {
            debug_assert_eq!(extra_size, 0);
            return false;
        }
        self.capacity() >= 2 * (self.size() + extra_size) + ALLOCATION_COST
    }

    fn is_mutable(&self) -> bool {
        self.is_internal() && self.has_unique_owner()
    }

    pub(crate) fn can_append(&self, length: usize) -> bool {
        self.is_mutable() && self.space_after() >= length
    }

    pub(crate) fn can_prepend(&self, length: usize) -> bool {
        self.is_mutable() && self.space_before() >= length
    }

    /// Like `can_append`, but also succeeds by sliding the contents towards
    /// the arena start when they occupy at most half of it; this bound keeps
    /// the amortized cost of appending one byte constant. On failure returns
    /// the space before the contents, for capacity computations.
    pub(crate) fn can_append_moving(&mut self, length: usize) -> Result<(), usize> {
        if !self.is_mutable() {
            return Err(0);
        }
        if self.space_after() >= length {
            return Ok(());
        }
        let final_size = self.size() + length;
        if final_size * 2 <= self.capacity() {
            let new_begin = unsafe { self.arena_start().add((self.capacity() - final_size) / 2) };
            unsafe { ptr::copy(self.data(), new_begin, self.size()) };
            unsafe { self.header_mut() }.data = new_begin;
            return Ok(());
        }
        Err(self.space_before())
    }

    /// Symmetric to [`can_append_moving`](Self::can_append_moving); returns
    /// the space after the contents on failure.
    pub(crate) fn can_prepend_moving(&mut self, length: usize) -> Result<(), usize> {
        if !self.is_mutable() {
            return Err(0);
        }
        if self.space_before() >= length {
            return Ok(());
        }
        let final_size = self.size() + length;
        if final_size * 2 <= self.capacity() {
            let new_begin = unsafe {
                self.arena_end()
                    .sub((self.capacity() - final_size) / 2 + self.size())
            };
            unsafe { ptr::copy(self.data(), new_begin, self.size()) };
            unsafe { self.header_mut() }.data = new_begin;
            return Ok(());
        }
        Err(self.space_after())
    }

    /// Extends the live region by up to `max_length` trailing free bytes and
    /// returns the new writable window.
    pub(crate) fn append_buffer(&mut self, max_length: usize) -> &mut [u8] {
        debug_assert!(self.can_append(0), "block is immutable");
        if self.is_empty() {
            let start = self.arena_start();
            unsafe { self.header_mut() }.data = start;
        }
        let length = self.raw_space_after().min(max_length);
        let buffer_start = unsafe { self.data().add(self.size()) as *mut u8 };
        unsafe { self.header_mut() }.size += length;
        unsafe { slice::from_raw_parts_mut(buffer_start, length) }
    }

    /// Extends the live region by up to `max_length` leading free bytes and
    /// returns the new writable window.
    pub(crate) fn prepend_buffer(&mut self, max_length: usize) -> &mut [u8] {
        debug_assert!(self.can_prepend(0), "block is immutable");
        if self.is_empty() {
            let end = self.arena_end();
            unsafe { self.header_mut() }.data = end;
        }
        let length = self.raw_space_before().min(max_length);
        let buffer_start = unsafe { self.data().sub(length) as *mut u8 };
        {
            let header = unsafe { self.header_mut() };
            header.data = buffer_start;
            header.size += length;
        }
        unsafe { slice::from_raw_parts_mut(buffer_start, length) }
    }

    pub(crate) fn append_slice(&mut self, src: &[u8]) {
        debug_assert!(self.can_append(src.len()), "not enough space");
        if self.is_empty() {
            let start = self.arena_start();
            unsafe { self.header_mut() }.data = start;
        }
        unsafe {
            ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.data().add(self.size()) as *mut u8,
                src.len(),
            );
            self.header_mut().size += src.len();
        }
    }

    /// Appends, placing the contents of a previously empty block so that
    /// `space_before` free bytes precede them.
    pub(crate) fn append_placed(&mut self, src: &[u8], space_before: usize) {
        if self.is_empty() {
            let start = unsafe { self.arena_start().add(space_before) };
            unsafe { self.header_mut() }.data = start;
        }
        self.append_slice(src);
    }

    pub(crate) fn prepend_slice(&mut self, src: &[u8]) {
        debug_assert!(self.can_prepend(src.len()), "not enough space");
        if self.is_empty() {
            let end = self.arena_end();
            unsafe { self.header_mut() }.data = end;
        }
        unsafe {
            let new_begin = self.data().sub(src.len()) as *mut u8;
            ptr::copy_nonoverlapping(src.as_ptr(), new_begin, src.len());
            let header = self.header_mut();
            header.data = new_begin;
            header.size += src.len();
        }
    }

    /// Prepends, placing the contents of a previously empty block so that
    /// `space_after` free bytes follow them.
    pub(crate) fn prepend_placed(&mut self, src: &[u8], space_after: usize) {
        if self.is_empty() {
            let end = unsafe { self.arena_end().sub(space_after) };
            unsafe { self.header_mut() }.data = end;
        }
        self.prepend_slice(src);
    }

    /// Deep copy into a fresh internal block with capacity equal to the size;
    /// the result is never wasteful.
    pub(crate) fn copy(&self) -> Self {
        let mut block = Self::new_internal(self.size().max(1));
        block.append_slice(self.as_slice());
        debug_assert!(!block.wasteful(0));
        block
    }

    pub(crate) fn try_clear(&mut self) -> bool {
        if self.is_mutable() {
            unsafe { self.header_mut() }.size = 0;
            true
        } else {
            false
        }
    }

    /// Trims the live window in place when no other owner can observe the
    /// trimmed region.
    pub(crate) fn try_remove_suffix(&mut self, length: usize) -> bool {
        debug_assert!(length <= self.size());
        if self.has_unique_owner() {
            unsafe { self.header_mut() }.size -= length;
            true
        } else {
            false
        }
    }

    pub(crate) fn try_remove_prefix(&mut self, length: usize) -> bool {
        debug_assert!(length <= self.size());
        if self.has_unique_owner() {
            let header = unsafe { self.header_mut() };
            header.data = unsafe { header.data.add(length) };
            header.size -= length;
            true
        } else {
            false
        }
    }

    pub(crate) fn payload<P: ExternalBytes>(&self) -> Option<&P> {
        let vtable = self.external_vtable()?;
        let payload = unsafe { (vtable.payload)(self.inner.as_ptr(), TypeId::of::<P>())? };
        Some(unsafe { payload.cast::<P>().as_ref() })
    }

    pub(crate) fn payload_if_unique<P: ExternalBytes>(&self) -> Option<&P> {
        if self.has_unique_owner() {
            self.payload::<P>()
        } else {
            None
        }
    }

    /// Moves the payload out of a uniquely owned external block of type `P`.
    pub(crate) fn try_take_payload<P: ExternalBytes>(self) -> Result<P, Self> {
        if !self.has_unique_owner() {
            return Err(self);
        }
        let Some(vtable) = self.external_vtable() else {
            return Err(self);
        };
        let Some(payload) = (unsafe { (vtable.payload)(self.inner.as_ptr(), TypeId::of::<P>()) })
        else {
            return Err(self);
        };
        let this = ManuallyDrop::new(self);
        let payload = unsafe { payload.cast::<P>().as_ptr().read() };
        unsafe {
            dealloc(
                this.inner.as_ptr().cast(),
                Layout::new::<ExternalInner<P>>(),
            );
        }
        Ok(payload)
    }

    pub(crate) fn allocated_memory(&self) -> usize {
        match self.external_vtable() {
            Some(vtable) => unsafe { (vtable.owned_memory)(self.inner.as_ptr()) },
            None => mem::size_of::<BlockInner>() + self.capacity(),
        }
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        self.inner().refcount.incr();
        Self { inner: self.inner }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if self.inner().refcount.decr() {
            match self.external_vtable() {
                Some(vtable) => unsafe { (vtable.deallocate)(self.inner.as_ptr()) },
                None => {
                    let layout = internal_layout(self.capacity());
                    unsafe { dealloc(self.inner.as_ptr().cast(), layout) };
                }
            }
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {{")?;
        let ref_count = self.ref_count();
        if ref_count != 1 {
            write!(f, " ref_count: {ref_count}")?;
        }
        write!(f, " size: {}", self.size())?;
        match self.external_vtable() {
            None => {
                if self.raw_space_before() > 0 {
                    write!(f, " space_before: {}", self.raw_space_before())?;
                }
                write!(f, " space_after: {}", self.raw_space_after())?;
            }
            Some(vtable) => {
                f.write_str(" ")?;
                unsafe { (vtable.dump)(self.inner.as_ptr(), f)? };
            }
        }
        write!(f, " }}")
    }
}

/// A flat buffer backed by at most one block.
///
/// Grows by sliding skewed contents within the arena or rewriting into a
/// larger block, so repeated appends and prepends stay amortized constant.
/// Feeding one into [`Chain::append`](crate::Chain::append) attaches the
/// block without copying.
#[derive(Default)]
pub struct BlockBuf {
    block: Option<Block>,
}

impl BlockBuf {
    pub const fn new() -> Self {
        Self { block: None }
    }

    /// Wraps externally owned bytes without copying them.
    pub fn from_external<P: ExternalBytes>(payload: P) -> Self {
        if payload.as_bytes().is_empty() {
            return Self::new();
        }
        Self {
            block: Some(Block::new_external(payload)),
        }
    }

    pub(crate) fn into_block(self) -> Option<Block> {
        self.block
    }

    pub fn len(&self) -> usize {
        self.block.as_ref().map_or(0, Block::size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.block.as_ref().map_or(&[], Block::as_slice)
    }

    pub fn clear(&mut self) {
        if let Some(block) = &mut self.block {
            if !block.try_clear() {
                self.block = None;
            }
        }
    }

    fn new_block_capacity(
        old_size: usize,
        min_length: usize,
        recommended_length: usize,
        options: &Options,
    ) -> usize {
        if min_length > MAX_BLOCK_CAPACITY - old_size {
            panic_block_capacity_overflow();
        }
        old_size
            + crate::chain::buffer_length(
                min_length,
                options.max_block_size().saturating_sub(old_size),
                recommended_length
                    .max(old_size)
                    .max(options.min_block_size().saturating_sub(old_size)),
                options.size_hint(),
                old_size,
            )
    }

    /// Returns a writable window of `min_length..=max_length` bytes appended
    /// to the buffer. The window already counts towards `len`; callers that
    /// fill less must [`remove_suffix`](Self::remove_suffix) the rest.
    pub fn append_buffer(
        &mut self,
        min_length: usize,
        recommended_length: usize,
        max_length: usize,
        options: &Options,
    ) -> &mut [u8] {
        debug_assert!(min_length <= max_length);
        match &mut self.block {
            None => {
                if min_length == 0 {
                    return &mut [];
                }
                self.block = Some(Block::new_internal(Self::new_block_capacity(
                    0,
                    min_length,
                    recommended_length,
                    options,
                )));
            }
            Some(block) => {
                if let Err(space_before) = block.can_append_moving(min_length) {
                    if min_length == 0 {
                        return &mut [];
                    }
                    // Rewrite, keeping the space before the contents unchanged.
                    let mut fresh = Block::new_internal(Self::new_block_capacity(
                        space_before + block.size(),
                        min_length,
                        recommended_length,
                        options,
                    ));
                    fresh.append_placed(block.as_slice(), space_before);
                    *block = fresh;
                }
            }
        }
        let block = self.block.as_mut().unwrap_checked();
        let buffer = block.append_buffer(max_length);
        debug_assert!(buffer.len() >= min_length);
        buffer
    }

    /// Symmetric to [`append_buffer`](Self::append_buffer) at the front.
    pub fn prepend_buffer(
        &mut self,
        min_length: usize,
        recommended_length: usize,
        max_length: usize,
        options: &Options,
    ) -> &mut [u8] {
        debug_assert!(min_length <= max_length);
        match &mut self.block {
            None => {
                if min_length == 0 {
                    return &mut [];
                }
                self.block = Some(Block::new_internal(Self::new_block_capacity(
                    0,
                    min_length,
                    recommended_length,
                    options,
                )));
            }
            Some(block) => {
                if let Err(space_after) = block.can_prepend_moving(min_length) {
                    if min_length == 0 {
                        return &mut [];
                    }
                    // Rewrite, keeping the space after the contents unchanged.
                    let mut fresh = Block::new_internal(Self::new_block_capacity(
                        space_after + block.size(),
                        min_length,
                        recommended_length,
                        options,
                    ));
                    fresh.prepend_placed(block.as_slice(), space_after);
                    *block = fresh;
                }
            }
        }
        let block = self.block.as_mut().unwrap_checked();
        let buffer = block.prepend_buffer(max_length);
        debug_assert!(buffer.len() >= min_length);
        buffer
    }

    pub fn append(&mut self, src: &[u8], options: &Options) {
        let buffer = self.append_buffer(src.len(), 0, src.len(), options);
        buffer.copy_from_slice(src);
    }

    pub fn prepend(&mut self, src: &[u8], options: &Options) {
        let buffer = self.prepend_buffer(src.len(), 0, src.len(), options);
        buffer.copy_from_slice(src);
    }

    pub fn remove_suffix(&mut self, length: usize, options: &Options) {
        if length == 0 {
            return;
        }
        let Some(block) = &mut self.block else {
            crate::utils::panic_out_of_range()
        };
        if length > block.size() {
            crate::utils::panic_out_of_range();
        }
        if block.try_remove_suffix(length) {
            return;
        }
        if length == block.size() {
            self.block = None;
            return;
        }
        // The block is shared: rewrite the retained prefix.
        let retained = block.size() - length;
        let mut fresh = Block::new_internal(retained.max(match options.size_hint() {
            Some(hint) if retained < hint => hint,
            _ => options.min_block_size(),
        }));
        fresh.append_slice(&block.as_slice()[..retained]);
        *block = fresh;
    }

    pub fn remove_prefix(&mut self, length: usize, options: &Options) {
        if length == 0 {
            return;
        }
        let Some(block) = &mut self.block else {
            crate::utils::panic_out_of_range()
        };
        if length > block.size() {
            crate::utils::panic_out_of_range();
        }
        if block.try_remove_prefix(length) {
            return;
        }
        if length == block.size() {
            self.block = None;
            return;
        }
        // The block is shared: rewrite the retained suffix.
        let retained = block.size() - length;
        let mut fresh = Block::new_internal(retained.max(match options.size_hint() {
            Some(hint) if retained < hint => hint,
            _ => options.min_block_size(),
        }));
        fresh.prepend_slice(&block.as_slice()[length..]);
        *block = fresh;
    }
}

impl fmt::Debug for BlockBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::utils::debug_bytes(self.as_slice(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_block_layout() {
        let block = Block::new_internal(64);
        assert!(block.is_internal());
        assert_eq!(block.capacity(), 64);
        assert_eq!(block.size(), 0);
        assert_eq!(block.space_before(), 64);
        assert_eq!(block.space_after(), 64);
    }

    #[test]
    fn append_and_prepend_in_place() {
        let mut block = Block::new_internal(32);
        block.append_slice(b"world");
        assert!(block.can_prepend(6));
        block.prepend_slice(b"hello ");
        assert_eq!(block.as_slice(), b"hello world");
    }

    // a shared block refuses mutation until the clone is dropped
    #[test]
    fn shared_block_is_frozen() {
        let mut block = Block::new_internal(32);
        block.append_slice(b"abc");
        let clone = block.clone();
        assert!(!block.can_append(1));
        assert!(!block.try_remove_suffix(1));
        drop(clone);
        assert!(block.can_append(1));
    }

    #[test]
    fn slide_makes_room() {
        let mut block = Block::new_internal(64);
        block.append_buffer(usize::MAX);
        assert!(block.try_remove_prefix(60));
        // 4 live bytes at the end of the arena; appending 8 slides them.
        assert_eq!(block.space_after(), 0);
        assert!(block.can_append_moving(8).is_ok());
        assert!(block.space_after() >= 8);
        assert_eq!(block.size(), 4);
    }

    #[test]
    fn tiny_and_wasteful() {
        let mut block = Block::new_internal(1024);
        assert!(block.tiny(0));
        assert!(block.wasteful(0));
        let buffer = block.append_buffer(usize::MAX);
        let filled = buffer.len();
        assert!(!block.tiny(0));
        assert!(!block.wasteful(0));
        assert!(block.try_remove_suffix(filled));
    }

    #[test]
    fn external_block_views_payload() {
        let payload: &'static [u8] = b"external bytes";
        let block = Block::new_external(payload);
        assert!(!block.is_internal());
        assert_eq!(block.as_slice(), payload);
        assert!(!block.tiny(0));
        assert!(!block.wasteful(0));
        assert!(!block.can_append(0));
    }

    #[test]
    fn substr_resolves_indirection() {
        let block = Block::new_external(alloc::vec![7u8; 100]);
        let sub = block.substr(10, 50);
        let subsub = sub.substr(5, 20);
        assert_eq!(sub.as_slice(), &[7; 50]);
        assert_eq!(subsub.as_slice(), &[7; 20]);
        // both substrings cite the original block, not each other
        assert!(core::ptr::eq(
            subsub.payload::<BlockSubstr>().unwrap().target.as_slice().as_ptr(),
            block.as_slice().as_ptr(),
        ));
    }

    #[test]
    fn take_payload_back() {
        let vec = alloc::vec![1u8, 2, 3];
        let block = Block::new_external(vec);
        let vec = block.try_take_payload::<alloc::vec::Vec<u8>>().unwrap();
        assert_eq!(vec, [1, 2, 3]);
    }

    #[test]
    fn block_buf_grows() {
        let options = Options::default();
        let mut buf = BlockBuf::new();
        for _ in 0..100 {
            buf.append(b"0123456789", &options);
        }
        assert_eq!(buf.len(), 1000);
        buf.remove_prefix(500, &options);
        buf.remove_suffix(100, &options);
        assert_eq!(buf.len(), 400);
        assert!(buf.as_slice().iter().all(|&b| b.is_ascii_digit()));
    }
}
