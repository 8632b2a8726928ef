//! The segmented byte buffer.
//!
//! A [`Chain`] presents an ordered sequence of refcounted blocks as one
//! logical byte string. Appending and prepending are amortized constant per
//! byte, copying a chain shares its blocks, and substrings of large shared
//! blocks are taken without copying. Contents of at most
//! [`MAX_SHORT_DATA_SIZE`](Chain::MAX_SHORT_DATA_SIZE) bytes are stored
//! inline with no allocation at all.

use alloc::{
    alloc::{alloc, dealloc, handle_alloc_error, Layout},
    string::String,
    vec::Vec,
};
use core::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    mem, ptr,
    ptr::NonNull,
    slice,
};

use crate::{
    block::{Block, BlockBuf, ALLOCATION_COST, MAX_BLOCK_CAPACITY, MAX_BYTES_TO_COPY},
    external::{ZeroRef, ZERO_PAGE},
    utils::{
        debug_bytes, panic_block_capacity_overflow, panic_out_of_range, panic_size_overflow,
        UnwrapChecked,
    },
};

/// Sizing policy for newly allocated blocks.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    size_hint: Option<usize>,
    min_block_size: usize,
    max_block_size: usize,
}

impl Options {
    pub const DEFAULT: Self = Self {
        size_hint: None,
        min_block_size: crate::block::MIN_BLOCK_SIZE,
        max_block_size: crate::block::MAX_BLOCK_SIZE,
    };

    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Advance estimate of the final chain size. Block capacities are grown
    /// so that a single block can hold the expected remainder.
    pub const fn with_size_hint(mut self, size_hint: usize) -> Self {
        self.size_hint = Some(size_hint);
        self
    }

    /// Floor for new block capacities; blocks smaller than this are tiny and
    /// get merged with their neighbors.
    pub const fn with_min_block_size(mut self, min_block_size: usize) -> Self {
        self.min_block_size = min_block_size;
        self
    }

    /// Ceiling for new block capacities; beyond it, appends allocate
    /// additional blocks.
    pub const fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub const fn size_hint(&self) -> Option<usize> {
        self.size_hint
    }

    pub const fn min_block_size(&self) -> usize {
        self.min_block_size
    }

    pub const fn max_block_size(&self) -> usize {
        self.max_block_size
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Buffer sizing shared by [`Chain`] and [`BlockBuf`]: clamp the recommended
/// length into `[min_length, max_length]` with the lower bound taking
/// precedence, after raising it so that one buffer can hold the remainder
/// promised by `size_hint`.
pub(crate) fn buffer_length(
    min_length: usize,
    max_length: usize,
    recommended_length: usize,
    size_hint: Option<usize>,
    pos: usize,
) -> usize {
    let mut length = recommended_length;
    if let Some(hint) = size_hint {
        if pos < hint {
            length = length.max(hint - pos);
        }
    }
    length.min(max_length).max(min_length)
}

const MAX_SHORT_DATA_SIZE: usize = 15;

fn slot_layout(capacity: usize) -> Layout {
    Layout::array::<Block>(capacity).unwrap_or_else(|_| panic_size_overflow())
}

fn offset_layout(capacity: usize) -> Layout {
    Layout::array::<usize>(capacity).unwrap_or_else(|_| panic_size_overflow())
}

// The array of block slots, either in-object ("here", at most 2 blocks) or
// heap-allocated with a parallel array of cumulative offsets of the same
// capacity. Offset entry `i` is the byte offset of block `i` relative to the
// value recorded for the first live slot, with wrap-around arithmetic.
enum Slots {
    Here {
        len: usize,
        blocks: [Option<Block>; 2],
    },
    Allocated(Allocated),
}

struct Allocated {
    blocks: NonNull<Block>,
    offsets: NonNull<usize>,
    cap: usize,
    begin: usize,
    end: usize,
}

unsafe impl Send for Allocated {}
unsafe impl Sync for Allocated {}

impl Allocated {
    fn with_capacity(cap: usize) -> Self {
        let blocks = unsafe { alloc(slot_layout(cap)) };
        let Some(blocks) = NonNull::new(blocks.cast::<Block>()) else {
            handle_alloc_error(slot_layout(cap))
        };
        let offsets = unsafe { alloc(offset_layout(cap)) };
        let Some(offsets) = NonNull::new(offsets.cast::<usize>()) else {
            handle_alloc_error(offset_layout(cap))
        };
        Self {
            blocks,
            offsets,
            cap,
            begin: 0,
            end: 0,
        }
    }

    fn len(&self) -> usize {
        self.end - self.begin
    }

    fn block(&self, index: usize) -> &Block {
        debug_assert!(index >= self.begin && index < self.end);
        unsafe { &*self.blocks.as_ptr().add(index) }
    }

    fn block_mut(&mut self, index: usize) -> &mut Block {
        debug_assert!(index >= self.begin && index < self.end);
        unsafe { &mut *self.blocks.as_ptr().add(index) }
    }

    unsafe fn write_block(&mut self, index: usize, block: Block) {
        unsafe { self.blocks.as_ptr().add(index).write(block) };
    }

    unsafe fn read_block(&self, index: usize) -> Block {
        unsafe { self.blocks.as_ptr().add(index).read() }
    }

    fn offset(&self, index: usize) -> usize {
        unsafe { *self.offsets.as_ptr().add(index) }
    }

    fn set_offset(&mut self, index: usize, value: usize) {
        unsafe { self.offsets.as_ptr().add(index).write(value) };
    }

    // Both arrays are moved within or between allocations with raw copies;
    // `Block` is a plain pointer wrapper, so no drop glue runs.
    unsafe fn shift_to(&mut self, new_begin: usize) {
        let len = self.len();
        unsafe {
            ptr::copy(
                self.blocks.as_ptr().add(self.begin),
                self.blocks.as_ptr().add(new_begin),
                len,
            );
            ptr::copy(
                self.offsets.as_ptr().add(self.begin),
                self.offsets.as_ptr().add(new_begin),
                len,
            );
        }
        self.begin = new_begin;
        self.end = new_begin + len;
    }

    fn reallocated(&self, new_cap: usize, new_begin: usize) -> Self {
        debug_assert!(new_begin + self.len() <= new_cap);
        let mut fresh = Self::with_capacity(new_cap);
        unsafe {
            ptr::copy_nonoverlapping(
                self.blocks.as_ptr().add(self.begin),
                fresh.blocks.as_ptr().add(new_begin),
                self.len(),
            );
            ptr::copy_nonoverlapping(
                self.offsets.as_ptr().add(self.begin),
                fresh.offsets.as_ptr().add(new_begin),
                self.len(),
            );
        }
        fresh.begin = new_begin;
        fresh.end = new_begin + self.len();
        fresh
    }

    fn dealloc_arrays(&mut self) {
        unsafe {
            dealloc(self.blocks.as_ptr().cast(), slot_layout(self.cap));
            dealloc(self.offsets.as_ptr().cast(), offset_layout(self.cap));
        }
    }
}

impl Slots {
    const fn new() -> Self {
        Self::Here {
            len: 0,
            blocks: [None, None],
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Here { len, .. } => *len,
            Self::Allocated(a) => a.len(),
        }
    }

    fn block(&self, index: usize) -> &Block {
        match self {
            Self::Here { len, blocks } => {
                debug_assert!(index < *len);
                blocks[index].as_ref().unwrap_checked()
            }
            Self::Allocated(a) => a.block(a.begin + index),
        }
    }

    fn block_mut(&mut self, index: usize) -> &mut Block {
        match self {
            Self::Here { len, blocks } => {
                debug_assert!(index < *len);
                blocks[index].as_mut().unwrap_checked()
            }
            Self::Allocated(a) => {
                let index = a.begin + index;
                a.block_mut(index)
            }
        }
    }

    unsafe fn read_block_at(&self, index: usize) -> Block {
        match self {
            Self::Here { blocks, .. } => unsafe {
                ptr::read(&blocks[index]).unwrap_checked()
            },
            Self::Allocated(a) => unsafe { a.read_block(a.begin + index) },
        }
    }

    fn forget_blocks(&mut self) {
        match self {
            Self::Here { len, blocks } => {
                *len = 0;
                for slot in blocks {
                    mem::forget(slot.take());
                }
            }
            Self::Allocated(a) => a.begin = a.end,
        }
    }

    // Promotes "here" slots to the allocated form with `front_space` free
    // slots before the contents, seeding the offsets of the carried blocks.
    fn promote(&mut self, cap: usize, front_space: usize) {
        let Self::Here { len, blocks } = self else {
            unreachable!()
        };
        let len = *len;
        debug_assert!(front_space + len <= cap);
        let mut allocated = Allocated::with_capacity(cap);
        allocated.begin = front_space;
        allocated.end = front_space + len;
        for (i, slot) in blocks.iter_mut().take(len).enumerate() {
            let block = slot.take().unwrap_checked();
            unsafe { allocated.write_block(front_space + i, block) };
        }
        allocated.set_offset(front_space, 0);
        if len == 2 {
            let first_size = allocated.block(front_space).size();
            allocated.set_offset(front_space + 1, first_size);
        }
        *self = Self::Allocated(allocated);
    }

    fn reserve_back(&mut self, extra: usize) {
        match self {
            Self::Here { len, .. } => {
                if *len + extra > 2 {
                    let cap = (*len + extra).max(16);
                    self.promote(cap, 0);
                }
            }
            Self::Allocated(a) => {
                if extra > a.cap - a.end {
                    self.reserve_back_slow(extra);
                }
            }
        }
    }

    #[cold]
    fn reserve_back_slow(&mut self, extra: usize) {
        let Self::Allocated(a) = self else {
            unreachable!()
        };
        let len = a.len();
        let final_len = len + extra;
        if final_len * 2 <= a.cap {
            // The array has at least twice the needed space: recenter the
            // contents instead of reallocating, which keeps the amortized
            // cost of adding one slot constant.
            unsafe { a.shift_to((a.cap - final_len) / 2) };
            return;
        }
        let new_cap = (a.end + extra).max(a.cap + a.cap / 2).max(16);
        // Keep the space before the contents unchanged.
        let mut fresh = a.reallocated(new_cap, a.begin);
        mem::swap(a, &mut fresh);
        fresh.begin = fresh.end;
        fresh.dealloc_arrays();
        mem::forget(fresh);
    }

    fn reserve_front(&mut self, extra: usize) {
        match self {
            Self::Here { len, .. } => {
                if *len + extra > 2 {
                    let cap = (*len + extra).max(16);
                    let front_space = cap - *len;
                    self.promote(cap, front_space);
                }
            }
            Self::Allocated(a) => {
                if extra > a.begin {
                    self.reserve_front_slow(extra);
                }
            }
        }
    }

    #[cold]
    fn reserve_front_slow(&mut self, extra: usize) {
        let Self::Allocated(a) = self else {
            unreachable!()
        };
        let len = a.len();
        let final_len = len + extra;
        if final_len * 2 <= a.cap {
            let new_end = a.cap - (a.cap - final_len) / 2;
            unsafe { a.shift_to(new_end - len) };
            return;
        }
        let new_cap = ((a.cap - a.begin) + extra).max(a.cap + a.cap / 2).max(16);
        // Keep the space after the contents unchanged.
        let new_end = new_cap - (a.cap - a.end);
        let mut fresh = a.reallocated(new_cap, new_end - len);
        mem::swap(a, &mut fresh);
        fresh.begin = fresh.end;
        fresh.dealloc_arrays();
        mem::forget(fresh);
    }

    fn push_back(&mut self, block: Block) {
        self.reserve_back(1);
        match self {
            Self::Here { len, blocks } => {
                blocks[*len] = Some(block);
                *len += 1;
            }
            Self::Allocated(a) => {
                let offset = if a.begin == a.end {
                    0
                } else {
                    a.offset(a.end - 1)
                        .wrapping_add(a.block(a.end - 1).size())
                };
                let end = a.end;
                unsafe { a.write_block(end, block) };
                a.set_offset(end, offset);
                a.end += 1;
            }
        }
    }

    fn push_front(&mut self, block: Block) {
        self.reserve_front(1);
        match self {
            Self::Here { len, blocks } => {
                blocks[1] = blocks[0].take();
                blocks[0] = Some(block);
                *len += 1;
            }
            Self::Allocated(a) => {
                let offset = if a.begin == a.end {
                    0
                } else {
                    a.offset(a.begin).wrapping_sub(block.size())
                };
                let begin = a.begin - 1;
                unsafe { a.write_block(begin, block) };
                a.set_offset(begin, offset);
                a.begin = begin;
            }
        }
    }

    fn pop_back(&mut self) -> Block {
        match self {
            Self::Here { len, blocks } => {
                debug_assert!(*len > 0);
                *len -= 1;
                blocks[*len].take().unwrap_checked()
            }
            Self::Allocated(a) => {
                debug_assert!(a.begin < a.end);
                a.end -= 1;
                unsafe { a.read_block(a.end) }
            }
        }
    }

    fn pop_front(&mut self) -> Block {
        match self {
            Self::Here { len, blocks } => {
                debug_assert!(*len > 0);
                let block = blocks[0].take().unwrap_checked();
                blocks[0] = blocks[1].take();
                *len -= 1;
                block
            }
            Self::Allocated(a) => {
                debug_assert!(a.begin < a.end);
                let block = unsafe { a.read_block(a.begin) };
                a.begin += 1;
                block
            }
        }
    }

    // Keeps the offsets of the second and later blocks valid after the first
    // block's size changed.
    fn refresh_front(&mut self) {
        if let Self::Allocated(a) = self {
            if a.len() >= 2 {
                let offset = a.offset(a.begin + 1).wrapping_sub(a.block(a.begin).size());
                let begin = a.begin;
                a.set_offset(begin, offset);
            }
        }
    }
}

impl Drop for Slots {
    fn drop(&mut self) {
        match self {
            Self::Here { .. } => {}
            Self::Allocated(a) => {
                for index in a.begin..a.end {
                    drop(unsafe { a.read_block(index) });
                }
                a.dealloc_arrays();
            }
        }
    }
}

enum Repr {
    Short([u8; MAX_SHORT_DATA_SIZE]),
    Blocks(Slots),
}

// Drains a stolen chain's blocks; untaken blocks are dropped with the drain.
struct BlockDrain {
    slots: Slots,
    lo: usize,
    hi: usize,
}

impl BlockDrain {
    fn new(slots: Slots) -> Self {
        let len = slots.len();
        Self { slots, lo: 0, hi: len }
    }

    fn take_front(&mut self) -> Block {
        debug_assert!(self.lo < self.hi);
        let block = unsafe { self.slots.read_block_at(self.lo) };
        self.lo += 1;
        block
    }

    fn take_back(&mut self) -> Block {
        debug_assert!(self.lo < self.hi);
        self.hi -= 1;
        unsafe { self.slots.read_block_at(self.hi) }
    }
}

impl Drop for BlockDrain {
    fn drop(&mut self) {
        for index in self.lo..self.hi {
            drop(unsafe { self.slots.read_block_at(index) });
        }
        self.slots.forget_blocks();
    }
}

// A source of owned blocks for chain-to-chain append/prepend: either shares
// another chain's blocks (refcount bumps) or steals them wholesale.
enum ChainSrc<'a> {
    Share {
        chain: &'a Chain,
        lo: usize,
        hi: usize,
    },
    Steal(BlockDrain),
}

impl ChainSrc<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Share { lo, hi, .. } => hi - lo,
            Self::Steal(drain) => drain.hi - drain.lo,
        }
    }

    fn first(&self) -> &Block {
        match self {
            Self::Share { chain, lo, .. } => chain.slots().block(*lo),
            Self::Steal(drain) => drain.slots.block(drain.lo),
        }
    }

    fn last(&self) -> &Block {
        match self {
            Self::Share { chain, hi, .. } => chain.slots().block(*hi - 1),
            Self::Steal(drain) => drain.slots.block(drain.hi - 1),
        }
    }

    fn take_front(&mut self) -> Block {
        match self {
            Self::Share { chain, lo, .. } => {
                let block = chain.slots().block(*lo).clone();
                *lo += 1;
                block
            }
            Self::Steal(drain) => drain.take_front(),
        }
    }

    fn take_back(&mut self) -> Block {
        match self {
            Self::Share { chain, hi, .. } => {
                *hi -= 1;
                chain.slots().block(*hi).clone()
            }
            Self::Steal(drain) => drain.take_back(),
        }
    }
}

/// A segmented byte string: an ordered sequence of refcounted blocks with an
/// inline small-buffer form.
///
/// Cloning shares the blocks; a block may be mutated in place only while it
/// has a single owner, so clones never observe later writes.
pub struct Chain {
    size: usize,
    repr: Repr,
}

impl Chain {
    /// Contents up to this long are stored inline, with no allocation.
    pub const MAX_SHORT_DATA_SIZE: usize = MAX_SHORT_DATA_SIZE;

    pub const fn new() -> Self {
        Self {
            size: 0,
            repr: Repr::Short([0; MAX_SHORT_DATA_SIZE]),
        }
    }

    /// A chain of `length` zero bytes, backed by a shared static page instead
    /// of allocated arenas.
    pub fn zeroed(length: usize) -> Self {
        let mut chain = Self::new();
        if length <= MAX_SHORT_DATA_SIZE {
            chain.size = length;
            return chain;
        }
        chain.repr = Repr::Blocks(Slots::new());
        let mut remaining = length;
        while remaining > 0 {
            let fragment = remaining.min(ZERO_PAGE.len());
            let mut block = Block::new_external(ZeroRef);
            unsafe { block.set_window(ZERO_PAGE.as_ptr(), fragment) };
            chain.slots_mut().push_back(block);
            remaining -= fragment;
        }
        chain.size = length;
        chain
    }

    pub const fn len(&self) -> usize {
        self.size
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub(crate) fn num_blocks(&self) -> usize {
        match &self.repr {
            Repr::Short(_) => 0,
            Repr::Blocks(slots) => slots.len(),
        }
    }

    // Detaches the single block of a one-block chain, leaving it empty.
    pub(crate) fn take_single_block(&mut self) -> Option<Block> {
        if self.num_blocks() != 1 {
            return None;
        }
        let block = self.slots_mut().pop_back();
        self.size = 0;
        Some(block)
    }

    fn slots(&self) -> &Slots {
        match &self.repr {
            Repr::Blocks(slots) => slots,
            Repr::Short(_) => unreachable!(),
        }
    }

    fn slots_mut(&mut self) -> &mut Slots {
        match &mut self.repr {
            Repr::Blocks(slots) => slots,
            Repr::Short(_) => unreachable!(),
        }
    }

    fn short_slice(&self) -> &[u8] {
        match &self.repr {
            Repr::Short(data) => &data[..self.size],
            Repr::Blocks(_) => unreachable!(),
        }
    }

    // Leaves the short form holding the current inline bytes; valid only
    // with no blocks attached.
    fn ensure_short_repr(&mut self) {
        if let Repr::Blocks(slots) = &self.repr {
            debug_assert_eq!(slots.len(), 0);
            debug_assert_eq!(self.size, 0);
            self.repr = Repr::Short([0; MAX_SHORT_DATA_SIZE]);
        }
    }

    // Switches an inline chain to the (empty) block form; the caller has
    // already copied the short bytes wherever they belong.
    fn start_blocks(&mut self) {
        debug_assert!(matches!(self.repr, Repr::Short(_)));
        self.repr = Repr::Blocks(Slots::new());
    }

    fn back(&self) -> &Block {
        let slots = self.slots();
        slots.block(slots.len() - 1)
    }

    fn back_mut(&mut self) -> &mut Block {
        let slots = self.slots_mut();
        let index = slots.len() - 1;
        slots.block_mut(index)
    }

    fn front(&self) -> &Block {
        self.slots().block(0)
    }

    fn front_mut(&mut self) -> &mut Block {
        self.slots_mut().block_mut(0)
    }

    fn set_back(&mut self, block: Block) -> Block {
        mem::replace(self.back_mut(), block)
    }

    fn set_front(&mut self, block: Block) -> Block {
        let old = mem::replace(self.front_mut(), block);
        self.slots_mut().refresh_front();
        old
    }

    fn set_front_same_size(&mut self, block: Block) -> Block {
        debug_assert_eq!(block.size(), self.front().size());
        mem::replace(self.front_mut(), block)
    }

    pub fn clear(&mut self) {
        self.size = 0;
        match &mut self.repr {
            Repr::Short(_) => {}
            Repr::Blocks(slots) => {
                // Keep the first block for reuse when this chain is the only
                // owner of its arena.
                while slots.len() > 1 {
                    drop(slots.pop_back());
                }
                if slots.len() == 1 && !slots.block_mut(0).try_clear() {
                    drop(slots.pop_back());
                }
            }
        }
    }

    fn new_block_capacity(
        &self,
        replaced_length: usize,
        min_length: usize,
        recommended_length: usize,
        options: &Options,
    ) -> usize {
        debug_assert!(replaced_length <= self.size);
        if min_length > MAX_BLOCK_CAPACITY - replaced_length {
            panic_block_capacity_overflow();
        }
        replaced_length
            + buffer_length(
                min_length,
                options.max_block_size.saturating_sub(replaced_length),
                recommended_length
                    .max(self.size - replaced_length)
                    .max(options.min_block_size.saturating_sub(replaced_length)),
                options.size_hint,
                self.size,
            )
    }

    /// Returns a writable window of `min_length..=max_length` bytes appended
    /// to the chain. The window already counts towards `len`; callers that
    /// fill less must [`remove_suffix`](Self::remove_suffix) the rest.
    pub fn append_buffer(
        &mut self,
        min_length: usize,
        recommended_length: usize,
        max_length: usize,
        options: &Options,
    ) -> &mut [u8] {
        debug_assert!(min_length <= max_length);
        if min_length > usize::MAX - self.size {
            panic_size_overflow();
        }
        if self.num_blocks() == 0 {
            debug_assert!(self.size <= MAX_SHORT_DATA_SIZE);
            if min_length <= MAX_SHORT_DATA_SIZE - self.size {
                // Do not bother returning short data if `recommended_length`
                // or `size_hint` is larger, because the bytes would likely be
                // copied to a real block later anyway.
                if recommended_length <= MAX_SHORT_DATA_SIZE - self.size
                    && options.size_hint.map_or(true, |hint| hint <= MAX_SHORT_DATA_SIZE)
                {
                    self.ensure_short_repr();
                    let start = self.size;
                    let length = max_length.min(MAX_SHORT_DATA_SIZE - start);
                    self.size += length;
                    let Repr::Short(data) = &mut self.repr else {
                        unreachable!()
                    };
                    return &mut data[start..start + length];
                } else if min_length == 0 {
                    return &mut [];
                }
            }
            // Merge the short data with the new space into a real block.
            let block = if min_length > MAX_BLOCK_CAPACITY - self.size {
                if self.size > 0 {
                    let mut promoted = Block::new_internal(MAX_SHORT_DATA_SIZE);
                    promoted.append_slice(self.short_slice());
                    self.start_blocks();
                    self.slots_mut().push_back(promoted);
                } else {
                    self.ensure_short_repr();
                    self.start_blocks();
                }
                Block::new_internal(self.new_block_capacity(
                    0,
                    min_length,
                    recommended_length,
                    options,
                ))
            } else {
                let capacity = self.new_block_capacity(
                    self.size,
                    min_length.max(MAX_SHORT_DATA_SIZE - self.size),
                    recommended_length,
                    options,
                );
                let mut block = Block::new_internal(capacity);
                if matches!(self.repr, Repr::Short(_)) {
                    block.append_slice(self.short_slice());
                    self.start_blocks();
                } else {
                    self.ensure_short_repr();
                    self.start_blocks();
                }
                block
            };
            self.slots_mut().push_back(block);
        } else {
            let last = self.back();
            if last.can_append(min_length) {
                // New space fits in place.
            } else if min_length == 0 {
                return &mut [];
            } else if last.tiny(0) && min_length <= MAX_BLOCK_CAPACITY - last.size() {
                // The last block must be rewritten; merge it with the new
                // space into one block.
                let capacity = self.new_block_capacity(
                    last.size(),
                    min_length,
                    recommended_length,
                    options,
                );
                let mut block = Block::new_internal(capacity);
                block.append_slice(self.back().as_slice());
                drop(self.set_back(block));
            } else {
                let mut reused = false;
                if self.back().wasteful(0) {
                    // Rewrite the wasteful last block separately from the new
                    // block, so its bytes are not copied again if the new
                    // block only fills partially.
                    let compact = self.back().copy();
                    let mut old = self.set_back(compact);
                    if old.try_clear() && old.can_append(min_length) {
                        self.slots_mut().push_back(old);
                        reused = true;
                    }
                }
                if !reused {
                    let block = Block::new_internal(self.new_block_capacity(
                        0,
                        min_length,
                        recommended_length,
                        options,
                    ));
                    self.slots_mut().push_back(block);
                }
            }
        }
        let available = max_length.min(usize::MAX - self.size);
        let buffer = self.back_mut().append_buffer(available);
        debug_assert!(buffer.len() >= min_length);
        let length = buffer.len();
        let start = buffer.as_mut_ptr();
        self.size += length;
        unsafe { slice::from_raw_parts_mut(start, length) }
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
        if min_length > usize::MAX - self.size {
            panic_size_overflow();
        }
        if self.num_blocks() == 0 {
            debug_assert!(self.size <= MAX_SHORT_DATA_SIZE);
            if min_length <= MAX_SHORT_DATA_SIZE - self.size {
                if recommended_length <= MAX_SHORT_DATA_SIZE - self.size
                    && options.size_hint.map_or(true, |hint| hint <= MAX_SHORT_DATA_SIZE)
                {
                    self.ensure_short_repr();
                    let old_size = self.size;
                    let length = max_length.min(MAX_SHORT_DATA_SIZE - old_size);
                    self.size += length;
                    let Repr::Short(data) = &mut self.repr else {
                        unreachable!()
                    };
                    data.copy_within(0..old_size, length);
                    return &mut data[..length];
                } else if min_length == 0 {
                    return &mut [];
                }
            }
            let block = if min_length > MAX_BLOCK_CAPACITY - self.size {
                if self.size > 0 {
                    let mut promoted = Block::new_internal(MAX_SHORT_DATA_SIZE);
                    promoted.append_slice(self.short_slice());
                    self.start_blocks();
                    self.slots_mut().push_front(promoted);
                } else {
                    self.ensure_short_repr();
                    self.start_blocks();
                }
                Block::new_internal(self.new_block_capacity(
                    0,
                    min_length,
                    recommended_length,
                    options,
                ))
            } else {
                let capacity =
                    self.new_block_capacity(self.size, min_length, recommended_length, options);
                let mut block = Block::new_internal(capacity);
                if matches!(self.repr, Repr::Short(_)) {
                    block.prepend_slice(self.short_slice());
                    self.start_blocks();
                } else {
                    self.ensure_short_repr();
                    self.start_blocks();
                }
                block
            };
            self.slots_mut().push_front(block);
        } else {
            let first = self.front();
            if first.can_prepend(min_length) {
                // New space fits in place.
            } else if min_length == 0 {
                return &mut [];
            } else if first.tiny(0) && min_length <= MAX_BLOCK_CAPACITY - first.size() {
                let capacity = self.new_block_capacity(
                    first.size(),
                    min_length,
                    recommended_length,
                    options,
                );
                let mut block = Block::new_internal(capacity);
                block.prepend_slice(self.front().as_slice());
                drop(self.set_front(block));
            } else {
                let mut reused = false;
                if self.front().wasteful(0) {
                    let compact = self.front().copy();
                    let mut old = self.set_front_same_size(compact);
                    if old.try_clear() && old.can_prepend(min_length) {
                        self.slots_mut().push_front(old);
                        reused = true;
                    }
                }
                if !reused {
                    let block = Block::new_internal(self.new_block_capacity(
                        0,
                        min_length,
                        recommended_length,
                        options,
                    ));
                    self.slots_mut().push_front(block);
                }
            }
        }
        let available = max_length.min(usize::MAX - self.size);
        let buffer = self.front_mut().prepend_buffer(available);
        debug_assert!(buffer.len() >= min_length);
        let length = buffer.len();
        let start = buffer.as_mut_ptr();
        self.slots_mut().refresh_front();
        self.size += length;
        unsafe { slice::from_raw_parts_mut(start, length) }
    }

    /// Appends `src`; `src` may be a slice, string, owned vector or string,
    /// another chain (by value or reference), [`Bytes`](bytes::Bytes), or a
    /// [`BlockBuf`].
    pub fn append(&mut self, src: impl Source) {
        src.append_to(self, &Options::DEFAULT);
    }

    pub fn append_with(&mut self, src: impl Source, options: &Options) {
        src.append_to(self, options);
    }

    /// Prepends `src`; accepts the same sources as [`append`](Self::append).
    pub fn prepend(&mut self, src: impl Source) {
        src.prepend_to(self, &Options::DEFAULT);
    }

    pub fn prepend_with(&mut self, src: impl Source, options: &Options) {
        src.prepend_to(self, options);
    }

    fn append_slice_with(&mut self, mut src: &[u8], options: &Options) {
        if src.len() > usize::MAX - self.size {
            panic_size_overflow();
        }
        while !src.is_empty() {
            let buffer = self.append_buffer(1, src.len(), src.len(), options);
            let length = buffer.len();
            buffer.copy_from_slice(&src[..length]);
            src = &src[length..];
        }
    }

    fn prepend_slice_with(&mut self, mut src: &[u8], options: &Options) {
        if src.len() > usize::MAX - self.size {
            panic_size_overflow();
        }
        while !src.is_empty() {
            let buffer = self.prepend_buffer(1, src.len(), src.len(), options);
            let length = buffer.len();
            buffer.copy_from_slice(&src[src.len() - length..]);
            src = &src[..src.len() - length];
        }
    }

    // Copies the inline bytes into a real block, leaving the chain in block
    // form; used before attaching a foreign block.
    fn promote_short_data(&mut self) {
        debug_assert_eq!(self.num_blocks(), 0);
        if matches!(self.repr, Repr::Blocks(_)) {
            return;
        }
        if self.size > 0 {
            let mut block = Block::new_internal(MAX_SHORT_DATA_SIZE);
            block.append_slice(self.short_slice());
            self.start_blocks();
            self.slots_mut().push_back(block);
        } else {
            self.start_blocks();
        }
    }

    pub(crate) fn append_block(&mut self, block: Block, options: &Options) {
        if block.is_empty() {
            return;
        }
        if block.size() > usize::MAX - self.size {
            panic_size_overflow();
        }
        let block_size = block.size();
        if self.num_blocks() == 0 {
            if self.size > 0 && block.tiny(0) {
                // The block would be rewritten anyway: merge the short data
                // with it into one new block.
                let capacity = self.new_block_capacity(
                    self.size,
                    block.size().max(MAX_SHORT_DATA_SIZE - self.size),
                    0,
                    options,
                );
                let mut merged = Block::new_internal(capacity);
                merged.append_slice(self.short_slice());
                merged.append_slice(block.as_slice());
                self.start_blocks();
                self.slots_mut().push_back(merged);
                self.size += block_size;
                return;
            }
            self.promote_short_data();
        } else {
            let last = self.back();
            if last.tiny(0) && block.tiny(0) {
                // Boundary blocks must be merged.
                if self.back().can_append(block.size()) {
                    self.back_mut().append_slice(block.as_slice());
                } else {
                    let capacity =
                        self.new_block_capacity(self.back().size(), block.size(), 0, options);
                    let mut merged = Block::new_internal(capacity);
                    merged.append_slice(self.back().as_slice());
                    merged.append_slice(block.as_slice());
                    drop(self.set_back(merged));
                }
                self.size += block_size;
                return;
            }
            if last.is_empty() {
                drop(self.set_back(block));
                self.size += block_size;
                return;
            }
            if last.wasteful(0) {
                if self.back().can_append(block.size())
                    && block.size() <= ALLOCATION_COST + self.back().size()
                {
                    // Appending in place is cheaper than rewriting the last
                    // block.
                    self.back_mut().append_slice(block.as_slice());
                    self.size += block_size;
                    return;
                }
                let compact = self.back().copy();
                drop(self.set_back(compact));
            }
        }
        self.slots_mut().push_back(block);
        self.size += block_size;
    }

    pub(crate) fn prepend_block(&mut self, block: Block, options: &Options) {
        if block.is_empty() {
            return;
        }
        if block.size() > usize::MAX - self.size {
            panic_size_overflow();
        }
        let block_size = block.size();
        if self.num_blocks() == 0 {
            if self.size > 0 && block.tiny(0) {
                let capacity = self.new_block_capacity(self.size, block.size(), 0, options);
                let mut merged = Block::new_internal(capacity);
                merged.prepend_slice(self.short_slice());
                merged.prepend_slice(block.as_slice());
                self.start_blocks();
                self.slots_mut().push_front(merged);
                self.size += block_size;
                return;
            }
            self.promote_short_data();
        } else {
            let first = self.front();
            if first.tiny(0) && block.tiny(0) {
                if self.front().can_prepend(block.size()) {
                    self.front_mut().prepend_slice(block.as_slice());
                    self.slots_mut().refresh_front();
                } else {
                    let capacity =
                        self.new_block_capacity(self.front().size(), block.size(), 0, options);
                    let mut merged = Block::new_internal(capacity);
                    merged.prepend_slice(self.front().as_slice());
                    merged.prepend_slice(block.as_slice());
                    drop(self.set_front(merged));
                }
                self.size += block_size;
                return;
            }
            if first.is_empty() {
                drop(self.set_front(block));
                self.size += block_size;
                return;
            }
            if first.wasteful(0) {
                if self.front().can_prepend(block.size())
                    && block.size() <= ALLOCATION_COST + self.front().size()
                {
                    self.front_mut().prepend_slice(block.as_slice());
                    self.slots_mut().refresh_front();
                    self.size += block_size;
                    return;
                }
                let compact = self.front().copy();
                drop(self.set_front_same_size(compact));
            }
        }
        self.slots_mut().push_front(block);
        self.size += block_size;
    }

    /// Appends the substring `offset..offset + length` of `block`, sharing
    /// ownership when the substring is long and copying it when short.
    pub(crate) fn append_block_substr(
        &mut self,
        block: &Block,
        offset: usize,
        length: usize,
        options: &Options,
    ) {
        if length == 0 {
            return;
        }
        if length == block.size() {
            self.append_block(block.clone(), options);
        } else if length <= MAX_BYTES_TO_COPY {
            self.append_slice_with(&block.as_slice()[offset..offset + length], options);
        } else {
            self.append_block(block.substr(offset, length), options);
        }
    }

    fn append_chain_impl(&mut self, mut src: ChainSrc<'_>, src_size: usize, options: &Options) {
        if src_size > usize::MAX - self.size {
            panic_size_overflow();
        }
        let src_len = src.len();
        debug_assert!(src_len > 0);
        let src_first_size = src.first().size();
        let src_first_tiny = src.first().tiny(0);
        let src_first_empty = src_first_size == 0;
        let src_first_wasteful = src.first().wasteful(0);
        if self.num_blocks() == 0 {
            if src_first_tiny || (src_len > 1 && src_first_wasteful) {
                // The first block of `src` must be rewritten: merge the short
                // data with it into one new block.
                if self.size > 0 || !src_first_empty {
                    let capacity = if src_len == 1 {
                        self.new_block_capacity(
                            self.size,
                            src_first_size.max(MAX_SHORT_DATA_SIZE - self.size),
                            0,
                            options,
                        )
                    } else {
                        (self.size + src_first_size).max(MAX_SHORT_DATA_SIZE)
                    };
                    let mut merged = Block::new_internal(capacity);
                    if matches!(self.repr, Repr::Short(_)) {
                        merged.append_slice(self.short_slice());
                        self.start_blocks();
                    } else {
                        self.ensure_short_repr();
                        self.start_blocks();
                    }
                    merged.append_slice(src.first().as_slice());
                    self.slots_mut().push_back(merged);
                } else {
                    self.ensure_short_repr();
                    self.start_blocks();
                }
                drop(src.take_front());
            } else {
                self.promote_short_data();
            }
        } else {
            let last = self.back();
            let last_tiny = last.tiny(0);
            let last_empty = last.is_empty();
            let last_wasteful = last.wasteful(0);
            let merge = (last_tiny && src_first_tiny)
                || (last_empty && src_len > 1 && src_first_wasteful)
                || (last_wasteful && src_len > 1 && (src_first_empty || src_first_wasteful));
            if merge {
                // Boundary blocks must be merged, or they are both empty or
                // wasteful so merging them is cheaper than rewriting them
                // separately.
                if last_empty && src_first_empty {
                    drop(self.slots_mut().pop_back());
                } else if self.back().can_append(src_first_size)
                    && (src_len == 1 || !self.back().wasteful(src_first_size))
                {
                    // In-place append is always cheaper than a new block.
                    self.back_mut().append_slice(src.first().as_slice());
                } else {
                    let capacity = if src_len == 1 {
                        self.new_block_capacity(self.back().size(), src_first_size, 0, options)
                    } else {
                        self.back().size() + src_first_size
                    };
                    let mut merged = Block::new_internal(capacity);
                    merged.append_slice(self.back().as_slice());
                    merged.append_slice(src.first().as_slice());
                    drop(self.set_back(merged));
                }
                drop(src.take_front());
            } else if last_empty {
                // The last block is empty and must be removed.
                drop(self.slots_mut().pop_back());
            } else if last_wasteful {
                // The last block must reduce waste.
                if self.back().can_append(src_first_size)
                    && (src_len == 1 || !self.back().wasteful(src_first_size))
                    && src_first_size <= ALLOCATION_COST + self.back().size()
                {
                    // In-place append is cheaper than rewriting the block.
                    self.back_mut().append_slice(src.first().as_slice());
                    drop(src.take_front());
                } else {
                    let compact = self.back().copy();
                    drop(self.set_back(compact));
                }
            } else if src_len > 1 {
                if src_first_empty {
                    drop(src.take_front());
                } else if src_first_wasteful {
                    // The first block of `src` must reduce waste.
                    if self.back().can_append(src_first_size)
                        && !self.back().wasteful(src_first_size)
                    {
                        self.back_mut().append_slice(src.first().as_slice());
                    } else {
                        let compact = src.first().copy();
                        self.slots_mut().push_back(compact);
                    }
                    drop(src.take_front());
                }
            }
        }
        self.slots_mut().reserve_back(src.len());
        while src.len() > 0 {
            let block = src.take_front();
            self.slots_mut().push_back(block);
        }
        self.size += src_size;
    }

    fn prepend_chain_impl(&mut self, mut src: ChainSrc<'_>, src_size: usize, options: &Options) {
        if src_size > usize::MAX - self.size {
            panic_size_overflow();
        }
        let src_len = src.len();
        debug_assert!(src_len > 0);
        let src_last_size = src.last().size();
        let src_last_tiny = src.last().tiny(0);
        let src_last_empty = src_last_size == 0;
        let src_last_wasteful = src.last().wasteful(0);
        if self.num_blocks() == 0 {
            if src_last_tiny || (src_len > 1 && src_last_wasteful) {
                if self.size > 0 || !src_last_empty {
                    let capacity = if src_len == 1 {
                        self.new_block_capacity(self.size, src_last_size, 0, options)
                    } else {
                        (self.size + src_last_size).max(MAX_SHORT_DATA_SIZE)
                    };
                    let mut merged = Block::new_internal(capacity);
                    if matches!(self.repr, Repr::Short(_)) {
                        merged.prepend_slice(self.short_slice());
                        self.start_blocks();
                    } else {
                        self.ensure_short_repr();
                        self.start_blocks();
                    }
                    merged.prepend_slice(src.last().as_slice());
                    self.slots_mut().push_front(merged);
                } else {
                    self.ensure_short_repr();
                    self.start_blocks();
                }
                drop(src.take_back());
            } else {
                self.promote_short_data();
            }
        } else {
            let first = self.front();
            let first_tiny = first.tiny(0);
            let first_empty = first.is_empty();
            let first_wasteful = first.wasteful(0);
            let merge = (first_tiny && src_last_tiny)
                || (first_empty && src_len > 1 && src_last_wasteful)
                || (first_wasteful && src_len > 1 && (src_last_empty || src_last_wasteful));
            if merge {
                if first_empty && src_last_empty {
                    drop(self.slots_mut().pop_front());
                } else if self.front().can_prepend(src_last_size)
                    && (src_len == 1 || !self.front().wasteful(src_last_size))
                {
                    self.front_mut().prepend_slice(src.last().as_slice());
                    self.slots_mut().refresh_front();
                } else {
                    let capacity = if src_len == 1 {
                        self.new_block_capacity(self.front().size(), src_last_size, 0, options)
                    } else {
                        self.front().size() + src_last_size
                    };
                    let mut merged = Block::new_internal(capacity);
                    merged.prepend_slice(self.front().as_slice());
                    merged.prepend_slice(src.last().as_slice());
                    drop(self.set_front(merged));
                }
                drop(src.take_back());
            } else if first_empty {
                drop(self.slots_mut().pop_front());
            } else if first_wasteful {
                if self.front().can_prepend(src_last_size)
                    && (src_len == 1 || !self.front().wasteful(src_last_size))
                    && src_last_size <= ALLOCATION_COST + self.front().size()
                {
                    self.front_mut().prepend_slice(src.last().as_slice());
                    self.slots_mut().refresh_front();
                    drop(src.take_back());
                } else {
                    let compact = self.front().copy();
                    drop(self.set_front_same_size(compact));
                }
            } else if src_len > 1 {
                if src_last_empty {
                    drop(src.take_back());
                } else if src_last_wasteful {
                    if self.front().can_prepend(src_last_size)
                        && !self.front().wasteful(src_last_size)
                    {
                        self.front_mut().prepend_slice(src.last().as_slice());
                        self.slots_mut().refresh_front();
                    } else {
                        let compact = src.last().copy();
                        self.slots_mut().push_front(compact);
                    }
                    drop(src.take_back());
                }
            }
        }
        self.slots_mut().reserve_front(src.len());
        while src.len() > 0 {
            let block = src.take_back();
            self.slots_mut().push_front(block);
        }
        self.size += src_size;
    }

    fn append_chain_shared(&mut self, src: &Chain, options: &Options) {
        if src.num_blocks() == 0 {
            self.append_slice_with(src.short_slice(), options);
            return;
        }
        let src_size = src.size;
        let hi = src.num_blocks();
        self.append_chain_impl(ChainSrc::Share { chain: src, lo: 0, hi }, src_size, options);
    }

    fn append_chain_owned(&mut self, mut src: Chain, options: &Options) {
        if src.num_blocks() == 0 {
            self.append_slice_with(src.short_slice(), options);
            return;
        }
        let src_size = src.size;
        src.size = 0;
        let Repr::Blocks(slots) = mem::replace(&mut src.repr, Repr::Short([0; MAX_SHORT_DATA_SIZE]))
        else {
            unreachable!()
        };
        self.append_chain_impl(ChainSrc::Steal(BlockDrain::new(slots)), src_size, options);
    }

    fn prepend_chain_shared(&mut self, src: &Chain, options: &Options) {
        if src.num_blocks() == 0 {
            self.prepend_slice_with(src.short_slice(), options);
            return;
        }
        let src_size = src.size;
        let hi = src.num_blocks();
        self.prepend_chain_impl(ChainSrc::Share { chain: src, lo: 0, hi }, src_size, options);
    }

    fn prepend_chain_owned(&mut self, mut src: Chain, options: &Options) {
        if src.num_blocks() == 0 {
            self.prepend_slice_with(src.short_slice(), options);
            return;
        }
        let src_size = src.size;
        src.size = 0;
        let Repr::Blocks(slots) = mem::replace(&mut src.repr, Repr::Short([0; MAX_SHORT_DATA_SIZE]))
        else {
            unreachable!()
        };
        self.prepend_chain_impl(ChainSrc::Steal(BlockDrain::new(slots)), src_size, options);
    }

    pub fn remove_prefix(&mut self, length: usize) {
        self.remove_prefix_with(length, &Options::DEFAULT);
    }

    pub fn remove_prefix_with(&mut self, length: usize, options: &Options) {
        if length == 0 {
            return;
        }
        if length > self.size {
            panic_out_of_range();
        }
        self.size -= length;
        if matches!(self.repr, Repr::Short(_)) {
            let size = self.size;
            let Repr::Short(data) = &mut self.repr else {
                unreachable!()
            };
            data.copy_within(length..length + size, 0);
            return;
        }
        {
            let slots = self.slots_mut();
            if length <= slots.block(0).size() && slots.block_mut(0).try_remove_prefix(length) {
                slots.refresh_front();
                return;
            }
        }
        self.remove_prefix_slow(length, options);
    }

    #[cold]
    fn remove_prefix_slow(&mut self, mut length: usize, options: &Options) {
        debug_assert!(length > 0);
        debug_assert!(self.num_blocks() > 0);
        while length > self.front().size() {
            length -= self.front().size();
            drop(self.slots_mut().pop_front());
            debug_assert!(self.num_blocks() > 0);
        }
        if length < self.front().size() && self.front_mut().try_remove_prefix(length) {
            self.slots_mut().refresh_front();
            return;
        }
        let block = self.slots_mut().pop_front();
        let emptied = self.num_blocks() == 0;
        if length == block.size() {
            if emptied {
                debug_assert_eq!(self.size, 0);
                self.repr = Repr::Short([0; MAX_SHORT_DATA_SIZE]);
            }
            return;
        }
        let retained = block.size() - length;
        // The prepend below adds the retained bytes back to `size`.
        self.size -= retained;
        if emptied {
            debug_assert_eq!(self.size, 0);
            self.repr = Repr::Short([0; MAX_SHORT_DATA_SIZE]);
        }
        if retained <= MAX_BYTES_TO_COPY {
            self.prepend_slice_with(&block.as_slice()[length..], options);
        } else {
            self.prepend_block(block.substr(length, retained), options);
        }
    }

    pub fn remove_suffix(&mut self, length: usize) {
        self.remove_suffix_with(length, &Options::DEFAULT);
    }

    pub fn remove_suffix_with(&mut self, length: usize, options: &Options) {
        if length == 0 {
            return;
        }
        if length > self.size {
            panic_out_of_range();
        }
        self.size -= length;
        if matches!(self.repr, Repr::Short(_)) {
            return;
        }
        {
            let slots = self.slots_mut();
            let last = slots.len() - 1;
            if length <= slots.block(last).size() && slots.block_mut(last).try_remove_suffix(length)
            {
                return;
            }
        }
        self.remove_suffix_slow(length, options);
    }

    #[cold]
    fn remove_suffix_slow(&mut self, mut length: usize, options: &Options) {
        debug_assert!(length > 0);
        debug_assert!(self.num_blocks() > 0);
        while length > self.back().size() {
            length -= self.back().size();
            drop(self.slots_mut().pop_back());
            debug_assert!(self.num_blocks() > 0);
        }
        if length < self.back().size() && self.back_mut().try_remove_suffix(length) {
            return;
        }
        let block = self.slots_mut().pop_back();
        let emptied = self.num_blocks() == 0;
        if length == block.size() {
            if emptied {
                debug_assert_eq!(self.size, 0);
                self.repr = Repr::Short([0; MAX_SHORT_DATA_SIZE]);
            }
            return;
        }
        let retained = block.size() - length;
        // The append below adds the retained bytes back to `size`.
        self.size -= retained;
        if emptied {
            debug_assert_eq!(self.size, 0);
            self.repr = Repr::Short([0; MAX_SHORT_DATA_SIZE]);
        }
        if retained <= MAX_BYTES_TO_COPY {
            self.append_slice_with(&block.as_slice()[..retained], options);
        } else {
            self.append_block(block.substr(0, retained), options);
        }
    }

    /// Collapses the chain into a single contiguous block and returns a view
    /// of the whole contents.
    pub fn flatten(&mut self) -> &[u8] {
        if self.num_blocks() > 1 {
            let mut block = Block::new_internal(self.new_block_capacity(
                0,
                self.size,
                self.size,
                &Options::DEFAULT,
            ));
            for fragment in self.blocks() {
                block.append_slice(fragment);
            }
            let mut slots = Slots::new();
            slots.push_back(block);
            self.repr = Repr::Blocks(slots);
        }
        match &self.repr {
            Repr::Short(data) => &data[..self.size],
            Repr::Blocks(slots) => {
                if slots.len() == 0 {
                    &[]
                } else {
                    slots.block(0).as_slice()
                }
            }
        }
    }

    pub(crate) fn fragments(&self) -> usize {
        match &self.repr {
            Repr::Short(_) => usize::from(self.size > 0),
            Repr::Blocks(slots) => slots.len(),
        }
    }

    pub(crate) fn fragment(&self, index: usize) -> &[u8] {
        match &self.repr {
            Repr::Short(data) => {
                debug_assert!(index == 0 && self.size > 0);
                &data[..self.size]
            }
            Repr::Blocks(slots) => slots.block(index).as_slice(),
        }
    }

    pub(crate) fn fragment_block(&self, index: usize) -> Option<&Block> {
        match &self.repr {
            Repr::Short(_) => None,
            Repr::Blocks(slots) => Some(slots.block(index)),
        }
    }

    /// Iterates over the chain's fragments as byte slices.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            chain: self,
            index: 0,
            len: self.fragments(),
        }
    }

    /// Locates the block holding the byte at `char_index`, returning its
    /// iterator position and the offset within the block. `char_index` equal
    /// to `len` yields the end position.
    pub fn position(&self, char_index: usize) -> (BlockIter<'_>, usize) {
        if char_index > self.size {
            panic_out_of_range();
        }
        if char_index == self.size {
            return (
                BlockIter {
                    chain: self,
                    index: self.fragments(),
                },
                0,
            );
        }
        let index = match &self.repr {
            Repr::Short(_) => {
                return (BlockIter { chain: self, index: 0 }, char_index);
            }
            Repr::Blocks(Slots::Here { len, blocks }) => {
                debug_assert!(*len > 0);
                let first_size = blocks[0].as_ref().unwrap_checked().size();
                if char_index < first_size {
                    return (BlockIter { chain: self, index: 0 }, char_index);
                }
                debug_assert!(*len == 2);
                return (BlockIter { chain: self, index: 1 }, char_index - first_size);
            }
            Repr::Blocks(Slots::Allocated(a)) => {
                let base = a.offset(a.begin);
                // Upper bound over the offsets of the second and later
                // blocks; the first block needs no entry and the last one is
                // derivable.
                let mut lo = 0;
                let mut hi = a.len() - 1;
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if a.offset(a.begin + 1 + mid).wrapping_sub(base) <= char_index {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                let block_index = lo;
                let block_start = if block_index == 0 {
                    0
                } else {
                    a.offset(a.begin + block_index).wrapping_sub(base)
                };
                (block_index, char_index - block_start)
            }
        };
        (
            BlockIter {
                chain: self,
                index: index.0,
            },
            index.1,
        )
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut vec = Vec::with_capacity(self.size);
        for fragment in self.blocks() {
            vec.extend_from_slice(fragment);
        }
        vec
    }

    /// Converts into a `Vec<u8>`, moving the buffer out instead of copying
    /// when the chain is the unique owner of a single vector-backed block.
    pub fn into_vec(mut self) -> Vec<u8> {
        if self.num_blocks() == 1 {
            let reusable = {
                let block = self.front();
                match block.payload_if_unique::<Vec<u8>>() {
                    Some(vec) => {
                        ptr::eq(vec.as_ptr(), block.as_slice().as_ptr())
                            && vec.len() == block.size()
                    }
                    None => false,
                }
            };
            if reusable {
                let block = self.slots_mut().pop_back();
                self.size = 0;
                match block.try_take_payload::<Vec<u8>>() {
                    Ok(vec) => return vec,
                    Err(block) => {
                        let vec = block.as_slice().to_vec();
                        return vec;
                    }
                }
            }
        }
        self.to_vec()
    }

    /// Estimated memory usage, counting each block's allocation at every
    /// occurrence (an upper bound when blocks are shared).
    pub fn estimated_memory(&self) -> usize {
        let mut total = mem::size_of::<Self>();
        if let Repr::Blocks(Slots::Allocated(a)) = &self.repr {
            total += 2 * a.cap * mem::size_of::<usize>();
        }
        if let Repr::Blocks(slots) = &self.repr {
            for index in 0..slots.len() {
                total += slots.block(index).allocated_memory();
            }
        }
        total
    }

    /// Writes the chain's block structure for diagnostics.
    pub fn dump_structure(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "chain {{")?;
        writeln!(f, "  size: {} memory: {}", self.size, self.estimated_memory())?;
        if let Repr::Blocks(slots) = &self.repr {
            for index in 0..slots.len() {
                writeln!(f, "  {:?}", slots.block(index))?;
            }
        }
        writeln!(f, "}}")
    }

    fn cmp_impl(&self, that: &Chain) -> Ordering {
        let mut this_iter = self.blocks();
        let mut that_iter = that.blocks();
        let mut this_fragment: &[u8] = this_iter.next().unwrap_or(&[]);
        let mut that_fragment: &[u8] = that_iter.next().unwrap_or(&[]);
        loop {
            if this_fragment.is_empty() {
                match this_iter.next() {
                    Some(fragment) => {
                        this_fragment = fragment;
                        continue;
                    }
                    None => {
                        let that_rest =
                            !that_fragment.is_empty() || that_iter.any(|f| !f.is_empty());
                        return if that_rest {
                            Ordering::Less
                        } else {
                            Ordering::Equal
                        };
                    }
                }
            }
            if that_fragment.is_empty() {
                match that_iter.next() {
                    Some(fragment) => {
                        that_fragment = fragment;
                        continue;
                    }
                    None => return Ordering::Greater,
                }
            }
            let length = this_fragment.len().min(that_fragment.len());
            match this_fragment[..length].cmp(&that_fragment[..length]) {
                Ordering::Equal => {}
                other => return other,
            }
            this_fragment = &this_fragment[length..];
            that_fragment = &that_fragment[length..];
        }
    }

    fn cmp_slice(&self, mut that: &[u8]) -> Ordering {
        for fragment in self.blocks() {
            if fragment.is_empty() {
                continue;
            }
            if that.is_empty() {
                return Ordering::Greater;
            }
            let length = fragment.len().min(that.len());
            match fragment[..length].cmp(&that[..length]) {
                Ordering::Equal => {}
                other => return other,
            }
            if length < fragment.len() {
                return Ordering::Greater;
            }
            that = &that[length..];
        }
        if that.is_empty() {
            Ordering::Equal
        } else {
            Ordering::Less
        }
    }

    #[allow(dead_code)]
    pub(crate) fn verify_invariants(&self) {
        match &self.repr {
            Repr::Short(_) => assert!(self.size <= MAX_SHORT_DATA_SIZE),
            Repr::Blocks(slots) => {
                let len = slots.len();
                if len == 0 {
                    assert_eq!(self.size, 0);
                    return;
                }
                let mut total = 0;
                let mut was_tiny = false;
                for index in 0..len {
                    let block = slots.block(index);
                    if was_tiny {
                        assert!(!block.tiny(0), "two adjacent tiny blocks");
                        was_tiny = false;
                    } else {
                        was_tiny = block.tiny(0);
                    }
                    if index != 0 && index != len - 1 {
                        assert!(!block.is_empty(), "empty interior block");
                        assert!(!block.wasteful(0), "wasteful interior block");
                    }
                    if let Slots::Allocated(a) = slots {
                        let base = a.offset(a.begin);
                        assert_eq!(
                            a.offset(a.begin + index).wrapping_sub(base),
                            total,
                            "inconsistent block offset",
                        );
                    }
                    total += block.size();
                }
                assert_eq!(total, self.size, "size differs from sum of block sizes");
            }
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Chain {
    fn clone(&self) -> Self {
        let mut clone = Self::new();
        match &self.repr {
            Repr::Short(data) => {
                let Repr::Short(clone_data) = &mut clone.repr else {
                    unreachable!()
                };
                *clone_data = *data;
            }
            Repr::Blocks(slots) => {
                clone.start_blocks();
                clone.slots_mut().reserve_back(slots.len());
                for index in 0..slots.len() {
                    clone.slots_mut().push_back(slots.block(index).clone());
                }
            }
        }
        clone.size = self.size;
        clone
    }
}

/// Iterator over a chain's fragments as byte slices.
#[derive(Clone)]
pub struct Blocks<'a> {
    chain: &'a Chain,
    index: usize,
    len: usize,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.index == self.len {
            return None;
        }
        let fragment = self.chain.fragment(self.index);
        self.index += 1;
        Some(fragment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Blocks<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.index == self.len {
            return None;
        }
        self.len -= 1;
        Some(self.chain.fragment(self.len))
    }
}

impl ExactSizeIterator for Blocks<'_> {}

/// A position among a chain's fragments, as returned by
/// [`Chain::position`].
#[derive(Clone, Copy)]
pub struct BlockIter<'a> {
    chain: &'a Chain,
    index: usize,
}

impl<'a> BlockIter<'a> {
    /// The fragment at this position, or `None` at the end position.
    pub fn get(&self) -> Option<&'a [u8]> {
        (self.index < self.chain.fragments()).then(|| self.chain.fragment(self.index))
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return self.dump_structure(f);
        }
        let vec;
        let bytes: &[u8] = match &self.repr {
            Repr::Short(data) => &data[..self.size],
            Repr::Blocks(slots) if slots.len() == 1 => slots.block(0).as_slice(),
            Repr::Blocks(_) => {
                vec = self.to_vec();
                &vec
            }
        };
        debug_bytes(bytes, f)
    }
}

impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.cmp_impl(other) == Ordering::Equal
    }
}

impl Eq for Chain {}

impl PartialOrd for Chain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Chain {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_impl(other)
    }
}

impl PartialEq<[u8]> for Chain {
    fn eq(&self, other: &[u8]) -> bool {
        self.size == other.len() && self.cmp_slice(other) == Ordering::Equal
    }
}

impl PartialEq<Chain> for [u8] {
    fn eq(&self, other: &Chain) -> bool {
        other == self
    }
}

impl PartialEq<&[u8]> for Chain {
    fn eq(&self, other: &&[u8]) -> bool {
        *self == **other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Chain {
    fn eq(&self, other: &[u8; N]) -> bool {
        *self == other[..]
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for Chain {
    fn eq(&self, other: &&[u8; N]) -> bool {
        *self == other[..]
    }
}

impl PartialEq<Vec<u8>> for Chain {
    fn eq(&self, other: &Vec<u8>) -> bool {
        *self == other[..]
    }
}

impl PartialEq<str> for Chain {
    fn eq(&self, other: &str) -> bool {
        *self == *other.as_bytes()
    }
}

impl PartialEq<&str> for Chain {
    fn eq(&self, other: &&str) -> bool {
        *self == *other.as_bytes()
    }
}

impl PartialOrd<[u8]> for Chain {
    fn partial_cmp(&self, other: &[u8]) -> Option<Ordering> {
        Some(self.cmp_slice(other))
    }
}

impl Hash for Chain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for fragment in self.blocks() {
            state.write(fragment);
        }
        state.write_usize(self.size);
    }
}

mod private {
    pub trait Sealed {}
}

/// A value that can be appended to or prepended to a [`Chain`].
pub trait Source: private::Sealed {
    #[doc(hidden)]
    fn append_to(self, dest: &mut Chain, options: &Options);
    #[doc(hidden)]
    fn prepend_to(self, dest: &mut Chain, options: &Options);
}

impl private::Sealed for &[u8] {}
impl Source for &[u8] {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        dest.append_slice_with(self, options);
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        dest.prepend_slice_with(self, options);
    }
}

impl private::Sealed for &str {}
impl Source for &str {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        dest.append_slice_with(self.as_bytes(), options);
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        dest.prepend_slice_with(self.as_bytes(), options);
    }
}

fn vec_wasteful(capacity: usize, len: usize) -> bool {
    capacity >= 2 * len + ALLOCATION_COST
}

impl private::Sealed for Vec<u8> {}
impl Source for Vec<u8> {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        if self.len() <= MAX_BYTES_TO_COPY || vec_wasteful(self.capacity(), self.len()) {
            dest.append_slice_with(&self, options);
        } else {
            dest.append_block(Block::new_external(self), options);
        }
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        if self.len() <= MAX_BYTES_TO_COPY || vec_wasteful(self.capacity(), self.len()) {
            dest.prepend_slice_with(&self, options);
        } else {
            dest.prepend_block(Block::new_external(self), options);
        }
    }
}

impl private::Sealed for String {}
impl Source for String {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        self.into_bytes().append_to(dest, options);
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        self.into_bytes().prepend_to(dest, options);
    }
}

impl private::Sealed for Chain {}
impl Source for Chain {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        dest.append_chain_owned(self, options);
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        dest.prepend_chain_owned(self, options);
    }
}

impl private::Sealed for &Chain {}
impl Source for &Chain {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        dest.append_chain_shared(self, options);
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        dest.prepend_chain_shared(self, options);
    }
}

impl private::Sealed for bytes::Bytes {}
impl Source for bytes::Bytes {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        if self.len() <= MAX_BYTES_TO_COPY {
            dest.append_slice_with(&self, options);
        } else {
            dest.append_block(Block::new_external(self), options);
        }
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        if self.len() <= MAX_BYTES_TO_COPY {
            dest.prepend_slice_with(&self, options);
        } else {
            dest.prepend_block(Block::new_external(self), options);
        }
    }
}

impl private::Sealed for BlockBuf {}
impl Source for BlockBuf {
    fn append_to(self, dest: &mut Chain, options: &Options) {
        if let Some(block) = self.into_block() {
            dest.append_block(block, options);
        }
    }

    fn prepend_to(self, dest: &mut Chain, options: &Options) {
        if let Some(block) = self.into_block() {
            dest.prepend_block(block, options);
        }
    }
}

impl From<&[u8]> for Chain {
    fn from(src: &[u8]) -> Self {
        let mut chain = Self::new();
        chain.append(src);
        chain
    }
}

impl From<&str> for Chain {
    fn from(src: &str) -> Self {
        Self::from(src.as_bytes())
    }
}

impl From<Vec<u8>> for Chain {
    fn from(src: Vec<u8>) -> Self {
        let mut chain = Self::new();
        chain.append(src);
        chain
    }
}

impl From<String> for Chain {
    fn from(src: String) -> Self {
        let mut chain = Self::new();
        chain.append(src);
        chain
    }
}

impl From<bytes::Bytes> for Chain {
    fn from(src: bytes::Bytes) -> Self {
        let mut chain = Self::new();
        chain.append(src);
        chain
    }
}

impl From<BlockBuf> for Chain {
    fn from(src: BlockBuf) -> Self {
        let mut chain = Self::new();
        chain.append(src);
        chain
    }
}

impl From<Chain> for Vec<u8> {
    fn from(src: Chain) -> Self {
        src.into_vec()
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a [u8];
    type IntoIter = Blocks<'a>;

    fn into_iter(self) -> Blocks<'a> {
        self.blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{format, vec};

    fn collect(chain: &Chain) -> Vec<u8> {
        let vec = chain.to_vec();
        assert_eq!(vec.len(), chain.len());
        chain.verify_invariants();
        vec
    }

    #[test]
    fn short_data_stays_inline() {
        let mut chain = Chain::new();
        chain.append(&b"hello"[..]);
        assert_eq!(chain.len(), 5);
        assert_eq!(chain.blocks().count(), 1);
        assert_eq!(collect(&chain), b"hello");
        chain.append(&b" you"[..]);
        assert_eq!(collect(&chain), b"hello you");
        assert_eq!(chain.estimated_memory(), mem::size_of::<Chain>());
    }

    #[test]
    fn short_data_promotes() {
        let mut chain = Chain::new();
        chain.append(&b"0123456789"[..]);
        chain.append(&b"0123456789"[..]);
        assert_eq!(chain.len(), 20);
        assert_eq!(collect(&chain), b"01234567890123456789");
    }

    #[test]
    fn prepend_short_data() {
        let mut chain = Chain::new();
        chain.prepend(&b"world"[..]);
        chain.prepend(&b"hello "[..]);
        assert_eq!(collect(&chain), b"hello world");
    }

    #[test]
    fn bytewise_append_allocates_few_blocks() {
        let mut chain = Chain::new();
        for _ in 0..4096 {
            chain.append(&b"x"[..]);
        }
        assert_eq!(chain.len(), 4096);
        // Geometric block growth: far fewer blocks than bytes.
        assert!(chain.blocks().count() <= 16, "{}", chain.blocks().count());
        assert!(collect(&chain).iter().all(|&b| b == b'x'));
    }

    #[test]
    fn appended_chains_concatenate() {
        let mut a = Chain::from(&b"left-"[..]);
        let b = Chain::from(vec![b'r'; 2000]);
        a.append(&b);
        let mut expected = b"left-".to_vec();
        expected.extend_from_slice(&[b'r'; 2000]);
        assert_eq!(collect(&a), expected);
        assert_eq!(collect(&b), vec![b'r'; 2000]);
    }

    #[test]
    fn append_steals_blocks() {
        let mut a = Chain::from(vec![b'a'; 2000]);
        let b = Chain::from(vec![b'b'; 3000]);
        let b_ptr = b.blocks().next().unwrap().as_ptr();
        a.append(b);
        assert_eq!(a.len(), 5000);
        // The stolen block is attached, not copied.
        assert!(a.blocks().any(|f| f.as_ptr() == b_ptr));
        a.verify_invariants();
    }

    #[test]
    fn clone_shares_blocks() {
        let chain = Chain::from(vec![b'a'; 2000]);
        let clone = chain.clone();
        assert_eq!(
            chain.blocks().next().unwrap().as_ptr(),
            clone.blocks().next().unwrap().as_ptr(),
        );
        assert_eq!(chain, clone);
    }

    #[test]
    fn shared_chain_is_not_mutated_through_clone() {
        let mut chain = Chain::from(&b"hello"[..]);
        let mut clone = chain.clone();
        clone.append(&b" world"[..]);
        assert_eq!(collect(&chain), b"hello");
        assert_eq!(collect(&clone), b"hello world");

        let mut big = Chain::from(vec![b'a'; 5000]);
        let clone = big.clone();
        big.append(&b"!"[..]);
        assert_eq!(clone.len(), 5000);
        assert!(collect(&clone).iter().all(|&b| b == b'a'));
        assert_eq!(big.len(), 5001);
    }

    #[test]
    fn empty_append_is_noop() {
        let mut chain = Chain::from(&b"abc"[..]);
        chain.append(&b""[..]);
        chain.prepend(&b""[..]);
        chain.append(Chain::new());
        assert_eq!(collect(&chain), b"abc");
    }

    #[test]
    fn remove_prefix_and_suffix() {
        let mut chain = Chain::from(vec![b'a'; 5000]);
        chain.remove_prefix(2500);
        chain.remove_suffix(1000);
        assert_eq!(chain.len(), 1500);
        assert_eq!(chain.flatten(), &[b'a'; 1500][..]);
        chain.verify_invariants();
    }

    #[test]
    fn remove_prefix_trims_in_place() {
        let mut chain = Chain::from(vec![b'a'; 5000]);
        let data_ptr = chain.blocks().next().unwrap().as_ptr();
        chain.remove_prefix(2500);
        // The retained view is still backed by the original allocation.
        assert_eq!(chain.blocks().next().unwrap().as_ptr(), unsafe {
            data_ptr.add(2500)
        });
    }

    #[test]
    fn remove_shared_prefix_keeps_donor_alive() {
        let chain = Chain::from(vec![b'a'; 5000]);
        let mut clone = chain.clone();
        // The blocks are shared, so the trim cannot happen in place; the
        // retained suffix still points into the original allocation.
        let data_ptr = chain.blocks().next().unwrap().as_ptr();
        clone.remove_prefix(1000);
        assert_eq!(clone.len(), 4000);
        assert_eq!(clone.blocks().next().unwrap().as_ptr(), unsafe {
            data_ptr.add(1000)
        });
        assert_eq!(chain.len(), 5000);
        clone.verify_invariants();
    }

    #[test]
    fn remove_whole_chain() {
        let mut chain = Chain::from(vec![b'a'; 1000]);
        chain.remove_prefix(1000);
        assert!(chain.is_empty());
        chain.append(&b"next"[..]);
        assert_eq!(collect(&chain), b"next");

        let mut chain = Chain::from(&b"short"[..]);
        chain.remove_suffix(0);
        assert_eq!(chain.len(), 5);
        chain.remove_suffix(5);
        assert!(chain.is_empty());
    }

    #[test]
    fn remove_prefix_then_prepend_round_trips() {
        let mut expected = Vec::new();
        for i in 0..2000u32 {
            expected.push((i % 251) as u8);
        }
        for n in [0, 1, 15, 16, 100, 511, 512, 1999, 2000] {
            let mut chain = Chain::from(expected.clone());
            let prefix = expected[..n].to_vec();
            chain.remove_prefix(n);
            chain.prepend(prefix);
            assert_eq!(collect(&chain), expected);

            let mut chain = Chain::from(expected.clone());
            let suffix = expected[expected.len() - n..].to_vec();
            chain.remove_suffix(n);
            chain.append(suffix);
            assert_eq!(collect(&chain), expected);
        }
    }

    #[test]
    fn flatten_single_block_is_identity() {
        let mut chain = Chain::from(vec![b'z'; 3000]);
        let ptr = chain.blocks().next().unwrap().as_ptr();
        assert_eq!(chain.flatten().as_ptr(), ptr);
        assert_eq!(chain.blocks().count(), 1);
    }

    #[test]
    fn flatten_merges_blocks() {
        let mut chain = Chain::new();
        chain.append(vec![b'a'; 1000]);
        chain.append(vec![b'b'; 1000]);
        chain.append(vec![b'c'; 1000]);
        let flat = chain.flatten().to_vec();
        assert_eq!(chain.blocks().count(), 1);
        assert_eq!(&flat[..1000], &[b'a'; 1000][..]);
        assert_eq!(&flat[2000..], &[b'c'; 1000][..]);
        chain.verify_invariants();
    }

    #[test]
    fn position_finds_blocks() {
        let mut chain = Chain::new();
        let mut expected = Vec::new();
        for i in 0..40u8 {
            let fragment = vec![i; 97];
            expected.extend_from_slice(&fragment);
            chain.append(fragment);
        }
        assert_eq!(chain.len(), expected.len());
        for index in [0, 1, 96, 97, 1000, 2500, chain.len() - 1] {
            let (iter, offset) = chain.position(index);
            assert_eq!(iter.get().unwrap()[offset], expected[index], "{index}");
        }
        let (iter, offset) = chain.position(chain.len());
        assert!(iter.get().is_none());
        assert_eq!(offset, 0);
    }

    #[test]
    fn comparisons_agree_with_bytes() {
        let cases: &[&[u8]] = &[b"", b"a", b"ab", b"b", b"ba", b"aa"];
        for &a in cases {
            for &b in cases {
                let mut chain_a = Chain::from(&a[..1.min(a.len())]);
                chain_a.append(&a[1.min(a.len())..]);
                let chain_b = Chain::from(b);
                assert_eq!(chain_a.cmp(&chain_b), a.cmp(b), "{a:?} vs {b:?}");
                assert_eq!(chain_a == chain_b, a == b);
                assert_eq!(chain_a.partial_cmp(b).unwrap(), a.cmp(b));
            }
        }
    }

    #[test]
    fn append_buffer_contract() {
        let mut chain = Chain::new();
        let buffer = chain.append_buffer(10, 0, 100, &Options::DEFAULT);
        assert!(buffer.len() >= 10);
        let granted = buffer.len();
        buffer.fill(b'x');
        assert_eq!(chain.len(), granted);
        chain.remove_suffix(granted - 10);
        assert_eq!(collect(&chain), vec![b'x'; 10]);
    }

    #[test]
    fn size_hint_at_inline_boundary() {
        // A hint equal to the inline capacity keeps data inline.
        let mut chain = Chain::new();
        let options = Options::new().with_size_hint(Chain::MAX_SHORT_DATA_SIZE);
        chain.append_with(&b"abc"[..], &options);
        assert_eq!(chain.estimated_memory(), mem::size_of::<Chain>());

        // A larger hint promotes immediately.
        let mut chain = Chain::new();
        let options = Options::new().with_size_hint(Chain::MAX_SHORT_DATA_SIZE + 1);
        chain.append_with(&b"abc"[..], &options);
        assert!(chain.estimated_memory() > mem::size_of::<Chain>());
        assert_eq!(collect(&chain), b"abc");
    }

    #[test]
    fn zeroed_chains_share_the_zero_page() {
        let chain = Chain::zeroed(10_000);
        assert_eq!(chain.len(), 10_000);
        assert!(chain.blocks().all(|f| f.iter().all(|&b| b == 0)));
        assert_eq!(chain.blocks().next().unwrap().as_ptr(), ZERO_PAGE.as_ptr());
        chain.verify_invariants();

        let short = Chain::zeroed(7);
        assert_eq!(short.to_vec(), vec![0; 7]);
    }

    #[test]
    fn into_vec_reuses_unique_vector() {
        let vec = vec![b'v'; 4096];
        let ptr = vec.as_ptr();
        let chain = Chain::from(vec);
        let out = chain.into_vec();
        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(out, vec![b'v'; 4096]);

        // A shared chain copies instead.
        let chain = Chain::from(vec![b'v'; 4096]);
        let clone = chain.clone();
        let out = chain.into_vec();
        assert_eq!(out, clone.to_vec());
    }

    #[test]
    fn clear_reuses_unique_block() {
        let mut chain = Chain::from(vec![b'a'; 2000]);
        chain.clear();
        assert!(chain.is_empty());
        chain.append(&b"fresh"[..]);
        assert_eq!(collect(&chain), b"fresh");
    }

    #[test]
    fn debug_formats_escaped_bytes() {
        let chain = Chain::from(&b"ab\xffc"[..]);
        assert_eq!(format!("{chain:?}"), "b\"ab\\xffc\"");
    }

    #[test]
    fn many_blocks_front_and_back() {
        let mut chain = Chain::new();
        for i in 0..200u8 {
            chain.append(vec![i; 20]);
            chain.prepend(vec![i; 20]);
        }
        assert_eq!(chain.len(), 200 * 40);
        chain.verify_invariants();
        let bytes = collect(&chain);
        assert_eq!(bytes[0], 199);
        assert_eq!(bytes[bytes.len() - 1], 199);
    }
}
