//! Portable physical memory management logic: the buddy allocator and the page-table-page pool
//! layered on top of it.
//!
//! Everything in this module is free of board addresses and inline assembly, so it is exercised
//! directly by this crate's own test suite; the kernel binary's `mm` module re-exports it and adds
//! the board-specific wiring (boot reservoir bounds, the global [`BuddyAllocator`]/`PtPool`
//! instances) that only makes sense once running on real hardware.

pub mod buddy;
pub mod pt_pool;
