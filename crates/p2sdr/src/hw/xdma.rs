// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! XDMA transport: register window and streaming DMA channels.
//!
//! The FPGA is reached through five character devices: one register window
//! supporting 4-byte reads/writes at an offset, and four stream devices
//! supporting pread/pwrite with an AXI offset argument. Everything above
//! this module treats them as opaque transport.

use crate::error::{Error, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::unix::fs::FileExt;
use std::ptr::NonNull;
use std::sync::Mutex;

/// Required alignment for DMA buffers.
pub const DMA_ALIGNMENT: usize = 4096;

/// Residue region reserved at the head of each DMA arena, so short carries
/// across DMA block boundaries do not need an extra copy.
pub const DMA_RESIDUE: usize = 4096;

// ============================================================================
// Register window
// ============================================================================

/// 4-byte register access at a given offset in the FPGA register window.
///
/// An access the transport reports as incomplete is an error for the calling
/// operation; the engine does not retry at this level.
pub trait RegisterBus: Send + Sync {
    /// Read one 32-bit register.
    fn read32(&self, addr: u32) -> Result<u32>;
    /// Write one 32-bit register.
    fn write32(&self, addr: u32, value: u32) -> Result<()>;
}

/// Register window over the XDMA user character device.
pub struct XdmaWindow {
    file: File,
}

impl XdmaWindow {
    /// Open the register window device.
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::Init {
                what: "register window device",
                source,
            })?;
        log::info!("[xdma] register access connected to {}", path);
        Ok(Self { file })
    }
}

impl RegisterBus for XdmaWindow {
    fn read32(&self, addr: u32) -> Result<u32> {
        let mut raw = [0u8; 4];
        let n = self
            .file
            .read_at(&mut raw, u64::from(addr))
            .map_err(|source| Error::Register { addr, source })?;
        if n != 4 {
            return Err(Error::Register {
                addr,
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "short register read"),
            });
        }
        Ok(u32::from_ne_bytes(raw))
    }

    fn write32(&self, addr: u32, value: u32) -> Result<()> {
        let raw = value.to_ne_bytes();
        let n = self
            .file
            .write_at(&raw, u64::from(addr))
            .map_err(|source| Error::Register { addr, source })?;
        if n != 4 {
            return Err(Error::Register {
                addr,
                source: io::Error::new(io::ErrorKind::WriteZero, "short register write"),
            });
        }
        Ok(())
    }
}

/// In-memory register window, for bench testing without hardware.
///
/// Keeps a journal of every write so tests can assert on commit behaviour
/// (single-commit writes, idempotence of repeated configuration).
#[derive(Default)]
pub struct MemWindow {
    state: Mutex<MemWindowState>,
}

#[derive(Default)]
struct MemWindowState {
    cells: std::collections::HashMap<u32, u32>,
    journal: Vec<(u32, u32)>,
}

impl MemWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a register value directly, bypassing the journal.
    pub fn poke(&self, addr: u32, value: u32) {
        let mut st = self.state.lock().expect("MemWindow lock");
        st.cells.insert(addr, value);
    }

    /// Read a register value directly.
    #[must_use]
    pub fn peek(&self, addr: u32) -> u32 {
        let st = self.state.lock().expect("MemWindow lock");
        st.cells.get(&addr).copied().unwrap_or(0)
    }

    /// All (addr, value) writes since the last `clear_journal`.
    #[must_use]
    pub fn journal(&self) -> Vec<(u32, u32)> {
        let st = self.state.lock().expect("MemWindow lock");
        st.journal.clone()
    }

    /// Number of writes issued to one address since the last `clear_journal`.
    #[must_use]
    pub fn writes_to(&self, addr: u32) -> usize {
        let st = self.state.lock().expect("MemWindow lock");
        st.journal.iter().filter(|(a, _)| *a == addr).count()
    }

    pub fn clear_journal(&self) {
        let mut st = self.state.lock().expect("MemWindow lock");
        st.journal.clear();
    }
}

impl RegisterBus for MemWindow {
    fn read32(&self, addr: u32) -> Result<u32> {
        let st = self.state.lock().expect("MemWindow lock");
        Ok(st.cells.get(&addr).copied().unwrap_or(0))
    }

    fn write32(&self, addr: u32, value: u32) -> Result<()> {
        let mut st = self.state.lock().expect("MemWindow lock");
        st.cells.insert(addr, value);
        st.journal.push((addr, value));
        Ok(())
    }
}

// ============================================================================
// Streaming DMA
// ============================================================================

/// One opened DMA stream character device.
///
/// Each channel is read or written by exactly one thread; the mic and
/// wideband senders share one read device and serialise externally.
pub struct DmaChannel {
    file: File,
    device: &'static str,
}

impl DmaChannel {
    /// Open a DMA stream device.
    pub fn open(device: &'static str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|source| Error::Init {
                what: "DMA stream device",
                source,
            })?;
        Ok(Self { file, device })
    }

    /// DMA a block from the FPGA into `buf`, from the given AXI offset.
    pub fn read_from(&self, buf: &mut [u8], axi_addr: u64) -> Result<()> {
        let n = self
            .file
            .read_at(buf, axi_addr)
            .map_err(|source| Error::Dma {
                device: self.device,
                source,
            })?;
        if n != buf.len() {
            return Err(Error::Dma {
                device: self.device,
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "short DMA read"),
            });
        }
        Ok(())
    }

    /// DMA `buf` out to the FPGA at the given AXI offset.
    pub fn write_to(&self, buf: &[u8], axi_addr: u64) -> Result<()> {
        let n = self
            .file
            .write_at(buf, axi_addr)
            .map_err(|source| Error::Dma {
                device: self.device,
                source,
            })?;
        if n != buf.len() {
            return Err(Error::Dma {
                device: self.device,
                source: io::Error::new(io::ErrorKind::WriteZero, "short DMA write"),
            });
        }
        Ok(())
    }
}

// ============================================================================
// DMA arena
// ============================================================================

/// Page-aligned zeroed allocation for DMA transfer buffers.
struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuf {
    fn new(size: usize) -> Self {
        let layout =
            Layout::from_size_align(size, DMA_ALIGNMENT).expect("DMA buffer layout invalid");
        // SAFETY: layout has non-zero size; allocation failure is checked below.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).expect("DMA buffer allocation failed");
        Self { ptr, layout }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: ptr/layout are exactly what alloc_zeroed returned.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        // SAFETY: the allocation is live for self's lifetime and layout.size() long.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self gives unique access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

// SAFETY: the buffer is plain bytes with unique ownership.
unsafe impl Send for AlignedBuf {}

/// One DMA direction's staging memory: a 4 KiB residue region followed by
/// the DMA target region, with index-typed read/head cursors.
///
/// Incoming blocks always land at `base`; unconsumed bytes are carried into
/// the residue region immediately before `base` so a partial record spanning
/// a block boundary stays contiguous.
pub struct DmaArena {
    buf: AlignedBuf,
    read: usize,
    head: usize,
}

impl DmaArena {
    /// Allocate an arena with `dma_size` bytes after the residue region.
    #[must_use]
    pub fn new(dma_size: usize) -> Self {
        let buf = AlignedBuf::new(DMA_RESIDUE + dma_size);
        Self {
            buf,
            read: DMA_RESIDUE,
            head: DMA_RESIDUE,
        }
    }

    /// Mutable view of the DMA landing region (starts at `base`).
    pub fn dma_region(&mut self, len: usize) -> &mut [u8] {
        &mut self.buf[DMA_RESIDUE..DMA_RESIDUE + len]
    }

    /// Record that `len` bytes were DMAed into the landing region.
    ///
    /// Must be preceded by `carry_residue` so unread bytes are not lost.
    pub fn commit(&mut self, len: usize) {
        debug_assert_eq!(self.head, self.read, "commit with unread data pending");
        self.head = DMA_RESIDUE + len;
    }

    /// Move unread bytes to just before the landing region and reset cursors.
    pub fn carry_residue(&mut self) {
        let pending = self.head - self.read;
        debug_assert!(pending <= DMA_RESIDUE);
        if pending != 0 {
            self.buf.copy_within(self.read..self.head, DMA_RESIDUE - pending);
        }
        self.read = DMA_RESIDUE - pending;
        self.head = self.read;
    }

    /// Unconsumed bytes currently available.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.head - self.read
    }

    /// View of the unconsumed bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.read..self.head]
    }

    /// Consume `n` bytes from the front of the unread region.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.pending());
        self.read += n;
    }

    /// Discard any pending bytes and reset the cursors (stream restart).
    pub fn reset(&mut self) {
        self.read = DMA_RESIDUE;
        self.head = DMA_RESIDUE;
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mem_window_read_write_journal() {
        let win = MemWindow::new();
        win.write32(0x2014, 0xDEAD_BEEF).expect("write");
        assert_eq!(win.read32(0x2014).expect("read"), 0xDEAD_BEEF);
        assert_eq!(win.read32(0x9999).expect("read"), 0);
        assert_eq!(win.journal(), vec![(0x2014, 0xDEAD_BEEF)]);
        assert_eq!(win.writes_to(0x2014), 1);
        win.clear_journal();
        assert!(win.journal().is_empty());
    }

    #[test]
    fn file_backed_window_round_trips() {
        // A plain file exercises the same pread/pwrite path as the char device.
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        tmp.write_all(&[0u8; 64]).expect("prefill");
        let win = XdmaWindow::open(tmp.path().to_str().expect("utf8 path")).expect("open");
        win.write32(0x10, 0x0102_0304).expect("write");
        assert_eq!(win.read32(0x10).expect("read"), 0x0102_0304);
        assert_eq!(win.read32(0x14).expect("read"), 0);
    }

    #[test]
    fn arena_alignment_and_residue_carry() {
        let mut arena = DmaArena::new(4096);
        assert_eq!(arena.buf.as_ptr() as usize % DMA_ALIGNMENT, 0);

        arena.carry_residue();
        arena.dma_region(16).copy_from_slice(&[1u8; 16]);
        arena.commit(16);
        assert_eq!(arena.pending(), 16);
        arena.consume(10);
        assert_eq!(arena.pending(), 6);

        // 6 leftover bytes move into the residue region ahead of the next block
        arena.carry_residue();
        assert_eq!(arena.pending(), 0);
        arena.dma_region(8).copy_from_slice(&[2u8; 8]);
        arena.commit(8);
        // leftover bytes stay contiguous with the new block
        assert_eq!(arena.pending(), 6 + 8);
        assert_eq!(&arena.data()[..6], &[1u8; 6]);
        assert_eq!(&arena.data()[6..], &[2u8; 8]);
    }
}
