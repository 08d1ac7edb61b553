use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Raw inter-process memory primitives.
///
/// Both calls are best-effort: they report how many bytes were actually
/// transferred and never fail loudly. A short count means the range was
/// partially or entirely unmapped, or the process has gone away.
pub trait MemoryAccess {
    /// Copy up to `buf.len()` bytes from `address` into `buf`.
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> usize;

    /// Copy `data` to `address`.
    fn write_bytes(&self, address: u64, data: &[u8]) -> usize;
}

impl<T: MemoryAccess + ?Sized> MemoryAccess for &T {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> usize {
        (**self).read_bytes(address, buf)
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> usize {
        (**self).write_bytes(address, data)
    }
}

/// Layout of the remote small-string-optimized string header.
///
/// `max_length` is a corruption heuristic rather than a protocol limit, so it
/// is carried as configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringLayout {
    /// Displacement of the `i32` length field from the header
    pub length_offset: u64,
    /// Lengths at or above this live behind the pointer stored at the header
    pub inline_threshold: i32,
    /// Longest length accepted before the header is treated as corrupt
    pub max_length: i32,
}

impl Default for StringLayout {
    fn default() -> Self {
        Self {
            length_offset: 0x10,
            inline_threshold: 16,
            max_length: 255,
        }
    }
}

/// Outcome of a typed read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readout<T> {
    /// All `size_of::<T>()` bytes arrived
    Complete(T),
    /// The read came back short or targeted the null address
    Degraded { bytes_read: usize },
}

impl<T: Pod> Readout<T> {
    /// The value, or a zeroed `T` if the read degraded
    pub fn value(self) -> T {
        match self {
            Readout::Complete(value) => value,
            Readout::Degraded { .. } => <T as bytemuck::Zeroable>::zeroed(),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Readout::Complete(value) => Some(value),
            Readout::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Readout::Degraded { .. })
    }
}

/// Typed reader over a [`MemoryAccess`] backend.
///
/// Reads never return errors. A short read yields a zeroed value, sets the
/// "last read degraded" flag and bumps the degraded counter.
pub struct MemoryReader<M> {
    memory: M,
    last_degraded: AtomicBool,
    degraded_reads: AtomicU64,
}

impl<M: MemoryAccess> MemoryReader<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            last_degraded: AtomicBool::new(false),
            degraded_reads: AtomicU64::new(0),
        }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn into_inner(self) -> M {
        self.memory
    }

    /// Whether the most recent primitive read came back short
    pub fn last_read_degraded(&self) -> bool {
        self.last_degraded.load(Ordering::Relaxed)
    }

    /// Number of degraded reads since creation or the last reset
    pub fn degraded_reads(&self) -> u64 {
        self.degraded_reads.load(Ordering::Relaxed)
    }

    pub fn reset_degraded_reads(&self) -> u64 {
        self.last_degraded.store(false, Ordering::Relaxed);
        self.degraded_reads.swap(0, Ordering::Relaxed)
    }

    fn record(&self, address: u64, requested: usize, bytes_read: usize) -> bool {
        let degraded = bytes_read != requested || address == 0;
        self.last_degraded.store(degraded, Ordering::Relaxed);
        if degraded {
            self.degraded_reads.fetch_add(1, Ordering::Relaxed);
            trace!(
                "Degraded read at {:#x}: {}/{} bytes",
                address,
                bytes_read,
                requested
            );
        }
        degraded
    }

    /// Read up to `size` bytes; the result is truncated on a short read
    pub fn read_bytes(&self, address: u64, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        let bytes_read = if address == 0 {
            0
        } else {
            self.memory.read_bytes(address, &mut buf).min(size)
        };
        self.record(address, size, bytes_read);
        buf.truncate(bytes_read);
        buf
    }

    pub fn read_checked<T: Pod>(&self, address: u64) -> Readout<T> {
        let mut value = <T as bytemuck::Zeroable>::zeroed();
        let size = std::mem::size_of::<T>();
        let bytes_read = if address == 0 {
            0
        } else {
            self.memory
                .read_bytes(address, bytemuck::bytes_of_mut(&mut value))
        };

        if self.record(address, size, bytes_read) {
            Readout::Degraded { bytes_read }
        } else {
            Readout::Complete(value)
        }
    }

    /// Read a `T`, falling back to zero when the read degrades
    pub fn read<T: Pod>(&self, address: u64) -> T {
        self.read_checked(address).value()
    }

    /// Read a remote pointer-sized word
    pub fn read_address(&self, address: u64) -> u64 {
        self.read::<u64>(address)
    }

    /// Write a `T`, returning the number of bytes that landed
    pub fn write<T: Pod>(&self, address: u64, value: T) -> usize {
        let bytes = bytemuck::bytes_of(&value);
        let written = self.memory.write_bytes(address, bytes);
        if written != bytes.len() {
            trace!(
                "Short write at {:#x}: {}/{} bytes",
                address,
                written,
                bytes.len()
            );
        }
        written
    }

    /// Read a remote small-string-optimized string.
    ///
    /// Corrupt or out-of-range lengths yield an empty string. Characters stop
    /// at the first NUL; invalid UTF-8 is replaced.
    pub fn read_string(&self, address: u64, layout: &StringLayout) -> String {
        let length = self.read::<i32>(address.wrapping_add(layout.length_offset));
        if length <= 0 || length > layout.max_length {
            trace!("Rejected string at {:#x}: length {}", address, length);
            return String::new();
        }

        let data = if length >= layout.inline_threshold {
            self.read_address(address)
        } else {
            address
        };

        let bytes = self.read_bytes(data, length as usize);
        let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Check that `address` is still readable (e.g. the module base)
    pub fn is_alive(&self, address: u64) -> bool {
        !self.read_checked::<u32>(address).is_degraded()
    }
}
