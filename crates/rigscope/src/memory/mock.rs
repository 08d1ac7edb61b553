//! In-process stand-ins for a remote memory image.
//!
//! `MockMemory` is a sparse paged address space implementing
//! [`MemoryAccess`]; unmapped pages produce short reads exactly like a real
//! process would. `MockScene` lays out instances, strings and child lists
//! on top of it using an [`OffsetTable`].

use std::collections::HashMap;

use bytemuck::Pod;
use parking_lot::RwLock;

use super::MemoryAccess;
use crate::offset::OffsetTable;

const PAGE_SIZE: u64 = 0x1000;

/// Sparse paged memory image
#[derive(Default)]
pub struct MockMemory {
    pages: RwLock<HashMap<u64, Box<[u8; PAGE_SIZE as usize]>>>,
}

impl MockMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map zero-filled pages covering `[address, address + size)`
    pub fn map(&self, address: u64, size: u64) {
        if size == 0 {
            return;
        }
        let first = address / PAGE_SIZE;
        let last = (address + size - 1) / PAGE_SIZE;
        let mut pages = self.pages.write();
        for index in first..=last {
            pages
                .entry(index)
                .or_insert_with(|| Box::new([0u8; PAGE_SIZE as usize]));
        }
    }

    /// Unmap the page containing `address`
    pub fn unmap(&self, address: u64) {
        self.pages.write().remove(&(address / PAGE_SIZE));
    }

    /// Drop every page, as if the process exited
    pub fn clear(&self) {
        self.pages.write().clear();
    }

    /// Write bytes, mapping pages as needed
    pub fn poke(&self, address: u64, data: &[u8]) {
        self.map(address, data.len() as u64);
        self.write_bytes(address, data);
    }

    pub fn poke_value<T: Pod>(&self, address: u64, value: T) {
        self.poke(address, bytemuck::bytes_of(&value));
    }
}

impl MemoryAccess for MockMemory {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> usize {
        let pages = self.pages.read();
        let mut copied = 0usize;

        while copied < buf.len() {
            let Some(cursor) = address.checked_add(copied as u64) else {
                break;
            };
            let Some(page) = pages.get(&(cursor / PAGE_SIZE)) else {
                break;
            };
            let offset = (cursor % PAGE_SIZE) as usize;
            let count = (page.len() - offset).min(buf.len() - copied);
            buf[copied..copied + count].copy_from_slice(&page[offset..offset + count]);
            copied += count;
        }

        copied
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> usize {
        let mut pages = self.pages.write();
        let mut written = 0usize;

        while written < data.len() {
            let Some(cursor) = address.checked_add(written as u64) else {
                break;
            };
            let Some(page) = pages.get_mut(&(cursor / PAGE_SIZE)) else {
                break;
            };
            let offset = (cursor % PAGE_SIZE) as usize;
            let count = (page.len() - offset).min(data.len() - written);
            page[offset..offset + count].copy_from_slice(&data[written..written + count]);
            written += count;
        }

        written
    }
}

/// Fluent builder for a [`MockMemory`] image
#[derive(Default)]
pub struct MockMemoryBuilder {
    memory: MockMemory,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(self, address: u64, data: &[u8]) -> Self {
        self.memory.poke(address, data);
        self
    }

    pub fn write_value<T: Pod>(self, address: u64, value: T) -> Self {
        self.memory.poke_value(address, value);
        self
    }

    pub fn write_u64(self, address: u64, value: u64) -> Self {
        self.write_value(address, value)
    }

    pub fn write_u32(self, address: u64, value: u32) -> Self {
        self.write_value(address, value)
    }

    pub fn write_i32(self, address: u64, value: i32) -> Self {
        self.write_value(address, value)
    }

    pub fn write_f32(self, address: u64, value: f32) -> Self {
        self.write_value(address, value)
    }

    pub fn build(self) -> MockMemory {
        self.memory
    }
}

/// Lays out a remote instance tree in mock memory.
///
/// Addresses come from a bump allocator; every instance gets a name string,
/// a shared per-class descriptor and, once children are attached, a child
/// list record with 16-byte slots.
pub struct MockScene {
    memory: MockMemory,
    offsets: OffsetTable,
    next: u64,
    class_descriptors: HashMap<String, u64>,
    children: HashMap<u64, Vec<u64>>,
}

impl MockScene {
    /// Base address of the fake main module
    pub const MODULE_BASE: u64 = 0x7FF6_0000_0000;

    const HEAP_START: u64 = 0x1_0000_0000;
    const INSTANCE_SIZE: u64 = 0x1000;

    pub fn new(offsets: OffsetTable) -> Self {
        Self {
            memory: MockMemory::new(),
            offsets,
            next: Self::HEAP_START,
            class_descriptors: HashMap::new(),
            children: HashMap::new(),
        }
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn memory(&self) -> &MockMemory {
        &self.memory
    }

    pub fn into_memory(self) -> MockMemory {
        self.memory
    }

    /// Allocate a zero-filled block, 16-byte aligned
    pub fn alloc(&mut self, size: u64) -> u64 {
        let address = self.next;
        let size = size.max(1);
        self.memory.map(address, size);
        self.next += (size + 0x1F) & !0xF;
        address
    }

    pub fn write<T: Pod>(&self, address: u64, value: T) {
        self.memory.poke_value(address, value);
    }

    /// Write a string header (inline or indirect, per the string layout)
    pub fn string(&mut self, value: &str) -> u64 {
        let layout = self.offsets.string;
        let header = self.alloc(layout.length_offset + 8);
        self.write(header + layout.length_offset, value.len() as i32);

        if value.len() as i32 >= layout.inline_threshold {
            let data = self.alloc(value.len() as u64 + 1);
            self.memory.poke(data, value.as_bytes());
            self.write(header, data);
        } else {
            self.memory.poke(header, value.as_bytes());
        }
        header
    }

    fn class_descriptor(&mut self, class: &str) -> u64 {
        if let Some(&descriptor) = self.class_descriptors.get(class) {
            return descriptor;
        }
        let descriptor = self.alloc(0x40);
        let name = self.string(class);
        self.write(descriptor + self.offsets.instance.class_name, name);
        self.class_descriptors.insert(class.to_string(), descriptor);
        descriptor
    }

    /// Create a detached instance with a name and class
    pub fn instance(&mut self, name: &str, class: &str) -> u64 {
        let address = self.unnamed_instance(class);
        let name = self.string(name);
        self.write(address + self.offsets.instance.name, name);
        address
    }

    /// Create an instance whose name pointer is null
    pub fn unnamed_instance(&mut self, class: &str) -> u64 {
        let address = self.alloc(Self::INSTANCE_SIZE);
        let descriptor = self.class_descriptor(class);
        self.write(address + self.offsets.instance.class_descriptor, descriptor);
        address
    }

    /// Replace the child list of `parent`
    pub fn set_children(&mut self, parent: u64, children: &[u64]) {
        let layout = self.offsets.instance;
        let record = self.alloc(layout.children_end + 8);
        let slots = self.alloc(children.len() as u64 * 0x10);

        self.write(record, slots);
        self.write(record + layout.children_end, slots + children.len() as u64 * 0x10);
        self.write(parent + layout.children_start, record);

        for (index, &child) in children.iter().enumerate() {
            self.write(slots + index as u64 * 0x10, child);
            self.write(child + layout.parent, parent);
        }
        self.children.insert(parent, children.to_vec());
    }

    /// Create a named child and append it to `parent`
    pub fn add_child(&mut self, parent: u64, name: &str, class: &str) -> u64 {
        let child = self.instance(name, class);
        let mut children = self.children.get(&parent).cloned().unwrap_or_default();
        children.push(child);
        self.set_children(parent, &children);
        child
    }

    /// Point the module's fake data model pointer at a new `DataModel`
    pub fn data_model(&mut self) -> u64 {
        let data_model = self.instance("Game", "DataModel");
        let fake = self.alloc(self.offsets.data_model.real_data_model + 8);
        self.write(fake + self.offsets.data_model.real_data_model, data_model);
        self.write(
            Self::MODULE_BASE + self.offsets.data_model.fake_pointer,
            fake,
        );
        data_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_memory_partial_read() {
        let memory = MockMemory::new();
        memory.poke(0x1FFE, &[1, 2]);

        let mut buf = [0u8; 4];
        assert_eq!(memory.read_bytes(0x1FFE, &mut buf), 2);
        assert_eq!(buf, [1, 2, 0, 0]);
    }

    #[test]
    fn test_mock_memory_write_needs_mapping() {
        let memory = MockMemory::new();
        assert_eq!(memory.write_bytes(0x3000, &[1, 2, 3]), 0);

        memory.map(0x3000, 3);
        assert_eq!(memory.write_bytes(0x3000, &[1, 2, 3]), 3);
    }

    #[test]
    fn test_mock_memory_spans_pages() {
        let memory = MockMemory::new();
        let data: Vec<u8> = (0..=255).collect();
        memory.poke(0x1F80, &data);

        let mut buf = vec![0u8; 256];
        assert_eq!(memory.read_bytes(0x1F80, &mut buf), 256);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_alloc_does_not_overlap() {
        let mut scene = MockScene::new(OffsetTable::default());
        let a = scene.alloc(0x30);
        let b = scene.alloc(0x10);
        assert!(b >= a + 0x30);
        assert_eq!(b % 0x10, 0);
    }
}
