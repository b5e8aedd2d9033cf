use crate::bytecode::program::{DATA_BASE, HEAP_BASE, STACK_TOP};
use crate::runtime::Value;
use crate::types::ScalarKind;

/// Marker written into every live allocation header; `free` rejects any
/// address whose header does not carry it.
const ALLOC_MAGIC: u32 = 0xDEAD_BEEF;
const HEADER_SIZE: u32 = 8;

/// A memory access that could not be satisfied. The VM turns these into
/// faults with the current instruction's source position attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// Access through the guard page below the data segment.
    Null,
    /// Access outside every segment, or straddling a segment end.
    OutOfBounds,
}

/// The guest's segmented address space. Three disjoint ranges:
///
///   [DATA_BASE, DATA_BASE+data)    globals and string literals
///   [HEAP_BASE, HEAP_BASE+heap)    malloc arena
///   [stack_base, STACK_TOP)        call frames, grows downward
///
/// Everything below DATA_BASE is a guard page so that null and
/// near-null dereferences fault distinctly from plain wild accesses.
pub struct Memory {
    data: Vec<u8>,
    heap: Vec<u8>,
    stack: Vec<u8>,
    stack_base: u32,
    /// Next fresh heap address for bump allocation.
    brk: u32,
    /// Freed blocks available for reuse, first fit in free order.
    free_blocks: Vec<FreeBlock>,
}

#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    /// Header address.
    addr: u32,
    /// User bytes of the block.
    size: u32,
}

impl Memory {
    pub fn new(data_image: &[u8], stack_size: u32, heap_size: u32) -> Self {
        Memory {
            data: data_image.to_vec(),
            heap: vec![0; heap_size as usize],
            stack: vec![0; stack_size as usize],
            stack_base: STACK_TOP - stack_size,
            brk: HEAP_BASE,
            free_blocks: Vec::new(),
        }
    }

    pub fn stack_base(&self) -> u32 {
        self.stack_base
    }

    pub fn bytes(&self, addr: u32, len: u32) -> Result<&[u8], MemError> {
        let (segment, start) = self.locate(addr, len)?;
        Ok(&segment[start..start + len as usize])
    }

    pub fn bytes_mut(&mut self, addr: u32, len: u32) -> Result<&mut [u8], MemError> {
        let (segment, start) = self.locate_mut(addr, len)?;
        Ok(&mut segment[start..start + len as usize])
    }

    fn locate(&self, addr: u32, len: u32) -> Result<(&[u8], usize), MemError> {
        if addr < DATA_BASE {
            return Err(MemError::Null);
        }
        let end = addr.checked_add(len).ok_or(MemError::OutOfBounds)?;
        let data_end = DATA_BASE + self.data.len() as u32;
        let heap_end = HEAP_BASE + self.heap.len() as u32;
        if addr >= DATA_BASE && end <= data_end {
            Ok((&self.data, (addr - DATA_BASE) as usize))
        } else if addr >= HEAP_BASE && end <= heap_end {
            Ok((&self.heap, (addr - HEAP_BASE) as usize))
        } else if addr >= self.stack_base && end <= STACK_TOP {
            Ok((&self.stack, (addr - self.stack_base) as usize))
        } else {
            Err(MemError::OutOfBounds)
        }
    }

    fn locate_mut(&mut self, addr: u32, len: u32) -> Result<(&mut [u8], usize), MemError> {
        if addr < DATA_BASE {
            return Err(MemError::Null);
        }
        let end = addr.checked_add(len).ok_or(MemError::OutOfBounds)?;
        let data_end = DATA_BASE + self.data.len() as u32;
        let heap_end = HEAP_BASE + self.heap.len() as u32;
        if addr >= DATA_BASE && end <= data_end {
            Ok((&mut self.data, (addr - DATA_BASE) as usize))
        } else if addr >= HEAP_BASE && end <= heap_end {
            Ok((&mut self.heap, (addr - HEAP_BASE) as usize))
        } else if addr >= self.stack_base && end <= STACK_TOP {
            Ok((&mut self.stack, (addr - self.stack_base) as usize))
        } else {
            Err(MemError::OutOfBounds)
        }
    }

    // ------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------

    /// Load a scalar. Narrow integers are extended to the canonical
    /// 64-bit stack representation according to their signedness.
    pub fn load(&self, addr: u32, kind: ScalarKind) -> Result<Value, MemError> {
        let bytes = self.bytes(addr, kind.size())?;
        let value = match kind {
            ScalarKind::I8 => Value::Int(bytes[0] as i8 as i64),
            ScalarKind::U8 => Value::Int(bytes[0] as i64),
            ScalarKind::I16 => Value::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            ScalarKind::U16 => Value::Int(u16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            ScalarKind::I32 => {
                Value::Int(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
            }
            ScalarKind::U32 => {
                Value::Int(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
            }
            ScalarKind::I64 | ScalarKind::U64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Value::Int(i64::from_le_bytes(raw))
            }
            ScalarKind::F32 => {
                Value::Float(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64)
            }
            ScalarKind::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Value::Float(f64::from_le_bytes(raw))
            }
            ScalarKind::Ptr => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Value::Ptr(u64::from_le_bytes(raw) as u32)
            }
        };
        Ok(value)
    }

    /// Store a scalar at its memory width. Conversions between value
    /// classes are total so that a hand-crafted program image cannot
    /// crash the host: integers truncate, floats round.
    pub fn store(&mut self, addr: u32, kind: ScalarKind, value: Value) -> Result<(), MemError> {
        if kind.is_float() {
            let f = match value {
                Value::Float(f) => f,
                Value::Int(n) => n as f64,
                Value::Ptr(p) => p as f64,
            };
            let bytes = self.bytes_mut(addr, kind.size())?;
            match kind {
                ScalarKind::F32 => bytes.copy_from_slice(&(f as f32).to_le_bytes()),
                _ => bytes.copy_from_slice(&f.to_le_bytes()),
            }
            return Ok(());
        }

        let n: i64 = match value {
            Value::Int(n) => n,
            Value::Ptr(p) => p as i64,
            Value::Float(f) => f as i64,
        };
        let raw = n.to_le_bytes();
        let size = kind.size() as usize;
        let bytes = self.bytes_mut(addr, size as u32)?;
        bytes.copy_from_slice(&raw[..size]);
        Ok(())
    }

    /// Read a NUL-terminated guest string. Stops with `OutOfBounds` when
    /// the terminator is missing before the segment ends.
    pub fn read_cstr(&self, addr: u32) -> Result<Vec<u8>, MemError> {
        let mut out = Vec::new();
        let mut at = addr;
        loop {
            let byte = self.bytes(at, 1)?[0];
            if byte == 0 {
                return Ok(out);
            }
            out.push(byte);
            at = at.checked_add(1).ok_or(MemError::OutOfBounds)?;
        }
    }

    pub fn copy(&mut self, dst: u32, src: u32, len: u32) -> Result<(), MemError> {
        if len == 0 {
            return Ok(());
        }
        // memmove semantics via a temporary; overlap is legal
        let buffer = self.bytes(src, len)?.to_vec();
        self.bytes_mut(dst, len)?.copy_from_slice(&buffer);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Heap
    // ------------------------------------------------------------------

    /// Allocate `size` user bytes. Returns the null address when the
    /// arena is exhausted; guest code is expected to check.
    pub fn malloc(&mut self, size: u32) -> u32 {
        let need = align8(size.max(1));

        // first fit among freed blocks
        if let Some(found) = self
            .free_blocks
            .iter()
            .position(|block| block.size >= need)
        {
            let block = self.free_blocks.remove(found);
            self.write_header(block.addr, block.size);
            return block.addr + HEADER_SIZE;
        }

        let heap_end = HEAP_BASE + self.heap.len() as u32;
        let header = self.brk;
        let Some(end) = header.checked_add(HEADER_SIZE + need) else {
            return 0;
        };
        if end > heap_end {
            return 0;
        }
        self.brk = end;
        self.write_header(header, need);
        header + HEADER_SIZE
    }

    /// Release an allocation. Freeing null is a no-op; any address that
    /// does not point just past a live header is an error.
    pub fn free(&mut self, addr: u32) -> Result<(), MemError> {
        if addr == 0 {
            return Ok(());
        }
        let header = addr.checked_sub(HEADER_SIZE).ok_or(MemError::OutOfBounds)?;
        let bytes = self.bytes(header, HEADER_SIZE)?;
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if magic != ALLOC_MAGIC {
            return Err(MemError::OutOfBounds);
        }
        // clear the magic so a double free is caught
        let bytes = self.bytes_mut(header, 4)?;
        bytes.copy_from_slice(&0u32.to_le_bytes());
        self.free_blocks.push(FreeBlock { addr: header, size });
        Ok(())
    }

    fn write_header(&mut self, header: u32, size: u32) {
        let start = (header - HEAP_BASE) as usize;
        self.heap[start..start + 4].copy_from_slice(&ALLOC_MAGIC.to_le_bytes());
        self.heap[start + 4..start + 8].copy_from_slice(&size.to_le_bytes());
    }
}

fn align8(n: u32) -> u32 {
    (n + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Memory {
        Memory::new(&[1, 2, 3, 4, 5, 6, 7, 8], 4096, 65536)
    }

    #[test]
    fn test_null_guard_page() {
        let mem = memory();
        assert_eq!(mem.load(0, ScalarKind::I32), Err(MemError::Null));
        assert_eq!(mem.load(0xfff, ScalarKind::U8), Err(MemError::Null));
    }

    #[test]
    fn test_out_of_bounds_between_segments() {
        let mem = memory();
        assert_eq!(mem.load(DATA_BASE + 64, ScalarKind::U8), Err(MemError::OutOfBounds));
        // straddling the data segment end
        assert_eq!(mem.load(DATA_BASE + 5, ScalarKind::I64), Err(MemError::OutOfBounds));
    }

    #[test]
    fn test_sign_extension_on_load() {
        let mut mem = memory();
        mem.store(DATA_BASE, ScalarKind::I8, Value::Int(-1)).unwrap();
        assert_eq!(mem.load(DATA_BASE, ScalarKind::I8), Ok(Value::Int(-1)));
        assert_eq!(mem.load(DATA_BASE, ScalarKind::U8), Ok(Value::Int(255)));
    }

    #[test]
    fn test_store_truncates_to_width() {
        let mut mem = memory();
        mem.store(DATA_BASE, ScalarKind::I16, Value::Int(0x1_2345)).unwrap();
        assert_eq!(mem.load(DATA_BASE, ScalarKind::U16), Ok(Value::Int(0x2345)));
    }

    #[test]
    fn test_float_roundtrip() {
        let mut mem = memory();
        mem.store(HEAP_BASE + 16, ScalarKind::F64, Value::Float(2.5)).unwrap();
        assert_eq!(mem.load(HEAP_BASE + 16, ScalarKind::F64), Ok(Value::Float(2.5)));
        mem.store(HEAP_BASE + 24, ScalarKind::F32, Value::Float(1.5)).unwrap();
        assert_eq!(mem.load(HEAP_BASE + 24, ScalarKind::F32), Ok(Value::Float(1.5)));
    }

    #[test]
    fn test_malloc_free_reuse() {
        let mut mem = memory();
        let a = mem.malloc(32);
        assert_ne!(a, 0);
        let b = mem.malloc(32);
        assert_ne!(b, 0);
        assert_ne!(a, b);

        mem.free(a).unwrap();
        let c = mem.malloc(16);
        // the freed block satisfies the smaller request
        assert_eq!(c, a);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut mem = memory();
        let a = mem.malloc(8);
        mem.free(a).unwrap();
        assert_eq!(mem.free(a), Err(MemError::OutOfBounds));
    }

    #[test]
    fn test_free_of_wild_pointer_rejected() {
        let mut mem = memory();
        let a = mem.malloc(8);
        assert_eq!(mem.free(a + 4), Err(MemError::OutOfBounds));
        assert!(mem.free(0).is_ok());
    }

    #[test]
    fn test_malloc_exhaustion_returns_null() {
        let mut mem = Memory::new(&[], 4096, 64);
        let a = mem.malloc(32);
        assert_ne!(a, 0);
        assert_eq!(mem.malloc(64), 0);
    }

    #[test]
    fn test_cstr_read() {
        let mut mem = memory();
        let addr = mem.malloc(8);
        mem.bytes_mut(addr, 4).unwrap().copy_from_slice(b"hi\0x");
        assert_eq!(mem.read_cstr(addr), Ok(b"hi".to_vec()));
    }

    #[test]
    fn test_stack_addressing() {
        let mut mem = memory();
        let addr = STACK_TOP - 16;
        mem.store(addr, ScalarKind::I64, Value::Int(42)).unwrap();
        assert_eq!(mem.load(addr, ScalarKind::I64), Ok(Value::Int(42)));
        assert_eq!(
            mem.load(mem.stack_base() - 8, ScalarKind::I64),
            Err(MemError::OutOfBounds)
        );
    }
}
