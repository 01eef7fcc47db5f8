//! Register transport.
//!
//! The configuration manager talks to the IP core through the [`RegisterIo`]
//! trait: synchronous 32-bit reads and writes at byte offsets within the
//! mapped register region. Two implementations live here: [`Mapping`], the
//! UIO-backed memory mapping used on hardware, and [`RegisterFile`], a
//! RAM-backed register bank used by the tests and as a simulation backend.

use crate::error::Result;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Register transport boundary.
///
/// Offsets are byte offsets, 32-bit aligned, within the mapped register
/// region. Both operations are synchronous and short-latency; no burst or
/// DMA semantics are required.
pub trait RegisterIo {
    /// Reads the 32-bit register at a byte offset.
    fn read_reg(&self, offset: u32) -> Result<u32>;

    /// Writes the 32-bit register at a byte offset.
    fn write_reg(&self, offset: u32, value: u32) -> Result<()>;
}

impl<T: RegisterIo + ?Sized> RegisterIo for Arc<T> {
    fn read_reg(&self, offset: u32) -> Result<u32> {
        (**self).read_reg(offset)
    }

    fn write_reg(&self, offset: u32, value: u32) -> Result<()> {
        (**self).write_reg(offset, value)
    }
}

/// UIO device.
///
/// Gives access to the register mapping and the interrupt line of a UIO
/// device.
#[derive(Debug)]
pub struct Uio {
    num: usize,
    file: fs::File,
}

impl Uio {
    /// Opens a UIO device by number (`/dev/uio<num>`).
    pub async fn from_num(num: usize) -> Result<Uio> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/uio{num}"))
            .await?;
        Ok(Uio { num, file })
    }

    /// Opens a UIO device by its name in `/sys/class/uio`.
    pub async fn from_name(name: &str) -> Result<Uio> {
        match Self::find_by_name(name).await? {
            Some(num) => Self::from_num(num).await,
            None => Err(not_found(format!("UIO device {name} not found")).into()),
        }
    }

    async fn find_by_name(name: &str) -> Result<Option<usize>> {
        let mut entries = fs::read_dir(Path::new("/sys/class/uio")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(num) = file_name
                .to_str()
                .and_then(|s| s.strip_prefix("uio"))
                .and_then(|s| s.parse::<usize>().ok())
            else {
                continue;
            };
            let mut path = entry.path();
            path.push("name");
            if fs::read_to_string(path).await?.trim_end() == name {
                return Ok(Some(num));
            }
        }
        Ok(None)
    }

    async fn read_map_hex(&self, mapping: usize, fname: &str) -> Result<usize> {
        let text = fs::read_to_string(format!(
            "/sys/class/uio/uio{}/maps/map{mapping}/{fname}",
            self.num
        ))
        .await?;
        let digits = text
            .strip_prefix("0x")
            .ok_or_else(|| invalid_data(format!("map{mapping}/{fname} has no 0x prefix")))?
            .trim_end();
        usize::from_str_radix(digits, 16)
            .map_err(|e| invalid_data(format!("map{mapping}/{fname}: {e}")).into())
    }

    /// Returns the physical address of a register region.
    pub async fn map_addr(&self, mapping: usize) -> Result<usize> {
        self.read_map_hex(mapping, "addr").await
    }

    /// Maps a register region of the device.
    ///
    /// Mappings are numbered sequentially per device, as listed in
    /// `/sys/class/uio/uio*/maps`; devices with a single register region
    /// use mapping 0.
    pub async fn map(&self, mapping: usize) -> Result<Mapping> {
        let map_size = self.read_map_hex(mapping, "size").await?;
        let map_offset = self.read_map_hex(mapping, "offset").await?;
        let fd = self.file.as_raw_fd();
        let base = unsafe {
            match libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                (mapping * page_size::get()) as libc::off_t,
            ) {
                libc::MAP_FAILED => return Err(io::Error::last_os_error().into()),
                p => p,
            }
        };
        Ok(Mapping(Arc::new(MapInner {
            base,
            effective_offset: map_offset,
            map_size,
        })))
    }

    /// Enables the device interrupt by writing 1 to the character device.
    pub async fn irq_enable(&mut self) -> Result<()> {
        self.file.write_all(&1u32.to_ne_bytes()).await?;
        Ok(())
    }

    /// Disables the device interrupt by writing 0 to the character device.
    pub async fn irq_disable(&mut self) -> Result<()> {
        self.file.write_all(&0u32.to_ne_bytes()).await?;
        Ok(())
    }

    /// Waits for an interrupt and returns the interrupt count.
    pub async fn irq_wait(&mut self) -> Result<u32> {
        let mut bytes = [0; 4];
        self.file.read_exact(&mut bytes).await?;
        Ok(u32::from_ne_bytes(bytes))
    }
}

#[derive(Debug)]
struct MapInner {
    base: *mut libc::c_void,
    effective_offset: usize,
    map_size: usize,
}

/// Memory-mapped register region of a UIO device.
///
/// Cheaply clonable; clones share the mapping, which is unmapped when the
/// last clone drops. Register access is volatile and bounds-checked.
#[derive(Debug, Clone)]
pub struct Mapping(Arc<MapInner>);

// The mapping refers to device registers, not ordinary memory; raw pointer
// access is done through volatile operations only.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    fn reg_ptr(&self, offset: u32) -> Result<*mut u32> {
        let offset = offset as usize;
        // effective_offset comes from sysfs and may exceed the map size on
        // a malformed entry, so keep the comparison on the addition side
        if offset % 4 != 0 || self.0.effective_offset + offset + 4 > self.0.map_size {
            return Err(invalid_input(format!("register offset {offset:#x} invalid")).into());
        }
        let base = self.0.base as *mut u8;
        Ok(unsafe { base.add(self.0.effective_offset + offset) } as *mut u32)
    }
}

impl RegisterIo for Mapping {
    fn read_reg(&self, offset: u32) -> Result<u32> {
        let ptr = self.reg_ptr(offset)?;
        Ok(unsafe { std::ptr::read_volatile(ptr) })
    }

    fn write_reg(&self, offset: u32, value: u32) -> Result<()> {
        let ptr = self.reg_ptr(offset)?;
        unsafe { std::ptr::write_volatile(ptr, value) };
        Ok(())
    }
}

impl Drop for MapInner {
    fn drop(&mut self) {
        // TODO: control failure
        unsafe {
            libc::munmap(self.base, self.map_size);
        }
    }
}

/// RAM-backed register bank.
///
/// Implements the transport boundary over ordinary memory. Used by the unit
/// tests and available as a simulation backend. Writes can be made to fail
/// after a countdown to exercise transport-failure paths.
#[derive(Debug)]
pub struct RegisterFile {
    regs: Vec<AtomicU32>,
    fail_writes_after: AtomicI64,
}

impl RegisterFile {
    /// Creates a register bank of `words` 32-bit registers.
    pub fn new(words: usize) -> RegisterFile {
        RegisterFile {
            regs: (0..words).map(|_| AtomicU32::new(0)).collect(),
            fail_writes_after: AtomicI64::new(-1),
        }
    }

    /// Makes the `count + 1`-th subsequent write fail with an I/O error.
    pub fn fail_writes_after(&self, count: u64) {
        self.fail_writes_after
            .store(i64::try_from(count).unwrap(), Ordering::Relaxed);
    }

    /// Cancels a pending write failure.
    pub fn clear_write_failure(&self) {
        self.fail_writes_after.store(-1, Ordering::Relaxed);
    }

    fn index(&self, offset: u32) -> Result<usize> {
        let offset = offset as usize;
        if offset % 4 != 0 || offset / 4 >= self.regs.len() {
            return Err(invalid_input(format!("register offset {offset:#x} invalid")).into());
        }
        Ok(offset / 4)
    }
}

impl Default for RegisterFile {
    /// A register bank covering the full PRACH register map.
    fn default() -> RegisterFile {
        RegisterFile::new(0x1000 / 4)
    }
}

impl RegisterIo for RegisterFile {
    fn read_reg(&self, offset: u32) -> Result<u32> {
        let index = self.index(offset)?;
        Ok(self.regs[index].load(Ordering::Relaxed))
    }

    fn write_reg(&self, offset: u32, value: u32) -> Result<()> {
        let index = self.index(offset)?;
        let armed = self.fail_writes_after.load(Ordering::Relaxed);
        if armed >= 0 {
            if armed == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure").into());
            }
            self.fail_writes_after.store(armed - 1, Ordering::Relaxed);
        }
        self.regs[index].store(value, Ordering::Relaxed);
        Ok(())
    }
}

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn not_found(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, msg)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_file_round_trip() {
        let rf = RegisterFile::default();
        rf.write_reg(0x40, 0xdead_beef).unwrap();
        assert_eq!(rf.read_reg(0x40).unwrap(), 0xdead_beef);
        assert_eq!(rf.read_reg(0x44).unwrap(), 0);
    }

    #[test]
    fn register_file_rejects_bad_offsets() {
        let rf = RegisterFile::new(4);
        assert!(rf.read_reg(0x2).is_err());
        assert!(rf.read_reg(0x10).is_err());
        assert!(rf.write_reg(0x10, 0).is_err());
    }

    #[test]
    fn mapping_rejects_region_smaller_than_offset() {
        // a malformed sysfs entry can declare an offset past the map size;
        // the bounds check must reject every access instead of wrapping
        let mapping = Mapping(Arc::new(MapInner {
            base: std::ptr::null_mut(),
            effective_offset: 0x1000,
            map_size: 0x100,
        }));
        assert!(mapping.reg_ptr(0).is_err());
        assert!(mapping.reg_ptr(0x200).is_err());
    }

    #[test]
    fn write_failure_injection() {
        let rf = RegisterFile::default();
        rf.fail_writes_after(2);
        assert!(rf.write_reg(0, 1).is_ok());
        assert!(rf.write_reg(4, 2).is_ok());
        assert!(rf.write_reg(8, 3).is_err());
        rf.clear_write_failure();
        assert!(rf.write_reg(8, 3).is_ok());
    }
}
