//! JIT region lifecycle
//!
//! The loaded image lives in an anonymous mapping that is writable first and
//! executable afterwards, never both. The two states are separate types so a
//! writable view cannot leak past the seal.
//!
//! Sealing performs the full maintenance sequence the architecture requires
//! before newly written bytes may be fetched as instructions: clean the data
//! cache to the point of unification, invalidate the instruction cache over
//! the same range with data barriers on both sides, then an instruction
//! barrier before any branch into the region.

use crate::error::{LoaderError, Result};
use std::io;
use std::ptr;
use tracing::debug;

/// Default region size. Must hold the whole seed image.
pub const REGION_SIZE: usize = 64 * 1024;

/// A freshly mapped, writable region.
pub struct JitRegion {
    ptr: *mut u8,
    len: usize,
}

/// A sealed, executable region. No writable alias exists.
pub struct SealedRegion {
    ptr: *mut u8,
    len: usize,
    used: usize,
}

impl JitRegion {
    /// Map `len` bytes of anonymous memory, writable.
    pub fn map(len: usize) -> Result<Self> {
        // MAP_JIT mappings flip between W and X through the thread-local
        // write-protect switch; the protection itself stays maximal.
        #[cfg(target_os = "macos")]
        let (prot, flags) = (
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_JIT,
        );
        #[cfg(not(target_os = "macos"))]
        let (prot, flags) = (
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
        );

        let ptr = unsafe { libc::mmap(ptr::null_mut(), len, prot, flags, -1, 0) };
        if ptr == libc::MAP_FAILED {
            return Err(LoaderError::Mmap {
                size: len,
                source: io::Error::last_os_error(),
            });
        }
        debug!(len, "mapped jit region");
        Ok(Self {
            ptr: ptr as *mut u8,
            len,
        })
    }

    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Copy `image` into the region and transition it W→X.
    ///
    /// Consumes the writable view; the returned region can only be read and
    /// executed. The transition is irrevocable.
    pub fn write_then_seal(self, image: &[u8]) -> Result<SealedRegion> {
        if image.len() > self.len {
            return Err(LoaderError::RegionOverflow {
                capacity: self.len,
            });
        }

        #[cfg(target_os = "macos")]
        unsafe {
            libc::pthread_jit_write_protect_np(0);
        }

        unsafe {
            ptr::copy_nonoverlapping(image.as_ptr(), self.ptr, image.len());
        }

        #[cfg(target_os = "macos")]
        unsafe {
            libc::pthread_jit_write_protect_np(1);
            libc::sys_icache_invalidate(self.ptr as *mut libc::c_void, image.len());
        }

        #[cfg(not(target_os = "macos"))]
        {
            let rc = unsafe {
                libc::mprotect(
                    self.ptr as *mut libc::c_void,
                    self.len,
                    libc::PROT_READ | libc::PROT_EXEC,
                )
            };
            if rc != 0 {
                return Err(LoaderError::Protect(io::Error::last_os_error()));
            }
            #[cfg(target_arch = "aarch64")]
            unsafe {
                sync_icache(self.ptr, image.len());
            }
        }

        debug!(used = image.len(), "sealed jit region");
        let sealed = SealedRegion {
            ptr: self.ptr,
            len: self.len,
            used: image.len(),
        };
        std::mem::forget(self);
        Ok(sealed)
    }
}

impl SealedRegion {
    /// Entry point: the first byte of the image.
    pub fn entry(&self) -> *const u8 {
        self.ptr
    }

    /// Number of image bytes written before the seal.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Read back the sealed image.
    pub fn image(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.used) }
    }

    /// Branch to the start of the region. The region base is passed in the
    /// first argument register so the image can locate its own data.
    ///
    /// # Safety
    ///
    /// The image bytes are executed as machine code for the host
    /// architecture. The caller vouches for their provenance.
    pub unsafe fn enter(&self) -> ! {
        let f: extern "C" fn(*const u8) -> ! = std::mem::transmute(self.ptr);
        f(self.ptr)
    }
}

impl Drop for JitRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

impl Drop for SealedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

/// Clean D-cache to PoU and invalidate I-cache over `[start, start+len)`.
/// 64-byte stride is a lower bound for current cores; CTR_EL0 could refine
/// it but never below this.
#[cfg(all(target_arch = "aarch64", not(target_os = "macos")))]
unsafe fn sync_icache(start: *const u8, len: usize) {
    use std::arch::asm;

    const LINE: usize = 64;
    let begin = (start as usize) & !(LINE - 1);
    let end = start as usize + len;

    let mut addr = begin;
    while addr < end {
        asm!("dc cvau, {0}", in(reg) addr, options(nostack));
        addr += LINE;
    }
    asm!("dsb ish", options(nostack));

    let mut addr = begin;
    while addr < end {
        asm!("ic ivau, {0}", in(reg) addr, options(nostack));
        addr += LINE;
    }
    asm!("dsb ish", "isb", options(nostack));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_seal() {
        let region = JitRegion::map(REGION_SIZE).unwrap();
        assert_eq!(region.capacity(), REGION_SIZE);
        let image = [0xde, 0xad, 0xbe, 0xef];
        let sealed = region.write_then_seal(&image).unwrap();
        assert_eq!(sealed.used(), 4);
        assert_eq!(sealed.image(), &image);
    }

    #[test]
    fn test_seal_rejects_oversized_image() {
        let region = JitRegion::map(4096).unwrap();
        let image = vec![0u8; 8192];
        assert!(matches!(
            region.write_then_seal(&image),
            Err(LoaderError::RegionOverflow { .. })
        ));
    }

    // Executes a two-instruction function from the sealed region:
    //   mov w0, #42 ; ret
    // Only meaningful on the architecture the image targets.
    #[cfg(all(target_arch = "aarch64", not(target_os = "macos")))]
    #[test]
    fn test_sealed_region_executes() {
        let image: [u8; 8] = [
            0x40, 0x05, 0x80, 0x52, // mov w0, #42
            0xc0, 0x03, 0x5f, 0xd6, // ret
        ];
        let region = JitRegion::map(4096).unwrap();
        let sealed = region.write_then_seal(&image).unwrap();
        let f: extern "C" fn() -> i32 = unsafe { std::mem::transmute(sealed.entry()) };
        assert_eq!(f(), 42);
    }
}
