use std::ptr::NonNull;

/// The only OS surface the allocator touches: the anonymous-mapping syscall
/// pair, plus the platform's last-error indicator. Each supported platform
/// implements this trait for [`Os`] in its own module below.
trait PlatformMemory {
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    unsafe fn return_memory(addr: *mut u8, len: usize);

    fn signal_no_memory();
}

pub(crate) struct Os;

/// Maps `len` bytes of anonymous, private, read-write memory.
///
/// The returned address is page aligned. Returns `None` only when the OS
/// refuses the mapping.
#[inline]
pub(crate) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
    unsafe { Os::request_memory(len) }
}

/// Gives a mapping obtained from [`request_memory`] back to the OS.
///
/// **SAFETY**: `addr` and `len` must describe exactly one live mapping.
#[inline]
pub(crate) unsafe fn return_memory(addr: *mut u8, len: usize) {
    unsafe { Os::return_memory(addr, len) }
}

/// Sets the platform's last-error indicator to its out-of-memory code
/// (`errno = ENOMEM` on Unix, `ERROR_NOT_ENOUGH_MEMORY` on Windows).
/// Only the public entry points call this.
#[inline]
pub(crate) fn signal_no_memory() {
    Os::signal_no_memory()
}

#[cfg(unix)]
mod unix {
    use super::{Os, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::os::raw::{c_int, c_void};
    use std::ptr::NonNull;

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    use libc::__error as errno_location;
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    use libc::__errno_location as errno_location;

    impl PlatformMemory for Os {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    None
                } else {
                    Some(NonNull::new_unchecked(addr).cast::<u8>())
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        fn signal_no_memory() {
            unsafe { *errno_location() = libc::ENOMEM };
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Os, PlatformMemory};

    use std::os::raw::c_void;
    use std::ptr::NonNull;

    use windows::Win32::Foundation::{ERROR_NOT_ENOUGH_MEMORY, SetLastError};
    use windows::Win32::System::Memory;

    impl PlatformMemory for Os {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        fn signal_no_memory() {
            unsafe { SetLastError(ERROR_NOT_ENOUGH_MEMORY) };
        }
    }
}
