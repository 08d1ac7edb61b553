//! Process attachment and the OS-level read/write primitives.

use tracing::{debug, info};

use super::MemoryAccess;
use crate::error::{Error, Result};

/// Handle to an attached remote process.
///
/// Closed on drop. Once the remote exits, reads through this handle come
/// back short (and therefore zeroed) rather than failing.
#[derive(Debug)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Base address of the module sharing the process's executable name
    pub base_address: u64,
    pub name: String,
    raw: sys::RawHandle,
}

impl ProcessHandle {
    /// Attach to the first process whose executable name matches exactly.
    pub fn attach(process_name: &str) -> Result<Self> {
        let pid = sys::find_process_id(process_name)?
            .ok_or_else(|| Error::ProcessNotFound(process_name.to_string()))?;
        debug!("Found {} (pid {})", process_name, pid);

        let raw = sys::open(pid)?;
        let base_address = sys::find_module_base(pid, process_name)?
            .ok_or_else(|| Error::ModuleNotFound(process_name.to_string()))?;

        info!(
            "Attached to {} (pid {}, base {:#x})",
            process_name, pid, base_address
        );

        Ok(Self {
            pid,
            base_address,
            name: process_name.to_string(),
            raw,
        })
    }

    /// Close the handle explicitly
    pub fn detach(self) {
        debug!("Detaching from {} (pid {})", self.name, self.pid);
    }
}

impl MemoryAccess for ProcessHandle {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> usize {
        sys::read(&self.raw, address, buf)
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> usize {
        sys::write(&self.raw, address, data)
    }
}

#[cfg(target_os = "windows")]
mod sys {
    use std::ffi::c_void;

    use windows::Win32::Foundation::{BOOL, CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW,
        PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPMODULE,
        TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_ALL_ACCESS};

    use crate::error::{Error, Result};

    #[derive(Debug)]
    pub struct RawHandle(HANDLE);

    impl Drop for RawHandle {
        fn drop(&mut self) {
            // SAFETY: the handle was returned by OpenProcess or
            // CreateToolhelp32Snapshot and is closed exactly once here.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    fn wide_to_string(buf: &[u16]) -> String {
        let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        String::from_utf16_lossy(&buf[..len])
    }

    pub fn find_process_id(name: &str) -> Result<Option<u32>> {
        // SAFETY: snapshot creation has no preconditions; the handle is
        // owned by RawHandle.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map(RawHandle)
            .map_err(|e| Error::ProcessOpenFailed(format!("process snapshot: {e}")))?;

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry.dwSize is initialized as the API requires.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if wide_to_string(&entry.szExeFile) == name {
                return Ok(Some(entry.th32ProcessID));
            }
            // SAFETY: same snapshot and entry as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
        }

        Ok(None)
    }

    pub fn open(pid: u32) -> Result<RawHandle> {
        // SAFETY: OpenProcess validates the pid; failure is reported as Err.
        unsafe { OpenProcess(PROCESS_ALL_ACCESS, BOOL::from(false), pid) }
            .map(RawHandle)
            .map_err(|e| Error::ProcessOpenFailed(format!("pid {pid}: {e}")))
    }

    pub fn find_module_base(pid: u32, name: &str) -> Result<Option<u64>> {
        // SAFETY: see find_process_id.
        let snapshot =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
                .map(RawHandle)
                .map_err(|e| Error::ProcessOpenFailed(format!("module snapshot: {e}")))?;

        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry.dwSize is initialized as the API requires.
        let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if wide_to_string(&entry.szModule) == name {
                return Ok(Some(entry.modBaseAddr as u64));
            }
            // SAFETY: same snapshot and entry as above.
            more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
        }

        Ok(None)
    }

    pub fn read(raw: &RawHandle, address: u64, buf: &mut [u8]) -> usize {
        let mut bytes_read = 0usize;
        // SAFETY: buf is a valid writable buffer of buf.len() bytes; the
        // remote address is only interpreted by the kernel.
        let _ = unsafe {
            ReadProcessMemory(
                raw.0,
                address as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut bytes_read),
            )
        };
        bytes_read
    }

    pub fn write(raw: &RawHandle, address: u64, data: &[u8]) -> usize {
        let mut bytes_written = 0usize;
        // SAFETY: data is a valid readable buffer of data.len() bytes.
        let _ = unsafe {
            WriteProcessMemory(
                raw.0,
                address as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                Some(&mut bytes_written),
            )
        };
        bytes_written
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::fs::{self, File, OpenOptions};
    use std::os::unix::fs::FileExt;
    use std::path::Path;

    use crate::error::{Error, Result};

    #[derive(Debug)]
    pub struct RawHandle(File);

    fn process_name(pid: u32) -> Option<String> {
        fs::read_link(format!("/proc/{pid}/exe"))
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .or_else(|| {
                fs::read_to_string(format!("/proc/{pid}/comm"))
                    .ok()
                    .map(|comm| comm.trim_end().to_string())
            })
    }

    pub fn find_process_id(name: &str) -> Result<Option<u32>> {
        for entry in fs::read_dir("/proc")? {
            let entry = entry?;
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            if process_name(pid).as_deref() == Some(name) {
                return Ok(Some(pid));
            }
        }
        Ok(None)
    }

    pub fn open(pid: u32) -> Result<RawHandle> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/proc/{pid}/mem"))
            .map(RawHandle)
            .map_err(|e| Error::ProcessOpenFailed(format!("pid {pid}: {e}")))
    }

    pub fn find_module_base(pid: u32, name: &str) -> Result<Option<u64>> {
        let maps = fs::read_to_string(format!("/proc/{pid}/maps"))
            .map_err(|e| Error::ProcessOpenFailed(format!("pid {pid} maps: {e}")))?;
        Ok(parse_module_base(&maps, name))
    }

    /// First mapping whose backing file name equals `name`
    pub(super) fn parse_module_base(maps: &str, name: &str) -> Option<u64> {
        // "start-end perms offset dev inode path"
        maps.lines().find_map(|line| {
            let mut fields = line.split_whitespace();
            let range = fields.next()?;
            let path = fields.nth(4)?;
            if Path::new(path).file_name()?.to_str()? != name {
                return None;
            }
            let (start, _) = range.split_once('-')?;
            u64::from_str_radix(start, 16).ok()
        })
    }

    pub fn read(raw: &RawHandle, address: u64, buf: &mut [u8]) -> usize {
        let mut copied = 0usize;
        while copied < buf.len() {
            match raw.0.read_at(&mut buf[copied..], address + copied as u64) {
                Ok(0) | Err(_) => break,
                Ok(n) => copied += n,
            }
        }
        copied
    }

    pub fn write(raw: &RawHandle, address: u64, data: &[u8]) -> usize {
        let mut written = 0usize;
        while written < data.len() {
            match raw.0.write_at(&data[written..], address + written as u64) {
                Ok(0) | Err(_) => break,
                Ok(n) => written += n,
            }
        }
        written
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod sys {
    use crate::error::Result;

    #[derive(Debug)]
    pub struct RawHandle;

    pub fn find_process_id(_name: &str) -> Result<Option<u32>> {
        Ok(None)
    }

    pub fn open(_pid: u32) -> Result<RawHandle> {
        Ok(RawHandle)
    }

    pub fn find_module_base(_pid: u32, _name: &str) -> Result<Option<u64>> {
        Ok(None)
    }

    pub fn read(_raw: &RawHandle, _address: u64, _buf: &mut [u8]) -> usize {
        0
    }

    pub fn write(_raw: &RawHandle, _address: u64, _data: &[u8]) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_unknown_process() {
        let err = ProcessHandle::attach("definitely-not-running-4aeb17bd.exe").unwrap_err();
        assert!(matches!(err, Error::ProcessNotFound(_)));
        assert!(err.is_attach_failure());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_module_base() {
        let maps = "\
55d0c0a00000-55d0c0a21000 r--p 00000000 08:01 1311 /usr/bin/other
7f0000400000-7f0000500000 r-xp 00000000 08:01 4242 /opt/game/Client.exe
7f0000500000-7f0000600000 rw-p 00100000 08:01 4242 /opt/game/Client.exe
7ffd00000000-7ffd00021000 rw-p 00000000 00:00 0 [stack]
";
        assert_eq!(sys::parse_module_base(maps, "Client.exe"), Some(0x7f00_0040_0000));
        assert_eq!(sys::parse_module_base(maps, "client.exe"), None);
        assert_eq!(sys::parse_module_base(maps, "missing.exe"), None);
    }
}
