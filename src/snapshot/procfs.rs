//! Process records from the Linux `/proc` filesystem.
//!
//! Entries are parsed in parallel with rayon. A pid that vanishes or denies
//! access while being read is skipped silently. CPU percent is computed from
//! the delta of `utime + stime` between two reads of the same pid, so the
//! first read of any pid reports 0.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, TimeZone, Utc};
use nix::unistd::{Uid, User};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, trace};

use super::ProviderError;
use crate::model::{ProcessRecord, ProcessStatus};

/// Kernel thread flag in the `flags` field of `/proc/<pid>/stat`.
const PF_KTHREAD: u64 = 0x0020_0000;

fn sysconf_or(name: libc::c_int, fallback: f64) -> f64 {
    // SAFETY: sysconf has no preconditions; -1 and 0 are handled below
    let v = unsafe { libc::sysconf(name) };
    if v > 0 {
        v as f64
    } else {
        fallback
    }
}

/// System clock ticks per second.
static CLK_TCK: Lazy<f64> = Lazy::new(|| sysconf_or(libc::_SC_CLK_TCK, 100.0));

/// Page size in bytes, for converting the rss page count.
static PAGE_SIZE: Lazy<f64> = Lazy::new(|| sysconf_or(libc::_SC_PAGESIZE, 4096.0));

/// Fields of `/proc/<pid>/stat` the reader uses.
#[derive(Debug, Clone, PartialEq)]
pub struct StatFields {
    pub comm: String,
    pub state: char,
    pub flags: u64,
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
    pub rss_pages: u64,
}

impl StatFields {
    pub fn is_kernel_thread(&self) -> bool {
        self.flags & PF_KTHREAD != 0
    }
}

/// Parses one `/proc/<pid>/stat` line.
///
/// The command name may contain spaces and parentheses, so fields are read
/// after the last `)`.
pub fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close <= open {
        return None;
    }
    let comm = content[open + 1..close].to_string();
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if rest.len() < 22 {
        return None;
    }

    Some(StatFields {
        comm,
        state: rest[0].chars().next()?,
        flags: rest[6].parse().ok()?,
        utime: rest[11].parse().ok()?,
        stime: rest[12].parse().ok()?,
        starttime: rest[19].parse().ok()?,
        rss_pages: rest[21].parse().ok()?,
    })
}

/// Reads `btime` (boot time, seconds since epoch) from `/proc/stat` content.
pub fn parse_btime(content: &str) -> Option<i64> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("btime"))
        .and_then(|v| v.trim().parse().ok())
}

/// Real uid from `/proc/<pid>/status` content.
pub fn parse_status_uid(content: &str) -> Option<u32> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("Uid:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// Splits a NUL-separated `/proc/<pid>/cmdline`.
pub fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

struct CpuEntry {
    cpu_ticks: u64,
    last_updated: Instant,
}

/// Reads processes from a procfs mount.
pub struct ProcfsReader {
    root: PathBuf,
    include_kernel_threads: bool,
    cpu_cache: RwLock<HashMap<u32, CpuEntry>>,
    user_cache: RwLock<HashMap<u32, Option<String>>>,
}

impl Default for ProcfsReader {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_kernel_threads: false,
            cpu_cache: RwLock::new(HashMap::new()),
            user_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_kernel_threads(mut self, include: bool) -> Self {
        self.include_kernel_threads = include;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn boot_time(&self) -> Result<i64, ProviderError> {
        let path = self.root.join("stat");
        let content = fs::read_to_string(&path)
            .map_err(|source| ProviderError::Io { path, source })?;
        parse_btime(&content).ok_or_else(|| ProviderError::Parse {
            what: "btime".into(),
            message: "no btime line in stat".into(),
        })
    }

    /// Verifies the mount is readable and primes the CPU delta cache.
    pub fn probe(&self) -> Result<(), ProviderError> {
        self.boot_time()?;
        let primed = self.list_processes()?;
        debug!("Primed CPU cache with {} processes", primed.len());
        Ok(())
    }

    /// Scans the procfs root for numeric pid directories.
    fn collect_pids(&self) -> Result<Vec<u32>, ProviderError> {
        let entries = fs::read_dir(&self.root).map_err(|source| ProviderError::Io {
            path: self.root.clone(),
            source,
        })?;
        Ok(entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect())
    }

    pub fn list_processes(&self) -> Result<Vec<ProcessRecord>, ProviderError> {
        let btime = self.boot_time()?;
        let mut pids = self.collect_pids()?;
        pids.sort_unstable();

        let records: Vec<ProcessRecord> = pids
            .par_iter()
            .filter_map(|&pid| self.read_process(pid, btime))
            .collect();

        debug!(
            "Read {} processes from {} ({} pid dirs)",
            records.len(),
            self.root.display(),
            pids.len()
        );
        Ok(records)
    }

    pub fn get_process(&self, pid: u32) -> Result<Option<ProcessRecord>, ProviderError> {
        let btime = self.boot_time()?;
        Ok(self.read_process(pid, btime))
    }

    /// Reads one pid directory. `None` when the process vanished, denied
    /// access, or is a kernel thread.
    fn read_process(&self, pid: u32, btime: i64) -> Option<ProcessRecord> {
        let dir = self.root.join(pid.to_string());
        let stat = match fs::read_to_string(dir.join("stat")) {
            Ok(s) => s,
            Err(e) => {
                trace!("Skipping pid {}: {}", pid, e);
                return None;
            }
        };
        let fields = match parse_stat(&stat) {
            Some(f) => f,
            None => {
                debug!("Skipping pid {}: malformed stat", pid);
                return None;
            }
        };
        if fields.is_kernel_thread() && !self.include_kernel_threads {
            return None;
        }

        let name = fs::read_to_string(dir.join("comm"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fields.comm.clone());

        let start_secs = fields.starttime as f64 / *CLK_TCK;
        let create_time = start_time(btime, start_secs);

        let username = fs::read_to_string(dir.join("status"))
            .ok()
            .and_then(|s| parse_status_uid(&s))
            .and_then(|uid| self.resolve_user(uid));

        let cmdline = fs::read(dir.join("cmdline"))
            .map(|raw| parse_cmdline(&raw))
            .unwrap_or_default();

        Some(ProcessRecord {
            pid,
            name,
            memory_bytes: (fields.rss_pages as f64 * *PAGE_SIZE) as u64,
            cpu_percent: self.cpu_percent(pid, fields.utime + fields.stime),
            status: ProcessStatus::from_proc_state(fields.state),
            create_time,
            username,
            cmdline,
        })
    }

    /// Percent of one core used since the previous read of this pid.
    fn cpu_percent(&self, pid: u32, cpu_ticks: u64) -> f64 {
        let now = Instant::now();
        let mut percent = 0.0;

        {
            let cache = self.cpu_cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = cache.get(&pid) {
                let dt = now.duration_since(entry.last_updated).as_secs_f64();
                if dt > 0.0 && cpu_ticks > entry.cpu_ticks {
                    let delta = (cpu_ticks - entry.cpu_ticks) as f64 / *CLK_TCK;
                    percent = delta / dt * 100.0;
                }
            }
        }

        let mut cache = self.cpu_cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            pid,
            CpuEntry {
                cpu_ticks,
                last_updated: now,
            },
        );
        percent
    }

    fn resolve_user(&self, uid: u32) -> Option<String> {
        if let Some(cached) = self
            .user_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uid)
        {
            return cached.clone();
        }

        let name = match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => Some(user.name),
            Ok(None) => Some(uid.to_string()),
            Err(e) => {
                debug!("User lookup for uid {} failed: {}", uid, e);
                None
            }
        };
        self.user_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uid, name.clone());
        name
    }
}

fn start_time(btime: i64, start_secs: f64) -> DateTime<Utc> {
    let millis = btime * 1000 + (start_secs * 1000.0) as i64;
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_LINE: &str = "4242 (my (odd) proc) S 1 4242 4242 0 -1 4194560 120 0 0 0 \
        250 50 0 0 20 0 1 0 1000 123456789 2560 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0";

    #[test]
    fn test_parse_stat_with_parens_in_name() {
        let f = parse_stat(STAT_LINE).unwrap();
        assert_eq!(f.comm, "my (odd) proc");
        assert_eq!(f.state, 'S');
        assert_eq!(f.flags, 4194560);
        assert_eq!(f.utime, 250);
        assert_eq!(f.stime, 50);
        assert_eq!(f.starttime, 1000);
        assert_eq!(f.rss_pages, 2560);
        assert!(!f.is_kernel_thread());
    }

    #[test]
    fn test_parse_stat_kernel_thread() {
        let line = "2 (kthreadd) S 0 0 0 0 -1 2129984 0 0 0 0 0 0 0 0 20 0 1 0 5 0 0 0";
        let f = parse_stat(line).unwrap();
        assert!(f.is_kernel_thread());
    }

    #[test]
    fn test_parse_stat_truncated() {
        assert!(parse_stat("12 (short) S 1 2 3").is_none());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn test_parse_btime_and_uid() {
        assert_eq!(
            parse_btime("cpu  1 2 3\nbtime 1700000000\nprocesses 5\n"),
            Some(1_700_000_000)
        );
        assert_eq!(parse_btime("cpu 1 2 3\n"), None);
        assert_eq!(
            parse_status_uid("Name:\tbash\nUid:\t1000\t1000\t1000\t1000\n"),
            Some(1000)
        );
    }

    #[test]
    fn test_parse_cmdline() {
        assert_eq!(
            parse_cmdline(b"/usr/bin/python3\0-m\0http.server\0"),
            vec!["/usr/bin/python3", "-m", "http.server"]
        );
        assert!(parse_cmdline(b"").is_empty());
    }
}
