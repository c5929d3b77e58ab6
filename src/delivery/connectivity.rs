//! Network availability checks
//!
//! A path counts as usable when at least one interface of a cellular,
//! local-area (wireless) or wired transport is up. Anything that goes
//! wrong while probing reports "unavailable".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

pub trait ConnectivityGate: Send + Sync {
    fn is_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Cellular,
    LocalArea,
    Wired,
}

/// ARPHRD_LOOPBACK
const IF_TYPE_LOOPBACK: u32 = 772;
/// ARPHRD_ETHER
const IF_TYPE_ETHER: u32 = 1;

const CELLULAR_PREFIXES: &[&str] = &["wwan", "wwp", "rmnet", "ppp"];

/// Probes `/sys/class/net` for active interfaces
pub struct SysfsGate {
    root: PathBuf,
}

impl SysfsGate {
    pub fn new() -> Self {
        Self::with_root("/sys/class/net")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Interfaces that are up, with their transport class
    pub fn active_transports(&self) -> io::Result<Vec<(String, Transport)>> {
        let mut active = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let dir = entry.path();

            let Some(transport) = classify(&dir, &name) else {
                continue;
            };
            if is_up(&dir, transport) {
                active.push((name, transport));
            }
        }
        Ok(active)
    }
}

impl Default for SysfsGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityGate for SysfsGate {
    fn is_available(&self) -> bool {
        match self.active_transports() {
            Ok(active) => {
                debug!("Active transports: {:?}", active);
                !active.is_empty()
            }
            Err(e) => {
                debug!("Connectivity probe failed ({}), treating as offline", e);
                false
            }
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn classify(dir: &Path, name: &str) -> Option<Transport> {
    let if_type: u32 = read_trimmed(&dir.join("type"))?.parse().ok()?;
    if if_type == IF_TYPE_LOOPBACK {
        return None;
    }
    if CELLULAR_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return Some(Transport::Cellular);
    }
    if dir.join("wireless").exists() || dir.join("phy80211").exists() {
        return Some(Transport::LocalArea);
    }
    // bridges, veths and tunnels have no backing device
    if if_type == IF_TYPE_ETHER && dir.join("device").exists() {
        return Some(Transport::Wired);
    }
    None
}

fn is_up(dir: &Path, transport: Transport) -> bool {
    match read_trimmed(&dir.join("operstate")).as_deref() {
        Some("up") => true,
        // modem drivers commonly report "unknown" while connected
        Some("unknown") => transport == Transport::Cellular,
        _ => false,
    }
}

/// Gate with an externally set answer
#[derive(Debug)]
pub struct ManualGate {
    online: AtomicBool,
}

impl ManualGate {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    #[cfg(test)]
    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityGate for ManualGate {
    fn is_available(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add_iface(root: &Path, name: &str, if_type: u32, operstate: &str, extras: &[&str]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("type"), format!("{}\n", if_type)).unwrap();
        fs::write(dir.join("operstate"), format!("{}\n", operstate)).unwrap();
        for extra in extras {
            fs::create_dir_all(dir.join(extra)).unwrap();
        }
    }

    #[test]
    fn test_loopback_only_is_offline() {
        let root = TempDir::new().unwrap();
        add_iface(root.path(), "lo", 772, "unknown", &[]);
        assert!(!SysfsGate::with_root(root.path()).is_available());
    }

    #[test]
    fn test_wired_up_is_online() {
        let root = TempDir::new().unwrap();
        add_iface(root.path(), "lo", 772, "unknown", &[]);
        add_iface(root.path(), "eth0", 1, "up", &["device"]);

        let gate = SysfsGate::with_root(root.path());
        assert!(gate.is_available());
        assert_eq!(
            gate.active_transports().unwrap(),
            vec![("eth0".to_string(), Transport::Wired)]
        );
    }

    #[test]
    fn test_wireless_down_is_offline() {
        let root = TempDir::new().unwrap();
        add_iface(root.path(), "wlan0", 1, "down", &["device", "wireless"]);
        assert!(!SysfsGate::with_root(root.path()).is_available());
    }

    #[test]
    fn test_wireless_up_is_local_area() {
        let root = TempDir::new().unwrap();
        add_iface(root.path(), "wlp2s0", 1, "up", &["device", "phy80211"]);
        let active = SysfsGate::with_root(root.path()).active_transports().unwrap();
        assert_eq!(active[0].1, Transport::LocalArea);
    }

    #[test]
    fn test_virtual_bridge_ignored() {
        let root = TempDir::new().unwrap();
        add_iface(root.path(), "docker0", 1, "up", &[]);
        assert!(!SysfsGate::with_root(root.path()).is_available());
    }

    #[test]
    fn test_modem_unknown_state_counts() {
        let root = TempDir::new().unwrap();
        add_iface(root.path(), "wwan0", 519, "unknown", &[]);
        assert!(SysfsGate::with_root(root.path()).is_available());
    }

    #[test]
    fn test_probe_error_fails_closed() {
        let gate = SysfsGate::with_root("/nonexistent/sys/class/net");
        assert!(!gate.is_available());
    }

    #[test]
    fn test_manual_gate_flips() {
        let gate = ManualGate::new(false);
        assert!(!gate.is_available());
        gate.set(true);
        assert!(gate.is_available());
    }
}
