//! Census integration test harness.
//!
//! Spawns real `censusd` processes on loopback and talks to them through
//! their status endpoints and `census-ctl`. Build the binaries first:
//!
//!   cargo build --workspace
//!   cargo test --test integration
//!
//! Tests skip when the binaries are missing. Each test owns the daemons it
//! spawns; `Daemon` kills its process on drop.

use std::net::{TcpListener, UdpSocket};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

mod discovery;
mod status;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Daemons share loopback; run one scenario at a time.
pub static DAEMON_LOCK: Mutex<()> = Mutex::new(());

fn target_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/debug")
}

pub fn censusd_bin() -> PathBuf {
    target_dir().join("censusd")
}

pub fn ctl_bin() -> PathBuf {
    target_dir().join("census-ctl")
}

/// False (with a SKIP note) when the workspace binaries are not built.
pub fn skip_unless_ready() -> bool {
    for bin in [censusd_bin(), ctl_bin()] {
        if !bin.exists() {
            eprintln!("SKIP: {} not built; run cargo build --workspace first", bin.display());
            return false;
        }
    }
    true
}

pub fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .and_then(|s| s.local_addr())
        .map(|a| a.port())
        .expect("no free UDP port")
}

pub fn free_tcp_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|s| s.local_addr())
        .map(|a| a.port())
        .expect("no free TCP port")
}

/// A running `censusd`. Killed on drop.
pub struct Daemon {
    child: Child,
    pub api_port: u16,
    _dir: TempDir,
}

impl Daemon {
    /// Start a daemon listening on `port` that beacons straight at `peer_port`.
    pub fn spawn(group: &str, port: u16, peer_port: u16, extra_env: &[(&str, &str)]) -> Result<Self> {
        let dir = TempDir::new()?;
        let api_port = free_tcp_port();

        let mut cmd = Command::new(censusd_bin());
        cmd.env("CENSUS_CONFIG", dir.0.join("census.toml"))
            .env("CENSUS_SWARM__GROUP", group)
            .env("CENSUS_NETWORK__LISTEN_ADDR", "127.0.0.1")
            .env("CENSUS_NETWORK__PORT", port.to_string())
            .env("CENSUS_NETWORK__TARGET", format!("127.0.0.1:{peer_port}"))
            .env("CENSUS_NETWORK__API_PORT", api_port.to_string())
            .env("RUST_LOG", "censusd=debug")
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        for (k, v) in extra_env {
            cmd.env(k, v);
        }

        let child = cmd.spawn().context("failed to spawn censusd")?;
        let daemon = Self {
            child,
            api_port,
            _dir: dir,
        };
        daemon.wait_for_api(Duration::from_secs(10))?;
        Ok(daemon)
    }

    fn wait_for_api(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.get("/status").is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }
        bail!("status endpoint on port {} never came up", self.api_port)
    }

    pub fn get(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("http://127.0.0.1:{}{}", self.api_port, path);
        reqwest::blocking::get(&url)
            .with_context(|| format!("GET {url}"))?
            .json()
            .context("invalid JSON")
    }

    pub fn peers(&self) -> Result<u64> {
        self.get("/status")?["peers"]
            .as_u64()
            .context("status missing peers")
    }

    /// Poll `/status` until the peer count equals `want`.
    pub fn wait_for_peers(&self, want: u64, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut last = None;
        while Instant::now() < deadline {
            let n = self.peers()?;
            if n == want {
                return Ok(());
            }
            last = Some(n);
            thread::sleep(Duration::from_millis(200));
        }
        bail!("expected {want} peers, last saw {last:?}")
    }

    pub fn ctl(&self, args: &[&str]) -> Result<String> {
        let port = self.api_port.to_string();
        let output = Command::new(ctl_bin())
            .args(["--port", &port])
            .args(args)
            .output()
            .context("failed to run census-ctl")?;
        if !output.status.success() {
            bail!(
                "census-ctl {args:?} failed\nstderr: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub fn kill(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Per-daemon scratch directory for the config file.
pub struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Result<Self> {
        static NEXT: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
        let n = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("census-it-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&path).with_context(|| format!("mkdir {}", path.display()))?;
        Ok(Self(path))
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}
