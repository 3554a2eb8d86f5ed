use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_sql-agent");
const READY_MARKER: &str = "sql-agent listening on ";

pub struct ServerGuard {
    child: Child,
    _data_dir: tempfile::TempDir,
    stderr_thread: Option<thread::JoinHandle<()>>,
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Runs the binary to completion with `args`.
pub fn run_cli(args: &[&str]) -> anyhow::Result<Output> {
    Ok(Command::new(BIN).args(args).stdin(Stdio::null()).output()?)
}

/// A database with a seeded `transactions` table.
pub fn seeded_db(dir: &Path, rows: usize) -> anyhow::Result<PathBuf> {
    let db = dir.join("app.db");
    let db_arg = db.to_str().ok_or_else(|| anyhow::anyhow!("non-utf8 temp path"))?;
    let out = run_cli(&["seed", "--db", db_arg, "--rows", &rows.to_string()])?;
    anyhow::ensure!(
        out.status.success(),
        "seed failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(db)
}

/// Starts `serve` on an ephemeral port. The generator is `echo <sql>`, so
/// every prompt produces `sql` as the candidate statement.
pub fn spawn_server(sql: &str) -> anyhow::Result<(ServerGuard, SocketAddr)> {
    let data_dir = tempfile::tempdir()?;
    let db = seeded_db(data_dir.path(), 200)?;

    let mut child = Command::new(BIN)
        .args(["serve", "--listen", "127.0.0.1:0", "--generator", "echo"])
        .arg("--db")
        .arg(&db)
        .arg("--generator-arg")
        .arg(sql)
        .env("RUST_LOG", "info")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("failed to capture server stderr"))?;

    let (addr_tx, addr_rx) = mpsc::channel::<SocketAddr>();
    let stderr_thread = thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        while reader
            .read_line(&mut line)
            .ok()
            .filter(|n| *n > 0)
            .is_some()
        {
            if let Some(idx) = line.find(READY_MARKER) {
                let rest = &line[idx + READY_MARKER.len()..];
                if let Some(addr) = rest
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse::<SocketAddr>().ok())
                {
                    let _ = addr_tx.send(addr);
                }
            }
            eprint!("{}", line);
            line.clear();
        }
    });

    let addr = match addr_rx.recv_timeout(Duration::from_secs(10)) {
        Ok(addr) => addr,
        Err(err) => {
            if let Some(status) = child.try_wait()? {
                anyhow::bail!("server exited before reporting listen address: {status} ({err})");
            }
            anyhow::bail!("timed out waiting for server listen address: {err}");
        }
    };

    Ok((
        ServerGuard {
            child,
            _data_dir: data_dir,
            stderr_thread: Some(stderr_thread),
        },
        addr,
    ))
}

pub fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?)
}
