use anyhow::{Context, Result, anyhow};
use crossbeam_channel::bounded;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crate::protocol::decode_command;
use crate::service::{ControlMsg, ServiceHandle};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// JSON-lines transport adapter: each connection is one observer, inbound
/// lines decode to commands, outbound events arrive through the observer
/// channel. The orchestration core never sees sockets.
pub fn run(socket_path: &Path, handle: ServiceHandle) -> Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind {}", socket_path.display()))?;
    log::info!("listening on {}", socket_path.display());

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let id = NEXT_OBSERVER_ID.fetch_add(1, Ordering::SeqCst);
                let handle = handle.clone();
                thread::Builder::new()
                    .name(format!("client-{id}"))
                    .spawn(move || {
                        if let Err(err) = handle_client(stream, id, handle) {
                            log::debug!("client {id} ended with error: {err:?}");
                        }
                    })
                    .map_err(|e| anyhow!("failed to spawn client thread: {e}"))?;
            }
            Err(err) => log::warn!("accept failed: {err}"),
        }
    }
    Ok(())
}

fn handle_client(stream: UnixStream, id: u64, handle: ServiceHandle) -> Result<()> {
    let (tx, rx) = bounded::<String>(64);
    handle.send(ControlMsg::Attach { id, tx });

    let mut writer = stream.try_clone()?;
    let writer_thread = thread::spawn(move || {
        // Ends when the hub drops this observer's channel.
        for message in rx {
            if writeln!(writer, "{message}").is_err() {
                break;
            }
        }
        let _ = writer.shutdown(std::net::Shutdown::Both);
    });

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(command) = decode_command(&line) {
            handle.command(id, command);
        }
    }

    handle.send(ControlMsg::Detach { id });
    let _ = writer_thread.join();
    Ok(())
}
