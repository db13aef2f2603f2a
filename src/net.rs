/*
 * Net Module
 *
 * TCP transport between one primary and any number of replicas.
 * Frames are a u32 little-endian length followed by an encoded snapshot.
 *
 * The server pushes the latest snapshot to each replica whenever the slot
 * changes. A replica that falls behind only ever gets the newest tick, so the
 * primary never waits on the network. The client decodes frames into its own
 * SnapshotSlot and reconnects on its own after a disconnect.
 *
 * Both ends own a small tokio runtime so the simulation and render loops
 * stay plain synchronous code.
 */

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::watch;

use crate::codec;
use crate::error::{FlockError, Result};
use crate::replication::{SnapshotSink, SnapshotSlot, SnapshotSource};
use crate::snapshot::SharedSnapshot;

// Largest frame a client accepts
pub const MAX_FRAME_LEN: usize = codec::ENCODED_LEN;

// Pause between reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_millis(500);

fn runtime(name: &str) -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name(name)
        .enable_all()
        .build()?)
}

pub struct SnapshotServer {
    local_addr: SocketAddr,
    // Dropping the runtime stops the listener and every connection
    _runtime: Runtime,
}

impl SnapshotServer {
    pub fn bind(addr: SocketAddr, slot: SnapshotSlot) -> Result<Self> {
        let runtime = runtime("flock-server")?;
        let listener = runtime
            .block_on(TcpListener::bind(addr))
            .map_err(|e| FlockError::Transport(format!("cannot bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;
        runtime.spawn(accept_loop(listener, slot));

        tracing::info!(%local_addr, "snapshot server listening");
        Ok(Self {
            local_addr,
            _runtime: runtime,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(listener: TcpListener, slot: SnapshotSlot) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "replica connected");
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%peer, error = %e, "could not set nodelay");
                }
                tokio::spawn(serve_replica(stream, peer, slot.subscribe()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

async fn serve_replica(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut updates: watch::Receiver<Option<Arc<SharedSnapshot>>>,
) {
    loop {
        let latest = updates.borrow_and_update().clone();
        if let Some(snapshot) = latest {
            let frame = codec::encode(&snapshot);
            if let Err(e) = write_frame(&mut stream, &frame).await {
                tracing::info!(%peer, error = %e, "replica disconnected");
                return;
            }
            tracing::trace!(%peer, tick = snapshot.tick, bytes = frame.len(), "frame sent");
        }
        // Err means the slot itself is gone
        if updates.changed().await.is_err() {
            return;
        }
    }
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> std::io::Result<()> {
    let len_bytes = (frame.len() as u32).to_le_bytes();
    stream.write_all(&len_bytes).await?;
    stream.write_all(frame).await?;
    stream.flush().await
}

pub struct SnapshotClient {
    slot: SnapshotSlot,
    _runtime: Runtime,
}

impl SnapshotClient {
    // The first connection must succeed; later drops are retried in the background
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let runtime = runtime("flock-client")?;
        let stream = runtime
            .block_on(TcpStream::connect(addr))
            .map_err(|e| FlockError::Transport(format!("cannot connect to {addr}: {e}")))?;
        let slot = SnapshotSlot::new();
        runtime.spawn(receive_loop(addr, stream, slot.clone()));

        tracing::info!(remote = %addr, "connected to primary");
        Ok(Self {
            slot,
            _runtime: runtime,
        })
    }
}

impl SnapshotSource for SnapshotClient {
    fn fetch(&self) -> Option<Arc<SharedSnapshot>> {
        self.slot.fetch()
    }
}

async fn receive_loop(addr: SocketAddr, mut stream: TcpStream, slot: SnapshotSlot) {
    loop {
        if let Err(e) = read_frames(&mut stream, &slot).await {
            tracing::warn!(remote = %addr, error = %e, "lost primary, reconnecting");
        }

        // The slot keeps the last good snapshot while we are away
        loop {
            tokio::time::sleep(RECONNECT_DELAY).await;
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    tracing::info!(remote = %addr, "reconnected to primary");
                    stream = s;
                    break;
                }
                Err(e) => tracing::debug!(remote = %addr, error = %e, "reconnect failed"),
            }
        }
    }
}

// Only returns when the connection has to be dropped
async fn read_frames(stream: &mut TcpStream, slot: &SnapshotSlot) -> Result<()> {
    let mut len_bytes = [0u8; 4];
    let mut buf = Vec::new();
    loop {
        stream.read_exact(&mut len_bytes).await?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FlockError::Codec(format!(
                "frame of {len} bytes exceeds {MAX_FRAME_LEN}"
            )));
        }

        buf.resize(len, 0);
        stream.read_exact(&mut buf).await?;
        match codec::decode(&buf) {
            Ok(snapshot) => {
                tracing::trace!(tick = snapshot.tick, "frame received");
                slot.publish(snapshot);
            }
            // Framing is still intact, so skip just this one
            Err(e) => tracing::warn!(error = %e, "dropping corrupt frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Instant;

    fn wait_for_tick(source: &impl SnapshotSource, tick: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if source.fetch().map(|s| s.tick) == Some(tick) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[test]
    fn replica_receives_latest_snapshot() {
        let slot = SnapshotSlot::new();
        slot.publish(SharedSnapshot {
            tick: 1,
            ..SharedSnapshot::default()
        });
        let server = SnapshotServer::bind(loopback(), slot.clone()).expect("bind");
        let client = SnapshotClient::connect(server.local_addr()).expect("connect");
        assert!(wait_for_tick(&client, 1));

        let mut snapshot = SharedSnapshot {
            tick: 2,
            active: 2,
            ..SharedSnapshot::default()
        };
        snapshot.neighbors[0] = 1;
        slot.publish(snapshot.clone());
        assert!(wait_for_tick(&client, 2));
        assert_eq!(client.fetch().as_deref(), Some(&snapshot));
    }

    #[test]
    fn connect_without_primary_is_fatal() {
        let addr = std::net::TcpListener::bind(loopback())
            .and_then(|l| l.local_addr())
            .expect("free port");
        // Listener dropped, nothing accepts there now
        assert!(matches!(
            SnapshotClient::connect(addr),
            Err(FlockError::Transport(_))
        ));
    }

    #[test]
    fn bind_conflict_is_fatal() {
        let taken = std::net::TcpListener::bind(loopback()).expect("bind");
        let addr = taken.local_addr().expect("addr");
        assert!(matches!(
            SnapshotServer::bind(addr, SnapshotSlot::new()),
            Err(FlockError::Transport(_))
        ));
    }

    #[test]
    fn corrupt_frame_is_skipped() {
        let listener = std::net::TcpListener::bind(loopback()).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let primary = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let garbage = vec![7u8; 64];
            stream.write_all(&(garbage.len() as u32).to_le_bytes())?;
            stream.write_all(&garbage)?;

            let good = codec::encode(&SharedSnapshot {
                tick: 5,
                ..SharedSnapshot::default()
            });
            stream.write_all(&(good.len() as u32).to_le_bytes())?;
            stream.write_all(&good)?;
            stream.flush()?;
            // Hold the connection until the client has read everything
            std::thread::sleep(Duration::from_millis(500));
            std::io::Result::Ok(())
        });

        let client = SnapshotClient::connect(addr).expect("connect");
        assert!(wait_for_tick(&client, 5));
        primary.join().expect("primary thread").expect("primary io");
    }
}
