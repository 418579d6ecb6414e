//! A full mesh of TCP connections between the parties of a computation.
//!
//! Every party listens on its own endpoint, connects to all parties with a lower index and accepts
//! connections from all parties with a higher index. A connecting party first sends its index as a
//! `u32`, after that every message is a frame prefixed with its length as a big-endian `u32`.

use std::{io, time::Duration};

use anyhow::{Context, bail};
use futures::future::try_join_all;
use polyshare::channel::Channel;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::{Instant, sleep, timeout, timeout_at},
};
use tracing::{debug, info, trace};

const RETRY_INTERVAL: Duration = Duration::from_millis(200);
const MAX_FRAME_LEN: usize = 1 << 30;

struct Peer {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

/// A channel sending length-prefixed frames over one TCP connection per peer.
pub struct TcpChannel {
    peers: Vec<Option<Peer>>,
    recv_timeout: Duration,
}

impl TcpChannel {
    /// Connects `party` to all other endpoints.
    ///
    /// `endpoints[p]` is the `host:port` of party `p`, or `None` if no party with index `p` takes
    /// part. Peers are waited for at most `wait`, which also bounds the wait for every message.
    pub async fn connect(
        party: usize,
        endpoints: &[Option<String>],
        wait: Duration,
    ) -> anyhow::Result<Self> {
        let Some(Some(own)) = endpoints.get(party) else {
            bail!("party {party} has no endpoint");
        };
        let listener = TcpListener::bind(own)
            .await
            .with_context(|| format!("could not listen on {own}"))?;
        info!(party, addr = %own, "listening for peers");
        let deadline = Instant::now() + wait;

        let lower = endpoints[..party]
            .iter()
            .enumerate()
            .filter_map(|(p, addr)| addr.as_deref().map(|addr| (p, addr)));
        let higher: Vec<usize> = (party + 1..endpoints.len())
            .filter(|p| endpoints[*p].is_some())
            .collect();
        let (outgoing, incoming) = tokio::try_join!(
            try_join_all(lower.map(async |(p, addr)| {
                let stream = dial(party, p, addr, deadline).await?;
                Ok::<_, anyhow::Error>((p, stream))
            })),
            accept(&listener, &higher, deadline),
        )?;

        let mut peers: Vec<Option<Peer>> = endpoints.iter().map(|_| None).collect();
        for (p, stream) in outgoing.into_iter().chain(incoming) {
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            peers[p] = Some(Peer {
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
            });
        }
        info!(party, peers = peers.iter().flatten().count(), "connected to all peers");
        Ok(Self {
            peers,
            recv_timeout: wait,
        })
    }

    fn peer(&self, p: usize) -> io::Result<&Peer> {
        self.peers.get(p).and_then(Option::as_ref).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("no connection to party {p}"))
        })
    }
}

async fn dial(
    party: usize,
    peer: usize,
    addr: &str,
    deadline: Instant,
) -> anyhow::Result<TcpStream> {
    loop {
        match TcpStream::connect(addr).await {
            Ok(mut stream) => {
                stream.write_u32(party as u32).await?;
                debug!(peer, addr, "connected");
                return Ok(stream);
            }
            Err(e) if Instant::now() < deadline => {
                trace!(peer, addr, "could not connect yet: {e}");
                sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("could not connect to party {peer} at {addr}"));
            }
        }
    }
}

async fn accept(
    listener: &TcpListener,
    expected: &[usize],
    deadline: Instant,
) -> anyhow::Result<Vec<(usize, TcpStream)>> {
    let mut accepted: Vec<(usize, TcpStream)> = Vec::with_capacity(expected.len());
    while accepted.len() < expected.len() {
        let (mut stream, addr) = timeout_at(deadline, listener.accept())
            .await
            .context("timed out waiting for peers to connect")??;
        let hello = timeout_at(deadline, stream.read_u32())
            .await
            .with_context(|| format!("timed out waiting for {addr} to identify itself"))?;
        let p = hello? as usize;
        if !expected.contains(&p) || accepted.iter().any(|(q, _)| *q == p) {
            bail!("unexpected connection from {addr} claiming to be party {p}");
        }
        debug!(peer = p, %addr, "accepted connection");
        accepted.push((p, stream));
    }
    Ok(accepted)
}

impl Channel for TcpChannel {
    type SendError = io::Error;
    type RecvError = io::Error;

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>, phase: &str) -> Result<(), io::Error> {
        let peer = self.peer(p)?;
        let len = u32::try_from(msg.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "message too long"))?;
        trace!(peer = p, phase, bytes = len, "sending frame");
        let mut writer = peer.writer.lock().await;
        writer.write_u32(len).await?;
        writer.write_all(&msg).await?;
        writer.flush().await
    }

    async fn recv_bytes_from(&self, p: usize, phase: &str) -> Result<Vec<u8>, io::Error> {
        let peer = self.peer(p)?;
        let mut reader = peer.reader.lock().await;
        let frame = async {
            let len = reader.read_u32().await? as usize;
            if len > MAX_FRAME_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame of {len} bytes exceeds the limit"),
                ));
            }
            let mut buf = vec![0; len];
            reader.read_exact(&mut buf).await?;
            Ok(buf)
        };
        timeout(self.recv_timeout, frame).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no message from party {p} during {phase}"),
            )
        })?
    }
}
