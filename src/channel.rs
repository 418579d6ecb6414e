//! A communication channel used to send/receive messages to/from another party.
//!
//! The [`Channel`] trait only moves bytes. The free functions in this module take care of
//! (de-)serializing round messages and of the all-to-all exchanges that every protocol round is
//! built from.

use std::{fmt, future::Future, time::Duration};

use futures::future::{try_join, try_join_all};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel, error::SendError},
    },
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be (de-)serialized.
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength {
        /// The number of elements the round expects.
        expected: usize,
        /// The number of elements the other party sent.
        actual: usize,
    },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = &self.phase;
        match &self.reason {
            ErrorKind::RecvError(e) => write!(f, "could not receive {phase}: {e}"),
            ErrorKind::SendError(e) => write!(f, "could not send {phase}: {e}"),
            ErrorKind::SerdeError(e) => write!(f, "malformed message during {phase}: {e}"),
            ErrorKind::InvalidLength { expected, actual } => write!(
                f,
                "malformed message during {phase}: expected {expected} elements, got {actual}"
            ),
        }
    }
}

/// A communication channel used to send/receive messages to/from another party.
///
/// Implementations must deliver the messages sent to a particular party in order. Both methods
/// take `&self` so that the sends and receives of one round can be awaited concurrently.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &self,
        party: usize,
        msg: Vec<u8>,
        phase: &str,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a response from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &self,
        party: usize,
        phase: &str,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Serializes and sends a message to the other party.
pub(crate) async fn send_to<S: Serialize + ?Sized>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: &S,
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    trace!(party, phase, bytes = msg.len(), "sending message");
    channel
        .send_bytes_to(party, msg, phase)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
}

/// Receives and deserializes a message from the other party.
pub(crate) async fn recv_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
) -> Result<T, Error> {
    let msg = channel
        .recv_bytes_from(party, phase)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            reason: ErrorKind::RecvError(format!("{e:?}")),
        })?;
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// Receives and deserializes a Vec from the other party (while checking the length).
pub(crate) async fn recv_vec_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    len: usize,
) -> Result<Vec<T>, Error> {
    let v: Vec<T> = recv_from(channel, party, phase).await?;
    if v.len() == len {
        Ok(v)
    } else {
        Err(Error {
            phase: phase.to_string(),
            reason: ErrorKind::InvalidLength {
                expected: len,
                actual: v.len(),
            },
        })
    }
}

/// Sends `vec` to every other party and receives the vectors of all other parties.
///
/// Every party has to send a vector of the same length. The result is indexed by party, with the
/// own vector at index `i`. This does not detect a party sending different vectors to different
/// parties, see [`crate::consensus::broadcast`] for that.
pub(crate) async fn unverified_broadcast<T: Clone + Serialize + DeserializeOwned>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    vec: &[T],
) -> Result<Vec<Vec<T>>, Error> {
    let sends = try_join_all(
        (0..n)
            .filter(|&k| k != i)
            .map(|k| send_to(channel, k, phase, vec)),
    );
    let recvs = try_join_all(
        (0..n)
            .filter(|&k| k != i)
            .map(|k| recv_vec_from::<T>(channel, k, phase, vec.len())),
    );
    let (_, received) = try_join(sends, recvs).await?;
    let mut received = received.into_iter();
    let mut all = Vec::with_capacity(n);
    for k in 0..n {
        if k == i {
            all.push(vec.to_vec());
        } else if let Some(v) = received.next() {
            all.push(v);
        }
    }
    Ok(all)
}

/// Sends `msgs[k]` to every party `k != i` and receives one message from each of them.
///
/// The result is indexed by party, the entry at index `i` is the own message.
pub(crate) async fn scatter<T: Clone + Serialize + DeserializeOwned>(
    channel: &impl Channel,
    i: usize,
    phase: &str,
    msgs: &[T],
) -> Result<Vec<T>, Error> {
    let n = msgs.len();
    let sends = try_join_all(
        (0..n)
            .filter(|&k| k != i)
            .map(|k| send_to(channel, k, phase, &msgs[k])),
    );
    let recvs = try_join_all(
        (0..n)
            .filter(|&k| k != i)
            .map(|k| recv_from::<T>(channel, k, phase)),
    );
    let (_, received) = try_join(sends, recvs).await?;
    let mut received = received.into_iter();
    let mut all = Vec::with_capacity(n);
    for (k, own) in msgs.iter().enumerate() {
        if k == i {
            all.push(own.clone());
        } else if let Some(v) = received.next() {
            all.push(v);
        }
    }
    Ok(all)
}

/// A simple asynchronous in-memory channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Mutex<Receiver<Vec<u8>>>>>,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels = vec![];
        for _ in 0..parties {
            let mut s = vec![];
            let mut r = vec![];
            for _ in 0..parties {
                s.push(None);
                r.push(None);
            }
            channels.push(SimpleChannel { s, r });
        }
        for a in 0..parties {
            for b in 0..parties {
                if a >= b {
                    continue;
                }
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].s[a] = Some(send_b_to_a);
                channels[a].r[b] = Some(Mutex::new(recv_b_to_a));
                channels[b].r[a] = Some(Mutex::new(recv_a_to_b));
            }
        }
        channels
    }
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// There is no channel to the party (e.g. because it is the party itself).
    NoSuchParty(usize),
    /// The receiving half of the channel has been dropped.
    Closed(SendError<Vec<u8>>),
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// There is no channel to the party (e.g. because it is the party itself).
    NoSuchParty(usize),
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(
        &self,
        p: usize,
        msg: Vec<u8>,
        _phase: &str,
    ) -> Result<(), AsyncSendError> {
        let Some(s) = self.s.get(p).and_then(Option::as_ref) else {
            return Err(AsyncSendError::NoSuchParty(p));
        };
        s.send(msg).await.map_err(AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&self, p: usize, _phase: &str) -> Result<Vec<u8>, AsyncRecvError> {
        let Some(r) = self.r.get(p).and_then(Option::as_ref) else {
            return Err(AsyncRecvError::NoSuchParty(p));
        };
        let mut r = r.lock().await;
        match timeout(Duration::from_secs(10 * 60), r.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}
