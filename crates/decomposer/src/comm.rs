//! Collective communication between ranks
//!
//! Every collective must be entered by all ranks of the group in the same
//! order. [`LocalGroup`] runs each rank on its own thread; payloads travel as
//! `bincode` bytes so the same call sites work over any transport.

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DecompositionError, Result};

/// Rank-level message passing used by the decomposition phases.
pub trait Communicator {
    /// This participant's rank.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Block until every rank has arrived.
    fn barrier(&self);

    /// Return `root`'s payload on every rank. Non-root payloads are ignored.
    fn broadcast_bytes(&self, root: usize, payload: Vec<u8>) -> Vec<u8>;

    /// Element-wise sum of `values` over all ranks, returned on every rank.
    fn all_reduce_sum(&self, values: &[u64]) -> Vec<u64>;

    /// Whether this rank coordinates the serial phases.
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }
}

/// A group of one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn broadcast_bytes(&self, _root: usize, payload: Vec<u8>) -> Vec<u8> {
        payload
    }

    fn all_reduce_sum(&self, values: &[u64]) -> Vec<u64> {
        values.to_vec()
    }
}

struct Shared {
    barrier: Barrier,
    broadcast: Mutex<Vec<u8>>,
    contributions: Mutex<Vec<Vec<u64>>>,
}

/// Shared state of a thread-backed group.
pub struct LocalGroup {
    size: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Group of `size` ranks.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            shared: Arc::new(Shared {
                barrier: Barrier::new(size.max(1)),
                broadcast: Mutex::new(Vec::new()),
                contributions: Mutex::new(vec![Vec::new(); size]),
            }),
        }
    }

    /// Communicator endpoint for `rank`.
    pub fn communicator(&self, rank: usize) -> LocalCommunicator {
        LocalCommunicator {
            rank,
            size: self.size,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run `f` once per rank, each on its own thread, and collect the results
    /// in rank order.
    pub fn run<F, T>(&self, f: F) -> Vec<T>
    where
        F: Fn(&LocalCommunicator) -> T + Sync,
        T: Send,
    {
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.size)
                .map(|rank| {
                    let comm = self.communicator(rank);
                    thread::Builder::new()
                        .name(format!("rank-{}", rank))
                        .spawn_scoped(scope, move || f(&comm))
                        .expect("failed to spawn rank thread")
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().expect("rank thread panicked"))
                .collect()
        })
    }
}

/// Run `f` on a fresh group of `size` threads.
pub fn run_local_group<F, T>(size: usize, f: F) -> Vec<T>
where
    F: Fn(&LocalCommunicator) -> T + Sync,
    T: Send,
{
    LocalGroup::new(size).run(f)
}

/// One rank's endpoint in a [`LocalGroup`].
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn broadcast_bytes(&self, root: usize, payload: Vec<u8>) -> Vec<u8> {
        if self.rank == root {
            *self.shared.broadcast.lock().unwrap() = payload;
        }
        self.barrier();
        let received = self.shared.broadcast.lock().unwrap().clone();
        // nobody may write the slot again until everyone has read it
        self.barrier();
        received
    }

    fn all_reduce_sum(&self, values: &[u64]) -> Vec<u64> {
        self.shared.contributions.lock().unwrap()[self.rank] = values.to_vec();
        self.barrier();
        let sum = {
            let contributions = self.shared.contributions.lock().unwrap();
            let len = contributions.iter().map(Vec::len).max().unwrap_or(0);
            let mut sum = vec![0u64; len];
            for part in contributions.iter() {
                for (acc, &v) in sum.iter_mut().zip(part) {
                    *acc += v;
                }
            }
            sum
        };
        self.barrier();
        sum
    }
}

#[derive(Serialize, Deserialize)]
enum Outcome<T> {
    Ok(T),
    Failed(String),
}

/// Broadcast `value` from `root` with `bincode`. Non-root ranks pass `None`.
pub fn broadcast<C, T>(comm: &C, root: usize, value: Option<&T>) -> Result<T>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned,
{
    let payload = match value {
        Some(v) if comm.rank() == root => bincode::serialize(v)?,
        _ => Vec::new(),
    };
    let bytes = comm.broadcast_bytes(root, payload);
    Ok(bincode::deserialize(&bytes)?)
}

/// Share the outcome of a phase that only `root` computed.
///
/// `root` passes `Some(result)`, everyone else `None`. A failure on `root`
/// is returned there unchanged and as [`DecompositionError::Aborted`] on the
/// other ranks, so every rank leaves the collective together.
pub fn share_outcome<C, T>(comm: &C, root: usize, local: Option<Result<T>>) -> Result<T>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned,
{
    if comm.rank() == root {
        let result = local.ok_or_else(|| {
            DecompositionError::Comm(format!("root rank {} has no outcome to share", root))
        });
        let (payload, result) = match result.and_then(|r| r) {
            Ok(value) => match bincode::serialize(&Outcome::Ok(&value)) {
                Ok(payload) => (payload, Ok(value)),
                Err(e) => {
                    let err = DecompositionError::from(e);
                    (encode_failure(&err), Err(err))
                }
            },
            Err(err) => (encode_failure(&err), Err(err)),
        };
        comm.broadcast_bytes(root, payload);
        result
    } else {
        let bytes = comm.broadcast_bytes(root, Vec::new());
        match bincode::deserialize::<Outcome<T>>(&bytes)? {
            Outcome::Ok(value) => Ok(value),
            Outcome::Failed(message) => Err(DecompositionError::Aborted(format!(
                "rank {} failed: {}",
                root, message
            ))),
        }
    }
}

fn encode_failure(err: &DecompositionError) -> Vec<u8> {
    // a String payload always encodes
    bincode::serialize(&Outcome::<()>::Failed(err.to_string())).unwrap_or_default()
}

/// Agree across the group on whether any rank failed.
///
/// A failing rank keeps its own error; the others get
/// [`DecompositionError::Aborted`].
pub fn agree<C, T>(comm: &C, local: Result<T>) -> Result<T>
where
    C: Communicator + ?Sized,
{
    let flag = [u64::from(local.is_err())];
    let failed = comm.all_reduce_sum(&flag)[0];
    match local {
        Err(e) => Err(e),
        Ok(_) if failed > 0 => Err(DecompositionError::Aborted(format!(
            "{} rank(s) failed",
            failed
        ))),
        ok => ok,
    }
}
