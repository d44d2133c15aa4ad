use log::debug;
use mpi::collective::SystemOperation;
use mpi::topology::{Process, SimpleCommunicator};
use mpi::traits::{BufferMut, Communicator, Root};
use num_complex::Complex64;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::mpi::serialization::{deserialize, serialize};

/// The collective operations the contraction workers need. Rank 0 is the
/// root that receives reductions and writes results.
pub trait Collective {
    fn rank(&self) -> usize;

    /// The number of workers.
    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Blocks until all workers reached the barrier.
    fn barrier(&self);

    /// Sums `data` element-wise over all workers. Only the root's buffer holds
    /// the result afterwards.
    fn reduce_sum(&self, data: &mut [Complex64]);

    /// Broadcasts `data` from the root to all workers. The value passed by
    /// the other workers is ignored.
    fn broadcast_serializing<T>(&self, data: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned;
}

/// Broadcasts a vector of `data` from `root` to all processes. For the
/// receivers, `data` can just be an empty vector.
fn broadcast_vec<T>(data: &mut Vec<T>, root: &Process)
where
    T: Clone + Default,
    Vec<T>: BufferMut,
{
    // Broadcast length
    let mut len = if root.is_self() { data.len() } else { 0 };
    root.broadcast_into(&mut len);

    // Broadcast data
    if !root.is_self() {
        data.resize(len, Default::default());
    }
    root.broadcast_into(data);
}

impl Collective for SimpleCommunicator {
    fn rank(&self) -> usize {
        Communicator::rank(self) as usize
    }

    fn size(&self) -> usize {
        Communicator::size(self) as usize
    }

    fn barrier(&self) {
        Communicator::barrier(self);
    }

    fn reduce_sum(&self, data: &mut [Complex64]) {
        debug!(rank = Collective::rank(self), len = data.len(); "Reducing to root");
        let root = self.process_at_rank(0);
        let op = SystemOperation::sum();
        if root.is_self() {
            root.reduce_into_root_inplace(data, op);
        } else {
            root.reduce_into(&*data, op);
        }
    }

    fn broadcast_serializing<T>(&self, data: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let root = self.process_at_rank(0);
        let mut raw_value = if root.is_self() {
            serialize(&data)?
        } else {
            Vec::new()
        };

        broadcast_vec(&mut raw_value, &root);

        if root.is_self() {
            Ok(data)
        } else {
            deserialize(&raw_value)
        }
    }
}

/// A lone worker, for serial runs without an MPI launcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn reduce_sum(&self, _data: &mut [Complex64]) {}

    fn broadcast_serializing<T>(&self, data: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        Ok(data)
    }
}
