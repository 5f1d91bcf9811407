//! Allocation request classification

use nnfplace_common::{AllocationRequest, Strategy};

/// A breakdown's requests partitioned by placement strategy
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassifiedRequests<'a> {
    pub per_compute: Vec<&'a AllocationRequest>,
    pub single_server: Vec<&'a AllocationRequest>,
    pub across_servers: Vec<&'a AllocationRequest>,
}

impl<'a> ClassifiedRequests<'a> {
    /// Buckets in the order the allocators must run
    ///
    /// Single-server and across-servers placement consult which storage
    /// nodes earlier stages touched, so the order is fixed.
    #[must_use]
    pub fn in_allocation_order(&self) -> [(Strategy, &[&'a AllocationRequest]); 3] {
        [
            (Strategy::PerCompute, self.per_compute.as_slice()),
            (Strategy::SingleServer, self.single_server.as_slice()),
            (Strategy::AcrossServers, self.across_servers.as_slice()),
        ]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.per_compute.len() + self.single_server.len() + self.across_servers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition requests by strategy, preserving relative order in each bucket
#[must_use]
pub fn classify(requests: &[AllocationRequest]) -> ClassifiedRequests<'_> {
    let mut classified = ClassifiedRequests::default();
    for request in requests {
        match request.strategy {
            Strategy::PerCompute => classified.per_compute.push(request),
            Strategy::SingleServer => classified.single_server.push(request),
            Strategy::AcrossServers => classified.across_servers.push(request),
        }
    }
    classified
}
