//! Dht node.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use tracing::trace;

use crate::{
    common::{Id, PrefixTree, RoutingBackend, RoutingTable, SeekRequest, SeekResponse},
    rpc::{self, drive, search, Accept, Config, Query, RefreshHandle, Seeker, Transport, Updater},
    server::{DefaultServer, Server},
    Result,
};

#[derive(Debug, Clone)]
/// A node in the overlay, owning a [RoutingTable] and answering [SeekRequest]s.
///
/// Cloning is cheap, clones share the same routing table.
pub struct Dht {
    routing_table: Arc<RoutingTable>,
    server: Arc<dyn Server>,
    config: Config,
}

impl Dht {
    /// Create a node with the id `id`, storing its routing table in a [PrefixTree].
    pub fn new(id: Id, config: Config) -> Self {
        let tree = PrefixTree::new(id.clone(), config.bucket_size)
            .with_prune_threshold(config.prune_threshold());

        Self::with_backend(id, Box::new(tree), config)
    }

    pub fn with_backend(id: Id, backend: Box<dyn RoutingBackend>, config: Config) -> Self {
        Dht {
            routing_table: Arc::new(RoutingTable::with_backend(id, backend)),
            server: Arc::new(DefaultServer::new(&config)),
            config,
        }
    }

    /// Replace the [DefaultServer] answering incoming requests.
    pub fn with_server(mut self, server: Box<dyn Server>) -> Self {
        self.server = Arc::from(server);
        self
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        self.routing_table.id()
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Public Methods ===

    /// Add known nodes to the routing table, returns how many were added.
    pub fn bootstrap(&self, nodes: &[Id]) -> usize {
        nodes
            .iter()
            .filter(|node| self.routing_table.add(node, true))
            .count()
    }

    /// Answer an incoming request.
    pub fn handle_seek(&self, request: &SeekRequest) -> Result<SeekResponse> {
        self.server.handle_seek(&self.routing_table, request)
    }

    /// Start a lookup towards `target`, seeded from this node's own routing table.
    ///
    /// Drive it with [rpc::drive] or by hand through [Query].
    pub fn seek(&self, target: Id, accept: Option<Accept>) -> Result<Seeker> {
        self.routing_table.id().check_len(&target)?;

        let mut seeker = Seeker::new(self.routing_table.clone(), target, &self.config);
        if let Some(accept) = accept {
            seeker = seeker.accept(accept);
        }

        let request = seeker.local_request();
        let response = self.handle_seek(&request)?;
        seeker.handle(response);

        Ok(seeker)
    }

    /// Look for the node `target` over `transport`.
    ///
    /// Returns the finished [Seeker], which [Seeker::is_done] if the node was found.
    pub fn search<T: Transport + ?Sized>(&self, target: &Id, transport: &T) -> Result<Seeker> {
        let mut seeker = self.seek(target.clone(), Some(search(target.clone())))?;

        drive(&mut seeker, transport, self.config.request_timeout);

        Ok(seeker)
    }

    /// Start a refresh sweep over this node's routing table.
    pub fn update(&self) -> Updater {
        Updater::new(self.routing_table.clone(), &self.config)
    }

    /// Run one refresh sweep over `transport`, returns the number of requests sent.
    pub fn refresh<T: Transport + ?Sized>(&self, transport: &T) -> usize {
        drive(&mut self.update(), transport, self.config.request_timeout)
    }

    /// Refresh the routing table in a background thread until the returned
    /// handle is stopped or dropped.
    pub fn spawn_refresh<T>(&self, transport: Arc<T>) -> RefreshHandle
    where
        T: Transport + Send + Sync + ?Sized + 'static,
    {
        rpc::spawn(self.routing_table.clone(), transport, self.config.clone())
    }
}

#[derive(Debug, Default)]
/// Create a testnet of Dht nodes to run tests against instead of a real network.
///
/// Requests and responses are serialized on their way, like over a real transport.
pub struct Testnet {
    nodes: DashMap<Id, Dht>,
    offline: DashSet<Id>,
}

impl Testnet {
    /// Create `count` nodes with random ids of `id_len` bytes, all of them but
    /// the first one knowing the first one.
    pub fn new(count: usize, id_len: usize, config: Config) -> Testnet {
        let testnet = Testnet::default();
        let mut seed: Option<Id> = None;

        for _ in 0..count {
            let dht = Dht::new(Id::random(id_len), config.clone());

            match &seed {
                Some(seed) => {
                    dht.bootstrap(&[seed.clone()]);
                }
                None => seed = Some(dht.id().clone()),
            }

            testnet.insert(dht);
        }

        testnet
    }

    pub fn insert(&self, dht: Dht) {
        self.nodes.insert(dht.id().clone(), dht);
    }

    pub fn get(&self, id: &Id) -> Option<Dht> {
        self.nodes.get(id).map(|dht| dht.value().clone())
    }

    pub fn ids(&self) -> Vec<Id> {
        self.nodes.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_offline(&self, id: &Id) -> bool {
        self.offline.contains(id)
    }

    /// Make a node stop or resume responding.
    pub fn set_offline(&self, id: &Id, offline: bool) {
        if offline {
            self.offline.insert(id.clone());
        } else {
            self.offline.remove(id);
        }
    }
}

impl Transport for Testnet {
    fn send(&self, to: &Id, request: &SeekRequest, _timeout: Duration) -> Option<SeekResponse> {
        if self.offline.contains(to) {
            trace!(?to, "Node is offline");
            return None;
        }

        let node = self.get(to)?;

        let request = SeekRequest::from_bytes(request.to_bytes().ok()?).ok()?;
        let response = node.handle_seek(&request).ok()?;

        SeekResponse::from_bytes(response.to_bytes().ok()?).ok()
    }
}
