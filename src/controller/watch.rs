//! Watch loop feeding cluster events to the [`RouterPlugin`]
//!
//! Routes, Endpoints and (with VXLAN) Nodes are watched with kube-runtime
//! watchers and merged into one stream, so the plugin sees one event at a
//! time. Handler errors are logged; the watcher's periodic re-list delivers
//! the object again later.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Endpoints, Node};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{error, info, warn};

use crate::crd::Route;
use crate::error::Result;

use super::plugin::{EventType, RouterPlugin};

enum Change {
    Route(watcher::Event<Route>),
    Endpoints(watcher::Event<Endpoints>),
    Node(watcher::Event<Node>),
}

/// Turns raw watcher events into Added/Modified/Deleted notifications.
///
/// Remembers the last version of every object so that objects which vanish
/// while the watch was down are reported as deleted after the next re-list.
pub struct EventTracker<K> {
    seen: HashMap<String, K>,
    relisted: Option<HashSet<String>>,
}

impl<K> Default for EventTracker<K> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K: Resource + Clone> EventTracker<K> {
    fn key(obj: &K) -> String {
        format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
    }

    fn apply(&mut self, obj: K) -> (EventType, K) {
        let event = match self.seen.insert(Self::key(&obj), obj.clone()) {
            Some(_) => EventType::Modified,
            None => EventType::Added,
        };
        (event, obj)
    }

    pub fn observe(&mut self, event: watcher::Event<K>) -> Vec<(EventType, K)> {
        match event {
            watcher::Event::Apply(obj) => vec![self.apply(obj)],
            watcher::Event::Delete(obj) => {
                self.seen.remove(&Self::key(&obj));
                vec![(EventType::Deleted, obj)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(Self::key(&obj));
                }
                vec![self.apply(obj)]
            }
            watcher::Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let stale: Vec<String> = self
                    .seen
                    .keys()
                    .filter(|key| !relisted.contains(*key))
                    .cloned()
                    .collect();
                stale
                    .into_iter()
                    .filter_map(|key| self.seen.remove(&key))
                    .map(|obj| (EventType::Deleted, obj))
                    .collect()
            }
        }
    }
}

/// Watch the cluster and apply every change to the appliance until the
/// watch streams end.
pub async fn run_controller(
    client: Client,
    namespace: Option<String>,
    mut plugin: RouterPlugin,
) -> Result<()> {
    let (routes, endpoints): (Api<Route>, Api<Endpoints>) = match &namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    let mut streams: Vec<BoxStream<'static, std::result::Result<Change, watcher::Error>>> = vec![
        watcher(routes, watcher::Config::default())
            .default_backoff()
            .map_ok(Change::Route)
            .boxed(),
        watcher(endpoints, watcher::Config::default())
            .default_backoff()
            .map_ok(Change::Endpoints)
            .boxed(),
    ];
    if plugin.ltm().vxlan().is_some() {
        let nodes: Api<Node> = Api::all(client.clone());
        streams.push(
            watcher(nodes, watcher::Config::default())
                .default_backoff()
                .map_ok(Change::Node)
                .boxed(),
        );
    }

    info!(
        "Watching routes and endpoints in {}",
        namespace.as_deref().unwrap_or("all namespaces")
    );

    let mut route_tracker = EventTracker::<Route>::default();
    let mut endpoints_tracker = EventTracker::<Endpoints>::default();
    let mut node_tracker = EventTracker::<Node>::default();

    let mut changes = stream::select_all(streams);
    while let Some(change) = changes.next().await {
        let change = match change {
            Ok(change) => change,
            Err(e) => {
                warn!("Watch error: {}", e);
                continue;
            }
        };

        match change {
            Change::Route(event) => {
                for (event, route) in route_tracker.observe(event) {
                    if let Err(e) = plugin.handle_route(event, &route).await {
                        error!("Failed to handle {:?} of route {}: {}", event, route.name_any(), e);
                    }
                }
            }
            Change::Endpoints(event) => {
                for (event, endpoints) in endpoints_tracker.observe(event) {
                    if let Err(e) = plugin.handle_endpoints(event, &endpoints).await {
                        error!(
                            "Failed to handle {:?} of endpoints {}: {}",
                            event,
                            endpoints.name_any(),
                            e
                        );
                    }
                }
            }
            Change::Node(event) => {
                for (event, node) in node_tracker.observe(event) {
                    if let Err(e) = plugin.handle_node(event, &node).await {
                        error!("Failed to handle {:?} of node {}: {}", event, node.name_any(), e);
                    }
                }
            }
        }
    }

    info!("Watch streams ended");
    Ok(())
}
