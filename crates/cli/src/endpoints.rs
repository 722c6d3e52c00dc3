// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gate endpoint discovery.
//!
//! Enumerates every address the gate Service can be reached on, most
//! reliable first: LoadBalancer ingress, then NodePort across all node
//! addresses, then the ClusterIP. The driver dials them in order.

use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{Api, ListParams};
use kube::Client;

use crate::exit_error::ExitError;

/// Candidate `host:port` addresses for a named Service port.
pub async fn fetch_gate_endpoints(
    client: &Client,
    namespace: &str,
    service: &str,
    port_name: &str,
) -> Result<Vec<String>, ExitError> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let svc = services.get(service).await.map_err(|e| {
        ExitError::new(
            1,
            format!("can't fetch endpoint from Service \"{namespace}/{service}\": {e}"),
        )
    })?;

    let needs_nodes = service_node_port(&svc, port_name).is_some();
    let nodes = if needs_nodes {
        let api: Api<Node> = Api::all(client.clone());
        api.list(&ListParams::default())
            .await
            .map_err(|e| {
                ExitError::new(1, format!("can't list nodes while enumerating NodePort: {e}"))
            })?
            .items
    } else {
        Vec::new()
    };

    Ok(enumerate_endpoints(&svc, &nodes, port_name))
}

fn service_node_port(svc: &Service, port_name: &str) -> Option<i32> {
    svc.spec
        .as_ref()?
        .ports
        .as_ref()?
        .iter()
        .find(|p| p.name.as_deref() == Some(port_name))
        .and_then(|p| p.node_port)
        .filter(|p| *p > 0)
}

/// Pure enumeration over a fetched Service and node list.
pub(crate) fn enumerate_endpoints(svc: &Service, nodes: &[Node], port_name: &str) -> Vec<String> {
    let mut addrs = Vec::new();

    let Some(spec) = svc.spec.as_ref() else { return addrs };
    let port = spec
        .ports
        .as_ref()
        .into_iter()
        .flatten()
        .find(|p| p.name.as_deref() == Some(port_name));
    let Some(port) = port else { return addrs };

    let svc_port = port.port;
    let node_port = port.node_port.unwrap_or(0);

    if svc_port > 0 {
        let ingress = svc
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref());
        for ingress in ingress.into_iter().flatten() {
            if let Some(hostname) = ingress.hostname.as_deref().filter(|h| !h.is_empty()) {
                addrs.push(format!("{hostname}:{svc_port}"));
            }
            if let Some(ip) = ingress.ip.as_deref().filter(|ip| !ip.is_empty()) {
                addrs.push(format!("{ip}:{svc_port}"));
            }
        }
    }

    if node_port > 0 {
        for node in nodes {
            let node_addrs = node.status.as_ref().and_then(|s| s.addresses.as_ref());
            for addr in node_addrs.into_iter().flatten() {
                if !addr.address.is_empty() {
                    addrs.push(format!("{}:{node_port}", addr.address));
                }
            }
        }
    }

    if let Some(cluster_ip) = spec.cluster_ip.as_deref().filter(|ip| !ip.is_empty()) {
        addrs.push(format!("{cluster_ip}:{svc_port}"));
    }

    addrs
}

#[cfg(test)]
#[path = "endpoints_tests.rs"]
mod tests;
