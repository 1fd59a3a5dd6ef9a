//! Hand-off to the asset inventory.
//!
//! The inventory stores servers, the applications they run and a relationship
//! between the two. This module maps sweep results onto those records and
//! pushes them through the [`AssetInventory`] write interface.

use crate::logging::log_failure;
use crate::types::HostResult;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub ip_address: Ipv4Addr,
    pub apps: Vec<String>,
}

/// A service seen on a server. The scanner cannot learn versions, so
/// `version` is always `None` for scanned records.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryBatch {
    pub servers: Vec<Server>,
    pub applications: Vec<Application>,
}

pub fn server_id(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("host-{}-{}-{}-{}", a, b, c, d)
}

pub fn application_id(ip: Ipv4Addr, port: u16) -> String {
    format!("{}:{}/tcp", server_id(ip), port)
}

/// Inventory records for one live host; `None` for hosts that did not answer.
pub fn host_records(result: &HostResult) -> Option<(Server, Vec<Application>)> {
    if !result.alive {
        return None;
    }

    let applications: Vec<Application> = result
        .open_ports
        .iter()
        .map(|open| Application {
            id: application_id(result.address, open.port),
            name: open.service.clone(),
            version: None,
        })
        .collect();

    let server = Server {
        id: server_id(result.address),
        name: result.address.to_string(),
        ip_address: result.address,
        apps: applications.iter().map(|app| app.id.clone()).collect(),
    };

    Some((server, applications))
}

impl InventoryBatch {
    pub fn from_results(results: &[HostResult]) -> Self {
        let mut batch = InventoryBatch::default();
        for (server, applications) in results.iter().filter_map(host_records) {
            batch.servers.push(server);
            batch.applications.extend(applications);
        }
        batch
    }
}

/// Write side of the asset inventory.
#[async_trait]
pub trait AssetInventory: Send + Sync {
    async fn create_server_node(&self, server: &Server) -> crate::Result<()>;

    async fn create_application_node(&self, app: &Application) -> crate::Result<()>;

    async fn create_relationship(&self, server_id: &str, app_id: &str) -> crate::Result<()>;
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub published: usize,
    pub failures: Vec<(Ipv4Addr, crate::Error)>,
}

async fn publish_host(
    inventory: &dyn AssetInventory,
    server: &Server,
    applications: &[Application],
) -> crate::Result<()> {
    inventory.create_server_node(server).await?;
    for app in applications {
        inventory.create_application_node(app).await?;
        inventory.create_relationship(&server.id, &app.id).await?;
    }
    Ok(())
}

/// Writes every live host with its services. A failing host is logged and
/// skipped; the rest are still written.
pub async fn publish(inventory: &dyn AssetInventory, results: &[HostResult]) -> PublishReport {
    let mut report = PublishReport::default();

    for (server, applications) in results.iter().filter_map(host_records) {
        match publish_host(inventory, &server, &applications).await {
            Ok(()) => report.published += 1,
            Err(e) => {
                log_failure("publish", &server.name, &e);
                report.failures.push((server.ip_address, e));
            }
        }
    }

    info!(
        "Published {} hosts to inventory, {} failed",
        report.published,
        report.failures.len()
    );
    report
}
