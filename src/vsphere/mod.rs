//! vSphere implementation of [`InventoryClient`].
//!
//! This module provides [`VsphereClient`], which talks to vCenter (or a
//! standalone ESXi host) through the vSphere Automation REST API using a
//! blocking `reqwest` client. File uploads go through the datastore HTTP
//! file-access endpoint (`/folder`).

mod types;

use std::fs::File;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use camino::Utf8Path;
use reqwest::Method;
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::Endpoint;
use crate::inventory::{
    Datacenter, Datastore, DatastorePath, DeviceList, Folder, HostSystem, InventoryClient,
    Network, NicBacking, ResourcePool, TaskOutcome, TaskRef, VirtualDevice, VmConfigSpec, VmRef,
};

use types::{
    DatacenterSummary, DatastoreSummary, FolderSummary, HostSummary, NetworkSummary, Placement,
    ResourcePoolSummary, TaskInfo, VmInfo,
};

const SESSION_PATH: &str = "/api/session";
const SESSION_HEADER: &str = "vmware-api-session-id";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const ROOT_RESOURCE_POOL: &str = "Resources";
const ROOT_VM_FOLDER: &str = "vm";

struct Session {
    http: Client,
    base: Url,
    token: String,
    username: String,
    password: String,
}

/// Management API client for vCenter/ESXi.
///
/// [`InventoryClient::login`] must succeed before any other call.
pub struct VsphereClient {
    session: Option<Session>,
}

impl Default for VsphereClient {
    fn default() -> Self {
        Self::new()
    }
}

impl VsphereClient {
    pub fn new() -> Self {
        Self { session: None }
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("not logged in to the management endpoint"))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let session = self.session()?;
        let url = api_url(&session.base, path)?;
        trace!("{} {}", method, url.path());
        Ok(session
            .http
            .request(method, url)
            .header(SESSION_HEADER, &session.token))
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.request(Method::GET, path)?.query(query).send();
        decode(path, response)
    }

    fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T> {
        let response = self.request(Method::POST, path)?.query(query).json(body).send();
        decode(path, response)
    }

    /// Lists objects of one kind in a datacenter, optionally filtered by name.
    fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        datacenter: &Datacenter,
        name: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut query = vec![("datacenters", datacenter.id.as_str())];
        if let Some(name) = name {
            query.push(("names", name));
        }
        self.get(path, &query)
    }
}

/// Checks the response status and returns the response, or an error with the
/// server's message.
fn check(path: &str, response: reqwest::Result<Response>) -> Result<Response> {
    let response = response.with_context(|| format!("request to {} failed", path))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .map(|v| types::error_message(&v))
        .unwrap_or(body);
    bail!("{} returned {}: {}", path, status, message)
}

fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Result<Response>) -> Result<T> {
    check(path, response)?
        .json()
        .with_context(|| format!("failed to decode response from {}", path))
}

/// Resolves an absolute API path against the endpoint base.
fn api_url(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .with_context(|| format!("invalid request path: {}", path))
}

/// Datastore file-access URL: `/folder/<path>?dcPath=<dc>&dsName=<ds>`.
fn folder_url(base: &Url, datacenter: &Datacenter, destination: &DatastorePath) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| anyhow!("endpoint URL can not carry a path"))?
        .pop_if_empty()
        .push("folder")
        .extend(destination.path.split('/'));
    url.query_pairs_mut()
        .append_pair("dcPath", &datacenter.name)
        .append_pair("dsName", &destination.datastore);
    Ok(url)
}

/// Picks the object named `preferred`, else the first one.
fn prefer_named<T>(mut items: Vec<T>, preferred: &str, name: impl Fn(&T) -> &str) -> Option<T> {
    let index = items.iter().position(|i| name(i) == preferred).unwrap_or(0);
    if items.is_empty() {
        None
    } else {
        Some(items.swap_remove(index))
    }
}

impl InventoryClient for VsphereClient {
    fn login(&mut self, endpoint: &Endpoint) -> Result<()> {
        let http = Client::builder()
            .danger_accept_invalid_certs(endpoint.insecure)
            .build()
            .context("failed to build HTTP client")?;
        let url = api_url(&endpoint.base, SESSION_PATH)?;
        let response = http
            .post(url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .send();
        let token: String = decode(SESSION_PATH, response)?;
        debug!("logged in to {} as {}", endpoint, endpoint.username);

        self.session = Some(Session {
            http,
            base: endpoint.base.clone(),
            token,
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
        });
        Ok(())
    }

    fn datacenters(&self) -> Result<Vec<Datacenter>> {
        let found: Vec<DatacenterSummary> = self.get("/api/vcenter/datacenter", &[])?;
        Ok(found
            .into_iter()
            .map(|d| Datacenter {
                id: d.datacenter,
                name: d.name,
            })
            .collect())
    }

    fn datastores(&self, datacenter: &Datacenter, name: Option<&str>) -> Result<Vec<Datastore>> {
        let found: Vec<DatastoreSummary> = self.list("/api/vcenter/datastore", datacenter, name)?;
        Ok(found
            .into_iter()
            .map(|d| Datastore {
                id: d.datastore,
                name: d.name,
            })
            .collect())
    }

    fn hosts(&self, datacenter: &Datacenter, name: Option<&str>) -> Result<Vec<HostSystem>> {
        let found: Vec<HostSummary> = self.list("/api/vcenter/host", datacenter, name)?;
        Ok(found
            .into_iter()
            .map(|h| HostSystem {
                id: h.host,
                name: h.name,
            })
            .collect())
    }

    fn networks(&self, datacenter: &Datacenter, name: Option<&str>) -> Result<Vec<Network>> {
        let found: Vec<NetworkSummary> = self.list("/api/vcenter/network", datacenter, name)?;
        found
            .into_iter()
            .map(|n| {
                Ok(Network {
                    kind: types::network_kind(&n.kind)?,
                    id: n.network,
                    name: n.name,
                })
            })
            .collect()
    }

    fn resource_pool(&self, host: &HostSystem) -> Result<ResourcePool> {
        let pools: Vec<ResourcePoolSummary> =
            self.get("/api/vcenter/resource-pool", &[("hosts", host.id.as_str())])?;
        let pool = prefer_named(pools, ROOT_RESOURCE_POOL, |p| p.name.as_str())
            .with_context(|| format!("no resource pool found for host {}", host.name))?;
        Ok(ResourcePool {
            id: pool.resource_pool,
            name: pool.name,
        })
    }

    fn vm_folder(&self, datacenter: &Datacenter) -> Result<Folder> {
        let folders: Vec<FolderSummary> = self.get(
            "/api/vcenter/folder",
            &[("type", "VIRTUAL_MACHINE"), ("datacenters", datacenter.id.as_str())],
        )?;
        let folder = prefer_named(folders, ROOT_VM_FOLDER, |f| f.name.as_str())
            .with_context(|| format!("no VM folder found in datacenter {}", datacenter.name))?;
        Ok(Folder {
            id: folder.folder,
            name: folder.name,
        })
    }

    fn create_vm(
        &self,
        folder: &Folder,
        spec: &VmConfigSpec,
        pool: &ResourcePool,
        host: &HostSystem,
        datastore: &Datastore,
    ) -> Result<TaskRef> {
        let body = types::vm_create_spec(spec, Placement::new(folder, pool, host, datastore))?;
        let task: String = self.post("/api/vcenter/vm", &[("vmw-task", "true")], &body)?;
        Ok(TaskRef {
            id: task,
            description: format!("create vm {}", spec.name),
        })
    }

    fn wait_for_task(&self, task: &TaskRef) -> Result<TaskOutcome> {
        let path = format!("/api/cis/tasks/{}", task.id);
        loop {
            let info: TaskInfo = self.get(&path, &[])?;
            let status = info.status;
            if let Some(outcome) = types::task_outcome(info) {
                return Ok(outcome);
            }
            trace!(task = %task.id, ?status, "task still in progress");
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn upload_file(
        &self,
        local: &Utf8Path,
        datacenter: &Datacenter,
        destination: &DatastorePath,
    ) -> Result<()> {
        let session = self.session()?;
        let file = File::open(local).with_context(|| format!("failed to open {}", local))?;

        let url = folder_url(&session.base, datacenter, destination)?;
        trace!("PUT {}", url.path());

        let response = session
            .http
            .put(url)
            .basic_auth(&session.username, Some(&session.password))
            .header(SESSION_HEADER, &session.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(file))
            .send();
        check("/folder", response)?;
        Ok(())
    }

    fn devices(&self, vm: &VmRef) -> Result<DeviceList> {
        let info: VmInfo = self.get(&format!("/api/vcenter/vm/{}", vm.id), &[])?;
        types::device_list(info)
    }

    fn nic_backing(&self, network: &Network) -> Result<NicBacking> {
        Ok(NicBacking {
            kind: network.kind,
            network: network.id.clone(),
        })
    }

    fn add_devices(&self, vm: &VmRef, devices: &[VirtualDevice]) -> Result<()> {
        let existing = self.devices(vm)?;
        for device in devices {
            let request = types::hardware_create(device, &existing)?;
            let resize = types::disk_resize(device)?;
            let path = format!("/api/vcenter/vm/{}/hardware/{}", vm.id, request.endpoint());
            let id: Value = self.post(&path, &[], &request.body()?)?;
            debug!("added {} {} to {}", device.type_name(), id, vm);

            if let Some(update) = resize {
                let id = id.as_str().context("disk id in response is not a string")?;
                let path = format!("/api/vcenter/vm/{}/hardware/disk/{}", vm.id, id);
                let response = self.request(Method::PATCH, &path)?.json(&update).send();
                match check(&path, response) {
                    Ok(_) => debug!("resized disk {} to {} bytes", id, update.capacity),
                    Err(e) => warn!(
                        "disk {} keeps its image size, resize to {} bytes failed: {:#}",
                        id, update.capacity, e
                    ),
                }
            }
        }
        Ok(())
    }
}
