//! Inventory abstraction over the hypervisor management API.
//!
//! This module provides:
//! - [`InventoryClient`]: Trait for the management API operations the provisioner consumes
//! - Inventory references ([`Datacenter`], [`Datastore`], [`HostSystem`], [`Network`],
//!   [`ResourcePool`], [`Folder`]) and the created [`VmRef`]
//! - [`VmConfigSpec`]: Declarative configuration submitted with the create-VM task
//! - [`TaskRef`] / [`TaskOutcome`]: Long-running remote task handle and its result
//! - The virtual device model (see [`device`]) and [`DatastorePath`]

pub mod datastore_path;
pub mod device;

use std::fmt;

use anyhow::Result;
use camino::Utf8Path;
use strum::Display;

use crate::config::Endpoint;

pub use datastore_path::DatastorePath;
pub use device::{
    DeviceList, DiskBacking, NicBacking, NicKind, ScsiControllerKind, VirtualDevice,
};

/// Guest OS identifier used for every created VM.
pub const GUEST_ID: &str = "otherLinux64Guest";

/// Common accessors for named inventory objects.
pub trait InventoryObject {
    /// Object kind used in log and error messages (e.g., "datastore").
    const KIND: &'static str;

    /// Managed object identifier (e.g., "datastore-11").
    fn id(&self) -> &str;

    /// Display name in the inventory.
    fn name(&self) -> &str;
}

macro_rules! inventory_object {
    ($type:ident, $kind:literal) => {
        impl InventoryObject for $type {
            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn name(&self) -> &str {
                &self.name
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} ({})", self.name, self.id)
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datacenter {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datastore {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSystem {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePool {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

/// Kind of network a NIC can be backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkKind {
    StandardPortgroup,
    DistributedPortgroup,
    OpaqueNetwork,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub kind: NetworkKind,
}

inventory_object!(Datacenter, "datacenter");
inventory_object!(Datastore, "datastore");
inventory_object!(HostSystem, "host");
inventory_object!(ResourcePool, "resource pool");
inventory_object!(Folder, "folder");
inventory_object!(Network, "network");

/// Resolved inventory references for one provisioning run.
///
/// `network` is only present when the request names a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryHandles {
    pub datacenter: Datacenter,
    pub datastore: Datastore,
    pub host: HostSystem,
    pub resource_pool: ResourcePool,
    pub network: Option<Network>,
}

/// Reference to a created virtual machine.
///
/// Only obtainable from a completed create-VM task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRef {
    pub id: String,
}

impl fmt::Display for VmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Handle to a remote asynchronous task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    /// What the task does, for messages (e.g., "create vm vm1").
    pub description: String,
}

/// Terminal state of a remote task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Task finished; `result` is the managed object id it produced, if any.
    Succeeded { result: Option<String> },
    /// Task failed with the remote error message.
    Failed { message: String },
}

/// Declarative VM configuration submitted with the create-VM task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfigSpec {
    pub name: String,
    pub guest_id: String,
    /// VM storage location, the datastore root (e.g., `[ds1]`).
    pub files: DatastorePath,
    pub num_cpus: u32,
    pub memory_mb: u64,
    /// Devices created together with the VM.
    pub devices: Vec<VirtualDevice>,
}

/// Operations consumed from the hypervisor management API.
///
/// Lookup methods return every candidate matching the optional name inside the
/// datacenter; choosing exactly one (or a default) is the caller's concern.
pub trait InventoryClient {
    /// Establishes an authenticated session.
    fn login(&mut self, endpoint: &Endpoint) -> Result<()>;

    /// Lists all datacenters visible to the session.
    fn datacenters(&self) -> Result<Vec<Datacenter>>;

    fn datastores(&self, datacenter: &Datacenter, name: Option<&str>) -> Result<Vec<Datastore>>;

    fn hosts(&self, datacenter: &Datacenter, name: Option<&str>) -> Result<Vec<HostSystem>>;

    fn networks(&self, datacenter: &Datacenter, name: Option<&str>) -> Result<Vec<Network>>;

    /// Returns the root resource pool of the host's compute resource.
    fn resource_pool(&self, host: &HostSystem) -> Result<ResourcePool>;

    /// Returns the root VM folder of the datacenter.
    fn vm_folder(&self, datacenter: &Datacenter) -> Result<Folder>;

    /// Submits the create-VM task and returns its handle without waiting.
    ///
    /// `datastore` is the resolved datastore that `spec.files` points into.
    fn create_vm(
        &self,
        folder: &Folder,
        spec: &VmConfigSpec,
        pool: &ResourcePool,
        host: &HostSystem,
        datastore: &Datastore,
    ) -> Result<TaskRef>;

    /// Blocks until the task reaches a terminal state. There is no timeout.
    fn wait_for_task(&self, task: &TaskRef) -> Result<TaskOutcome>;

    /// Streams a local file to a datastore path.
    fn upload_file(
        &self,
        local: &Utf8Path,
        datacenter: &Datacenter,
        destination: &DatastorePath,
    ) -> Result<()>;

    /// Lists the VM's current virtual devices.
    fn devices(&self, vm: &VmRef) -> Result<DeviceList>;

    /// Returns NIC backing information for the network.
    fn nic_backing(&self, network: &Network) -> Result<NicBacking>;

    /// Adds the devices to the VM in one reconfiguration.
    fn add_devices(&self, vm: &VmRef, devices: &[VirtualDevice]) -> Result<()>;
}
