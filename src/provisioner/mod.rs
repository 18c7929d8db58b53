//! VM provisioning workflow.
//!
//! [`Provisioner`] wraps a logged-in [`InventoryClient`] and exposes each
//! workflow step as a method returning a typed [`ProvisionError`]. The
//! linear sequence tying the steps together lives in [`run`].
//!
//! Ordering is carried by types: device-attach methods take the [`VmRef`]
//! that only [`Provisioner::create_vm`] produces, and ISO/disk attachment
//! takes the [`UploadedFile`] that only [`Provisioner::upload_file`] produces.

mod resolve;
mod workflow;

use camino::Utf8Path;
use tracing::{debug, info};

use crate::config::{Endpoint, VmRequest};
use crate::error::ProvisionError;
use crate::inventory::{
    DatastorePath, DeviceList, DiskBacking, GUEST_ID, InventoryClient, InventoryHandles, NicKind,
    ScsiControllerKind, TaskOutcome, VirtualDevice, VmConfigSpec, VmRef,
};

pub use workflow::{ProvisionReport, run};

/// Formats a collaborator error with its full context chain.
fn remote_message(err: anyhow::Error) -> String {
    format!("{:#}", err)
}

/// A file that has been transferred to the datastore.
///
/// Attach operations require this value, so they cannot reference a file
/// before its upload completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    path: DatastorePath,
}

impl UploadedFile {
    pub fn path(&self) -> &DatastorePath {
        &self.path
    }
}

/// Builds the create-VM configuration with a bundled paravirtual SCSI controller.
pub fn vm_config_spec(handles: &InventoryHandles, request: &VmRequest) -> VmConfigSpec {
    let scsi = VirtualDevice::ScsiController {
        key: DeviceList::default().next_key(),
        bus: 0,
        kind: ScsiControllerKind::Pvscsi,
    };
    VmConfigSpec {
        name: request.name.clone(),
        guest_id: GUEST_ID.to_string(),
        files: DatastorePath::root(handles.datastore.name.clone()),
        num_cpus: request.cpus,
        memory_mb: request.memory_mb,
        devices: vec![scsi],
    }
}

/// Final path segment of a local file, used as the datastore file name.
pub fn destination_name(local: &Utf8Path) -> Result<&str, ProvisionError> {
    if local.as_str().trim().is_empty() {
        return Err(ProvisionError::Config("no file specified".to_string()));
    }
    local.file_name().ok_or_else(|| {
        ProvisionError::Config(format!("cannot derive a file name from path '{}'", local))
    })
}

/// An authenticated session driving the provisioning steps.
pub struct Provisioner<C: InventoryClient> {
    client: C,
}

impl<C: InventoryClient> Provisioner<C> {
    /// Establishes an authenticated session against the endpoint.
    #[tracing::instrument(skip_all, fields(endpoint = %endpoint))]
    pub fn connect(mut client: C, endpoint: &Endpoint) -> Result<Self, ProvisionError> {
        info!("connecting to management endpoint");
        client
            .login(endpoint)
            .map_err(|e| ProvisionError::Connection {
                endpoint: endpoint.to_string(),
                message: remote_message(e),
            })?;
        Ok(Self { client })
    }

    /// Resolves datacenter, datastore, host, resource pool, and network.
    ///
    /// The datacenter must be unique. All later lookups are scoped to it.
    /// The network is only looked up when the request names one.
    pub fn resolve_inventory(&self, request: &VmRequest) -> Result<InventoryHandles, ProvisionError> {
        let not_found = |kind: &'static str| {
            move |e: anyhow::Error| ProvisionError::NotFound {
                kind,
                message: remote_message(e),
            }
        };

        let datacenter =
            resolve::select_one(self.client.datacenters().map_err(not_found("datacenter"))?, None)?;
        debug!("resolved datacenter: {}", datacenter);

        let datastore = resolve::select_one(
            self.client
                .datastores(&datacenter, request.datastore.as_deref())
                .map_err(not_found("datastore"))?,
            request.datastore.as_deref(),
        )?;
        debug!("resolved datastore: {}", datastore);

        let network = match request.network.as_deref() {
            Some(name) => {
                let network = resolve::select_one(
                    self.client
                        .networks(&datacenter, Some(name))
                        .map_err(not_found("network"))?,
                    Some(name),
                )?;
                debug!("resolved network: {}", network);
                Some(network)
            }
            None => None,
        };

        let host = resolve::select_one(
            self.client
                .hosts(&datacenter, request.host.as_deref())
                .map_err(not_found("host"))?,
            request.host.as_deref(),
        )?;
        debug!("resolved host: {}", host);

        let resource_pool = self
            .client
            .resource_pool(&host)
            .map_err(not_found("resource pool"))?;
        debug!("resolved resource pool: {}", resource_pool);

        Ok(InventoryHandles {
            datacenter,
            datastore,
            host,
            resource_pool,
            network,
        })
    }

    /// Submits the create-VM task and blocks until it finishes.
    pub fn create_vm(
        &self,
        handles: &InventoryHandles,
        request: &VmRequest,
    ) -> Result<VmRef, ProvisionError> {
        let task_name = format!("create vm {}", request.name);
        let task_error = |message: String| ProvisionError::Task {
            task: task_name.clone(),
            message,
        };

        let spec = vm_config_spec(handles, request);
        info!("creating virtual machine {}", spec.name);

        let folder = self
            .client
            .vm_folder(&handles.datacenter)
            .map_err(|e| ProvisionError::NotFound {
                kind: "folder",
                message: remote_message(e),
            })?;
        let task = self
            .client
            .create_vm(
                &folder,
                &spec,
                &handles.resource_pool,
                &handles.host,
                &handles.datastore,
            )
            .map_err(|e| task_error(remote_message(e)))?;
        debug!("waiting for task {}", task.id);

        match self
            .client
            .wait_for_task(&task)
            .map_err(|e| task_error(remote_message(e)))?
        {
            TaskOutcome::Succeeded { result: Some(id) } => {
                info!("created virtual machine {} ({})", spec.name, id);
                Ok(VmRef { id })
            }
            TaskOutcome::Succeeded { result: None } => Err(task_error(
                "task succeeded without returning a virtual machine reference".to_string(),
            )),
            TaskOutcome::Failed { message } => Err(task_error(message)),
        }
    }

    /// Streams a local file to `<vm name>/<dest_name>` on the target datastore.
    ///
    /// An empty `local` path is a configuration error and is rejected without
    /// contacting the endpoint.
    pub fn upload_file(
        &self,
        handles: &InventoryHandles,
        request: &VmRequest,
        local: &Utf8Path,
        dest_name: &str,
    ) -> Result<UploadedFile, ProvisionError> {
        if local.as_str().trim().is_empty() {
            return Err(ProvisionError::Config("no file specified".to_string()));
        }
        let path = DatastorePath::new(
            handles.datastore.name.clone(),
            format!("{}/{}", request.name, dest_name),
        );
        info!("uploading file [{}] to {}", local, path);

        self.client
            .upload_file(local, &handles.datacenter, &path)
            .map_err(|e| ProvisionError::Upload {
                path: local.to_string(),
                message: remote_message(e),
            })?;

        Ok(UploadedFile { path })
    }

    fn devices(&self, vm: &VmRef, device: &str) -> Result<DeviceList, ProvisionError> {
        self.client.devices(vm).map_err(|e| ProvisionError::Device {
            device: device.to_string(),
            message: remote_message(e),
        })
    }

    fn add_device(&self, vm: &VmRef, device: VirtualDevice) -> Result<(), ProvisionError> {
        let name = device.type_name();
        self.client
            .add_devices(vm, std::slice::from_ref(&device))
            .map_err(|e| ProvisionError::Device {
                device: name.to_string(),
                message: remote_message(e),
            })
    }

    /// Adds a CD-ROM on a free IDE controller with the uploaded ISO inserted.
    ///
    /// With `slot`, the CD-ROM references that file name in the upload's
    /// directory instead of the uploaded name. Returns the referenced path.
    pub fn attach_iso(
        &self,
        vm: &VmRef,
        iso: &UploadedFile,
        slot: Option<&str>,
    ) -> Result<DatastorePath, ProvisionError> {
        let devices = self.devices(vm, "cdrom")?;
        let ide_key = devices
            .find_ide_controller()
            .map(VirtualDevice::key)
            .ok_or_else(|| ProvisionError::Device {
                device: "cdrom".to_string(),
                message: "no available IDE controller".to_string(),
            })?;

        let target = match slot {
            Some(slot) => {
                if slot != iso.path().file_name() {
                    tracing::warn!(
                        uploaded = %iso.path(),
                        slot = slot,
                        "cdrom references the fixed ISO slot, not the uploaded file name"
                    );
                }
                iso.path().with_file_name(slot)
            }
            None => iso.path().clone(),
        };

        info!("adding ISO {} to the virtual machine", target);
        self.add_device(vm, devices.create_cdrom(ide_key, target.clone()))?;
        Ok(target)
    }

    /// Attaches the uploaded disk image.
    pub fn attach_uploaded_disk(
        &self,
        vm: &VmRef,
        disk: &UploadedFile,
        size_mb: u64,
    ) -> Result<(), ProvisionError> {
        self.attach_disk(vm, DiskBacking::Existing(disk.path().clone()), size_mb)
    }

    /// Creates a new disk file named `disk_name` in the VM directory and attaches it.
    pub fn attach_new_disk(
        &self,
        handles: &InventoryHandles,
        request: &VmRequest,
        vm: &VmRef,
        disk_name: &str,
        size_mb: u64,
    ) -> Result<(), ProvisionError> {
        let path = DatastorePath::new(
            handles.datastore.name.clone(),
            format!("{}/{}", request.name, disk_name),
        );
        self.attach_disk(vm, DiskBacking::Create(path), size_mb)
    }

    fn attach_disk(
        &self,
        vm: &VmRef,
        backing: DiskBacking,
        size_mb: u64,
    ) -> Result<(), ProvisionError> {
        // The endpoint takes the capacity in bytes, so that product must fit too.
        let capacity_kb = size_mb
            .checked_mul(1024 * 1024)
            .map(|bytes| bytes / 1024)
            .ok_or_else(|| {
                ProvisionError::Config(format!("disk size of {} MB is too large", size_mb))
            })?;

        let devices = self.devices(vm, "disk")?;
        let controller_key = devices
            .find_scsi_controller()
            .map(VirtualDevice::key)
            .ok_or_else(|| ProvisionError::Device {
                device: "disk".to_string(),
                message: "no available SCSI controller".to_string(),
            })?;

        info!("adding disk {} ({} MB) to the virtual machine", backing.path(), size_mb);
        self.add_device(vm, devices.create_disk(controller_key, backing, capacity_kb))
    }

    /// Adds a vmxnet3 NIC backed by the resolved network.
    pub fn attach_nic(
        &self,
        handles: &InventoryHandles,
        vm: &VmRef,
    ) -> Result<(), ProvisionError> {
        let Some(network) = handles.network.as_ref() else {
            return Err(ProvisionError::Device {
                device: "nic".to_string(),
                message: "no network resolved".to_string(),
            });
        };
        let backing = self.client.nic_backing(network).map_err(|e| ProvisionError::Device {
            device: "nic".to_string(),
            message: remote_message(e),
        })?;

        info!("adding VM networking on {}", network.name);
        let devices = self.devices(vm, "nic")?;
        self.add_device(vm, devices.create_nic(NicKind::Vmxnet3, backing))
    }
}
