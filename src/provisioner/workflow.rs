//! Linear provisioning sequence.

use tracing::{error, info};

use super::{Provisioner, destination_name};
use crate::config::{Endpoint, VmRequest};
use crate::error::ProvisionError;
use crate::inventory::{DatastorePath, InventoryClient, VmRef};

/// What a provisioning run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub vm: VmRef,
    /// Datastore paths of uploaded files, in upload order.
    pub uploads: Vec<DatastorePath>,
    /// Attached devices, in attach order (e.g., "cdrom [ds1] vm1/a.iso").
    pub attached: Vec<String>,
    /// Non-fatal errors whose step was skipped.
    pub skipped: Vec<String>,
}

impl ProvisionReport {
    fn new(vm: VmRef) -> Self {
        Self {
            vm,
            uploads: Vec::new(),
            attached: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Rejects a persistent disk whose name matches the disk attached from the image.
fn check_persistent_name(
    attached_disk: Option<&str>,
    persistent_name: &str,
) -> Result<(), ProvisionError> {
    match attached_disk {
        Some(name) if name == persistent_name => Err(ProvisionError::NameCollision {
            name: persistent_name.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Runs the whole workflow: connect, resolve, create, then the optional
/// ISO, disk, persistent disk, and NIC steps.
///
/// Stops at the first fatal error. A persistent disk name collision is logged
/// and skipped.
pub fn run<C: InventoryClient>(
    client: C,
    endpoint: &Endpoint,
    request: &VmRequest,
) -> Result<ProvisionReport, ProvisionError> {
    let provisioner = Provisioner::connect(client, endpoint)?;
    let handles = provisioner.resolve_inventory(request)?;
    let vm = provisioner.create_vm(&handles, request)?;
    let mut report = ProvisionReport::new(vm.clone());

    if let Some(iso) = request.iso.as_deref() {
        let uploaded = provisioner.upload_file(&handles, request, iso, destination_name(iso)?)?;
        report.uploads.push(uploaded.path().clone());
        let target = provisioner.attach_iso(&vm, &uploaded, request.iso_slot.as_deref())?;
        report.attached.push(format!("cdrom {}", target));
    }

    let mut attached_disk = None;
    if let Some(disk) = request.disk.as_deref() {
        let name = destination_name(disk)?;
        let uploaded = provisioner.upload_file(&handles, request, disk, name)?;
        report.uploads.push(uploaded.path().clone());
        provisioner.attach_uploaded_disk(&vm, &uploaded, request.disk_size_mb)?;
        report.attached.push(format!("disk {}", uploaded.path()));
        attached_disk = Some(name);
    }

    if request.persistent_size_mb != 0 {
        match check_persistent_name(attached_disk, &request.persistent_disk_name) {
            Ok(()) => {
                provisioner.attach_new_disk(
                    &handles,
                    request,
                    &vm,
                    &request.persistent_disk_name,
                    request.persistent_size_mb,
                )?;
                report.attached.push(format!(
                    "disk {}/{} ({} MB)",
                    request.name, request.persistent_disk_name, request.persistent_size_mb
                ));
            }
            Err(e) => {
                error!("{}", e);
                report.skipped.push(e.to_string());
            }
        }
    }

    if let Some(network) = handles.network.as_ref() {
        provisioner.attach_nic(&handles, &vm)?;
        report.attached.push(format!("nic {}", network.name));
    }

    info!(
        vm = %report.vm,
        attached = report.attached.len(),
        "provisioning of {} completed",
        request.name
    );
    Ok(report)
}
