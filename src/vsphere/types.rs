//! vSphere Automation REST API payloads and their mapping onto the
//! inventory model.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::inventory::{
    Datastore, DatastorePath, DeviceList, DiskBacking, Folder, HostSystem, NetworkKind,
    NicBacking, NicKind, ResourcePool, ScsiControllerKind, TaskOutcome, VirtualDevice,
    VmConfigSpec,
};

/// Device keys of the two IDE controllers every VM carries; the REST VM view
/// does not list them.
pub(crate) const IDE_CONTROLLER_KEYS: [i32; 2] = [200, 201];

#[derive(Debug, Deserialize)]
pub(crate) struct DatacenterSummary {
    pub datacenter: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DatastoreSummary {
    pub datastore: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HostSummary {
    pub host: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NetworkSummary {
    pub network: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourcePoolSummary {
    pub resource_pool: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FolderSummary {
    pub folder: String,
    pub name: String,
}

pub(crate) fn network_kind(kind: &str) -> Result<NetworkKind> {
    match kind {
        "STANDARD_PORTGROUP" => Ok(NetworkKind::StandardPortgroup),
        "DISTRIBUTED_PORTGROUP" => Ok(NetworkKind::DistributedPortgroup),
        "OPAQUE_NETWORK" => Ok(NetworkKind::OpaqueNetwork),
        other => bail!("unsupported network type: {}", other),
    }
}

// Task status

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum TaskStatus {
    Pending,
    Running,
    Blocked,
    Succeeded,
    Failed,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskInfo {
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Extracts the human-readable text from a vAPI error structure.
pub(crate) fn error_message(error: &Value) -> String {
    let messages: Vec<&str> = error
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m.get("default_message").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if !messages.is_empty() {
        return messages.join("; ");
    }
    if let Some(error_type) = error.get("error_type").and_then(Value::as_str) {
        return error_type.to_string();
    }
    error.to_string()
}

/// Maps a polled task to its terminal outcome, or `None` while it is still running.
pub(crate) fn task_outcome(info: TaskInfo) -> Option<TaskOutcome> {
    match info.status {
        TaskStatus::Pending | TaskStatus::Running | TaskStatus::Blocked => None,
        TaskStatus::Succeeded => Some(TaskOutcome::Succeeded {
            result: info.result.and_then(|r| r.as_str().map(str::to_string)),
        }),
        TaskStatus::Failed => Some(TaskOutcome::Failed {
            message: info
                .error
                .as_ref()
                .map(error_message)
                .unwrap_or_else(|| "task failed without an error description".to_string()),
        }),
    }
}

// VM creation

/// Converts a guest identifier such as `otherLinux64Guest` into the REST
/// enumeration form `OTHER_LINUX_64`.
pub(crate) fn guest_os(guest_id: &str) -> String {
    let id = guest_id.strip_suffix("Guest").unwrap_or(guest_id);
    let mut out = String::with_capacity(id.len() + 4);
    let mut prev: Option<char> = None;
    for c in id.chars() {
        let boundary = match prev {
            Some(p) => {
                (c.is_ascii_uppercase() && !p.is_ascii_uppercase() && p != '_')
                    || (c.is_ascii_digit() && p.is_ascii_alphabetic())
            }
            None => false,
        };
        if boundary {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
        prev = Some(c);
    }
    out
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct Placement {
    pub folder: String,
    pub resource_pool: String,
    pub host: String,
    pub datastore: String,
}

impl Placement {
    pub fn new(
        folder: &Folder,
        pool: &ResourcePool,
        host: &HostSystem,
        datastore: &Datastore,
    ) -> Self {
        Self {
            folder: folder.id.clone(),
            resource_pool: pool.id.clone(),
            host: host.id.clone(),
            datastore: datastore.id.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct CpuSpec {
    pub count: u32,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct MemorySpec {
    #[serde(rename = "size_MiB")]
    pub size_mib: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct ScsiAdapterCreate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<i32>,
}

/// Body of `POST /api/vcenter/vm`.
///
/// Empty device lists keep the platform from adding guest-OS default devices.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct VmCreateSpec {
    pub name: String,
    #[serde(rename = "guest_OS")]
    pub guest_os: String,
    pub placement: Placement,
    pub cpu: CpuSpec,
    pub memory: MemorySpec,
    pub scsi_adapters: Vec<ScsiAdapterCreate>,
    pub cdroms: Vec<CdromCreate>,
    pub disks: Vec<DiskCreate>,
    pub nics: Vec<EthernetCreate>,
}

fn scsi_adapter_type(kind: ScsiControllerKind) -> &'static str {
    match kind {
        ScsiControllerKind::Pvscsi => "PVSCSI",
        ScsiControllerKind::Lsilogic => "LSILOGIC",
        ScsiControllerKind::LsilogicSas => "LSILOGICSAS",
        ScsiControllerKind::Buslogic => "BUSLOGIC",
    }
}

pub(crate) fn vm_create_spec(spec: &VmConfigSpec, placement: Placement) -> Result<VmCreateSpec> {
    let mut scsi_adapters = Vec::new();
    for device in &spec.devices {
        match device {
            VirtualDevice::ScsiController { bus, kind, .. } => {
                scsi_adapters.push(ScsiAdapterCreate {
                    kind: scsi_adapter_type(*kind),
                    bus: Some(*bus),
                })
            }
            other => bail!("{} can not be created together with the VM", other.type_name()),
        }
    }
    Ok(VmCreateSpec {
        name: spec.name.clone(),
        guest_os: guest_os(&spec.guest_id),
        placement,
        cpu: CpuSpec {
            count: spec.num_cpus,
        },
        memory: MemorySpec {
            size_mib: spec.memory_mb,
        },
        scsi_adapters,
        cdroms: Vec::new(),
        disks: Vec::new(),
        nics: Vec::new(),
    })
}

// Device creation

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct IdeAddress {
    pub primary: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct CdromBackingSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub iso_file: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct CdromCreate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ide: IdeAddress,
    pub backing: CdromBackingSpec,
    pub start_connected: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct ScsiAddress {
    pub bus: i32,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct DiskBackingSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub vmdk_file: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct NewVmdk {
    pub name: String,
    /// Bytes.
    pub capacity: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct DiskCreate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub scsi: ScsiAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backing: Option<DiskBackingSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_vmdk: Option<NewVmdk>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct EthernetBackingSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub network: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct EthernetCreate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub backing: EthernetBackingSpec,
    pub start_connected: bool,
}

/// One device-add request against `/api/vcenter/vm/{vm}/hardware/...`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HardwareCreate {
    Cdrom(CdromCreate),
    Disk(DiskCreate),
    Ethernet(EthernetCreate),
}

impl HardwareCreate {
    /// Path below `/api/vcenter/vm/{vm}/hardware/`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Cdrom(_) => "cdrom",
            Self::Disk(_) => "disk",
            Self::Ethernet(_) => "ethernet",
        }
    }

    pub fn body(&self) -> Result<Value> {
        let value = match self {
            Self::Cdrom(spec) => serde_json::to_value(spec),
            Self::Disk(spec) => serde_json::to_value(spec),
            Self::Ethernet(spec) => serde_json::to_value(spec),
        };
        value.context("failed to serialize device spec")
    }
}

/// Body of `PATCH /api/vcenter/vm/{vm}/hardware/disk/{disk}`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct DiskUpdate {
    /// Bytes.
    pub capacity: u64,
}

fn capacity_bytes(capacity_kb: u64) -> Result<u64> {
    capacity_kb
        .checked_mul(1024)
        .with_context(|| format!("disk capacity of {} KB overflows", capacity_kb))
}

/// Resize applied after attaching an existing VMDK, whose create body has no
/// capacity field. `None` for every other device.
pub(crate) fn disk_resize(device: &VirtualDevice) -> Result<Option<DiskUpdate>> {
    match device {
        VirtualDevice::Disk {
            backing: DiskBacking::Existing(_),
            capacity_kb,
            ..
        } if *capacity_kb > 0 => Ok(Some(DiskUpdate {
            capacity: capacity_bytes(*capacity_kb)?,
        })),
        _ => Ok(None),
    }
}

fn nic_type(kind: NicKind) -> &'static str {
    match kind {
        NicKind::Vmxnet3 => "VMXNET3",
        NicKind::E1000 => "E1000",
        NicKind::E1000e => "E1000E",
    }
}

/// Maps a device being added onto its REST request. `existing` resolves
/// controller keys to bus numbers.
pub(crate) fn hardware_create(
    device: &VirtualDevice,
    existing: &DeviceList,
) -> Result<HardwareCreate> {
    let controller_bus = |controller_key: i32| -> Result<i32> {
        existing
            .iter()
            .find_map(|d| match d {
                VirtualDevice::ScsiController { key, bus, .. }
                | VirtualDevice::IdeController { key, bus } if *key == controller_key => Some(*bus),
                _ => None,
            })
            .with_context(|| format!("controller {} not found on the VM", controller_key))
    };

    match device {
        VirtualDevice::ScsiController { .. } | VirtualDevice::IdeController { .. } => {
            bail!("{} can only be created together with the VM", device.type_name())
        }
        VirtualDevice::Cdrom {
            controller_key,
            iso,
            ..
        } => {
            let iso = iso.as_ref().context("cdrom without an ISO backing")?;
            Ok(HardwareCreate::Cdrom(CdromCreate {
                kind: "IDE",
                ide: IdeAddress {
                    primary: controller_bus(*controller_key)? == 0,
                },
                backing: CdromBackingSpec {
                    kind: "ISO_FILE",
                    iso_file: iso.to_string(),
                },
                start_connected: true,
            }))
        }
        VirtualDevice::Disk {
            controller_key,
            backing,
            capacity_kb,
            ..
        } => {
            let scsi = ScsiAddress {
                bus: controller_bus(*controller_key)?,
            };
            let disk = match backing {
                DiskBacking::Existing(path) => DiskCreate {
                    kind: "SCSI",
                    scsi,
                    backing: Some(DiskBackingSpec {
                        kind: "VMDK_FILE",
                        vmdk_file: path.to_string(),
                    }),
                    new_vmdk: None,
                },
                DiskBacking::Create(path) => {
                    let file_name = path.file_name();
                    let name = file_name.strip_suffix(".vmdk").unwrap_or(file_name);
                    DiskCreate {
                        kind: "SCSI",
                        scsi,
                        backing: None,
                        new_vmdk: Some(NewVmdk {
                            name: name.to_string(),
                            capacity: capacity_bytes(*capacity_kb)?,
                        }),
                    }
                }
            };
            Ok(HardwareCreate::Disk(disk))
        }
        VirtualDevice::Nic { kind, backing, .. } => Ok(HardwareCreate::Ethernet(EthernetCreate {
            kind: nic_type(*kind),
            backing: EthernetBackingSpec {
                kind: backing.kind.to_string(),
                network: backing.network.clone(),
            },
            start_connected: true,
        })),
    }
}

// VM hardware view

#[derive(Debug, Deserialize)]
pub(crate) struct ScsiBus {
    pub bus: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScsiAdapterInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub scsi: ScsiBus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdeInfo {
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileBackingInfo {
    #[serde(default)]
    pub iso_file: Option<String>,
    #[serde(default)]
    pub vmdk_file: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CdromInfo {
    #[serde(default)]
    pub ide: Option<IdeInfo>,
    pub backing: FileBackingInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiskInfo {
    #[serde(default)]
    pub scsi: Option<ScsiBus>,
    pub backing: FileBackingInfo,
    /// Bytes.
    #[serde(default)]
    pub capacity: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NicInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub backing: FileBackingInfo,
}

/// Relevant parts of `GET /api/vcenter/vm/{vm}`; maps are keyed by device key.
#[derive(Debug, Deserialize)]
pub(crate) struct VmInfo {
    #[serde(default)]
    pub scsi_adapters: BTreeMap<String, ScsiAdapterInfo>,
    #[serde(default)]
    pub cdroms: BTreeMap<String, CdromInfo>,
    #[serde(default)]
    pub disks: BTreeMap<String, DiskInfo>,
    #[serde(default)]
    pub nics: BTreeMap<String, NicInfo>,
}

fn parse_key(key: &str) -> Result<i32> {
    key.parse()
        .with_context(|| format!("invalid device key: {:?}", key))
}

fn scsi_kind(kind: &str) -> ScsiControllerKind {
    match kind {
        "LSILOGIC" => ScsiControllerKind::Lsilogic,
        "LSILOGICSAS" => ScsiControllerKind::LsilogicSas,
        "BUSLOGIC" => ScsiControllerKind::Buslogic,
        _ => ScsiControllerKind::Pvscsi,
    }
}

fn nic_kind(kind: &str) -> NicKind {
    match kind {
        "E1000" => NicKind::E1000,
        "E1000E" => NicKind::E1000e,
        _ => NicKind::Vmxnet3,
    }
}

/// Builds the device list from the REST VM view, adding the implicit IDE controllers.
pub(crate) fn device_list(info: VmInfo) -> Result<DeviceList> {
    let mut devices: Vec<VirtualDevice> = IDE_CONTROLLER_KEYS
        .iter()
        .enumerate()
        .map(|(bus, key)| VirtualDevice::IdeController {
            key: *key,
            bus: bus as i32,
        })
        .collect();

    let mut scsi_keys = BTreeMap::new();
    for (key, adapter) in &info.scsi_adapters {
        let key = parse_key(key)?;
        scsi_keys.insert(adapter.scsi.bus, key);
        devices.push(VirtualDevice::ScsiController {
            key,
            bus: adapter.scsi.bus,
            kind: scsi_kind(&adapter.kind),
        });
    }

    for (key, cdrom) in info.cdroms {
        let primary = cdrom.ide.as_ref().is_none_or(|ide| ide.primary);
        let iso = match cdrom.backing.iso_file {
            Some(path) => Some(path.parse::<DatastorePath>()?),
            None => None,
        };
        devices.push(VirtualDevice::Cdrom {
            key: parse_key(&key)?,
            controller_key: if primary {
                IDE_CONTROLLER_KEYS[0]
            } else {
                IDE_CONTROLLER_KEYS[1]
            },
            iso,
        });
    }

    for (key, disk) in info.disks {
        let Some(vmdk) = disk.backing.vmdk_file else {
            continue;
        };
        let bus = disk.scsi.as_ref().map_or(0, |s| s.bus);
        devices.push(VirtualDevice::Disk {
            key: parse_key(&key)?,
            controller_key: scsi_keys.get(&bus).copied().unwrap_or_default(),
            backing: DiskBacking::Existing(vmdk.parse()?),
            capacity_kb: disk.capacity.unwrap_or_default() / 1024,
        });
    }

    for (key, nic) in info.nics {
        let Some(network) = nic.backing.network else {
            continue;
        };
        devices.push(VirtualDevice::Nic {
            key: parse_key(&key)?,
            kind: nic_kind(&nic.kind),
            backing: NicBacking {
                kind: network_kind(&nic.backing.kind)?,
                network,
            },
        });
    }

    Ok(DeviceList::new(devices))
}
