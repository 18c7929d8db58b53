//! Virtual device model.
//!
//! A [`VirtualDevice`] describes one piece of virtual hardware, either as
//! reported by the platform (positive keys) or as an addition being built
//! (negative temporary keys assigned by [`DeviceList::next_key`]).

use strum::Display;

use super::{DatastorePath, NetworkKind};

/// Maximum number of devices on one IDE controller.
const IDE_SLOTS_PER_CONTROLLER: usize = 2;

/// SCSI controller models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScsiControllerKind {
    /// VMware paravirtual SCSI
    Pvscsi,
    Lsilogic,
    #[strum(serialize = "lsilogic-sas")]
    LsilogicSas,
    Buslogic,
}

/// Virtual ethernet adapter models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NicKind {
    Vmxnet3,
    E1000,
    E1000e,
}

/// Network connection backing a NIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicBacking {
    pub kind: NetworkKind,
    pub network: String,
}

/// File backing a virtual disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskBacking {
    /// An existing disk file, e.g. one uploaded before attaching.
    Existing(DatastorePath),
    /// A disk file the platform creates while adding the device.
    Create(DatastorePath),
}

impl DiskBacking {
    pub fn path(&self) -> &DatastorePath {
        match self {
            Self::Existing(path) | Self::Create(path) => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualDevice {
    ScsiController {
        key: i32,
        bus: i32,
        kind: ScsiControllerKind,
    },
    IdeController {
        key: i32,
        bus: i32,
    },
    Cdrom {
        key: i32,
        controller_key: i32,
        iso: Option<DatastorePath>,
    },
    Disk {
        key: i32,
        controller_key: i32,
        backing: DiskBacking,
        capacity_kb: u64,
    },
    Nic {
        key: i32,
        kind: NicKind,
        backing: NicBacking,
    },
}

impl VirtualDevice {
    pub fn key(&self) -> i32 {
        match self {
            Self::ScsiController { key, .. }
            | Self::IdeController { key, .. }
            | Self::Cdrom { key, .. }
            | Self::Disk { key, .. }
            | Self::Nic { key, .. } => *key,
        }
    }

    /// Key of the controller this device is attached to, if any.
    pub fn controller_key(&self) -> Option<i32> {
        match self {
            Self::Cdrom { controller_key, .. } | Self::Disk { controller_key, .. } => {
                Some(*controller_key)
            }
            _ => None,
        }
    }

    /// Short device type name for logs and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ScsiController { .. } => "scsi controller",
            Self::IdeController { .. } => "ide controller",
            Self::Cdrom { .. } => "cdrom",
            Self::Disk { .. } => "disk",
            Self::Nic { .. } => "nic",
        }
    }
}

/// The set of devices of one VM, with lookup and construction helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    devices: Vec<VirtualDevice>,
}

impl DeviceList {
    pub fn new(devices: Vec<VirtualDevice>) -> Self {
        Self { devices }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualDevice> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn attached_to(&self, controller_key: i32) -> usize {
        self.devices
            .iter()
            .filter(|d| d.controller_key() == Some(controller_key))
            .count()
    }

    /// Finds the first IDE controller with a free slot.
    pub fn find_ide_controller(&self) -> Option<&VirtualDevice> {
        self.devices.iter().find(|d| {
            matches!(d, VirtualDevice::IdeController { .. })
                && self.attached_to(d.key()) < IDE_SLOTS_PER_CONTROLLER
        })
    }

    /// Finds the first SCSI disk controller.
    pub fn find_scsi_controller(&self) -> Option<&VirtualDevice> {
        self.devices
            .iter()
            .find(|d| matches!(d, VirtualDevice::ScsiController { .. }))
    }

    /// Returns the next unused temporary key for a device being added.
    pub fn next_key(&self) -> i32 {
        self.devices.iter().map(VirtualDevice::key).filter(|k| *k < 0).min().unwrap_or(0) - 1
    }

    /// File names of all attached disks.
    pub fn disk_file_names(&self) -> Vec<&str> {
        self.devices
            .iter()
            .filter_map(|d| match d {
                VirtualDevice::Disk { backing, .. } => Some(backing.path().file_name()),
                _ => None,
            })
            .collect()
    }

    pub fn create_cdrom(&self, controller_key: i32, iso: DatastorePath) -> VirtualDevice {
        VirtualDevice::Cdrom {
            key: self.next_key(),
            controller_key,
            iso: Some(iso),
        }
    }

    pub fn create_disk(
        &self,
        controller_key: i32,
        backing: DiskBacking,
        capacity_kb: u64,
    ) -> VirtualDevice {
        VirtualDevice::Disk {
            key: self.next_key(),
            controller_key,
            backing,
            capacity_kb,
        }
    }

    pub fn create_nic(&self, kind: NicKind, backing: NicBacking) -> VirtualDevice {
        VirtualDevice::Nic {
            key: self.next_key(),
            kind,
            backing,
        }
    }
}
