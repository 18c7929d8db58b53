//! Name-or-default selection of inventory objects.

use crate::error::ProvisionError;
use crate::inventory::InventoryObject;

/// Selects exactly one object from the lookup candidates.
///
/// With a name, the single object carrying that name is returned. Without
/// one, the only candidate is the default; zero or several candidates fail.
pub(crate) fn select_one<T: InventoryObject>(
    candidates: Vec<T>,
    name: Option<&str>,
) -> Result<T, ProvisionError> {
    let mut matches: Vec<T> = match name {
        Some(name) => candidates.into_iter().filter(|c| c.name() == name).collect(),
        None => candidates,
    };

    match (matches.len(), name) {
        (1, _) => Ok(matches.remove(0)),
        (0, Some(name)) => Err(ProvisionError::NotFound {
            kind: T::KIND,
            message: format!("{} '{}' not found", T::KIND, name),
        }),
        (0, None) => Err(ProvisionError::NotFound {
            kind: T::KIND,
            message: format!("no default {} found", T::KIND),
        }),
        (n, Some(name)) => Err(ProvisionError::NotFound {
            kind: T::KIND,
            message: format!("path '{}' resolves to {} {}s", name, n, T::KIND),
        }),
        (_, None) => Err(ProvisionError::NotFound {
            kind: T::KIND,
            message: format!("default {} resolves to multiple instances, please specify", T::KIND),
        }),
    }
}
