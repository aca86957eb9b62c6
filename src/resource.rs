use std::collections::BTreeMap;

use crate::marshal::FourCC;

/// Legacy Macintosh resource fork, consulted for a `moov` resource when the data fork holds
/// no movie atom.
pub trait ResourceFork {
    /// Ids of the resources of `type`, in ascending order.
    fn resource_ids(&self, r#type: FourCC) -> Vec<u16>;

    fn resource(&mut self, r#type: FourCC, id: u16) -> std::io::Result<Option<Vec<u8>>>;
}

/// Resource fork already loaded into memory.
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    resources: BTreeMap<(FourCC, u16), Vec<u8>>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, r#type: FourCC, id: u16, data: Vec<u8>) -> Option<Vec<u8>> {
        self.resources.insert((r#type, id), data)
    }
}

impl ResourceFork for ResourceMap {
    fn resource_ids(&self, r#type: FourCC) -> Vec<u16> {
        self.resources
            .keys()
            .filter(|(resource_type, _)| *resource_type == r#type)
            .map(|&(_, id)| id)
            .collect()
    }

    fn resource(&mut self, r#type: FourCC, id: u16) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.resources.get(&(r#type, id)).cloned())
    }
}
